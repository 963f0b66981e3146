use crate::classify::ChangeType;
use crate::snapshot::PageType;
use chrono::{DateTime, Utc};
use serde::Serialize;
use serde_json::Value;

/// A classified difference between the two most recent snapshots of a page.
///
/// `id` is `None` until the change store has persisted the record.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct DetectedChange {
    pub id: Option<i64>,
    pub page_id: i64,
    pub page_type: PageType,
    /// The compared pair. A page holds at most one change per pair.
    pub previous_snapshot_id: i64,
    pub latest_snapshot_id: i64,
    pub old_price: Option<String>,
    pub new_price: Option<String>,
    pub change_percent: Option<f64>,
    pub old_availability: String,
    pub new_availability: String,
    pub old_features: Vec<String>,
    pub new_features: Vec<String>,
    /// Only set for features pages.
    pub features_added: Option<Vec<String>>,
    pub features_removed: Option<Vec<String>>,
    pub old_text: String,
    pub new_text: String,
    pub change_type: ChangeType,
    pub old_hash: String,
    pub new_hash: String,
    pub detected_at: DateTime<Utc>,
    /// Snapshot ids and full diff outputs.
    pub raw_data: Value,
}

/// A stored change that has no analysis yet, as read back by the analysis
/// generator.
#[derive(Debug, Clone, PartialEq, Default)]
pub struct PendingChange {
    pub change_id: i64,
    pub page_id: i64,
    pub change_type: String,
    pub page_type: String,
    pub old_price: Option<String>,
    pub new_price: Option<String>,
    pub change_percent: Option<f64>,
    pub old_features: Option<String>,
    pub new_features: Option<String>,
    pub old_text: Option<String>,
    pub new_text: Option<String>,
}

impl From<&DetectedChange> for PendingChange {
    fn from(change: &DetectedChange) -> Self {
        PendingChange {
            change_id: change.id.unwrap_or_default(),
            page_id: change.page_id,
            change_type: change.change_type.to_string(),
            page_type: change.page_type.to_string(),
            old_price: change.old_price.clone(),
            new_price: change.new_price.clone(),
            change_percent: change.change_percent,
            old_features: serde_json::to_string(&change.old_features).ok(),
            new_features: serde_json::to_string(&change.new_features).ok(),
            old_text: Some(change.old_text.clone()),
            new_text: Some(change.new_text.clone()),
        }
    }
}
