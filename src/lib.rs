use serde_json::json;
use tracing::{debug, error, info, instrument};

pub mod analysis;
pub mod change;
pub mod classify;
pub mod config;
pub mod diff;
pub mod hash;
pub mod memory;
pub mod price;
pub mod snapshot;
pub mod sqlite;

mod data;
mod error;
mod utils;

pub use change::{DetectedChange, PendingChange};
pub use classify::{ChangeTag, ChangeType};
pub use data::Table;
pub use error::DetectorError;
pub use snapshot::{ContentStatus, PageType, Snapshot, SnapshotContent};

use analysis::Analysis;
use classify::classify;
use diff::{diff_features, diff_messaging, diff_pricing};
use hash::canonical_hash;

/// Read side of the snapshots written by the external scraper.
#[async_trait::async_trait]
pub trait SnapshotStore {
    /// Ids of pages holding at least `min_snapshots` snapshots, ascending.
    async fn pages_with_history(&self, min_snapshots: u32) -> Result<Vec<i64>, DetectorError>;

    /// Up to `limit` snapshots of `page_id`, most recent first.
    async fn fetch_latest(&self, page_id: i64, limit: u32) -> Result<Vec<Snapshot>, DetectorError>;
}

#[async_trait::async_trait]
pub trait ChangeStore {
    /// Persist a change and return its id.
    async fn change_insert(&self, change: &DetectedChange) -> Result<i64, DetectorError>;

    /// Id of the change already stored for this snapshot pair, if any.
    async fn change_for_pair(
        &self,
        page_id: i64,
        previous_snapshot_id: i64,
        latest_snapshot_id: i64,
    ) -> Result<Option<i64>, DetectorError>;

    /// Changes without an analysis, most recently detected first.
    async fn changes_unanalyzed(&self, limit: u32) -> Result<Vec<PendingChange>, DetectorError>;
}

#[async_trait::async_trait]
pub trait AnalysisStore {
    async fn analysis_insert(&self, analysis: &Analysis) -> Result<i64, DetectorError>;
}

/// Outcome of one detection pass over a page.
#[derive(Debug, Clone, PartialEq)]
pub enum Detection {
    /// Fewer than two snapshots exist.
    InsufficientHistory { found: usize },
    /// The two latest snapshots share a canonical hash.
    Unchanged { hash: String },
    /// The pair differs but a previous run already stored its change.
    AlreadyRecorded { change_id: i64 },
    Changed(Box<DetectedChange>),
}

pub struct Detector<S> {
    store: S,
}

impl<S> Detector<S>
where
    S: SnapshotStore + ChangeStore + Send + Sync,
{
    pub fn new(store: S) -> Self {
        Detector { store }
    }

    pub fn store(&self) -> &S {
        &self.store
    }

    /// Compare the two latest snapshots of `page_id` and persist a change when
    /// their content differs.
    #[instrument(skip(self))]
    pub async fn detect_changes(&self, page_id: i64) -> Result<Detection, DetectorError> {
        let snapshots = self.store.fetch_latest(page_id, 2).await?;
        let (latest, previous) = match snapshots.as_slice() {
            [latest, previous, ..] => (latest, previous),
            _ => {
                info!(
                    "Page {}: not enough snapshots to compare (found {})",
                    page_id,
                    snapshots.len()
                );
                return Ok(Detection::InsufficientHistory {
                    found: snapshots.len(),
                });
            }
        };

        let old_hash = canonical_hash(&previous.content);
        let new_hash = canonical_hash(&latest.content);
        if old_hash == new_hash {
            info!("Page {}: no changes detected (hash identical)", page_id);
            return Ok(Detection::Unchanged { hash: new_hash });
        }
        debug!(
            "Page {}: hash changed from {} to {}",
            page_id,
            &old_hash[..16],
            &new_hash[..16]
        );

        if let Some(change_id) = self
            .store
            .change_for_pair(page_id, previous.id, latest.id)
            .await?
        {
            info!(
                "Page {}: change {} already recorded for this snapshot pair",
                page_id, change_id
            );
            return Ok(Detection::AlreadyRecorded { change_id });
        }

        let page_type = latest.page_type;
        let pricing = diff_pricing(&previous.content, &latest.content);
        let features = diff_features(&previous.content, &latest.content);
        let messaging = diff_messaging(&previous.content, &latest.content);
        let change_type = classify(&pricing, &features, &messaging, page_type);

        let is_features_page = page_type == PageType::Features;
        let feature_changes = if is_features_page {
            json!(features)
        } else {
            json!({})
        };
        let raw_data = json!({
            "latest_snapshot_id": latest.id,
            "previous_snapshot_id": previous.id,
            "latest_content_status": latest.content_status,
            "previous_content_status": previous.content_status,
            "pricing_changes": pricing,
            "feature_changes": feature_changes,
            "messaging_changes": messaging,
        });

        let mut change = DetectedChange {
            id: None,
            page_id,
            page_type,
            previous_snapshot_id: previous.id,
            latest_snapshot_id: latest.id,
            old_price: pricing.old_price.map(|p| p.to_string()),
            new_price: pricing.new_price.map(|p| p.to_string()),
            change_percent: pricing.change_percent,
            old_availability: previous.availability.clone(),
            new_availability: latest.availability.clone(),
            old_features: previous.content.features.clone(),
            new_features: latest.content.features.clone(),
            features_added: is_features_page.then(|| features.added.clone()),
            features_removed: is_features_page.then(|| features.removed.clone()),
            old_text: messaging.old_text,
            new_text: messaging.new_text,
            change_type,
            old_hash,
            new_hash,
            detected_at: utils::get_now(),
            raw_data,
        };

        change.id = Some(self.store.change_insert(&change).await?);
        info!("Detected change for page {}: {}", page_id, change.change_type);
        Ok(Detection::Changed(Box::new(change)))
    }

    /// Run detection over every page with at least two snapshots and return the
    /// number of pages that produced a new change. Failing pages are logged and
    /// skipped.
    pub async fn run_for_all_pages(&self) -> Result<usize, DetectorError> {
        let page_ids = self.store.pages_with_history(2).await?;
        info!("Running change detection for {} pages", page_ids.len());

        let mut detected = 0;
        for page_id in page_ids {
            match self.detect_changes(page_id).await {
                Ok(Detection::Changed(_)) => detected += 1,
                Ok(_) => {}
                Err(e) => error!("Error detecting changes for page {}: {}", page_id, e),
            }
        }

        info!("Change detection complete: {} changes detected", detected);
        Ok(detected)
    }
}
