mod data;

pub use data::{AnalysisTable, DetectedChangeTable, MonitoredPageTable, SnapshotTable, SqliteData};

use crate::snapshot::PageType;
use chrono::{DateTime, Utc};

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MonitoredPage {
    pub id: i64,
    pub page_type: PageType,
    pub url: String,
}

/// A snapshot row as the scraper writes it. `raw_data` is stored verbatim.
#[derive(Debug, Clone, PartialEq)]
pub struct NewSnapshot {
    pub page_id: i64,
    pub price: String,
    pub availability: String,
    pub scraped_at: DateTime<Utc>,
    pub raw_data: Option<String>,
}
