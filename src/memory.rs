//! In-process store used by tests and dry runs.

use crate::analysis::Analysis;
use crate::change::{DetectedChange, PendingChange};
use crate::snapshot::{PageType, Snapshot, SnapshotContent};
use crate::{AnalysisStore, ChangeStore, DetectorError, SnapshotStore};
use chrono::{DateTime, Utc};
use serde_json::Value;
use std::collections::{BTreeMap, HashSet};
use std::sync::{Mutex, MutexGuard, PoisonError};

#[derive(Default)]
struct Inner {
    pages: BTreeMap<i64, PageType>,
    snapshots: Vec<Snapshot>,
    changes: Vec<DetectedChange>,
    pending: Vec<PendingChange>,
    analyses: Vec<Analysis>,
    failing_pages: HashSet<i64>,
    next_snapshot_id: i64,
    next_change_id: i64,
    next_analysis_id: i64,
}

#[derive(Default)]
pub struct MemoryStore {
    inner: Mutex<Inner>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    fn lock(&self) -> MutexGuard<'_, Inner> {
        self.inner.lock().unwrap_or_else(PoisonError::into_inner)
    }

    pub fn add_page(&self, id: i64, page_type: PageType) {
        self.lock().pages.insert(id, page_type);
    }

    /// Record a snapshot and return its id. `raw` is the scraper's content, either
    /// an object or a string holding one.
    pub fn add_snapshot(
        &self,
        page_id: i64,
        scraped_at: DateTime<Utc>,
        price: &str,
        availability: &str,
        raw: Value,
    ) -> i64 {
        let (content, content_status) = SnapshotContent::from_value(raw);
        let mut inner = self.lock();
        inner.next_snapshot_id += 1;
        let id = inner.next_snapshot_id;
        let page_type = inner.pages.get(&page_id).copied().unwrap_or_default();
        inner.snapshots.push(Snapshot {
            id,
            page_id,
            page_type,
            price: price.to_string(),
            availability: availability.to_string(),
            scraped_at,
            content,
            content_status,
        });
        id
    }

    /// Queue a change for analysis without going through detection. The returned
    /// copy carries the assigned `change_id`.
    pub fn add_pending(&self, mut change: PendingChange) -> PendingChange {
        let mut inner = self.lock();
        inner.next_change_id += 1;
        change.change_id = inner.next_change_id;
        inner.pending.push(change.clone());
        change
    }

    pub fn changes(&self) -> Vec<DetectedChange> {
        self.lock().changes.clone()
    }

    pub fn analyses(&self) -> Vec<Analysis> {
        self.lock().analyses.clone()
    }

    /// Make `change_insert` fail for `page_id`.
    pub fn fail_writes_for(&self, page_id: i64) {
        self.lock().failing_pages.insert(page_id);
    }

    pub fn allow_writes_for(&self, page_id: i64) {
        self.lock().failing_pages.remove(&page_id);
    }
}

#[async_trait::async_trait]
impl SnapshotStore for MemoryStore {
    async fn pages_with_history(&self, min_snapshots: u32) -> Result<Vec<i64>, DetectorError> {
        let inner = self.lock();
        let mut counts: BTreeMap<i64, u32> = BTreeMap::new();
        for snapshot in &inner.snapshots {
            *counts.entry(snapshot.page_id).or_default() += 1;
        }
        Ok(counts
            .into_iter()
            .filter(|(_, count)| *count >= min_snapshots)
            .map(|(page_id, _)| page_id)
            .collect())
    }

    async fn fetch_latest(&self, page_id: i64, limit: u32) -> Result<Vec<Snapshot>, DetectorError> {
        let inner = self.lock();
        let mut snapshots: Vec<Snapshot> = inner
            .snapshots
            .iter()
            .filter(|s| s.page_id == page_id)
            .cloned()
            .collect();
        snapshots.sort_by(|a, b| b.scraped_at.cmp(&a.scraped_at).then(b.id.cmp(&a.id)));
        snapshots.truncate(limit as usize);

        // the page type may have been registered after the snapshot
        let page_type = inner.pages.get(&page_id).copied().unwrap_or_default();
        for snapshot in &mut snapshots {
            snapshot.page_type = page_type;
        }
        Ok(snapshots)
    }
}

#[async_trait::async_trait]
impl ChangeStore for MemoryStore {
    async fn change_insert(&self, change: &DetectedChange) -> Result<i64, DetectorError> {
        let mut inner = self.lock();
        if inner.failing_pages.contains(&change.page_id) {
            return Err(DetectorError::StoreError(format!(
                "writes disabled for page {}",
                change.page_id
            )));
        }

        inner.next_change_id += 1;
        let id = inner.next_change_id;
        let mut stored = change.clone();
        stored.id = Some(id);
        inner.pending.push(PendingChange::from(&stored));
        inner.changes.push(stored);
        Ok(id)
    }

    async fn change_for_pair(
        &self,
        page_id: i64,
        previous_snapshot_id: i64,
        latest_snapshot_id: i64,
    ) -> Result<Option<i64>, DetectorError> {
        Ok(self
            .lock()
            .changes
            .iter()
            .find(|c| {
                c.page_id == page_id
                    && c.previous_snapshot_id == previous_snapshot_id
                    && c.latest_snapshot_id == latest_snapshot_id
            })
            .and_then(|c| c.id))
    }

    async fn changes_unanalyzed(&self, limit: u32) -> Result<Vec<PendingChange>, DetectorError> {
        let inner = self.lock();
        let analyzed: HashSet<i64> = inner.analyses.iter().map(|a| a.change_id).collect();
        Ok(inner
            .pending
            .iter()
            .rev()
            .filter(|c| !analyzed.contains(&c.change_id))
            .take(limit as usize)
            .cloned()
            .collect())
    }
}

#[async_trait::async_trait]
impl AnalysisStore for MemoryStore {
    async fn analysis_insert(&self, analysis: &Analysis) -> Result<i64, DetectorError> {
        let mut inner = self.lock();
        inner.next_analysis_id += 1;
        let id = inner.next_analysis_id;
        let mut stored = analysis.clone();
        stored.id = Some(id);
        inner.analyses.push(stored);
        Ok(id)
    }
}
