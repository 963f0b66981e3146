use super::{MonitoredPage, NewSnapshot};
use crate::analysis::Analysis;
use crate::change::{DetectedChange, PendingChange};
use crate::snapshot::{PageType, Snapshot, SnapshotContent};
use crate::{utils, AnalysisStore, ChangeStore, DetectorError, SnapshotStore, Table};
use futures::TryStreamExt;
use serde::Serialize;
use sqlx::{
    sqlite::{SqliteConnectOptions, SqliteRow},
    Row, SqlitePool,
};

fn encode_json<T: Serialize>(value: &T) -> Result<String, sqlx::Error> {
    serde_json::to_string(value)
        .map_err(|e| sqlx::Error::Protocol(format!("cannot encode column: {}", e)))
}

pub struct MonitoredPageTable {
    name: String,
    pool: SqlitePool,
}

#[async_trait::async_trait]
impl Table for MonitoredPageTable {
    type Record = MonitoredPage;

    fn get_name(&self) -> &str {
        self.name.as_str()
    }

    fn get_pool(&self) -> &SqlitePool {
        &self.pool
    }

    async fn create(&self) -> Result<(), sqlx::Error> {
        if !utils::is_table_exists(self.get_pool(), &self.name).await? {
            tracing::debug!("Create table {}", self.name);
            let query = format!(
                "CREATE TABLE {} (
                    id INTEGER PRIMARY KEY,
                    page_type TEXT NOT NULL DEFAULT 'pricing',
                    url TEXT NOT NULL,
                    created_at DATETIME
                 )",
                &self.name
            );
            sqlx::query(query.as_str()).execute(self.get_pool()).await?;
        }
        Ok(())
    }

    async fn insert(&self, record: &Self::Record) -> Result<i64, sqlx::Error> {
        let query = format!(
            "INSERT INTO {} (id, page_type, url, created_at) VALUES (?, ?, ?, ?)",
            &self.name
        );
        let result = sqlx::query(&query)
            .bind(record.id)
            .bind(record.page_type.as_str())
            .bind(record.url.as_str())
            .bind(utils::get_now())
            .execute(self.get_pool())
            .await?;
        Ok(result.last_insert_rowid())
    }
}

pub struct SnapshotTable {
    name: String,
    pool: SqlitePool,
}

#[async_trait::async_trait]
impl Table for SnapshotTable {
    type Record = NewSnapshot;

    fn get_name(&self) -> &str {
        self.name.as_str()
    }

    fn get_pool(&self) -> &SqlitePool {
        &self.pool
    }

    async fn create(&self) -> Result<(), sqlx::Error> {
        if !utils::is_table_exists(self.get_pool(), &self.name).await? {
            tracing::debug!("Create table {}", self.name);
            let query = format!(
                r#"
                    CREATE TABLE {name} (
                        id INTEGER PRIMARY KEY AUTOINCREMENT,
                        monitored_page_id INTEGER NOT NULL,
                        price TEXT,
                        availability TEXT,
                        raw_data TEXT,
                        scraped_at DATETIME NOT NULL
                    );
                    CREATE INDEX idx_{name}_page_scraped ON {name} (monitored_page_id, scraped_at);
                "#,
                name = &self.name
            );
            sqlx::query(query.as_str()).execute(self.get_pool()).await?;
        }
        Ok(())
    }

    async fn insert(&self, record: &Self::Record) -> Result<i64, sqlx::Error> {
        let query = format!(
            "INSERT INTO {} (monitored_page_id, price, availability, raw_data, scraped_at) VALUES (?, ?, ?, ?, ?)",
            &self.name
        );
        let result = sqlx::query(&query)
            .bind(record.page_id)
            .bind(record.price.as_str())
            .bind(record.availability.as_str())
            .bind(record.raw_data.as_deref())
            .bind(record.scraped_at)
            .execute(self.get_pool())
            .await?;
        Ok(result.last_insert_rowid())
    }
}

pub struct DetectedChangeTable {
    name: String,
    pool: SqlitePool,
}

#[async_trait::async_trait]
impl Table for DetectedChangeTable {
    type Record = DetectedChange;

    fn get_name(&self) -> &str {
        self.name.as_str()
    }

    fn get_pool(&self) -> &SqlitePool {
        &self.pool
    }

    async fn create(&self) -> Result<(), sqlx::Error> {
        if !utils::is_table_exists(self.get_pool(), &self.name).await? {
            tracing::debug!("Create table {}", self.name);
            let query = format!(
                r#"
                    CREATE TABLE {name} (
                        id INTEGER PRIMARY KEY AUTOINCREMENT,
                        page_id INTEGER NOT NULL,
                        page_type TEXT,
                        previous_snapshot_id INTEGER,
                        latest_snapshot_id INTEGER,
                        old_price TEXT,
                        new_price TEXT,
                        change_percent REAL,
                        old_availability TEXT,
                        new_availability TEXT,
                        old_features TEXT,
                        new_features TEXT,
                        features_added TEXT,
                        features_removed TEXT,
                        old_text TEXT,
                        new_text TEXT,
                        change_type TEXT NOT NULL,
                        old_hash TEXT,
                        new_hash TEXT,
                        detected_at DATETIME NOT NULL,
                        raw_data TEXT
                    );
                    CREATE INDEX idx_{name}_pair ON {name} (page_id, previous_snapshot_id, latest_snapshot_id);
                "#,
                name = &self.name
            );
            sqlx::query(query.as_str()).execute(self.get_pool()).await?;
        }
        Ok(())
    }

    async fn insert(&self, record: &Self::Record) -> Result<i64, sqlx::Error> {
        let features_added = record.features_added.as_ref().map(encode_json).transpose()?;
        let features_removed = record.features_removed.as_ref().map(encode_json).transpose()?;

        let mut tx = self.get_pool().begin().await?;
        let query = format!(
            r#"INSERT INTO {} (
                page_id,
                page_type,
                previous_snapshot_id,
                latest_snapshot_id,
                old_price,
                new_price,
                change_percent,
                old_availability,
                new_availability,
                old_features,
                new_features,
                features_added,
                features_removed,
                old_text,
                new_text,
                change_type,
                old_hash,
                new_hash,
                detected_at,
                raw_data) VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?)"#,
            self.name
        );
        let result = sqlx::query(&query)
            .bind(record.page_id)
            .bind(record.page_type.as_str())
            .bind(record.previous_snapshot_id)
            .bind(record.latest_snapshot_id)
            .bind(record.old_price.as_deref())
            .bind(record.new_price.as_deref())
            .bind(record.change_percent)
            .bind(record.old_availability.as_str())
            .bind(record.new_availability.as_str())
            .bind(encode_json(&record.old_features)?)
            .bind(encode_json(&record.new_features)?)
            .bind(features_added)
            .bind(features_removed)
            .bind(record.old_text.as_str())
            .bind(record.new_text.as_str())
            .bind(record.change_type.to_string())
            .bind(record.old_hash.as_str())
            .bind(record.new_hash.as_str())
            .bind(record.detected_at)
            .bind(record.raw_data.to_string())
            .execute(&mut tx)
            .await?;
        tx.commit().await?;
        Ok(result.last_insert_rowid())
    }
}

pub struct AnalysisTable {
    name: String,
    pool: SqlitePool,
}

#[async_trait::async_trait]
impl Table for AnalysisTable {
    type Record = Analysis;

    fn get_name(&self) -> &str {
        self.name.as_str()
    }

    fn get_pool(&self) -> &SqlitePool {
        &self.pool
    }

    async fn create(&self) -> Result<(), sqlx::Error> {
        if !utils::is_table_exists(self.get_pool(), &self.name).await? {
            tracing::debug!("Create table {}", self.name);
            let query = format!(
                r#"
                    CREATE TABLE {name} (
                        id INTEGER PRIMARY KEY AUTOINCREMENT,
                        change_id INTEGER NOT NULL,
                        summary TEXT NOT NULL,
                        recommendation VARCHAR(500),
                        change_type TEXT,
                        page_type TEXT,
                        old_price TEXT,
                        new_price TEXT,
                        change_percent TEXT,
                        model TEXT,
                        created_at DATETIME NOT NULL
                    );
                    CREATE INDEX idx_{name}_change ON {name} (change_id);
                "#,
                name = &self.name
            );
            sqlx::query(query.as_str()).execute(self.get_pool()).await?;
        }
        Ok(())
    }

    async fn insert(&self, record: &Self::Record) -> Result<i64, sqlx::Error> {
        let mut tx = self.get_pool().begin().await?;
        let query = format!(
            r#"INSERT INTO {} (
                change_id,
                summary,
                recommendation,
                change_type,
                page_type,
                old_price,
                new_price,
                change_percent,
                model,
                created_at) VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?, ?)"#,
            self.name
        );
        let result = sqlx::query(&query)
            .bind(record.change_id)
            .bind(record.summary.as_str())
            .bind(record.recommendation.as_deref())
            .bind(record.change_type.as_str())
            .bind(record.page_type.as_str())
            .bind(record.old_price.as_deref())
            .bind(record.new_price.as_deref())
            .bind(record.change_percent.as_deref())
            .bind(record.model.as_str())
            .bind(record.created_at)
            .execute(&mut tx)
            .await?;
        tx.commit().await?;
        Ok(result.last_insert_rowid())
    }
}

pub struct SqliteData {
    pub pages: MonitoredPageTable,
    pub snapshots: SnapshotTable,
    pub changes: DetectedChangeTable,
    pub analyses: AnalysisTable,
    pool: SqlitePool,
}

impl SqliteData {
    /// Open (or create) the database file at `filename` and create any missing
    /// table.
    pub async fn open(filename: &str) -> Result<SqliteData, DetectorError> {
        let opt = SqliteConnectOptions::new()
            .filename(filename)
            .create_if_missing(true);
        let pool = SqlitePool::connect_with(opt).await?;
        let p = SqliteData {
            pages: MonitoredPageTable {
                name: "monitored_pages".to_string(),
                pool: pool.clone(),
            },
            snapshots: SnapshotTable {
                name: "snapshots".to_string(),
                pool: pool.clone(),
            },
            changes: DetectedChangeTable {
                name: "detected_changes".to_string(),
                pool: pool.clone(),
            },
            analyses: AnalysisTable {
                name: "ai_analysis".to_string(),
                pool: pool.clone(),
            },
            pool,
        };

        p.pages.create().await?;
        p.snapshots.create().await?;
        p.changes.create().await?;
        p.analyses.create().await?;

        Ok(p)
    }

    pub async fn close(&self) {
        self.pool.close().await;
    }
}

fn snapshot_from_row(row: &SqliteRow) -> Result<Snapshot, sqlx::Error> {
    let raw_data: Option<String> = row.try_get("raw_data")?;
    let (content, content_status) = SnapshotContent::parse(raw_data.as_deref());
    let page_type: Option<String> = row.try_get("page_type")?;
    let price: Option<String> = row.try_get("price")?;
    let availability: Option<String> = row.try_get("availability")?;

    Ok(Snapshot {
        id: row.try_get("id")?,
        page_id: row.try_get("monitored_page_id")?,
        page_type: page_type.as_deref().map(PageType::from).unwrap_or_default(),
        price: price.unwrap_or_default(),
        availability: availability.unwrap_or_default(),
        scraped_at: row.try_get("scraped_at")?,
        content,
        content_status,
    })
}

#[async_trait::async_trait]
impl SnapshotStore for SqliteData {
    async fn pages_with_history(&self, min_snapshots: u32) -> Result<Vec<i64>, DetectorError> {
        let query = format!(
            "SELECT monitored_page_id FROM {} GROUP BY monitored_page_id HAVING COUNT(*) >= ? ORDER BY monitored_page_id",
            self.snapshots.get_name()
        );
        let mut page_ids = vec![];
        let mut rows = sqlx::query(&query).bind(min_snapshots).fetch(&self.pool);
        while let Some(row) = rows.try_next().await? {
            page_ids.push(row.try_get("monitored_page_id")?);
        }
        Ok(page_ids)
    }

    async fn fetch_latest(&self, page_id: i64, limit: u32) -> Result<Vec<Snapshot>, DetectorError> {
        let query = format!(
            r#"SELECT s.id, s.monitored_page_id, s.price, s.availability, s.scraped_at, s.raw_data, m.page_type
               FROM {} s
               LEFT JOIN {} m ON s.monitored_page_id = m.id
               WHERE s.monitored_page_id = ?
               ORDER BY s.scraped_at DESC, s.id DESC
               LIMIT ?"#,
            self.snapshots.get_name(),
            self.pages.get_name()
        );
        let mut snapshots = vec![];
        let mut rows = sqlx::query(&query)
            .bind(page_id)
            .bind(limit)
            .fetch(&self.pool);
        while let Some(row) = rows.try_next().await? {
            snapshots.push(snapshot_from_row(&row)?);
        }
        Ok(snapshots)
    }
}

#[async_trait::async_trait]
impl ChangeStore for SqliteData {
    async fn change_insert(&self, change: &DetectedChange) -> Result<i64, DetectorError> {
        Ok(self.changes.insert(change).await?)
    }

    async fn change_for_pair(
        &self,
        page_id: i64,
        previous_snapshot_id: i64,
        latest_snapshot_id: i64,
    ) -> Result<Option<i64>, DetectorError> {
        let query = format!(
            "SELECT id FROM {} WHERE page_id = ? AND previous_snapshot_id = ? AND latest_snapshot_id = ? ORDER BY id LIMIT 1",
            self.changes.get_name()
        );
        let row = sqlx::query(&query)
            .bind(page_id)
            .bind(previous_snapshot_id)
            .bind(latest_snapshot_id)
            .fetch_optional(&self.pool)
            .await?;
        Ok(row.map(|row| row.try_get("id")).transpose()?)
    }

    async fn changes_unanalyzed(&self, limit: u32) -> Result<Vec<PendingChange>, DetectorError> {
        let query = format!(
            r#"SELECT dc.id, dc.page_id, dc.change_type, dc.page_type,
                      dc.old_price, dc.new_price, dc.change_percent,
                      dc.old_features, dc.new_features,
                      dc.old_text, dc.new_text
               FROM {} dc
               LEFT JOIN {} aa ON dc.id = aa.change_id
               WHERE aa.id IS NULL
               ORDER BY dc.detected_at DESC, dc.id DESC
               LIMIT ?"#,
            self.changes.get_name(),
            self.analyses.get_name()
        );
        let mut pending = vec![];
        for row in sqlx::query(&query).bind(limit).fetch_all(&self.pool).await? {
            let page_type: Option<String> = row.try_get("page_type")?;
            pending.push(PendingChange {
                change_id: row.try_get("id")?,
                page_id: row.try_get("page_id")?,
                change_type: row.try_get("change_type")?,
                page_type: page_type.unwrap_or_else(|| PageType::default().to_string()),
                old_price: row.try_get("old_price")?,
                new_price: row.try_get("new_price")?,
                change_percent: row.try_get("change_percent")?,
                old_features: row.try_get("old_features")?,
                new_features: row.try_get("new_features")?,
                old_text: row.try_get("old_text")?,
                new_text: row.try_get("new_text")?,
            });
        }
        Ok(pending)
    }
}

#[async_trait::async_trait]
impl AnalysisStore for SqliteData {
    async fn analysis_insert(&self, analysis: &Analysis) -> Result<i64, DetectorError> {
        Ok(self.analyses.insert(analysis).await?)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::analysis::{Analyzer, RuleBased};
    use crate::{Detection, Detector};
    use chrono::{Duration, TimeZone, Utc};
    use pretty_assertions::assert_eq;
    use serde_json::json;
    use std::path::Path;
    use tokio::fs;

    async fn fresh(path: &str) -> SqliteData {
        if Path::new(path).is_file() {
            fs::remove_file(path).await.unwrap();
        }
        SqliteData::open(path).await.unwrap()
    }

    fn snapshot(page_id: i64, minutes: i64, raw_data: Option<&str>) -> NewSnapshot {
        NewSnapshot {
            page_id,
            price: String::new(),
            availability: "in stock".to_string(),
            scraped_at: Utc.with_ymd_and_hms(2024, 3, 1, 12, 0, 0).unwrap()
                + Duration::minutes(minutes),
            raw_data: raw_data.map(ToString::to_string),
        }
    }

    #[test]
    fn list_columns_are_json_text() {
        assert_eq!(encode_json(&vec!["sso", "sla"]).unwrap(), r#"["sso","sla"]"#);
        assert_eq!(encode_json(&Vec::<String>::new()).unwrap(), "[]");
    }

    #[tokio::test]
    async fn create_new_file() {
        if Path::new("test_open.db").is_file() {
            fs::remove_file("test_open.db").await.unwrap();
        }

        assert!(!Path::new("test_open.db").is_file());
        let p = SqliteData::open("test_open.db").await.unwrap();
        assert!(Path::new("test_open.db").is_file());
        assert_eq!(p.snapshots.count().await.unwrap(), 0);
        p.close().await;

        // Reopening keeps existing tables.
        let p = SqliteData::open("test_open.db").await.unwrap();
        p.close().await;

        fs::remove_file("test_open.db").await.unwrap();
    }

    #[tokio::test]
    async fn fetch_latest_orders_and_parses() {
        let p = fresh("test_fetch.db").await;
        p.pages
            .insert(&MonitoredPage {
                id: 5,
                page_type: PageType::Features,
                url: "https://example.com/features".into(),
            })
            .await
            .unwrap();

        let first = p.snapshots.insert(&snapshot(5, 0, Some(r#"{"features":["sso"]}"#))).await.unwrap();
        let third = p
            .snapshots
            .insert(&snapshot(5, 20, Some(r#""{\"features\":[\"sso\",\"sla\"]}""#)))
            .await
            .unwrap();
        let second = p.snapshots.insert(&snapshot(5, 10, Some("not json"))).await.unwrap();
        p.snapshots.insert(&snapshot(6, 0, None)).await.unwrap();

        let latest = p.fetch_latest(5, 2).await.unwrap();
        assert_eq!(latest.iter().map(|s| s.id).collect::<Vec<_>>(), vec![third, second]);
        assert_eq!(latest[0].page_type, PageType::Features);
        assert_eq!(latest[0].content.features, vec!["sso".to_string(), "sla".to_string()]);
        assert_eq!(latest[0].content_status, crate::ContentStatus::Parsed);
        assert_eq!(latest[1].content_status, crate::ContentStatus::Malformed);
        assert_eq!(latest[1].availability, "in stock");

        let all = p.fetch_latest(5, 10).await.unwrap();
        assert_eq!(all.len(), 3);
        assert_eq!(all[2].id, first);

        // Page 6 has no monitored_pages row.
        let orphan = p.fetch_latest(6, 2).await.unwrap();
        assert_eq!(orphan.len(), 1);
        assert_eq!(orphan[0].page_type, PageType::Pricing);
        assert_eq!(orphan[0].content_status, crate::ContentStatus::Missing);

        assert_eq!(p.pages_with_history(2).await.unwrap(), vec![5]);
        assert_eq!(p.pages_with_history(1).await.unwrap(), vec![5, 6]);

        p.close().await;
        fs::remove_file("test_fetch.db").await.unwrap();
    }

    #[tokio::test]
    async fn detect_then_analyze() {
        let p = fresh("test_pipeline.db").await;
        p.pages
            .insert(&MonitoredPage {
                id: 1,
                page_type: PageType::Pricing,
                url: "https://example.com/pricing".into(),
            })
            .await
            .unwrap();
        p.snapshots
            .insert(&snapshot(1, 0, Some(&json!({"price": "$49.99"}).to_string())))
            .await
            .unwrap();
        p.snapshots
            .insert(&snapshot(1, 5, Some(&json!({"price": "$59.99"}).to_string())))
            .await
            .unwrap();

        let detector = Detector::new(p);
        let Detection::Changed(change) = detector.detect_changes(1).await.unwrap() else {
            panic!("expected a change");
        };
        assert_eq!(change.change_type.to_string(), "price_increase");
        let p = detector.store();
        assert_eq!(p.changes.count().await.unwrap(), 1);
        assert_eq!(p.change_for_pair(1, 1, 2).await.unwrap(), change.id);
        assert_eq!(p.change_for_pair(1, 2, 1).await.unwrap(), None);

        assert_eq!(
            detector.detect_changes(1).await.unwrap(),
            Detection::AlreadyRecorded {
                change_id: change.id.unwrap()
            }
        );
        assert_eq!(p.changes.count().await.unwrap(), 1);

        let pending = p.changes_unanalyzed(10).await.unwrap();
        assert_eq!(pending.len(), 1);
        assert_eq!(pending[0].change_id, change.id.unwrap());
        assert_eq!(pending[0].change_type, "price_increase");
        assert_eq!(pending[0].old_price.as_deref(), Some("49.99"));
        assert_eq!(pending[0].old_features.as_deref(), Some("[]"));

        let analyzer = Analyzer::new(p, None::<RuleBased>);
        assert_eq!(analyzer.run_analysis(10).await.unwrap(), 1);
        assert_eq!(p.analyses.count().await.unwrap(), 1);
        assert!(p.changes_unanalyzed(10).await.unwrap().is_empty());
        assert_eq!(analyzer.run_analysis(10).await.unwrap(), 0);

        // Dropping the analysis makes the change pending again.
        sqlx::query("DELETE FROM ai_analysis WHERE id = 1")
            .execute(&p.pool)
            .await
            .unwrap();
        assert_eq!(p.changes_unanalyzed(10).await.unwrap().len(), 1);

        p.close().await;
        fs::remove_file("test_pipeline.db").await.unwrap();
    }

    #[tokio::test]
    async fn unanalyzed_is_most_recent_first() {
        let p = fresh("test_pending.db").await;
        for page_id in 1..=3 {
            p.snapshots.insert(&snapshot(page_id, 0, Some(r#"{"price":"$1"}"#))).await.unwrap();
            p.snapshots.insert(&snapshot(page_id, page_id, Some(r#"{"price":"$2"}"#))).await.unwrap();
        }
        let detector = Detector::new(p);
        assert_eq!(detector.run_for_all_pages().await.unwrap(), 3);

        let p = detector.store();
        let pending = p.changes_unanalyzed(2).await.unwrap();
        assert_eq!(pending.len(), 2);
        assert!(pending[0].change_id > pending[1].change_id);

        p.close().await;
        fs::remove_file("test_pending.db").await.unwrap();
    }
}
