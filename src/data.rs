use sqlx::{Row, SqlitePool};

/// One SQLite table backing a store.
#[async_trait::async_trait]
pub trait Table {
    type Record: Sync;

    fn get_name(&self) -> &str;
    fn get_pool(&self) -> &SqlitePool;

    async fn create(&self) -> Result<(), sqlx::Error>;

    /// Insert a record and return its row id.
    async fn insert(&self, record: &Self::Record) -> Result<i64, sqlx::Error>;

    async fn count(&self) -> Result<u32, sqlx::Error> {
        let query = format!("SELECT COUNT(*) FROM {}", self.get_name());
        Ok(sqlx::query(&query)
            .fetch_one(self.get_pool())
            .await?
            .try_get(0)?)
    }
}
