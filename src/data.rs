use sqlx::{Row, SqlitePool};

/// A SQLite table keyed by its `id` column.
#[async_trait::async_trait]
pub trait Table {
    type Record<'a>;

    fn get_name(&self) -> &str;
    fn get_pool(&self) -> &SqlitePool;

    async fn create(&self) -> Result<(), sqlx::Error>;

    /// Writes the record, replacing the non-key columns of an existing row.
    async fn upsert<'a>(&self, record: Self::Record<'a>) -> Result<(), sqlx::Error>;

    async fn count(&self) -> Result<u32, sqlx::Error> {
        let query = format!("SELECT COUNT(*) FROM {}", self.get_name());
        Ok(sqlx::query(&query)
            .fetch_one(self.get_pool())
            .await?
            .try_get(0)?)
    }
}
