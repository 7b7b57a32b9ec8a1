// SQLite ItemResultStore Implementation

use crate::error::map_sqlx_error;
use crate::store::SqliteStore;
use async_trait::async_trait;
use portability_core::error::Result;
use portability_core::port::{CachedOutcome, ItemResultStore};

#[async_trait]
impl ItemResultStore for SqliteStore {
    async fn load_results(&self, job_id: &str) -> Result<Vec<(String, CachedOutcome)>> {
        let rows: Vec<(String, String)> = sqlx::query_as(
            "SELECT item_key, outcome FROM item_results WHERE job_id = ? ORDER BY item_key ASC",
        )
        .bind(job_id)
        .fetch_all(&self.pool)
        .await
        .map_err(map_sqlx_error)?;

        rows.into_iter()
            .map(|(key, outcome)| -> Result<(String, CachedOutcome)> {
                Ok((key, serde_json::from_str(&outcome)?))
            })
            .collect()
    }

    async fn record_result(
        &self,
        job_id: &str,
        key: &str,
        outcome: &CachedOutcome,
    ) -> Result<CachedOutcome> {
        // Insert-if-absent, then read back whichever outcome won
        sqlx::query(
            r#"
            INSERT INTO item_results (job_id, item_key, outcome, recorded_at)
            VALUES (?, ?, ?, ?)
            ON CONFLICT (job_id, item_key) DO NOTHING
            "#,
        )
        .bind(job_id)
        .bind(key)
        .bind(serde_json::to_string(outcome)?)
        .bind(self.time_provider.now_millis())
        .execute(&self.pool)
        .await
        .map_err(map_sqlx_error)?;

        let stored: String = sqlx::query_scalar(
            "SELECT outcome FROM item_results WHERE job_id = ? AND item_key = ?",
        )
        .bind(job_id)
        .bind(key)
        .fetch_one(&self.pool)
        .await
        .map_err(map_sqlx_error)?;

        Ok(serde_json::from_str(&stored)?)
    }
}
