// SQLite TemporaryPerJobDataStore Implementation

use crate::error::map_sqlx_error;
use crate::store::SqliteStore;
use async_trait::async_trait;
use portability_core::error::{AppError, Result};
use portability_core::port::TemporaryPerJobDataStore;
use tokio::io::{AsyncRead, AsyncReadExt};
use tracing::debug;

#[async_trait]
impl TemporaryPerJobDataStore for SqliteStore {
    async fn put_blob_from_stream(
        &self,
        job_id: &str,
        key: &str,
        stream: &mut (dyn AsyncRead + Send + Unpin),
    ) -> Result<u64> {
        let mut data = Vec::new();
        let size = stream.read_to_end(&mut data).await? as u64;

        sqlx::query(
            r#"
            INSERT INTO job_blobs (job_id, blob_key, data, created_at)
            VALUES (?, ?, ?, ?)
            ON CONFLICT (job_id, blob_key) DO UPDATE SET
                data = excluded.data,
                created_at = excluded.created_at
            "#,
        )
        .bind(job_id)
        .bind(key)
        .bind(data)
        .bind(self.time_provider.now_millis())
        .execute(&self.pool)
        .await
        .map_err(map_sqlx_error)?;

        debug!(job_id = %job_id, key = %key, size = size, "Staged blob");
        Ok(size)
    }

    async fn get_blob(&self, job_id: &str, key: &str) -> Result<Vec<u8>> {
        sqlx::query_scalar::<_, Vec<u8>>(
            "SELECT data FROM job_blobs WHERE job_id = ? AND blob_key = ?",
        )
        .bind(job_id)
        .bind(key)
        .fetch_optional(&self.pool)
        .await
        .map_err(map_sqlx_error)?
        .ok_or_else(|| AppError::NotFound(format!("Blob {}/{} not found", job_id, key)))
    }

    async fn remove_blob(&self, job_id: &str, key: &str) -> Result<()> {
        sqlx::query("DELETE FROM job_blobs WHERE job_id = ? AND blob_key = ?")
            .bind(job_id)
            .bind(key)
            .execute(&self.pool)
            .await
            .map_err(map_sqlx_error)?;
        Ok(())
    }
}
