// Temporary per-job blob storage used by adapters to stage media

use crate::error::Result;
use async_trait::async_trait;
use tokio::io::AsyncRead;

#[async_trait]
pub trait TemporaryPerJobDataStore: Send + Sync {
    /// Drain `stream` into a blob stored under (`job_id`, `key`)
    ///
    /// Returns the number of bytes written. An existing blob is replaced.
    async fn put_blob_from_stream(
        &self,
        job_id: &str,
        key: &str,
        stream: &mut (dyn AsyncRead + Send + Unpin),
    ) -> Result<u64>;

    /// # Errors
    /// - `AppError::NotFound` if no blob is stored under the key
    async fn get_blob(&self, job_id: &str, key: &str) -> Result<Vec<u8>>;

    /// Remove a blob (missing blobs are not an error)
    async fn remove_blob(&self, job_id: &str, key: &str) -> Result<()>;
}
