// Job Store Port (Interface)

use crate::domain::{JobState, PortabilityJob};
use crate::error::Result;
use async_trait::async_trait;

/// Durable persistence for portability jobs
///
/// Jobs are never mutated in place: every write goes through [`JobStore::update`],
/// which compares the persisted state with the caller's expectation.
#[async_trait]
pub trait JobStore: Send + Sync {
    /// Insert a new job
    ///
    /// # Errors
    /// - `AppError::Conflict` if a job with the same ID exists
    async fn create(&self, job: &PortabilityJob) -> Result<()>;

    /// Find job by ID
    async fn find(&self, id: &str) -> Result<Option<PortabilityJob>>;

    /// Compare-and-swap update
    ///
    /// Writes `job` only if the persisted state equals `expected_prior`.
    /// The `cancel_requested` flag is owned by [`JobStore::request_cancel`] and
    /// is not overwritten here.
    ///
    /// # Errors
    /// - `AppError::NotFound` if the job does not exist
    /// - `AppError::Conflict` if the persisted state differs from `expected_prior`
    async fn update(&self, job: &PortabilityJob, expected_prior: JobState) -> Result<()>;

    /// Find all jobs in a state (worker claiming + crash recovery)
    async fn find_by_state(&self, state: JobState) -> Result<Vec<PortabilityJob>>;

    /// Mark a job for cancellation
    ///
    /// Returns false when the job is already terminal.
    async fn request_cancel(&self, id: &str) -> Result<bool>;
}
