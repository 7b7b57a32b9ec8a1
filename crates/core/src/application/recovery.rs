// Crash recovery - resumes transfers interrupted by a daemon restart
use crate::application::worker::Worker;
use crate::domain::JobState;
use crate::port::JobStore;
use std::sync::Arc;
use tracing::{error, info};

/// On daemon startup, finishes jobs that were TRANSFER_IN_PROGRESS when the
/// previous process stopped.
///
/// Items already recorded in the item result store are not attempted again,
/// so a resumed job only imports what the crashed run never reached.
///
/// Interrupted jobs are resumed without a fresh claim, so only one daemon
/// may use a given database. A second daemon started on the same file would
/// resume the same jobs, and the final compare-and-swap is all that keeps
/// one of the two runs from finishing the job.
pub struct RecoveryService {
    jobs: Arc<dyn JobStore>,
    worker: Arc<Worker>,
}

impl RecoveryService {
    pub fn new(jobs: Arc<dyn JobStore>, worker: Arc<Worker>) -> Self {
        Self { jobs, worker }
    }

    /// Resume every interrupted job, one at a time
    ///
    /// # Returns
    /// Number of jobs resumed
    pub async fn resume_interrupted_jobs(&self) -> crate::error::Result<usize> {
        let interrupted = self.jobs.find_by_state(JobState::TransferInProgress).await?;
        if interrupted.is_empty() {
            return Ok(0);
        }
        info!(count = interrupted.len(), "Resuming interrupted transfers");

        let mut resumed = 0;
        for job in interrupted {
            let job_id = job.id.clone();
            info!(job_id = %job_id, cancel_requested = job.cancel_requested, "Resuming transfer");
            match self.worker.execute(job).await {
                Ok(()) => resumed += 1,
                Err(e) => error!(job_id = %job_id, error = %e, "Failed to resume transfer"),
            }
        }

        info!(resumed = resumed, "Interrupted transfer recovery complete");
        Ok(resumed)
    }
}
