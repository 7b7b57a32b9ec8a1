// Item Result Store Port - persistence behind the idempotent import executor

use crate::error::Result;
use async_trait::async_trait;
use serde::{Deserialize, Serialize};

/// Final outcome of the first attempt at an item
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "outcome", rename_all = "SCREAMING_SNAKE_CASE")]
pub enum CachedOutcome {
    Success { handle: String, bytes: Option<i64> },
    Failure { error: String, skipped: bool },
}

impl CachedOutcome {
    pub fn is_success(&self) -> bool {
        matches!(self, CachedOutcome::Success { .. })
    }
}

#[async_trait]
pub trait ItemResultStore: Send + Sync {
    /// All outcomes recorded for a job
    async fn load_results(&self, job_id: &str) -> Result<Vec<(String, CachedOutcome)>>;

    /// Insert-if-absent
    ///
    /// Returns the outcome that is persisted after the call: `outcome` when this
    /// call won, the earlier outcome otherwise.
    async fn record_result(
        &self,
        job_id: &str,
        key: &str,
        outcome: &CachedOutcome,
    ) -> Result<CachedOutcome>;
}
