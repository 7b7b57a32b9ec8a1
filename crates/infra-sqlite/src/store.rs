// SQLite store shared by the job, blob and item result adapters

use portability_core::port::TimeProvider;
use sqlx::SqlitePool;
use std::sync::Arc;

/// Implements `JobStore`, `TemporaryPerJobDataStore` and `ItemResultStore`
/// over one pool
pub struct SqliteStore {
    pub(crate) pool: SqlitePool,
    pub(crate) time_provider: Arc<dyn TimeProvider>,
}

impl SqliteStore {
    pub fn new(pool: SqlitePool, time_provider: Arc<dyn TimeProvider>) -> Self {
        Self {
            pool,
            time_provider,
        }
    }

    pub fn pool(&self) -> &SqlitePool {
        &self.pool
    }
}
