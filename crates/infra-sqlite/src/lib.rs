// Portability Infrastructure - SQLite Adapter
// Implements: JobStore, TemporaryPerJobDataStore, ItemResultStore

mod blob_store;
mod connection;
mod error;
mod item_results;
mod job_store;
mod migration;
mod store;

pub use connection::create_pool;
pub use migration::run_migrations;
pub use store::SqliteStore;

// Note: sqlx::Error conversion is handled by `error::map_sqlx_error`
// due to Rust's orphan rules (cannot implement From<sqlx::Error> for AppError here)
