// Port Layer - Interfaces for external dependencies

pub mod app_credentials;
pub mod id_provider; // For deterministic testing
pub mod item_result_store;
pub mod job_store;
pub mod mocks;
pub mod provider;
pub mod temp_store;
pub mod time_provider;

// Re-exports
pub use app_credentials::{AppCredentialStore, AppCredentials};
pub use id_provider::IdProvider;
pub use item_result_store::{CachedOutcome, ItemResultStore};
pub use job_store::JobStore;
pub use provider::{AuthDataGenerator, ExportResult, Exporter, ImportResult, Importer};
pub use temp_store::TemporaryPerJobDataStore;
pub use time_provider::TimeProvider;
