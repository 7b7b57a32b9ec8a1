// Application Layer - Use Cases and Business Logic

pub mod callback;
pub mod executor;
pub mod lifecycle;
pub mod pipeline;
pub mod recovery;
pub mod registry;
pub mod retry;
pub mod signal;
pub mod worker;

// Re-exports
pub use callback::{CallbackOutcome, CallbackRequest, OauthCallbackHandler};
pub use executor::{ExecutionReport, ImportExecutor, ItemImportResult, ItemOutcome};
pub use lifecycle::{AuthorizationRequest, JobLifecycleService, JobStatus};
pub use pipeline::{TransferPipeline, TransferSummary};
pub use recovery::RecoveryService;
pub use registry::{ExtensionContext, ExtensionFactory, ExtensionRegistry, ProviderBindings};
pub use retry::{RetryStrategy, RetryStrategyLibrary};
pub use signal::{signal_channel, CancelToken, ShutdownToken, SignalSender, SignalToken};
pub use worker::Worker;
