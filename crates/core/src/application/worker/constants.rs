// Worker constants
use std::time::Duration;

/// Sleep between polls when no job is ready to transfer
pub const IDLE_SLEEP_DURATION: Duration = Duration::from_millis(500);

/// Sleep after a worker error before polling again
pub const ERROR_RECOVERY_SLEEP_DURATION: Duration = Duration::from_secs(1);

/// How often a running transfer re-reads its cancellation flag
pub const CANCEL_POLL_INTERVAL: Duration = Duration::from_secs(1);

/// Failure reason recorded when a transfer task panics
pub const PANIC_FAILURE_REASON: &str = "internal error";
