// Idempotent Import Executor
//
// Per-job cache of attempted item keys. The first attempt at a key runs the
// provider call (with retries), records the outcome durably and is final;
// every later call for the key, concurrent or after a restart, reuses it.

use crate::application::retry::RetryStrategyLibrary;
use crate::application::signal::CancelToken;
use crate::domain::{ImportableItem, TransferError};
use crate::error::{AppError, Result};
use crate::port::{CachedOutcome, ItemResultStore};
use std::collections::HashMap;
use std::future::Future;
use std::sync::atomic::{AtomicBool, AtomicI64, Ordering};
use std::sync::{Arc, Mutex, MutexGuard};
use std::time::Duration;
use tokio::sync::OnceCell;
use tracing::{debug, error, info, warn};

/// Result of a single provider call for one item
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ItemImportResult {
    Success { handle: String, bytes: Option<i64> },
    Error(TransferError),
}

impl ItemImportResult {
    pub fn success(handle: impl Into<String>, bytes: Option<i64>) -> Self {
        Self::Success {
            handle: handle.into(),
            bytes,
        }
    }

    pub fn error(error: TransferError) -> Self {
        Self::Error(error)
    }

    pub fn is_success(&self) -> bool {
        matches!(self, Self::Success { .. })
    }
}

/// What happened to an item handed to [`ImportExecutor::import_and_swallow`]
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ItemOutcome {
    /// This call imported the item
    Imported { handle: String, bytes: Option<i64> },
    /// Retries exhausted under a skip-capable strategy; the job continues
    Skipped { error: String },
    /// Failed without a skip-capable strategy; the job ends in ERROR
    Failed { error: String },
    /// An earlier or concurrent call already attempted the item
    AlreadyAttempted(CachedOutcome),
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ItemFailure {
    pub key: String,
    pub description: String,
    pub error: String,
}

/// Summary of everything the executor recorded for its job
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ExecutionReport {
    pub bytes_transferred: i64,
    pub skipped: Vec<ItemFailure>,
    pub fatal: Vec<ItemFailure>,
}

pub struct ImportExecutor {
    job_id: String,
    store: Arc<dyn ItemResultStore>,
    retry_library: Arc<RetryStrategyLibrary>,
    cancel: CancelToken,
    cells: Mutex<HashMap<String, Arc<OnceCell<CachedOutcome>>>>,
    bytes: AtomicI64,
    skipped: Mutex<Vec<ItemFailure>>,
    fatal: Mutex<Vec<ItemFailure>>,
}

fn lock<T>(mutex: &Mutex<T>) -> MutexGuard<'_, T> {
    mutex.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
}

impl ImportExecutor {
    /// Executor with an empty cache
    pub fn new(
        job_id: impl Into<String>,
        store: Arc<dyn ItemResultStore>,
        retry_library: Arc<RetryStrategyLibrary>,
        cancel: CancelToken,
    ) -> Self {
        Self {
            job_id: job_id.into(),
            store,
            retry_library,
            cancel,
            cells: Mutex::new(HashMap::new()),
            bytes: AtomicI64::new(0),
            skipped: Mutex::new(Vec::new()),
            fatal: Mutex::new(Vec::new()),
        }
    }

    /// Executor warmed with every outcome already persisted for the job
    ///
    /// Restores the byte total and failure lists so that a resumed job reports
    /// the same totals as an uninterrupted one.
    pub async fn load(
        job_id: impl Into<String>,
        store: Arc<dyn ItemResultStore>,
        retry_library: Arc<RetryStrategyLibrary>,
        cancel: CancelToken,
    ) -> Result<Self> {
        let executor = Self::new(job_id, store, retry_library, cancel);
        let recorded = executor.store.load_results(&executor.job_id).await?;
        let restored = recorded.len();
        {
            let mut cells = lock(&executor.cells);
            for (key, outcome) in recorded {
                executor.account(&key, &key, &outcome);
                cells.insert(key, Arc::new(OnceCell::new_with(Some(outcome))));
            }
        }
        if restored > 0 {
            info!(
                job_id = %executor.job_id,
                restored = restored,
                bytes = executor.bytes_transferred(),
                "Restored item results"
            );
        }
        Ok(executor)
    }

    pub fn job_id(&self) -> &str {
        &self.job_id
    }

    /// Run `producer` once for `key` and cache its value
    ///
    /// Returns `Ok(None)` when the failure was skipped.
    ///
    /// # Errors
    /// - `AppError::Transfer` when the failure is fatal (now or on the first attempt)
    /// - `AppError::Cancelled` when the job is cancelled before the first attempt
    pub async fn execute_and_swallow<F, Fut>(
        &self,
        key: &str,
        description: &str,
        producer: F,
    ) -> Result<Option<String>>
    where
        F: Fn() -> Fut + Send + Sync,
        Fut: Future<Output = std::result::Result<String, TransferError>> + Send,
    {
        let attempt = || {
            let fut = producer();
            async move {
                match fut.await {
                    Ok(value) => ItemImportResult::success(value, None),
                    Err(e) => ItemImportResult::error(e),
                }
            }
        };
        let (outcome, _) = self.attempt_once(key, description, attempt).await?;
        match outcome {
            CachedOutcome::Success { handle, .. } => Ok(Some(handle)),
            CachedOutcome::Failure { skipped: true, .. } => Ok(None),
            CachedOutcome::Failure { error, .. } => Err(TransferError::Fatal(error).into()),
        }
    }

    /// Import `item` once, retrying per the strategy library
    ///
    /// Per-item failures are returned as [`ItemOutcome`] values. `Err` is
    /// reserved for cancellation and result-store failures.
    pub async fn import_and_swallow<I, F, Fut>(&self, item: &I, import_fn: F) -> Result<ItemOutcome>
    where
        I: ImportableItem + Sync + ?Sized,
        F: Fn() -> Fut + Send + Sync,
        Fut: Future<Output = ItemImportResult> + Send,
    {
        let key = item.id_key();
        let description = item.display_name();
        let (outcome, ran) = self.attempt_once(&key, &description, import_fn).await?;

        if !ran {
            debug!(job_id = %self.job_id, key = %key, "Item already attempted");
            return Ok(ItemOutcome::AlreadyAttempted(outcome));
        }
        Ok(match outcome {
            CachedOutcome::Success { handle, bytes } => ItemOutcome::Imported { handle, bytes },
            CachedOutcome::Failure { error, skipped: true } => ItemOutcome::Skipped { error },
            CachedOutcome::Failure { error, .. } => ItemOutcome::Failed { error },
        })
    }

    /// Value cached by a successful `execute_and_swallow`
    ///
    /// # Errors
    /// - `AppError::NotFound` if `key` never succeeded
    pub fn get_cached_value(&self, key: &str) -> Result<String> {
        match lock(&self.cells).get(key).and_then(|cell| cell.get()) {
            Some(CachedOutcome::Success { handle, .. }) => Ok(handle.clone()),
            _ => Err(AppError::NotFound(format!(
                "No cached value for key {} in job {}",
                key, self.job_id
            ))),
        }
    }

    pub fn is_key_cached(&self, key: &str) -> bool {
        lock(&self.cells)
            .get(key)
            .map(|cell| cell.initialized())
            .unwrap_or(false)
    }

    pub fn bytes_transferred(&self) -> i64 {
        self.bytes.load(Ordering::SeqCst)
    }

    pub fn has_fatal_failure(&self) -> bool {
        !lock(&self.fatal).is_empty()
    }

    pub fn report(&self) -> ExecutionReport {
        ExecutionReport {
            bytes_transferred: self.bytes_transferred(),
            skipped: lock(&self.skipped).clone(),
            fatal: lock(&self.fatal).clone(),
        }
    }

    fn cell(&self, key: &str) -> Arc<OnceCell<CachedOutcome>> {
        Arc::clone(lock(&self.cells).entry(key.to_string()).or_default())
    }

    /// First attempt wins: returns the cached outcome and whether this call produced it
    async fn attempt_once<F, Fut>(
        &self,
        key: &str,
        description: &str,
        attempt: F,
    ) -> Result<(CachedOutcome, bool)>
    where
        F: Fn() -> Fut + Send + Sync,
        Fut: Future<Output = ItemImportResult> + Send,
    {
        let cell = self.cell(key);
        let ran = AtomicBool::new(false);

        let outcome = cell
            .get_or_try_init(|| async {
                if self.cancel.is_raised() {
                    info!(job_id = %self.job_id, key = %key, "Job cancelled, not starting item");
                    return Err(AppError::Cancelled(self.job_id.clone()));
                }
                ran.store(true, Ordering::SeqCst);
                let outcome = self.run_with_retries(key, description, &attempt).await;
                let winner = self.store.record_result(&self.job_id, key, &outcome).await?;
                self.account(key, description, &winner);
                Ok::<_, AppError>(winner)
            })
            .await?
            .clone();

        Ok((outcome, ran.load(Ordering::SeqCst)))
    }

    async fn run_with_retries<F, Fut>(&self, key: &str, description: &str, attempt: &F) -> CachedOutcome
    where
        F: Fn() -> Fut + Send + Sync,
        Fut: Future<Output = ItemImportResult> + Send,
    {
        let mut tries: u32 = 0;
        loop {
            let err = match attempt().await {
                ItemImportResult::Success { handle, bytes } => {
                    return CachedOutcome::Success { handle, bytes }
                }
                ItemImportResult::Error(err) => err,
            };
            tries += 1;

            if err.is_fatal() {
                return CachedOutcome::Failure {
                    error: err.to_string(),
                    skipped: false,
                };
            }

            let strategy = self.retry_library.strategy_for(&err);
            if strategy.can_try_again(tries) {
                let wait = strategy.next_interval_millis(tries);
                debug!(
                    job_id = %self.job_id,
                    key = %key,
                    attempt = tries,
                    wait_ms = wait,
                    strategy = %strategy,
                    error = %err,
                    "Retrying item"
                );
                if wait > 0 {
                    tokio::time::sleep(Duration::from_millis(wait as u64)).await;
                }
                continue;
            }

            debug!(
                job_id = %self.job_id,
                key = %key,
                description = %description,
                attempts = tries,
                strategy = %strategy,
                "Retries exhausted"
            );
            return CachedOutcome::Failure {
                error: err.to_string(),
                skipped: strategy.can_skip(),
            };
        }
    }

    fn account(&self, key: &str, description: &str, outcome: &CachedOutcome) {
        match outcome {
            CachedOutcome::Success { bytes, .. } => {
                if let Some(bytes) = bytes {
                    self.bytes.fetch_add(*bytes, Ordering::SeqCst);
                }
            }
            CachedOutcome::Failure { error, skipped } => {
                let failure = ItemFailure {
                    key: key.to_string(),
                    description: description.to_string(),
                    error: error.clone(),
                };
                if *skipped {
                    warn!(job_id = %self.job_id, key = %key, error = %error, "Skipping item");
                    lock(&self.skipped).push(failure);
                } else {
                    error!(job_id = %self.job_id, key = %key, error = %error, "Item failed");
                    lock(&self.fatal).push(failure);
                }
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::application::retry::{RetryMapping, RetryStrategy};
    use crate::application::signal::{signal_channel, SignalToken};
    use crate::domain::PhotoModel;
    use crate::port::mocks::InMemoryStore;
    use std::sync::atomic::AtomicUsize;

    fn photo(id: &str) -> PhotoModel {
        PhotoModel {
            data_id: id.to_string(),
            album_id: None,
            title: format!("Photo {}", id),
            description: None,
            media_type: "image/jpeg".to_string(),
            fetchable_url: format!("https://example.com/{}", id),
            in_temp_store: false,
        }
    }

    fn executor_with(store: Arc<InMemoryStore>, strategy: RetryStrategy) -> ImportExecutor {
        ImportExecutor::new(
            "job-1",
            store,
            Arc::new(RetryStrategyLibrary::uniform(strategy)),
            SignalToken::never(),
        )
    }

    fn executor(strategy: RetryStrategy) -> ImportExecutor {
        executor_with(Arc::new(InMemoryStore::new()), strategy)
    }

    #[tokio::test]
    async fn test_producer_runs_once_sequentially() {
        let executor = executor(RetryStrategy::Skip);
        let calls = AtomicUsize::new(0);
        let producer = || async {
            calls.fetch_add(1, Ordering::SeqCst);
            Ok("album-name".to_string())
        };

        let first = executor.execute_and_swallow("album:1", "Album", producer).await.unwrap();
        let second = executor.execute_and_swallow("album:1", "Album", producer).await.unwrap();

        assert_eq!(first.as_deref(), Some("album-name"));
        assert_eq!(second, first);
        assert_eq!(calls.load(Ordering::SeqCst), 1);
        assert_eq!(executor.get_cached_value("album:1").unwrap(), "album-name");
    }

    #[tokio::test]
    async fn test_concurrent_calls_share_first_attempt() {
        let executor = executor(RetryStrategy::Skip);
        let calls = AtomicUsize::new(0);
        let item = photo("p1");
        let import = || async {
            calls.fetch_add(1, Ordering::SeqCst);
            tokio::time::sleep(Duration::from_millis(20)).await;
            ItemImportResult::success("h1", Some(5))
        };

        let (a, b) = tokio::join!(
            executor.import_and_swallow(&item, import),
            executor.import_and_swallow(&item, import)
        );
        let outcomes = [a.unwrap(), b.unwrap()];

        assert_eq!(calls.load(Ordering::SeqCst), 1);
        assert!(outcomes.contains(&ItemOutcome::Imported {
            handle: "h1".into(),
            bytes: Some(5)
        }));
        assert!(outcomes.iter().any(|o| matches!(o, ItemOutcome::AlreadyAttempted(c) if c.is_success())));
        assert_eq!(executor.bytes_transferred(), 5);
    }

    #[tokio::test]
    async fn test_bytes_accumulate_only_successes() {
        let executor = executor(RetryStrategy::Skip);
        let items = vec![(photo("a"), 10), (photo("b"), 20), (photo("c"), 30)];

        let imports = items.iter().map(|(item, size)| {
            let executor = &executor;
            async move {
                executor
                    .import_and_swallow(item, || async move {
                        if item.data_id == "b" {
                            ItemImportResult::error(TransferError::provider("upload rejected"))
                        } else {
                            ItemImportResult::success(item.data_id.clone(), Some(*size))
                        }
                    })
                    .await
            }
        });
        let outcomes = futures::future::join_all(imports).await;

        assert!(outcomes.iter().all(|o| o.is_ok()));
        assert_eq!(executor.bytes_transferred(), 40);
        let report = executor.report();
        assert_eq!(report.skipped.len(), 1);
        assert_eq!(report.skipped[0].key, "photo:b");
        assert!(report.fatal.is_empty());
    }

    #[tokio::test]
    async fn test_transient_failure_is_retried() {
        let executor = executor(RetryStrategy::uniform_retry_skip(3, 1, "flaky").unwrap());
        let calls = AtomicUsize::new(0);
        let item = photo("p1");

        let outcome = executor
            .import_and_swallow(&item, || async {
                if calls.fetch_add(1, Ordering::SeqCst) < 2 {
                    ItemImportResult::error(TransferError::provider("timeout"))
                } else {
                    ItemImportResult::success("h", Some(7))
                }
            })
            .await
            .unwrap();

        assert_eq!(outcome, ItemOutcome::Imported { handle: "h".into(), bytes: Some(7) });
        assert_eq!(calls.load(Ordering::SeqCst), 3);
    }

    #[tokio::test]
    async fn test_exhausted_retries_without_skip_escalate() {
        let executor = executor(RetryStrategy::uniform(2, 1, "strict").unwrap());
        let calls = AtomicUsize::new(0);
        let item = photo("p1");

        let outcome = executor
            .import_and_swallow(&item, || async {
                calls.fetch_add(1, Ordering::SeqCst);
                ItemImportResult::error(TransferError::provider("500 internal"))
            })
            .await
            .unwrap();

        assert!(matches!(outcome, ItemOutcome::Failed { .. }));
        // initial attempt + 2 retries
        assert_eq!(calls.load(Ordering::SeqCst), 3);
        assert!(executor.has_fatal_failure());
    }

    #[tokio::test]
    async fn test_fatal_error_is_not_retried() {
        let executor = executor(RetryStrategy::uniform_retry_skip(5, 1, "x").unwrap());
        let calls = AtomicUsize::new(0);

        let result = executor
            .execute_and_swallow("album:1", "Album", || async {
                calls.fetch_add(1, Ordering::SeqCst);
                Err(TransferError::DestinationFull("quota".into()))
            })
            .await;

        assert!(matches!(result, Err(AppError::Transfer(_))));
        assert_eq!(calls.load(Ordering::SeqCst), 1);
        assert!(matches!(
            executor.get_cached_value("album:1"),
            Err(AppError::NotFound(_))
        ));
    }

    #[tokio::test]
    async fn test_skipped_producer_yields_none() {
        let library = RetryStrategyLibrary::new(
            vec![RetryMapping {
                patterns: vec!["not found".into()],
                strategy: RetryStrategy::Skip,
            }],
            RetryStrategy::NoRetry,
        );
        let executor = ImportExecutor::new(
            "job-1",
            Arc::new(InMemoryStore::new()),
            Arc::new(library),
            SignalToken::never(),
        );

        let value = executor
            .execute_and_swallow("album:9", "Album", || async {
                Err(TransferError::provider("album not found"))
            })
            .await
            .unwrap();
        assert_eq!(value, None);
        assert!(executor.is_key_cached("album:9"));
    }

    #[test]
    fn test_get_cached_value_unknown_key() {
        let executor = executor(RetryStrategy::Skip);
        assert!(matches!(
            executor.get_cached_value("missing"),
            Err(AppError::NotFound(_))
        ));
    }

    #[tokio::test]
    async fn test_cancellation_blocks_new_items_only() {
        let (cancel, token) = signal_channel();
        let executor = ImportExecutor::new(
            "job-1",
            Arc::new(InMemoryStore::new()),
            Arc::new(RetryStrategyLibrary::uniform(RetryStrategy::Skip)),
            token,
        );
        let done = photo("done");
        executor
            .import_and_swallow(&done, || async { ItemImportResult::success("h", Some(1)) })
            .await
            .unwrap();

        cancel.raise();

        let calls = AtomicUsize::new(0);
        let pending = photo("pending");
        let result = executor
            .import_and_swallow(&pending, || async {
                calls.fetch_add(1, Ordering::SeqCst);
                ItemImportResult::success("h2", Some(1))
            })
            .await;
        assert!(matches!(result, Err(AppError::Cancelled(_))));
        assert_eq!(calls.load(Ordering::SeqCst), 0);

        // Already attempted items are still answered from the cache
        let again = executor
            .import_and_swallow(&done, || async { ItemImportResult::success("other", None) })
            .await
            .unwrap();
        assert!(matches!(again, ItemOutcome::AlreadyAttempted(_)));
    }

    #[tokio::test]
    async fn test_restart_reuses_persisted_outcomes() {
        let store = Arc::new(InMemoryStore::new());
        let item = photo("p1");
        {
            let executor = executor_with(Arc::clone(&store), RetryStrategy::Skip);
            executor
                .import_and_swallow(&item, || async { ItemImportResult::success("h1", Some(1024)) })
                .await
                .unwrap();
        }

        let resumed = ImportExecutor::load(
            "job-1",
            store,
            Arc::new(RetryStrategyLibrary::uniform(RetryStrategy::Skip)),
            SignalToken::never(),
        )
        .await
        .unwrap();
        assert_eq!(resumed.bytes_transferred(), 1024);

        let calls = AtomicUsize::new(0);
        let outcome = resumed
            .import_and_swallow(&item, || async {
                calls.fetch_add(1, Ordering::SeqCst);
                ItemImportResult::success("h2", Some(1024))
            })
            .await
            .unwrap();
        assert_eq!(calls.load(Ordering::SeqCst), 0);
        assert!(matches!(outcome, ItemOutcome::AlreadyAttempted(CachedOutcome::Success { ref handle, .. }) if handle == "h1"));
        assert_eq!(resumed.bytes_transferred(), 1024);
    }
}
