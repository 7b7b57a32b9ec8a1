// Transfer Pipeline - runs the transfer phase of one job

use crate::application::executor::{ExecutionReport, ImportExecutor};
use crate::application::registry::ExtensionRegistry;
use crate::application::retry::RetryStrategyLibrary;
use crate::application::signal::{signal_channel, SignalSender};
use crate::domain::{AuthData, AuthMode, JobState, PortabilityJob, TransferError};
use crate::error::{AppError, Result};
use crate::port::{Exporter, Importer, ItemResultStore, JobStore, TimeProvider};
use crate::security::{decrypt_auth_data, SessionKey};
use std::convert::Infallible;
use std::sync::Arc;
use std::time::Duration;
use tracing::{error, info, warn};

/// Final job record plus what the executor observed
#[derive(Debug, Clone)]
pub struct TransferSummary {
    pub job: PortabilityJob,
    pub report: ExecutionReport,
    pub pages: usize,
}

pub struct TransferPipeline {
    jobs: Arc<dyn JobStore>,
    registry: Arc<ExtensionRegistry>,
    results: Arc<dyn ItemResultStore>,
    retry_library: Arc<RetryStrategyLibrary>,
    time_provider: Arc<dyn TimeProvider>,
    cancel_poll_interval: Duration,
}

impl TransferPipeline {
    pub fn new(
        jobs: Arc<dyn JobStore>,
        registry: Arc<ExtensionRegistry>,
        results: Arc<dyn ItemResultStore>,
        retry_library: Arc<RetryStrategyLibrary>,
        time_provider: Arc<dyn TimeProvider>,
        cancel_poll_interval: Duration,
    ) -> Self {
        Self {
            jobs,
            registry,
            results,
            retry_library,
            time_provider,
            cancel_poll_interval,
        }
    }

    /// Transfer a job that is already TRANSFER_IN_PROGRESS and finalize it
    ///
    /// The job ends COMPLETE when every page was imported and no item failed
    /// fatally, ERROR otherwise. Restarted jobs reuse the persisted item results.
    pub async fn run(&self, mut job: PortabilityJob) -> Result<TransferSummary> {
        if job.state() != JobState::TransferInProgress {
            return Err(AppError::InvalidState(format!(
                "Job {} is {}, expected {}",
                job.id,
                job.state(),
                JobState::TransferInProgress
            )));
        }

        let (cancel, cancel_token) = signal_channel();
        if job.cancel_requested {
            cancel.raise();
        }

        let executor = ImportExecutor::load(
            &job.id,
            Arc::clone(&self.results),
            Arc::clone(&self.retry_library),
            cancel_token,
        )
        .await?;

        info!(
            job_id = %job.id,
            export_service = %job.export_service,
            import_service = %job.import_service,
            data_type = %job.transfer_data_type,
            "Transfer started"
        );

        let outcome = {
            let transfer = self.transfer(&job, &executor);
            tokio::pin!(transfer);
            tokio::select! {
                outcome = &mut transfer => outcome,
                never = self.watch_cancel(&job.id, &cancel) => match never {},
            }
        };

        let report = executor.report();
        let now = self.time_provider.now_millis();
        let prior = job.state();
        let pages = match outcome {
            Ok(pages) if report.fatal.is_empty() => {
                job.complete(report.bytes_transferred, now)?;
                info!(
                    job_id = %job.id,
                    pages = pages,
                    bytes = report.bytes_transferred,
                    skipped = report.skipped.len(),
                    "Transfer complete"
                );
                pages
            }
            Ok(pages) => {
                job.fail(format!("{} item(s) failed", report.fatal.len()), now)?;
                error!(job_id = %job.id, failed = report.fatal.len(), "Transfer failed");
                pages
            }
            Err(AppError::Cancelled(_)) => {
                job.fail("cancelled", now)?;
                info!(job_id = %job.id, "Transfer cancelled");
                0
            }
            Err(e) => {
                error!(job_id = %job.id, error = %e, "Transfer aborted");
                job.fail(format!("transfer failed: {}", e), now)?;
                0
            }
        };
        job.bytes_transferred = report.bytes_transferred;
        self.jobs.update(&job, prior).await?;

        for skipped in &report.skipped {
            warn!(job_id = %job.id, item = %skipped.description, error = %skipped.error, "Skipped item");
        }

        Ok(TransferSummary { job, report, pages })
    }

    async fn transfer(&self, job: &PortabilityJob, executor: &ImportExecutor) -> Result<usize> {
        let exporter: Arc<dyn Exporter> = self
            .registry
            .exporter(&job.export_service, job.transfer_data_type)?;
        let importer: Arc<dyn Importer> = self
            .registry
            .importer(&job.import_service, job.transfer_data_type)?;

        let key = SessionKey::parse(&job.authorization.session_secret_key)?;
        let export_auth = Self::credentials(job, &key, AuthMode::Export)?;
        let import_auth = Self::credentials(job, &key, AuthMode::Import)?;

        let mut continuation: Option<String> = None;
        let mut pages = 0;
        loop {
            let page = exporter
                .export(&job.id, &export_auth, continuation.as_deref())
                .await?;
            let result = importer
                .import(&job.id, executor, &import_auth, &page.data)
                .await?;
            if !result.success {
                return Err(TransferError::fatal(
                    result.error.unwrap_or_else(|| "import failed".to_string()),
                )
                .into());
            }
            pages += 1;

            match page.continuation {
                Some(next) => continuation = Some(next),
                None => return Ok(pages),
            }
        }
    }

    fn credentials(job: &PortabilityJob, key: &SessionKey, mode: AuthMode) -> Result<AuthData> {
        let sealed = job.encrypted_auth_data(mode).ok_or_else(|| {
            AppError::InvalidState(format!("Job {} has no {} credentials", job.id, mode))
        })?;
        decrypt_auth_data(key, sealed)
    }

    /// Raise `cancel` once the job is flagged in the store; never returns
    async fn watch_cancel(&self, job_id: &str, cancel: &SignalSender) -> Infallible {
        loop {
            tokio::time::sleep(self.cancel_poll_interval).await;
            match self.jobs.find(job_id).await {
                Ok(Some(job)) if job.cancel_requested => {
                    info!(job_id = %job_id, "Cancellation observed");
                    cancel.raise();
                    break;
                }
                Ok(_) => {}
                Err(e) => warn!(job_id = %job_id, error = %e, "Unable to poll cancellation flag"),
            }
        }
        std::future::pending::<Infallible>().await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::application::registry::{ExtensionContext, ProviderBindings, StaticExtension};
    use crate::application::retry::RetryStrategy;
    use crate::domain::{DataVertical, PhotoAlbum, PhotoModel, PhotosContainer, ContainerResource};
    use crate::port::mocks::{InMemoryStore, StaticAppCredentialStore};
    use crate::port::provider::mocks::{MockExporter, MockPhotosImporter, MockUpload};
    use crate::port::item_result_store::CachedOutcome;
    use crate::port::TemporaryPerJobDataStore;
    use crate::port::time_provider::FixedTimeProvider;
    use crate::security::encrypt_auth_data;

    fn photo(id: &str) -> PhotoModel {
        PhotoModel {
            data_id: id.to_string(),
            album_id: Some("a1".to_string()),
            title: id.to_string(),
            description: None,
            media_type: "image/jpeg".to_string(),
            fetchable_url: format!("https://flickr.test/{}", id),
            in_temp_store: false,
        }
    }

    fn page(ids: &[&str]) -> ContainerResource {
        ContainerResource::Photos(PhotosContainer {
            albums: vec![PhotoAlbum {
                id: "a1".into(),
                name: "Holiday".into(),
                description: None,
            }],
            photos: ids.iter().map(|id| photo(id)).collect(),
        })
    }

    async fn running_job(store: &InMemoryStore) -> PortabilityJob {
        let key = SessionKey::generate();
        let mut job = PortabilityJob::new("job-1", 0, "flickr", "backblaze", DataVertical::Photos, key.encode());
        store.create(&job).await.unwrap();
        job.authorization.encrypted_export_auth_data =
            Some(encrypt_auth_data(&key, &AuthData::token_secret("T1", "s1")).unwrap());
        job.authorization.encrypted_import_auth_data =
            Some(encrypt_auth_data(&key, &AuthData::bearer("T2")).unwrap());
        job.authorization.state = JobState::TransferInProgress;
        store.update(&job, JobState::Created).await.unwrap();
        job
    }

    fn pipeline(
        store: Arc<InMemoryStore>,
        exporter: Arc<MockExporter>,
        importer: Arc<MockPhotosImporter>,
        strategy: RetryStrategy,
    ) -> TransferPipeline {
        let registry = ExtensionRegistry::new(vec![
            Box::new(StaticExtension::new(
                "flickr",
                ProviderBindings::default().with_exporter(DataVertical::Photos, exporter),
            )),
            Box::new(StaticExtension::new(
                "backblaze",
                ProviderBindings::default().with_importer(DataVertical::Photos, importer),
            )),
        ]);
        registry.initialize(&ExtensionContext {
            temp_store: store.clone(),
            app_credentials: Arc::new(StaticAppCredentialStore::default()),
            base_url: String::new(),
            base_api_url: String::new(),
        });
        TransferPipeline::new(
            store.clone(),
            Arc::new(registry),
            store,
            Arc::new(RetryStrategyLibrary::uniform(strategy)),
            Arc::new(FixedTimeProvider::new(10_000)),
            Duration::from_millis(5),
        )
    }

    #[tokio::test]
    async fn test_paginated_transfer_completes() {
        let store = Arc::new(InMemoryStore::new());
        let exporter = Arc::new(MockExporter::new(vec![page(&["p1", "p2"]), page(&["p3"])]));
        let importer = Arc::new(MockPhotosImporter::new([
            ("p1".to_string(), MockUpload::Succeed(100)),
            ("p2".to_string(), MockUpload::Succeed(200)),
            ("p3".to_string(), MockUpload::Succeed(300)),
        ]));
        let pipeline = pipeline(store.clone(), exporter.clone(), importer.clone(), RetryStrategy::Skip);
        let job = running_job(&store).await;

        let summary = pipeline.run(job).await.unwrap();
        assert_eq!(summary.pages, 2);
        assert_eq!(summary.job.state(), JobState::Complete);
        assert_eq!(summary.job.bytes_transferred, 600);
        assert_eq!(exporter.seen_tokens(), vec!["T1", "T1"]);
        assert_eq!(importer.seen_tokens(), vec!["T2", "T2"]);
        // Album appears on both pages but is created once
        assert_eq!(importer.calls_for("album:a1"), 1);

        let stored = store.find("job-1").await.unwrap().unwrap();
        assert_eq!(stored.state(), JobState::Complete);
        assert_eq!(stored.bytes_transferred, 600);
    }

    fn staged(id: &str) -> PhotoModel {
        PhotoModel {
            in_temp_store: true,
            ..photo(id)
        }
    }

    /// Stage `p1` (5 bytes) in the temporary store and transfer it
    async fn transfer_staged_photo(store: Arc<InMemoryStore>) -> TransferSummary {
        let photo = staged("p1");
        store
            .put_blob_from_stream("job-1", &photo.fetchable_url, &mut &b"jpeg!"[..])
            .await
            .unwrap();
        assert_eq!(store.blob_count(), 1);

        let exporter = Arc::new(MockExporter::new(vec![ContainerResource::Photos(
            PhotosContainer {
                albums: vec![],
                photos: vec![photo],
            },
        )]));
        let importer = Arc::new(
            MockPhotosImporter::new([("p1".to_string(), MockUpload::Succeed(900))])
                .with_temp_store(store.clone()),
        );
        let pipeline = pipeline(store.clone(), exporter, importer, RetryStrategy::NoRetry);
        pipeline.run(running_job(&store).await).await.unwrap()
    }

    #[tokio::test]
    async fn test_staged_photo_is_read_and_removed() {
        let store = Arc::new(InMemoryStore::new());
        let summary = transfer_staged_photo(store.clone()).await;

        assert_eq!(summary.job.state(), JobState::Complete);
        assert_eq!(summary.job.bytes_transferred, 5);
        assert_eq!(store.blob_count(), 0);
    }

    #[tokio::test]
    async fn test_staged_blob_cleanup_failure_is_swallowed() {
        let store = Arc::new(InMemoryStore::new());
        store.fail_blob_removal(true);
        let summary = transfer_staged_photo(store.clone()).await;

        assert_eq!(summary.job.state(), JobState::Complete);
        assert_eq!(summary.job.bytes_transferred, 5);
        assert!(summary.report.fatal.is_empty());
        assert!(summary.report.skipped.is_empty());
        // Removal failed, so the blob is still there
        assert_eq!(store.blob_count(), 1);

        let results = store.load_results("job-1").await.unwrap();
        assert_eq!(
            results,
            vec![(
                "photo:p1".to_string(),
                CachedOutcome::Success {
                    handle: "root/p1".to_string(),
                    bytes: Some(5),
                },
            )]
        );
    }

    #[tokio::test]
    async fn test_unskippable_item_failure_ends_in_error() {
        let store = Arc::new(InMemoryStore::new());
        let exporter = Arc::new(MockExporter::new(vec![page(&["p1", "p2"])]));
        let importer = Arc::new(MockPhotosImporter::new([
            ("p1".to_string(), MockUpload::Succeed(100)),
            ("p2".to_string(), MockUpload::Fail(TransferError::provider("quota"))),
        ]));
        let pipeline = pipeline(store.clone(), exporter, importer, RetryStrategy::NoRetry);

        let summary = pipeline.run(running_job(&store).await).await.unwrap();
        assert_eq!(summary.job.state(), JobState::Error);
        assert_eq!(summary.job.bytes_transferred, 100);
        assert_eq!(summary.report.fatal.len(), 1);
        assert_eq!(summary.job.failure_reason.as_deref(), Some("1 item(s) failed"));
    }

    #[tokio::test]
    async fn test_export_failure_ends_in_error() {
        let store = Arc::new(InMemoryStore::new());
        let pipeline = pipeline(
            store.clone(),
            Arc::new(MockExporter::failing("account suspended")),
            Arc::new(MockPhotosImporter::new(Vec::new())),
            RetryStrategy::Skip,
        );

        let summary = pipeline.run(running_job(&store).await).await.unwrap();
        assert_eq!(summary.job.state(), JobState::Error);
        assert!(summary
            .job
            .failure_reason
            .as_deref()
            .unwrap()
            .contains("account suspended"));
    }

    #[tokio::test]
    async fn test_cancelled_job_starts_no_items() {
        let store = Arc::new(InMemoryStore::new());
        let importer = Arc::new(MockPhotosImporter::new([(
            "p1".to_string(),
            MockUpload::Succeed(100),
        )]));
        let pipeline = pipeline(
            store.clone(),
            Arc::new(MockExporter::new(vec![page(&["p1"])])),
            importer.clone(),
            RetryStrategy::Skip,
        );
        let mut job = running_job(&store).await;
        store.request_cancel(&job.id).await.unwrap();
        job.cancel_requested = true;

        let summary = pipeline.run(job).await.unwrap();
        assert_eq!(summary.job.state(), JobState::Error);
        assert_eq!(summary.job.failure_reason.as_deref(), Some("cancelled"));
        assert_eq!(importer.calls_for("photo:p1"), 0);
    }

    #[tokio::test]
    async fn test_rejects_job_not_in_progress() {
        let store = Arc::new(InMemoryStore::new());
        let pipeline = pipeline(
            store.clone(),
            Arc::new(MockExporter::new(vec![])),
            Arc::new(MockPhotosImporter::new(Vec::new())),
            RetryStrategy::Skip,
        );
        let job = PortabilityJob::new("job-2", 0, "flickr", "backblaze", DataVertical::Photos, "k");
        assert!(matches!(pipeline.run(job).await, Err(AppError::InvalidState(_))));
    }
}
