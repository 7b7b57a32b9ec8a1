// Transfer Worker - claims authorized jobs and runs their transfer

pub mod constants;

use crate::application::pipeline::TransferPipeline;
use crate::application::signal::ShutdownToken;
use crate::domain::{JobState, PortabilityJob};
use crate::error::{AppError, Result};
use crate::port::{JobStore, TimeProvider};
use constants::*;
use std::sync::Arc;
use std::time::Duration;
use tokio::time::sleep;
use tracing::{error, info, warn};

pub struct Worker {
    name: String,
    jobs: Arc<dyn JobStore>,
    pipeline: Arc<TransferPipeline>,
    time_provider: Arc<dyn TimeProvider>,
    idle_sleep: Duration,
}

impl Worker {
    pub fn new(
        name: impl Into<String>,
        jobs: Arc<dyn JobStore>,
        pipeline: Arc<TransferPipeline>,
        time_provider: Arc<dyn TimeProvider>,
    ) -> Self {
        Self {
            name: name.into(),
            jobs,
            pipeline,
            time_provider,
            idle_sleep: IDLE_SLEEP_DURATION,
        }
    }

    pub fn with_idle_sleep(mut self, idle_sleep: Duration) -> Self {
        self.idle_sleep = idle_sleep;
        self
    }

    /// Poll until `shutdown` is raised; a running transfer finishes first
    pub async fn run(&self, mut shutdown: ShutdownToken) -> Result<()> {
        info!(worker = %self.name, "Worker started");
        loop {
            if shutdown.is_raised() {
                info!(worker = %self.name, "Worker shutting down");
                break;
            }
            match self.process_next_job().await {
                Ok(true) => {}
                Ok(false) => {
                    tokio::select! {
                        _ = sleep(self.idle_sleep) => {},
                        _ = shutdown.wait() => {
                            info!(worker = %self.name, "Worker interrupted during idle");
                            break;
                        }
                    }
                }
                Err(e) => {
                    error!(worker = %self.name, error = %e, "Worker error");
                    tokio::select! {
                        _ = sleep(ERROR_RECOVERY_SLEEP_DURATION) => {},
                        _ = shutdown.wait() => {
                            info!(worker = %self.name, "Worker interrupted during error recovery");
                            break;
                        }
                    }
                }
            }
        }
        info!(worker = %self.name, "Worker stopped");
        Ok(())
    }

    /// Claim and transfer one IMPORT_AUTH_COMPLETE job (returns true if a job was processed)
    pub async fn process_next_job(&self) -> Result<bool> {
        let candidates = self.jobs.find_by_state(JobState::ImportAuthComplete).await?;

        for mut job in candidates {
            let prior = job.state();
            let now = self.time_provider.now_millis();
            if let Err(e) = job.begin_transfer(now) {
                warn!(job_id = %job.id, error = %e, "Authorized job cannot start transfer");
                job.fail(e.to_string(), now)?;
                match self.jobs.update(&job, prior).await {
                    Ok(()) | Err(AppError::Conflict(_)) => continue,
                    Err(e) => return Err(e),
                }
            }
            match self.jobs.update(&job, prior).await {
                Ok(()) => {}
                Err(AppError::Conflict(_)) => {
                    // Claimed by another worker or cancelled meanwhile
                    continue;
                }
                Err(e) => return Err(e),
            }
            info!(worker = %self.name, job_id = %job.id, "Claimed job");
            self.execute(job).await?;
            return Ok(true);
        }
        Ok(false)
    }

    /// Run the pipeline in its own task so that a panicking adapter only fails its job
    pub(crate) async fn execute(&self, job: PortabilityJob) -> Result<()> {
        let job_id = job.id.clone();
        let pipeline = Arc::clone(&self.pipeline);
        let handle = tokio::task::spawn(async move { pipeline.run(job).await });

        match handle.await {
            Ok(Ok(summary)) => {
                info!(
                    job_id = %job_id,
                    state = %summary.job.state(),
                    bytes = summary.job.bytes_transferred,
                    "Transfer finished"
                );
                Ok(())
            }
            Ok(Err(e)) => {
                error!(job_id = %job_id, error = %e, "Transfer could not be finalized");
                self.fail_running(&job_id, &e.to_string()).await
            }
            Err(join_err) => {
                if join_err.is_panic() {
                    error!(job_id = %job_id, "Transfer task panicked");
                } else {
                    error!(job_id = %job_id, "Transfer task was aborted");
                }
                self.fail_running(&job_id, PANIC_FAILURE_REASON).await
            }
        }
    }

    async fn fail_running(&self, job_id: &str, reason: &str) -> Result<()> {
        let Some(mut job) = self.jobs.find(job_id).await? else {
            warn!(job_id = %job_id, "Job disappeared while transferring");
            return Ok(());
        };
        if job.state() != JobState::TransferInProgress {
            return Ok(());
        }
        job.fail(reason, self.time_provider.now_millis())?;
        self.jobs.update(&job, JobState::TransferInProgress).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::application::registry::{
        ExtensionContext, ExtensionRegistry, ProviderBindings, StaticExtension,
    };
    use crate::application::retry::{RetryStrategy, RetryStrategyLibrary};
    use crate::application::signal::signal_channel;
    use crate::domain::{AuthData, ContainerResource, DataVertical, PhotosContainer};
    use crate::port::mocks::{InMemoryStore, StaticAppCredentialStore};
    use crate::port::provider::mocks::{MockExporter, MockPhotosImporter};
    use crate::port::time_provider::FixedTimeProvider;
    use crate::security::{encrypt_auth_data, SessionKey};

    fn worker(store: Arc<InMemoryStore>) -> Worker {
        let registry = ExtensionRegistry::new(vec![
            Box::new(StaticExtension::new(
                "flickr",
                ProviderBindings::default().with_exporter(
                    DataVertical::Photos,
                    Arc::new(MockExporter::new(vec![ContainerResource::Photos(
                        PhotosContainer::default(),
                    )])),
                ),
            )),
            Box::new(StaticExtension::new(
                "backblaze",
                ProviderBindings::default().with_importer(
                    DataVertical::Photos,
                    Arc::new(MockPhotosImporter::new(Vec::new())),
                ),
            )),
        ]);
        registry.initialize(&ExtensionContext {
            temp_store: store.clone(),
            app_credentials: Arc::new(StaticAppCredentialStore::default()),
            base_url: String::new(),
            base_api_url: String::new(),
        });
        let clock = Arc::new(FixedTimeProvider::new(1_000));
        let pipeline = Arc::new(TransferPipeline::new(
            store.clone(),
            Arc::new(registry),
            store.clone(),
            Arc::new(RetryStrategyLibrary::uniform(RetryStrategy::Skip)),
            clock.clone(),
            Duration::from_millis(5),
        ));
        Worker::new("test", store, pipeline, clock).with_idle_sleep(Duration::from_millis(5))
    }

    async fn authorized_job(store: &InMemoryStore, id: &str) {
        let key = SessionKey::generate();
        let mut job = PortabilityJob::new(id, 0, "flickr", "backblaze", DataVertical::Photos, key.encode());
        store.create(&job).await.unwrap();
        job.authorization.encrypted_export_auth_data =
            Some(encrypt_auth_data(&key, &AuthData::bearer("T1")).unwrap());
        job.authorization.encrypted_import_auth_data =
            Some(encrypt_auth_data(&key, &AuthData::bearer("T2")).unwrap());
        job.authorization.state = JobState::ImportAuthComplete;
        store.update(&job, JobState::Created).await.unwrap();
    }

    #[tokio::test]
    async fn test_process_next_job_completes_authorized_job() {
        let store = Arc::new(InMemoryStore::new());
        let worker = worker(store.clone());
        assert!(!worker.process_next_job().await.unwrap());

        authorized_job(&store, "job-1").await;
        assert!(worker.process_next_job().await.unwrap());
        let job = store.find("job-1").await.unwrap().unwrap();
        assert_eq!(job.state(), JobState::Complete);

        assert!(!worker.process_next_job().await.unwrap());
    }

    #[tokio::test]
    async fn test_unauthorized_jobs_are_not_claimed() {
        let store = Arc::new(InMemoryStore::new());
        let worker = worker(store.clone());
        let job = PortabilityJob::new("job-1", 0, "flickr", "backblaze", DataVertical::Photos, "k");
        store.create(&job).await.unwrap();

        assert!(!worker.process_next_job().await.unwrap());
        assert_eq!(
            store.find("job-1").await.unwrap().unwrap().state(),
            JobState::Created
        );
    }

    #[tokio::test]
    async fn test_run_stops_on_shutdown() {
        let store = Arc::new(InMemoryStore::new());
        let worker = Arc::new(worker(store.clone()));
        let (shutdown, token) = signal_channel();

        let running = {
            let worker = Arc::clone(&worker);
            tokio::spawn(async move { worker.run(token).await })
        };
        authorized_job(&store, "job-1").await;
        for _ in 0..200 {
            if store.find("job-1").await.unwrap().unwrap().state() == JobState::Complete {
                break;
            }
            sleep(Duration::from_millis(5)).await;
        }
        shutdown.raise();

        tokio::time::timeout(Duration::from_secs(2), running)
            .await
            .unwrap()
            .unwrap()
            .unwrap();
        assert_eq!(
            store.find("job-1").await.unwrap().unwrap().state(),
            JobState::Complete
        );
    }

    #[tokio::test]
    async fn test_job_without_credentials_fails_instead_of_looping() {
        let store = Arc::new(InMemoryStore::new());
        let worker = worker(store.clone());
        let mut job = PortabilityJob::new("job-1", 0, "flickr", "backblaze", DataVertical::Photos, "k");
        store.create(&job).await.unwrap();
        job.authorization.state = JobState::ImportAuthComplete;
        store.update(&job, JobState::Created).await.unwrap();

        assert!(!worker.process_next_job().await.unwrap());
        let stored = store.find("job-1").await.unwrap().unwrap();
        assert_eq!(stored.state(), JobState::Error);
        assert!(stored.failure_reason.is_some());
    }
}
