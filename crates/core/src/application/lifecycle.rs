// Job Lifecycle Service - creation, authorization start, status and cancellation

use crate::application::registry::ExtensionRegistry;
use crate::domain::{AuthMode, DataVertical, JobState, PortabilityJob};
use crate::error::{AppError, Result};
use crate::port::{IdProvider, JobStore, TimeProvider};
use crate::security::{encrypt_auth_data, SessionKey};
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use tracing::{info, warn};

/// Attempts at moving a non-running job to ERROR when it is cancelled
const CANCEL_CAS_ATTEMPTS: usize = 3;

/// Where to send the user's browser to authorize one side of a job
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AuthorizationRequest {
    pub job_id: String,
    pub mode: AuthMode,
    pub auth_url: String,
}

/// Externally visible view of a job (no credential material)
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct JobStatus {
    pub job_id: String,
    pub export_service: String,
    pub import_service: String,
    pub data_type: DataVertical,
    pub state: JobState,
    pub bytes_transferred: i64,
    pub failure_reason: Option<String>,
    pub cancel_requested: bool,
    pub created_at: i64,
    pub updated_at: i64,
}

impl From<&PortabilityJob> for JobStatus {
    fn from(job: &PortabilityJob) -> Self {
        Self {
            job_id: job.id.clone(),
            export_service: job.export_service.clone(),
            import_service: job.import_service.clone(),
            data_type: job.transfer_data_type,
            state: job.state(),
            bytes_transferred: job.bytes_transferred,
            failure_reason: job.failure_reason.clone(),
            cancel_requested: job.cancel_requested,
            created_at: job.created_at,
            updated_at: job.updated_at,
        }
    }
}

/// Callback URL registered with a provider for one service
pub fn callback_url(base_api_url: &str, service: &str) -> String {
    format!(
        "{}/callback1/{}",
        base_api_url.trim_end_matches('/'),
        service.to_ascii_lowercase()
    )
}

pub struct JobLifecycleService {
    jobs: Arc<dyn JobStore>,
    registry: Arc<ExtensionRegistry>,
    id_provider: Arc<dyn IdProvider>,
    time_provider: Arc<dyn TimeProvider>,
    base_api_url: String,
}

impl JobLifecycleService {
    pub fn new(
        jobs: Arc<dyn JobStore>,
        registry: Arc<ExtensionRegistry>,
        id_provider: Arc<dyn IdProvider>,
        time_provider: Arc<dyn TimeProvider>,
        base_api_url: impl Into<String>,
    ) -> Self {
        Self {
            jobs,
            registry,
            id_provider,
            time_provider,
            base_api_url: base_api_url.into(),
        }
    }

    /// Create a job in CREATED with a fresh id and session key
    ///
    /// # Errors
    /// - `AppError::InvalidArgument` if either side has no adapter for the data type
    /// - `AppError::InvalidState` if the registry is not initialized
    pub async fn create_job(
        &self,
        export_service: &str,
        import_service: &str,
        data_type: DataVertical,
    ) -> Result<PortabilityJob> {
        self.registry.exporter(export_service, data_type)?;
        self.registry.importer(import_service, data_type)?;

        let job = PortabilityJob::new(
            self.id_provider.generate_id(),
            self.time_provider.now_millis(),
            export_service.to_ascii_lowercase(),
            import_service.to_ascii_lowercase(),
            data_type,
            SessionKey::generate().encode(),
        );
        self.jobs.create(&job).await?;

        info!(
            job_id = %job.id,
            export_service = %job.export_service,
            import_service = %job.import_service,
            data_type = %data_type,
            "Job created"
        );
        Ok(job)
    }

    /// Start authorization for one side of the job and return the provider URL
    ///
    /// Two-step flows return a request token which is sealed with the job's
    /// session key and kept until the callback arrives.
    pub async fn initiate_auth(&self, job_id: &str, mode: AuthMode) -> Result<AuthorizationRequest> {
        let mut job = self.load(job_id).await?;
        let service = job.service_for(mode).to_string();
        let generator = self
            .registry
            .auth_generator(&service, job.transfer_data_type, mode)?;

        let config = generator
            .generate_configuration(&callback_url(&self.base_api_url, &service), job_id)
            .await?;

        let key = SessionKey::parse(&job.authorization.session_secret_key)?;
        let encrypted_initial = config
            .initial_auth_data
            .as_ref()
            .map(|initial| encrypt_auth_data(&key, initial))
            .transpose()?;

        let prior = job.state();
        job.begin_auth(mode, encrypted_initial, self.time_provider.now_millis())?;
        self.jobs.update(&job, prior).await?;

        info!(job_id = %job_id, mode = %mode, service = %service, "Authorization initiated");
        Ok(AuthorizationRequest {
            job_id: job_id.to_string(),
            mode,
            auth_url: config.auth_url,
        })
    }

    pub async fn status(&self, job_id: &str) -> Result<JobStatus> {
        Ok(JobStatus::from(&self.load(job_id).await?))
    }

    /// Request cancellation
    ///
    /// A running transfer stops starting new items and ends in ERROR. Jobs not
    /// yet transferring move to ERROR immediately. Terminal jobs are unchanged.
    pub async fn cancel(&self, job_id: &str) -> Result<JobStatus> {
        if !self.jobs.request_cancel(job_id).await? {
            info!(job_id = %job_id, "Cancel ignored, job already finished");
            return self.status(job_id).await;
        }

        for _ in 0..CANCEL_CAS_ATTEMPTS {
            let mut job = self.load(job_id).await?;
            let prior = job.state();
            if prior.is_terminal() || prior == JobState::TransferInProgress {
                break;
            }
            job.fail("cancelled", self.time_provider.now_millis())?;
            match self.jobs.update(&job, prior).await {
                Ok(()) => {
                    info!(job_id = %job_id, from = %prior, "Job cancelled");
                    break;
                }
                Err(AppError::Conflict(_)) => continue,
                Err(e) => return Err(e),
            }
        }

        let status = self.status(job_id).await?;
        if status.state == JobState::TransferInProgress {
            info!(job_id = %job_id, "Cancel requested for running transfer");
        } else if !status.state.is_terminal() {
            warn!(job_id = %job_id, state = %status.state, "Job still active after cancel");
        }
        Ok(status)
    }

    async fn load(&self, job_id: &str) -> Result<PortabilityJob> {
        self.jobs
            .find(job_id)
            .await?
            .ok_or_else(|| AppError::NotFound(format!("Job {} not found", job_id)))
    }
}
