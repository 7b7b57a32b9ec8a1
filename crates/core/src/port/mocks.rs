// In-memory port implementations for testing

use super::app_credentials::{AppCredentialStore, AppCredentials};
use super::item_result_store::{CachedOutcome, ItemResultStore};
use super::job_store::JobStore;
use super::temp_store::TemporaryPerJobDataStore;
use crate::domain::{JobState, PortabilityJob};
use crate::error::{AppError, Result};
use async_trait::async_trait;
use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::Mutex;
use tokio::io::{AsyncRead, AsyncReadExt};

/// Job store, blob store and item result store backed by hash maps
#[derive(Default)]
pub struct InMemoryStore {
    jobs: Mutex<HashMap<String, PortabilityJob>>,
    blobs: Mutex<HashMap<(String, String), Vec<u8>>>,
    results: Mutex<HashMap<(String, String), CachedOutcome>>,
    fail_blob_removal: AtomicBool,
    update_count: AtomicUsize,
}

impl InMemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Make every `remove_blob` call fail
    pub fn fail_blob_removal(&self, fail: bool) {
        self.fail_blob_removal.store(fail, Ordering::SeqCst);
    }

    pub fn blob_count(&self) -> usize {
        self.blobs.lock().unwrap().len()
    }

    /// Number of successful `update` calls
    pub fn update_count(&self) -> usize {
        self.update_count.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl JobStore for InMemoryStore {
    async fn create(&self, job: &PortabilityJob) -> Result<()> {
        let mut jobs = self.jobs.lock().unwrap();
        if jobs.contains_key(&job.id) {
            return Err(AppError::Conflict(format!("Job {} already exists", job.id)));
        }
        jobs.insert(job.id.clone(), job.clone());
        Ok(())
    }

    async fn find(&self, id: &str) -> Result<Option<PortabilityJob>> {
        Ok(self.jobs.lock().unwrap().get(id).cloned())
    }

    async fn update(&self, job: &PortabilityJob, expected_prior: JobState) -> Result<()> {
        let mut jobs = self.jobs.lock().unwrap();
        let current = jobs
            .get_mut(&job.id)
            .ok_or_else(|| AppError::NotFound(format!("Job {} not found", job.id)))?;
        if current.state() != expected_prior {
            return Err(AppError::Conflict(format!(
                "Job {} is {}, expected {}",
                job.id,
                current.state(),
                expected_prior
            )));
        }
        let cancel_requested = current.cancel_requested;
        *current = job.clone();
        current.cancel_requested = cancel_requested;
        self.update_count.fetch_add(1, Ordering::SeqCst);
        Ok(())
    }

    async fn find_by_state(&self, state: JobState) -> Result<Vec<PortabilityJob>> {
        let mut found: Vec<PortabilityJob> = self
            .jobs
            .lock()
            .unwrap()
            .values()
            .filter(|j| j.state() == state)
            .cloned()
            .collect();
        found.sort_by(|a, b| a.created_at.cmp(&b.created_at).then(a.id.cmp(&b.id)));
        Ok(found)
    }

    async fn request_cancel(&self, id: &str) -> Result<bool> {
        let mut jobs = self.jobs.lock().unwrap();
        let job = jobs
            .get_mut(id)
            .ok_or_else(|| AppError::NotFound(format!("Job {} not found", id)))?;
        if job.state().is_terminal() {
            return Ok(false);
        }
        job.cancel_requested = true;
        Ok(true)
    }
}

#[async_trait]
impl TemporaryPerJobDataStore for InMemoryStore {
    async fn put_blob_from_stream(
        &self,
        job_id: &str,
        key: &str,
        stream: &mut (dyn AsyncRead + Send + Unpin),
    ) -> Result<u64> {
        let mut buf = Vec::new();
        stream.read_to_end(&mut buf).await?;
        let len = buf.len() as u64;
        self.blobs
            .lock()
            .unwrap()
            .insert((job_id.to_string(), key.to_string()), buf);
        Ok(len)
    }

    async fn get_blob(&self, job_id: &str, key: &str) -> Result<Vec<u8>> {
        self.blobs
            .lock()
            .unwrap()
            .get(&(job_id.to_string(), key.to_string()))
            .cloned()
            .ok_or_else(|| AppError::NotFound(format!("Blob {}/{} not found", job_id, key)))
    }

    async fn remove_blob(&self, job_id: &str, key: &str) -> Result<()> {
        if self.fail_blob_removal.load(Ordering::SeqCst) {
            return Err(AppError::Internal("blob removal failed".into()));
        }
        self.blobs
            .lock()
            .unwrap()
            .remove(&(job_id.to_string(), key.to_string()));
        Ok(())
    }
}

#[async_trait]
impl ItemResultStore for InMemoryStore {
    async fn load_results(&self, job_id: &str) -> Result<Vec<(String, CachedOutcome)>> {
        let mut results: Vec<(String, CachedOutcome)> = self
            .results
            .lock()
            .unwrap()
            .iter()
            .filter(|((job, _), _)| job == job_id)
            .map(|((_, key), outcome)| (key.clone(), outcome.clone()))
            .collect();
        results.sort_by(|a, b| a.0.cmp(&b.0));
        Ok(results)
    }

    async fn record_result(
        &self,
        job_id: &str,
        key: &str,
        outcome: &CachedOutcome,
    ) -> Result<CachedOutcome> {
        Ok(self
            .results
            .lock()
            .unwrap()
            .entry((job_id.to_string(), key.to_string()))
            .or_insert_with(|| outcome.clone())
            .clone())
    }
}

/// Credential store answering from a fixed map
#[derive(Default)]
pub struct StaticAppCredentialStore {
    values: HashMap<String, String>,
}

impl StaticAppCredentialStore {
    pub fn new(values: impl IntoIterator<Item = (&'static str, &'static str)>) -> Self {
        Self {
            values: values
                .into_iter()
                .map(|(k, v)| (k.to_string(), v.to_string()))
                .collect(),
        }
    }
}

impl AppCredentialStore for StaticAppCredentialStore {
    fn get_app_credentials(&self, key_name: &str, secret_name: &str) -> Result<AppCredentials> {
        let read = |name: &str| {
            self.values
                .get(name)
                .cloned()
                .ok_or_else(|| AppError::Config(format!("{} is not set", name)))
        };
        Ok(AppCredentials {
            key: read(key_name)?,
            secret: read(secret_name)?,
        })
    }
}
