// Provider Ports - capabilities implemented by per-service adapters

use crate::application::executor::ImportExecutor;
use crate::domain::{AuthData, AuthFlowConfiguration, ContainerResource};
use crate::error::Result;
use async_trait::async_trait;

/// Outcome of importing one container
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ImportResult {
    pub success: bool,
    /// Bytes written by this call (informational, the executor keeps the job total)
    pub bytes: Option<i64>,
    pub error: Option<String>,
}

impl ImportResult {
    pub fn ok(bytes: Option<i64>) -> Self {
        Self {
            success: true,
            bytes,
            error: None,
        }
    }

    pub fn error(message: impl Into<String>) -> Self {
        Self {
            success: false,
            bytes: None,
            error: Some(message.into()),
        }
    }
}

/// One page of exported data
#[derive(Debug, Clone)]
pub struct ExportResult {
    pub data: ContainerResource,
    /// Opaque token for the next page; `None` on the last page
    pub continuation: Option<String>,
}

/// Writes containers into a destination service
#[async_trait]
pub trait Importer: Send + Sync {
    /// Items must go through `executor` so that they are attempted once per job
    async fn import(
        &self,
        job_id: &str,
        executor: &ImportExecutor,
        auth_data: &AuthData,
        data: &ContainerResource,
    ) -> Result<ImportResult>;
}

/// Reads containers from a source service
#[async_trait]
pub trait Exporter: Send + Sync {
    async fn export(
        &self,
        job_id: &str,
        auth_data: &AuthData,
        continuation: Option<&str>,
    ) -> Result<ExportResult>;
}

/// Drives a provider's authorization flow
#[async_trait]
pub trait AuthDataGenerator: Send + Sync {
    /// Authorization URL plus, for two-step flows, the request token to keep until the callback
    async fn generate_configuration(
        &self,
        callback_base_url: &str,
        job_id: &str,
    ) -> Result<AuthFlowConfiguration>;

    /// Exchange the verifier returned by the provider for final credentials
    async fn generate_auth_data(
        &self,
        callback_base_url: &str,
        auth_code: &str,
        job_id: &str,
        initial_auth_data: Option<&AuthData>,
        extra: Option<&str>,
    ) -> Result<AuthData>;
}

/// Mock adapters for testing
pub mod mocks {
    use super::*;
    use crate::application::executor::ItemImportResult;
    use crate::domain::{ImportableItem, PhotoModel, TransferError};
    use crate::error::AppError;
    use crate::port::TemporaryPerJobDataStore;
    use std::collections::HashMap;
    use std::sync::{Arc, Mutex};
    use tracing::warn;

    /// Two-step (request token, then verifier) generator
    pub struct MockAuthDataGenerator {
        final_token: String,
        two_step: bool,
        exchanges: Mutex<Vec<(String, Option<AuthData>)>>,
    }

    impl MockAuthDataGenerator {
        pub fn new(final_token: impl Into<String>) -> Self {
            Self {
                final_token: final_token.into(),
                two_step: true,
                exchanges: Mutex::new(Vec::new()),
            }
        }

        /// Single-step generator that issues no request token
        pub fn single_step(final_token: impl Into<String>) -> Self {
            Self {
                two_step: false,
                ..Self::new(final_token)
            }
        }

        pub fn request_token(job_id: &str) -> String {
            format!("request-{}", job_id)
        }

        /// (verifier, initial auth data) pairs seen by `generate_auth_data`
        pub fn exchanges(&self) -> Vec<(String, Option<AuthData>)> {
            self.exchanges.lock().unwrap().clone()
        }
    }

    #[async_trait]
    impl AuthDataGenerator for MockAuthDataGenerator {
        async fn generate_configuration(
            &self,
            callback_base_url: &str,
            job_id: &str,
        ) -> Result<AuthFlowConfiguration> {
            let request_token = Self::request_token(job_id);
            Ok(AuthFlowConfiguration {
                auth_url: format!(
                    "https://provider.test/authorize?oauth_token={}&oauth_callback={}",
                    request_token, callback_base_url
                ),
                initial_auth_data: self
                    .two_step
                    .then(|| AuthData::token_secret(request_token, "request-secret")),
            })
        }

        async fn generate_auth_data(
            &self,
            _callback_base_url: &str,
            auth_code: &str,
            _job_id: &str,
            initial_auth_data: Option<&AuthData>,
            _extra: Option<&str>,
        ) -> Result<AuthData> {
            self.exchanges
                .lock()
                .unwrap()
                .push((auth_code.to_string(), initial_auth_data.cloned()));
            if auth_code == "rejected" {
                return Err(AppError::InvalidArgument("verifier rejected".into()));
            }
            Ok(AuthData::token_secret(
                self.final_token.clone(),
                format!("secret-{}", auth_code),
            ))
        }
    }

    /// Exporter serving fixed pages, chained with `page-N` continuation tokens
    pub struct MockExporter {
        pages: Vec<ContainerResource>,
        failure: Option<String>,
        seen_tokens: Mutex<Vec<String>>,
    }

    impl MockExporter {
        pub fn new(pages: Vec<ContainerResource>) -> Self {
            Self {
                pages,
                failure: None,
                seen_tokens: Mutex::new(Vec::new()),
            }
        }

        pub fn failing(message: impl Into<String>) -> Self {
            Self {
                pages: Vec::new(),
                failure: Some(message.into()),
                seen_tokens: Mutex::new(Vec::new()),
            }
        }

        /// Primary tokens of the credentials used for each call
        pub fn seen_tokens(&self) -> Vec<String> {
            self.seen_tokens.lock().unwrap().clone()
        }
    }

    #[async_trait]
    impl Exporter for MockExporter {
        async fn export(
            &self,
            _job_id: &str,
            auth_data: &AuthData,
            continuation: Option<&str>,
        ) -> Result<ExportResult> {
            self.seen_tokens
                .lock()
                .unwrap()
                .push(auth_data.token().to_string());
            if let Some(message) = &self.failure {
                return Err(TransferError::fatal(message.clone()).into());
            }

            let index = match continuation {
                None => 0,
                Some(token) => token
                    .strip_prefix("page-")
                    .and_then(|n| n.parse::<usize>().ok())
                    .ok_or_else(|| {
                        AppError::InvalidArgument(format!("bad continuation {}", token))
                    })?,
            };
            let data = self.pages.get(index).cloned().ok_or_else(|| {
                AppError::InvalidArgument(format!("no export page {}", index))
            })?;
            let continuation = (index + 1 < self.pages.len()).then(|| format!("page-{}", index + 1));
            Ok(ExportResult { data, continuation })
        }
    }

    /// Per-photo behavior of [`MockPhotosImporter`]
    #[derive(Debug, Clone)]
    pub enum MockUpload {
        Succeed(i64),
        Fail(TransferError),
    }

    /// Photos importer in the usual adapter shape.
    ///
    /// Albums are created through `execute_and_swallow` and their names cached;
    /// photos are uploaded concurrently through `import_and_swallow`. Photos
    /// staged in the temporary store are read from it and removed afterwards.
    pub struct MockPhotosImporter {
        uploads: HashMap<String, MockUpload>,
        temp_store: Option<Arc<dyn TemporaryPerJobDataStore>>,
        calls: Mutex<HashMap<String, usize>>,
        tokens: Mutex<Vec<String>>,
    }

    impl MockPhotosImporter {
        pub fn new(uploads: impl IntoIterator<Item = (String, MockUpload)>) -> Self {
            Self {
                uploads: uploads.into_iter().collect(),
                temp_store: None,
                calls: Mutex::new(HashMap::new()),
                tokens: Mutex::new(Vec::new()),
            }
        }

        pub fn with_temp_store(mut self, store: Arc<dyn TemporaryPerJobDataStore>) -> Self {
            self.temp_store = Some(store);
            self
        }

        /// Number of provider calls made for an item key (albums and photos)
        pub fn calls_for(&self, key: &str) -> usize {
            self.calls.lock().unwrap().get(key).copied().unwrap_or(0)
        }

        pub fn seen_tokens(&self) -> Vec<String> {
            self.tokens.lock().unwrap().clone()
        }

        fn record_call(&self, key: &str) {
            *self.calls.lock().unwrap().entry(key.to_string()).or_default() += 1;
        }

        async fn upload(&self, job_id: &str, photo: &PhotoModel, album_name: Option<&str>) -> ItemImportResult {
            self.record_call(&photo.id_key());

            let mut staged = 0i64;
            if photo.in_temp_store {
                if let Some(store) = &self.temp_store {
                    match store.get_blob(job_id, &photo.fetchable_url).await {
                        Ok(bytes) => staged = bytes.len() as i64,
                        Err(e) => return ItemImportResult::error(TransferError::provider(e.to_string())),
                    }
                }
            }

            let result = match self.uploads.get(&photo.data_id) {
                Some(MockUpload::Succeed(bytes)) => ItemImportResult::success(
                    format!("{}/{}", album_name.unwrap_or("root"), photo.data_id),
                    Some(if staged > 0 { staged } else { *bytes }),
                ),
                Some(MockUpload::Fail(e)) => ItemImportResult::error(e.clone()),
                None => ItemImportResult::error(TransferError::provider(format!(
                    "unknown photo {}",
                    photo.data_id
                ))),
            };

            if result.is_success() && photo.in_temp_store {
                if let Some(store) = &self.temp_store {
                    if let Err(e) = store.remove_blob(job_id, &photo.fetchable_url).await {
                        warn!(job_id = %job_id, photo = %photo.data_id, error = %e, "Unable to delete staged photo");
                    }
                }
            }
            result
        }
    }

    #[async_trait]
    impl Importer for MockPhotosImporter {
        async fn import(
            &self,
            job_id: &str,
            executor: &ImportExecutor,
            auth_data: &AuthData,
            data: &ContainerResource,
        ) -> Result<ImportResult> {
            self.tokens.lock().unwrap().push(auth_data.token().to_string());
            let photos = match data {
                ContainerResource::Photos(photos) => photos,
                other => {
                    return Ok(ImportResult::error(format!(
                        "unsupported container with {} items",
                        other.item_count()
                    )))
                }
            };

            for album in &photos.albums {
                let key = format!("album:{}", album.id);
                executor
                    .execute_and_swallow(&key, &album.name, || async {
                        self.record_call(&key);
                        Ok(album.name.clone())
                    })
                    .await?;
            }

            let uploads = photos.photos.iter().map(|photo| async move {
                let album_name = match &photo.album_id {
                    Some(id) => executor.get_cached_value(&format!("album:{}", id)).ok(),
                    None => None,
                };
                executor
                    .import_and_swallow(photo, || self.upload(job_id, photo, album_name.as_deref()))
                    .await
            });
            for outcome in futures::future::join_all(uploads).await {
                outcome?;
            }

            Ok(ImportResult::ok(Some(executor.bytes_transferred())))
        }
    }
}
