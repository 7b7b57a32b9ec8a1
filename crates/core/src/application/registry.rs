// Extension Registry - resolves (service, data type, direction) to adapters

use crate::domain::{AuthMode, DataVertical};
use crate::error::{AppError, Result};
use crate::port::{AppCredentialStore, AuthDataGenerator, Exporter, Importer, TemporaryPerJobDataStore};
use std::collections::HashMap;
use std::sync::{Arc, Mutex, OnceLock};
use tracing::{error, info, warn};

/// Shared services handed to every extension at initialization
#[derive(Clone)]
pub struct ExtensionContext {
    pub temp_store: Arc<dyn TemporaryPerJobDataStore>,
    pub app_credentials: Arc<dyn AppCredentialStore>,
    /// Public base URL of the web front-end
    pub base_url: String,
    /// Base URL providers redirect back to (`{base_api_url}/callback1/{service}`)
    pub base_api_url: String,
}

/// Adapters produced by one extension
#[derive(Default, Clone)]
pub struct ProviderBindings {
    pub exporters: HashMap<DataVertical, Arc<dyn Exporter>>,
    pub importers: HashMap<DataVertical, Arc<dyn Importer>>,
    pub auth_generators: HashMap<(DataVertical, AuthMode), Arc<dyn AuthDataGenerator>>,
}

impl ProviderBindings {
    pub fn with_exporter(mut self, vertical: DataVertical, exporter: Arc<dyn Exporter>) -> Self {
        self.exporters.insert(vertical, exporter);
        self
    }

    pub fn with_importer(mut self, vertical: DataVertical, importer: Arc<dyn Importer>) -> Self {
        self.importers.insert(vertical, importer);
        self
    }

    pub fn with_auth(
        mut self,
        vertical: DataVertical,
        mode: AuthMode,
        generator: Arc<dyn AuthDataGenerator>,
    ) -> Self {
        self.auth_generators.insert((vertical, mode), generator);
        self
    }
}

/// Uninitialized extension.
///
/// `initialize` consumes the factory, so an extension can only ever be
/// initialized once.
pub trait ExtensionFactory: Send {
    fn service_id(&self) -> &str;

    fn initialize(self: Box<Self>, context: &ExtensionContext) -> Result<ProviderBindings>;
}

/// Registry of initialized extensions keyed by lowercase service id
pub struct ExtensionRegistry {
    pending: Mutex<Option<Vec<Box<dyn ExtensionFactory>>>>,
    bindings: OnceLock<HashMap<String, ProviderBindings>>,
}

impl ExtensionRegistry {
    pub fn new(factories: Vec<Box<dyn ExtensionFactory>>) -> Self {
        Self {
            pending: Mutex::new(Some(factories)),
            bindings: OnceLock::new(),
        }
    }

    /// Initialize every extension
    ///
    /// A second call logs an error and keeps the first registration. An
    /// extension that fails to initialize is logged and left out.
    pub fn initialize(&self, context: &ExtensionContext) {
        let factories = match self
            .pending
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
            .take()
        {
            Some(factories) => factories,
            None => {
                error!("Extension registry is already initialized, ignoring");
                return;
            }
        };

        let mut bindings = HashMap::new();
        for factory in factories {
            let service_id = factory.service_id().to_ascii_lowercase();
            if bindings.contains_key(&service_id) {
                error!(service = %service_id, "Duplicate extension, keeping the first one");
                continue;
            }
            match factory.initialize(context) {
                Ok(provided) => {
                    info!(
                        service = %service_id,
                        exporters = provided.exporters.len(),
                        importers = provided.importers.len(),
                        "Extension initialized"
                    );
                    bindings.insert(service_id, provided);
                }
                Err(e) => {
                    warn!(service = %service_id, error = %e, "Extension failed to initialize, skipping");
                }
            }
        }

        if self.bindings.set(bindings).is_err() {
            error!("Extension registry is already initialized, ignoring");
        }
    }

    pub fn is_initialized(&self) -> bool {
        self.bindings.get().is_some()
    }

    /// Initialized service ids, sorted
    pub fn services(&self) -> Vec<String> {
        let mut services: Vec<String> = self
            .bindings
            .get()
            .map(|b| b.keys().cloned().collect())
            .unwrap_or_default();
        services.sort();
        services
    }

    fn bindings_for(&self, service: &str) -> Result<&ProviderBindings> {
        let bindings = self
            .bindings
            .get()
            .ok_or_else(|| AppError::InvalidState("Extension registry is not initialized".into()))?;
        bindings
            .get(&service.to_ascii_lowercase())
            .ok_or_else(|| AppError::InvalidArgument(format!("Unknown service: {}", service)))
    }

    /// # Errors
    /// - `AppError::InvalidState` before `initialize`
    /// - `AppError::InvalidArgument` for unknown services or unsupported types
    pub fn importer(&self, service: &str, vertical: DataVertical) -> Result<Arc<dyn Importer>> {
        self.bindings_for(service)?
            .importers
            .get(&vertical)
            .cloned()
            .ok_or_else(|| {
                AppError::InvalidArgument(format!("{} cannot import {}", service, vertical))
            })
    }

    /// # Errors
    /// Same as [`ExtensionRegistry::importer`]
    pub fn exporter(&self, service: &str, vertical: DataVertical) -> Result<Arc<dyn Exporter>> {
        self.bindings_for(service)?
            .exporters
            .get(&vertical)
            .cloned()
            .ok_or_else(|| {
                AppError::InvalidArgument(format!("{} cannot export {}", service, vertical))
            })
    }

    pub fn auth_generator(
        &self,
        service: &str,
        vertical: DataVertical,
        mode: AuthMode,
    ) -> Result<Arc<dyn AuthDataGenerator>> {
        self.bindings_for(service)?
            .auth_generators
            .get(&(vertical, mode))
            .cloned()
            .ok_or_else(|| {
                AppError::InvalidArgument(format!(
                    "{} has no {} authorization for {}",
                    service, mode, vertical
                ))
            })
    }
}

/// Extension assembled from ready-made adapters
pub struct StaticExtension {
    service_id: String,
    bindings: ProviderBindings,
    required_credentials: Option<(String, String)>,
}

impl StaticExtension {
    pub fn new(service_id: impl Into<String>, bindings: ProviderBindings) -> Self {
        Self {
            service_id: service_id.into(),
            bindings,
            required_credentials: None,
        }
    }

    /// Refuse to initialize unless the application credentials are available
    pub fn requiring_credentials(mut self, key_name: impl Into<String>, secret_name: impl Into<String>) -> Self {
        self.required_credentials = Some((key_name.into(), secret_name.into()));
        self
    }
}

impl ExtensionFactory for StaticExtension {
    fn service_id(&self) -> &str {
        &self.service_id
    }

    fn initialize(self: Box<Self>, context: &ExtensionContext) -> Result<ProviderBindings> {
        if let Some((key_name, secret_name)) = &self.required_credentials {
            context
                .app_credentials
                .get_app_credentials(key_name, secret_name)?;
        }
        Ok(self.bindings)
    }
}
