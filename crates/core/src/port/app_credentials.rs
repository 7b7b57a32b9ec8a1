// Application credential store (API key/secret pairs for provider adapters)

use crate::error::{AppError, Result};

#[derive(Clone, PartialEq, Eq)]
pub struct AppCredentials {
    pub key: String,
    pub secret: String,
}

impl std::fmt::Debug for AppCredentials {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("AppCredentials")
            .field("key", &self.key)
            .field("secret", &"<redacted>")
            .finish()
    }
}

pub trait AppCredentialStore: Send + Sync {
    /// Look up credentials by named identifiers, e.g. ("IMGUR_KEY", "IMGUR_SECRET")
    fn get_app_credentials(&self, key_name: &str, secret_name: &str) -> Result<AppCredentials>;
}

/// Reads credentials from environment variables
pub struct EnvAppCredentialStore;

impl AppCredentialStore for EnvAppCredentialStore {
    fn get_app_credentials(&self, key_name: &str, secret_name: &str) -> Result<AppCredentials> {
        let read = |name: &str| {
            std::env::var(name)
                .ok()
                .filter(|v| !v.is_empty())
                .ok_or_else(|| AppError::Config(format!("{} is not set", name)))
        };
        Ok(AppCredentials {
            key: read(key_name)?,
            secret: read(secret_name)?,
        })
    }
}
