//! OAuth callback protocol.
//!
//! The handler is transport-free: it takes the already-parsed query and
//! cookies of a `GET /callback1/{service}` request and returns a
//! [`CallbackOutcome`]. Every outcome is a redirect; failures redirect to
//! [`ERROR_PAGE`] and their cause is only logged.

use crate::application::lifecycle::callback_url;
use crate::application::registry::ExtensionRegistry;
use crate::domain::{AuthData, AuthMode, JobState};
use crate::error::{AppError, Result};
use crate::port::{JobStore, TimeProvider};
use crate::security::{decrypt_auth_data, encrypt_auth_data, SessionKey};
use base64::engine::general_purpose::URL_SAFE_NO_PAD;
use base64::Engine;
use std::sync::Arc;
use tracing::{info, warn};

/// Cookie holding the base64url job id
pub const JOB_ID_COOKIE: &str = "encoded_job_id";
/// Cookie telling which side of the job is being authorized
pub const AUTH_MODE_COOKIE: &str = "auth_mode";
pub const EXPORT_AUTH_DATA_COOKIE: &str = "export_auth_data";
pub const IMPORT_AUTH_DATA_COOKIE: &str = "import_auth_data";

/// Page shown after export authorization (import authorization follows)
pub const NEXT_PAGE: &str = "/next";
/// Page shown once both sides are authorized
pub const COPY_PAGE: &str = "/copy";
pub const ERROR_PAGE: &str = "/error";

pub fn encode_job_id(job_id: &str) -> String {
    URL_SAFE_NO_PAD.encode(job_id.as_bytes())
}

pub fn decode_job_id(encoded: &str) -> Result<String> {
    let bytes = URL_SAFE_NO_PAD
        .decode(encoded.trim_end_matches('='))
        .map_err(|_| AppError::InvalidArgument("job id cookie is not base64url".into()))?;
    let job_id = String::from_utf8(bytes)
        .map_err(|_| AppError::InvalidArgument("job id cookie is not UTF-8".into()))?;
    if job_id.is_empty() {
        return Err(AppError::InvalidArgument("job id cookie is empty".into()));
    }
    Ok(job_id)
}

pub fn auth_data_cookie_name(mode: AuthMode) -> &'static str {
    match mode {
        AuthMode::Export => EXPORT_AUTH_DATA_COOKIE,
        AuthMode::Import => IMPORT_AUTH_DATA_COOKIE,
    }
}

/// Parsed callback request
#[derive(Debug, Clone, Default)]
pub struct CallbackRequest {
    /// `{service}` path segment
    pub service_id: String,
    pub oauth_token: Option<String>,
    pub oauth_verifier: Option<String>,
    /// Value of [`JOB_ID_COOKIE`]
    pub encoded_job_id: Option<String>,
    /// Value of [`AUTH_MODE_COOKIE`]
    pub auth_mode: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AuthCookie {
    pub name: String,
    /// Sealed AuthData
    pub value: String,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum CallbackOutcome {
    Redirect { location: String, cookie: AuthCookie },
    Failed { location: String, error: String },
}

impl CallbackOutcome {
    pub fn location(&self) -> &str {
        match self {
            CallbackOutcome::Redirect { location, .. } | CallbackOutcome::Failed { location, .. } => {
                location
            }
        }
    }
}

pub struct OauthCallbackHandler {
    jobs: Arc<dyn JobStore>,
    registry: Arc<ExtensionRegistry>,
    time_provider: Arc<dyn TimeProvider>,
    base_url: String,
    base_api_url: String,
}

impl OauthCallbackHandler {
    pub fn new(
        jobs: Arc<dyn JobStore>,
        registry: Arc<ExtensionRegistry>,
        time_provider: Arc<dyn TimeProvider>,
        base_url: impl Into<String>,
        base_api_url: impl Into<String>,
    ) -> Self {
        Self {
            jobs,
            registry,
            time_provider,
            base_url: base_url.into().trim_end_matches('/').to_string(),
            base_api_url: base_api_url.into(),
        }
    }

    pub async fn handle(&self, request: &CallbackRequest) -> CallbackOutcome {
        match self.complete_authorization(request).await {
            Ok(outcome) => outcome,
            Err(e) => {
                warn!(service = %request.service_id, error = %e, "OAuth callback failed");
                CallbackOutcome::Failed {
                    location: ERROR_PAGE.to_string(),
                    error: e.to_string(),
                }
            }
        }
    }

    async fn complete_authorization(&self, request: &CallbackRequest) -> Result<CallbackOutcome> {
        let token = required(request.oauth_token.as_deref(), "oauth_token")?;
        let verifier = required(request.oauth_verifier.as_deref(), "oauth_verifier")?;

        let encoded_id = required(request.encoded_job_id.as_deref(), JOB_ID_COOKIE)?;
        let job_id = decode_job_id(encoded_id)?;
        let mut job = self
            .jobs
            .find(&job_id)
            .await?
            .ok_or_else(|| AppError::NotFound(format!("Job {} not found", job_id)))?;

        let mode: AuthMode = required(request.auth_mode.as_deref(), AUTH_MODE_COOKIE)?.parse()?;
        let service = job.service_for(mode).to_string();
        if !service.eq_ignore_ascii_case(&request.service_id) {
            return Err(AppError::InvalidArgument(format!(
                "callback for {} does not match {} service {}",
                request.service_id, mode, service
            )));
        }

        let pending = match mode {
            AuthMode::Export => JobState::ExportAuthPending,
            AuthMode::Import => JobState::ImportAuthPending,
        };
        if job.state() != pending {
            return Err(AppError::InvalidState(format!(
                "Job {} is {}, expected {}",
                job_id,
                job.state(),
                pending
            )));
        }

        let generator = self
            .registry
            .auth_generator(&service, job.transfer_data_type, mode)?;
        let key = SessionKey::parse(&job.authorization.session_secret_key)?;

        let sealed_initial = job.encrypted_initial_auth_data(mode).ok_or_else(|| {
            AppError::InvalidState(format!("Job {} has no initial {} auth data", job_id, mode))
        })?;
        let initial = decrypt_auth_data(&key, sealed_initial)?;
        if let AuthData::TokenSecret {
            token: request_token,
            ..
        } = &initial
        {
            if request_token != token {
                return Err(AppError::InvalidArgument(
                    "oauth_token does not match the request token".into(),
                ));
            }
        }

        let auth_data = generator
            .generate_auth_data(
                &callback_url(&self.base_api_url, &service),
                verifier,
                &job_id,
                Some(&initial),
                None,
            )
            .await?;
        let sealed = encrypt_auth_data(&key, &auth_data)?;

        let prior = job.state();
        job.complete_auth(mode, sealed.clone(), self.time_provider.now_millis())?;
        self.jobs.update(&job, prior).await?;

        info!(job_id = %job_id, mode = %mode, service = %service, "Authorization complete");

        let page = match mode {
            AuthMode::Export => NEXT_PAGE,
            AuthMode::Import => COPY_PAGE,
        };
        Ok(CallbackOutcome::Redirect {
            location: format!("{}{}", self.base_url, page),
            cookie: AuthCookie {
                name: auth_data_cookie_name(mode).to_string(),
                value: sealed,
            },
        })
    }
}

fn required<'a>(value: Option<&'a str>, name: &str) -> Result<&'a str> {
    value
        .filter(|v| !v.is_empty())
        .ok_or_else(|| AppError::InvalidArgument(format!("missing {}", name)))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::application::lifecycle::JobLifecycleService;
    use crate::application::registry::{ExtensionContext, ProviderBindings, StaticExtension};
    use crate::domain::{DataVertical, PortabilityJob};
    use crate::port::id_provider::SequentialIdProvider;
    use crate::port::mocks::{InMemoryStore, StaticAppCredentialStore};
    use crate::port::provider::mocks::{MockAuthDataGenerator, MockExporter, MockPhotosImporter};
    use crate::port::time_provider::FixedTimeProvider;

    struct Fixture {
        store: Arc<InMemoryStore>,
        lifecycle: JobLifecycleService,
        handler: OauthCallbackHandler,
        export_generator: Arc<MockAuthDataGenerator>,
    }

    fn fixture() -> Fixture {
        let store = Arc::new(InMemoryStore::new());
        let export_generator = Arc::new(MockAuthDataGenerator::new("T1"));
        let registry = ExtensionRegistry::new(vec![
            Box::new(StaticExtension::new(
                "flickr",
                ProviderBindings::default()
                    .with_exporter(DataVertical::Photos, Arc::new(MockExporter::new(vec![])))
                    .with_auth(DataVertical::Photos, AuthMode::Export, export_generator.clone()),
            )),
            Box::new(StaticExtension::new(
                "smugmug",
                ProviderBindings::default()
                    .with_importer(
                        DataVertical::Photos,
                        Arc::new(MockPhotosImporter::new(Vec::new())),
                    )
                    .with_auth(
                        DataVertical::Photos,
                        AuthMode::Import,
                        Arc::new(MockAuthDataGenerator::new("T2")),
                    ),
            )),
        ]);
        registry.initialize(&ExtensionContext {
            temp_store: store.clone(),
            app_credentials: Arc::new(StaticAppCredentialStore::default()),
            base_url: "https://portability.test".into(),
            base_api_url: "https://api.portability.test".into(),
        });
        let registry = Arc::new(registry);
        let clock = Arc::new(FixedTimeProvider::new(5_000));

        Fixture {
            lifecycle: JobLifecycleService::new(
                store.clone(),
                registry.clone(),
                Arc::new(SequentialIdProvider::default()),
                clock.clone(),
                "https://api.portability.test",
            ),
            handler: OauthCallbackHandler::new(
                store.clone(),
                registry,
                clock,
                "https://portability.test",
                "https://api.portability.test",
            ),
            store,
            export_generator,
        }
    }

    fn request(job: &PortabilityJob, service: &str, mode: &str) -> CallbackRequest {
        CallbackRequest {
            service_id: service.to_string(),
            oauth_token: Some(MockAuthDataGenerator::request_token(&job.id)),
            oauth_verifier: Some("verifier-1".to_string()),
            encoded_job_id: Some(encode_job_id(&job.id)),
            auth_mode: Some(mode.to_string()),
        }
    }

    async fn pending_export_job(f: &Fixture) -> PortabilityJob {
        let job = f
            .lifecycle
            .create_job("flickr", "smugmug", DataVertical::Photos)
            .await
            .unwrap();
        f.lifecycle.initiate_auth(&job.id, AuthMode::Export).await.unwrap();
        job
    }

    #[test]
    fn test_job_id_cookie_roundtrip() {
        let encoded = encode_job_id("7f1c-aa");
        assert!(!encoded.contains('='));
        assert_eq!(decode_job_id(&encoded).unwrap(), "7f1c-aa");
        assert_eq!(decode_job_id(&format!("{}==", encoded)).unwrap(), "7f1c-aa");
        assert!(decode_job_id("***").is_err());
        assert!(decode_job_id("").is_err());
    }

    #[tokio::test]
    async fn test_export_callback_round_trip() {
        let f = fixture();
        let job = pending_export_job(&f).await;

        let outcome = f.handler.handle(&request(&job, "flickr", "EXPORT")).await;
        let (location, cookie) = match outcome {
            CallbackOutcome::Redirect { location, cookie } => (location, cookie),
            other => panic!("unexpected outcome {:?}", other),
        };
        assert_eq!(location, "https://portability.test/next");
        assert_eq!(cookie.name, EXPORT_AUTH_DATA_COOKIE);

        let stored = f.store.find(&job.id).await.unwrap().unwrap();
        assert_eq!(stored.state(), JobState::ExportAuthComplete);
        assert_eq!(stored.encrypted_auth_data(AuthMode::Export), Some(cookie.value.as_str()));

        let key = SessionKey::parse(&stored.authorization.session_secret_key).unwrap();
        let expected = AuthData::token_secret("T1", "secret-verifier-1");
        assert_eq!(decrypt_auth_data(&key, &cookie.value).unwrap(), expected);
        assert_eq!(
            key.decrypt(&cookie.value).unwrap().as_bytes(),
            serde_json::to_string(&expected).unwrap().as_bytes()
        );

        // The generator saw the decrypted request token
        let exchanges = f.export_generator.exchanges();
        assert_eq!(exchanges.len(), 1);
        assert_eq!(exchanges[0].0, "verifier-1");
        assert_eq!(
            exchanges[0].1,
            Some(AuthData::token_secret(
                MockAuthDataGenerator::request_token(&job.id),
                "request-secret"
            ))
        );
    }

    #[tokio::test]
    async fn test_import_callback_redirects_to_copy_page() {
        let f = fixture();
        let job = pending_export_job(&f).await;
        f.handler.handle(&request(&job, "flickr", "export")).await;
        f.lifecycle.initiate_auth(&job.id, AuthMode::Import).await.unwrap();

        let outcome = f.handler.handle(&request(&job, "smugmug", "import")).await;
        assert_eq!(outcome.location(), "https://portability.test/copy");
        let stored = f.store.find(&job.id).await.unwrap().unwrap();
        assert_eq!(stored.state(), JobState::ImportAuthComplete);
    }

    #[tokio::test]
    async fn test_missing_parameters_redirect_to_error() {
        let f = fixture();
        let job = pending_export_job(&f).await;

        let mut no_verifier = request(&job, "flickr", "EXPORT");
        no_verifier.oauth_verifier = Some(String::new());
        let mut no_token = request(&job, "flickr", "EXPORT");
        no_token.oauth_token = None;
        let mut no_cookie = request(&job, "flickr", "EXPORT");
        no_cookie.encoded_job_id = None;
        let mut no_mode = request(&job, "flickr", "EXPORT");
        no_mode.auth_mode = None;

        for req in [no_verifier, no_token, no_cookie, no_mode] {
            let outcome = f.handler.handle(&req).await;
            assert!(matches!(outcome, CallbackOutcome::Failed { .. }));
            assert_eq!(outcome.location(), ERROR_PAGE);
        }
        let stored = f.store.find(&job.id).await.unwrap().unwrap();
        assert_eq!(stored.state(), JobState::ExportAuthPending);
        assert!(f.export_generator.exchanges().is_empty());
    }

    #[tokio::test]
    async fn test_missing_initial_auth_data_is_fatal() {
        let f = fixture();
        let mut job = pending_export_job(&f).await;
        job = f.store.find(&job.id).await.unwrap().unwrap();
        job.authorization.encrypted_initial_export_auth_data = None;
        f.store.update(&job, JobState::ExportAuthPending).await.unwrap();

        let outcome = f.handler.handle(&request(&job, "flickr", "EXPORT")).await;
        match outcome {
            CallbackOutcome::Failed { location, error } => {
                assert_eq!(location, ERROR_PAGE);
                assert!(error.contains("initial"));
            }
            other => panic!("unexpected outcome {:?}", other),
        }
    }

    #[tokio::test]
    async fn test_mismatched_service_or_token_is_rejected() {
        let f = fixture();
        let job = pending_export_job(&f).await;

        let wrong_service = request(&job, "smugmug", "EXPORT");
        assert_eq!(f.handler.handle(&wrong_service).await.location(), ERROR_PAGE);

        let mut wrong_token = request(&job, "flickr", "EXPORT");
        wrong_token.oauth_token = Some("forged".into());
        assert_eq!(f.handler.handle(&wrong_token).await.location(), ERROR_PAGE);

        let unknown_job = CallbackRequest {
            encoded_job_id: Some(encode_job_id("nope")),
            ..request(&job, "flickr", "EXPORT")
        };
        assert_eq!(f.handler.handle(&unknown_job).await.location(), ERROR_PAGE);
    }

    #[tokio::test]
    async fn test_generator_failure_does_not_advance_job() {
        let f = fixture();
        let job = pending_export_job(&f).await;
        let mut rejected = request(&job, "flickr", "EXPORT");
        rejected.oauth_verifier = Some("rejected".into());

        let outcome = f.handler.handle(&rejected).await;
        assert_eq!(outcome.location(), ERROR_PAGE);
        let stored = f.store.find(&job.id).await.unwrap().unwrap();
        assert_eq!(stored.state(), JobState::ExportAuthPending);
        assert!(stored.encrypted_auth_data(AuthMode::Export).is_none());
    }

    #[tokio::test]
    async fn test_replayed_callback_is_rejected() {
        let f = fixture();
        let job = pending_export_job(&f).await;
        let req = request(&job, "flickr", "EXPORT");
        assert!(matches!(f.handler.handle(&req).await, CallbackOutcome::Redirect { .. }));
        assert_eq!(f.handler.handle(&req).await.location(), ERROR_PAGE);
    }
}
