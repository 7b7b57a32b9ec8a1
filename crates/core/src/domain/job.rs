// Portability Job Domain Model

use crate::domain::error::{DomainError, Result};
use serde::{Deserialize, Serialize};
use std::str::FromStr;

/// Job ID (UUID v4)
pub type JobId = String;

/// Job State
///
/// Linear authorization flow followed by the transfer phase:
/// CREATED -> EXPORT_AUTH_PENDING -> EXPORT_AUTH_COMPLETE -> IMPORT_AUTH_PENDING
/// -> IMPORT_AUTH_COMPLETE -> TRANSFER_IN_PROGRESS -> COMPLETE | ERROR
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum JobState {
    Created,
    ExportAuthPending,
    ExportAuthComplete,
    ImportAuthPending,
    ImportAuthComplete,
    TransferInProgress,
    Complete,
    Error,
}

impl JobState {
    pub fn is_terminal(self) -> bool {
        matches!(self, JobState::Complete | JobState::Error)
    }

    /// Whether `next` is a legal successor of this state.
    ///
    /// Re-entering a pending state is allowed (re-authorization overwrites the
    /// initial auth data). Any non-terminal state may fall to ERROR.
    pub fn can_transition_to(self, next: JobState) -> bool {
        use JobState::*;

        if next == Error {
            return !self.is_terminal();
        }

        matches!(
            (self, next),
            (Created, ExportAuthPending)
                | (ExportAuthPending, ExportAuthPending)
                | (ExportAuthPending, ExportAuthComplete)
                | (ExportAuthComplete, ImportAuthPending)
                | (ImportAuthPending, ImportAuthPending)
                | (ImportAuthPending, ImportAuthComplete)
                | (ImportAuthComplete, TransferInProgress)
                | (TransferInProgress, Complete)
        )
    }
}

impl std::fmt::Display for JobState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            JobState::Created => write!(f, "CREATED"),
            JobState::ExportAuthPending => write!(f, "EXPORT_AUTH_PENDING"),
            JobState::ExportAuthComplete => write!(f, "EXPORT_AUTH_COMPLETE"),
            JobState::ImportAuthPending => write!(f, "IMPORT_AUTH_PENDING"),
            JobState::ImportAuthComplete => write!(f, "IMPORT_AUTH_COMPLETE"),
            JobState::TransferInProgress => write!(f, "TRANSFER_IN_PROGRESS"),
            JobState::Complete => write!(f, "COMPLETE"),
            JobState::Error => write!(f, "ERROR"),
        }
    }
}

impl FromStr for JobState {
    type Err = DomainError;

    fn from_str(s: &str) -> Result<Self> {
        match s {
            "CREATED" => Ok(JobState::Created),
            "EXPORT_AUTH_PENDING" => Ok(JobState::ExportAuthPending),
            "EXPORT_AUTH_COMPLETE" => Ok(JobState::ExportAuthComplete),
            "IMPORT_AUTH_PENDING" => Ok(JobState::ImportAuthPending),
            "IMPORT_AUTH_COMPLETE" => Ok(JobState::ImportAuthComplete),
            "TRANSFER_IN_PROGRESS" => Ok(JobState::TransferInProgress),
            "COMPLETE" => Ok(JobState::Complete),
            "ERROR" => Ok(JobState::Error),
            other => Err(DomainError::ValidationError(format!(
                "unknown job state: {}",
                other
            ))),
        }
    }
}

/// Data vertical (category of data being transferred)
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum DataVertical {
    Photos,
    Videos,
    Media,
    Calendar,
    Contacts,
    SocialPosts,
    Tasks,
}

impl std::fmt::Display for DataVertical {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            DataVertical::Photos => write!(f, "PHOTOS"),
            DataVertical::Videos => write!(f, "VIDEOS"),
            DataVertical::Media => write!(f, "MEDIA"),
            DataVertical::Calendar => write!(f, "CALENDAR"),
            DataVertical::Contacts => write!(f, "CONTACTS"),
            DataVertical::SocialPosts => write!(f, "SOCIAL_POSTS"),
            DataVertical::Tasks => write!(f, "TASKS"),
        }
    }
}

impl FromStr for DataVertical {
    type Err = DomainError;

    fn from_str(s: &str) -> Result<Self> {
        match s.to_ascii_uppercase().as_str() {
            "PHOTOS" => Ok(DataVertical::Photos),
            "VIDEOS" => Ok(DataVertical::Videos),
            "MEDIA" => Ok(DataVertical::Media),
            "CALENDAR" => Ok(DataVertical::Calendar),
            "CONTACTS" => Ok(DataVertical::Contacts),
            "SOCIAL_POSTS" | "SOCIAL" => Ok(DataVertical::SocialPosts),
            "TASKS" => Ok(DataVertical::Tasks),
            _ => Err(DomainError::UnknownDataVertical(s.to_string())),
        }
    }
}

/// Authorization direction
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum AuthMode {
    Export,
    Import,
}

impl std::fmt::Display for AuthMode {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            AuthMode::Export => write!(f, "EXPORT"),
            AuthMode::Import => write!(f, "IMPORT"),
        }
    }
}

impl FromStr for AuthMode {
    type Err = DomainError;

    fn from_str(s: &str) -> Result<Self> {
        match s.to_ascii_uppercase().as_str() {
            "EXPORT" => Ok(AuthMode::Export),
            "IMPORT" => Ok(AuthMode::Import),
            _ => Err(DomainError::UnknownAuthMode(s.to_string())),
        }
    }
}

/// Authorization record of a job.
///
/// All auth data fields hold ciphertext produced with `session_secret_key`.
#[derive(Clone, Serialize, Deserialize)]
pub struct JobAuthorization {
    pub state: JobState,
    /// base64url key material, generated once per job
    pub session_secret_key: String,
    pub encrypted_initial_export_auth_data: Option<String>,
    pub encrypted_initial_import_auth_data: Option<String>,
    pub encrypted_export_auth_data: Option<String>,
    pub encrypted_import_auth_data: Option<String>,
}

impl std::fmt::Debug for JobAuthorization {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("JobAuthorization")
            .field("state", &self.state)
            .field("session_secret_key", &"<redacted>")
            .field(
                "has_initial_export_auth_data",
                &self.encrypted_initial_export_auth_data.is_some(),
            )
            .field(
                "has_initial_import_auth_data",
                &self.encrypted_initial_import_auth_data.is_some(),
            )
            .field("has_export_auth_data", &self.encrypted_export_auth_data.is_some())
            .field("has_import_auth_data", &self.encrypted_import_auth_data.is_some())
            .finish()
    }
}

/// Portability Job Entity
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PortabilityJob {
    pub id: JobId,
    pub export_service: String,
    pub import_service: String,
    pub transfer_data_type: DataVertical,
    pub authorization: JobAuthorization,

    pub created_at: i64, // epoch ms
    pub updated_at: i64,

    pub bytes_transferred: i64,
    pub failure_reason: Option<String>,
    pub cancel_requested: bool,
}

impl PortabilityJob {
    /// Create a new job in CREATED state
    ///
    /// # Arguments
    ///
    /// * `id` - Unique job ID (injected, not generated)
    /// * `created_at` - Creation timestamp in epoch ms (injected, not system time)
    /// * `session_secret_key` - Encoded per-job session key
    pub fn new(
        id: impl Into<String>,
        created_at: i64,
        export_service: impl Into<String>,
        import_service: impl Into<String>,
        transfer_data_type: DataVertical,
        session_secret_key: impl Into<String>,
    ) -> Self {
        Self {
            id: id.into(),
            export_service: export_service.into(),
            import_service: import_service.into(),
            transfer_data_type,
            authorization: JobAuthorization {
                state: JobState::Created,
                session_secret_key: session_secret_key.into(),
                encrypted_initial_export_auth_data: None,
                encrypted_initial_import_auth_data: None,
                encrypted_export_auth_data: None,
                encrypted_import_auth_data: None,
            },
            created_at,
            updated_at: created_at,
            bytes_transferred: 0,
            failure_reason: None,
            cancel_requested: false,
        }
    }

    pub fn state(&self) -> JobState {
        self.authorization.state
    }

    /// Service on the given side of the transfer
    pub fn service_for(&self, mode: AuthMode) -> &str {
        match mode {
            AuthMode::Export => &self.export_service,
            AuthMode::Import => &self.import_service,
        }
    }

    pub fn encrypted_initial_auth_data(&self, mode: AuthMode) -> Option<&str> {
        match mode {
            AuthMode::Export => self.authorization.encrypted_initial_export_auth_data.as_deref(),
            AuthMode::Import => self.authorization.encrypted_initial_import_auth_data.as_deref(),
        }
    }

    pub fn encrypted_auth_data(&self, mode: AuthMode) -> Option<&str> {
        match mode {
            AuthMode::Export => self.authorization.encrypted_export_auth_data.as_deref(),
            AuthMode::Import => self.authorization.encrypted_import_auth_data.as_deref(),
        }
    }

    fn transition(&mut self, next: JobState, now_millis: i64) -> Result<()> {
        let current = self.state();
        if !current.can_transition_to(next) {
            return Err(DomainError::InvalidStateTransition {
                from: current.to_string(),
                to: next.to_string(),
            });
        }
        self.authorization.state = next;
        self.updated_at = now_millis;
        Ok(())
    }

    /// Enter `*_AUTH_PENDING` for the given direction.
    ///
    /// Export authorization starts from CREATED, import authorization only
    /// after export authorization completed.
    pub fn begin_auth(
        &mut self,
        mode: AuthMode,
        encrypted_initial_auth_data: Option<String>,
        now_millis: i64,
    ) -> Result<()> {
        let next = match mode {
            AuthMode::Export => JobState::ExportAuthPending,
            AuthMode::Import => JobState::ImportAuthPending,
        };
        self.transition(next, now_millis)?;
        match mode {
            AuthMode::Export => {
                self.authorization.encrypted_initial_export_auth_data = encrypted_initial_auth_data
            }
            AuthMode::Import => {
                self.authorization.encrypted_initial_import_auth_data = encrypted_initial_auth_data
            }
        }
        Ok(())
    }

    /// Record the final encrypted credentials and enter `*_AUTH_COMPLETE`
    pub fn complete_auth(
        &mut self,
        mode: AuthMode,
        encrypted_auth_data: String,
        now_millis: i64,
    ) -> Result<()> {
        let next = match mode {
            AuthMode::Export => JobState::ExportAuthComplete,
            AuthMode::Import => JobState::ImportAuthComplete,
        };
        self.transition(next, now_millis)?;
        match mode {
            AuthMode::Export => self.authorization.encrypted_export_auth_data = Some(encrypted_auth_data),
            AuthMode::Import => self.authorization.encrypted_import_auth_data = Some(encrypted_auth_data),
        }
        Ok(())
    }

    /// Enter TRANSFER_IN_PROGRESS (requires both directions authorized)
    pub fn begin_transfer(&mut self, now_millis: i64) -> Result<()> {
        if self.authorization.encrypted_export_auth_data.is_none()
            || self.authorization.encrypted_import_auth_data.is_none()
        {
            return Err(DomainError::InvalidStateTransition {
                from: format!("{} (missing credentials)", self.state()),
                to: JobState::TransferInProgress.to_string(),
            });
        }
        self.transition(JobState::TransferInProgress, now_millis)
    }

    /// Transition to COMPLETE with the final byte count
    pub fn complete(&mut self, bytes_transferred: i64, now_millis: i64) -> Result<()> {
        self.transition(JobState::Complete, now_millis)?;
        self.bytes_transferred = bytes_transferred;
        Ok(())
    }

    /// Transition to ERROR with a reason (no internal detail reaches end users)
    pub fn fail(&mut self, reason: impl Into<String>, now_millis: i64) -> Result<()> {
        self.transition(JobState::Error, now_millis)?;
        self.failure_reason = Some(reason.into());
        Ok(())
    }
}
