// Domain Error Types

use thiserror::Error;

#[derive(Error, Debug)]
pub enum DomainError {
    #[error("Invalid job state transition: {from} -> {to}")]
    InvalidStateTransition { from: String, to: String },

    #[error("Unknown data vertical: {0}")]
    UnknownDataVertical(String),

    #[error("Unknown auth mode: {0}")]
    UnknownAuthMode(String),

    #[error("Validation error: {0}")]
    ValidationError(String),
}

pub type Result<T> = std::result::Result<T, DomainError>;

/// Failure reported by a provider adapter while exporting or importing an item.
///
/// `Fatal` failures are never retried or skipped. `Provider` failures are
/// handed to the retry strategy library, which picks a strategy by matching
/// the message.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum TransferError {
    #[error("provider error: {0}")]
    Provider(String),

    #[error("destination full: {0}")]
    DestinationFull(String),

    #[error("fatal error: {0}")]
    Fatal(String),
}

impl TransferError {
    pub fn provider(msg: impl Into<String>) -> Self {
        Self::Provider(msg.into())
    }

    pub fn fatal(msg: impl Into<String>) -> Self {
        Self::Fatal(msg.into())
    }

    pub fn is_fatal(&self) -> bool {
        matches!(self, Self::Fatal(_) | Self::DestinationFull(_))
    }

    pub fn message(&self) -> &str {
        match self {
            Self::Provider(m) | Self::DestinationFull(m) | Self::Fatal(m) => m,
        }
    }
}
