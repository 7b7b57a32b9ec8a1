// Retry strategies and the strategy library consulted by the import executor
use crate::domain::TransferError;
use crate::error::{AppError, Result};
use serde::{Deserialize, Serialize};

/// Fixed-interval retry parameters
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", try_from = "UniformRetryConfig")]
pub struct UniformRetryStrategy {
    max_attempts: u32,
    interval_millis: i64,
    identifier: String,
}

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
struct UniformRetryConfig {
    max_attempts: u32,
    interval_millis: i64,
    #[serde(default)]
    identifier: String,
}

impl TryFrom<UniformRetryConfig> for UniformRetryStrategy {
    type Error = AppError;

    fn try_from(c: UniformRetryConfig) -> Result<Self> {
        UniformRetryStrategy::new(c.max_attempts, c.interval_millis, c.identifier)
    }
}

impl UniformRetryStrategy {
    /// # Errors
    /// - `AppError::InvalidArgument` if `max_attempts == 0` or `interval_millis <= 0`
    pub fn new(max_attempts: u32, interval_millis: i64, identifier: impl Into<String>) -> Result<Self> {
        if max_attempts == 0 {
            return Err(AppError::InvalidArgument("Max attempts should be > 0".into()));
        }
        if interval_millis <= 0 {
            return Err(AppError::InvalidArgument("Interval should be > 0".into()));
        }
        Ok(Self {
            max_attempts,
            interval_millis,
            identifier: identifier.into(),
        })
    }

    pub fn max_attempts(&self) -> u32 {
        self.max_attempts
    }

    pub fn interval_millis(&self) -> i64 {
        self.interval_millis
    }

    pub fn identifier(&self) -> &str {
        &self.identifier
    }
}

/// Exponential backoff parameters: interval = initial * multiplier^(attempts - 1)
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", try_from = "ExponentialBackoffConfig")]
pub struct ExponentialBackoffStrategy {
    max_attempts: u32,
    initial_interval_millis: i64,
    multiplier: f64,
}

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
struct ExponentialBackoffConfig {
    max_attempts: u32,
    initial_interval_millis: i64,
    multiplier: f64,
}

impl TryFrom<ExponentialBackoffConfig> for ExponentialBackoffStrategy {
    type Error = AppError;

    fn try_from(c: ExponentialBackoffConfig) -> Result<Self> {
        ExponentialBackoffStrategy::new(c.max_attempts, c.initial_interval_millis, c.multiplier)
    }
}

impl ExponentialBackoffStrategy {
    pub fn new(max_attempts: u32, initial_interval_millis: i64, multiplier: f64) -> Result<Self> {
        if max_attempts == 0 {
            return Err(AppError::InvalidArgument("Max attempts should be > 0".into()));
        }
        if initial_interval_millis <= 0 {
            return Err(AppError::InvalidArgument("Initial interval should be > 0".into()));
        }
        if !(multiplier >= 1.0) {
            return Err(AppError::InvalidArgument("Multiplier should be >= 1.0".into()));
        }
        Ok(Self {
            max_attempts,
            initial_interval_millis,
            multiplier,
        })
    }

    fn interval_for(&self, tries: u32) -> i64 {
        let exponent = tries.saturating_sub(1).min(i32::MAX as u32) as i32;
        let interval = self.initial_interval_millis as f64 * self.multiplier.powi(exponent);
        if interval >= i64::MAX as f64 {
            i64::MAX
        } else {
            interval as i64
        }
    }
}

/// Retry policy value.
///
/// Strategies are immutable and stateless: the attempt count is always passed
/// in by the caller. `tries` counts attempts already made, so after the first
/// failure the executor asks `can_try_again(1)`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type")]
pub enum RetryStrategy {
    /// Never retry, failure may be skipped (known non-fatal errors)
    Skip,
    /// Never retry, failure is fatal to the job
    NoRetry,
    /// Fixed interval retries, failure is fatal once exhausted
    Uniform(UniformRetryStrategy),
    /// Fixed interval retries, failure may be skipped once exhausted
    UniformRetrySkip(UniformRetryStrategy),
    /// Growing interval retries, failure is fatal once exhausted
    ExponentialBackoff(ExponentialBackoffStrategy),
}

impl RetryStrategy {
    pub fn uniform_retry_skip(
        max_attempts: u32,
        interval_millis: i64,
        identifier: impl Into<String>,
    ) -> Result<Self> {
        Ok(RetryStrategy::UniformRetrySkip(UniformRetryStrategy::new(
            max_attempts,
            interval_millis,
            identifier,
        )?))
    }

    pub fn uniform(max_attempts: u32, interval_millis: i64, identifier: impl Into<String>) -> Result<Self> {
        Ok(RetryStrategy::Uniform(UniformRetryStrategy::new(
            max_attempts,
            interval_millis,
            identifier,
        )?))
    }

    pub fn can_try_again(&self, tries: u32) -> bool {
        match self {
            RetryStrategy::Skip | RetryStrategy::NoRetry => false,
            RetryStrategy::Uniform(u) | RetryStrategy::UniformRetrySkip(u) => tries <= u.max_attempts,
            RetryStrategy::ExponentialBackoff(e) => tries <= e.max_attempts,
        }
    }

    /// Wait before the next attempt; -1 when the strategy forbids retrying
    pub fn next_interval_millis(&self, tries: u32) -> i64 {
        match self {
            RetryStrategy::Skip | RetryStrategy::NoRetry => -1,
            RetryStrategy::Uniform(u) | RetryStrategy::UniformRetrySkip(u) => u.interval_millis,
            RetryStrategy::ExponentialBackoff(e) => e.interval_for(tries),
        }
    }

    /// Remaining wait given the time already spent since the last failure
    ///
    /// # Errors
    /// - `AppError::InvalidState` if `tries` exceeds the configured maximum
    pub fn remaining_interval_millis(&self, tries: u32, elapsed_millis: i64) -> Result<i64> {
        match self {
            RetryStrategy::Skip | RetryStrategy::NoRetry => Ok(-1),
            RetryStrategy::Uniform(u) | RetryStrategy::UniformRetrySkip(u) => {
                if tries > u.max_attempts {
                    return Err(AppError::InvalidState(format!(
                        "No retries left ({} > {})",
                        tries, u.max_attempts
                    )));
                }
                Ok(u.interval_millis - elapsed_millis)
            }
            RetryStrategy::ExponentialBackoff(e) => {
                if tries > e.max_attempts {
                    return Err(AppError::InvalidState(format!(
                        "No retries left ({} > {})",
                        tries, e.max_attempts
                    )));
                }
                Ok(e.interval_for(tries) - elapsed_millis)
            }
        }
    }

    /// Whether an exhausted failure may be recorded as skipped instead of failing the job
    pub fn can_skip(&self) -> bool {
        matches!(self, RetryStrategy::Skip | RetryStrategy::UniformRetrySkip(_))
    }
}

impl std::fmt::Display for RetryStrategy {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            RetryStrategy::Skip => write!(f, "SkipRetryStrategy{{}}"),
            RetryStrategy::NoRetry => write!(f, "NoRetryStrategy{{}}"),
            RetryStrategy::Uniform(u) => write!(
                f,
                "UniformRetryStrategy{{maxAttempts={}, intervalMillis={}, identifier={}}}",
                u.max_attempts, u.interval_millis, u.identifier
            ),
            RetryStrategy::UniformRetrySkip(u) => write!(
                f,
                "UniformRetrySkipStrategy{{maxAttempts={}, intervalMillis={}, identifier={}}}",
                u.max_attempts, u.interval_millis, u.identifier
            ),
            RetryStrategy::ExponentialBackoff(e) => write!(
                f,
                "ExponentialBackoffStrategy{{maxAttempts={}, initialIntervalMillis={}, multiplier={}}}",
                e.max_attempts, e.initial_interval_millis, e.multiplier
            ),
        }
    }
}

/// Error-message fragments mapped to a strategy
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RetryMapping {
    pub patterns: Vec<String>,
    pub strategy: RetryStrategy,
}

impl RetryMapping {
    fn matches(&self, message: &str) -> bool {
        let message = message.to_lowercase();
        self.patterns
            .iter()
            .any(|p| message.contains(&p.to_lowercase()))
    }
}

/// Ordered rules choosing a strategy for a provider failure.
///
/// The first mapping with a pattern contained in the error message wins;
/// otherwise `default_strategy` applies.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RetryStrategyLibrary {
    #[serde(default)]
    pub mappings: Vec<RetryMapping>,
    pub default_strategy: RetryStrategy,
}

impl RetryStrategyLibrary {
    pub fn new(mappings: Vec<RetryMapping>, default_strategy: RetryStrategy) -> Self {
        Self {
            mappings,
            default_strategy,
        }
    }

    /// Library applying one strategy to every failure
    pub fn uniform(strategy: RetryStrategy) -> Self {
        Self::new(Vec::new(), strategy)
    }

    pub fn from_json(json: &str) -> Result<Self> {
        Ok(serde_json::from_str(json)?)
    }

    pub fn strategy_for(&self, error: &TransferError) -> &RetryStrategy {
        self.mappings
            .iter()
            .find(|m| m.matches(error.message()))
            .map(|m| &m.strategy)
            .unwrap_or(&self.default_strategy)
    }
}

impl Default for RetryStrategyLibrary {
    /// Three retries one second apart, then skip the item
    fn default() -> Self {
        Self::uniform(RetryStrategy::UniformRetrySkip(UniformRetryStrategy {
            max_attempts: 3,
            interval_millis: 1000,
            identifier: "default".to_string(),
        }))
    }
}
