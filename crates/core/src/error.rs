use serde::{Deserialize, Serialize};
use std::fmt;
use thiserror::Error;

/// Failure categories a provider capability may report for one sub-call.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum ProviderErrorKind {
    Timeout,
    RateLimited,
    InvalidInstrument,
    ProviderError,
}

impl ProviderErrorKind {
    /// Invalid input never gets better by asking again.
    pub fn is_retryable(self) -> bool {
        !matches!(self, ProviderErrorKind::InvalidInstrument)
    }
}

impl fmt::Display for ProviderErrorKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            ProviderErrorKind::Timeout => "timeout",
            ProviderErrorKind::RateLimited => "rate-limited",
            ProviderErrorKind::InvalidInstrument => "invalid-instrument",
            ProviderErrorKind::ProviderError => "provider-error",
        };
        f.write_str(s)
    }
}

#[derive(Debug, Clone, PartialEq, Error)]
#[error("{kind}: {message}")]
pub struct ProviderError {
    pub kind: ProviderErrorKind,
    pub message: String,
}

impl ProviderError {
    pub fn new(kind: ProviderErrorKind, message: impl Into<String>) -> Self {
        Self {
            kind,
            message: message.into(),
        }
    }

    pub fn timeout(message: impl Into<String>) -> Self {
        Self::new(ProviderErrorKind::Timeout, message)
    }

    pub fn rate_limited(message: impl Into<String>) -> Self {
        Self::new(ProviderErrorKind::RateLimited, message)
    }

    pub fn invalid_instrument(message: impl Into<String>) -> Self {
        Self::new(ProviderErrorKind::InvalidInstrument, message)
    }

    pub fn provider(message: impl Into<String>) -> Self {
        Self::new(ProviderErrorKind::ProviderError, message)
    }
}

pub type ProviderResult<T> = std::result::Result<T, ProviderError>;

/// Failure kinds surfaced to callers as report data.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum FailureKind {
    ProviderTimeout,
    ProviderRateLimited,
    ProviderInvalidInput,
    ProviderUnavailable,
    InstrumentFailed,
    InsufficientSuccesses,
    ConfigInvalid,
}

impl From<ProviderErrorKind> for FailureKind {
    fn from(kind: ProviderErrorKind) -> Self {
        match kind {
            ProviderErrorKind::Timeout => FailureKind::ProviderTimeout,
            ProviderErrorKind::RateLimited => FailureKind::ProviderRateLimited,
            ProviderErrorKind::InvalidInstrument => FailureKind::ProviderInvalidInput,
            ProviderErrorKind::ProviderError => FailureKind::ProviderUnavailable,
        }
    }
}

impl fmt::Display for FailureKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            FailureKind::ProviderTimeout => "provider-timeout",
            FailureKind::ProviderRateLimited => "provider-rate-limited",
            FailureKind::ProviderInvalidInput => "provider-invalid-input",
            FailureKind::ProviderUnavailable => "provider-unavailable",
            FailureKind::InstrumentFailed => "instrument-failed",
            FailureKind::InsufficientSuccesses => "insufficient-successes",
            FailureKind::ConfigInvalid => "config-invalid",
        };
        f.write_str(s)
    }
}

/// Errors that stop a pipeline run before any analysis work starts.
#[derive(Debug, Clone, PartialEq, Error)]
pub enum PipelineError {
    #[error("invalid pipeline configuration: {0}")]
    ConfigInvalid(String),
}

impl PipelineError {
    pub fn kind(&self) -> FailureKind {
        match self {
            PipelineError::ConfigInvalid(_) => FailureKind::ConfigInvalid,
        }
    }
}
