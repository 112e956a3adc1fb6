//! Hosting provider errors
//!
//! Backends fail in vendor-specific prose; adapters translate every failure
//! into a structured code so retry policy is decided once, against the code,
//! never against wording.

use serde::{Deserialize, Serialize};
use thiserror::Error;

pub type ProviderResult<T> = Result<T, ProviderError>;

/// Stable classification of a provider failure
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ProviderErrorCode {
    /// Upstream rate limit hit
    RateLimited,
    /// Transient IP allocation conflict
    IpConflict,
    /// Generated password rejected by backend validation
    WeakPassword,
    /// Request deadline exceeded
    Timeout,
    /// Connection-level failure
    Network,
    /// Order/product configuration the backend refuses outright
    InvalidConfiguration,
    /// Credentials rejected by the backend
    AuthFailed,
    /// Operation the backend cannot perform
    UnsupportedOperation,
    /// Any other backend-reported error
    Backend,
}

impl ProviderErrorCode {
    pub fn as_str(&self) -> &'static str {
        match self {
            ProviderErrorCode::RateLimited => "rate_limited",
            ProviderErrorCode::IpConflict => "ip_conflict",
            ProviderErrorCode::WeakPassword => "weak_password",
            ProviderErrorCode::Timeout => "timeout",
            ProviderErrorCode::Network => "network",
            ProviderErrorCode::InvalidConfiguration => "invalid_configuration",
            ProviderErrorCode::AuthFailed => "auth_failed",
            ProviderErrorCode::UnsupportedOperation => "unsupported_operation",
            ProviderErrorCode::Backend => "backend",
        }
    }

    pub fn parse(value: &str) -> Option<Self> {
        match value {
            "rate_limited" => Some(ProviderErrorCode::RateLimited),
            "ip_conflict" => Some(ProviderErrorCode::IpConflict),
            "weak_password" => Some(ProviderErrorCode::WeakPassword),
            "timeout" => Some(ProviderErrorCode::Timeout),
            "network" => Some(ProviderErrorCode::Network),
            "invalid_configuration" => Some(ProviderErrorCode::InvalidConfiguration),
            "auth_failed" => Some(ProviderErrorCode::AuthFailed),
            "unsupported_operation" => Some(ProviderErrorCode::UnsupportedOperation),
            "backend" => Some(ProviderErrorCode::Backend),
            _ => None,
        }
    }

    /// Whether a fresh attempt has a chance of succeeding
    pub fn is_retryable(&self) -> bool {
        match self {
            ProviderErrorCode::RateLimited
            | ProviderErrorCode::IpConflict
            | ProviderErrorCode::WeakPassword
            | ProviderErrorCode::Timeout
            | ProviderErrorCode::Network => true,
            ProviderErrorCode::InvalidConfiguration
            | ProviderErrorCode::AuthFailed
            | ProviderErrorCode::UnsupportedOperation
            | ProviderErrorCode::Backend => false,
        }
    }
}

#[derive(Debug, Clone, Error)]
#[error("provider={provider} code={} message={message}", code.as_str())]
pub struct ProviderError {
    pub provider: String,
    pub code: ProviderErrorCode,
    pub message: String,
}

impl ProviderError {
    pub fn new(
        provider: impl Into<String>,
        code: ProviderErrorCode,
        message: impl Into<String>,
    ) -> Self {
        Self {
            provider: provider.into(),
            code,
            message: message.into(),
        }
    }

    pub fn network(provider: impl Into<String>, message: impl Into<String>) -> Self {
        Self::new(provider, ProviderErrorCode::Network, message)
    }

    pub fn timeout(provider: impl Into<String>, message: impl Into<String>) -> Self {
        Self::new(provider, ProviderErrorCode::Timeout, message)
    }

    pub fn rate_limited(provider: impl Into<String>, message: impl Into<String>) -> Self {
        Self::new(provider, ProviderErrorCode::RateLimited, message)
    }

    pub fn backend(provider: impl Into<String>, message: impl Into<String>) -> Self {
        Self::new(provider, ProviderErrorCode::Backend, message)
    }

    pub fn unsupported(provider: impl Into<String>, operation: &str) -> Self {
        Self::new(
            provider,
            ProviderErrorCode::UnsupportedOperation,
            format!("operation '{}' has no backend API", operation),
        )
    }

    pub fn is_retryable(&self) -> bool {
        self.code.is_retryable()
    }

    /// Error string persisted on the order; carries the code as a bracketed
    /// prefix so a later sweep can re-classify without guessing from prose.
    pub fn persisted_message(&self) -> String {
        format!("[{}] {}", self.code.as_str(), self.message)
    }
}

impl From<ProviderError> for crate::error::AppError {
    fn from(err: ProviderError) -> Self {
        use crate::error::{AppError, AppErrorKind, ExternalError};

        AppError::new(AppErrorKind::External(ExternalError::HostingProvider {
            provider: err.provider.clone(),
            message: err.message.clone(),
            is_retryable: err.is_retryable(),
        }))
    }
}
