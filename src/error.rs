//! Unified error handling for the Nimbus backend
//!
//! Layer-specific errors (gateway, provider, database) are converted into a
//! single `AppError` at the HTTP boundary, with proper status mapping,
//! user-safe messages and structured error codes for client handling.

use serde::{Deserialize, Serialize};
use std::fmt;

/// Error codes for programmatic handling by API clients
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub enum ErrorCode {
    // Domain errors (4xx)
    #[serde(rename = "ORDER_NOT_FOUND")]
    OrderNotFound,
    #[serde(rename = "ORDER_NOT_CONFIRMED")]
    OrderNotConfirmed,
    #[serde(rename = "DUPLICATE_RENEWAL")]
    DuplicateRenewal,
    #[serde(rename = "DUPLICATE_ACTION_REQUEST")]
    DuplicateActionRequest,
    #[serde(rename = "ACTION_NOT_PERMITTED")]
    ActionNotPermitted,
    #[serde(rename = "ACTION_REQUEST_NOT_FOUND")]
    ActionRequestNotFound,

    // Infrastructure errors (5xx)
    #[serde(rename = "DATABASE_ERROR")]
    DatabaseError,
    #[serde(rename = "CONFIGURATION_ERROR")]
    ConfigurationError,

    // External errors (502, 503, 504)
    #[serde(rename = "PAYMENT_GATEWAY_ERROR")]
    PaymentGatewayError,
    #[serde(rename = "HOSTING_PROVIDER_ERROR")]
    HostingProviderError,
    #[serde(rename = "RATE_LIMIT_ERROR")]
    RateLimitError,
    #[serde(rename = "EXTERNAL_SERVICE_TIMEOUT")]
    ExternalServiceTimeout,

    // Generic
    #[serde(rename = "INTERNAL_ERROR")]
    InternalError,
    #[serde(rename = "VALIDATION_ERROR")]
    ValidationError,
}

/// Domain-specific business logic errors
#[derive(Debug, Clone)]
pub enum DomainError {
    /// Order with the given id doesn't exist
    OrderNotFound { order_id: String },
    /// Operation requires a confirmed payment
    OrderNotConfirmed { order_id: String, status: String },
    /// A renewal with the same transaction id was already applied
    DuplicateRenewal { renewal_txn_id: String },
    /// A pending request for the same (order, action) pair already exists
    DuplicateActionRequest { order_id: String, action: String },
    /// Manual action requested for an order the provider controls directly
    ActionNotPermitted { order_id: String, reason: String },
    /// Server action request doesn't exist
    ActionRequestNotFound { request_id: String },
}

/// Infrastructure-level errors (database, configuration)
#[derive(Debug, Clone)]
pub enum InfrastructureError {
    /// Database connection or query failure
    Database { message: String, is_retryable: bool },
    /// Missing or invalid configuration
    Configuration { message: String },
}

/// External service errors (payment gateways, hosting providers)
#[derive(Debug, Clone)]
pub enum ExternalError {
    /// Payment gateway (PayLane, ZipPay, UpiStack) error
    PaymentGateway {
        gateway: String,
        message: String,
        is_retryable: bool,
    },
    /// Hosting provider (SkyStack, RockVM) error
    HostingProvider {
        provider: String,
        message: String,
        is_retryable: bool,
    },
    /// Rate limit exceeded
    RateLimit {
        service: String,
        retry_after: Option<u64>,
    },
    /// External service timeout
    Timeout { service: String, timeout_secs: u64 },
}

/// Input validation errors
#[derive(Debug, Clone)]
pub enum ValidationError {
    /// Required field missing
    MissingField { field: String },
    /// Field holds an unacceptable value
    InvalidField { field: String, reason: String },
}

/// Unified application error type
#[derive(Debug, Clone)]
pub struct AppError {
    pub kind: AppErrorKind,
    pub request_id: Option<String>,
    pub context: Option<String>,
}

#[derive(Debug, Clone)]
pub enum AppErrorKind {
    Domain(DomainError),
    Infrastructure(InfrastructureError),
    External(ExternalError),
    Validation(ValidationError),
}

impl AppError {
    pub fn new(kind: AppErrorKind) -> Self {
        Self {
            kind,
            request_id: None,
            context: None,
        }
    }

    pub fn with_request_id(mut self, request_id: impl Into<String>) -> Self {
        self.request_id = Some(request_id.into());
        self
    }

    pub fn with_context(mut self, context: impl Into<String>) -> Self {
        self.context = Some(context.into());
        self
    }

    /// Map error to HTTP status code
    pub fn status_code(&self) -> u16 {
        match &self.kind {
            AppErrorKind::Domain(err) => match err {
                DomainError::OrderNotFound { .. } => 404,
                DomainError::OrderNotConfirmed { .. } => 409,
                DomainError::DuplicateRenewal { .. } => 409,
                DomainError::DuplicateActionRequest { .. } => 409,
                DomainError::ActionNotPermitted { .. } => 422,
                DomainError::ActionRequestNotFound { .. } => 404,
            },
            AppErrorKind::Infrastructure(err) => match err {
                InfrastructureError::Database { .. } => 500,
                InfrastructureError::Configuration { .. } => 500,
            },
            AppErrorKind::External(err) => match err {
                ExternalError::PaymentGateway { .. } => 502,
                ExternalError::HostingProvider { .. } => 502,
                ExternalError::RateLimit { .. } => 429,
                ExternalError::Timeout { .. } => 504,
            },
            AppErrorKind::Validation(_) => 400,
        }
    }

    /// Get error code for client handling
    pub fn error_code(&self) -> ErrorCode {
        match &self.kind {
            AppErrorKind::Domain(err) => match err {
                DomainError::OrderNotFound { .. } => ErrorCode::OrderNotFound,
                DomainError::OrderNotConfirmed { .. } => ErrorCode::OrderNotConfirmed,
                DomainError::DuplicateRenewal { .. } => ErrorCode::DuplicateRenewal,
                DomainError::DuplicateActionRequest { .. } => ErrorCode::DuplicateActionRequest,
                DomainError::ActionNotPermitted { .. } => ErrorCode::ActionNotPermitted,
                DomainError::ActionRequestNotFound { .. } => ErrorCode::ActionRequestNotFound,
            },
            AppErrorKind::Infrastructure(err) => match err {
                InfrastructureError::Database { .. } => ErrorCode::DatabaseError,
                InfrastructureError::Configuration { .. } => ErrorCode::ConfigurationError,
            },
            AppErrorKind::External(err) => match err {
                ExternalError::PaymentGateway { .. } => ErrorCode::PaymentGatewayError,
                ExternalError::HostingProvider { .. } => ErrorCode::HostingProviderError,
                ExternalError::RateLimit { .. } => ErrorCode::RateLimitError,
                ExternalError::Timeout { .. } => ErrorCode::ExternalServiceTimeout,
            },
            AppErrorKind::Validation(_) => ErrorCode::ValidationError,
        }
    }

    /// Get user-friendly error message
    pub fn user_message(&self) -> String {
        match &self.kind {
            AppErrorKind::Domain(err) => match err {
                DomainError::OrderNotFound { order_id } => {
                    format!("Order '{}' not found", order_id)
                }
                DomainError::OrderNotConfirmed { order_id, status } => {
                    format!(
                        "Order '{}' has payment status '{}'; a confirmed payment is required",
                        order_id, status
                    )
                }
                DomainError::DuplicateRenewal { renewal_txn_id } => {
                    format!("Renewal '{}' was already applied", renewal_txn_id)
                }
                DomainError::DuplicateActionRequest { order_id, action } => {
                    format!(
                        "A pending '{}' request already exists for order '{}'",
                        action, order_id
                    )
                }
                DomainError::ActionNotPermitted { reason, .. } => reason.clone(),
                DomainError::ActionRequestNotFound { request_id } => {
                    format!("Server action request '{}' not found", request_id)
                }
            },
            AppErrorKind::Infrastructure(_) => {
                "Service temporarily unavailable. Please try again later".to_string()
            }
            AppErrorKind::External(err) => match err {
                ExternalError::PaymentGateway {
                    gateway,
                    is_retryable,
                    ..
                } => {
                    if *is_retryable {
                        format!(
                            "Payment gateway ({}) is temporarily unavailable. Please try again",
                            gateway
                        )
                    } else {
                        "Payment processing failed. Please contact support".to_string()
                    }
                }
                ExternalError::HostingProvider { is_retryable, .. } => {
                    if *is_retryable {
                        "Hosting provider is busy. Your server will be provisioned shortly"
                            .to_string()
                    } else {
                        "Server provisioning failed. Our team has been notified".to_string()
                    }
                }
                ExternalError::RateLimit {
                    service,
                    retry_after,
                } => {
                    if let Some(secs) = retry_after {
                        format!(
                            "Rate limit exceeded for {}. Please try again in {} seconds",
                            service, secs
                        )
                    } else {
                        format!("Rate limit exceeded for {}. Please try again later", service)
                    }
                }
                ExternalError::Timeout {
                    service,
                    timeout_secs,
                } => {
                    format!(
                        "{} request timed out after {} seconds. Please try again",
                        service, timeout_secs
                    )
                }
            },
            AppErrorKind::Validation(err) => match err {
                ValidationError::MissingField { field } => {
                    format!("Required field '{}' is missing", field)
                }
                ValidationError::InvalidField { field, reason } => {
                    format!("Invalid value for '{}': {}", field, reason)
                }
            },
        }
    }

    /// Check if error is retryable
    pub fn is_retryable(&self) -> bool {
        match &self.kind {
            AppErrorKind::Domain(_) => false,
            AppErrorKind::Infrastructure(err) => match err {
                InfrastructureError::Database { is_retryable, .. } => *is_retryable,
                InfrastructureError::Configuration { .. } => false,
            },
            AppErrorKind::External(err) => match err {
                ExternalError::PaymentGateway { is_retryable, .. } => *is_retryable,
                ExternalError::HostingProvider { is_retryable, .. } => *is_retryable,
                ExternalError::RateLimit { .. } => true,
                ExternalError::Timeout { .. } => true,
            },
            AppErrorKind::Validation(_) => false,
        }
    }
}

impl fmt::Display for AppError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.user_message())
    }
}

impl std::error::Error for AppError {}

/// Result type for operations that can fail with AppError
pub type AppResult<T> = Result<T, AppError>;
