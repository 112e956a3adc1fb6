use thiserror::Error;

pub type GatewayResult<T> = Result<T, GatewayError>;

#[derive(Debug, Clone, Error)]
pub enum GatewayError {
    #[error("Validation error: {message}")]
    ValidationError {
        message: String,
        field: Option<String>,
    },

    #[error("Network error: {message}")]
    NetworkError { message: String },

    #[error("Rate limit exceeded: {message}")]
    RateLimitError {
        message: String,
        retry_after_seconds: Option<u64>,
    },

    #[error("Webhook verification failed: {message}")]
    WebhookVerificationError { message: String },

    #[error("Gateway error: gateway={gateway}, message={message}")]
    UpstreamError {
        gateway: String,
        message: String,
        gateway_code: Option<String>,
        retryable: bool,
    },
}

impl GatewayError {
    pub fn is_retryable(&self) -> bool {
        match self {
            GatewayError::ValidationError { .. } => false,
            GatewayError::NetworkError { .. } => true,
            GatewayError::RateLimitError { .. } => true,
            GatewayError::WebhookVerificationError { .. } => false,
            GatewayError::UpstreamError { retryable, .. } => *retryable,
        }
    }

    pub fn http_status_code(&self) -> u16 {
        match self {
            GatewayError::ValidationError { .. } => 400,
            GatewayError::NetworkError { .. } => 503,
            GatewayError::RateLimitError { .. } => 429,
            GatewayError::WebhookVerificationError { .. } => 401,
            GatewayError::UpstreamError { .. } => 502,
        }
    }
}

impl From<GatewayError> for crate::error::AppError {
    fn from(err: GatewayError) -> Self {
        use crate::error::{AppError, AppErrorKind, ExternalError};

        let gateway = match &err {
            GatewayError::UpstreamError { gateway, .. } => gateway.clone(),
            _ => "gateways".to_string(),
        };
        AppError::new(AppErrorKind::External(ExternalError::PaymentGateway {
            gateway,
            message: err.to_string(),
            is_retryable: err.is_retryable(),
        }))
    }
}
