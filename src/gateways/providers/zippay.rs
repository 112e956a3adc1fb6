use crate::gateways::error::{GatewayError, GatewayResult};
use crate::gateways::gateway::PaymentGateway;
use crate::gateways::types::{
    CheckoutRequest, CheckoutResponse, GatewayName, Money, PaymentState, StatusRequest,
    StatusResponse, WebhookEvent, WebhookVerificationResult,
};
use crate::gateways::utils::{verify_hmac_sha256_hex, GatewayHttpClient};
use async_trait::async_trait;
use serde::Deserialize;
use serde_json::Value as JsonValue;
use std::time::Duration;
use tracing::info;

#[derive(Debug, Clone)]
pub struct ZipPayConfig {
    pub client_id: String,
    pub client_secret: String,
    pub webhook_secret: String,
    pub base_url: String,
    pub timeout_secs: u64,
    pub max_retries: u32,
}

impl Default for ZipPayConfig {
    fn default() -> Self {
        Self {
            client_id: String::new(),
            client_secret: String::new(),
            webhook_secret: String::new(),
            base_url: "https://gateway.zippay.io".to_string(),
            timeout_secs: 30,
            max_retries: 3,
        }
    }
}

impl ZipPayConfig {
    pub fn from_env() -> GatewayResult<Self> {
        let client_id =
            std::env::var("ZIPPAY_CLIENT_ID").map_err(|_| GatewayError::ValidationError {
                message: "ZIPPAY_CLIENT_ID environment variable is required".to_string(),
                field: Some("ZIPPAY_CLIENT_ID".to_string()),
            })?;
        let client_secret =
            std::env::var("ZIPPAY_CLIENT_SECRET").map_err(|_| GatewayError::ValidationError {
                message: "ZIPPAY_CLIENT_SECRET environment variable is required".to_string(),
                field: Some("ZIPPAY_CLIENT_SECRET".to_string()),
            })?;

        Ok(Self {
            webhook_secret: std::env::var("ZIPPAY_WEBHOOK_SECRET")
                .unwrap_or_else(|_| client_secret.clone()),
            base_url: std::env::var("ZIPPAY_BASE_URL")
                .unwrap_or_else(|_| "https://gateway.zippay.io".to_string()),
            timeout_secs: std::env::var("ZIPPAY_TIMEOUT_SECS")
                .ok()
                .and_then(|v| v.parse::<u64>().ok())
                .unwrap_or(30),
            max_retries: std::env::var("ZIPPAY_MAX_RETRIES")
                .ok()
                .and_then(|v| v.parse::<u32>().ok())
                .unwrap_or(3),
            client_id,
            client_secret,
        })
    }
}

pub struct ZipPayGateway {
    config: ZipPayConfig,
    http: GatewayHttpClient,
}

impl ZipPayGateway {
    pub fn new(config: ZipPayConfig) -> GatewayResult<Self> {
        let http =
            GatewayHttpClient::new(Duration::from_secs(config.timeout_secs), config.max_retries)?;
        Ok(Self { config, http })
    }

    pub fn from_env() -> GatewayResult<Self> {
        Self::new(ZipPayConfig::from_env()?)
    }

    fn endpoint(&self, path: &str) -> String {
        format!("{}{}", self.config.base_url, path)
    }

    fn map_status(status: &str) -> PaymentState {
        // ZipPay shouts its statuses in upper case
        match status.to_uppercase().as_str() {
            "SUCCESS" | "PAID" => PaymentState::Success,
            "PENDING" | "ACTIVE" => PaymentState::Pending,
            "FAILED" => PaymentState::Failed,
            "CANCELLED" | "EXPIRED" => PaymentState::Cancelled,
            _ => PaymentState::Unknown,
        }
    }

    fn check_envelope<T>(envelope: ZipPayEnvelope<T>) -> GatewayResult<T> {
        if envelope.code == "OK" {
            return Ok(envelope.data);
        }
        Err(GatewayError::UpstreamError {
            gateway: "zippay".to_string(),
            message: envelope
                .message
                .unwrap_or_else(|| "gateway reported failure".to_string()),
            gateway_code: Some(envelope.code),
            retryable: false,
        })
    }
}

#[async_trait]
impl PaymentGateway for ZipPayGateway {
    async fn create_order(&self, request: CheckoutRequest) -> GatewayResult<CheckoutResponse> {
        request.amount.validate_positive("amount")?;
        if request
            .customer
            .phone
            .as_deref()
            .unwrap_or("")
            .trim()
            .is_empty()
        {
            return Err(GatewayError::ValidationError {
                message: "customer.phone is required for zippay orders".to_string(),
                field: Some("customer.phone".to_string()),
            });
        }

        let payload = serde_json::json!({
            "client_id": self.config.client_id,
            "order_amount": request.amount.amount,
            "order_currency": request.amount.currency,
            "order_ref": request.transaction_reference,
            "customer": {
                "email": request.customer.email,
                "phone": request.customer.phone,
            },
            "return_url": request.return_url,
            "meta": request.metadata,
        });

        let envelope: ZipPayEnvelope<ZipPayOrderData> = self
            .http
            .request_json(
                reqwest::Method::POST,
                &self.endpoint("/pg/v2/orders"),
                Some(&self.config.client_secret),
                Some(&payload),
                &[("Content-Type", "application/json")],
            )
            .await?;
        let data = Self::check_envelope(envelope)?;

        info!(gateway_order_id = %data.order_id, "zippay order created");

        Ok(CheckoutResponse {
            gateway: GatewayName::ZipPay,
            gateway_order_id: data.order_id.clone(),
            payment_url: data.payment_link,
            provider_data: Some(serde_json::json!({
                "order_token": data.order_token,
                "order_id": data.order_id,
            })),
        })
    }

    async fn fetch_status(&self, request: StatusRequest) -> GatewayResult<StatusResponse> {
        let reference = request
            .gateway_order_id
            .clone()
            .or_else(|| request.transaction_reference.clone())
            .filter(|v| !v.trim().is_empty())
            .ok_or(GatewayError::ValidationError {
                message: "gateway_order_id or transaction_reference is required".to_string(),
                field: Some("reference".to_string()),
            })?;

        let envelope: ZipPayEnvelope<ZipPayStatusData> = self
            .http
            .request_json(
                reqwest::Method::GET,
                &self.endpoint(&format!("/pg/v2/orders/{}", reference)),
                Some(&self.config.client_secret),
                None,
                &[],
            )
            .await?;
        let data = Self::check_envelope(envelope)?;

        Ok(StatusResponse {
            status: Self::map_status(&data.order_status),
            transaction_reference: data.order_ref,
            gateway_order_id: Some(data.order_id),
            payment_id: data.cf_payment_id,
            amount: data.order_amount.map(|amount| Money {
                amount,
                currency: data.order_currency.unwrap_or_else(|| "INR".to_string()),
            }),
            timestamp: data.updated_at,
            failure_reason: data.failure_reason,
        })
    }

    fn verify_webhook(
        &self,
        payload: &[u8],
        signature: &str,
    ) -> GatewayResult<WebhookVerificationResult> {
        let valid = verify_hmac_sha256_hex(payload, &self.config.webhook_secret, signature);
        Ok(WebhookVerificationResult {
            valid,
            reason: if valid {
                None
            } else {
                Some("invalid zippay signature".to_string())
            },
        })
    }

    fn parse_webhook_event(&self, payload: &[u8]) -> GatewayResult<WebhookEvent> {
        let parsed: JsonValue = serde_json::from_slice(payload).map_err(|e| {
            GatewayError::WebhookVerificationError {
                message: format!("invalid webhook JSON payload: {}", e),
            }
        })?;

        let event_type = parsed
            .get("type")
            .and_then(|v| v.as_str())
            .unwrap_or("unknown")
            .to_string();
        let data = parsed.get("data");
        let gateway_order_id = data
            .and_then(|v| v.get("order_id"))
            .and_then(|v| v.as_str())
            .map(|v| v.to_string());
        let transaction_reference = data
            .and_then(|v| v.get("order_ref"))
            .and_then(|v| v.as_str())
            .map(|v| v.to_string());
        let payment_id = data
            .and_then(|v| v.get("cf_payment_id"))
            .and_then(|v| v.as_str())
            .map(|v| v.to_string());
        let status = data
            .and_then(|v| v.get("order_status"))
            .and_then(|v| v.as_str())
            .map(Self::map_status);

        Ok(WebhookEvent {
            gateway: GatewayName::ZipPay,
            event_type,
            transaction_reference,
            gateway_order_id,
            payment_id,
            status,
            payload: parsed,
            received_at: chrono::Utc::now().to_rfc3339(),
        })
    }

    fn signature_header(&self) -> Option<&'static str> {
        Some("x-zippay-signature")
    }

    fn name(&self) -> GatewayName {
        GatewayName::ZipPay
    }
}

#[derive(Debug, Deserialize)]
struct ZipPayEnvelope<T> {
    code: String,
    #[serde(default)]
    message: Option<String>,
    data: T,
}

#[derive(Debug, Deserialize)]
struct ZipPayOrderData {
    order_id: String,
    order_token: String,
    #[serde(default)]
    payment_link: Option<String>,
}

#[derive(Debug, Deserialize)]
struct ZipPayStatusData {
    order_id: String,
    order_status: String,
    #[serde(default)]
    order_ref: Option<String>,
    #[serde(default)]
    order_amount: Option<String>,
    #[serde(default)]
    order_currency: Option<String>,
    #[serde(default)]
    cf_payment_id: Option<String>,
    #[serde(default)]
    updated_at: Option<String>,
    #[serde(default)]
    failure_reason: Option<String>,
}
