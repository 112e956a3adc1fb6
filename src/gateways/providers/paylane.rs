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
pub struct PayLaneConfig {
    pub api_key: String,
    pub webhook_secret: String,
    pub base_url: String,
    pub timeout_secs: u64,
    pub max_retries: u32,
}

impl Default for PayLaneConfig {
    fn default() -> Self {
        Self {
            api_key: String::new(),
            webhook_secret: String::new(),
            base_url: "https://api.paylane.in".to_string(),
            timeout_secs: 30,
            max_retries: 3,
        }
    }
}

impl PayLaneConfig {
    pub fn from_env() -> GatewayResult<Self> {
        let api_key =
            std::env::var("PAYLANE_API_KEY").map_err(|_| GatewayError::ValidationError {
                message: "PAYLANE_API_KEY environment variable is required".to_string(),
                field: Some("PAYLANE_API_KEY".to_string()),
            })?;
        let webhook_secret =
            std::env::var("PAYLANE_WEBHOOK_SECRET").map_err(|_| GatewayError::ValidationError {
                message: "PAYLANE_WEBHOOK_SECRET environment variable is required".to_string(),
                field: Some("PAYLANE_WEBHOOK_SECRET".to_string()),
            })?;

        Ok(Self {
            base_url: std::env::var("PAYLANE_BASE_URL")
                .unwrap_or_else(|_| "https://api.paylane.in".to_string()),
            timeout_secs: std::env::var("PAYLANE_TIMEOUT_SECS")
                .ok()
                .and_then(|v| v.parse::<u64>().ok())
                .unwrap_or(30),
            max_retries: std::env::var("PAYLANE_MAX_RETRIES")
                .ok()
                .and_then(|v| v.parse::<u32>().ok())
                .unwrap_or(3),
            api_key,
            webhook_secret,
        })
    }
}

pub struct PayLaneGateway {
    config: PayLaneConfig,
    http: GatewayHttpClient,
}

impl PayLaneGateway {
    pub fn new(config: PayLaneConfig) -> GatewayResult<Self> {
        let http =
            GatewayHttpClient::new(Duration::from_secs(config.timeout_secs), config.max_retries)?;
        Ok(Self { config, http })
    }

    pub fn from_env() -> GatewayResult<Self> {
        Self::new(PayLaneConfig::from_env()?)
    }

    fn endpoint(&self, path: &str) -> String {
        format!("{}{}", self.config.base_url, path)
    }

    fn map_status(status: &str) -> PaymentState {
        match status {
            "captured" | "paid" => PaymentState::Success,
            "created" | "authorized" => PaymentState::Pending,
            "failed" => PaymentState::Failed,
            "cancelled" => PaymentState::Cancelled,
            _ => PaymentState::Unknown,
        }
    }
}

#[async_trait]
impl PaymentGateway for PayLaneGateway {
    async fn create_order(&self, request: CheckoutRequest) -> GatewayResult<CheckoutResponse> {
        request.amount.validate_positive("amount")?;

        let payload = serde_json::json!({
            "amount": request.amount.amount,
            "currency": request.amount.currency,
            "receipt": request.transaction_reference,
            "customer_email": request.customer.email,
            "customer_phone": request.customer.phone,
            "callback_url": request.return_url,
            "notes": request.metadata,
        });

        let raw: PayLaneOrder = self
            .http
            .request_json(
                reqwest::Method::POST,
                &self.endpoint("/v1/orders"),
                Some(&self.config.api_key),
                Some(&payload),
                &[("Content-Type", "application/json")],
            )
            .await?;

        info!(gateway_order_id = %raw.id, "paylane order created");

        Ok(CheckoutResponse {
            gateway: GatewayName::PayLane,
            gateway_order_id: raw.id.clone(),
            payment_url: raw.short_url,
            provider_data: Some(serde_json::json!({ "order_id": raw.id })),
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

        let raw: PayLaneOrderStatus = self
            .http
            .request_json(
                reqwest::Method::GET,
                &self.endpoint(&format!("/v1/orders/{}", reference)),
                Some(&self.config.api_key),
                None,
                &[],
            )
            .await?;

        Ok(StatusResponse {
            status: Self::map_status(&raw.status),
            transaction_reference: raw.receipt,
            gateway_order_id: Some(raw.id),
            payment_id: raw.payment_id,
            amount: Some(Money {
                amount: raw.amount,
                currency: raw.currency,
            }),
            timestamp: raw.updated_at,
            failure_reason: raw.error_description,
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
                Some("invalid paylane signature".to_string())
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
            .get("event")
            .and_then(|v| v.as_str())
            .unwrap_or("unknown")
            .to_string();
        let entity = parsed.get("payload").and_then(|v| v.get("order"));
        let gateway_order_id = entity
            .and_then(|v| v.get("id"))
            .and_then(|v| v.as_str())
            .map(|v| v.to_string());
        let transaction_reference = entity
            .and_then(|v| v.get("receipt"))
            .and_then(|v| v.as_str())
            .map(|v| v.to_string());
        let payment_id = parsed
            .get("payload")
            .and_then(|v| v.get("payment"))
            .and_then(|v| v.get("id"))
            .and_then(|v| v.as_str())
            .map(|v| v.to_string());
        let status = entity
            .and_then(|v| v.get("status"))
            .and_then(|v| v.as_str())
            .map(Self::map_status);

        Ok(WebhookEvent {
            gateway: GatewayName::PayLane,
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
        Some("x-paylane-signature")
    }

    fn name(&self) -> GatewayName {
        GatewayName::PayLane
    }
}

#[derive(Debug, Deserialize)]
struct PayLaneOrder {
    id: String,
    #[serde(default)]
    short_url: Option<String>,
}

#[derive(Debug, Deserialize)]
struct PayLaneOrderStatus {
    id: String,
    status: String,
    amount: String,
    currency: String,
    #[serde(default)]
    receipt: Option<String>,
    #[serde(default)]
    payment_id: Option<String>,
    #[serde(default)]
    updated_at: Option<String>,
    #[serde(default)]
    error_description: Option<String>,
}

#[cfg(test)]
mod tests {
    use super::*;

    fn gateway() -> PayLaneGateway {
        PayLaneGateway::new(PayLaneConfig {
            api_key: "key_test".to_string(),
            webhook_secret: "whsec_test".to_string(),
            base_url: "https://api.paylane.in".to_string(),
            timeout_secs: 5,
            max_retries: 1,
        })
        .expect("gateway init should succeed")
    }

    #[test]
    fn webhook_signature_validation_invalid() {
        let gateway = gateway();
        let payload = br#"{"event":"order.paid"}"#;
        let result = gateway
            .verify_webhook(payload, "invalid_signature")
            .expect("verification should not error");
        assert!(!result.valid);
    }

    #[test]
    fn webhook_event_parsing_extracts_references() {
        let gateway = gateway();
        let payload = serde_json::json!({
            "event": "order.paid",
            "payload": {
                "order": { "id": "pl_ord_1", "receipt": "txn_42", "status": "captured" },
                "payment": { "id": "pay_9" }
            }
        });
        let event = gateway
            .parse_webhook_event(payload.to_string().as_bytes())
            .expect("parsing should succeed");
        assert_eq!(event.gateway_order_id.as_deref(), Some("pl_ord_1"));
        assert_eq!(event.transaction_reference.as_deref(), Some("txn_42"));
        assert_eq!(event.payment_id.as_deref(), Some("pay_9"));
        assert_eq!(event.status, Some(PaymentState::Success));
    }

    #[test]
    fn status_mapping_covers_vocabulary() {
        assert_eq!(PayLaneGateway::map_status("captured"), PaymentState::Success);
        assert_eq!(PayLaneGateway::map_status("created"), PaymentState::Pending);
        assert_eq!(PayLaneGateway::map_status("failed"), PaymentState::Failed);
        assert_eq!(PayLaneGateway::map_status("weird"), PaymentState::Unknown);
    }
}
