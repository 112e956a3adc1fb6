//! UpiStack gateway
//!
//! UPI-only processor whose callbacks carry no signature at all. Nothing in
//! the callback body is trusted; verification is a platform-side fetch of
//! the order from UpiStack's status API (`requires_status_fetch_verification`).

use crate::gateways::error::{GatewayError, GatewayResult};
use crate::gateways::gateway::PaymentGateway;
use crate::gateways::types::{
    CheckoutRequest, CheckoutResponse, GatewayName, Money, PaymentState, StatusRequest,
    StatusResponse, WebhookEvent, WebhookVerificationResult,
};
use crate::gateways::utils::GatewayHttpClient;
use async_trait::async_trait;
use serde::Deserialize;
use serde_json::Value as JsonValue;
use std::time::Duration;
use tracing::info;

#[derive(Debug, Clone)]
pub struct UpiStackConfig {
    pub merchant_key: String,
    pub base_url: String,
    pub timeout_secs: u64,
    pub max_retries: u32,
}

impl Default for UpiStackConfig {
    fn default() -> Self {
        Self {
            merchant_key: String::new(),
            base_url: "https://api.upistack.in".to_string(),
            timeout_secs: 20,
            max_retries: 3,
        }
    }
}

impl UpiStackConfig {
    pub fn from_env() -> GatewayResult<Self> {
        let merchant_key =
            std::env::var("UPISTACK_MERCHANT_KEY").map_err(|_| GatewayError::ValidationError {
                message: "UPISTACK_MERCHANT_KEY environment variable is required".to_string(),
                field: Some("UPISTACK_MERCHANT_KEY".to_string()),
            })?;

        Ok(Self {
            base_url: std::env::var("UPISTACK_BASE_URL")
                .unwrap_or_else(|_| "https://api.upistack.in".to_string()),
            timeout_secs: std::env::var("UPISTACK_TIMEOUT_SECS")
                .ok()
                .and_then(|v| v.parse::<u64>().ok())
                .unwrap_or(20),
            max_retries: std::env::var("UPISTACK_MAX_RETRIES")
                .ok()
                .and_then(|v| v.parse::<u32>().ok())
                .unwrap_or(3),
            merchant_key,
        })
    }
}

pub struct UpiStackGateway {
    config: UpiStackConfig,
    http: GatewayHttpClient,
}

impl UpiStackGateway {
    pub fn new(config: UpiStackConfig) -> GatewayResult<Self> {
        let http =
            GatewayHttpClient::new(Duration::from_secs(config.timeout_secs), config.max_retries)?;
        Ok(Self { config, http })
    }

    pub fn from_env() -> GatewayResult<Self> {
        Self::new(UpiStackConfig::from_env()?)
    }

    fn endpoint(&self, path: &str) -> String {
        format!("{}{}", self.config.base_url, path)
    }

    fn map_status(status: &str) -> PaymentState {
        match status.to_lowercase().as_str() {
            "paid" | "success" => PaymentState::Success,
            "created" | "initiated" | "pending" => PaymentState::Pending,
            "failed" => PaymentState::Failed,
            "expired" => PaymentState::Cancelled,
            _ => PaymentState::Unknown,
        }
    }
}

#[async_trait]
impl PaymentGateway for UpiStackGateway {
    async fn create_order(&self, request: CheckoutRequest) -> GatewayResult<CheckoutResponse> {
        request.amount.validate_positive("amount")?;
        if request.amount.currency.to_uppercase() != "INR" {
            return Err(GatewayError::ValidationError {
                message: "upistack only processes INR".to_string(),
                field: Some("currency".to_string()),
            });
        }

        let payload = serde_json::json!({
            "key": self.config.merchant_key,
            "amount": request.amount.amount,
            "p_info": "Nimbus VPS",
            "client_txn_id": request.transaction_reference,
            "customer_email": request.customer.email,
            "customer_mobile": request.customer.phone,
            "redirect_url": request.return_url,
            "udf1": request.metadata,
        });

        let raw: UpiStackCreateResponse = self
            .http
            .request_json(
                reqwest::Method::POST,
                &self.endpoint("/api/v2/create-order"),
                None,
                Some(&payload),
                &[("Content-Type", "application/json")],
            )
            .await?;

        if !raw.status {
            return Err(GatewayError::UpstreamError {
                gateway: "upistack".to_string(),
                message: raw.msg.unwrap_or_else(|| "order creation failed".to_string()),
                gateway_code: None,
                retryable: false,
            });
        }
        let data = raw.data.ok_or(GatewayError::UpstreamError {
            gateway: "upistack".to_string(),
            message: "create-order response missing data".to_string(),
            gateway_code: None,
            retryable: false,
        })?;

        info!(gateway_order_id = %data.order_id, "upistack order created");

        Ok(CheckoutResponse {
            gateway: GatewayName::UpiStack,
            gateway_order_id: data.order_id.to_string(),
            payment_url: data.payment_url,
            provider_data: Some(serde_json::json!({ "upi_intent": data.upi_intent })),
        })
    }

    async fn fetch_status(&self, request: StatusRequest) -> GatewayResult<StatusResponse> {
        let client_txn_id = request
            .transaction_reference
            .clone()
            .filter(|v| !v.trim().is_empty())
            .ok_or(GatewayError::ValidationError {
                message: "transaction_reference is required for upistack status checks"
                    .to_string(),
                field: Some("transaction_reference".to_string()),
            })?;

        let payload = serde_json::json!({
            "key": self.config.merchant_key,
            "client_txn_id": client_txn_id,
        });

        let raw: UpiStackStatusResponse = self
            .http
            .request_json(
                reqwest::Method::POST,
                &self.endpoint("/api/v2/check-order-status"),
                None,
                Some(&payload),
                &[("Content-Type", "application/json")],
            )
            .await?;

        if !raw.status {
            return Err(GatewayError::UpstreamError {
                gateway: "upistack".to_string(),
                message: raw.msg.unwrap_or_else(|| "status check failed".to_string()),
                gateway_code: None,
                retryable: false,
            });
        }
        let data = raw.data.ok_or(GatewayError::UpstreamError {
            gateway: "upistack".to_string(),
            message: "status response missing data".to_string(),
            gateway_code: None,
            retryable: false,
        })?;

        Ok(StatusResponse {
            status: Self::map_status(&data.order_status),
            transaction_reference: Some(data.client_txn_id),
            gateway_order_id: Some(data.order_id.to_string()),
            payment_id: data.upi_txn_id,
            amount: data.amount.map(|amount| Money {
                amount,
                currency: "INR".to_string(),
            }),
            timestamp: data.txn_at,
            failure_reason: data.remark,
        })
    }

    fn verify_webhook(
        &self,
        _payload: &[u8],
        _signature: &str,
    ) -> GatewayResult<WebhookVerificationResult> {
        // There is no signature scheme. Callbacks are hints only; the
        // processor must confirm via fetch_status before mutating state.
        Ok(WebhookVerificationResult {
            valid: false,
            reason: Some("upistack callbacks are unsigned; verify via status fetch".to_string()),
        })
    }

    fn parse_webhook_event(&self, payload: &[u8]) -> GatewayResult<WebhookEvent> {
        let parsed: JsonValue = serde_json::from_slice(payload).map_err(|e| {
            GatewayError::WebhookVerificationError {
                message: format!("invalid callback JSON payload: {}", e),
            }
        })?;

        let transaction_reference = parsed
            .get("client_txn_id")
            .and_then(|v| v.as_str())
            .map(|v| v.to_string());
        let gateway_order_id = parsed
            .get("order_id")
            .map(|v| match v {
                JsonValue::String(s) => s.clone(),
                other => other.to_string(),
            })
            .filter(|v| !v.is_empty());
        let status = parsed
            .get("status")
            .and_then(|v| v.as_str())
            .map(Self::map_status);

        Ok(WebhookEvent {
            gateway: GatewayName::UpiStack,
            event_type: "payment.update".to_string(),
            transaction_reference,
            gateway_order_id,
            payment_id: parsed
                .get("upi_txn_id")
                .and_then(|v| v.as_str())
                .map(|v| v.to_string()),
            status,
            payload: parsed,
            received_at: chrono::Utc::now().to_rfc3339(),
        })
    }

    fn signature_header(&self) -> Option<&'static str> {
        None
    }

    fn requires_status_fetch_verification(&self) -> bool {
        true
    }

    fn name(&self) -> GatewayName {
        GatewayName::UpiStack
    }
}

#[derive(Debug, Deserialize)]
struct UpiStackCreateResponse {
    status: bool,
    #[serde(default)]
    msg: Option<String>,
    #[serde(default)]
    data: Option<UpiStackOrderData>,
}

#[derive(Debug, Deserialize)]
struct UpiStackOrderData {
    order_id: u64,
    #[serde(default)]
    payment_url: Option<String>,
    #[serde(default)]
    upi_intent: Option<String>,
}

#[derive(Debug, Deserialize)]
struct UpiStackStatusResponse {
    status: bool,
    #[serde(default)]
    msg: Option<String>,
    #[serde(default)]
    data: Option<UpiStackStatusData>,
}

#[derive(Debug, Deserialize)]
struct UpiStackStatusData {
    order_id: u64,
    client_txn_id: String,
    order_status: String,
    #[serde(default)]
    amount: Option<String>,
    #[serde(default)]
    upi_txn_id: Option<String>,
    #[serde(default)]
    txn_at: Option<String>,
    #[serde(default)]
    remark: Option<String>,
}

#[cfg(test)]
mod tests {
    use super::*;

    fn gateway() -> UpiStackGateway {
        UpiStackGateway::new(UpiStackConfig {
            merchant_key: "key_test".to_string(),
            base_url: "https://api.upistack.in".to_string(),
            timeout_secs: 5,
            max_retries: 1,
        })
        .expect("gateway init should succeed")
    }

    #[test]
    fn callbacks_are_never_trusted_directly() {
        let gateway = gateway();
        let result = gateway
            .verify_webhook(br#"{"status":"paid"}"#, "anything")
            .expect("verification should not error");
        assert!(!result.valid);
        assert!(gateway.requires_status_fetch_verification());
    }

    #[test]
    fn callback_parsing_extracts_client_txn_id() {
        let gateway = gateway();
        let payload = serde_json::json!({
            "client_txn_id": "txn_77",
            "order_id": 981,
            "status": "paid",
            "upi_txn_id": "upi_x1"
        });
        let event = gateway
            .parse_webhook_event(payload.to_string().as_bytes())
            .expect("parsing should succeed");
        assert_eq!(event.transaction_reference.as_deref(), Some("txn_77"));
        assert_eq!(event.gateway_order_id.as_deref(), Some("981"));
        assert_eq!(event.status, Some(PaymentState::Success));
    }

    #[test]
    fn non_inr_orders_are_rejected() {
        let gateway = gateway();
        let request = CheckoutRequest {
            amount: Money {
                amount: "549.00".to_string(),
                currency: "USD".to_string(),
            },
            customer: crate::gateways::types::CustomerContact {
                email: None,
                phone: Some("+919812345678".to_string()),
            },
            return_url: None,
            transaction_reference: "txn_1".to_string(),
            metadata: None,
        };
        let err = futures::executor::block_on(gateway.create_order(request)).unwrap_err();
        assert!(matches!(err, GatewayError::ValidationError { .. }));
    }
}
