use crate::gateways::error::GatewayResult;
use crate::gateways::types::{
    CheckoutRequest, CheckoutResponse, GatewayName, StatusRequest, StatusResponse, WebhookEvent,
    WebhookVerificationResult,
};
use async_trait::async_trait;

/// Uniform contract over payment gateways.
///
/// Each gateway has its own order-creation call, callback signature scheme
/// and status-polling call; this trait hides all of it. Callback trust comes
/// in two flavours: HMAC signature over the raw body, or (for gateways that
/// sign nothing) a platform-side status fetch before any field is believed
/// (`requires_status_fetch_verification`).
#[async_trait]
pub trait PaymentGateway: Send + Sync {
    async fn create_order(&self, request: CheckoutRequest) -> GatewayResult<CheckoutResponse>;

    /// Poll the gateway for the authoritative payment state
    async fn fetch_status(&self, request: StatusRequest) -> GatewayResult<StatusResponse>;

    fn verify_webhook(
        &self,
        payload: &[u8],
        signature: &str,
    ) -> GatewayResult<WebhookVerificationResult>;

    fn parse_webhook_event(&self, payload: &[u8]) -> GatewayResult<WebhookEvent>;

    /// Header carrying the webhook signature, when the gateway signs
    fn signature_header(&self) -> Option<&'static str>;

    /// True when callbacks are unsigned and must be confirmed by fetching
    /// the order from the gateway before trusting anything
    fn requires_status_fetch_verification(&self) -> bool {
        false
    }

    fn name(&self) -> GatewayName;
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::gateways::types::{CustomerContact, Money, PaymentState};

    struct MockGateway;

    #[async_trait]
    impl PaymentGateway for MockGateway {
        async fn create_order(&self, request: CheckoutRequest) -> GatewayResult<CheckoutResponse> {
            Ok(CheckoutResponse {
                gateway: GatewayName::PayLane,
                gateway_order_id: format!("pl_{}", request.transaction_reference),
                payment_url: Some("https://checkout.example/pay".to_string()),
                provider_data: None,
            })
        }

        async fn fetch_status(&self, request: StatusRequest) -> GatewayResult<StatusResponse> {
            Ok(StatusResponse {
                status: PaymentState::Success,
                transaction_reference: request.transaction_reference,
                gateway_order_id: request.gateway_order_id,
                payment_id: Some("pay_mock".to_string()),
                amount: None,
                timestamp: None,
                failure_reason: None,
            })
        }

        fn verify_webhook(
            &self,
            _payload: &[u8],
            _signature: &str,
        ) -> GatewayResult<WebhookVerificationResult> {
            Ok(WebhookVerificationResult {
                valid: true,
                reason: None,
            })
        }

        fn parse_webhook_event(&self, _payload: &[u8]) -> GatewayResult<WebhookEvent> {
            Ok(WebhookEvent {
                gateway: GatewayName::PayLane,
                event_type: "mock".to_string(),
                transaction_reference: None,
                gateway_order_id: None,
                payment_id: None,
                status: Some(PaymentState::Success),
                payload: serde_json::json!({}),
                received_at: chrono::Utc::now().to_rfc3339(),
            })
        }

        fn signature_header(&self) -> Option<&'static str> {
            Some("x-mock-signature")
        }

        fn name(&self) -> GatewayName {
            GatewayName::PayLane
        }
    }

    #[tokio::test]
    async fn trait_can_be_implemented_by_mock_gateway() {
        let gateway: Box<dyn PaymentGateway> = Box::new(MockGateway);
        let response = gateway
            .create_order(CheckoutRequest {
                amount: Money {
                    amount: "549.00".to_string(),
                    currency: "INR".to_string(),
                },
                customer: CustomerContact {
                    email: Some("test@example.com".to_string()),
                    phone: None,
                },
                return_url: None,
                transaction_reference: "txn_1".to_string(),
                metadata: None,
            })
            .await
            .expect("order creation should succeed");
        assert_eq!(response.gateway_order_id, "pl_txn_1");
    }
}
