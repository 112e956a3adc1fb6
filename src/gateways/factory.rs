use crate::gateways::error::{GatewayError, GatewayResult};
use crate::gateways::gateway::PaymentGateway;
use crate::gateways::providers::{PayLaneGateway, UpiStackGateway, ZipPayGateway};
use crate::gateways::types::{CheckoutRequest, CheckoutResponse, GatewayName};
use std::collections::HashMap;
use std::str::FromStr;
use std::sync::Arc;
use tracing::{info, warn};

#[derive(Debug, Clone)]
pub struct GatewayFactoryConfig {
    /// Order in which gateways are tried at checkout; the first that
    /// accepts the order wins and is persisted on the order record.
    pub fallback_order: Vec<GatewayName>,
}

impl GatewayFactoryConfig {
    pub fn from_env() -> GatewayResult<Self> {
        let raw = std::env::var("GATEWAY_FALLBACK_ORDER")
            .unwrap_or_else(|_| "paylane,zippay,upistack".to_string());
        let mut fallback_order = Vec::new();
        for part in raw.split(',') {
            let value = part.trim();
            if value.is_empty() {
                continue;
            }
            fallback_order.push(GatewayName::from_str(value)?);
        }

        if fallback_order.is_empty() {
            return Err(GatewayError::ValidationError {
                message: "at least one gateway must be enabled".to_string(),
                field: Some("GATEWAY_FALLBACK_ORDER".to_string()),
            });
        }

        Ok(Self { fallback_order })
    }
}

pub struct GatewayFactory {
    gateways: HashMap<GatewayName, Arc<dyn PaymentGateway>>,
    config: GatewayFactoryConfig,
}

impl GatewayFactory {
    pub fn from_env() -> GatewayResult<Self> {
        let config = GatewayFactoryConfig::from_env()?;
        let mut gateways: HashMap<GatewayName, Arc<dyn PaymentGateway>> = HashMap::new();
        for name in &config.fallback_order {
            let gateway: Arc<dyn PaymentGateway> = match name {
                GatewayName::PayLane => Arc::new(PayLaneGateway::from_env()?),
                GatewayName::ZipPay => Arc::new(ZipPayGateway::from_env()?),
                GatewayName::UpiStack => Arc::new(UpiStackGateway::from_env()?),
            };
            gateways.insert(*name, gateway);
        }
        Ok(Self { gateways, config })
    }

    /// Test/bootstrap constructor with injected gateway instances; the
    /// fallback order follows the list order.
    pub fn with_gateways(list: Vec<Arc<dyn PaymentGateway>>) -> Self {
        let fallback_order = list.iter().map(|g| g.name()).collect();
        let mut gateways = HashMap::new();
        for gateway in list {
            gateways.insert(gateway.name(), gateway);
        }
        Self {
            gateways,
            config: GatewayFactoryConfig { fallback_order },
        }
    }

    pub fn get(&self, name: GatewayName) -> GatewayResult<Arc<dyn PaymentGateway>> {
        self.gateways
            .get(&name)
            .cloned()
            .ok_or(GatewayError::ValidationError {
                message: format!("gateway {} is disabled", name),
                field: Some("gateway".to_string()),
            })
    }

    pub fn list(&self) -> Vec<GatewayName> {
        self.config.fallback_order.clone()
    }

    /// Create the upstream order, transparently falling through the
    /// configured gateway chain when a gateway refuses or is down. Which
    /// gateway actually took the order is in the response, so the caller
    /// can persist it and query the right one at confirmation time.
    pub async fn create_order_with_fallback(
        &self,
        request: CheckoutRequest,
    ) -> GatewayResult<CheckoutResponse> {
        let mut last_error = None;

        for name in &self.config.fallback_order {
            let gateway = match self.get(*name) {
                Ok(g) => g,
                Err(e) => {
                    last_error = Some(e);
                    continue;
                }
            };

            match gateway.create_order(request.clone()).await {
                Ok(response) => {
                    info!(
                        gateway = %name,
                        gateway_order_id = %response.gateway_order_id,
                        "gateway order created"
                    );
                    return Ok(response);
                }
                Err(e) => {
                    warn!(gateway = %name, error = %e, "gateway order creation failed, trying next");
                    last_error = Some(e);
                }
            }
        }

        Err(last_error.unwrap_or(GatewayError::ValidationError {
            message: "no gateway available".to_string(),
            field: None,
        }))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::gateways::types::{
        CustomerContact, Money, StatusRequest, StatusResponse, WebhookEvent,
        WebhookVerificationResult,
    };
    use async_trait::async_trait;

    struct FailingGateway(GatewayName);
    struct AcceptingGateway(GatewayName);

    #[async_trait]
    impl PaymentGateway for FailingGateway {
        async fn create_order(&self, _request: CheckoutRequest) -> GatewayResult<CheckoutResponse> {
            Err(GatewayError::NetworkError {
                message: "connection refused".to_string(),
            })
        }

        async fn fetch_status(&self, _request: StatusRequest) -> GatewayResult<StatusResponse> {
            unreachable!("not used in this test")
        }

        fn verify_webhook(
            &self,
            _payload: &[u8],
            _signature: &str,
        ) -> GatewayResult<WebhookVerificationResult> {
            Ok(WebhookVerificationResult {
                valid: false,
                reason: None,
            })
        }

        fn parse_webhook_event(&self, _payload: &[u8]) -> GatewayResult<WebhookEvent> {
            unreachable!("not used in this test")
        }

        fn signature_header(&self) -> Option<&'static str> {
            None
        }

        fn name(&self) -> GatewayName {
            self.0
        }
    }

    #[async_trait]
    impl PaymentGateway for AcceptingGateway {
        async fn create_order(&self, request: CheckoutRequest) -> GatewayResult<CheckoutResponse> {
            Ok(CheckoutResponse {
                gateway: self.0,
                gateway_order_id: format!("ok_{}", request.transaction_reference),
                payment_url: None,
                provider_data: None,
            })
        }

        async fn fetch_status(&self, _request: StatusRequest) -> GatewayResult<StatusResponse> {
            unreachable!("not used in this test")
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
            unreachable!("not used in this test")
        }

        fn signature_header(&self) -> Option<&'static str> {
            None
        }

        fn name(&self) -> GatewayName {
            self.0
        }
    }

    fn checkout_request() -> CheckoutRequest {
        CheckoutRequest {
            amount: Money {
                amount: "549.00".to_string(),
                currency: "INR".to_string(),
            },
            customer: CustomerContact {
                email: Some("user@example.com".to_string()),
                phone: None,
            },
            return_url: None,
            transaction_reference: "txn_1".to_string(),
            metadata: None,
        }
    }

    #[tokio::test]
    async fn fallback_chain_moves_past_failing_gateway() {
        let factory = GatewayFactory::with_gateways(vec![
            Arc::new(FailingGateway(GatewayName::PayLane)) as Arc<dyn PaymentGateway>,
            Arc::new(AcceptingGateway(GatewayName::ZipPay)) as Arc<dyn PaymentGateway>,
        ]);

        let response = factory
            .create_order_with_fallback(checkout_request())
            .await
            .expect("second gateway should accept");
        assert_eq!(response.gateway, GatewayName::ZipPay);
        assert_eq!(response.gateway_order_id, "ok_txn_1");
    }

    #[tokio::test]
    async fn all_gateways_failing_returns_last_error() {
        let factory = GatewayFactory::with_gateways(vec![
            Arc::new(FailingGateway(GatewayName::PayLane)) as Arc<dyn PaymentGateway>,
            Arc::new(FailingGateway(GatewayName::ZipPay)) as Arc<dyn PaymentGateway>,
        ]);

        let err = factory
            .create_order_with_fallback(checkout_request())
            .await
            .unwrap_err();
        assert!(matches!(err, GatewayError::NetworkError { .. }));
    }
}
