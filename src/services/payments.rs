//! Checkout and renewal payment initiation
//!
//! Creates the upstream gateway order through the fallback chain and
//! persists which gateway actually took it, so the confirmation and
//! recovery paths later query the right one.

use crate::database::order_repository::{NewOrder, Order, OrderStore, PendingRenewal};
use crate::error::{AppError, AppErrorKind, DomainError};
use crate::gateways::factory::GatewayFactory;
use crate::gateways::types::{CheckoutRequest, CheckoutResponse, CustomerContact, Money};
use bigdecimal::BigDecimal;
use chrono::Utc;
use std::sync::Arc;
use tracing::info;
use uuid::Uuid;

pub struct PaymentService {
    store: Arc<dyn OrderStore>,
    factory: Arc<GatewayFactory>,
}

/// Checkout input from the storefront
#[derive(Debug, Clone)]
pub struct CheckoutOrder {
    pub user_id: Uuid,
    pub reseller_id: Option<Uuid>,
    pub product_name: String,
    pub memory_mb: i32,
    pub price: BigDecimal,
    pub promo_code: Option<String>,
    pub client_txn_id: String,
    pub provider: Option<String>,
    pub customer: CustomerContact,
    pub return_url: Option<String>,
}

impl PaymentService {
    pub fn new(store: Arc<dyn OrderStore>, factory: Arc<GatewayFactory>) -> Self {
        Self { store, factory }
    }

    /// Create the order record and its gateway-side counterpart. The
    /// gateway chain is tried in configured order; the winner is persisted.
    pub async fn create_order(
        &self,
        checkout: CheckoutOrder,
    ) -> Result<(Order, CheckoutResponse), AppError> {
        let order = self
            .store
            .insert(NewOrder {
                user_id: checkout.user_id,
                reseller_id: checkout.reseller_id,
                product_name: checkout.product_name.clone(),
                memory_mb: checkout.memory_mb,
                price: checkout.price.clone(),
                promo_code: checkout.promo_code.clone(),
                client_txn_id: checkout.client_txn_id.clone(),
                provider: checkout.provider.clone(),
            })
            .await?;

        let response = self
            .factory
            .create_order_with_fallback(CheckoutRequest {
                amount: Money {
                    amount: checkout.price.to_string(),
                    currency: "INR".to_string(),
                },
                customer: checkout.customer,
                return_url: checkout.return_url,
                transaction_reference: checkout.client_txn_id.clone(),
                metadata: Some(serde_json::json!({ "order_id": order.id })),
            })
            .await?;

        self.store
            .record_gateway_order(
                order.id,
                response.gateway.as_str(),
                &response.gateway_order_id,
            )
            .await?;

        info!(
            order_id = %order.id,
            gateway = %response.gateway,
            "checkout order created"
        );

        Ok((order, response))
    }

    /// Start a renewal payment: records the transient pending_renewal and
    /// creates the gateway order for it. The renewal txn id is generated
    /// here and is the key every later confirmation path dedups on.
    pub async fn initiate_renewal(
        &self,
        order_id: Uuid,
        customer: CustomerContact,
        return_url: Option<String>,
    ) -> Result<(PendingRenewal, CheckoutResponse), AppError> {
        let order = self.store.find_by_id(order_id).await?.ok_or_else(|| {
            AppError::new(AppErrorKind::Domain(DomainError::OrderNotFound {
                order_id: order_id.to_string(),
            }))
        })?;

        let renewal_txn_id = format!("rnw_{}", Uuid::new_v4().simple());

        let response = self
            .factory
            .create_order_with_fallback(CheckoutRequest {
                amount: Money {
                    amount: order.price.to_string(),
                    currency: "INR".to_string(),
                },
                customer,
                return_url,
                transaction_reference: renewal_txn_id.clone(),
                metadata: Some(serde_json::json!({
                    "order_id": order.id,
                    "purpose": "renewal",
                })),
            })
            .await?;

        let pending = PendingRenewal {
            renewal_txn_id: renewal_txn_id.clone(),
            gateway: response.gateway.as_str().to_string(),
            amount: order.price.clone(),
            initiated_at: Utc::now(),
        };
        self.store.set_pending_renewal(order.id, &pending).await?;

        info!(
            order_id = %order.id,
            renewal_txn_id = %renewal_txn_id,
            gateway = %response.gateway,
            "renewal payment initiated"
        );

        Ok((pending, response))
    }
}
