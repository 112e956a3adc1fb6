//! Payment confirmation / webhook processor
//!
//! The trust boundary of the payment layer. Nothing mutates an order until
//! either the gateway's signature over the raw body verifies, or (for
//! gateways that sign nothing) the payment state has been fetched from the
//! gateway's own API. Provisioning is dispatched asynchronously; the webhook
//! response never waits on, or fails because of, a hosting backend.

use crate::database::order_repository::{Order, OrderStore, OrderStatus};
use crate::gateways::factory::GatewayFactory;
use crate::gateways::types::{GatewayName, PaymentState, StatusRequest};
use crate::services::notification::{NotificationEvent, Notifier};
use crate::services::provisioning::ProvisioningOrchestrator;
use crate::services::renewal::RenewalEngine;
use std::str::FromStr;
use std::sync::Arc;
use thiserror::Error;
use tracing::{error, info, warn};

#[derive(Debug, Error)]
pub enum WebhookProcessorError {
    #[error("Invalid signature")]
    InvalidSignature,
    #[error("Unknown gateway: {0}")]
    UnknownGateway(String),
    #[error("Missing transaction reference")]
    MissingReference,
    #[error("No order matches reference: {0}")]
    UnmatchedReference(String),
    #[error("Database error: {0}")]
    DatabaseError(String),
    #[error("Processing error: {0}")]
    ProcessingError(String),
}

pub struct WebhookProcessor {
    store: Arc<dyn OrderStore>,
    factory: Arc<GatewayFactory>,
    orchestrator: Arc<ProvisioningOrchestrator>,
    renewal: Arc<RenewalEngine>,
    notifier: Arc<dyn Notifier>,
}

impl WebhookProcessor {
    pub fn new(
        store: Arc<dyn OrderStore>,
        factory: Arc<GatewayFactory>,
        orchestrator: Arc<ProvisioningOrchestrator>,
        renewal: Arc<RenewalEngine>,
        notifier: Arc<dyn Notifier>,
    ) -> Self {
        Self {
            store,
            factory,
            orchestrator,
            renewal,
            notifier,
        }
    }

    /// Ingest one gateway callback. `raw_body` is the body exactly as
    /// received; signatures are computed over raw bytes, so any
    /// re-serialization would break verification.
    pub async fn process_callback(
        &self,
        gateway_name: &str,
        signature: Option<&str>,
        raw_body: &[u8],
    ) -> Result<(), WebhookProcessorError> {
        let name = GatewayName::from_str(gateway_name)
            .map_err(|_| WebhookProcessorError::UnknownGateway(gateway_name.to_string()))?;
        let gateway = self
            .factory
            .get(name)
            .map_err(|e| WebhookProcessorError::ProcessingError(e.to_string()))?;

        let event = gateway
            .parse_webhook_event(raw_body)
            .map_err(|e| WebhookProcessorError::ProcessingError(e.to_string()))?;

        let reference = event
            .transaction_reference
            .clone()
            .or(event.gateway_order_id.clone())
            .ok_or(WebhookProcessorError::MissingReference)?;

        // Establish trust before touching any state
        let (state, payment_id) = if gateway.requires_status_fetch_verification() {
            // Unsigned callback: the payload is only a hint. Ask the
            // gateway what actually happened.
            let status = gateway
                .fetch_status(StatusRequest {
                    transaction_reference: event.transaction_reference.clone(),
                    gateway_order_id: event.gateway_order_id.clone(),
                })
                .await
                .map_err(|e| WebhookProcessorError::ProcessingError(e.to_string()))?;
            (status.status, status.payment_id)
        } else {
            let signature = signature.ok_or(WebhookProcessorError::InvalidSignature)?;
            let verification = gateway
                .verify_webhook(raw_body, signature)
                .map_err(|e| WebhookProcessorError::ProcessingError(e.to_string()))?;
            if !verification.valid {
                error!(gateway = %name, "invalid webhook signature");
                return Err(WebhookProcessorError::InvalidSignature);
            }
            let state = event
                .status
                .clone()
                .unwrap_or(PaymentState::Unknown);
            (state, event.payment_id.clone())
        };

        self.handle_payment_update(name, &reference, state, payment_id.as_deref())
            .await
    }

    /// Route a verified payment state to the purchase or renewal path.
    async fn handle_payment_update(
        &self,
        gateway: GatewayName,
        reference: &str,
        state: PaymentState,
        payment_id: Option<&str>,
    ) -> Result<(), WebhookProcessorError> {
        if let Some(order) = self
            .store
            .find_by_client_txn(reference)
            .await
            .map_err(|e| WebhookProcessorError::DatabaseError(e.to_string()))?
        {
            return self
                .handle_purchase_update(order, gateway, reference, state, payment_id)
                .await;
        }

        if let Some(order) = self
            .store
            .find_by_renewal_txn(reference)
            .await
            .map_err(|e| WebhookProcessorError::DatabaseError(e.to_string()))?
        {
            return self
                .handle_renewal_update(order, reference, state, payment_id)
                .await;
        }

        warn!(gateway = %gateway, reference = %reference, "callback matches no order");
        Err(WebhookProcessorError::UnmatchedReference(
            reference.to_string(),
        ))
    }

    async fn handle_purchase_update(
        &self,
        order: Order,
        gateway: GatewayName,
        reference: &str,
        state: PaymentState,
        payment_id: Option<&str>,
    ) -> Result<(), WebhookProcessorError> {
        match state {
            PaymentState::Success => {
                match order.payment_state() {
                    OrderStatus::Confirmed | OrderStatus::Active => {
                        // Redelivered webhook; the first delivery won
                        info!(order_id = %order.id, "payment already confirmed, ignoring redelivery");
                        return Ok(());
                    }
                    OrderStatus::Pending | OrderStatus::Failed => {}
                    OrderStatus::Terminated => {
                        warn!(order_id = %order.id, "payment callback for terminated order");
                        return Ok(());
                    }
                }

                let confirmed = self
                    .store
                    .confirm_payment(order.id, payment_id.unwrap_or(reference))
                    .await
                    .map_err(|e| WebhookProcessorError::DatabaseError(e.to_string()))?;

                info!(
                    order_id = %order.id,
                    gateway = %gateway,
                    "payment confirmed, dispatching provisioning"
                );
                self.notifier
                    .notify(
                        NotificationEvent::PaymentConfirmed,
                        &confirmed,
                        "payment received, server setup has started",
                    )
                    .await;

                // Detached: the HTTP response does not wait on the backend
                self.orchestrator.spawn_provision(order.id);
                Ok(())
            }
            PaymentState::Failed | PaymentState::Cancelled => {
                if order.payment_state() == OrderStatus::Pending {
                    self.store
                        .mark_payment_failed(order.id, "payment failed at gateway")
                        .await
                        .map_err(|e| WebhookProcessorError::DatabaseError(e.to_string()))?;
                    info!(order_id = %order.id, "payment marked failed");
                }
                Ok(())
            }
            PaymentState::Pending | PaymentState::Unknown => {
                info!(order_id = %order.id, state = ?state, "non-final payment state, no change");
                Ok(())
            }
        }
    }

    async fn handle_renewal_update(
        &self,
        order: Order,
        reference: &str,
        state: PaymentState,
        payment_id: Option<&str>,
    ) -> Result<(), WebhookProcessorError> {
        let amount = order
            .pending_renewal
            .as_ref()
            .map(|p| p.0.amount.clone())
            .unwrap_or_else(|| order.price.clone());

        match state {
            PaymentState::Success => {
                self.renewal
                    .apply_renewal_payment(
                        order.id,
                        reference,
                        payment_id.unwrap_or(reference),
                        amount,
                        false,
                    )
                    .await
                    .map_err(|e| WebhookProcessorError::ProcessingError(e.to_string()))?;
                Ok(())
            }
            PaymentState::Failed | PaymentState::Cancelled => {
                // The payment definitively did not happen; drop the
                // transient record so a fresh renewal can be started.
                self.store
                    .clear_pending_renewal(order.id, reference)
                    .await
                    .map_err(|e| WebhookProcessorError::DatabaseError(e.to_string()))?;
                info!(order_id = %order.id, "renewal payment failed, pending record cleared");
                Ok(())
            }
            PaymentState::Pending | PaymentState::Unknown => Ok(()),
        }
    }
}
