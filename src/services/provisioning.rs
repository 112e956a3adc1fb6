//! Provisioning orchestrator
//!
//! Turns a confirmed order into a running server exactly once. There is no
//! distributed lock anywhere in the system; the only thing standing between
//! two concurrent invocations and a double-provisioned server is the
//! compare-and-swap claim at the order store (`claim_for_provisioning`).
//! Every caller (webhook path, batch runner, operator retry) must go
//! through `provision_order`, which acquires that claim before touching any
//! provider API.
//!
//! Dispatch is fire-and-forget relative to the caller (`spawn`), but
//! completion is observable: every attempt broadcasts a `ProvisioningEvent`,
//! which is what the integration tests await instead of sleeping.

use crate::database::order_repository::{Order, OrderStore, ProvisionedServer, ProvisioningStatus};
use crate::providers::registry::ProviderRegistry;
use crate::providers::selection::{determine_os, infer_provider};
use crate::providers::types::{ProviderKind, ProvisionOutcome, ProvisionRequest};
use crate::services::notification::{NotificationEvent, Notifier};
use crate::services::renewal::RENEWAL_PERIOD_DAYS;
use async_trait::async_trait;
use chrono::{Duration as ChronoDuration, Utc};
use std::sync::Arc;
use tokio::sync::broadcast;
use tracing::{error, info, warn};
use uuid::Uuid;

/// Narrow catalog contract: the catalog service owns product metadata; the
/// orchestrator only ever asks for the provider tag.
#[async_trait]
pub trait CatalogHints: Send + Sync {
    async fn provider_tag(&self, product_name: &str) -> Option<String>;
}

/// Catalog lookup that knows nothing; inference falls through to heuristics.
pub struct NoCatalog;

#[async_trait]
impl CatalogHints for NoCatalog {
    async fn provider_tag(&self, _product_name: &str) -> Option<String> {
        None
    }
}

/// Terminal outcome of one provisioning attempt
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ProvisionAttemptOutcome {
    /// Server is up, credentials persisted
    Provisioned,
    /// Backend builds asynchronously; status sync will finish the job
    AwaitingBackend,
    /// Routed to the manual fulfilment queue
    ManualFulfillment,
    /// Attempt failed; the persisted error carries the structured code
    Failed(String),
    /// Another invocation holds or finished the claim; nothing was done
    Skipped,
}

/// Broadcast after every attempt, successful or not
#[derive(Debug, Clone)]
pub struct ProvisioningEvent {
    pub order_id: Uuid,
    pub outcome: ProvisionAttemptOutcome,
}

pub struct ProvisioningOrchestrator {
    store: Arc<dyn OrderStore>,
    registry: Arc<ProviderRegistry>,
    catalog: Arc<dyn CatalogHints>,
    notifier: Arc<dyn Notifier>,
    events: broadcast::Sender<ProvisioningEvent>,
}

impl ProvisioningOrchestrator {
    pub fn new(
        store: Arc<dyn OrderStore>,
        registry: Arc<ProviderRegistry>,
        catalog: Arc<dyn CatalogHints>,
        notifier: Arc<dyn Notifier>,
    ) -> Self {
        let (events, _) = broadcast::channel(64);
        Self {
            store,
            registry,
            catalog,
            notifier,
            events,
        }
    }

    /// Observe attempt completions; used by tests and the admin event feed.
    pub fn subscribe(&self) -> broadcast::Receiver<ProvisioningEvent> {
        self.events.subscribe()
    }

    /// Fire-and-forget dispatch used by the webhook path so the HTTP
    /// response never waits on a hosting backend.
    pub fn spawn_provision(self: &Arc<Self>, order_id: Uuid) {
        let orchestrator = Arc::clone(self);
        tokio::spawn(async move {
            orchestrator.provision_order(order_id).await;
        });
    }

    /// One full provisioning attempt. Safe to call concurrently for the
    /// same order: exactly one caller wins the claim, the rest observe
    /// `Skipped`.
    pub async fn provision_order(&self, order_id: Uuid) -> ProvisionAttemptOutcome {
        let outcome = self.provision_inner(order_id).await;
        let _ = self.events.send(ProvisioningEvent {
            order_id,
            outcome: outcome.clone(),
        });
        outcome
    }

    async fn provision_inner(&self, order_id: Uuid) -> ProvisionAttemptOutcome {
        let order = match self.store.find_by_id(order_id).await {
            Ok(Some(order)) => order,
            Ok(None) => {
                warn!(order_id = %order_id, "provisioning requested for unknown order");
                return ProvisionAttemptOutcome::Skipped;
            }
            Err(e) => {
                error!(order_id = %order_id, error = %e, "order lookup failed");
                return ProvisionAttemptOutcome::Failed(e.to_string());
            }
        };

        // The claim is the concurrency guard: it re-reads and flips
        // provisioning_status in one conditional update. Losing it means a
        // concurrent invocation is (or was) already at work.
        match self.store.claim_for_provisioning(order_id).await {
            Ok(true) => {}
            Ok(false) => {
                info!(
                    order_id = %order_id,
                    current_status = %order.provisioning_status,
                    "provisioning claim not acquired, skipping"
                );
                return ProvisionAttemptOutcome::Skipped;
            }
            Err(e) => {
                error!(order_id = %order_id, error = %e, "provisioning claim failed");
                return ProvisionAttemptOutcome::Failed(e.to_string());
            }
        }

        let os = order
            .os
            .clone()
            .filter(|v| !v.trim().is_empty())
            .unwrap_or_else(|| determine_os(&order.product_name));

        let catalog_tag = self.catalog.provider_tag(&order.product_name).await;
        let kind = infer_provider(
            order.provider.as_deref(),
            catalog_tag.as_deref(),
            &order.product_name,
            order.ip_address.as_deref(),
        );

        if kind == ProviderKind::Manual {
            // Human fulfilment: release the claim so the order stays
            // visible as awaiting setup, and never mark it auto-provisioned.
            if let Err(e) = self
                .store
                .update_provisioning_status(order_id, ProvisioningStatus::Pending)
                .await
            {
                error!(order_id = %order_id, error = %e, "failed to release claim for manual order");
            }
            info!(order_id = %order_id, "order requires manual fulfilment");
            return ProvisionAttemptOutcome::ManualFulfillment;
        }

        let provider = match self.registry.get(kind) {
            Ok(provider) => provider,
            Err(e) => {
                let message = e.persisted_message();
                self.persist_failure(&order, &message).await;
                return ProvisionAttemptOutcome::Failed(message);
            }
        };

        info!(
            order_id = %order_id,
            provider = %kind,
            os = %os,
            "provisioning order"
        );

        let request = ProvisionRequest {
            order_id,
            label: order.product_name.clone(),
            os: os.clone(),
            memory_mb: order.memory_mb,
        };

        match provider.provision(request).await {
            Ok(ProvisionOutcome::Ready {
                service_id,
                ip_address,
                username,
                password,
            }) => {
                let server = ProvisionedServer {
                    service_id,
                    ip_address,
                    username,
                    password,
                    os,
                };
                let expiry = Utc::now() + ChronoDuration::days(RENEWAL_PERIOD_DAYS);
                match self
                    .store
                    .record_provision_success(order_id, kind.as_str(), &server, expiry)
                    .await
                {
                    Ok(updated) => {
                        info!(
                            order_id = %order_id,
                            service_id = %server.service_id,
                            ip = %server.ip_address,
                            "server provisioned"
                        );
                        self.notifier
                            .notify(
                                NotificationEvent::ProvisioningSucceeded,
                                &updated,
                                "your server is ready",
                            )
                            .await;
                        ProvisionAttemptOutcome::Provisioned
                    }
                    Err(e) => {
                        // Server exists upstream but the commit failed;
                        // status sync will reconcile from provider truth.
                        error!(order_id = %order_id, error = %e, "failed to persist provisioned server");
                        ProvisionAttemptOutcome::Failed(e.to_string())
                    }
                }
            }
            Ok(ProvisionOutcome::Accepted { service_id }) => {
                if let Err(e) = self
                    .store
                    .record_provision_accepted(order_id, kind.as_str(), &service_id)
                    .await
                {
                    error!(order_id = %order_id, error = %e, "failed to persist accepted build");
                    return ProvisionAttemptOutcome::Failed(e.to_string());
                }
                info!(
                    order_id = %order_id,
                    service_id = %service_id,
                    "backend accepted build, awaiting status sync"
                );
                ProvisionAttemptOutcome::AwaitingBackend
            }
            Ok(ProvisionOutcome::ManualFulfillment) => {
                if let Err(e) = self
                    .store
                    .update_provisioning_status(order_id, ProvisioningStatus::Pending)
                    .await
                {
                    error!(order_id = %order_id, error = %e, "failed to release claim for manual order");
                }
                ProvisionAttemptOutcome::ManualFulfillment
            }
            Err(e) => {
                let message = e.persisted_message();
                warn!(
                    order_id = %order_id,
                    provider = %kind,
                    code = e.code.as_str(),
                    "provisioning attempt failed"
                );
                self.persist_failure(&order, &message).await;
                ProvisionAttemptOutcome::Failed(message)
            }
        }
    }

    async fn persist_failure(&self, order: &Order, message: &str) {
        if let Err(e) = self.store.record_provision_failure(order.id, message).await {
            error!(order_id = %order.id, error = %e, "failed to persist provisioning error");
        }
        self.notifier
            .notify(
                NotificationEvent::ProvisioningFailed,
                order,
                "provisioning did not complete; our team will review",
            )
            .await;
    }
}
