//! Provider status sync
//!
//! Some backends build asynchronously and have no webhook; the only way
//! their servers ever surface is by polling. This service walks orders that
//! hold a service id but no credentials, asks the provider for live state,
//! and commits credentials + `active` the moment they appear. Unrecognized
//! status tokens cause no state change.

use crate::database::order_repository::{OrderStore, ProvisioningStatus};
use crate::providers::registry::ProviderRegistry;
use crate::providers::types::{MachineStatus, ProviderKind};
use crate::services::notification::{NotificationEvent, Notifier};
use serde::{Deserialize, Serialize};
use std::str::FromStr;
use std::sync::Arc;
use tracing::{info, warn};

#[derive(Debug, Clone)]
pub struct StatusSyncConfig {
    /// Orders examined per sweep
    pub batch_size: i64,
}

impl Default for StatusSyncConfig {
    fn default() -> Self {
        Self { batch_size: 50 }
    }
}

impl StatusSyncConfig {
    pub fn from_env() -> Self {
        let mut cfg = Self::default();
        cfg.batch_size = std::env::var("STATUS_SYNC_BATCH_SIZE")
            .ok()
            .and_then(|v| v.parse::<i64>().ok())
            .unwrap_or(cfg.batch_size);
        cfg
    }
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct StatusSyncSummary {
    pub checked: usize,
    pub activated: usize,
    pub failed: usize,
    pub unchanged: usize,
    pub errors: usize,
}

pub struct StatusSyncService {
    store: Arc<dyn OrderStore>,
    registry: Arc<ProviderRegistry>,
    notifier: Arc<dyn Notifier>,
    config: StatusSyncConfig,
}

impl StatusSyncService {
    pub fn new(
        store: Arc<dyn OrderStore>,
        registry: Arc<ProviderRegistry>,
        notifier: Arc<dyn Notifier>,
        config: StatusSyncConfig,
    ) -> Self {
        Self {
            store,
            registry,
            notifier,
            config,
        }
    }

    pub async fn sync_once(&self) -> StatusSyncSummary {
        let mut summary = StatusSyncSummary::default();

        let orders = match self
            .store
            .find_awaiting_status_sync(self.config.batch_size)
            .await
        {
            Ok(orders) => orders,
            Err(e) => {
                warn!(error = %e, "failed to list orders awaiting status sync");
                summary.errors += 1;
                return summary;
            }
        };

        for order in orders {
            summary.checked += 1;

            let (kind, service_id) = match (&order.provider, &order.provider_service_id) {
                (Some(provider), Some(service_id)) => {
                    match ProviderKind::from_str(provider) {
                        Ok(kind) if kind != ProviderKind::Manual => (kind, service_id.clone()),
                        _ => {
                            summary.unchanged += 1;
                            continue;
                        }
                    }
                }
                _ => {
                    summary.unchanged += 1;
                    continue;
                }
            };

            let provider = match self.registry.get(kind) {
                Ok(provider) => provider,
                Err(e) => {
                    warn!(order_id = %order.id, error = %e, "provider unavailable for sync");
                    summary.errors += 1;
                    continue;
                }
            };

            let status = match provider.get_status(&service_id).await {
                Ok(status) => status,
                Err(e) => {
                    warn!(order_id = %order.id, service_id = %service_id, error = %e, "status fetch failed");
                    summary.errors += 1;
                    continue;
                }
            };

            match status.machine_status {
                MachineStatus::Active => {
                    let ip = match status.ip_address {
                        Some(ip) if !ip.trim().is_empty() => ip,
                        _ => {
                            // Running but no address reported yet; try again
                            // next sweep
                            summary.unchanged += 1;
                            continue;
                        }
                    };

                    match self
                        .store
                        .record_synced_credentials(
                            order.id,
                            &ip,
                            status.username.as_deref(),
                            status.password.as_deref(),
                        )
                        .await
                    {
                        Ok(()) => {
                            info!(
                                order_id = %order.id,
                                ip = %ip,
                                "credentials surfaced via status sync, order active"
                            );
                            self.notifier
                                .notify(
                                    NotificationEvent::ProvisioningSucceeded,
                                    &order,
                                    "your server is ready",
                                )
                                .await;
                            summary.activated += 1;
                        }
                        Err(e) => {
                            warn!(order_id = %order.id, error = %e, "failed to persist synced credentials");
                            summary.errors += 1;
                        }
                    }
                }
                MachineStatus::Failed => {
                    match self
                        .store
                        .record_provision_failure(order.id, "[backend] build failed upstream")
                        .await
                    {
                        Ok(()) => summary.failed += 1,
                        Err(e) => {
                            warn!(order_id = %order.id, error = %e, "failed to persist failed build");
                            summary.errors += 1;
                        }
                    }
                }
                MachineStatus::Terminated => {
                    match self
                        .store
                        .update_provisioning_status(order.id, ProvisioningStatus::Terminated)
                        .await
                    {
                        Ok(()) => summary.unchanged += 1,
                        Err(e) => {
                            warn!(order_id = %order.id, error = %e, "failed to persist terminated state");
                            summary.errors += 1;
                        }
                    }
                }
                MachineStatus::Provisioning | MachineStatus::Suspended => {
                    summary.unchanged += 1;
                }
                MachineStatus::Unrecognized(token) => {
                    // Logged at normalization; no state change
                    warn!(order_id = %order.id, token = %token, "unmapped status token from backend");
                    summary.unchanged += 1;
                }
            }
        }

        if summary.activated > 0 || summary.failed > 0 {
            info!(
                checked = summary.checked,
                activated = summary.activated,
                failed = summary.failed,
                "status sync sweep finished"
            );
        }
        summary
    }
}
