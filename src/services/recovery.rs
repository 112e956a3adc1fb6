//! Renewal recovery and reconciliation
//!
//! Webhooks get lost. For every order with a live pending_renewal this
//! service asks the gateways directly what happened to the payment and
//! repairs the order store: confirmed payments are pushed through the
//! renewal engine (idempotently, keyed on renewal_txn_id), and records past
//! the stale threshold are cleared, but only after one final gateway
//! check, never speculatively.

use crate::database::order_repository::{Order, OrderStore};
use crate::gateways::factory::GatewayFactory;
use crate::gateways::types::{GatewayName, PaymentState, StatusRequest, StatusResponse};
use crate::services::renewal::RenewalEngine;
use chrono::{Duration, Utc};
use serde::{Deserialize, Serialize};
use std::str::FromStr;
use std::sync::Arc;
use tracing::{info, warn};

#[derive(Debug, Clone)]
pub struct RecoveryConfig {
    /// Age after which a pending renewal with no confirmed payment is
    /// eligible for cleanup
    pub stale_after_hours: i64,
    /// Unpaid orders older than this are purged entirely
    pub abandoned_after_days: i64,
}

impl Default for RecoveryConfig {
    fn default() -> Self {
        Self {
            stale_after_hours: 48,
            abandoned_after_days: 30,
        }
    }
}

impl RecoveryConfig {
    pub fn from_env() -> Self {
        let mut cfg = Self::default();
        cfg.stale_after_hours = std::env::var("RENEWAL_STALE_AFTER_HOURS")
            .ok()
            .and_then(|v| v.parse::<i64>().ok())
            .unwrap_or(cfg.stale_after_hours);
        cfg.abandoned_after_days = std::env::var("ORDER_ABANDONED_AFTER_DAYS")
            .ok()
            .and_then(|v| v.parse::<i64>().ok())
            .unwrap_or(cfg.abandoned_after_days);
        cfg
    }
}

/// Summary of one recovery sweep
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct RecoverySummary {
    pub scanned: usize,
    pub recovered: usize,
    pub still_pending: usize,
    pub errors: usize,
}

/// Summary of one stale-cleanup sweep
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct StaleCleanupSummary {
    pub scanned: usize,
    pub cleared: usize,
    /// Stale records whose payment turned out to have succeeded; these are
    /// recovered instead of cleared
    pub recovered: usize,
    pub kept: usize,
}

/// Read-only reconciliation report over live pending renewals
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct PendingRenewalReport {
    pub paid_but_unprocessed: Vec<PendingRenewalEntry>,
    pub still_pending: Vec<PendingRenewalEntry>,
    pub stale: Vec<PendingRenewalEntry>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PendingRenewalEntry {
    pub order_id: uuid::Uuid,
    pub renewal_txn_id: String,
    pub gateway: String,
    pub age_hours: i64,
}

pub struct RecoveryService {
    store: Arc<dyn OrderStore>,
    factory: Arc<GatewayFactory>,
    renewal: Arc<RenewalEngine>,
    config: RecoveryConfig,
}

impl RecoveryService {
    pub fn new(
        store: Arc<dyn OrderStore>,
        factory: Arc<GatewayFactory>,
        renewal: Arc<RenewalEngine>,
        config: RecoveryConfig,
    ) -> Self {
        Self {
            store,
            factory,
            renewal,
            config,
        }
    }

    /// Ask every gateway about a renewal txn, starting with the one that
    /// created the order. First confirmed success wins.
    async fn probe_gateways(
        &self,
        order: &Order,
        renewal_txn_id: &str,
        initiated_gateway: &str,
    ) -> Option<(GatewayName, StatusResponse)> {
        let mut names = self.factory.list();
        if let Ok(first) = GatewayName::from_str(initiated_gateway) {
            names.sort_by_key(|n| if *n == first { 0 } else { 1 });
        }

        for name in names {
            let gateway = match self.factory.get(name) {
                Ok(g) => g,
                Err(_) => continue,
            };
            match gateway
                .fetch_status(StatusRequest {
                    transaction_reference: Some(renewal_txn_id.to_string()),
                    gateway_order_id: None,
                })
                .await
            {
                Ok(status) if status.status == PaymentState::Success => {
                    info!(
                        order_id = %order.id,
                        gateway = %name,
                        renewal_txn_id = %renewal_txn_id,
                        "gateway reports renewal payment success"
                    );
                    return Some((name, status));
                }
                Ok(_) => {}
                Err(e) => {
                    warn!(
                        order_id = %order.id,
                        gateway = %name,
                        error = %e,
                        "gateway status probe failed"
                    );
                }
            }
        }
        None
    }

    /// Recover renewals whose webhook never arrived. Idempotent: the
    /// renewal engine dedups on renewal_txn_id.
    pub async fn recover_pending_renewals(&self) -> RecoverySummary {
        let mut summary = RecoverySummary::default();

        let orders = match self.store.find_with_pending_renewal().await {
            Ok(orders) => orders,
            Err(e) => {
                warn!(error = %e, "failed to list pending renewals");
                summary.errors += 1;
                return summary;
            }
        };
        summary.scanned = orders.len();

        for order in orders {
            let pending = match &order.pending_renewal {
                Some(pending) => pending.0.clone(),
                None => continue,
            };

            match self
                .probe_gateways(&order, &pending.renewal_txn_id, &pending.gateway)
                .await
            {
                Some((_, status)) => {
                    let payment_id = status
                        .payment_id
                        .unwrap_or_else(|| pending.renewal_txn_id.clone());
                    match self
                        .renewal
                        .apply_renewal_payment(
                            order.id,
                            &pending.renewal_txn_id,
                            &payment_id,
                            pending.amount.clone(),
                            true,
                        )
                        .await
                    {
                        Ok(_) => summary.recovered += 1,
                        Err(e) => {
                            warn!(order_id = %order.id, error = %e, "renewal recovery failed");
                            summary.errors += 1;
                        }
                    }
                }
                None => summary.still_pending += 1,
            }
        }

        info!(
            scanned = summary.scanned,
            recovered = summary.recovered,
            still_pending = summary.still_pending,
            "renewal recovery sweep finished"
        );
        summary
    }

    /// Clear pending renewals past the stale threshold. Each record gets
    /// one final gateway probe immediately before deletion; a payment that
    /// turns out to have succeeded is recovered, not deleted.
    pub async fn clear_stale_renewals(&self) -> StaleCleanupSummary {
        let mut summary = StaleCleanupSummary::default();
        let cutoff = Utc::now() - Duration::hours(self.config.stale_after_hours);

        let orders = match self.store.find_with_pending_renewal().await {
            Ok(orders) => orders,
            Err(e) => {
                warn!(error = %e, "failed to list pending renewals");
                return summary;
            }
        };
        summary.scanned = orders.len();

        for order in orders {
            let pending = match &order.pending_renewal {
                Some(pending) => pending.0.clone(),
                None => continue,
            };

            if pending.initiated_at > cutoff {
                summary.kept += 1;
                continue;
            }

            // Last-chance probe: never delete a paid renewal
            match self
                .probe_gateways(&order, &pending.renewal_txn_id, &pending.gateway)
                .await
            {
                Some((_, status)) => {
                    let payment_id = status
                        .payment_id
                        .unwrap_or_else(|| pending.renewal_txn_id.clone());
                    match self
                        .renewal
                        .apply_renewal_payment(
                            order.id,
                            &pending.renewal_txn_id,
                            &payment_id,
                            pending.amount.clone(),
                            true,
                        )
                        .await
                    {
                        Ok(_) => summary.recovered += 1,
                        Err(e) => {
                            warn!(order_id = %order.id, error = %e, "late renewal recovery failed");
                            summary.kept += 1;
                        }
                    }
                }
                None => {
                    match self
                        .store
                        .clear_pending_renewal(order.id, &pending.renewal_txn_id)
                        .await
                    {
                        Ok(()) => {
                            info!(
                                order_id = %order.id,
                                renewal_txn_id = %pending.renewal_txn_id,
                                "stale pending renewal cleared"
                            );
                            summary.cleared += 1;
                        }
                        Err(e) => {
                            warn!(order_id = %order.id, error = %e, "failed to clear stale renewal");
                            summary.kept += 1;
                        }
                    }
                }
            }
        }

        summary
    }

    /// Categorize live pending renewals without mutating anything.
    pub async fn pending_renewal_report(&self) -> PendingRenewalReport {
        let mut report = PendingRenewalReport::default();
        let now = Utc::now();

        let orders = match self.store.find_with_pending_renewal().await {
            Ok(orders) => orders,
            Err(e) => {
                warn!(error = %e, "failed to list pending renewals");
                return report;
            }
        };

        for order in orders {
            let pending = match &order.pending_renewal {
                Some(pending) => pending.0.clone(),
                None => continue,
            };
            let entry = PendingRenewalEntry {
                order_id: order.id,
                renewal_txn_id: pending.renewal_txn_id.clone(),
                gateway: pending.gateway.clone(),
                age_hours: (now - pending.initiated_at).num_hours(),
            };

            if self
                .probe_gateways(&order, &pending.renewal_txn_id, &pending.gateway)
                .await
                .is_some()
            {
                report.paid_but_unprocessed.push(entry);
            } else if entry.age_hours >= self.config.stale_after_hours {
                report.stale.push(entry);
            } else {
                report.still_pending.push(entry);
            }
        }

        report
    }

    /// Purge orders that never saw a payment. Failed orders are kept for
    /// audit regardless of age.
    pub async fn purge_abandoned_orders(&self) -> u64 {
        let cutoff = Utc::now() - Duration::days(self.config.abandoned_after_days);
        match self.store.delete_abandoned_unpaid(cutoff).await {
            Ok(count) => {
                if count > 0 {
                    info!(purged = count, "abandoned unpaid orders purged");
                }
                count
            }
            Err(e) => {
                warn!(error = %e, "failed to purge abandoned orders");
                0
            }
        }
    }
}
