//! Renewal engine
//!
//! A renewal payment buys exactly thirty days, anchored at whichever is
//! later: the current expiry or now. Renewing early stacks on top of the
//! remaining time; renewing late starts from today instead of compounding
//! the overdue period. The ledger entry is appended before the provider
//! renew call and the expiry extension is never rolled back: the money has
//! already been captured, so a failed provider call is recorded on the
//! entry and retried by hand without re-charging.

use crate::database::order_repository::{
    Order, OrderStore, RenewalApplied, RenewalPayment,
};
use crate::error::{AppError, AppErrorKind, DomainError};
use crate::providers::registry::ProviderRegistry;
use crate::providers::types::ProviderKind;
use crate::services::notification::{NotificationEvent, Notifier};
use bigdecimal::BigDecimal;
use chrono::{DateTime, Duration, Utc};
use std::str::FromStr;
use std::sync::Arc;
use tracing::{info, warn};
use uuid::Uuid;

pub const RENEWAL_PERIOD_DAYS: i64 = 30;

/// `max(current_expiry, now) + 30 days`
pub fn compute_new_expiry(
    current_expiry: Option<DateTime<Utc>>,
    now: DateTime<Utc>,
) -> DateTime<Utc> {
    let anchor = match current_expiry {
        Some(expiry) if expiry > now => expiry,
        _ => now,
    };
    anchor + Duration::days(RENEWAL_PERIOD_DAYS)
}

/// Result of confirming one renewal payment
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RenewalOutcome {
    Applied {
        new_expiry: DateTime<Utc>,
        provider_renewal_success: bool,
    },
    /// The ledger already holds this renewal_txn_id; nothing was changed
    AlreadyApplied,
}

pub struct RenewalEngine {
    store: Arc<dyn OrderStore>,
    registry: Arc<ProviderRegistry>,
    notifier: Arc<dyn Notifier>,
}

impl RenewalEngine {
    pub fn new(
        store: Arc<dyn OrderStore>,
        registry: Arc<ProviderRegistry>,
        notifier: Arc<dyn Notifier>,
    ) -> Self {
        Self {
            store,
            registry,
            notifier,
        }
    }

    /// Apply a confirmed renewal payment to an order.
    ///
    /// Idempotent on `renewal_txn_id`: webhook delivery, gateway polling and
    /// the recovery job can all race through here and the ledger gains at
    /// most one entry. `recovered` stamps the entry when the payment was
    /// found by reconciliation rather than a webhook.
    pub async fn apply_renewal_payment(
        &self,
        order_id: Uuid,
        renewal_txn_id: &str,
        payment_id: &str,
        amount: BigDecimal,
        recovered: bool,
    ) -> Result<RenewalOutcome, AppError> {
        let order = self
            .store
            .find_by_id(order_id)
            .await?
            .ok_or_else(|| {
                AppError::new(AppErrorKind::Domain(DomainError::OrderNotFound {
                    order_id: order_id.to_string(),
                }))
            })?;

        if order.has_renewal_entry(renewal_txn_id) {
            info!(
                order_id = %order_id,
                renewal_txn_id = %renewal_txn_id,
                "renewal already applied, clearing pending record"
            );
            self.store
                .clear_pending_renewal(order_id, renewal_txn_id)
                .await?;
            return Ok(RenewalOutcome::AlreadyApplied);
        }

        let now = Utc::now();
        let new_expiry = compute_new_expiry(order.expiry_date, now);
        let entry = RenewalPayment {
            payment_id: payment_id.to_string(),
            amount,
            previous_expiry: order.expiry_date,
            new_expiry,
            renewal_txn_id: renewal_txn_id.to_string(),
            provider: order.provider.clone(),
            provider_renewal_success: false,
            recovered_at: recovered.then_some(now),
        };

        match self.store.apply_renewal(order_id, &entry, new_expiry).await? {
            RenewalApplied::Duplicate => {
                // Lost the race against a concurrent confirmation; treat
                // exactly like the pre-check above.
                self.store
                    .clear_pending_renewal(order_id, renewal_txn_id)
                    .await?;
                return Ok(RenewalOutcome::AlreadyApplied);
            }
            RenewalApplied::Applied => {}
        }

        self.store
            .clear_pending_renewal(order_id, renewal_txn_id)
            .await?;

        info!(
            order_id = %order_id,
            renewal_txn_id = %renewal_txn_id,
            previous_expiry = ?order.expiry_date,
            new_expiry = %new_expiry,
            recovered = recovered,
            "renewal payment applied"
        );

        let provider_renewal_success = self.invoke_provider_renew(&order, renewal_txn_id).await;

        if provider_renewal_success {
            self.notifier
                .notify(
                    NotificationEvent::RenewalApplied,
                    &order,
                    "your server has been renewed",
                )
                .await;
        } else {
            self.notifier
                .notify(
                    NotificationEvent::RenewalProviderFailed,
                    &order,
                    "renewal paid; provider-side extension pending",
                )
                .await;
        }

        Ok(RenewalOutcome::Applied {
            new_expiry,
            provider_renewal_success,
        })
    }

    /// Provider-side renew. Failures are recorded on the ledger entry and
    /// never undo the expiry extension.
    async fn invoke_provider_renew(&self, order: &Order, renewal_txn_id: &str) -> bool {
        let (provider_name, service_id) = match (&order.provider, &order.provider_service_id) {
            (Some(provider), Some(service_id)) => (provider.clone(), service_id.clone()),
            _ => {
                // Nothing to renew upstream (manual or not yet provisioned)
                let _ = self
                    .store
                    .set_renewal_provider_result(order.id, renewal_txn_id, true)
                    .await;
                return true;
            }
        };

        let kind = match ProviderKind::from_str(&provider_name) {
            Ok(kind) => kind,
            Err(e) => {
                warn!(order_id = %order.id, error = %e, "unknown provider on renewal");
                let _ = self
                    .store
                    .set_renewal_provider_result(order.id, renewal_txn_id, false)
                    .await;
                return false;
            }
        };

        let result = match self.registry.get(kind) {
            Ok(provider) => provider.renew(&service_id).await,
            Err(e) => Err(e),
        };

        match result {
            Ok(()) => {
                let _ = self
                    .store
                    .set_renewal_provider_result(order.id, renewal_txn_id, true)
                    .await;
                true
            }
            Err(e) => {
                warn!(
                    order_id = %order.id,
                    service_id = %service_id,
                    error = %e,
                    "provider renew call failed; expiry extension kept"
                );
                let _ = self
                    .store
                    .set_renewal_provider_result(order.id, renewal_txn_id, false)
                    .await;
                false
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn renewal_anchors_to_future_expiry() {
        let now = Utc::now();
        let expiry = now + Duration::days(10);
        let new_expiry = compute_new_expiry(Some(expiry), now);
        assert_eq!(new_expiry, expiry + Duration::days(30));
    }

    #[test]
    fn renewal_anchors_to_now_when_expired() {
        let now = Utc::now();
        let expiry = now - Duration::days(5);
        let new_expiry = compute_new_expiry(Some(expiry), now);
        assert_eq!(new_expiry, now + Duration::days(30));
    }

    #[test]
    fn renewal_anchors_to_now_when_never_provisioned() {
        let now = Utc::now();
        let new_expiry = compute_new_expiry(None, now);
        assert_eq!(new_expiry, now + Duration::days(30));
    }
}
