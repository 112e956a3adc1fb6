//! Renewal recovery worker
//!
//! Periodic sweep over live pending renewals: recover payments whose
//! webhook never arrived, clear stale records (after re-verification), and
//! purge long-abandoned unpaid orders.

use crate::services::recovery::RecoveryService;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::watch;
use tracing::info;

pub struct RenewalRecoveryWorker {
    service: Arc<RecoveryService>,
    interval: Duration,
}

impl RenewalRecoveryWorker {
    pub fn new(service: Arc<RecoveryService>, interval: Duration) -> Self {
        Self { service, interval }
    }

    pub async fn run(self, mut shutdown_rx: watch::Receiver<bool>) {
        info!(
            interval_secs = self.interval.as_secs(),
            "renewal recovery worker started"
        );

        loop {
            tokio::select! {
                _ = shutdown_rx.changed() => {
                    if *shutdown_rx.borrow() {
                        info!("renewal recovery worker stopping");
                        break;
                    }
                }
                _ = tokio::time::sleep(self.interval) => {
                    let recovery = self.service.recover_pending_renewals().await;
                    if recovery.recovered > 0 {
                        info!(recovered = recovery.recovered, "renewals recovered by reconciliation");
                    }
                    let cleanup = self.service.clear_stale_renewals().await;
                    if cleanup.cleared > 0 || cleanup.recovered > 0 {
                        info!(
                            cleared = cleanup.cleared,
                            recovered = cleanup.recovered,
                            "stale renewal cleanup finished"
                        );
                    }
                    let _ = self.service.purge_abandoned_orders().await;
                }
            }
        }

        info!("renewal recovery worker stopped");
    }
}
