//! Status sync worker
//!
//! Drives the periodic provider-state poll that surfaces slow asynchronous
//! builds (credentials appearing minutes after the provision call).

use crate::services::status_sync::StatusSyncService;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::watch;
use tracing::info;

pub struct StatusSyncWorker {
    service: Arc<StatusSyncService>,
    interval: Duration,
}

impl StatusSyncWorker {
    pub fn new(service: Arc<StatusSyncService>, interval: Duration) -> Self {
        Self { service, interval }
    }

    pub async fn run(self, mut shutdown_rx: watch::Receiver<bool>) {
        info!(
            interval_secs = self.interval.as_secs(),
            "status sync worker started"
        );

        loop {
            tokio::select! {
                _ = shutdown_rx.changed() => {
                    if *shutdown_rx.borrow() {
                        info!("status sync worker stopping");
                        break;
                    }
                }
                _ = tokio::time::sleep(self.interval) => {
                    let _ = self.service.sync_once().await;
                }
            }
        }

        info!("status sync worker stopped");
    }
}
