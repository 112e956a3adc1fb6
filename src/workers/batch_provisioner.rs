//! Batch retry provisioner
//!
//! Time-boxed sweep over orders that paid but have no server yet: confirmed,
//! not already provisioning/active, and either never attempted or failed
//! with something worth retrying. Each sweep processes a bounded batch under
//! a wall-clock budget, retries each order a bounded number of times with a
//! fixed delay, and spaces orders out to respect upstream rate limits.
//! Orders that exhaust their retries are failed with a manual-review marker
//! prefixed to the error (the original message kept verbatim after it).

use crate::database::order_repository::{Order, OrderStore, ProvisioningStatus};
use crate::providers::error::ProviderErrorCode;
use crate::services::provisioning::{ProvisionAttemptOutcome, ProvisioningOrchestrator};
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use std::time::{Duration, Instant};
use tokio::sync::watch;
use tracing::{info, warn};

/// Marker prefixed to provisioning_error once retries are exhausted; orders
/// carrying it are left for an operator and never swept again.
pub const MANUAL_REVIEW_PREFIX: &str = "[manual-review]";

// ---------------------------------------------------------------------------
// Retry policy
// ---------------------------------------------------------------------------

/// Decides whether a persisted provisioning error is worth another attempt.
///
/// Fresh failures carry a structured `[code]` prefix and are classified by
/// code. Errors persisted by older code (or edited by hand) fall back to a
/// fixed substring scan over the prose.
#[derive(Debug, Clone)]
pub struct RetryPolicy {
    message_markers: Vec<String>,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            message_markers: [
                "rate limit",
                "too many requests",
                "already in use",
                "ip conflict",
                "weak password",
                "password validation",
                "timeout",
                "timed out",
                "temporarily unavailable",
            ]
            .iter()
            .map(|s| s.to_string())
            .collect(),
        }
    }
}

impl RetryPolicy {
    pub fn is_retryable_message(&self, message: &str) -> bool {
        let message = message.trim();
        if message.starts_with(MANUAL_REVIEW_PREFIX) {
            return false;
        }

        // Structured code prefix: "[code] ..."
        if let Some(rest) = message.strip_prefix('[') {
            if let Some(end) = rest.find(']') {
                if let Some(code) = ProviderErrorCode::parse(&rest[..end]) {
                    return code.is_retryable();
                }
            }
        }

        let lower = message.to_lowercase();
        self.message_markers.iter().any(|m| lower.contains(m))
    }
}

// ---------------------------------------------------------------------------
// Configuration
// ---------------------------------------------------------------------------

#[derive(Debug, Clone)]
pub struct BatchProvisionerConfig {
    /// Orders processed per sweep
    pub batch_size: i64,
    /// Attempts per order within one sweep
    pub max_retries: u32,
    /// Delay between attempts on the same order
    pub retry_delay: Duration,
    /// Delay between orders in the same batch
    pub inter_order_delay: Duration,
    /// Overall wall-clock budget for one sweep
    pub wall_clock_budget: Duration,
    /// How often the background worker runs a sweep
    pub sweep_interval: Duration,
}

impl Default for BatchProvisionerConfig {
    fn default() -> Self {
        Self {
            batch_size: 5,
            max_retries: 3,
            retry_delay: Duration::from_secs(20),
            inter_order_delay: Duration::from_secs(5),
            wall_clock_budget: Duration::from_secs(240),
            sweep_interval: Duration::from_secs(300),
        }
    }
}

impl BatchProvisionerConfig {
    pub fn from_env() -> Self {
        let mut cfg = Self::default();
        cfg.batch_size = std::env::var("PROVISIONER_BATCH_SIZE")
            .ok()
            .and_then(|v| v.parse::<i64>().ok())
            .unwrap_or(cfg.batch_size);
        cfg.max_retries = std::env::var("PROVISIONER_MAX_RETRIES")
            .ok()
            .and_then(|v| v.parse::<u32>().ok())
            .unwrap_or(cfg.max_retries);
        cfg.retry_delay = Duration::from_secs(
            std::env::var("PROVISIONER_RETRY_DELAY_SECONDS")
                .ok()
                .and_then(|v| v.parse::<u64>().ok())
                .unwrap_or(cfg.retry_delay.as_secs()),
        );
        cfg.inter_order_delay = Duration::from_secs(
            std::env::var("PROVISIONER_INTER_ORDER_DELAY_SECONDS")
                .ok()
                .and_then(|v| v.parse::<u64>().ok())
                .unwrap_or(cfg.inter_order_delay.as_secs()),
        );
        cfg.wall_clock_budget = Duration::from_secs(
            std::env::var("PROVISIONER_WALL_CLOCK_BUDGET_SECONDS")
                .ok()
                .and_then(|v| v.parse::<u64>().ok())
                .unwrap_or(cfg.wall_clock_budget.as_secs()),
        );
        cfg.sweep_interval = Duration::from_secs(
            std::env::var("PROVISIONER_SWEEP_INTERVAL_SECONDS")
                .ok()
                .and_then(|v| v.parse::<u64>().ok())
                .unwrap_or(cfg.sweep_interval.as_secs()),
        );
        cfg
    }
}

/// Per-sweep summary returned to the trigger endpoint
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct BatchSummary {
    pub successful: usize,
    pub failed: usize,
    pub retries: usize,
    pub skipped: usize,
}

// ---------------------------------------------------------------------------
// Runner
// ---------------------------------------------------------------------------

pub struct BatchProvisioner {
    store: Arc<dyn OrderStore>,
    orchestrator: Arc<ProvisioningOrchestrator>,
    policy: RetryPolicy,
    config: BatchProvisionerConfig,
}

impl BatchProvisioner {
    pub fn new(
        store: Arc<dyn OrderStore>,
        orchestrator: Arc<ProvisioningOrchestrator>,
        config: BatchProvisionerConfig,
    ) -> Self {
        Self {
            store,
            orchestrator,
            policy: RetryPolicy::default(),
            config,
        }
    }

    /// One sweep. Idempotent: every attempt goes through the orchestrator's
    /// CAS claim, so calling this concurrently (or alongside the webhook
    /// path) never double-provisions.
    pub async fn run_batch(&self) -> BatchSummary {
        let mut summary = BatchSummary::default();
        let deadline = Instant::now() + self.config.wall_clock_budget;

        let candidates = match self
            .store
            .find_provision_candidates(self.config.batch_size)
            .await
        {
            Ok(orders) => orders,
            Err(e) => {
                warn!(error = %e, "failed to list provisioning candidates");
                return summary;
            }
        };

        if candidates.is_empty() {
            return summary;
        }
        info!(candidates = candidates.len(), "provisioning sweep started");

        for (index, order) in candidates.iter().enumerate() {
            if Instant::now() >= deadline {
                summary.skipped += candidates.len() - index;
                warn!(
                    remaining = candidates.len() - index,
                    "wall clock budget exhausted, deferring remaining orders"
                );
                break;
            }

            if index > 0 {
                // Upstream APIs rate limit aggressively; pace the batch
                tokio::time::sleep(self.config.inter_order_delay).await;
            }

            // A previous failure that is not retryable stays failed
            if let Some(error) = &order.provisioning_error {
                if !self.policy.is_retryable_message(error) {
                    summary.skipped += 1;
                    continue;
                }
            }

            self.process_order(order, deadline, &mut summary).await;
        }

        info!(
            successful = summary.successful,
            failed = summary.failed,
            retries = summary.retries,
            skipped = summary.skipped,
            "provisioning sweep finished"
        );
        summary
    }

    async fn process_order(&self, order: &Order, deadline: Instant, summary: &mut BatchSummary) {
        let mut last_error: Option<String> = None;

        for attempt in 1..=self.config.max_retries {
            // failed -> pending so the claim can be re-acquired
            if attempt > 1 || order.provisioning_state() == ProvisioningStatus::Failed {
                if let Err(e) = self.store.reset_for_retry(order.id).await {
                    warn!(order_id = %order.id, error = %e, "retry reset failed");
                    summary.failed += 1;
                    return;
                }
            }

            match self.orchestrator.provision_order(order.id).await {
                ProvisionAttemptOutcome::Provisioned
                | ProvisionAttemptOutcome::AwaitingBackend
                | ProvisionAttemptOutcome::ManualFulfillment => {
                    summary.successful += 1;
                    return;
                }
                ProvisionAttemptOutcome::Skipped => {
                    // Lost the claim to a concurrent invocation; that
                    // invocation owns the order now
                    summary.skipped += 1;
                    return;
                }
                ProvisionAttemptOutcome::Failed(message) => {
                    if !self.policy.is_retryable_message(&message) {
                        // Non-retryable: exactly one attempt, already
                        // recorded as failed by the orchestrator
                        info!(
                            order_id = %order.id,
                            error = %message,
                            "non-retryable provisioning error"
                        );
                        summary.failed += 1;
                        return;
                    }

                    last_error = Some(message);
                    if attempt < self.config.max_retries && Instant::now() < deadline {
                        summary.retries += 1;
                        tokio::time::sleep(self.config.retry_delay).await;
                    }
                }
            }
        }

        // Retries exhausted: flag for an operator, original error verbatim
        let message = format!(
            "{} {}",
            MANUAL_REVIEW_PREFIX,
            last_error.unwrap_or_else(|| "provisioning failed".to_string())
        );
        if let Err(e) = self.store.record_provision_failure(order.id, &message).await {
            warn!(order_id = %order.id, error = %e, "failed to flag order for manual review");
        }
        summary.failed += 1;
    }
}

// ---------------------------------------------------------------------------
// Background worker
// ---------------------------------------------------------------------------

pub struct BatchProvisionerWorker {
    runner: Arc<BatchProvisioner>,
    interval: Duration,
}

impl BatchProvisionerWorker {
    pub fn new(runner: Arc<BatchProvisioner>, interval: Duration) -> Self {
        Self { runner, interval }
    }

    pub async fn run(self, mut shutdown_rx: watch::Receiver<bool>) {
        info!(
            interval_secs = self.interval.as_secs(),
            "batch provisioner worker started"
        );

        loop {
            tokio::select! {
                _ = shutdown_rx.changed() => {
                    if *shutdown_rx.borrow() {
                        info!("batch provisioner worker stopping");
                        break;
                    }
                }
                _ = tokio::time::sleep(self.interval) => {
                    let _ = self.runner.run_batch().await;
                }
            }
        }

        info!("batch provisioner worker stopped");
    }
}
