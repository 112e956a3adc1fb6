//! Job trigger endpoints
//!
//! Externally schedulable entry points for the batch provisioner and the
//! renewal recovery/reconciliation jobs. All of them are safe to call
//! repeatedly; the CAS claim and the renewal dedup guard make concurrent
//! invocations converge.

use axum::{extract::State, Json};
use std::sync::Arc;

use crate::services::recovery::{
    PendingRenewalReport, RecoveryService, RecoverySummary, StaleCleanupSummary,
};
use crate::workers::batch_provisioner::{BatchProvisioner, BatchSummary};

pub struct JobsState {
    pub provisioner: Arc<BatchProvisioner>,
    pub recovery: Arc<RecoveryService>,
}

/// POST /jobs/provision-batch
pub async fn run_provision_batch(State(state): State<Arc<JobsState>>) -> Json<BatchSummary> {
    Json(state.provisioner.run_batch().await)
}

/// GET /jobs/pending-renewals
pub async fn pending_renewals_report(
    State(state): State<Arc<JobsState>>,
) -> Json<PendingRenewalReport> {
    Json(state.recovery.pending_renewal_report().await)
}

/// POST /jobs/recover-renewals
pub async fn recover_renewals(State(state): State<Arc<JobsState>>) -> Json<RecoverySummary> {
    Json(state.recovery.recover_pending_renewals().await)
}

/// POST /jobs/clear-stale-renewals
pub async fn clear_stale_renewals(
    State(state): State<Arc<JobsState>>,
) -> Json<StaleCleanupSummary> {
    Json(state.recovery.clear_stale_renewals().await)
}
