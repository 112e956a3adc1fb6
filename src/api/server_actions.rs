//! Manual action queue endpoints

use axum::{
    extract::{Path, State},
    Json,
};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::str::FromStr;
use std::sync::Arc;
use uuid::Uuid;

use crate::database::action_request_repository::{ServerAction, ServerActionRequest};
use crate::error::{AppError, AppErrorKind, ValidationError};
use crate::services::manual_actions::ManualActionService;

pub struct ServerActionsState {
    pub manual_actions: Arc<ManualActionService>,
}

#[derive(Debug, Deserialize)]
pub struct SubmitActionRequest {
    pub order_id: Uuid,
    pub user_id: Uuid,
    pub action: String,
    #[serde(default)]
    pub payload: serde_json::Value,
}

#[derive(Debug, Serialize)]
pub struct ActionRequestView {
    pub id: Uuid,
    pub order_id: Uuid,
    pub action: String,
    pub status: String,
    pub requested_at: DateTime<Utc>,
    pub processed_at: Option<DateTime<Utc>>,
}

impl From<ServerActionRequest> for ActionRequestView {
    fn from(request: ServerActionRequest) -> Self {
        Self {
            id: request.id,
            order_id: request.order_id,
            action: request.action,
            status: request.status,
            requested_at: request.requested_at,
            processed_at: request.processed_at,
        }
    }
}

/// POST /api/server-actions
pub async fn submit_action(
    State(state): State<Arc<ServerActionsState>>,
    Json(body): Json<SubmitActionRequest>,
) -> Result<Json<ActionRequestView>, AppError> {
    let action = ServerAction::from_str(&body.action).map_err(|reason| {
        AppError::new(AppErrorKind::Validation(ValidationError::InvalidField {
            field: "action".to_string(),
            reason,
        }))
    })?;

    let request = state
        .manual_actions
        .submit(body.order_id, body.user_id, action, body.payload)
        .await?;
    Ok(Json(request.into()))
}

/// GET /api/server-actions/{order_id}
///
/// Returns only the latest pending request, which is all the customer UI
/// ever shows.
pub async fn latest_pending_action(
    State(state): State<Arc<ServerActionsState>>,
    Path(order_id): Path<Uuid>,
) -> Result<Json<Option<ActionRequestView>>, AppError> {
    let request = state.manual_actions.latest_pending(order_id).await?;
    Ok(Json(request.map(Into::into)))
}

#[derive(Debug, Deserialize)]
pub struct DecisionRequest {
    pub approve: bool,
}

/// POST /api/server-actions/{id}/decision
pub async fn decide_action(
    State(state): State<Arc<ServerActionsState>>,
    Path(request_id): Path<Uuid>,
    Json(body): Json<DecisionRequest>,
) -> Result<Json<ActionRequestView>, AppError> {
    let decided = state
        .manual_actions
        .decide(request_id, body.approve)
        .await?;
    Ok(Json(decided.into()))
}
