use axum::{
    body::Bytes,
    extract::{Path, State},
    http::StatusCode,
    response::IntoResponse,
    Json,
};
use std::sync::Arc;
use tracing::{error, info, warn};

use crate::services::webhook_processor::{WebhookProcessor, WebhookProcessorError};

pub struct WebhookState {
    pub processor: Arc<WebhookProcessor>,
}

/// POST /webhooks/{gateway}
///
/// The body is passed through as raw bytes: signatures are computed over
/// the exact payload the gateway sent.
pub async fn handle_webhook(
    State(state): State<Arc<WebhookState>>,
    Path(gateway): Path<String>,
    headers: axum::http::HeaderMap,
    body: Bytes,
) -> impl IntoResponse {
    info!(gateway = %gateway, "received webhook");

    let signature = match gateway.as_str() {
        "paylane" => headers
            .get("x-paylane-signature")
            .and_then(|v| v.to_str().ok())
            .map(|s| s.to_string()),
        "zippay" => headers
            .get("x-zippay-signature")
            .and_then(|v| v.to_str().ok())
            .map(|s| s.to_string()),
        // upistack callbacks are unsigned; trust comes from a status fetch
        _ => None,
    };

    match state
        .processor
        .process_callback(&gateway, signature.as_deref(), &body)
        .await
    {
        Ok(_) => {
            info!(gateway = %gateway, "webhook processed");
            (StatusCode::OK, Json(serde_json::json!({"status": "ok"}))).into_response()
        }
        Err(WebhookProcessorError::InvalidSignature) => {
            warn!(gateway = %gateway, "invalid webhook signature");
            (StatusCode::UNAUTHORIZED, "Invalid signature").into_response()
        }
        Err(WebhookProcessorError::UnknownGateway(name)) => {
            warn!(gateway = %name, "webhook for unknown gateway");
            (StatusCode::NOT_FOUND, "Unknown gateway").into_response()
        }
        Err(WebhookProcessorError::MissingReference) => {
            warn!(gateway = %gateway, "webhook payload missing reference");
            (StatusCode::BAD_REQUEST, "Missing reference").into_response()
        }
        Err(e) => {
            // Acknowledge so the gateway stops redelivering; the recovery
            // job reconciles anything that was genuinely missed.
            error!(gateway = %gateway, error = %e, "webhook processing failed");
            (StatusCode::OK, Json(serde_json::json!({"status": "ok"}))).into_response()
        }
    }
}
