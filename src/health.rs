//! Health endpoints
//!
//! `/health` reports component status, `/health/live` is a trivial
//! liveness probe and `/health/ready` gates on the database being
//! reachable.

use axum::{extract::State, http::StatusCode, response::IntoResponse, Json};
use chrono::Utc;
use serde::{Deserialize, Serialize};
use sqlx::PgPool;
use std::sync::Arc;

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct HealthStatus {
    pub healthy: bool,
    pub database: ComponentHealth,
    pub timestamp: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ComponentHealth {
    pub healthy: bool,
    pub detail: Option<String>,
}

#[derive(Clone)]
pub struct HealthChecker {
    pool: PgPool,
}

impl HealthChecker {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }

    pub async fn check(&self) -> HealthStatus {
        let database = match crate::database::health_check(&self.pool).await {
            Ok(()) => ComponentHealth {
                healthy: true,
                detail: None,
            },
            Err(e) => ComponentHealth {
                healthy: false,
                detail: Some(e.to_string()),
            },
        };

        HealthStatus {
            healthy: database.healthy,
            database,
            timestamp: Utc::now().to_rfc3339(),
        }
    }
}

pub struct HealthState {
    pub checker: HealthChecker,
}

/// GET /health
pub async fn health(State(state): State<Arc<HealthState>>) -> impl IntoResponse {
    let status = state.checker.check().await;
    let code = if status.healthy {
        StatusCode::OK
    } else {
        StatusCode::SERVICE_UNAVAILABLE
    };
    (code, Json(status))
}

/// GET /health/live
pub async fn liveness() -> impl IntoResponse {
    Json(serde_json::json!({ "status": "alive" }))
}

/// GET /health/ready
pub async fn readiness(State(state): State<Arc<HealthState>>) -> impl IntoResponse {
    let status = state.checker.check().await;
    if status.healthy {
        (StatusCode::OK, "ready").into_response()
    } else {
        (StatusCode::SERVICE_UNAVAILABLE, "not ready").into_response()
    }
}
