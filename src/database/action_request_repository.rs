//! Server action request store
//!
//! Queue of control-panel actions for orders whose provider has no direct
//! API. Requests are processed asynchronously by a human operator; a partial
//! unique index on (order_id, action) WHERE status = 'pending' enforces the
//! no-duplicate-pending rule at the database level.

use crate::database::error::DatabaseError;
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use sqlx::types::Json;
use sqlx::{FromRow, PgPool};
use std::str::FromStr;
use uuid::Uuid;

/// Control action a customer can request for a manually-managed server
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ServerAction {
    Start,
    Stop,
    Restart,
    Format,
    ChangePassword,
    Reinstall,
}

impl ServerAction {
    pub fn as_str(&self) -> &'static str {
        match self {
            ServerAction::Start => "start",
            ServerAction::Stop => "stop",
            ServerAction::Restart => "restart",
            ServerAction::Format => "format",
            ServerAction::ChangePassword => "changepassword",
            ServerAction::Reinstall => "reinstall",
        }
    }
}

impl FromStr for ServerAction {
    type Err = String;

    fn from_str(value: &str) -> Result<Self, Self::Err> {
        match value.trim().to_lowercase().as_str() {
            "start" => Ok(ServerAction::Start),
            "stop" => Ok(ServerAction::Stop),
            "restart" | "reboot" => Ok(ServerAction::Restart),
            "format" => Ok(ServerAction::Format),
            "changepassword" | "change_password" => Ok(ServerAction::ChangePassword),
            "reinstall" => Ok(ServerAction::Reinstall),
            other => Err(format!("unknown server action: {}", other)),
        }
    }
}

/// Request lifecycle; terminal once an admin decides
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ActionRequestStatus {
    Pending,
    Approved,
    Rejected,
}

impl ActionRequestStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            ActionRequestStatus::Pending => "pending",
            ActionRequestStatus::Approved => "approved",
            ActionRequestStatus::Rejected => "rejected",
        }
    }
}

/// Order details captured at request time so the operator sees what the
/// customer saw, even if the order changes afterwards.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct OrderSnapshot {
    pub product_name: String,
    pub ip_address: Option<String>,
    pub os: Option<String>,
    pub customer: String,
}

/// Server action request entity
#[derive(Debug, Clone, FromRow)]
pub struct ServerActionRequest {
    pub id: Uuid,
    pub order_id: Uuid,
    pub user_id: Uuid,
    pub action: String,
    pub status: String,
    pub payload: serde_json::Value,
    pub snapshot: Json<OrderSnapshot>,
    pub requested_at: DateTime<Utc>,
    pub processed_at: Option<DateTime<Utc>>,
}

/// Fields supplied on submission
#[derive(Debug, Clone)]
pub struct NewActionRequest {
    pub order_id: Uuid,
    pub user_id: Uuid,
    pub action: ServerAction,
    pub payload: serde_json::Value,
    pub snapshot: OrderSnapshot,
}

#[async_trait]
pub trait ActionRequestStore: Send + Sync {
    /// Inserts a pending request; fails with a unique violation when a
    /// pending request for the same (order_id, action) already exists.
    async fn insert(&self, request: NewActionRequest)
        -> Result<ServerActionRequest, DatabaseError>;

    async fn find_by_id(&self, id: Uuid) -> Result<Option<ServerActionRequest>, DatabaseError>;

    /// The most recent pending request for an order, if any
    async fn latest_pending(
        &self,
        order_id: Uuid,
    ) -> Result<Option<ServerActionRequest>, DatabaseError>;

    async fn list_pending(&self, limit: i64) -> Result<Vec<ServerActionRequest>, DatabaseError>;

    /// Approve or reject a pending request; a request that was already
    /// decided is left untouched and reported as not found.
    async fn decide(
        &self,
        id: Uuid,
        approve: bool,
    ) -> Result<Option<ServerActionRequest>, DatabaseError>;
}

const REQUEST_COLUMNS: &str =
    "id, order_id, user_id, action, status, payload, snapshot, requested_at, processed_at";

/// Postgres-backed action request store
pub struct PgActionRequestRepository {
    pool: PgPool,
}

impl PgActionRequestRepository {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }
}

#[async_trait]
impl ActionRequestStore for PgActionRequestRepository {
    async fn insert(
        &self,
        request: NewActionRequest,
    ) -> Result<ServerActionRequest, DatabaseError> {
        sqlx::query_as::<_, ServerActionRequest>(&format!(
            "INSERT INTO server_action_requests \
             (order_id, user_id, action, status, payload, snapshot) \
             VALUES ($1, $2, $3, 'pending', $4, $5) \
             RETURNING {}",
            REQUEST_COLUMNS
        ))
        .bind(request.order_id)
        .bind(request.user_id)
        .bind(request.action.as_str())
        .bind(&request.payload)
        .bind(Json(&request.snapshot))
        .fetch_one(&self.pool)
        .await
        .map_err(DatabaseError::from_sqlx)
    }

    async fn find_by_id(&self, id: Uuid) -> Result<Option<ServerActionRequest>, DatabaseError> {
        sqlx::query_as::<_, ServerActionRequest>(&format!(
            "SELECT {} FROM server_action_requests WHERE id = $1",
            REQUEST_COLUMNS
        ))
        .bind(id)
        .fetch_optional(&self.pool)
        .await
        .map_err(DatabaseError::from_sqlx)
    }

    async fn latest_pending(
        &self,
        order_id: Uuid,
    ) -> Result<Option<ServerActionRequest>, DatabaseError> {
        sqlx::query_as::<_, ServerActionRequest>(&format!(
            "SELECT {} FROM server_action_requests \
             WHERE order_id = $1 AND status = 'pending' \
             ORDER BY requested_at DESC \
             LIMIT 1",
            REQUEST_COLUMNS
        ))
        .bind(order_id)
        .fetch_optional(&self.pool)
        .await
        .map_err(DatabaseError::from_sqlx)
    }

    async fn list_pending(&self, limit: i64) -> Result<Vec<ServerActionRequest>, DatabaseError> {
        sqlx::query_as::<_, ServerActionRequest>(&format!(
            "SELECT {} FROM server_action_requests \
             WHERE status = 'pending' \
             ORDER BY requested_at ASC \
             LIMIT $1",
            REQUEST_COLUMNS
        ))
        .bind(limit)
        .fetch_all(&self.pool)
        .await
        .map_err(DatabaseError::from_sqlx)
    }

    async fn decide(
        &self,
        id: Uuid,
        approve: bool,
    ) -> Result<Option<ServerActionRequest>, DatabaseError> {
        sqlx::query_as::<_, ServerActionRequest>(&format!(
            "UPDATE server_action_requests \
             SET status = $2, processed_at = NOW() \
             WHERE id = $1 AND status = 'pending' \
             RETURNING {}",
            REQUEST_COLUMNS
        ))
        .bind(id)
        .bind(if approve { "approved" } else { "rejected" })
        .fetch_optional(&self.pool)
        .await
        .map_err(DatabaseError::from_sqlx)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn server_action_parses_aliases() {
        assert_eq!(ServerAction::from_str("reboot"), Ok(ServerAction::Restart));
        assert_eq!(
            ServerAction::from_str("change_password"),
            Ok(ServerAction::ChangePassword)
        );
        assert!(ServerAction::from_str("migrate").is_err());
    }

    #[test]
    fn action_strings_are_stable() {
        assert_eq!(ServerAction::ChangePassword.as_str(), "changepassword");
        assert_eq!(ActionRequestStatus::Rejected.as_str(), "rejected");
    }
}
