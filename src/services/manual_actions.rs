//! Manual action queue
//!
//! Human-in-the-loop control path for orders whose provider has no direct
//! API. Auto-provisioned orders are rejected here; their actions execute
//! immediately through the adapter (see `server_control`). At most one
//! pending request per (order, action) pair; the store enforces the same
//! rule with a partial unique index, so a racing duplicate surfaces as a
//! unique violation and is mapped to the same domain error.

use crate::database::action_request_repository::{
    ActionRequestStore, NewActionRequest, OrderSnapshot, ServerAction, ServerActionRequest,
};
use crate::database::order_repository::OrderStore;
use crate::error::{AppError, AppErrorKind, DomainError};
use crate::services::notification::{NotificationEvent, Notifier};
use std::sync::Arc;
use tracing::info;
use uuid::Uuid;

pub struct ManualActionService {
    orders: Arc<dyn OrderStore>,
    requests: Arc<dyn ActionRequestStore>,
    notifier: Arc<dyn Notifier>,
}

impl ManualActionService {
    pub fn new(
        orders: Arc<dyn OrderStore>,
        requests: Arc<dyn ActionRequestStore>,
        notifier: Arc<dyn Notifier>,
    ) -> Self {
        Self {
            orders,
            requests,
            notifier,
        }
    }

    pub async fn submit(
        &self,
        order_id: Uuid,
        user_id: Uuid,
        action: ServerAction,
        payload: serde_json::Value,
    ) -> Result<ServerActionRequest, AppError> {
        let order = self.orders.find_by_id(order_id).await?.ok_or_else(|| {
            AppError::new(AppErrorKind::Domain(DomainError::OrderNotFound {
                order_id: order_id.to_string(),
            }))
        })?;

        if order.auto_provisioned {
            return Err(AppError::new(AppErrorKind::Domain(
                DomainError::ActionNotPermitted {
                    order_id: order_id.to_string(),
                    reason: "order is provider-managed; use the direct control actions"
                        .to_string(),
                },
            )));
        }

        if let Some(existing) = self.requests.latest_pending(order_id).await? {
            if existing.action == action.as_str() {
                return Err(AppError::new(AppErrorKind::Domain(
                    DomainError::DuplicateActionRequest {
                        order_id: order_id.to_string(),
                        action: action.as_str().to_string(),
                    },
                )));
            }
        }

        let request = self
            .requests
            .insert(NewActionRequest {
                order_id,
                user_id,
                action,
                payload,
                snapshot: OrderSnapshot {
                    product_name: order.product_name.clone(),
                    ip_address: order.ip_address.clone(),
                    os: order.os.clone(),
                    customer: order.user_id.to_string(),
                },
            })
            .await
            .map_err(|e| {
                if e.is_unique_violation() {
                    AppError::new(AppErrorKind::Domain(DomainError::DuplicateActionRequest {
                        order_id: order_id.to_string(),
                        action: action.as_str().to_string(),
                    }))
                } else {
                    e.into()
                }
            })?;

        info!(
            order_id = %order_id,
            action = action.as_str(),
            request_id = %request.id,
            "manual action request queued"
        );
        self.notifier
            .notify(
                NotificationEvent::ManualActionRequested,
                &order,
                action.as_str(),
            )
            .await;

        Ok(request)
    }

    /// Latest pending request for an order, the only one the customer UI
    /// shows.
    pub async fn latest_pending(
        &self,
        order_id: Uuid,
    ) -> Result<Option<ServerActionRequest>, AppError> {
        Ok(self.requests.latest_pending(order_id).await?)
    }

    pub async fn list_pending(&self, limit: i64) -> Result<Vec<ServerActionRequest>, AppError> {
        Ok(self.requests.list_pending(limit).await?)
    }

    /// Admin decision; terminal. The decision is only recorded; execution
    /// of the action itself is the operator's job.
    pub async fn decide(
        &self,
        request_id: Uuid,
        approve: bool,
    ) -> Result<ServerActionRequest, AppError> {
        let decided = self.requests.decide(request_id, approve).await?;
        decided.ok_or_else(|| {
            AppError::new(AppErrorKind::Domain(DomainError::ActionRequestNotFound {
                request_id: request_id.to_string(),
            }))
        })
    }
}
