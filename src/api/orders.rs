//! Order endpoints: checkout, purchaser-facing status, renewal initiation
//! and direct server control for provider-managed orders.

use axum::{
    extract::{Path, State},
    Json,
};
use bigdecimal::BigDecimal;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::str::FromStr;
use std::sync::Arc;
use uuid::Uuid;

use crate::database::action_request_repository::ServerAction;
use crate::database::order_repository::{Order, OrderStore, ProvisioningStatus};
use crate::error::{AppError, AppErrorKind, DomainError, ValidationError};
use crate::gateways::types::CustomerContact;
use crate::providers::types::ServerStatus;
use crate::services::payments::{CheckoutOrder, PaymentService};
use crate::services::server_control::ServerControlService;

pub struct OrdersState {
    pub store: Arc<dyn OrderStore>,
    pub payments: Arc<PaymentService>,
    pub server_control: Arc<ServerControlService>,
}

#[derive(Debug, Deserialize)]
pub struct CreateOrderRequest {
    pub user_id: Uuid,
    #[serde(default)]
    pub reseller_id: Option<Uuid>,
    pub product_name: String,
    pub memory_mb: i32,
    pub price: String,
    #[serde(default)]
    pub promo_code: Option<String>,
    pub client_txn_id: String,
    #[serde(default)]
    pub provider: Option<String>,
    #[serde(default)]
    pub customer_email: Option<String>,
    #[serde(default)]
    pub customer_phone: Option<String>,
    #[serde(default)]
    pub return_url: Option<String>,
}

#[derive(Debug, Serialize)]
pub struct CreateOrderResponse {
    pub order_id: Uuid,
    pub gateway: String,
    pub gateway_order_id: String,
    pub payment_url: Option<String>,
}

/// Purchaser-facing order view. Credentials appear only once the order is
/// active; until then the customer sees the provisioning state.
#[derive(Debug, Serialize)]
pub struct OrderView {
    pub id: Uuid,
    pub product_name: String,
    pub status: String,
    pub provisioning_status: String,
    pub ip_address: Option<String>,
    pub username: Option<String>,
    pub password: Option<String>,
    pub os: Option<String>,
    pub expiry_date: Option<DateTime<Utc>>,
}

impl From<Order> for OrderView {
    fn from(order: Order) -> Self {
        let active = order.provisioning_state() == ProvisioningStatus::Active;
        Self {
            id: order.id,
            product_name: order.product_name.clone(),
            status: order.status.clone(),
            provisioning_status: order.provisioning_status.clone(),
            ip_address: active.then(|| order.ip_address.clone()).flatten(),
            username: active.then(|| order.username.clone()).flatten(),
            password: active.then(|| order.password.clone()).flatten(),
            os: order.os.clone(),
            expiry_date: order.expiry_date,
        }
    }
}

/// POST /api/orders
pub async fn create_order(
    State(state): State<Arc<OrdersState>>,
    Json(body): Json<CreateOrderRequest>,
) -> Result<Json<CreateOrderResponse>, AppError> {
    let price = BigDecimal::from_str(&body.price).map_err(|_| {
        AppError::new(AppErrorKind::Validation(ValidationError::InvalidField {
            field: "price".to_string(),
            reason: "not a decimal amount".to_string(),
        }))
    })?;
    if body.client_txn_id.trim().is_empty() {
        return Err(AppError::new(AppErrorKind::Validation(
            ValidationError::MissingField {
                field: "client_txn_id".to_string(),
            },
        )));
    }

    let (order, response) = state
        .payments
        .create_order(CheckoutOrder {
            user_id: body.user_id,
            reseller_id: body.reseller_id,
            product_name: body.product_name,
            memory_mb: body.memory_mb,
            price,
            promo_code: body.promo_code,
            client_txn_id: body.client_txn_id,
            provider: body.provider,
            customer: CustomerContact {
                email: body.customer_email,
                phone: body.customer_phone,
            },
            return_url: body.return_url,
        })
        .await?;

    Ok(Json(CreateOrderResponse {
        order_id: order.id,
        gateway: response.gateway.as_str().to_string(),
        gateway_order_id: response.gateway_order_id,
        payment_url: response.payment_url,
    }))
}

/// GET /api/orders/{id}
pub async fn get_order(
    State(state): State<Arc<OrdersState>>,
    Path(order_id): Path<Uuid>,
) -> Result<Json<OrderView>, AppError> {
    let order = state.store.find_by_id(order_id).await?.ok_or_else(|| {
        AppError::new(AppErrorKind::Domain(DomainError::OrderNotFound {
            order_id: order_id.to_string(),
        }))
    })?;
    Ok(Json(order.into()))
}

#[derive(Debug, Deserialize)]
pub struct RenewOrderRequest {
    #[serde(default)]
    pub customer_email: Option<String>,
    #[serde(default)]
    pub customer_phone: Option<String>,
    #[serde(default)]
    pub return_url: Option<String>,
}

#[derive(Debug, Serialize)]
pub struct RenewOrderResponse {
    pub renewal_txn_id: String,
    pub gateway: String,
    pub gateway_order_id: String,
    pub payment_url: Option<String>,
}

/// POST /api/orders/{id}/renew
pub async fn renew_order(
    State(state): State<Arc<OrdersState>>,
    Path(order_id): Path<Uuid>,
    Json(body): Json<RenewOrderRequest>,
) -> Result<Json<RenewOrderResponse>, AppError> {
    let (pending, response) = state
        .payments
        .initiate_renewal(
            order_id,
            CustomerContact {
                email: body.customer_email,
                phone: body.customer_phone,
            },
            body.return_url,
        )
        .await?;

    Ok(Json(RenewOrderResponse {
        renewal_txn_id: pending.renewal_txn_id,
        gateway: response.gateway.as_str().to_string(),
        gateway_order_id: response.gateway_order_id,
        payment_url: response.payment_url,
    }))
}

#[derive(Debug, Deserialize)]
pub struct DirectActionRequest {
    pub action: String,
    #[serde(default)]
    pub new_password: Option<String>,
}

/// POST /api/orders/{id}/actions
///
/// Direct control for provider-managed orders. Manually-fulfilled orders
/// are refused here and go through the server action queue.
pub async fn perform_direct_action(
    State(state): State<Arc<OrdersState>>,
    Path(order_id): Path<Uuid>,
    Json(body): Json<DirectActionRequest>,
) -> Result<Json<serde_json::Value>, AppError> {
    let action = ServerAction::from_str(&body.action).map_err(|reason| {
        AppError::new(AppErrorKind::Validation(ValidationError::InvalidField {
            field: "action".to_string(),
            reason,
        }))
    })?;

    state
        .server_control
        .perform(order_id, action, body.new_password.as_deref())
        .await?;

    Ok(Json(serde_json::json!({ "status": "ok" })))
}

/// GET /api/orders/{id}/live-status
///
/// Live state straight from the provider, normalized. Bypasses the store.
pub async fn live_status(
    State(state): State<Arc<OrdersState>>,
    Path(order_id): Path<Uuid>,
) -> Result<Json<ServerStatus>, AppError> {
    let status = state.server_control.live_status(order_id).await?;
    Ok(Json(status))
}
