//! Order store
//!
//! The `orders` table is the single source of truth for every purchase and
//! its lifecycle. All mutation goes through targeted, field-level updates
//! keyed by order id; there are no read-modify-write transactions, so every
//! update here is designed to be safe under last-write-wins semantics. The
//! only cross-invocation safety mechanisms are the compare-and-swap
//! provisioning claim and the renewal-ledger dedup guard, both implemented at
//! this boundary.

use crate::database::error::DatabaseError;
use async_trait::async_trait;
use bigdecimal::BigDecimal;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use sqlx::types::Json;
use sqlx::{FromRow, PgPool};
use std::str::FromStr;
use uuid::Uuid;

/// Payment status of an order
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum OrderStatus {
    Pending,
    Confirmed,
    Active,
    Failed,
    Terminated,
}

impl OrderStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            OrderStatus::Pending => "pending",
            OrderStatus::Confirmed => "confirmed",
            OrderStatus::Active => "active",
            OrderStatus::Failed => "failed",
            OrderStatus::Terminated => "terminated",
        }
    }
}

impl FromStr for OrderStatus {
    type Err = String;

    fn from_str(value: &str) -> Result<Self, Self::Err> {
        match value {
            "pending" => Ok(OrderStatus::Pending),
            "confirmed" => Ok(OrderStatus::Confirmed),
            "active" => Ok(OrderStatus::Active),
            "failed" => Ok(OrderStatus::Failed),
            "terminated" => Ok(OrderStatus::Terminated),
            other => Err(format!("unknown order status: {}", other)),
        }
    }
}

/// Provisioning lifecycle state of an order
///
/// Legal transitions: unset -> pending -> provisioning -> {active | failed};
/// active -> suspended/terminated via explicit actions; failed -> pending on
/// retry reset. `active` may be re-observed by status sync with no transition
/// implied.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ProvisioningStatus {
    Unset,
    Pending,
    Provisioning,
    Active,
    Failed,
    Suspended,
    Terminated,
}

impl ProvisioningStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            ProvisioningStatus::Unset => "unset",
            ProvisioningStatus::Pending => "pending",
            ProvisioningStatus::Provisioning => "provisioning",
            ProvisioningStatus::Active => "active",
            ProvisioningStatus::Failed => "failed",
            ProvisioningStatus::Suspended => "suspended",
            ProvisioningStatus::Terminated => "terminated",
        }
    }
}

impl FromStr for ProvisioningStatus {
    type Err = String;

    fn from_str(value: &str) -> Result<Self, Self::Err> {
        match value {
            "unset" | "" => Ok(ProvisioningStatus::Unset),
            "pending" => Ok(ProvisioningStatus::Pending),
            "provisioning" => Ok(ProvisioningStatus::Provisioning),
            "active" => Ok(ProvisioningStatus::Active),
            "failed" => Ok(ProvisioningStatus::Failed),
            "suspended" => Ok(ProvisioningStatus::Suspended),
            "terminated" => Ok(ProvisioningStatus::Terminated),
            other => Err(format!("unknown provisioning status: {}", other)),
        }
    }
}

/// Transient record of a renewal payment that has been initiated but not yet
/// confirmed. At most one per order; cleared on completion or stale cleanup.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct PendingRenewal {
    pub renewal_txn_id: String,
    pub gateway: String,
    pub amount: BigDecimal,
    pub initiated_at: DateTime<Utc>,
}

/// One immutable entry in the order's renewal-payment ledger
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct RenewalPayment {
    pub payment_id: String,
    pub amount: BigDecimal,
    pub previous_expiry: Option<DateTime<Utc>>,
    pub new_expiry: DateTime<Utc>,
    pub renewal_txn_id: String,
    pub provider: Option<String>,
    pub provider_renewal_success: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub recovered_at: Option<DateTime<Utc>>,
}

/// Credentials and identity returned by a successful provision call
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ProvisionedServer {
    pub service_id: String,
    pub ip_address: String,
    pub username: String,
    pub password: String,
    pub os: String,
}

/// Order entity
#[derive(Debug, Clone, FromRow)]
pub struct Order {
    pub id: Uuid,
    pub user_id: Uuid,
    pub reseller_id: Option<Uuid>,
    pub product_name: String,
    pub memory_mb: i32,
    pub price: BigDecimal,
    pub promo_code: Option<String>,
    pub client_txn_id: String,
    pub gateway_order_id: Option<String>,
    pub gateway: Option<String>,
    pub payment_txn_id: Option<String>,
    pub status: String,
    pub provider: Option<String>,
    pub provider_service_id: Option<String>,
    pub ip_address: Option<String>,
    pub username: Option<String>,
    pub password: Option<String>,
    pub os: Option<String>,
    pub provisioning_status: String,
    pub provisioning_error: Option<String>,
    pub auto_provisioned: bool,
    pub expiry_date: Option<DateTime<Utc>>,
    pub pending_renewal: Option<Json<PendingRenewal>>,
    pub renewal_payments: Json<Vec<RenewalPayment>>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl Order {
    pub fn payment_state(&self) -> OrderStatus {
        OrderStatus::from_str(&self.status).unwrap_or(OrderStatus::Pending)
    }

    pub fn provisioning_state(&self) -> ProvisioningStatus {
        ProvisioningStatus::from_str(&self.provisioning_status).unwrap_or(ProvisioningStatus::Unset)
    }

    /// True when ip/username/password are all present and non-empty
    pub fn has_credentials(&self) -> bool {
        let filled = |v: &Option<String>| v.as_deref().map(|s| !s.trim().is_empty()).unwrap_or(false);
        filled(&self.ip_address) && filled(&self.username) && filled(&self.password)
    }

    /// True when the renewal ledger already holds an entry for this txn id
    pub fn has_renewal_entry(&self, renewal_txn_id: &str) -> bool {
        self.renewal_payments
            .0
            .iter()
            .any(|p| p.renewal_txn_id == renewal_txn_id)
    }
}

/// Fields supplied at checkout
#[derive(Debug, Clone)]
pub struct NewOrder {
    pub user_id: Uuid,
    pub reseller_id: Option<Uuid>,
    pub product_name: String,
    pub memory_mb: i32,
    pub price: BigDecimal,
    pub promo_code: Option<String>,
    pub client_txn_id: String,
    pub provider: Option<String>,
}

/// Result of an `apply_renewal` call
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RenewalApplied {
    Applied,
    /// The ledger already contains an entry with this renewal_txn_id
    Duplicate,
}

/// Durable order store contract
///
/// Implemented by the Postgres repository in production and by an in-memory
/// store in the integration tests.
#[async_trait]
pub trait OrderStore: Send + Sync {
    async fn find_by_id(&self, id: Uuid) -> Result<Option<Order>, DatabaseError>;

    async fn find_by_client_txn(&self, client_txn_id: &str)
        -> Result<Option<Order>, DatabaseError>;

    async fn insert(&self, order: NewOrder) -> Result<Order, DatabaseError>;

    /// Persist which gateway actually created the upstream order, so the
    /// confirmation path later queries the right one.
    async fn record_gateway_order(
        &self,
        id: Uuid,
        gateway: &str,
        gateway_order_id: &str,
    ) -> Result<(), DatabaseError>;

    /// Payment verified: pending -> confirmed, provisioning queue entry
    async fn confirm_payment(&self, id: Uuid, payment_txn_id: &str)
        -> Result<Order, DatabaseError>;

    async fn mark_payment_failed(&self, id: Uuid, reason: &str) -> Result<(), DatabaseError>;

    /// Atomic provisioning claim: flips provisioning_status to
    /// `provisioning` only when the payment is confirmed and the current
    /// value is neither `provisioning` nor `active`. Returns whether this
    /// caller won the claim.
    async fn claim_for_provisioning(&self, id: Uuid) -> Result<bool, DatabaseError>;

    async fn record_provision_success(
        &self,
        id: Uuid,
        provider: &str,
        server: &ProvisionedServer,
        expiry_date: DateTime<Utc>,
    ) -> Result<Order, DatabaseError>;

    /// Backend accepted the build but credentials arrive later; keeps the
    /// order in `provisioning` for status sync to finish.
    async fn record_provision_accepted(
        &self,
        id: Uuid,
        provider: &str,
        service_id: &str,
    ) -> Result<(), DatabaseError>;

    /// Marks the order failed and remembers the error verbatim.
    /// `auto_provisioned` is set so the batch runner can tell a never-tried
    /// order from a previously failed one.
    async fn record_provision_failure(&self, id: Uuid, error: &str) -> Result<(), DatabaseError>;

    /// failed -> pending, clearing the recorded error before a retry
    async fn reset_for_retry(&self, id: Uuid) -> Result<(), DatabaseError>;

    /// Orders eligible for a (re)provisioning sweep: payment confirmed, not
    /// already provisioning/active, and either never auto-provisioned or
    /// previously failed.
    async fn find_provision_candidates(&self, limit: i64) -> Result<Vec<Order>, DatabaseError>;

    async fn set_pending_renewal(
        &self,
        id: Uuid,
        pending: &PendingRenewal,
    ) -> Result<(), DatabaseError>;

    /// Clears pending_renewal only if it still carries the given txn id
    async fn clear_pending_renewal(
        &self,
        id: Uuid,
        renewal_txn_id: &str,
    ) -> Result<(), DatabaseError>;

    /// Appends one ledger entry and moves expiry_date forward, guarded
    /// against duplicate renewal_txn_id values in a single statement.
    async fn apply_renewal(
        &self,
        id: Uuid,
        entry: &RenewalPayment,
        new_expiry: DateTime<Utc>,
    ) -> Result<RenewalApplied, DatabaseError>;

    /// Records the provider renew() outcome on the ledger entry for the
    /// given txn id. Never touches expiry_date.
    async fn set_renewal_provider_result(
        &self,
        id: Uuid,
        renewal_txn_id: &str,
        success: bool,
    ) -> Result<(), DatabaseError>;

    async fn find_with_pending_renewal(&self) -> Result<Vec<Order>, DatabaseError>;

    /// Order whose live pending_renewal carries this renewal txn id
    async fn find_by_renewal_txn(
        &self,
        renewal_txn_id: &str,
    ) -> Result<Option<Order>, DatabaseError>;

    /// Orders holding a provider service id but still lacking credentials;
    /// these are polled by status sync until the backend surfaces them.
    async fn find_awaiting_status_sync(&self, limit: i64) -> Result<Vec<Order>, DatabaseError>;

    async fn record_synced_credentials(
        &self,
        id: Uuid,
        ip_address: &str,
        username: Option<&str>,
        password: Option<&str>,
    ) -> Result<(), DatabaseError>;

    async fn update_provisioning_status(
        &self,
        id: Uuid,
        status: ProvisioningStatus,
    ) -> Result<(), DatabaseError>;

    /// Purges orders that never saw a payment and have been pending since
    /// before the cutoff. Orders with status `failed` are never deleted.
    async fn delete_abandoned_unpaid(
        &self,
        older_than: DateTime<Utc>,
    ) -> Result<u64, DatabaseError>;
}

const ORDER_COLUMNS: &str = "id, user_id, reseller_id, product_name, memory_mb, price, promo_code, \
     client_txn_id, gateway_order_id, gateway, payment_txn_id, status, provider, \
     provider_service_id, ip_address, username, password, os, provisioning_status, \
     provisioning_error, auto_provisioned, expiry_date, pending_renewal, renewal_payments, \
     created_at, updated_at";

/// Postgres-backed order store
pub struct PgOrderRepository {
    pool: PgPool,
}

impl PgOrderRepository {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }
}

#[async_trait]
impl OrderStore for PgOrderRepository {
    async fn find_by_id(&self, id: Uuid) -> Result<Option<Order>, DatabaseError> {
        sqlx::query_as::<_, Order>(&format!(
            "SELECT {} FROM orders WHERE id = $1",
            ORDER_COLUMNS
        ))
        .bind(id)
        .fetch_optional(&self.pool)
        .await
        .map_err(DatabaseError::from_sqlx)
    }

    async fn find_by_client_txn(
        &self,
        client_txn_id: &str,
    ) -> Result<Option<Order>, DatabaseError> {
        sqlx::query_as::<_, Order>(&format!(
            "SELECT {} FROM orders WHERE client_txn_id = $1",
            ORDER_COLUMNS
        ))
        .bind(client_txn_id)
        .fetch_optional(&self.pool)
        .await
        .map_err(DatabaseError::from_sqlx)
    }

    async fn insert(&self, order: NewOrder) -> Result<Order, DatabaseError> {
        sqlx::query_as::<_, Order>(&format!(
            "INSERT INTO orders \
             (user_id, reseller_id, product_name, memory_mb, price, promo_code, client_txn_id, \
              provider, status, provisioning_status, auto_provisioned, renewal_payments) \
             VALUES ($1, $2, $3, $4, $5, $6, $7, $8, 'pending', 'unset', FALSE, '[]'::jsonb) \
             RETURNING {}",
            ORDER_COLUMNS
        ))
        .bind(order.user_id)
        .bind(order.reseller_id)
        .bind(&order.product_name)
        .bind(order.memory_mb)
        .bind(&order.price)
        .bind(&order.promo_code)
        .bind(&order.client_txn_id)
        .bind(&order.provider)
        .fetch_one(&self.pool)
        .await
        .map_err(DatabaseError::from_sqlx)
    }

    async fn record_gateway_order(
        &self,
        id: Uuid,
        gateway: &str,
        gateway_order_id: &str,
    ) -> Result<(), DatabaseError> {
        sqlx::query(
            "UPDATE orders SET gateway = $2, gateway_order_id = $3, updated_at = NOW() \
             WHERE id = $1",
        )
        .bind(id)
        .bind(gateway)
        .bind(gateway_order_id)
        .execute(&self.pool)
        .await
        .map_err(DatabaseError::from_sqlx)?;
        Ok(())
    }

    async fn confirm_payment(
        &self,
        id: Uuid,
        payment_txn_id: &str,
    ) -> Result<Order, DatabaseError> {
        sqlx::query_as::<_, Order>(&format!(
            "UPDATE orders \
             SET status = 'confirmed', payment_txn_id = $2, \
                 provisioning_status = CASE WHEN provisioning_status = 'unset' \
                                            THEN 'pending' ELSE provisioning_status END, \
                 updated_at = NOW() \
             WHERE id = $1 \
             RETURNING {}",
            ORDER_COLUMNS
        ))
        .bind(id)
        .bind(payment_txn_id)
        .fetch_one(&self.pool)
        .await
        .map_err(DatabaseError::from_sqlx)
    }

    async fn mark_payment_failed(&self, id: Uuid, reason: &str) -> Result<(), DatabaseError> {
        sqlx::query(
            "UPDATE orders SET status = 'failed', provisioning_error = $2, updated_at = NOW() \
             WHERE id = $1",
        )
        .bind(id)
        .bind(reason)
        .execute(&self.pool)
        .await
        .map_err(DatabaseError::from_sqlx)?;
        Ok(())
    }

    async fn claim_for_provisioning(&self, id: Uuid) -> Result<bool, DatabaseError> {
        let result = sqlx::query(
            "UPDATE orders SET provisioning_status = 'provisioning', updated_at = NOW() \
             WHERE id = $1 \
               AND status = 'confirmed' \
               AND provisioning_status NOT IN ('provisioning', 'active')",
        )
        .bind(id)
        .execute(&self.pool)
        .await
        .map_err(DatabaseError::from_sqlx)?;

        Ok(result.rows_affected() > 0)
    }

    async fn record_provision_success(
        &self,
        id: Uuid,
        provider: &str,
        server: &ProvisionedServer,
        expiry_date: DateTime<Utc>,
    ) -> Result<Order, DatabaseError> {
        sqlx::query_as::<_, Order>(&format!(
            "UPDATE orders \
             SET provider = $2, provider_service_id = $3, ip_address = $4, username = $5, \
                 password = $6, os = $7, provisioning_status = 'active', status = 'active', \
                 provisioning_error = NULL, auto_provisioned = TRUE, expiry_date = $8, \
                 updated_at = NOW() \
             WHERE id = $1 \
             RETURNING {}",
            ORDER_COLUMNS
        ))
        .bind(id)
        .bind(provider)
        .bind(&server.service_id)
        .bind(&server.ip_address)
        .bind(&server.username)
        .bind(&server.password)
        .bind(&server.os)
        .bind(expiry_date)
        .fetch_one(&self.pool)
        .await
        .map_err(DatabaseError::from_sqlx)
    }

    async fn record_provision_accepted(
        &self,
        id: Uuid,
        provider: &str,
        service_id: &str,
    ) -> Result<(), DatabaseError> {
        sqlx::query(
            "UPDATE orders \
             SET provider = $2, provider_service_id = $3, provisioning_status = 'provisioning', \
                 provisioning_error = NULL, auto_provisioned = TRUE, updated_at = NOW() \
             WHERE id = $1",
        )
        .bind(id)
        .bind(provider)
        .bind(service_id)
        .execute(&self.pool)
        .await
        .map_err(DatabaseError::from_sqlx)?;
        Ok(())
    }

    async fn record_provision_failure(&self, id: Uuid, error: &str) -> Result<(), DatabaseError> {
        sqlx::query(
            "UPDATE orders \
             SET provisioning_status = 'failed', provisioning_error = $2, \
                 auto_provisioned = TRUE, updated_at = NOW() \
             WHERE id = $1",
        )
        .bind(id)
        .bind(error)
        .execute(&self.pool)
        .await
        .map_err(DatabaseError::from_sqlx)?;
        Ok(())
    }

    async fn reset_for_retry(&self, id: Uuid) -> Result<(), DatabaseError> {
        sqlx::query(
            "UPDATE orders \
             SET provisioning_status = 'pending', provisioning_error = NULL, updated_at = NOW() \
             WHERE id = $1 AND provisioning_status = 'failed'",
        )
        .bind(id)
        .execute(&self.pool)
        .await
        .map_err(DatabaseError::from_sqlx)?;
        Ok(())
    }

    async fn find_provision_candidates(&self, limit: i64) -> Result<Vec<Order>, DatabaseError> {
        sqlx::query_as::<_, Order>(&format!(
            "SELECT {} FROM orders \
             WHERE status = 'confirmed' \
               AND provisioning_status NOT IN ('provisioning', 'active', 'suspended', 'terminated') \
               AND (auto_provisioned = FALSE OR provisioning_status = 'failed') \
             ORDER BY created_at ASC \
             LIMIT $1",
            ORDER_COLUMNS
        ))
        .bind(limit)
        .fetch_all(&self.pool)
        .await
        .map_err(DatabaseError::from_sqlx)
    }

    async fn set_pending_renewal(
        &self,
        id: Uuid,
        pending: &PendingRenewal,
    ) -> Result<(), DatabaseError> {
        sqlx::query("UPDATE orders SET pending_renewal = $2, updated_at = NOW() WHERE id = $1")
            .bind(id)
            .bind(Json(pending))
            .execute(&self.pool)
            .await
            .map_err(DatabaseError::from_sqlx)?;
        Ok(())
    }

    async fn clear_pending_renewal(
        &self,
        id: Uuid,
        renewal_txn_id: &str,
    ) -> Result<(), DatabaseError> {
        sqlx::query(
            "UPDATE orders SET pending_renewal = NULL, updated_at = NOW() \
             WHERE id = $1 AND pending_renewal ->> 'renewal_txn_id' = $2",
        )
        .bind(id)
        .bind(renewal_txn_id)
        .execute(&self.pool)
        .await
        .map_err(DatabaseError::from_sqlx)?;
        Ok(())
    }

    async fn apply_renewal(
        &self,
        id: Uuid,
        entry: &RenewalPayment,
        new_expiry: DateTime<Utc>,
    ) -> Result<RenewalApplied, DatabaseError> {
        // Append + extend in one statement, refused when the ledger already
        // holds this renewal_txn_id. That guard is what makes webhook
        // delivery and gateway polling safe to race.
        let result = sqlx::query(
            "UPDATE orders \
             SET renewal_payments = renewal_payments || $2::jsonb, \
                 expiry_date = $3, updated_at = NOW() \
             WHERE id = $1 \
               AND NOT EXISTS ( \
                   SELECT 1 FROM jsonb_array_elements(orders.renewal_payments) elem \
                   WHERE elem ->> 'renewal_txn_id' = $4)",
        )
        .bind(id)
        .bind(Json(entry))
        .bind(new_expiry)
        .bind(&entry.renewal_txn_id)
        .execute(&self.pool)
        .await
        .map_err(DatabaseError::from_sqlx)?;

        if result.rows_affected() > 0 {
            Ok(RenewalApplied::Applied)
        } else {
            Ok(RenewalApplied::Duplicate)
        }
    }

    async fn set_renewal_provider_result(
        &self,
        id: Uuid,
        renewal_txn_id: &str,
        success: bool,
    ) -> Result<(), DatabaseError> {
        sqlx::query(
            "UPDATE orders \
             SET renewal_payments = ( \
                 SELECT COALESCE(jsonb_agg( \
                     CASE WHEN elem ->> 'renewal_txn_id' = $2 \
                          THEN jsonb_set(elem, '{provider_renewal_success}', to_jsonb($3::boolean)) \
                          ELSE elem END), '[]'::jsonb) \
                 FROM jsonb_array_elements(orders.renewal_payments) elem), \
                 updated_at = NOW() \
             WHERE id = $1",
        )
        .bind(id)
        .bind(renewal_txn_id)
        .bind(success)
        .execute(&self.pool)
        .await
        .map_err(DatabaseError::from_sqlx)?;
        Ok(())
    }

    async fn find_with_pending_renewal(&self) -> Result<Vec<Order>, DatabaseError> {
        sqlx::query_as::<_, Order>(&format!(
            "SELECT {} FROM orders WHERE pending_renewal IS NOT NULL ORDER BY created_at ASC",
            ORDER_COLUMNS
        ))
        .fetch_all(&self.pool)
        .await
        .map_err(DatabaseError::from_sqlx)
    }

    async fn find_by_renewal_txn(
        &self,
        renewal_txn_id: &str,
    ) -> Result<Option<Order>, DatabaseError> {
        sqlx::query_as::<_, Order>(&format!(
            "SELECT {} FROM orders WHERE pending_renewal ->> 'renewal_txn_id' = $1",
            ORDER_COLUMNS
        ))
        .bind(renewal_txn_id)
        .fetch_optional(&self.pool)
        .await
        .map_err(DatabaseError::from_sqlx)
    }

    async fn find_awaiting_status_sync(&self, limit: i64) -> Result<Vec<Order>, DatabaseError> {
        sqlx::query_as::<_, Order>(&format!(
            "SELECT {} FROM orders \
             WHERE provider_service_id IS NOT NULL \
               AND provisioning_status IN ('pending', 'provisioning') \
               AND (ip_address IS NULL OR username IS NULL OR password IS NULL) \
             ORDER BY created_at ASC \
             LIMIT $1",
            ORDER_COLUMNS
        ))
        .bind(limit)
        .fetch_all(&self.pool)
        .await
        .map_err(DatabaseError::from_sqlx)
    }

    async fn record_synced_credentials(
        &self,
        id: Uuid,
        ip_address: &str,
        username: Option<&str>,
        password: Option<&str>,
    ) -> Result<(), DatabaseError> {
        sqlx::query(
            "UPDATE orders \
             SET ip_address = $2, \
                 username = COALESCE($3, username), \
                 password = COALESCE($4, password), \
                 provisioning_status = 'active', status = 'active', \
                 provisioning_error = NULL, updated_at = NOW() \
             WHERE id = $1",
        )
        .bind(id)
        .bind(ip_address)
        .bind(username)
        .bind(password)
        .execute(&self.pool)
        .await
        .map_err(DatabaseError::from_sqlx)?;
        Ok(())
    }

    async fn update_provisioning_status(
        &self,
        id: Uuid,
        status: ProvisioningStatus,
    ) -> Result<(), DatabaseError> {
        sqlx::query("UPDATE orders SET provisioning_status = $2, updated_at = NOW() WHERE id = $1")
            .bind(id)
            .bind(status.as_str())
            .execute(&self.pool)
            .await
            .map_err(DatabaseError::from_sqlx)?;
        Ok(())
    }

    async fn delete_abandoned_unpaid(
        &self,
        older_than: DateTime<Utc>,
    ) -> Result<u64, DatabaseError> {
        let result = sqlx::query(
            "DELETE FROM orders \
             WHERE status = 'pending' AND payment_txn_id IS NULL AND created_at < $1",
        )
        .bind(older_than)
        .execute(&self.pool)
        .await
        .map_err(DatabaseError::from_sqlx)?;

        Ok(result.rows_affected())
    }
}
