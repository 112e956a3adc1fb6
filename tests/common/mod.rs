//! Shared test fixtures: an in-memory order store with the same semantics
//! as the Postgres repository (CAS claim, renewal dedup guard), plus
//! scripted provider and gateway doubles.

#![allow(dead_code)]

use async_trait::async_trait;
use bigdecimal::BigDecimal;
use chrono::{DateTime, Utc};
use nimbus_backend::database::action_request_repository::{
    ActionRequestStore, NewActionRequest, ServerActionRequest,
};
use nimbus_backend::database::error::{DatabaseError, DatabaseErrorKind};
use nimbus_backend::database::order_repository::{
    NewOrder, Order, OrderStore, PendingRenewal, ProvisionedServer, ProvisioningStatus,
    RenewalApplied, RenewalPayment,
};
use nimbus_backend::gateways::error::{GatewayError, GatewayResult};
use nimbus_backend::gateways::gateway::PaymentGateway;
use nimbus_backend::gateways::types::{
    CheckoutRequest, CheckoutResponse, GatewayName, PaymentState, StatusRequest, StatusResponse,
    WebhookEvent, WebhookVerificationResult,
};
use nimbus_backend::providers::adapter::HostingProvider;
use nimbus_backend::providers::error::{ProviderError, ProviderResult};
use nimbus_backend::providers::types::{
    ProviderKind, ProvisionOutcome, ProvisionRequest, ServerStatus,
};
use sqlx::types::Json;
use std::collections::{HashMap, VecDeque};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Mutex;
use std::time::Duration;
use uuid::Uuid;

// ---------------------------------------------------------------------------
// In-memory order store
// ---------------------------------------------------------------------------

#[derive(Default)]
pub struct InMemoryOrderStore {
    orders: Mutex<HashMap<Uuid, Order>>,
}

impl InMemoryOrderStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn put(&self, order: Order) {
        self.orders.lock().unwrap().insert(order.id, order);
    }

    pub fn get(&self, id: Uuid) -> Option<Order> {
        self.orders.lock().unwrap().get(&id).cloned()
    }
}

#[async_trait]
impl OrderStore for InMemoryOrderStore {
    async fn find_by_id(&self, id: Uuid) -> Result<Option<Order>, DatabaseError> {
        Ok(self.get(id))
    }

    async fn find_by_client_txn(
        &self,
        client_txn_id: &str,
    ) -> Result<Option<Order>, DatabaseError> {
        Ok(self
            .orders
            .lock()
            .unwrap()
            .values()
            .find(|o| o.client_txn_id == client_txn_id)
            .cloned())
    }

    async fn insert(&self, new_order: NewOrder) -> Result<Order, DatabaseError> {
        let order = make_order_from_new(new_order);
        self.put(order.clone());
        Ok(order)
    }

    async fn record_gateway_order(
        &self,
        id: Uuid,
        gateway: &str,
        gateway_order_id: &str,
    ) -> Result<(), DatabaseError> {
        let mut orders = self.orders.lock().unwrap();
        if let Some(order) = orders.get_mut(&id) {
            order.gateway = Some(gateway.to_string());
            order.gateway_order_id = Some(gateway_order_id.to_string());
        }
        Ok(())
    }

    async fn confirm_payment(
        &self,
        id: Uuid,
        payment_txn_id: &str,
    ) -> Result<Order, DatabaseError> {
        let mut orders = self.orders.lock().unwrap();
        let order = orders
            .get_mut(&id)
            .ok_or_else(|| DatabaseError::not_found("order"))?;
        order.status = "confirmed".to_string();
        order.payment_txn_id = Some(payment_txn_id.to_string());
        if order.provisioning_status == "unset" {
            order.provisioning_status = "pending".to_string();
        }
        Ok(order.clone())
    }

    async fn mark_payment_failed(&self, id: Uuid, reason: &str) -> Result<(), DatabaseError> {
        let mut orders = self.orders.lock().unwrap();
        if let Some(order) = orders.get_mut(&id) {
            order.status = "failed".to_string();
            order.provisioning_error = Some(reason.to_string());
        }
        Ok(())
    }

    async fn claim_for_provisioning(&self, id: Uuid) -> Result<bool, DatabaseError> {
        let mut orders = self.orders.lock().unwrap();
        let order = match orders.get_mut(&id) {
            Some(order) => order,
            None => return Ok(false),
        };
        let claimable = order.status == "confirmed"
            && order.provisioning_status != "provisioning"
            && order.provisioning_status != "active";
        if claimable {
            order.provisioning_status = "provisioning".to_string();
        }
        Ok(claimable)
    }

    async fn record_provision_success(
        &self,
        id: Uuid,
        provider: &str,
        server: &ProvisionedServer,
        expiry_date: DateTime<Utc>,
    ) -> Result<Order, DatabaseError> {
        let mut orders = self.orders.lock().unwrap();
        let order = orders
            .get_mut(&id)
            .ok_or_else(|| DatabaseError::not_found("order"))?;
        order.provider = Some(provider.to_string());
        order.provider_service_id = Some(server.service_id.clone());
        order.ip_address = Some(server.ip_address.clone());
        order.username = Some(server.username.clone());
        order.password = Some(server.password.clone());
        order.os = Some(server.os.clone());
        order.provisioning_status = "active".to_string();
        order.status = "active".to_string();
        order.provisioning_error = None;
        order.auto_provisioned = true;
        order.expiry_date = Some(expiry_date);
        Ok(order.clone())
    }

    async fn record_provision_accepted(
        &self,
        id: Uuid,
        provider: &str,
        service_id: &str,
    ) -> Result<(), DatabaseError> {
        let mut orders = self.orders.lock().unwrap();
        if let Some(order) = orders.get_mut(&id) {
            order.provider = Some(provider.to_string());
            order.provider_service_id = Some(service_id.to_string());
            order.provisioning_status = "provisioning".to_string();
            order.provisioning_error = None;
            order.auto_provisioned = true;
        }
        Ok(())
    }

    async fn record_provision_failure(&self, id: Uuid, error: &str) -> Result<(), DatabaseError> {
        let mut orders = self.orders.lock().unwrap();
        if let Some(order) = orders.get_mut(&id) {
            order.provisioning_status = "failed".to_string();
            order.provisioning_error = Some(error.to_string());
            order.auto_provisioned = true;
        }
        Ok(())
    }

    async fn reset_for_retry(&self, id: Uuid) -> Result<(), DatabaseError> {
        let mut orders = self.orders.lock().unwrap();
        if let Some(order) = orders.get_mut(&id) {
            if order.provisioning_status == "failed" {
                order.provisioning_status = "pending".to_string();
                order.provisioning_error = None;
            }
        }
        Ok(())
    }

    async fn find_provision_candidates(&self, limit: i64) -> Result<Vec<Order>, DatabaseError> {
        let orders = self.orders.lock().unwrap();
        let mut candidates: Vec<Order> = orders
            .values()
            .filter(|o| {
                o.status == "confirmed"
                    && !matches!(
                        o.provisioning_status.as_str(),
                        "provisioning" | "active" | "suspended" | "terminated"
                    )
                    && (!o.auto_provisioned || o.provisioning_status == "failed")
            })
            .cloned()
            .collect();
        candidates.sort_by_key(|o| o.created_at);
        candidates.truncate(limit as usize);
        Ok(candidates)
    }

    async fn set_pending_renewal(
        &self,
        id: Uuid,
        pending: &PendingRenewal,
    ) -> Result<(), DatabaseError> {
        let mut orders = self.orders.lock().unwrap();
        if let Some(order) = orders.get_mut(&id) {
            order.pending_renewal = Some(Json(pending.clone()));
        }
        Ok(())
    }

    async fn clear_pending_renewal(
        &self,
        id: Uuid,
        renewal_txn_id: &str,
    ) -> Result<(), DatabaseError> {
        let mut orders = self.orders.lock().unwrap();
        if let Some(order) = orders.get_mut(&id) {
            let matches = order
                .pending_renewal
                .as_ref()
                .map(|p| p.0.renewal_txn_id == renewal_txn_id)
                .unwrap_or(false);
            if matches {
                order.pending_renewal = None;
            }
        }
        Ok(())
    }

    async fn apply_renewal(
        &self,
        id: Uuid,
        entry: &RenewalPayment,
        new_expiry: DateTime<Utc>,
    ) -> Result<RenewalApplied, DatabaseError> {
        let mut orders = self.orders.lock().unwrap();
        let order = orders
            .get_mut(&id)
            .ok_or_else(|| DatabaseError::not_found("order"))?;
        if order
            .renewal_payments
            .0
            .iter()
            .any(|p| p.renewal_txn_id == entry.renewal_txn_id)
        {
            return Ok(RenewalApplied::Duplicate);
        }
        order.renewal_payments.0.push(entry.clone());
        order.expiry_date = Some(new_expiry);
        Ok(RenewalApplied::Applied)
    }

    async fn set_renewal_provider_result(
        &self,
        id: Uuid,
        renewal_txn_id: &str,
        success: bool,
    ) -> Result<(), DatabaseError> {
        let mut orders = self.orders.lock().unwrap();
        if let Some(order) = orders.get_mut(&id) {
            for entry in order.renewal_payments.0.iter_mut() {
                if entry.renewal_txn_id == renewal_txn_id {
                    entry.provider_renewal_success = success;
                }
            }
        }
        Ok(())
    }

    async fn find_with_pending_renewal(&self) -> Result<Vec<Order>, DatabaseError> {
        let orders = self.orders.lock().unwrap();
        Ok(orders
            .values()
            .filter(|o| o.pending_renewal.is_some())
            .cloned()
            .collect())
    }

    async fn find_by_renewal_txn(
        &self,
        renewal_txn_id: &str,
    ) -> Result<Option<Order>, DatabaseError> {
        let orders = self.orders.lock().unwrap();
        Ok(orders
            .values()
            .find(|o| {
                o.pending_renewal
                    .as_ref()
                    .map(|p| p.0.renewal_txn_id == renewal_txn_id)
                    .unwrap_or(false)
            })
            .cloned())
    }

    async fn find_awaiting_status_sync(&self, limit: i64) -> Result<Vec<Order>, DatabaseError> {
        let orders = self.orders.lock().unwrap();
        let mut waiting: Vec<Order> = orders
            .values()
            .filter(|o| {
                o.provider_service_id.is_some()
                    && matches!(o.provisioning_status.as_str(), "pending" | "provisioning")
                    && (o.ip_address.is_none() || o.username.is_none() || o.password.is_none())
            })
            .cloned()
            .collect();
        waiting.sort_by_key(|o| o.created_at);
        waiting.truncate(limit as usize);
        Ok(waiting)
    }

    async fn record_synced_credentials(
        &self,
        id: Uuid,
        ip_address: &str,
        username: Option<&str>,
        password: Option<&str>,
    ) -> Result<(), DatabaseError> {
        let mut orders = self.orders.lock().unwrap();
        if let Some(order) = orders.get_mut(&id) {
            order.ip_address = Some(ip_address.to_string());
            if let Some(username) = username {
                order.username = Some(username.to_string());
            }
            if let Some(password) = password {
                order.password = Some(password.to_string());
            }
            order.provisioning_status = "active".to_string();
            order.status = "active".to_string();
            order.provisioning_error = None;
        }
        Ok(())
    }

    async fn update_provisioning_status(
        &self,
        id: Uuid,
        status: ProvisioningStatus,
    ) -> Result<(), DatabaseError> {
        let mut orders = self.orders.lock().unwrap();
        if let Some(order) = orders.get_mut(&id) {
            order.provisioning_status = status.as_str().to_string();
        }
        Ok(())
    }

    async fn delete_abandoned_unpaid(
        &self,
        older_than: DateTime<Utc>,
    ) -> Result<u64, DatabaseError> {
        let mut orders = self.orders.lock().unwrap();
        let before = orders.len();
        orders.retain(|_, o| {
            !(o.status == "pending" && o.payment_txn_id.is_none() && o.created_at < older_than)
        });
        Ok((before - orders.len()) as u64)
    }
}

// ---------------------------------------------------------------------------
// In-memory action request store
// ---------------------------------------------------------------------------

#[derive(Default)]
pub struct InMemoryActionRequestStore {
    requests: Mutex<Vec<ServerActionRequest>>,
}

impl InMemoryActionRequestStore {
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl ActionRequestStore for InMemoryActionRequestStore {
    async fn insert(
        &self,
        request: NewActionRequest,
    ) -> Result<ServerActionRequest, DatabaseError> {
        let mut requests = self.requests.lock().unwrap();
        let duplicate = requests.iter().any(|r| {
            r.order_id == request.order_id
                && r.action == request.action.as_str()
                && r.status == "pending"
        });
        if duplicate {
            return Err(DatabaseError::new(DatabaseErrorKind::UniqueViolation {
                constraint: "idx_action_requests_pending_unique".to_string(),
            }));
        }

        let stored = ServerActionRequest {
            id: Uuid::new_v4(),
            order_id: request.order_id,
            user_id: request.user_id,
            action: request.action.as_str().to_string(),
            status: "pending".to_string(),
            payload: request.payload,
            snapshot: Json(request.snapshot),
            requested_at: Utc::now(),
            processed_at: None,
        };
        requests.push(stored.clone());
        Ok(stored)
    }

    async fn find_by_id(&self, id: Uuid) -> Result<Option<ServerActionRequest>, DatabaseError> {
        Ok(self
            .requests
            .lock()
            .unwrap()
            .iter()
            .find(|r| r.id == id)
            .cloned())
    }

    async fn latest_pending(
        &self,
        order_id: Uuid,
    ) -> Result<Option<ServerActionRequest>, DatabaseError> {
        Ok(self
            .requests
            .lock()
            .unwrap()
            .iter()
            .filter(|r| r.order_id == order_id && r.status == "pending")
            .max_by_key(|r| r.requested_at)
            .cloned())
    }

    async fn list_pending(&self, limit: i64) -> Result<Vec<ServerActionRequest>, DatabaseError> {
        let requests = self.requests.lock().unwrap();
        let mut pending: Vec<ServerActionRequest> = requests
            .iter()
            .filter(|r| r.status == "pending")
            .cloned()
            .collect();
        pending.sort_by_key(|r| r.requested_at);
        pending.truncate(limit as usize);
        Ok(pending)
    }

    async fn decide(
        &self,
        id: Uuid,
        approve: bool,
    ) -> Result<Option<ServerActionRequest>, DatabaseError> {
        let mut requests = self.requests.lock().unwrap();
        for request in requests.iter_mut() {
            if request.id == id && request.status == "pending" {
                request.status = if approve { "approved" } else { "rejected" }.to_string();
                request.processed_at = Some(Utc::now());
                return Ok(Some(request.clone()));
            }
        }
        Ok(None)
    }
}

// ---------------------------------------------------------------------------
// Scripted hosting provider
// ---------------------------------------------------------------------------

pub struct ScriptedProvider {
    kind: ProviderKind,
    outcomes: Mutex<VecDeque<ProviderResult<ProvisionOutcome>>>,
    pub provision_calls: AtomicUsize,
    pub renew_calls: AtomicUsize,
    renew_error: Mutex<Option<ProviderError>>,
    status: Mutex<Option<ServerStatus>>,
    provision_delay: Option<Duration>,
}

impl ScriptedProvider {
    pub fn new(kind: ProviderKind) -> Self {
        Self {
            kind,
            outcomes: Mutex::new(VecDeque::new()),
            provision_calls: AtomicUsize::new(0),
            renew_calls: AtomicUsize::new(0),
            renew_error: Mutex::new(None),
            status: Mutex::new(None),
            provision_delay: None,
        }
    }

    pub fn with_provision_delay(mut self, delay: Duration) -> Self {
        self.provision_delay = Some(delay);
        self
    }

    pub fn queue_outcome(&self, outcome: ProviderResult<ProvisionOutcome>) {
        self.outcomes.lock().unwrap().push_back(outcome);
    }

    pub fn set_renew_error(&self, error: Option<ProviderError>) {
        *self.renew_error.lock().unwrap() = error;
    }

    pub fn set_status(&self, status: ServerStatus) {
        *self.status.lock().unwrap() = Some(status);
    }

    pub fn provision_call_count(&self) -> usize {
        self.provision_calls.load(Ordering::SeqCst)
    }

    fn default_ready(&self) -> ProvisionOutcome {
        ProvisionOutcome::Ready {
            service_id: format!("svc-{}", Uuid::new_v4().simple()),
            ip_address: "203.0.113.77".to_string(),
            username: "root".to_string(),
            password: "generated-password".to_string(),
        }
    }
}

#[async_trait]
impl HostingProvider for ScriptedProvider {
    async fn provision(&self, _request: ProvisionRequest) -> ProviderResult<ProvisionOutcome> {
        self.provision_calls.fetch_add(1, Ordering::SeqCst);
        if let Some(delay) = self.provision_delay {
            tokio::time::sleep(delay).await;
        }
        match self.outcomes.lock().unwrap().pop_front() {
            Some(outcome) => outcome,
            None => Ok(self.default_ready()),
        }
    }

    async fn renew(&self, _service_id: &str) -> ProviderResult<()> {
        self.renew_calls.fetch_add(1, Ordering::SeqCst);
        match self.renew_error.lock().unwrap().clone() {
            Some(error) => Err(error),
            None => Ok(()),
        }
    }

    async fn start(&self, _service_id: &str) -> ProviderResult<()> {
        Ok(())
    }

    async fn stop(&self, _service_id: &str) -> ProviderResult<()> {
        Ok(())
    }

    async fn reboot(&self, _service_id: &str) -> ProviderResult<()> {
        Ok(())
    }

    async fn format(&self, _service_id: &str) -> ProviderResult<()> {
        Ok(())
    }

    async fn change_password(&self, _service_id: &str, _new_password: &str) -> ProviderResult<()> {
        Ok(())
    }

    async fn get_status(&self, _service_id: &str) -> ProviderResult<ServerStatus> {
        match self.status.lock().unwrap().clone() {
            Some(status) => Ok(status),
            None => Err(ProviderError::backend(
                self.kind.as_str().to_string(),
                "no scripted status",
            )),
        }
    }

    fn kind(&self) -> ProviderKind {
        self.kind
    }
}

// ---------------------------------------------------------------------------
// Scripted payment gateway
// ---------------------------------------------------------------------------

pub struct ScriptedGateway {
    name: GatewayName,
    statuses: Mutex<HashMap<String, PaymentState>>,
    fail_create: bool,
    fetch_verified: bool,
}

impl ScriptedGateway {
    pub fn new(name: GatewayName) -> Self {
        Self {
            name,
            statuses: Mutex::new(HashMap::new()),
            fail_create: false,
            fetch_verified: false,
        }
    }

    pub fn failing_create(name: GatewayName) -> Self {
        Self {
            name,
            statuses: Mutex::new(HashMap::new()),
            fail_create: true,
            fetch_verified: false,
        }
    }

    /// Unsigned-callback gateway: trust only comes from a status fetch
    pub fn fetch_verified(name: GatewayName) -> Self {
        Self {
            name,
            statuses: Mutex::new(HashMap::new()),
            fail_create: false,
            fetch_verified: true,
        }
    }

    pub fn set_status(&self, reference: &str, state: PaymentState) {
        self.statuses
            .lock()
            .unwrap()
            .insert(reference.to_string(), state);
    }
}

#[async_trait]
impl PaymentGateway for ScriptedGateway {
    async fn create_order(&self, request: CheckoutRequest) -> GatewayResult<CheckoutResponse> {
        if self.fail_create {
            return Err(GatewayError::NetworkError {
                message: "connection refused".to_string(),
            });
        }
        Ok(CheckoutResponse {
            gateway: self.name,
            gateway_order_id: format!("{}_{}", self.name.as_str(), request.transaction_reference),
            payment_url: Some("https://pay.example/checkout".to_string()),
            provider_data: None,
        })
    }

    async fn fetch_status(&self, request: StatusRequest) -> GatewayResult<StatusResponse> {
        let reference = request
            .transaction_reference
            .clone()
            .or(request.gateway_order_id.clone())
            .unwrap_or_default();
        let state = self
            .statuses
            .lock()
            .unwrap()
            .get(&reference)
            .cloned()
            .unwrap_or(PaymentState::Pending);
        Ok(StatusResponse {
            status: state,
            transaction_reference: Some(reference.clone()),
            gateway_order_id: request.gateway_order_id,
            payment_id: Some(format!("pay_{}", reference)),
            amount: None,
            timestamp: None,
            failure_reason: None,
        })
    }

    fn verify_webhook(
        &self,
        _payload: &[u8],
        signature: &str,
    ) -> GatewayResult<WebhookVerificationResult> {
        // Scripted rule: the literal signature "valid" verifies
        let valid = signature == "valid";
        Ok(WebhookVerificationResult {
            valid,
            reason: (!valid).then(|| "invalid signature".to_string()),
        })
    }

    fn parse_webhook_event(&self, payload: &[u8]) -> GatewayResult<WebhookEvent> {
        let parsed: serde_json::Value =
            serde_json::from_slice(payload).map_err(|e| GatewayError::WebhookVerificationError {
                message: format!("invalid payload: {}", e),
            })?;
        Ok(WebhookEvent {
            gateway: self.name,
            event_type: parsed
                .get("event")
                .and_then(|v| v.as_str())
                .unwrap_or("unknown")
                .to_string(),
            transaction_reference: parsed
                .get("reference")
                .and_then(|v| v.as_str())
                .map(|v| v.to_string()),
            gateway_order_id: None,
            payment_id: parsed
                .get("payment_id")
                .and_then(|v| v.as_str())
                .map(|v| v.to_string()),
            status: parsed.get("status").and_then(|v| v.as_str()).map(|s| {
                match s {
                    "success" => PaymentState::Success,
                    "failed" => PaymentState::Failed,
                    "pending" => PaymentState::Pending,
                    _ => PaymentState::Unknown,
                }
            }),
            payload: parsed,
            received_at: Utc::now().to_rfc3339(),
        })
    }

    fn signature_header(&self) -> Option<&'static str> {
        (!self.fetch_verified).then_some("x-test-signature")
    }

    fn requires_status_fetch_verification(&self) -> bool {
        self.fetch_verified
    }

    fn name(&self) -> GatewayName {
        self.name
    }
}

// ---------------------------------------------------------------------------
// Order fixtures
// ---------------------------------------------------------------------------

pub fn make_order(client_txn_id: &str) -> Order {
    Order {
        id: Uuid::new_v4(),
        user_id: Uuid::new_v4(),
        reseller_id: None,
        product_name: "Sky NVMe 4GB".to_string(),
        memory_mb: 4096,
        price: BigDecimal::from(549),
        promo_code: None,
        client_txn_id: client_txn_id.to_string(),
        gateway_order_id: None,
        gateway: None,
        payment_txn_id: None,
        status: "pending".to_string(),
        provider: None,
        provider_service_id: None,
        ip_address: None,
        username: None,
        password: None,
        os: None,
        provisioning_status: "unset".to_string(),
        provisioning_error: None,
        auto_provisioned: false,
        expiry_date: None,
        pending_renewal: None,
        renewal_payments: Json(Vec::new()),
        created_at: Utc::now(),
        updated_at: Utc::now(),
    }
}

pub fn make_confirmed_order(client_txn_id: &str) -> Order {
    let mut order = make_order(client_txn_id);
    order.status = "confirmed".to_string();
    order.provisioning_status = "pending".to_string();
    order.payment_txn_id = Some(format!("pay_{}", client_txn_id));
    order
}

fn make_order_from_new(new_order: NewOrder) -> Order {
    let mut order = make_order(&new_order.client_txn_id);
    order.user_id = new_order.user_id;
    order.reseller_id = new_order.reseller_id;
    order.product_name = new_order.product_name;
    order.memory_mb = new_order.memory_mb;
    order.price = new_order.price;
    order.promo_code = new_order.promo_code;
    order.provider = new_order.provider;
    order
}
