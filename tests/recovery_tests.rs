mod common;

use bigdecimal::BigDecimal;
use chrono::{Duration, Utc};
use common::{make_confirmed_order, InMemoryOrderStore, ScriptedGateway, ScriptedProvider};
use nimbus_backend::database::order_repository::{Order, PendingRenewal};
use nimbus_backend::gateways::factory::GatewayFactory;
use nimbus_backend::gateways::gateway::PaymentGateway;
use nimbus_backend::gateways::types::{GatewayName, PaymentState};
use nimbus_backend::providers::adapter::HostingProvider;
use nimbus_backend::providers::registry::ProviderRegistry;
use nimbus_backend::providers::types::ProviderKind;
use nimbus_backend::services::notification::LogNotifier;
use nimbus_backend::services::recovery::{RecoveryConfig, RecoveryService};
use nimbus_backend::services::renewal::RenewalEngine;
use sqlx::types::Json;
use std::sync::Arc;
use uuid::Uuid;

struct Fixture {
    store: Arc<InMemoryOrderStore>,
    paylane: Arc<ScriptedGateway>,
    zippay: Arc<ScriptedGateway>,
    service: RecoveryService,
}

fn fixture() -> Fixture {
    let store = Arc::new(InMemoryOrderStore::new());
    let paylane = Arc::new(ScriptedGateway::new(GatewayName::PayLane));
    let zippay = Arc::new(ScriptedGateway::new(GatewayName::ZipPay));
    let factory = Arc::new(GatewayFactory::with_gateways(vec![
        paylane.clone() as Arc<dyn PaymentGateway>,
        zippay.clone() as Arc<dyn PaymentGateway>,
    ]));
    let provider = Arc::new(ScriptedProvider::new(ProviderKind::SkyStack));
    let registry = Arc::new(ProviderRegistry::with_providers(vec![
        provider as Arc<dyn HostingProvider>,
    ]));
    let renewal = Arc::new(RenewalEngine::new(
        store.clone(),
        registry,
        Arc::new(LogNotifier::new()),
    ));
    let service = RecoveryService::new(
        store.clone(),
        factory,
        renewal,
        RecoveryConfig {
            stale_after_hours: 48,
            abandoned_after_days: 30,
        },
    );
    Fixture {
        store,
        paylane,
        zippay,
        service,
    }
}

fn order_with_pending_renewal(age_hours: i64) -> (Order, String) {
    let renewal_txn_id = format!("rnw_{}", Uuid::new_v4().simple());
    let mut order = make_confirmed_order(&format!("txn_{}", Uuid::new_v4().simple()));
    order.status = "active".to_string();
    order.provisioning_status = "active".to_string();
    order.provider = Some("skystack".to_string());
    order.provider_service_id = Some("svc-1".to_string());
    order.expiry_date = Some(Utc::now() + Duration::days(3));
    order.pending_renewal = Some(Json(PendingRenewal {
        renewal_txn_id: renewal_txn_id.clone(),
        gateway: "paylane".to_string(),
        amount: BigDecimal::from(549),
        initiated_at: Utc::now() - Duration::hours(age_hours),
    }));
    (order, renewal_txn_id)
}

#[tokio::test]
async fn missed_webhook_renewal_is_recovered_from_gateway_status() {
    let f = fixture();
    let (order, renewal_txn_id) = order_with_pending_renewal(2);
    let order_id = order.id;
    let old_expiry = order.expiry_date.unwrap();
    f.store.put(order);
    f.paylane.set_status(&renewal_txn_id, PaymentState::Success);

    let summary = f.service.recover_pending_renewals().await;
    assert_eq!(summary.scanned, 1);
    assert_eq!(summary.recovered, 1);

    let stored = f.store.get(order_id).unwrap();
    assert!(stored.pending_renewal.is_none());
    assert_eq!(stored.renewal_payments.0.len(), 1);
    assert_eq!(stored.expiry_date.unwrap(), old_expiry + Duration::days(30));
    assert!(stored.renewal_payments.0[0].recovered_at.is_some());
}

#[tokio::test]
async fn recovery_probes_other_gateways_too() {
    let f = fixture();
    let (order, renewal_txn_id) = order_with_pending_renewal(2);
    let order_id = order.id;
    f.store.put(order);
    // Payment actually landed at zippay, not the gateway recorded on the
    // pending record
    f.zippay.set_status(&renewal_txn_id, PaymentState::Success);

    let summary = f.service.recover_pending_renewals().await;
    assert_eq!(summary.recovered, 1);
    assert!(f.store.get(order_id).unwrap().pending_renewal.is_none());
}

#[tokio::test]
async fn recovery_is_idempotent_across_sweeps() {
    let f = fixture();
    let (order, renewal_txn_id) = order_with_pending_renewal(2);
    let order_id = order.id;
    f.store.put(order);
    f.paylane.set_status(&renewal_txn_id, PaymentState::Success);

    let first = f.service.recover_pending_renewals().await;
    assert_eq!(first.recovered, 1);
    let second = f.service.recover_pending_renewals().await;
    assert_eq!(second.scanned, 0);
    assert_eq!(second.recovered, 0);

    assert_eq!(f.store.get(order_id).unwrap().renewal_payments.0.len(), 1);
}

#[tokio::test]
async fn unpaid_renewal_stays_pending_until_stale() {
    let f = fixture();
    let (order, _) = order_with_pending_renewal(2);
    let order_id = order.id;
    f.store.put(order);

    let recovery = f.service.recover_pending_renewals().await;
    assert_eq!(recovery.still_pending, 1);

    let cleanup = f.service.clear_stale_renewals().await;
    assert_eq!(cleanup.kept, 1);
    assert_eq!(cleanup.cleared, 0);
    assert!(f.store.get(order_id).unwrap().pending_renewal.is_some());
}

#[tokio::test]
async fn stale_unpaid_renewal_is_cleared_after_final_check() {
    let f = fixture();
    let (order, _) = order_with_pending_renewal(100);
    let order_id = order.id;
    f.store.put(order);

    let cleanup = f.service.clear_stale_renewals().await;
    assert_eq!(cleanup.cleared, 1);
    assert_eq!(cleanup.recovered, 0);

    let stored = f.store.get(order_id).unwrap();
    assert!(stored.pending_renewal.is_none());
    assert!(stored.renewal_payments.0.is_empty());
}

#[tokio::test]
async fn stale_renewal_that_turns_out_paid_is_recovered_not_deleted() {
    let f = fixture();
    let (order, renewal_txn_id) = order_with_pending_renewal(100);
    let order_id = order.id;
    let old_expiry = order.expiry_date.unwrap();
    f.store.put(order);
    // The gateway now reports success for the long-stale record
    f.paylane.set_status(&renewal_txn_id, PaymentState::Success);

    let cleanup = f.service.clear_stale_renewals().await;
    assert_eq!(cleanup.recovered, 1);
    assert_eq!(cleanup.cleared, 0);

    let stored = f.store.get(order_id).unwrap();
    assert!(stored.pending_renewal.is_none());
    assert_eq!(stored.renewal_payments.0.len(), 1);
    assert_eq!(stored.expiry_date.unwrap(), old_expiry + Duration::days(30));
}

#[tokio::test]
async fn report_categorizes_pending_renewals() {
    let f = fixture();
    let (paid, paid_txn) = order_with_pending_renewal(3);
    let (fresh, _) = order_with_pending_renewal(1);
    let (stale, _) = order_with_pending_renewal(90);
    f.store.put(paid);
    f.store.put(fresh);
    f.store.put(stale);
    f.paylane.set_status(&paid_txn, PaymentState::Success);

    let report = f.service.pending_renewal_report().await;
    assert_eq!(report.paid_but_unprocessed.len(), 1);
    assert_eq!(report.still_pending.len(), 1);
    assert_eq!(report.stale.len(), 1);
    assert_eq!(report.paid_but_unprocessed[0].renewal_txn_id, paid_txn);
}

#[tokio::test]
async fn abandoned_unpaid_orders_are_purged_but_failed_ones_kept() {
    let f = fixture();
    let mut abandoned = make_confirmed_order("txn_abandoned");
    abandoned.status = "pending".to_string();
    abandoned.payment_txn_id = None;
    abandoned.created_at = Utc::now() - Duration::days(60);
    let abandoned_id = abandoned.id;

    let mut failed = make_confirmed_order("txn_failed_old");
    failed.status = "failed".to_string();
    failed.created_at = Utc::now() - Duration::days(60);
    let failed_id = failed.id;

    f.store.put(abandoned);
    f.store.put(failed);

    let purged = f.service.purge_abandoned_orders().await;
    assert_eq!(purged, 1);
    assert!(f.store.get(abandoned_id).is_none());
    // Failed orders are audit history and never deleted
    assert!(f.store.get(failed_id).is_some());
}
