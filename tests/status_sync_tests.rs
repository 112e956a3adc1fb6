mod common;

use common::{make_confirmed_order, InMemoryOrderStore, ScriptedProvider};
use nimbus_backend::providers::adapter::HostingProvider;
use nimbus_backend::providers::registry::ProviderRegistry;
use nimbus_backend::providers::types::{
    MachineStatus, PowerStatus, ProviderKind, ServerStatus,
};
use nimbus_backend::services::notification::LogNotifier;
use nimbus_backend::services::status_sync::{StatusSyncConfig, StatusSyncService};
use std::sync::Arc;
use uuid::Uuid;

struct Fixture {
    store: Arc<InMemoryOrderStore>,
    provider: Arc<ScriptedProvider>,
    service: StatusSyncService,
}

fn fixture() -> Fixture {
    let store = Arc::new(InMemoryOrderStore::new());
    let provider = Arc::new(ScriptedProvider::new(ProviderKind::RockVm));
    let registry = Arc::new(ProviderRegistry::with_providers(vec![
        provider.clone() as Arc<dyn HostingProvider>,
    ]));
    let service = StatusSyncService::new(
        store.clone(),
        registry,
        Arc::new(LogNotifier::new()),
        StatusSyncConfig { batch_size: 50 },
    );
    Fixture {
        store,
        provider,
        service,
    }
}

fn awaiting_order() -> nimbus_backend::database::order_repository::Order {
    let mut order = make_confirmed_order(&format!("txn_{}", Uuid::new_v4().simple()));
    order.provisioning_status = "provisioning".to_string();
    order.provider = Some("rockvm".to_string());
    order.provider_service_id = Some("4211".to_string());
    order.auto_provisioned = true;
    order
}

#[tokio::test]
async fn credentials_surfacing_upstream_activate_the_order() {
    let f = fixture();
    let order = awaiting_order();
    let order_id = order.id;
    f.store.put(order);

    f.provider.set_status(ServerStatus {
        ip_address: Some("103.87.0.21".to_string()),
        username: Some("root".to_string()),
        password: Some("built-password".to_string()),
        machine_status: MachineStatus::Active,
        power_status: PowerStatus::On,
    });

    let summary = f.service.sync_once().await;
    assert_eq!(summary.checked, 1);
    assert_eq!(summary.activated, 1);

    let stored = f.store.get(order_id).unwrap();
    assert_eq!(stored.provisioning_status, "active");
    assert!(stored.has_credentials());
    assert_eq!(stored.ip_address.as_deref(), Some("103.87.0.21"));
}

#[tokio::test]
async fn still_building_orders_are_left_alone() {
    let f = fixture();
    let order = awaiting_order();
    let order_id = order.id;
    f.store.put(order);

    f.provider.set_status(ServerStatus {
        ip_address: None,
        username: None,
        password: None,
        machine_status: MachineStatus::Provisioning,
        power_status: PowerStatus::Unknown,
    });

    let summary = f.service.sync_once().await;
    assert_eq!(summary.unchanged, 1);
    assert_eq!(
        f.store.get(order_id).unwrap().provisioning_status,
        "provisioning"
    );
}

#[tokio::test]
async fn active_backend_without_ip_waits_for_next_sweep() {
    let f = fixture();
    let order = awaiting_order();
    let order_id = order.id;
    f.store.put(order);

    f.provider.set_status(ServerStatus {
        ip_address: None,
        username: Some("root".to_string()),
        password: Some("pw".to_string()),
        machine_status: MachineStatus::Active,
        power_status: PowerStatus::On,
    });

    let summary = f.service.sync_once().await;
    assert_eq!(summary.unchanged, 1);
    assert_eq!(
        f.store.get(order_id).unwrap().provisioning_status,
        "provisioning"
    );
}

#[tokio::test]
async fn unrecognized_status_token_causes_no_state_change() {
    let f = fixture();
    let order = awaiting_order();
    let order_id = order.id;
    f.store.put(order);

    f.provider.set_status(ServerStatus {
        ip_address: Some("103.87.0.30".to_string()),
        username: Some("root".to_string()),
        password: Some("pw".to_string()),
        machine_status: MachineStatus::Unrecognized("hibernating".to_string()),
        power_status: PowerStatus::Unknown,
    });

    let summary = f.service.sync_once().await;
    assert_eq!(summary.unchanged, 1);

    let stored = f.store.get(order_id).unwrap();
    assert_eq!(stored.provisioning_status, "provisioning");
    assert!(!stored.has_credentials());
}

#[tokio::test]
async fn failed_builds_are_marked_failed() {
    let f = fixture();
    let order = awaiting_order();
    let order_id = order.id;
    f.store.put(order);

    f.provider.set_status(ServerStatus {
        ip_address: None,
        username: None,
        password: None,
        machine_status: MachineStatus::Failed,
        power_status: PowerStatus::Off,
    });

    let summary = f.service.sync_once().await;
    assert_eq!(summary.failed, 1);
    assert_eq!(f.store.get(order_id).unwrap().provisioning_status, "failed");
}

#[tokio::test]
async fn provider_errors_do_not_abort_the_sweep() {
    let f = fixture();
    // No scripted status: get_status errors for the first order
    let first = awaiting_order();
    f.store.put(first);

    let summary = f.service.sync_once().await;
    assert_eq!(summary.checked, 1);
    assert_eq!(summary.errors, 1);
}
