use axum::{
    routing::{get, post},
    Router,
};
use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;
use tokio::signal;
use tokio::sync::watch;
use tower::ServiceBuilder;
use tower_http::request_id::{PropagateRequestIdLayer, SetRequestIdLayer};
use tracing::{error, info};

use nimbus_backend::api::jobs::JobsState;
use nimbus_backend::api::orders::OrdersState;
use nimbus_backend::api::server_actions::ServerActionsState;
use nimbus_backend::api::webhooks::WebhookState;
use nimbus_backend::api::{jobs, orders, server_actions, webhooks};
use nimbus_backend::config::AppConfig;
use nimbus_backend::database::action_request_repository::PgActionRequestRepository;
use nimbus_backend::database::order_repository::PgOrderRepository;
use nimbus_backend::database::{init_pool_from_config, ActionRequestStoreRef, OrderStoreRef};
use nimbus_backend::gateways::factory::GatewayFactory;
use nimbus_backend::health::{self, HealthChecker, HealthState};
use nimbus_backend::logging::init_tracing;
use nimbus_backend::middleware::logging::{request_logging_middleware, UuidRequestId};
use nimbus_backend::providers::registry::ProviderRegistry;
use nimbus_backend::services::manual_actions::ManualActionService;
use nimbus_backend::services::notification::LogNotifier;
use nimbus_backend::services::payments::PaymentService;
use nimbus_backend::services::provisioning::{NoCatalog, ProvisioningOrchestrator};
use nimbus_backend::services::recovery::{RecoveryConfig, RecoveryService};
use nimbus_backend::services::renewal::RenewalEngine;
use nimbus_backend::services::server_control::ServerControlService;
use nimbus_backend::services::status_sync::{StatusSyncConfig, StatusSyncService};
use nimbus_backend::services::webhook_processor::WebhookProcessor;
use nimbus_backend::workers::batch_provisioner::{
    BatchProvisioner, BatchProvisionerConfig, BatchProvisionerWorker,
};
use nimbus_backend::workers::renewal_recovery::RenewalRecoveryWorker;
use nimbus_backend::workers::status_sync::StatusSyncWorker;

/// Graceful shutdown signal handler
async fn shutdown_signal() {
    let ctrl_c = async {
        signal::ctrl_c()
            .await
            .expect("failed to install Ctrl+C handler");
    };

    #[cfg(unix)]
    let terminate = async {
        signal::unix::signal(signal::unix::SignalKind::terminate())
            .expect("failed to install signal handler")
            .recv()
            .await;
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {},
        _ = terminate => {},
    }

    info!("shutdown signal received, starting graceful shutdown");
}

async fn shutdown_signal_with_notify(shutdown_tx: watch::Sender<bool>) {
    shutdown_signal().await;
    let _ = shutdown_tx.send(true);
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    init_tracing();

    let config = AppConfig::from_env()?;
    config.validate()?;

    info!(
        version = env!("CARGO_PKG_VERSION"),
        environment = std::env::var("ENVIRONMENT").unwrap_or_else(|_| "development".to_string()),
        "🚀 starting nimbus backend"
    );

    // Database
    info!("📊 initializing database connection pool");
    let pool = init_pool_from_config(&config.database).await.map_err(|e| {
        error!("failed to initialize database pool: {}", e);
        anyhow::anyhow!(e.to_string())
    })?;
    info!("✅ database connection pool initialized");

    let order_store: OrderStoreRef = Arc::new(PgOrderRepository::new(pool.clone()));
    let action_store: ActionRequestStoreRef =
        Arc::new(PgActionRequestRepository::new(pool.clone()));

    // Gateways and providers
    let gateway_factory = Arc::new(GatewayFactory::from_env().map_err(|e| {
        error!("failed to initialize payment gateways: {}", e);
        anyhow::anyhow!(e.to_string())
    })?);
    info!(gateways = ?gateway_factory.list(), "✅ payment gateways initialized");

    let provider_registry = Arc::new(ProviderRegistry::from_env().map_err(|e| {
        error!("failed to initialize hosting providers: {}", e);
        anyhow::anyhow!(e.to_string())
    })?);
    info!("✅ hosting providers initialized");

    // Services
    let notifier = Arc::new(LogNotifier::new());
    let orchestrator = Arc::new(ProvisioningOrchestrator::new(
        order_store.clone(),
        provider_registry.clone(),
        Arc::new(NoCatalog),
        notifier.clone(),
    ));
    let renewal_engine = Arc::new(RenewalEngine::new(
        order_store.clone(),
        provider_registry.clone(),
        notifier.clone(),
    ));
    let webhook_processor = Arc::new(WebhookProcessor::new(
        order_store.clone(),
        gateway_factory.clone(),
        orchestrator.clone(),
        renewal_engine.clone(),
        notifier.clone(),
    ));
    let payment_service = Arc::new(PaymentService::new(
        order_store.clone(),
        gateway_factory.clone(),
    ));
    let recovery_service = Arc::new(RecoveryService::new(
        order_store.clone(),
        gateway_factory.clone(),
        renewal_engine.clone(),
        RecoveryConfig::from_env(),
    ));
    let status_sync_service = Arc::new(StatusSyncService::new(
        order_store.clone(),
        provider_registry.clone(),
        notifier.clone(),
        StatusSyncConfig::from_env(),
    ));
    let manual_action_service = Arc::new(ManualActionService::new(
        order_store.clone(),
        action_store.clone(),
        notifier.clone(),
    ));
    let server_control_service = Arc::new(ServerControlService::new(
        order_store.clone(),
        provider_registry.clone(),
    ));

    let provisioner_config = BatchProvisionerConfig::from_env();
    let batch_provisioner = Arc::new(BatchProvisioner::new(
        order_store.clone(),
        orchestrator.clone(),
        provisioner_config.clone(),
    ));

    // Background workers
    let (worker_shutdown_tx, worker_shutdown_rx) = watch::channel(false);
    let mut worker_handles = Vec::new();

    let workers_enabled = std::env::var("BACKGROUND_WORKERS_ENABLED")
        .unwrap_or_else(|_| "true".to_string())
        .to_lowercase()
        != "false";
    if workers_enabled {
        let sweep_interval = provisioner_config.sweep_interval;
        let provisioner_worker =
            BatchProvisionerWorker::new(batch_provisioner.clone(), sweep_interval);
        worker_handles.push(tokio::spawn(
            provisioner_worker.run(worker_shutdown_rx.clone()),
        ));

        let recovery_interval = Duration::from_secs(
            std::env::var("RECOVERY_SWEEP_INTERVAL_SECONDS")
                .ok()
                .and_then(|v| v.parse::<u64>().ok())
                .unwrap_or(900),
        );
        let recovery_worker =
            RenewalRecoveryWorker::new(recovery_service.clone(), recovery_interval);
        worker_handles.push(tokio::spawn(recovery_worker.run(worker_shutdown_rx.clone())));

        let sync_interval = Duration::from_secs(
            std::env::var("STATUS_SYNC_INTERVAL_SECONDS")
                .ok()
                .and_then(|v| v.parse::<u64>().ok())
                .unwrap_or(120),
        );
        let sync_worker = StatusSyncWorker::new(status_sync_service.clone(), sync_interval);
        worker_handles.push(tokio::spawn(sync_worker.run(worker_shutdown_rx.clone())));

        info!("✅ background workers started");
    } else {
        info!("background workers disabled (BACKGROUND_WORKERS_ENABLED=false)");
    }

    // Routes
    let webhook_routes = Router::new()
        .route("/webhooks/{gateway}", post(webhooks::handle_webhook))
        .with_state(Arc::new(WebhookState {
            processor: webhook_processor,
        }));

    let jobs_routes = Router::new()
        .route("/jobs/provision-batch", post(jobs::run_provision_batch))
        .route("/jobs/pending-renewals", get(jobs::pending_renewals_report))
        .route("/jobs/recover-renewals", post(jobs::recover_renewals))
        .route(
            "/jobs/clear-stale-renewals",
            post(jobs::clear_stale_renewals),
        )
        .with_state(Arc::new(JobsState {
            provisioner: batch_provisioner,
            recovery: recovery_service,
        }));

    let order_routes = Router::new()
        .route("/api/orders", post(orders::create_order))
        .route("/api/orders/{id}", get(orders::get_order))
        .route("/api/orders/{id}/renew", post(orders::renew_order))
        .route(
            "/api/orders/{id}/actions",
            post(orders::perform_direct_action),
        )
        .route("/api/orders/{id}/live-status", get(orders::live_status))
        .with_state(Arc::new(OrdersState {
            store: order_store.clone(),
            payments: payment_service,
            server_control: server_control_service,
        }));

    let action_routes = Router::new()
        .route("/api/server-actions", post(server_actions::submit_action))
        .route(
            "/api/server-actions/{order_id}",
            get(server_actions::latest_pending_action),
        )
        .route(
            "/api/server-actions/{id}/decision",
            post(server_actions::decide_action),
        )
        .with_state(Arc::new(ServerActionsState {
            manual_actions: manual_action_service,
        }));

    let health_routes = Router::new()
        .route("/health", get(health::health))
        .route("/health/ready", get(health::readiness))
        .route("/health/live", get(health::liveness))
        .with_state(Arc::new(HealthState {
            checker: HealthChecker::new(pool.clone()),
        }));

    let app = Router::new()
        .merge(webhook_routes)
        .merge(jobs_routes)
        .merge(order_routes)
        .merge(action_routes)
        .merge(health_routes)
        .layer(
            ServiceBuilder::new()
                .layer(SetRequestIdLayer::x_request_id(UuidRequestId))
                .layer(axum::middleware::from_fn(request_logging_middleware))
                .layer(PropagateRequestIdLayer::x_request_id()),
        );

    info!("✅ routes configured");

    let addr: SocketAddr = format!("{}:{}", config.server.host, config.server.port).parse()?;
    let listener = tokio::net::TcpListener::bind(addr).await.map_err(|e| {
        error!("failed to bind to {}: {}", addr, e);
        e
    })?;

    info!(address = %addr, "🚀 server listening");

    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal_with_notify(worker_shutdown_tx.clone()))
        .await?;

    let _ = worker_shutdown_tx.send(true);
    for handle in worker_handles {
        if let Err(e) = tokio::time::timeout(Duration::from_secs(5), handle).await {
            error!(error = %e, "timed out waiting for worker shutdown");
        }
    }

    info!("👋 server shutdown complete");
    Ok(())
}
