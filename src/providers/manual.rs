//! Manual fulfilment backend
//!
//! Fallback for products no automated backend serves. `provision` records
//! nothing upstream; a human sets the server up and enters credentials
//! through the admin panel. Control actions are rejected here; customers
//! reach them through the manual action queue instead.

use crate::providers::adapter::HostingProvider;
use crate::providers::error::{ProviderError, ProviderResult};
use crate::providers::types::{ProviderKind, ProvisionOutcome, ProvisionRequest, ServerStatus};
use async_trait::async_trait;
use tracing::info;

pub struct ManualProvider;

impl ManualProvider {
    pub fn new() -> Self {
        Self
    }
}

impl Default for ManualProvider {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl HostingProvider for ManualProvider {
    async fn provision(&self, request: ProvisionRequest) -> ProviderResult<ProvisionOutcome> {
        info!(
            order_id = %request.order_id,
            product = %request.label,
            "order routed to manual fulfilment"
        );
        Ok(ProvisionOutcome::ManualFulfillment)
    }

    async fn renew(&self, _service_id: &str) -> ProviderResult<()> {
        // Nothing to call upstream; the expiry extension on the order is the
        // renewal for manually-managed servers.
        Ok(())
    }

    async fn start(&self, _service_id: &str) -> ProviderResult<()> {
        Err(ProviderError::unsupported("manual", "start"))
    }

    async fn stop(&self, _service_id: &str) -> ProviderResult<()> {
        Err(ProviderError::unsupported("manual", "stop"))
    }

    async fn reboot(&self, _service_id: &str) -> ProviderResult<()> {
        Err(ProviderError::unsupported("manual", "reboot"))
    }

    async fn format(&self, _service_id: &str) -> ProviderResult<()> {
        Err(ProviderError::unsupported("manual", "format"))
    }

    async fn change_password(&self, _service_id: &str, _new_password: &str) -> ProviderResult<()> {
        Err(ProviderError::unsupported("manual", "change_password"))
    }

    async fn get_status(&self, _service_id: &str) -> ProviderResult<ServerStatus> {
        Err(ProviderError::unsupported("manual", "get_status"))
    }

    fn kind(&self) -> ProviderKind {
        ProviderKind::Manual
    }

    fn supports_direct_control(&self) -> bool {
        false
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::providers::error::ProviderErrorCode;

    #[tokio::test]
    async fn provision_routes_to_manual_fulfilment() {
        let provider = ManualProvider::new();
        let outcome = provider
            .provision(ProvisionRequest {
                order_id: uuid::Uuid::new_v4(),
                label: "Dedicated 32GB".to_string(),
                os: "ubuntu-22.04".to_string(),
                memory_mb: 32768,
            })
            .await
            .expect("manual provision never fails");
        assert!(matches!(outcome, ProvisionOutcome::ManualFulfillment));
    }

    #[tokio::test]
    async fn control_actions_are_unsupported() {
        let provider = ManualProvider::new();
        let err = provider.reboot("srv-1").await.unwrap_err();
        assert_eq!(err.code, ProviderErrorCode::UnsupportedOperation);
        assert!(!provider.supports_direct_control());
    }
}
