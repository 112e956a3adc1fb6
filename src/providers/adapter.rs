use crate::providers::error::ProviderResult;
use crate::providers::types::{ProviderKind, ProvisionOutcome, ProvisionRequest, ServerStatus};
use async_trait::async_trait;

/// Uniform contract over hosting backends.
///
/// Each backend hides its own request/response shapes behind this trait; the
/// orchestrator, batch runner and status sync only ever see normalized types.
#[async_trait]
pub trait HostingProvider: Send + Sync {
    async fn provision(&self, request: ProvisionRequest) -> ProviderResult<ProvisionOutcome>;

    async fn renew(&self, service_id: &str) -> ProviderResult<()>;

    async fn start(&self, service_id: &str) -> ProviderResult<()>;

    async fn stop(&self, service_id: &str) -> ProviderResult<()>;

    async fn reboot(&self, service_id: &str) -> ProviderResult<()>;

    async fn format(&self, service_id: &str) -> ProviderResult<()>;

    async fn change_password(&self, service_id: &str, new_password: &str) -> ProviderResult<()>;

    async fn get_status(&self, service_id: &str) -> ProviderResult<ServerStatus>;

    fn kind(&self) -> ProviderKind;

    /// False for backends without a control API; their actions go through
    /// the manual action queue instead.
    fn supports_direct_control(&self) -> bool {
        true
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::providers::types::{MachineStatus, PowerStatus};

    struct MockProvider;

    #[async_trait]
    impl HostingProvider for MockProvider {
        async fn provision(&self, request: ProvisionRequest) -> ProviderResult<ProvisionOutcome> {
            Ok(ProvisionOutcome::Ready {
                service_id: format!("mock-{}", request.order_id),
                ip_address: "203.0.113.10".to_string(),
                username: "root".to_string(),
                password: "mock-password".to_string(),
            })
        }

        async fn renew(&self, _service_id: &str) -> ProviderResult<()> {
            Ok(())
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

        async fn change_password(
            &self,
            _service_id: &str,
            _new_password: &str,
        ) -> ProviderResult<()> {
            Ok(())
        }

        async fn get_status(&self, _service_id: &str) -> ProviderResult<ServerStatus> {
            Ok(ServerStatus {
                ip_address: Some("203.0.113.10".to_string()),
                username: Some("root".to_string()),
                password: None,
                machine_status: MachineStatus::Active,
                power_status: PowerStatus::On,
            })
        }

        fn kind(&self) -> ProviderKind {
            ProviderKind::SkyStack
        }
    }

    #[tokio::test]
    async fn trait_can_be_implemented_by_mock_provider() {
        let provider: Box<dyn HostingProvider> = Box::new(MockProvider);
        let outcome = provider
            .provision(ProvisionRequest {
                order_id: uuid::Uuid::new_v4(),
                label: "Starter 2GB".to_string(),
                os: "ubuntu-22.04".to_string(),
                memory_mb: 2048,
            })
            .await
            .expect("provision should succeed");

        match outcome {
            ProvisionOutcome::Ready { ip_address, .. } => {
                assert_eq!(ip_address, "203.0.113.10");
            }
            other => panic!("expected Ready outcome, got {:?}", other),
        }
    }
}
