//! Direct server control
//!
//! Executes start/stop/reboot/format/changepassword against the provider
//! adapter for auto-provisioned orders. Orders without a backend API are
//! refused here and belong in the manual action queue.

use crate::database::action_request_repository::ServerAction;
use crate::database::order_repository::{OrderStore, ProvisioningStatus};
use crate::error::{AppError, AppErrorKind, DomainError};
use crate::providers::registry::ProviderRegistry;
use crate::providers::types::{MachineStatus, ProviderKind, ServerStatus};
use std::str::FromStr;
use std::sync::Arc;
use tracing::info;
use uuid::Uuid;

pub struct ServerControlService {
    store: Arc<dyn OrderStore>,
    registry: Arc<ProviderRegistry>,
}

impl ServerControlService {
    pub fn new(store: Arc<dyn OrderStore>, registry: Arc<ProviderRegistry>) -> Self {
        Self { store, registry }
    }

    async fn resolve(
        &self,
        order_id: Uuid,
    ) -> Result<(ProviderKind, String), AppError> {
        let order = self.store.find_by_id(order_id).await?.ok_or_else(|| {
            AppError::new(AppErrorKind::Domain(DomainError::OrderNotFound {
                order_id: order_id.to_string(),
            }))
        })?;

        let (provider, service_id) = match (&order.provider, &order.provider_service_id) {
            (Some(provider), Some(service_id)) => (provider.clone(), service_id.clone()),
            _ => {
                return Err(AppError::new(AppErrorKind::Domain(
                    DomainError::ActionNotPermitted {
                        order_id: order_id.to_string(),
                        reason: "order has no provisioned server".to_string(),
                    },
                )))
            }
        };

        let kind = ProviderKind::from_str(&provider).map_err(AppError::from)?;
        if kind == ProviderKind::Manual {
            return Err(AppError::new(AppErrorKind::Domain(
                DomainError::ActionNotPermitted {
                    order_id: order_id.to_string(),
                    reason: "manually-managed order; submit a server action request instead"
                        .to_string(),
                },
            )));
        }

        Ok((kind, service_id))
    }

    pub async fn perform(
        &self,
        order_id: Uuid,
        action: ServerAction,
        new_password: Option<&str>,
    ) -> Result<(), AppError> {
        let (kind, service_id) = self.resolve(order_id).await?;
        let provider = self.registry.get(kind)?;

        match action {
            ServerAction::Start => provider.start(&service_id).await?,
            ServerAction::Stop => provider.stop(&service_id).await?,
            ServerAction::Restart => provider.reboot(&service_id).await?,
            ServerAction::Format | ServerAction::Reinstall => {
                provider.format(&service_id).await?
            }
            ServerAction::ChangePassword => {
                let password = new_password.ok_or_else(|| {
                    AppError::new(AppErrorKind::Validation(
                        crate::error::ValidationError::MissingField {
                            field: "new_password".to_string(),
                        },
                    ))
                })?;
                provider.change_password(&service_id, password).await?;
            }
        }

        // Explicit suspend/terminate style transitions only ever come from
        // actions, never from inference
        match action {
            ServerAction::Stop => {
                self.store
                    .update_provisioning_status(order_id, ProvisioningStatus::Suspended)
                    .await?;
            }
            ServerAction::Start => {
                self.store
                    .update_provisioning_status(order_id, ProvisioningStatus::Active)
                    .await?;
            }
            _ => {}
        }

        info!(order_id = %order_id, action = action.as_str(), "server action executed");
        Ok(())
    }

    pub async fn live_status(&self, order_id: Uuid) -> Result<ServerStatus, AppError> {
        let (kind, service_id) = self.resolve(order_id).await?;
        let provider = self.registry.get(kind)?;
        let status = provider.get_status(&service_id).await?;

        if let MachineStatus::Unrecognized(ref token) = status.machine_status {
            tracing::warn!(order_id = %order_id, token = %token, "live status carries unmapped token");
        }
        Ok(status)
    }
}
