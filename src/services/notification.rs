//! Notification contract
//!
//! Outbound email/Telegram formatting lives in a separate system; this is
//! the narrow seam the orchestration core talks through. The default
//! implementation just logs with structure so events are visible in
//! development and in log-based alerting.

use crate::database::order_repository::Order;
use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use tracing::{error, info, warn};

#[derive(Debug, Clone, Serialize, Deserialize)]
pub enum NotificationEvent {
    PaymentConfirmed,
    ProvisioningSucceeded,
    ProvisioningFailed,
    RenewalApplied,
    RenewalProviderFailed,
    ManualActionRequested,
}

#[async_trait]
pub trait Notifier: Send + Sync {
    async fn notify(&self, event: NotificationEvent, order: &Order, message: &str);
}

pub struct LogNotifier;

impl LogNotifier {
    pub fn new() -> Self {
        Self
    }
}

impl Default for LogNotifier {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl Notifier for LogNotifier {
    async fn notify(&self, event: NotificationEvent, order: &Order, message: &str) {
        match event {
            NotificationEvent::PaymentConfirmed => {
                info!(
                    order_id = %order.id,
                    user_id = %order.user_id,
                    product = %order.product_name,
                    "🔔 NOTIFICATION: Payment Confirmed - {}", message
                );
            }
            NotificationEvent::ProvisioningSucceeded => {
                info!(
                    order_id = %order.id,
                    user_id = %order.user_id,
                    ip = order.ip_address.as_deref().unwrap_or("-"),
                    "🔔 NOTIFICATION: Server Ready - {}", message
                );
            }
            NotificationEvent::ProvisioningFailed => {
                error!(
                    order_id = %order.id,
                    user_id = %order.user_id,
                    "🔔 NOTIFICATION: Provisioning Failed - {}", message
                );
            }
            NotificationEvent::RenewalApplied => {
                info!(
                    order_id = %order.id,
                    user_id = %order.user_id,
                    "🔔 NOTIFICATION: Renewal Applied - {}", message
                );
            }
            NotificationEvent::RenewalProviderFailed => {
                warn!(
                    order_id = %order.id,
                    user_id = %order.user_id,
                    "🔔 NOTIFICATION: Renewal Needs Attention - {}", message
                );
            }
            NotificationEvent::ManualActionRequested => {
                info!(
                    order_id = %order.id,
                    user_id = %order.user_id,
                    "🔔 NOTIFICATION: Manual Action Requested - {}", message
                );
            }
        }
    }
}
