//! Shared hosting-provider types
//!
//! Each backend speaks its own dialect (string statuses, numeric statuses,
//! booleans, nested envelopes); everything is normalized into the types here
//! before it leaves the adapter, so the orchestrator never branches on
//! provider identity except to pick the adapter instance.

use crate::providers::error::ProviderError;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;
use tracing::warn;

/// Hosting backend identity
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ProviderKind {
    SkyStack,
    RockVm,
    Manual,
}

impl ProviderKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            ProviderKind::SkyStack => "skystack",
            ProviderKind::RockVm => "rockvm",
            ProviderKind::Manual => "manual",
        }
    }
}

impl fmt::Display for ProviderKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

impl FromStr for ProviderKind {
    type Err = ProviderError;

    fn from_str(value: &str) -> Result<Self, Self::Err> {
        match value.trim().to_lowercase().as_str() {
            "skystack" => Ok(ProviderKind::SkyStack),
            "rockvm" | "rock-vm" => Ok(ProviderKind::RockVm),
            "manual" => Ok(ProviderKind::Manual),
            other => Err(ProviderError::new(
                "registry",
                crate::providers::error::ProviderErrorCode::InvalidConfiguration,
                format!("unsupported provider: {}", other),
            )),
        }
    }
}

/// Normalized machine lifecycle status
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum MachineStatus {
    Active,
    Suspended,
    Provisioning,
    Failed,
    Terminated,
    /// Token the normalization table doesn't know. Logged and never acted
    /// on; the order keeps its current state.
    Unrecognized(String),
}

impl MachineStatus {
    pub fn is_actionable(&self) -> bool {
        !matches!(self, MachineStatus::Unrecognized(_))
    }
}

/// Normalized power state
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PowerStatus {
    On,
    Off,
    Unknown,
}

/// Total mapping from backend status vocabulary to `MachineStatus`.
///
/// Accepts the union of tokens the known backends emit (strings, stringified
/// numbers and booleans). Anything else is preserved as `Unrecognized` rather
/// than guessed.
pub fn normalize_machine_status(token: &str) -> MachineStatus {
    match token.trim().to_lowercase().as_str() {
        "online" | "running" | "active" | "on" | "1" | "true" => MachineStatus::Active,
        "offline" | "stopped" | "suspended" | "off" | "0" | "false" => MachineStatus::Suspended,
        "installing" | "provisioning" | "building" | "creating" | "2" => {
            MachineStatus::Provisioning
        }
        "failed" | "error" | "3" => MachineStatus::Failed,
        "terminated" | "deleted" | "destroyed" => MachineStatus::Terminated,
        other => {
            warn!(token = %other, "unrecognized machine status token, leaving unmapped");
            MachineStatus::Unrecognized(other.to_string())
        }
    }
}

pub fn normalize_power_status(token: &str) -> PowerStatus {
    match token.trim().to_lowercase().as_str() {
        "on" | "online" | "running" | "1" | "true" => PowerStatus::On,
        "off" | "offline" | "stopped" | "0" | "false" => PowerStatus::Off,
        _ => PowerStatus::Unknown,
    }
}

/// What a provision call needs, independent of backend
#[derive(Debug, Clone)]
pub struct ProvisionRequest {
    pub order_id: uuid::Uuid,
    /// Display label on the backend, usually the product name
    pub label: String,
    pub os: String,
    pub memory_mb: i32,
}

/// Result of a provision call
#[derive(Debug, Clone)]
pub enum ProvisionOutcome {
    /// Server exists and credentials are available now
    Ready {
        service_id: String,
        ip_address: String,
        username: String,
        password: String,
    },
    /// Backend accepted the request but builds asynchronously; credentials
    /// surface later via status sync
    Accepted { service_id: String },
    /// No backend API; a human fulfils the order
    ManualFulfillment,
}

/// Normalized live state of a server
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ServerStatus {
    pub ip_address: Option<String>,
    pub username: Option<String>,
    pub password: Option<String>,
    pub machine_status: MachineStatus,
    pub power_status: PowerStatus,
}
