//! RockVM hosting backend
//!
//! Legacy panel API: every call goes through one endpoint with an `action`
//! query parameter and key/pass credentials in the query string. Responses
//! are a `done`/`error` envelope wrapping a nested `vs` object, statuses are
//! numbers and power is a boolean. Servers always build asynchronously, so
//! provisioning never returns credentials inline. Status sync picks them up
//! once the build finishes.

use crate::providers::adapter::HostingProvider;
use crate::providers::error::{ProviderError, ProviderErrorCode, ProviderResult};
use crate::providers::http::ProviderHttpClient;
use crate::providers::types::{
    normalize_machine_status, PowerStatus, ProviderKind, ProvisionOutcome, ProvisionRequest,
    ServerStatus,
};
use async_trait::async_trait;
use serde::Deserialize;
use std::time::Duration;
use tracing::info;

#[derive(Debug, Clone)]
pub struct RockVmConfig {
    pub api_key: String,
    pub api_pass: String,
    pub base_url: String,
    pub timeout_secs: u64,
    pub max_retries: u32,
}

impl Default for RockVmConfig {
    fn default() -> Self {
        Self {
            api_key: String::new(),
            api_pass: String::new(),
            base_url: "https://panel.rockvm.net".to_string(),
            timeout_secs: 45,
            max_retries: 3,
        }
    }
}

impl RockVmConfig {
    pub fn from_env() -> ProviderResult<Self> {
        let api_key = std::env::var("ROCKVM_API_KEY").map_err(|_| {
            ProviderError::new(
                "rockvm",
                ProviderErrorCode::InvalidConfiguration,
                "ROCKVM_API_KEY environment variable is required",
            )
        })?;
        let api_pass = std::env::var("ROCKVM_API_PASS").map_err(|_| {
            ProviderError::new(
                "rockvm",
                ProviderErrorCode::InvalidConfiguration,
                "ROCKVM_API_PASS environment variable is required",
            )
        })?;

        Ok(Self {
            base_url: std::env::var("ROCKVM_BASE_URL")
                .unwrap_or_else(|_| "https://panel.rockvm.net".to_string()),
            timeout_secs: std::env::var("ROCKVM_TIMEOUT_SECS")
                .ok()
                .and_then(|v| v.parse::<u64>().ok())
                .unwrap_or(45),
            max_retries: std::env::var("ROCKVM_MAX_RETRIES")
                .ok()
                .and_then(|v| v.parse::<u32>().ok())
                .unwrap_or(3),
            api_key,
            api_pass,
        })
    }
}

pub struct RockVmProvider {
    config: RockVmConfig,
    http: ProviderHttpClient,
}

impl RockVmProvider {
    pub fn new(config: RockVmConfig) -> ProviderResult<Self> {
        let http = ProviderHttpClient::new(
            "rockvm",
            Duration::from_secs(config.timeout_secs),
            config.max_retries,
        )?;
        Ok(Self { config, http })
    }

    pub fn from_env() -> ProviderResult<Self> {
        Self::new(RockVmConfig::from_env()?)
    }

    fn endpoint(&self, action: &str, vid: Option<&str>) -> String {
        let mut url = format!(
            "{}/api.php?action={}&key={}&pass={}",
            self.config.base_url, action, self.config.api_key, self.config.api_pass
        );
        if let Some(vid) = vid {
            url.push_str("&vid=");
            url.push_str(vid);
        }
        url
    }

    /// The panel reports failures in prose inside the envelope; recognize
    /// the phrasings we have seen before falling back to a generic error.
    fn classify_envelope_error(message: &str) -> ProviderError {
        let lower = message.to_lowercase();
        let code = if lower.contains("rate limit") || lower.contains("too many") {
            ProviderErrorCode::RateLimited
        } else if lower.contains("ip") && (lower.contains("in use") || lower.contains("conflict")) {
            ProviderErrorCode::IpConflict
        } else if lower.contains("password") && lower.contains("weak") {
            ProviderErrorCode::WeakPassword
        } else if lower.contains("plan") || lower.contains("template") || lower.contains("invalid")
        {
            ProviderErrorCode::InvalidConfiguration
        } else {
            ProviderErrorCode::Backend
        };
        ProviderError::new("rockvm", code, message)
    }

    fn check_envelope(envelope: &RockVmEnvelope) -> ProviderResult<()> {
        if envelope.done == 1 {
            return Ok(());
        }
        let message = envelope
            .error
            .as_deref()
            .unwrap_or("panel reported failure without detail");
        Err(Self::classify_envelope_error(message))
    }

    async fn vm_action(&self, service_id: &str, action: &str) -> ProviderResult<()> {
        let envelope: RockVmEnvelope = self
            .http
            .request_json(
                reqwest::Method::POST,
                &self.endpoint(action, Some(service_id)),
                None,
                None,
            )
            .await?;
        Self::check_envelope(&envelope)
    }
}

#[async_trait]
impl HostingProvider for RockVmProvider {
    async fn provision(&self, request: ProvisionRequest) -> ProviderResult<ProvisionOutcome> {
        let payload = serde_json::json!({
            "hostname": request.label,
            "os": request.os,
            "ram": request.memory_mb,
        });

        let envelope: RockVmEnvelope = self
            .http
            .request_json(
                reqwest::Method::POST,
                &self.endpoint("vs.create", None),
                None,
                Some(&payload),
            )
            .await?;
        Self::check_envelope(&envelope)?;

        let vs = envelope.vs.ok_or_else(|| {
            ProviderError::backend("rockvm", "create response missing vs object")
        })?;

        let service_id = vs.vid.to_string();
        info!(service_id = %service_id, "rockvm build queued");

        // The panel never hands out credentials at create time
        Ok(ProvisionOutcome::Accepted { service_id })
    }

    async fn renew(&self, service_id: &str) -> ProviderResult<()> {
        self.vm_action(service_id, "vs.renew").await
    }

    async fn start(&self, service_id: &str) -> ProviderResult<()> {
        self.vm_action(service_id, "vs.start").await
    }

    async fn stop(&self, service_id: &str) -> ProviderResult<()> {
        self.vm_action(service_id, "vs.stop").await
    }

    async fn reboot(&self, service_id: &str) -> ProviderResult<()> {
        self.vm_action(service_id, "vs.restart").await
    }

    async fn format(&self, service_id: &str) -> ProviderResult<()> {
        self.vm_action(service_id, "vs.rebuild").await
    }

    async fn change_password(&self, service_id: &str, new_password: &str) -> ProviderResult<()> {
        let payload = serde_json::json!({ "new_pass": new_password });
        let envelope: RockVmEnvelope = self
            .http
            .request_json(
                reqwest::Method::POST,
                &self.endpoint("vs.password", Some(service_id)),
                None,
                Some(&payload),
            )
            .await?;
        Self::check_envelope(&envelope)
    }

    async fn get_status(&self, service_id: &str) -> ProviderResult<ServerStatus> {
        let envelope: RockVmEnvelope = self
            .http
            .request_json(
                reqwest::Method::GET,
                &self.endpoint("vs.info", Some(service_id)),
                None,
                None,
            )
            .await?;
        Self::check_envelope(&envelope)?;

        let vs = envelope
            .vs
            .ok_or_else(|| ProviderError::backend("rockvm", "info response missing vs object"))?;

        Ok(ServerStatus {
            ip_address: vs.ips.into_iter().next().filter(|ip| !ip.is_empty()),
            username: vs.username,
            password: vs.password,
            machine_status: normalize_machine_status(&vs.status.to_string()),
            power_status: match vs.power {
                Some(true) => PowerStatus::On,
                Some(false) => PowerStatus::Off,
                None => PowerStatus::Unknown,
            },
        })
    }

    fn kind(&self) -> ProviderKind {
        ProviderKind::RockVm
    }
}

#[derive(Debug, Deserialize)]
struct RockVmEnvelope {
    done: u8,
    #[serde(default)]
    error: Option<String>,
    #[serde(default)]
    vs: Option<RockVmServer>,
}

#[derive(Debug, Deserialize)]
struct RockVmServer {
    vid: u64,
    #[serde(default)]
    status: i64,
    #[serde(default)]
    power: Option<bool>,
    #[serde(default)]
    ips: Vec<String>,
    #[serde(default)]
    username: Option<String>,
    #[serde(default)]
    password: Option<String>,
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::providers::types::MachineStatus;

    #[test]
    fn envelope_error_classification_matches_known_phrasings() {
        let err = RockVmProvider::classify_envelope_error("IP 103.87.0.4 already in use");
        assert_eq!(err.code, ProviderErrorCode::IpConflict);
        assert!(err.is_retryable());

        let err = RockVmProvider::classify_envelope_error("invalid template selected");
        assert_eq!(err.code, ProviderErrorCode::InvalidConfiguration);
        assert!(!err.is_retryable());
    }

    #[test]
    fn numeric_statuses_normalize() {
        assert_eq!(normalize_machine_status("1"), MachineStatus::Active);
        assert_eq!(normalize_machine_status("2"), MachineStatus::Provisioning);
        assert_eq!(normalize_machine_status("3"), MachineStatus::Failed);
    }

    #[test]
    fn info_envelope_deserializes_with_credentials() {
        let raw: RockVmEnvelope = serde_json::from_str(
            r#"{"done":1,"vs":{"vid":42,"status":1,"power":true,"ips":["103.87.0.9"],"username":"root","password":"pw"}}"#,
        )
        .expect("deserialization should succeed");
        let vs = raw.vs.expect("vs object present");
        assert_eq!(vs.vid, 42);
        assert_eq!(vs.ips[0], "103.87.0.9");
    }
}
