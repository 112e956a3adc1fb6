//! SkyStack hosting backend
//!
//! REST API with bearer-token auth and flat JSON payloads. SkyStack builds
//! synchronously most of the time: a successful create usually returns the
//! IP and root credentials inline, but under load it answers with
//! `state = "installing"` and no address, in which case the order is left
//! for status sync to complete.

use crate::providers::adapter::HostingProvider;
use crate::providers::error::{ProviderError, ProviderErrorCode, ProviderResult};
use crate::providers::http::ProviderHttpClient;
use crate::providers::types::{
    normalize_machine_status, normalize_power_status, ProviderKind, ProvisionOutcome,
    ProvisionRequest, ServerStatus,
};
use async_trait::async_trait;
use serde::Deserialize;
use std::time::Duration;
use tracing::info;

#[derive(Debug, Clone)]
pub struct SkyStackConfig {
    pub api_token: String,
    pub base_url: String,
    pub timeout_secs: u64,
    pub max_retries: u32,
}

impl Default for SkyStackConfig {
    fn default() -> Self {
        Self {
            api_token: String::new(),
            base_url: "https://api.skystack.cloud".to_string(),
            timeout_secs: 30,
            max_retries: 3,
        }
    }
}

impl SkyStackConfig {
    pub fn from_env() -> ProviderResult<Self> {
        let api_token = std::env::var("SKYSTACK_API_TOKEN").map_err(|_| {
            ProviderError::new(
                "skystack",
                ProviderErrorCode::InvalidConfiguration,
                "SKYSTACK_API_TOKEN environment variable is required",
            )
        })?;

        Ok(Self {
            base_url: std::env::var("SKYSTACK_BASE_URL")
                .unwrap_or_else(|_| "https://api.skystack.cloud".to_string()),
            timeout_secs: std::env::var("SKYSTACK_TIMEOUT_SECS")
                .ok()
                .and_then(|v| v.parse::<u64>().ok())
                .unwrap_or(30),
            max_retries: std::env::var("SKYSTACK_MAX_RETRIES")
                .ok()
                .and_then(|v| v.parse::<u32>().ok())
                .unwrap_or(3),
            api_token,
        })
    }
}

pub struct SkyStackProvider {
    config: SkyStackConfig,
    http: ProviderHttpClient,
}

impl SkyStackProvider {
    pub fn new(config: SkyStackConfig) -> ProviderResult<Self> {
        let http = ProviderHttpClient::new(
            "skystack",
            Duration::from_secs(config.timeout_secs),
            config.max_retries,
        )?;
        Ok(Self { config, http })
    }

    pub fn from_env() -> ProviderResult<Self> {
        Self::new(SkyStackConfig::from_env()?)
    }

    fn endpoint(&self, path: &str) -> String {
        format!("{}{}", self.config.base_url, path)
    }

    /// SkyStack error payloads carry a machine code alongside the prose;
    /// map the codes we know onto structured errors.
    fn classify_vendor_error(code: Option<&str>, message: &str) -> ProviderError {
        let mapped = match code {
            Some("rate_limited") | Some("too_many_requests") => ProviderErrorCode::RateLimited,
            Some("ip_pool_conflict") => ProviderErrorCode::IpConflict,
            Some("password_policy") => ProviderErrorCode::WeakPassword,
            Some("invalid_plan") | Some("invalid_template") => {
                ProviderErrorCode::InvalidConfiguration
            }
            _ => ProviderErrorCode::Backend,
        };
        ProviderError::new("skystack", mapped, message)
    }

    async fn simple_action(&self, service_id: &str, action: &str) -> ProviderResult<()> {
        let payload = serde_json::json!({ "action": action });
        let raw: SkyStackActionResponse = self
            .http
            .request_json(
                reqwest::Method::POST,
                &self.endpoint(&format!("/v1/servers/{}/power", service_id)),
                Some(&self.config.api_token),
                Some(&payload),
            )
            .await?;

        if raw.ok {
            Ok(())
        } else {
            Err(Self::classify_vendor_error(
                raw.code.as_deref(),
                &raw.message.unwrap_or_else(|| format!("{} failed", action)),
            ))
        }
    }
}

#[async_trait]
impl HostingProvider for SkyStackProvider {
    async fn provision(&self, request: ProvisionRequest) -> ProviderResult<ProvisionOutcome> {
        let payload = serde_json::json!({
            "label": request.label,
            "template": request.os,
            "memory_mb": request.memory_mb,
        });

        let raw: SkyStackServer = self
            .http
            .request_json(
                reqwest::Method::POST,
                &self.endpoint("/v1/servers"),
                Some(&self.config.api_token),
                Some(&payload),
            )
            .await?;

        if let Some(code) = raw.error_code.as_deref() {
            return Err(Self::classify_vendor_error(
                Some(code),
                raw.error.as_deref().unwrap_or("server creation failed"),
            ));
        }

        info!(service_id = %raw.id, state = %raw.state, "skystack server created");

        match (raw.ip, raw.root_user, raw.root_password) {
            (Some(ip), Some(user), Some(pass)) if !ip.trim().is_empty() => {
                Ok(ProvisionOutcome::Ready {
                    service_id: raw.id,
                    ip_address: ip,
                    username: user,
                    password: pass,
                })
            }
            _ => Ok(ProvisionOutcome::Accepted { service_id: raw.id }),
        }
    }

    async fn renew(&self, service_id: &str) -> ProviderResult<()> {
        let raw: SkyStackActionResponse = self
            .http
            .request_json(
                reqwest::Method::POST,
                &self.endpoint(&format!("/v1/servers/{}/renew", service_id)),
                Some(&self.config.api_token),
                None,
            )
            .await?;

        if raw.ok {
            Ok(())
        } else {
            Err(Self::classify_vendor_error(
                raw.code.as_deref(),
                &raw.message.unwrap_or_else(|| "renew failed".to_string()),
            ))
        }
    }

    async fn start(&self, service_id: &str) -> ProviderResult<()> {
        self.simple_action(service_id, "start").await
    }

    async fn stop(&self, service_id: &str) -> ProviderResult<()> {
        self.simple_action(service_id, "stop").await
    }

    async fn reboot(&self, service_id: &str) -> ProviderResult<()> {
        self.simple_action(service_id, "reboot").await
    }

    async fn format(&self, service_id: &str) -> ProviderResult<()> {
        let raw: SkyStackActionResponse = self
            .http
            .request_json(
                reqwest::Method::POST,
                &self.endpoint(&format!("/v1/servers/{}/rebuild", service_id)),
                Some(&self.config.api_token),
                None,
            )
            .await?;

        if raw.ok {
            Ok(())
        } else {
            Err(Self::classify_vendor_error(
                raw.code.as_deref(),
                &raw.message.unwrap_or_else(|| "rebuild failed".to_string()),
            ))
        }
    }

    async fn change_password(&self, service_id: &str, new_password: &str) -> ProviderResult<()> {
        let payload = serde_json::json!({ "password": new_password });
        let raw: SkyStackActionResponse = self
            .http
            .request_json(
                reqwest::Method::POST,
                &self.endpoint(&format!("/v1/servers/{}/password", service_id)),
                Some(&self.config.api_token),
                Some(&payload),
            )
            .await?;

        if raw.ok {
            Ok(())
        } else {
            Err(Self::classify_vendor_error(
                raw.code.as_deref(),
                &raw
                    .message
                    .unwrap_or_else(|| "password change failed".to_string()),
            ))
        }
    }

    async fn get_status(&self, service_id: &str) -> ProviderResult<ServerStatus> {
        let raw: SkyStackServer = self
            .http
            .request_json(
                reqwest::Method::GET,
                &self.endpoint(&format!("/v1/servers/{}", service_id)),
                Some(&self.config.api_token),
                None,
            )
            .await?;

        Ok(ServerStatus {
            ip_address: raw.ip.filter(|ip| !ip.trim().is_empty()),
            username: raw.root_user,
            password: raw.root_password,
            machine_status: normalize_machine_status(&raw.state),
            power_status: raw
                .power
                .as_deref()
                .map(normalize_power_status)
                .unwrap_or(crate::providers::types::PowerStatus::Unknown),
        })
    }

    fn kind(&self) -> ProviderKind {
        ProviderKind::SkyStack
    }
}

#[derive(Debug, Deserialize)]
struct SkyStackServer {
    id: String,
    state: String,
    #[serde(default)]
    power: Option<String>,
    #[serde(default)]
    ip: Option<String>,
    #[serde(default)]
    root_user: Option<String>,
    #[serde(default)]
    root_password: Option<String>,
    #[serde(default)]
    error: Option<String>,
    #[serde(default)]
    error_code: Option<String>,
}

#[derive(Debug, Deserialize)]
struct SkyStackActionResponse {
    ok: bool,
    #[serde(default)]
    code: Option<String>,
    #[serde(default)]
    message: Option<String>,
}
