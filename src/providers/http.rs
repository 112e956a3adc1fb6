//! Shared HTTP client for hosting-provider APIs
//!
//! Bounded retries with exponential backoff on 429 and 5xx responses; every
//! failure is translated into a structured `ProviderError`.

use crate::providers::error::{ProviderError, ProviderErrorCode, ProviderResult};
use reqwest::Client;
use serde::de::DeserializeOwned;
use serde_json::Value as JsonValue;
use std::time::Duration;
use tracing::warn;

#[derive(Clone)]
pub struct ProviderHttpClient {
    client: Client,
    provider: &'static str,
    timeout: Duration,
    max_retries: u32,
}

impl ProviderHttpClient {
    pub fn new(
        provider: &'static str,
        timeout: Duration,
        max_retries: u32,
    ) -> ProviderResult<Self> {
        let client = Client::builder().timeout(timeout).build().map_err(|e| {
            ProviderError::network(provider, format!("failed to initialize HTTP client: {}", e))
        })?;

        Ok(Self {
            client,
            provider,
            timeout,
            max_retries,
        })
    }

    pub async fn request_json<T: DeserializeOwned>(
        &self,
        method: reqwest::Method,
        url: &str,
        bearer_token: Option<&str>,
        body: Option<&JsonValue>,
    ) -> ProviderResult<T> {
        let mut last_error = None;
        for attempt in 0..=self.max_retries {
            let mut request = self.client.request(method.clone(), url);
            request = request.timeout(self.timeout);

            if let Some(token) = bearer_token {
                request = request.bearer_auth(token);
            }
            if let Some(payload) = body {
                request = request.json(payload);
            }

            let response = request.send().await.map_err(|e| {
                if e.is_timeout() {
                    ProviderError::timeout(self.provider, format!("request timed out: {}", e))
                } else {
                    ProviderError::network(self.provider, format!("request failed: {}", e))
                }
            });

            match response {
                Ok(resp) => {
                    let status = resp.status();
                    let text = resp.text().await.unwrap_or_default();
                    if status.is_success() {
                        return serde_json::from_str::<T>(&text).map_err(|e| {
                            ProviderError::backend(
                                self.provider,
                                format!("invalid JSON response: {}", e),
                            )
                        });
                    }

                    if status.as_u16() == 429 {
                        if attempt < self.max_retries {
                            tokio::time::sleep(Duration::from_secs(1 << attempt)).await;
                            continue;
                        }
                        return Err(ProviderError::rate_limited(
                            self.provider,
                            "rate limit exceeded",
                        ));
                    }

                    if status.is_server_error() && attempt < self.max_retries {
                        warn!(
                            provider = self.provider,
                            status = %status,
                            attempt = attempt + 1,
                            "provider server error, retrying"
                        );
                        tokio::time::sleep(Duration::from_secs(1 << attempt)).await;
                        continue;
                    }

                    let code = if status.as_u16() == 401 || status.as_u16() == 403 {
                        ProviderErrorCode::AuthFailed
                    } else if status.is_server_error() {
                        ProviderErrorCode::Network
                    } else {
                        ProviderErrorCode::Backend
                    };
                    return Err(ProviderError::new(
                        self.provider,
                        code,
                        format!("HTTP {}: {}", status, text),
                    ));
                }
                Err(e) => {
                    last_error = Some(e);
                    if attempt < self.max_retries {
                        tokio::time::sleep(Duration::from_secs(1 << attempt)).await;
                        continue;
                    }
                }
            }
        }

        Err(last_error
            .unwrap_or_else(|| ProviderError::network(self.provider, "request failed")))
    }
}
