//! HTTP relay transport.
//!
//! Posts JSON to an external push gateway or email relay. One instance
//! serves one endpoint; the binary builds one per configured channel.

use std::time::Duration;

use async_trait::async_trait;
use reqwest::Client;
use serde::{Deserialize, Serialize};
use serde_json::{Value, json};
use tracing::{debug, warn};

use super::email::{EmailMessage, EmailTransport};
use super::push::{PushMessage, PushTransport};
use crate::notification::models::ChannelKind;
use crate::{Error, Result};

/// Relay endpoint configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct HttpRelayConfig {
    /// Endpoint URL.
    pub url: String,
    /// Optional bearer token.
    #[serde(default)]
    pub bearer_token: Option<String>,
    /// Request timeout in seconds.
    #[serde(default = "default_timeout")]
    pub timeout_secs: u64,
}

fn default_timeout() -> u64 {
    30
}

impl HttpRelayConfig {
    pub fn new(url: impl Into<String>) -> Self {
        Self {
            url: url.into(),
            bearer_token: None,
            timeout_secs: default_timeout(),
        }
    }
}

pub struct HttpRelayTransport {
    config: HttpRelayConfig,
    client: Client,
}

impl HttpRelayTransport {
    pub fn new(config: HttpRelayConfig) -> Result<Self> {
        if config.url.trim().is_empty() {
            return Err(Error::config("relay url must not be empty"));
        }
        let client = Client::builder()
            .timeout(Duration::from_secs(config.timeout_secs))
            .build()
            .map_err(|e| Error::config(format!("failed to build HTTP client: {e}")))?;

        Ok(Self { config, client })
    }

    /// Build the JSON payload.
    fn build_payload(&self, channel: ChannelKind, message: Value) -> Value {
        json!({
            "channel": channel.as_str(),
            "message": message,
        })
    }

    async fn post(&self, channel: ChannelKind, payload: Value) -> Result<()> {
        let mut request = self.client.post(&self.config.url).json(&payload);
        if let Some(token) = &self.config.bearer_token {
            request = request.bearer_auth(token);
        }

        let response = request
            .send()
            .await
            .map_err(|e| Error::transport(channel.as_str(), format!("request failed: {e}")))?;

        if !response.status().is_success() {
            let status = response.status();
            let body = response.text().await.unwrap_or_default();
            warn!("Relay rejected {} delivery: {} - {}", channel, status, body);
            return Err(Error::transport(
                channel.as_str(),
                format!("relay responded {status}: {body}"),
            ));
        }

        debug!("Relay accepted {} delivery", channel);
        Ok(())
    }
}

#[async_trait]
impl PushTransport for HttpRelayTransport {
    async fn send_push(&self, message: &PushMessage) -> Result<()> {
        let payload = self.build_payload(ChannelKind::Push, serde_json::to_value(message)?);
        self.post(ChannelKind::Push, payload).await
    }
}

#[async_trait]
impl EmailTransport for HttpRelayTransport {
    async fn send_email(&self, message: &EmailMessage) -> Result<()> {
        let payload = self.build_payload(ChannelKind::Email, serde_json::to_value(message)?);
        self.post(ChannelKind::Email, payload).await
    }
}
