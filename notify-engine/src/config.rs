//! Engine configuration.
//!
//! [`QueueConfig`] holds the delivery knobs fixed at construction of the
//! queue manager. [`EngineConfig`] adds process-level settings for the
//! binary and is loaded from the environment.

use std::str::FromStr;
use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::{Error, Result};

/// Default database location for the standalone binary.
pub const DEFAULT_DATABASE_URL: &str = "sqlite:notifications.db?mode=rwc";

/// Default bind address for the operator endpoint.
pub const DEFAULT_BIND_ADDRESS: &str = "0.0.0.0:8087";

/// How the delay before a retry is computed.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum RetryStrategy {
    /// Every retry waits `retry_delay_ms`.
    #[default]
    Fixed,
    /// `retry_delay_ms * 2^(attempt - 1)` with ±25% jitter, capped.
    Exponential { max_delay_ms: u64 },
}

/// Delivery configuration for the queue manager. Durations are milliseconds.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct QueueConfig {
    /// A batch fires once this many notifications have accumulated.
    pub max_batch_size: usize,
    /// A batch fires this long after its first notification arrived.
    pub batch_timeout_ms: u64,
    /// Retries allowed after the initial attempt.
    pub max_retries: u32,
    /// Delay before a failed notification re-enters the immediate lane.
    pub retry_delay_ms: u64,
    /// Steady-state dispatch rate of the immediate lane.
    pub throttle_rate_per_second: u32,
    /// Pending notifications reloaded from storage on startup.
    pub recovery_limit: u32,
    pub retry_strategy: RetryStrategy,
}

impl Default for QueueConfig {
    fn default() -> Self {
        Self {
            max_batch_size: 10,
            batch_timeout_ms: 300_000,
            max_retries: 3,
            retry_delay_ms: 30_000,
            throttle_rate_per_second: 10,
            recovery_limit: 100,
            retry_strategy: RetryStrategy::Fixed,
        }
    }
}

impl QueueConfig {
    pub fn validate(&self) -> Result<()> {
        if self.max_batch_size == 0 {
            return Err(Error::config("max_batch_size must be at least 1"));
        }
        if self.batch_timeout_ms == 0 {
            return Err(Error::config("batch_timeout_ms must be greater than 0"));
        }
        if self.throttle_rate_per_second == 0 {
            return Err(Error::config(
                "throttle_rate_per_second must be greater than 0",
            ));
        }
        if let RetryStrategy::Exponential { max_delay_ms } = self.retry_strategy
            && max_delay_ms < self.retry_delay_ms
        {
            return Err(Error::config(
                "exponential max_delay_ms must not be below retry_delay_ms",
            ));
        }
        Ok(())
    }

    pub fn batch_timeout(&self) -> Duration {
        Duration::from_millis(self.batch_timeout_ms)
    }

    pub fn retry_delay(&self) -> Duration {
        Duration::from_millis(self.retry_delay_ms)
    }

    /// Minimum gap between two dispatch starts.
    pub fn throttle_interval(&self) -> Duration {
        Duration::from_secs(1) / self.throttle_rate_per_second.max(1)
    }
}

/// Process-level configuration for the `notify-engine` binary.
#[derive(Debug, Clone)]
pub struct EngineConfig {
    pub database_url: String,
    pub bind_address: String,
    /// Directory for rolling log files; console only when unset.
    pub log_dir: Option<String>,
    /// Push gateway endpoint; push deliveries fail when unset.
    pub push_gateway_url: Option<String>,
    /// Bearer token sent to the push gateway.
    pub push_gateway_token: Option<String>,
    /// Email relay endpoint; email deliveries fail when unset.
    pub email_relay_url: Option<String>,
    /// Bearer token sent to the email relay.
    pub email_relay_token: Option<String>,
    pub transport_timeout_secs: u64,
    pub queue: QueueConfig,
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            database_url: DEFAULT_DATABASE_URL.to_string(),
            bind_address: DEFAULT_BIND_ADDRESS.to_string(),
            log_dir: None,
            push_gateway_url: None,
            push_gateway_token: None,
            email_relay_url: None,
            email_relay_token: None,
            transport_timeout_secs: 30,
            queue: QueueConfig::default(),
        }
    }
}

impl EngineConfig {
    /// Load configuration from `.env` and the process environment.
    pub fn from_env() -> Result<Self> {
        dotenvy::dotenv().ok();
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    /// Build configuration from an arbitrary key lookup.
    pub fn from_lookup<F>(lookup: F) -> Result<Self>
    where
        F: Fn(&str) -> Option<String>,
    {
        let get = |key: &str| {
            lookup(key)
                .map(|v| v.trim().to_string())
                .filter(|v| !v.is_empty())
        };

        let defaults = QueueConfig::default();
        let queue = QueueConfig {
            max_batch_size: parse_or(&get, "NOTIFY_MAX_BATCH_SIZE", defaults.max_batch_size)?,
            batch_timeout_ms: parse_or(
                &get,
                "NOTIFY_BATCH_TIMEOUT_MS",
                defaults.batch_timeout_ms,
            )?,
            max_retries: parse_or(&get, "NOTIFY_MAX_RETRIES", defaults.max_retries)?,
            retry_delay_ms: parse_or(&get, "NOTIFY_RETRY_DELAY_MS", defaults.retry_delay_ms)?,
            throttle_rate_per_second: parse_or(
                &get,
                "NOTIFY_THROTTLE_RATE_PER_SECOND",
                defaults.throttle_rate_per_second,
            )?,
            recovery_limit: parse_or(&get, "NOTIFY_RECOVERY_LIMIT", defaults.recovery_limit)?,
            retry_strategy: match get("NOTIFY_RETRY_MAX_DELAY_MS") {
                Some(raw) => RetryStrategy::Exponential {
                    max_delay_ms: parse_value("NOTIFY_RETRY_MAX_DELAY_MS", &raw)?,
                },
                None => RetryStrategy::Fixed,
            },
        };
        queue.validate()?;

        Ok(Self {
            database_url: get("DATABASE_URL").unwrap_or_else(|| DEFAULT_DATABASE_URL.to_string()),
            bind_address: get("BIND_ADDRESS").unwrap_or_else(|| DEFAULT_BIND_ADDRESS.to_string()),
            log_dir: get("LOG_DIR"),
            push_gateway_url: get("PUSH_GATEWAY_URL"),
            push_gateway_token: get("PUSH_GATEWAY_TOKEN"),
            email_relay_url: get("EMAIL_RELAY_URL"),
            email_relay_token: get("EMAIL_RELAY_TOKEN"),
            transport_timeout_secs: parse_or(&get, "TRANSPORT_TIMEOUT_SECS", 30)?,
            queue,
        })
    }
}

fn parse_or<T, G>(get: &G, key: &str, default: T) -> Result<T>
where
    T: FromStr,
    G: Fn(&str) -> Option<String>,
{
    match get(key) {
        Some(raw) => parse_value(key, &raw),
        None => Ok(default),
    }
}

fn parse_value<T: FromStr>(key: &str, raw: &str) -> Result<T> {
    raw.parse::<T>()
        .map_err(|_| Error::config(format!("{key} has an invalid value: {raw:?}")))
}
