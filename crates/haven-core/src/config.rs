//! Client configuration

use serde::{Deserialize, Serialize};
use std::path::Path;
use std::time::Duration;
use url::Url;

use haven_protocol::RetryPolicy;

use crate::error::CoreError;
use crate::Result;

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
    /// Base URL of the REST API
    pub api_base_url: String,
    /// Websocket endpoint of the realtime service
    pub realtime_url: String,
    /// Per-request timeout for REST calls
    pub request_timeout_secs: u64,
    pub unread_poll: PollConfig,
    /// Backoff around websocket connect and reconnect
    pub reconnect: RetryPolicy,
}

/// Periodic unread-count poll. An interval of zero disables it.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct PollConfig {
    pub interval_secs: u64,
    /// Ceiling for the delay after consecutive failures
    pub max_backoff_secs: u64,
}

impl PollConfig {
    pub fn schedule(&self) -> Option<RetryPolicy> {
        if self.interval_secs == 0 {
            return None;
        }

        Some(RetryPolicy::new(
            Duration::from_secs(self.interval_secs),
            Duration::from_secs(self.max_backoff_secs),
            u32::MAX,
        ))
    }
}

impl Default for PollConfig {
    fn default() -> Self {
        Self {
            interval_secs: 30,
            max_backoff_secs: 300,
        }
    }
}

impl Config {
    /// Load a JSON configuration file. Missing fields take their defaults.
    pub fn load(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        let text = std::fs::read_to_string(path)?;
        let config: Config = serde_json::from_str(&text)?;
        config.validate()?;

        tracing::debug!(path = %path.display(), "Configuration loaded");

        Ok(config)
    }

    pub fn validate(&self) -> Result<()> {
        check_url("api_base_url", &self.api_base_url, &["http", "https"])?;
        check_url("realtime_url", &self.realtime_url, &["ws", "wss"])?;

        if self.request_timeout_secs == 0 {
            return Err(CoreError::Config(
                "request_timeout_secs must be positive".to_string(),
            ));
        }

        Ok(())
    }

    pub fn request_timeout(&self) -> Duration {
        Duration::from_secs(self.request_timeout_secs)
    }
}

impl Default for Config {
    fn default() -> Self {
        Self {
            api_base_url: "http://localhost:3000/api".to_string(),
            realtime_url: "ws://localhost:3000/ws".to_string(),
            request_timeout_secs: 10,
            unread_poll: PollConfig::default(),
            reconnect: RetryPolicy::default(),
        }
    }
}

fn check_url(field: &str, value: &str, schemes: &[&str]) -> Result<()> {
    let url = Url::parse(value).map_err(|e| CoreError::Config(format!("{field}: {e}")))?;
    if !schemes.contains(&url.scheme()) {
        return Err(CoreError::Config(format!(
            "{field}: unsupported scheme {}",
            url.scheme()
        )));
    }
    Ok(())
}
