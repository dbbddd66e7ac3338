//! Client configuration.

use crate::error::{ExchangeError, Result};
use serde::{Deserialize, Serialize};
use std::time::Duration;

/// Configuration for a [`Client`](crate::Client) and the transport it owns.
///
/// Every field has a default, so partial JSON documents are accepted by
/// [`ClientConfig::from_json`].
///
/// # Examples
///
/// ```
/// use http_exchange::client::ClientConfig;
///
/// let config = ClientConfig {
///     request_timeout_ms: 5_000,
///     ..Default::default()
/// };
/// assert_eq!(config.request_timeout().as_secs(), 5);
/// ```
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct ClientConfig {
    /// Default deadline for each exchange, in milliseconds
    pub request_timeout_ms: u64,
    /// Connection establishment timeout, in milliseconds
    pub connect_timeout_ms: u64,
    /// Number of transport I/O threads
    pub io_threads: usize,
    /// Maximum idle pooled connections per host
    pub max_idle_per_host: usize,
    /// How long `stop()` waits for outstanding exchanges, in milliseconds
    pub shutdown_grace_ms: u64,
    /// User-Agent header sent with every request
    pub user_agent: String,
    /// Proxy URL for all requests (empty for none)
    pub proxy_url: String,
}

impl Default for ClientConfig {
    fn default() -> Self {
        ClientConfig {
            request_timeout_ms: 30_000,
            connect_timeout_ms: 10_000,
            io_threads: 2,
            max_idle_per_host: 32,
            shutdown_grace_ms: 30_000,
            user_agent: concat!("http_exchange/", env!("CARGO_PKG_VERSION")).to_string(),
            proxy_url: String::new(),
        }
    }
}

impl ClientConfig {
    /// Parse a configuration from a JSON document.
    pub fn from_json(json: &str) -> Result<Self> {
        serde_json::from_str(json)
            .map_err(|e| ExchangeError::Configuration(format!("invalid client config: {}", e)))
    }

    /// Default per-exchange deadline
    pub fn request_timeout(&self) -> Duration {
        Duration::from_millis(self.request_timeout_ms)
    }

    /// Connection establishment timeout
    pub fn connect_timeout(&self) -> Duration {
        Duration::from_millis(self.connect_timeout_ms)
    }

    /// Grace period `stop()` grants outstanding exchanges
    pub fn shutdown_grace(&self) -> Duration {
        Duration::from_millis(self.shutdown_grace_ms)
    }
}
