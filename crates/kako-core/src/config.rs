//! Client configuration types.
//!
//! Loaded from `~/.config/kako/config.toml` by the infrastructure layer.
//! Every field has a default so a missing or partial file still yields a
//! usable configuration.

use serde::{Deserialize, Serialize};
use std::time::Duration;

use crate::reconnect::ReconnectPolicy;

pub const DEFAULT_SERVER_URL: &str = "http://127.0.0.1:18880";

/// Root configuration for the client.
#[derive(Deserialize, Serialize, Debug, Clone, PartialEq)]
#[serde(default)]
pub struct ClientConfig {
    /// Origin of the dashboard backend. `https` selects `wss` channels.
    pub server_url: String,
    pub reconnect: ReconnectConfig,
    pub connect_timeout_ms: u64,
    /// Maximum events buffered per detached surface.
    pub pending_queue_capacity: usize,
    pub log_level: String,
}

impl Default for ClientConfig {
    fn default() -> Self {
        Self {
            server_url: DEFAULT_SERVER_URL.to_string(),
            reconnect: ReconnectConfig::default(),
            connect_timeout_ms: 10_000,
            pending_queue_capacity: 1000,
            log_level: "info".to_string(),
        }
    }
}

impl ClientConfig {
    pub fn connect_timeout(&self) -> Duration {
        Duration::from_millis(self.connect_timeout_ms)
    }

    pub fn reconnect_policy(&self) -> ReconnectPolicy {
        ReconnectPolicy::new(
            self.reconnect.max_attempts,
            Duration::from_millis(self.reconnect.base_delay_ms),
        )
    }
}

#[derive(Deserialize, Serialize, Debug, Clone, PartialEq, Eq)]
#[serde(default)]
pub struct ReconnectConfig {
    pub max_attempts: u32,
    pub base_delay_ms: u64,
}

impl Default for ReconnectConfig {
    fn default() -> Self {
        Self {
            max_attempts: 5,
            base_delay_ms: 1000,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn partial_toml_keeps_defaults() {
        let config: ClientConfig = toml::from_str(
            r#"
server_url = "https://kako.example.com"

[reconnect]
base_delay_ms = 250
"#,
        )
        .unwrap();

        assert_eq!(config.server_url, "https://kako.example.com");
        assert_eq!(config.reconnect.max_attempts, 5);
        assert_eq!(config.reconnect.base_delay_ms, 250);
        assert_eq!(config.pending_queue_capacity, 1000);
        assert_eq!(config.connect_timeout(), Duration::from_secs(10));
    }

    #[test]
    fn empty_toml_is_default() {
        let config: ClientConfig = toml::from_str("").unwrap();
        assert_eq!(config, ClientConfig::default());
    }
}
