//! Server configuration.

use std::time::Duration;

use keel_settings::ServerSettings;
use serde::{Deserialize, Serialize};

use crate::websocket::channel::{ChannelConfig, MIN_HEARTBEAT_INTERVAL};

/// Configuration for the Keel server.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct ServerConfig {
    /// Host to bind.
    pub host: String,
    /// Port to bind (`0` for auto-assign).
    pub port: u16,
    /// Maximum concurrent state streams.
    pub max_connections: usize,
    /// WebSocket ping interval in milliseconds.
    pub heartbeat_interval_ms: u64,
    /// Silence after which a client is considered gone, in milliseconds.
    pub heartbeat_timeout_ms: u64,
    /// Max WebSocket message size in bytes, both directions.
    pub max_message_size: usize,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            host: "127.0.0.1".into(),
            port: 0,
            max_connections: 1000,
            heartbeat_interval_ms: 30_000,
            heartbeat_timeout_ms: 60_000,
            max_message_size: 1024 * 1024,
        }
    }
}

impl From<&ServerSettings> for ServerConfig {
    fn from(settings: &ServerSettings) -> Self {
        Self {
            host: settings.host.clone(),
            port: settings.port,
            max_connections: settings.max_connections,
            heartbeat_interval_ms: settings.heartbeat_interval_ms,
            heartbeat_timeout_ms: settings.heartbeat_timeout_ms,
            max_message_size: settings.max_message_size,
        }
    }
}

impl ServerConfig {
    /// `host:port` bind address.
    pub fn bind_addr(&self) -> String {
        format!("{}:{}", self.host, self.port)
    }

    /// Per-connection WebSocket settings.
    pub fn channel_config(&self) -> ChannelConfig {
        ChannelConfig {
            heartbeat_interval: Duration::from_millis(self.heartbeat_interval_ms)
                .max(MIN_HEARTBEAT_INTERVAL),
            heartbeat_timeout: Duration::from_millis(self.heartbeat_timeout_ms),
            max_message_size: self.max_message_size,
            ..ChannelConfig::default()
        }
    }
}
