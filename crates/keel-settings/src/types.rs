//! Settings types.
//!
//! Every struct uses `#[serde(rename_all = "camelCase", default)]` so a
//! partial settings file fills the remaining fields from compiled defaults.

use serde::{Deserialize, Serialize};

/// Root settings object (`~/.keel/settings.json`).
#[derive(Clone, Debug, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct KeelSettings {
    /// HTTP / WebSocket listener settings.
    pub server: ServerSettings,
    /// Upstream provisioner connection settings.
    pub provisioner: ProvisionerSettings,
    /// Bridge session settings.
    pub bridge: BridgeSettings,
    /// Logging settings.
    pub logging: LoggingSettings,
}

/// Server network and WebSocket settings.
#[derive(Clone, Debug, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct ServerSettings {
    /// Bind address.
    pub host: String,
    /// Listen port. `0` picks an ephemeral port.
    pub port: u16,
    /// Maximum number of concurrent bridge sessions.
    pub max_connections: usize,
    /// Interval between WebSocket pings, in milliseconds.
    pub heartbeat_interval_ms: u64,
    /// Silence (no inbound frame) after which the client is considered gone.
    pub heartbeat_timeout_ms: u64,
    /// Largest outbound frame, in bytes.
    pub max_message_size: usize,
}

impl Default for ServerSettings {
    fn default() -> Self {
        Self {
            host: "0.0.0.0".to_string(),
            port: 8080,
            max_connections: 1000,
            heartbeat_interval_ms: 30_000,
            heartbeat_timeout_ms: 60_000,
            max_message_size: 1024 * 1024,
        }
    }
}

/// Provisioner gRPC endpoint settings.
#[derive(Clone, Debug, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct ProvisionerSettings {
    /// Endpoint URI of the provisioner service.
    pub endpoint: String,
    /// Connect timeout in milliseconds.
    pub connect_timeout_ms: u64,
    /// TCP keepalive in seconds. `0` disables it.
    pub tcp_keepalive_secs: u64,
    /// HTTP/2 keepalive ping interval in seconds.
    pub http2_keepalive_interval_secs: u64,
    /// HTTP/2 keepalive ack timeout in seconds.
    pub http2_keepalive_timeout_secs: u64,
}

impl Default for ProvisionerSettings {
    fn default() -> Self {
        Self {
            endpoint: "http://localhost:8082".to_string(),
            connect_timeout_ms: 5_000,
            tcp_keepalive_secs: 60,
            http2_keepalive_interval_secs: 30,
            http2_keepalive_timeout_secs: 20,
        }
    }
}

/// Bridge session settings.
#[derive(Clone, Debug, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct BridgeSettings {
    /// How long teardown waits for both pumps before aborting them.
    pub drain_timeout_ms: u64,
}

impl Default for BridgeSettings {
    fn default() -> Self {
        Self {
            drain_timeout_ms: 5_000,
        }
    }
}

/// Logging settings.
#[derive(Clone, Debug, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct LoggingSettings {
    /// Base log level (`trace`..`error`). `RUST_LOG` takes precedence.
    pub level: String,
    /// Emit JSON lines instead of human-readable output.
    pub json: bool,
    /// Per-module level overrides, e.g. `{"keel_bridge": "debug"}`.
    pub modules: Vec<(String, String)>,
}

impl Default for LoggingSettings {
    fn default() -> Self {
        Self {
            level: "info".to_string(),
            json: false,
            modules: Vec::new(),
        }
    }
}
