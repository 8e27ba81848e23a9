//! # keel-agent
//!
//! Keel relay binary: loads settings, installs telemetry, connects the
//! provisioner client and serves state streams until interrupted.

#![deny(unsafe_code)]

use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

use anyhow::{Context, Result};
use clap::Parser;
use keel_bridge::BridgeConfig;
use keel_provisioner::{ProvisionerConfig, ProvisionerConnector};
use keel_server::shutdown::DEFAULT_SHUTDOWN_TIMEOUT;
use keel_server::{KeelServer, ServerConfig};
use keel_settings::KeelSettings;
use keel_telemetry::TelemetryConfig;

/// Keel provisioning state relay.
#[derive(Parser, Debug)]
#[command(name = "keel-agent", about = "Relay provisioner state streams to WebSocket clients")]
struct Cli {
    /// Settings file (defaults to `~/.keel/settings.json`).
    #[arg(long, env = "KEEL_CONFIG")]
    config: Option<PathBuf>,

    /// Host to bind (overrides settings).
    #[arg(long)]
    host: Option<String>,

    /// Port to bind (overrides settings).
    #[arg(long)]
    port: Option<u16>,

    /// Provisioner gRPC endpoint (overrides settings).
    #[arg(long)]
    provisioner_endpoint: Option<String>,

    /// Log level (overrides settings).
    #[arg(long)]
    log_level: Option<String>,

    /// Emit JSON logs.
    #[arg(long)]
    json_logs: bool,
}

impl Cli {
    fn load_settings(&self) -> Result<KeelSettings> {
        let path = self
            .config
            .clone()
            .unwrap_or_else(keel_settings::settings_path);
        let mut settings = keel_settings::load_settings_from_path(&path)
            .with_context(|| format!("Failed to load settings from {}", path.display()))?;
        self.apply_overrides(&mut settings);
        keel_settings::validate(&settings).context("Invalid settings after CLI overrides")?;
        Ok(settings)
    }

    fn apply_overrides(&self, settings: &mut KeelSettings) {
        if let Some(host) = &self.host {
            settings.server.host.clone_from(host);
        }
        if let Some(port) = self.port {
            settings.server.port = port;
        }
        if let Some(endpoint) = &self.provisioner_endpoint {
            settings.provisioner.endpoint.clone_from(endpoint);
        }
        if let Some(level) = &self.log_level {
            settings.logging.level.clone_from(level);
        }
        if self.json_logs {
            settings.logging.json = true;
        }
    }
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();
    let settings = cli.load_settings()?;

    let telemetry =
        TelemetryConfig::from_settings(&settings.logging).context("Invalid logging settings")?;
    keel_telemetry::init_telemetry(&telemetry).context("Failed to initialize logging")?;
    let metrics = keel_telemetry::install_recorder().context("Failed to install metrics")?;

    let provisioner = ProvisionerConfig::from(&settings.provisioner);
    let connector = ProvisionerConnector::from_config(&provisioner)
        .context("Failed to configure provisioner client")?;
    tracing::info!(endpoint = %provisioner.endpoint, "provisioner client configured");

    let server = KeelServer::new(ServerConfig::from(&settings.server), Arc::new(connector))
        .with_metrics(metrics)
        .with_bridge_config(BridgeConfig {
            drain_timeout: Duration::from_millis(settings.bridge.drain_timeout_ms),
        });

    let handle = server.listen().await.context("Failed to bind server")?;
    tracing::info!(
        "Keel agent listening on http://{} (max {} sessions)",
        handle.local_addr(),
        server.config().max_connections
    );

    tokio::signal::ctrl_c()
        .await
        .context("Failed to listen for ctrl-c")?;

    tracing::info!(active = server.active_sessions(), "Shutting down...");
    if !handle.shutdown(DEFAULT_SHUTDOWN_TIMEOUT).await {
        tracing::warn!("Shutdown timed out with sessions still running");
    }

    tracing::info!("Shutdown complete");
    Ok(())
}
