//! `KeelServer`: axum HTTP + WebSocket server.

use std::net::SocketAddr;
use std::sync::Arc;
use std::time::{Duration, Instant};

use axum::Router;
use axum::extract::State;
use axum::response::Json;
use axum::routing::get;
use keel_bridge::{BridgeConfig, ErrorReporter, TracingReporter, UpstreamConnector};
use keel_telemetry::PrometheusHandle;
use tokio::net::TcpListener;
use tokio::task::JoinHandle;
use tower_http::trace::TraceLayer;
use tracing::{info, warn};

use crate::config::ServerConfig;
use crate::health::{self, HealthResponse};
use crate::metrics::metrics_handler;
use crate::resolver::{DirectResolver, InfraResolver};
use crate::routes::STATE_STREAM_ROUTE;
use crate::routes::state::state_stream_handler;
use crate::sessions::SessionLimiter;
use crate::shutdown::ShutdownCoordinator;
use crate::websocket::channel::ChannelConfig;

/// Shared state accessible from axum handlers.
#[derive(Clone)]
pub struct AppState {
    /// Opens provisioner streams.
    pub connector: Arc<dyn UpstreamConnector>,
    /// Maps requests to targets.
    pub resolver: Arc<dyn InfraResolver>,
    /// Receives each session's terminal error.
    pub reporter: Arc<dyn ErrorReporter>,
    /// Concurrent session cap.
    pub sessions: Arc<SessionLimiter>,
    /// Shutdown coordinator.
    pub shutdown: Arc<ShutdownCoordinator>,
    /// Per-socket settings.
    pub channel: ChannelConfig,
    /// Per-session settings.
    pub bridge: BridgeConfig,
    /// Prometheus handle for `/metrics`.
    pub metrics: Option<PrometheusHandle>,
    /// When the server started.
    pub start_time: Instant,
}

/// The Keel server.
pub struct KeelServer {
    config: ServerConfig,
    connector: Arc<dyn UpstreamConnector>,
    resolver: Arc<dyn InfraResolver>,
    reporter: Arc<dyn ErrorReporter>,
    sessions: Arc<SessionLimiter>,
    shutdown: Arc<ShutdownCoordinator>,
    bridge: BridgeConfig,
    metrics: Option<PrometheusHandle>,
    start_time: Instant,
}

impl KeelServer {
    /// Create a server that opens streams through `connector`.
    pub fn new(config: ServerConfig, connector: Arc<dyn UpstreamConnector>) -> Self {
        let sessions = Arc::new(SessionLimiter::new(config.max_connections));
        Self {
            config,
            connector,
            resolver: Arc::new(DirectResolver),
            reporter: Arc::new(TracingReporter),
            sessions,
            shutdown: Arc::new(ShutdownCoordinator::new()),
            bridge: BridgeConfig::default(),
            metrics: None,
            start_time: Instant::now(),
        }
    }

    /// Replace the request resolver.
    #[must_use]
    pub fn with_resolver(mut self, resolver: Arc<dyn InfraResolver>) -> Self {
        self.resolver = resolver;
        self
    }

    /// Replace the session error reporter.
    #[must_use]
    pub fn with_reporter(mut self, reporter: Arc<dyn ErrorReporter>) -> Self {
        self.reporter = reporter;
        self
    }

    /// Serve `/metrics` from this recorder.
    #[must_use]
    pub fn with_metrics(mut self, handle: PrometheusHandle) -> Self {
        self.metrics = Some(handle);
        self
    }

    /// Override per-session settings.
    #[must_use]
    pub fn with_bridge_config(mut self, bridge: BridgeConfig) -> Self {
        self.bridge = bridge;
        self
    }

    /// Build the axum router with all routes.
    pub fn router(&self) -> Router {
        let state = AppState {
            connector: Arc::clone(&self.connector),
            resolver: Arc::clone(&self.resolver),
            reporter: Arc::clone(&self.reporter),
            sessions: Arc::clone(&self.sessions),
            shutdown: Arc::clone(&self.shutdown),
            channel: self.config.channel_config(),
            bridge: self.bridge.clone(),
            metrics: self.metrics.clone(),
            start_time: self.start_time,
        };

        Router::new()
            .route("/health", get(health_handler))
            .route("/metrics", get(metrics_handler))
            .route(STATE_STREAM_ROUTE, get(state_stream_handler))
            .layer(TraceLayer::new_for_http())
            .with_state(state)
    }

    /// Bind and serve in the background.
    pub async fn listen(&self) -> std::io::Result<ServerHandle> {
        let listener = TcpListener::bind(self.config.bind_addr()).await?;
        let local_addr = listener.local_addr()?;
        let app = self.router();
        let token = self.shutdown.token();

        let task = tokio::spawn(async move {
            if let Err(err) = axum::serve(listener, app)
                .with_graceful_shutdown(token.cancelled_owned())
                .await
            {
                warn!(error = %err, "server stopped with error");
            }
        });
        info!(addr = %local_addr, "keel server listening");

        Ok(ServerHandle {
            local_addr,
            shutdown: Arc::clone(&self.shutdown),
            task,
        })
    }

    /// Get the shutdown coordinator.
    pub fn shutdown(&self) -> &Arc<ShutdownCoordinator> {
        &self.shutdown
    }

    /// Live bridge sessions.
    pub fn active_sessions(&self) -> usize {
        self.sessions.active()
    }

    /// Get the server configuration.
    pub fn config(&self) -> &ServerConfig {
        &self.config
    }
}

/// A running server.
pub struct ServerHandle {
    local_addr: SocketAddr,
    shutdown: Arc<ShutdownCoordinator>,
    task: JoinHandle<()>,
}

impl ServerHandle {
    /// The bound address.
    pub fn local_addr(&self) -> SocketAddr {
        self.local_addr
    }

    /// Stop accepting, cancel all sessions and wait up to `timeout` for them.
    pub async fn shutdown(self, timeout: Duration) -> bool {
        info!("shutting down keel server");
        let drained = self.shutdown.graceful_shutdown(Some(timeout)).await;
        if tokio::time::timeout(timeout, self.task).await.is_err() {
            warn!("http server did not stop within {timeout:?}");
            return false;
        }
        drained
    }
}

/// GET /health
async fn health_handler(State(state): State<AppState>) -> Json<HealthResponse> {
    Json(health::health_check(
        state.start_time,
        state.sessions.active(),
        state.shutdown.is_shutting_down(),
    ))
}
