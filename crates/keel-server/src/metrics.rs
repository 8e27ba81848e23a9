//! Metric names recorded by the server and the `/metrics` handler.

use axum::extract::State;
use axum::http::header::CONTENT_TYPE;
use axum::response::IntoResponse;

use crate::server::AppState;

/// State stream requests received (counter).
pub const STATE_STREAM_REQUESTS_TOTAL: &str = "state_stream_requests_total";
/// State stream requests refused before upgrade (counter, labels: code).
pub const STATE_STREAM_REJECTED_TOTAL: &str = "state_stream_rejected_total";
/// Clients dropped for missing heartbeats (counter).
pub const WS_HEARTBEAT_TIMEOUTS_TOTAL: &str = "ws_heartbeat_timeouts_total";
/// Failed WebSocket upgrades after a stream was opened (counter).
pub const WS_UPGRADE_FAILURES_TOTAL: &str = "ws_upgrade_failures_total";

/// GET /metrics
pub(crate) async fn metrics_handler(State(state): State<AppState>) -> impl IntoResponse {
    let body = state
        .metrics
        .as_ref()
        .map(keel_telemetry::render)
        .unwrap_or_default();
    ([(CONTENT_TYPE, "text/plain; version=0.0.4")], body)
}
