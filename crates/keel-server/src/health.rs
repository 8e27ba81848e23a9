//! `/health` endpoint.

use serde::Serialize;
use std::time::Instant;

/// Health check response body.
#[derive(Debug, Clone, Serialize)]
pub struct HealthResponse {
    /// Always `"ok"` when the server is running.
    pub status: String,
    /// Seconds since the server started.
    pub uptime_secs: u64,
    /// Number of live state stream sessions.
    pub active_sessions: usize,
    /// Whether shutdown has begun.
    pub shutting_down: bool,
}

/// Build a health response from live counters.
pub fn health_check(start_time: Instant, sessions: usize, shutting_down: bool) -> HealthResponse {
    HealthResponse {
        status: if shutting_down { "draining" } else { "ok" }.into(),
        uptime_secs: start_time.elapsed().as_secs(),
        active_sessions: sessions,
        shutting_down,
    }
}
