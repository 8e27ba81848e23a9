//! Metric names recorded by the bridge.

/// Sessions started (counter).
pub const BRIDGE_SESSIONS_TOTAL: &str = "bridge_sessions_total";
/// Sessions currently streaming or draining (gauge).
pub const BRIDGE_SESSIONS_ACTIVE: &str = "bridge_sessions_active";
/// Updates delivered to clients (counter).
pub const BRIDGE_UPDATES_FORWARDED_TOTAL: &str = "bridge_updates_forwarded_total";
/// Sessions ended, by triggering signal (counter, labels: trigger).
pub const BRIDGE_TERMINATIONS_TOTAL: &str = "bridge_terminations_total";
/// Reported session failures (counter, labels: kind).
pub const BRIDGE_SESSION_ERRORS_TOTAL: &str = "bridge_session_errors_total";
/// Sessions whose pumps had to be aborted after the drain timeout (counter).
pub const BRIDGE_FORCED_SHUTDOWNS_TOTAL: &str = "bridge_forced_shutdowns_total";
/// Session lifetime in seconds (histogram).
pub const BRIDGE_SESSION_DURATION_SECONDS: &str = "bridge_session_duration_seconds";
