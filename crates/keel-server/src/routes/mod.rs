//! HTTP handlers.

pub mod state;

/// Path of the state stream WebSocket endpoint.
pub const STATE_STREAM_ROUTE: &str =
    "/api/projects/{project_id}/infras/{infra_id}/operations/{operation_id}/state";
