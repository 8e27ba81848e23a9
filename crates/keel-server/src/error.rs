//! HTTP-facing errors.

use axum::Json;
use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use keel_bridge::ConnectError;
use metrics::counter;
use serde_json::json;
use thiserror::Error;

use crate::metrics::STATE_STREAM_REJECTED_TOTAL;
use crate::resolver::ResolveError;

/// Reasons a state stream request is refused before the upgrade.
#[derive(Debug, Error)]
pub enum ApiError {
    /// Malformed target.
    #[error("{0}")]
    BadRequest(String),
    /// Unknown infra, operation or stream.
    #[error("{0}")]
    NotFound(String),
    /// The provisioner could not be reached.
    #[error("{0}")]
    Upstream(String),
    /// `max_connections` streams are already running.
    #[error("too many concurrent state streams")]
    TooManySessions,
    /// The server is draining.
    #[error("server is shutting down")]
    ShuttingDown,
}

impl ApiError {
    /// HTTP status for this error.
    pub fn status(&self) -> StatusCode {
        match self {
            Self::BadRequest(_) => StatusCode::BAD_REQUEST,
            Self::NotFound(_) => StatusCode::NOT_FOUND,
            Self::Upstream(_) => StatusCode::BAD_GATEWAY,
            Self::TooManySessions | Self::ShuttingDown => StatusCode::SERVICE_UNAVAILABLE,
        }
    }

    /// Machine-readable error code.
    pub fn code(&self) -> &'static str {
        match self {
            Self::BadRequest(_) => "BAD_REQUEST",
            Self::NotFound(_) => "NOT_FOUND",
            Self::Upstream(_) => "UPSTREAM_UNAVAILABLE",
            Self::TooManySessions => "TOO_MANY_SESSIONS",
            Self::ShuttingDown => "SHUTTING_DOWN",
        }
    }
}

impl From<ConnectError> for ApiError {
    fn from(err: ConnectError) -> Self {
        match err {
            ConnectError::NotFound(_) => Self::NotFound(err.to_string()),
            ConnectError::InvalidTarget(_) => Self::BadRequest(err.to_string()),
            ConnectError::Unavailable(_) => Self::Upstream(err.to_string()),
        }
    }
}

impl From<ResolveError> for ApiError {
    fn from(err: ResolveError) -> Self {
        match err {
            ResolveError::NotFound(msg) => Self::NotFound(msg),
            ResolveError::Invalid(msg) => Self::BadRequest(msg),
        }
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        counter!(STATE_STREAM_REJECTED_TOTAL, "code" => self.code()).increment(1);
        let body = json!({
            "error": {
                "code": self.code(),
                "message": self.to_string(),
            }
        });
        (self.status(), Json(body)).into_response()
    }
}
