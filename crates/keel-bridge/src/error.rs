//! Error types for the two data paths.

use thiserror::Error;

/// Failure of the upstream state stream other than end-of-stream or
/// cancellation.
#[derive(Debug, Error)]
pub enum UpstreamError {
    /// The RPC completed with a non-OK status.
    #[error("upstream status {code}: {message}")]
    Status {
        /// Status code name (e.g. `Unavailable`).
        code: String,
        /// Status message from the provisioner.
        message: String,
    },
    /// The underlying connection broke.
    #[error("upstream transport failed: {0}")]
    Transport(String),
    /// A message could not be decoded.
    #[error("upstream sent an undecodable message: {0}")]
    Decode(String),
}

/// Failure delivering one update to the client.
#[derive(Debug, Error)]
pub enum SendError {
    /// The channel was closed, locally or by the peer.
    #[error("client channel is closed")]
    Closed,
    /// The update could not be serialized.
    #[error("failed to encode update: {0}")]
    Encode(#[from] serde_json::Error),
    /// The encoded frame exceeds the configured limit.
    #[error("frame of {size} bytes exceeds limit of {limit} bytes")]
    TooLarge {
        /// Encoded frame size.
        size: usize,
        /// Configured maximum.
        limit: usize,
    },
    /// The socket write failed.
    #[error("client transport failed: {0}")]
    Transport(String),
}

/// Failure establishing an upstream source.
#[derive(Debug, Error)]
pub enum ConnectError {
    /// The provisioner has no such workspace or operation.
    #[error("no state stream for {0}")]
    NotFound(String),
    /// The provisioner could not be reached or refused the call.
    #[error("provisioner unavailable: {0}")]
    Unavailable(String),
    /// The target cannot be expressed as a provisioner request.
    #[error("invalid target: {0}")]
    InvalidTarget(String),
}

/// A reportable session failure. Only the signal that triggered teardown
/// becomes one of these.
#[derive(Debug, Error)]
pub enum BridgeError {
    /// The upstream stream failed.
    #[error(transparent)]
    Upstream(#[from] UpstreamError),
    /// Delivering an update to the client failed.
    #[error(transparent)]
    Forward(#[from] SendError),
}

impl BridgeError {
    /// Short label used in logs and metric labels.
    pub fn kind(&self) -> &'static str {
        match self {
            Self::Upstream(_) => "upstream",
            Self::Forward(_) => "forward",
        }
    }
}
