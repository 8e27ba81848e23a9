//! Provisioner client errors.

use keel_bridge::ConnectError;
use thiserror::Error;
use tonic::Code;

/// Errors from configuring or calling the provisioner.
#[derive(Debug, Error)]
pub enum ProvisionerError {
    /// The endpoint URI could not be parsed.
    #[error("invalid provisioner endpoint: {0}")]
    InvalidEndpoint(String),
    /// The target cannot be encoded as a request.
    #[error("invalid target: {0}")]
    InvalidTarget(String),
    /// The workspace ID is not valid request metadata.
    #[error("invalid workspace id metadata: {0}")]
    InvalidMetadata(String),
    /// The call failed.
    #[error("provisioner call failed: {0}")]
    Status(Box<tonic::Status>),
    /// The session was cancelled before the stream opened.
    #[error("cancelled before the stream opened")]
    Cancelled,
}

impl From<tonic::Status> for ProvisionerError {
    fn from(status: tonic::Status) -> Self {
        Self::Status(Box::new(status))
    }
}

impl From<ProvisionerError> for ConnectError {
    fn from(err: ProvisionerError) -> Self {
        match err {
            ProvisionerError::InvalidTarget(msg) | ProvisionerError::InvalidMetadata(msg) => {
                Self::InvalidTarget(msg)
            }
            ProvisionerError::Status(status) if status.code() == Code::NotFound => {
                Self::NotFound(status.message().to_string())
            }
            ProvisionerError::Status(status) if status.code() == Code::InvalidArgument => {
                Self::InvalidTarget(status.message().to_string())
            }
            other => Self::Unavailable(other.to_string()),
        }
    }
}
