//! Provisioner protobuf messages and method paths.
//!
//! The reply message is [`keel_core::StateUpdate`]; only the request lives
//! here.

use keel_core::InfraTarget;

use crate::error::ProvisionerError;

/// Fully-qualified service name.
pub const SERVICE_NAME: &str = "provisioner.Provisioner";
/// `GetStateUpdate` method name.
pub const GET_STATE_UPDATE_METHOD: &str = "GetStateUpdate";
/// HTTP/2 path of `GetStateUpdate`.
pub const GET_STATE_UPDATE_PATH: &str = "/provisioner.Provisioner/GetStateUpdate";
/// Request metadata key carrying the workspace ID.
pub const WORKSPACE_ID_METADATA: &str = "workspace_id";

/// `GetStateUpdate` request.
#[derive(Clone, PartialEq, Eq, prost::Message)]
pub struct Infra {
    /// Owning project.
    #[prost(int64, tag = "1")]
    pub project_id: i64,
    /// Infra row ID.
    #[prost(int64, tag = "2")]
    pub id: i64,
    /// Infra suffix.
    #[prost(string, tag = "3")]
    pub suffix: String,
}

impl TryFrom<&InfraTarget> for Infra {
    type Error = ProvisionerError;

    fn try_from(target: &InfraTarget) -> Result<Self, Self::Error> {
        let project_id = i64::try_from(target.project_id).map_err(|_| {
            ProvisionerError::InvalidTarget(format!("project id {} out of range", target.project_id))
        })?;
        let id = i64::try_from(target.infra_id).map_err(|_| {
            ProvisionerError::InvalidTarget(format!("infra id {} out of range", target.infra_id))
        })?;
        Ok(Self {
            project_id,
            id,
            suffix: target.suffix.clone(),
        })
    }
}
