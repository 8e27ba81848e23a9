//! Provisioning state snapshots.

use serde::{Deserialize, Serialize};

/// One provisioning-status snapshot for a single resource.
///
/// This is both the provisioner's protobuf message and the JSON object sent
/// to clients. It is relayed unmodified; nothing in Keel inspects `status`.
#[derive(Clone, PartialEq, Eq, prost::Message, Serialize, Deserialize)]
pub struct StateUpdate {
    /// Terraform-style resource address.
    #[prost(string, tag = "1")]
    #[serde(default)]
    pub resource_id: String,
    /// Resource status (`planned_create`, `created`, `deleted`, ...).
    #[prost(string, tag = "2")]
    #[serde(default)]
    pub status: String,
    /// Error reported by the provisioner for this resource, if any.
    #[prost(string, optional, tag = "3")]
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

impl StateUpdate {
    /// Build an update without an error.
    pub fn new(resource_id: impl Into<String>, status: impl Into<String>) -> Self {
        Self {
            resource_id: resource_id.into(),
            status: status.into(),
            error: None,
        }
    }

    /// Attach an error message.
    #[must_use]
    pub fn with_error(mut self, error: impl Into<String>) -> Self {
        self.error = Some(error.into());
        self
    }

    /// Serialize to the JSON text sent to clients.
    pub fn to_json(&self) -> serde_json::Result<String> {
        serde_json::to_string(self)
    }
}
