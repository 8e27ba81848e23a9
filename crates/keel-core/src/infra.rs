//! The provisioning target a state stream is bound to.

use std::fmt;

use serde::{Deserialize, Serialize};

use crate::ids::{OperationId, WorkspaceId};

/// Infrastructure kind used when the caller does not name one.
pub const DEFAULT_INFRA_KIND: &str = "infra";

/// A fully resolved infra + operation pair.
///
/// Produced by request resolution (authentication, job lookup) and consumed
/// by the upstream connector. The bridge only uses it for log context.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct InfraTarget {
    /// Owning project.
    pub project_id: u64,
    /// Infra row ID.
    pub infra_id: u64,
    /// Infra kind (e.g. `eks`, `docr`, `rds`).
    pub kind: String,
    /// Disambiguating suffix assigned when the infra was created.
    pub suffix: String,
    /// The operation whose state is being watched.
    pub operation_id: OperationId,
}

impl InfraTarget {
    /// Build a target with the default kind and an empty suffix.
    pub fn new(project_id: u64, infra_id: u64, operation_id: impl Into<OperationId>) -> Self {
        Self {
            project_id,
            infra_id,
            kind: DEFAULT_INFRA_KIND.to_owned(),
            suffix: String::new(),
            operation_id: operation_id.into(),
        }
    }

    /// Set the infra kind.
    #[must_use]
    pub fn with_kind(mut self, kind: impl Into<String>) -> Self {
        self.kind = kind.into();
        self
    }

    /// Set the infra suffix.
    #[must_use]
    pub fn with_suffix(mut self, suffix: impl Into<String>) -> Self {
        self.suffix = suffix.into();
        self
    }

    /// Provisioner workspace ID: `{kind}-{project_id}-{infra_id}-{suffix}-{operation_id}`.
    pub fn workspace_id(&self) -> WorkspaceId {
        WorkspaceId::from_string(format!(
            "{}-{}-{}-{}-{}",
            self.kind, self.project_id, self.infra_id, self.suffix, self.operation_id
        ))
    }
}

impl fmt::Display for InfraTarget {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "project {} / infra {} ({}) / operation {}",
            self.project_id, self.infra_id, self.kind, self.operation_id
        )
    }
}
