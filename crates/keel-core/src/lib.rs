//! # keel-core
//!
//! Foundation types shared by every Keel crate:
//!
//! - [`ids`]: branded string IDs (`SessionId`, `WorkspaceId`, `OperationId`)
//! - [`infra`]: the resolved provisioning target and its workspace-id derivation
//! - [`state`]: the `StateUpdate` payload relayed from the provisioner to clients

#![deny(unsafe_code)]

pub mod ids;
pub mod infra;
pub mod state;

pub use ids::{OperationId, SessionId, WorkspaceId};
pub use infra::InfraTarget;
pub use state::StateUpdate;
