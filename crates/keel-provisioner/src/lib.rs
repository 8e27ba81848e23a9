//! # keel-provisioner
//!
//! Client side of the provisioner's `GetStateUpdate` server stream and its
//! adaptation to the bridge's upstream contract.
//!
//! - [`ProvisionerClient`]: tonic client over a lazily connected channel
//! - [`GrpcStateSource`]: classifies stream outcomes (`Cancelled` status and
//!   scope cancellation are cancellation, other statuses are errors)
//! - [`ProvisionerConnector`]: builds the request and `workspace_id`
//!   metadata for an [`keel_core::InfraTarget`]

#![deny(unsafe_code)]

pub mod client;
pub mod connector;
pub mod error;
pub mod proto;
pub mod source;

pub use client::{ProvisionerClient, ProvisionerConfig};
pub use connector::ProvisionerConnector;
pub use error::ProvisionerError;
pub use proto::Infra;
pub use source::GrpcStateSource;
