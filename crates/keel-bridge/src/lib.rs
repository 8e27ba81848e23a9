//! # keel-bridge
//!
//! Relays one provisioning operation's live state feed to one client.
//!
//! A [`BridgeController`] owns a [`Session`]: an [`UpstreamSource`], a
//! [`ClientChannel`] and a cancellation scope. It runs two pumps (upstream
//! forwarding and client liveness) which each report once on a
//! [`TerminationBus`]. The first report starts teardown; the controller alone
//! cancels and closes the transports.

#![deny(unsafe_code)]

pub mod bus;
pub mod client;
pub mod controller;
pub mod error;
pub mod metrics;
mod pump;
pub mod upstream;

#[cfg(test)]
mod fakes;

pub use bus::{TerminationBus, TerminationKind, TerminationSignal};
pub use client::ClientChannel;
pub use controller::{
    BridgeConfig, BridgeController, BridgeState, DEFAULT_DRAIN_TIMEOUT, ErrorReporter, Session,
    SessionReport, TracingReporter,
};
pub use error::{BridgeError, ConnectError, SendError, UpstreamError};
pub use upstream::{UpstreamConnector, UpstreamEvent, UpstreamSource};
