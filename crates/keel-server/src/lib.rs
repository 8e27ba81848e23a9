//! # keel-server
//!
//! axum front end for provisioning state streams. Each WebSocket on the
//! state route becomes one [`keel_bridge::BridgeController`] session fed by
//! an injected [`keel_bridge::UpstreamConnector`].

#![deny(unsafe_code)]

pub mod config;
pub mod error;
pub mod health;
pub mod metrics;
pub mod resolver;
pub mod routes;
pub mod server;
pub mod sessions;
pub mod shutdown;
pub mod websocket;

pub use config::ServerConfig;
pub use error::ApiError;
pub use resolver::{DirectResolver, InfraResolver, ResolveError, StateStreamQuery, StateStreamRequest};
pub use server::{AppState, KeelServer, ServerHandle};
pub use shutdown::ShutdownCoordinator;
pub use websocket::channel::{ChannelConfig, WsClientChannel};
