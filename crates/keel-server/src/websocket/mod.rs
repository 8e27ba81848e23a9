//! WebSocket client side of a state stream.

pub mod channel;
pub mod heartbeat;
