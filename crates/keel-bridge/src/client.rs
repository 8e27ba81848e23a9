//! The client side of a session: a duplex connection to the viewer.

use async_trait::async_trait;
use keel_core::StateUpdate;

use crate::error::SendError;

/// A persistent connection to the client watching an operation.
///
/// `send` is only called by the upstream pump, `watch_for_close` only by the
/// client-watch pump, and `close` only by the controller.
#[async_trait]
pub trait ClientChannel: Send + Sync {
    /// Deliver one update. After `close`, returns [`SendError::Closed`]
    /// without touching the transport.
    async fn send(&self, update: &StateUpdate) -> Result<(), SendError>;

    /// Resolve once the peer closes, the transport fails, or the channel is
    /// closed locally. Inbound payloads are ignored.
    async fn watch_for_close(&self);

    /// Close the connection. Idempotent; failures are swallowed.
    async fn close(&self);
}
