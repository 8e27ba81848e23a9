//! The upstream side of a session: a live feed of state updates.

use std::sync::Arc;

use async_trait::async_trait;
use keel_core::{InfraTarget, StateUpdate};
use tokio_util::sync::CancellationToken;

use crate::error::{ConnectError, UpstreamError};

/// One outcome of reading the upstream stream.
#[derive(Debug)]
pub enum UpstreamEvent {
    /// The next update, in receipt order.
    Update(StateUpdate),
    /// The provisioner finished the stream normally.
    EndOfStream,
    /// The call was cancelled (scope cancelled, source closed, or the
    /// provisioner reported cancellation). Never an error.
    Cancelled,
    /// Any other failure.
    TransportError(UpstreamError),
}

/// A server-streaming feed of [`StateUpdate`]s for one operation.
///
/// `next` is only called by the upstream pump; `close` only by the
/// controller. `close` must be idempotent, and once it has been called
/// `next` yields [`UpstreamEvent::Cancelled`].
#[async_trait]
pub trait UpstreamSource: Send + Sync {
    /// Wait for the next event.
    async fn next(&self) -> UpstreamEvent;

    /// Release the stream. Safe to call after the stream ended or more than once.
    async fn close(&self);
}

/// Opens an [`UpstreamSource`] for a resolved target.
///
/// `scope` is the session's cancellation scope; cancelling it must make a
/// pending `next` return [`UpstreamEvent::Cancelled`].
#[async_trait]
pub trait UpstreamConnector: Send + Sync {
    /// Establish the stream.
    async fn open(
        &self,
        target: &InfraTarget,
        scope: CancellationToken,
    ) -> Result<Arc<dyn UpstreamSource>, ConnectError>;
}
