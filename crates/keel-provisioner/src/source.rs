//! [`UpstreamSource`] over a gRPC server stream.

use std::sync::atomic::{AtomicBool, Ordering};

use async_trait::async_trait;
use futures::stream::BoxStream;
use futures::{Stream, StreamExt};
use keel_bridge::{UpstreamError, UpstreamEvent, UpstreamSource};
use keel_core::StateUpdate;
use tokio::sync::Mutex;
use tokio_util::sync::CancellationToken;
use tonic::{Code, Status};
use tracing::debug;

/// Adapts a stream of `Result<StateUpdate, Status>` (normally a
/// `tonic::Streaming`) to the bridge's upstream contract.
///
/// The stream is dropped, which resets the HTTP/2 stream, as soon as it ends,
/// is cancelled, or the source is closed.
pub struct GrpcStateSource {
    stream: Mutex<Option<BoxStream<'static, Result<StateUpdate, Status>>>>,
    scope: CancellationToken,
    closed: AtomicBool,
}

impl GrpcStateSource {
    /// Wrap `stream`. The source stops when `scope` is cancelled.
    pub fn new<S>(stream: S, scope: &CancellationToken) -> Self
    where
        S: Stream<Item = Result<StateUpdate, Status>> + Send + 'static,
    {
        Self {
            stream: Mutex::new(Some(stream.boxed())),
            scope: scope.child_token(),
            closed: AtomicBool::new(false),
        }
    }

    /// Whether `close` has been called.
    pub fn is_closed(&self) -> bool {
        self.closed.load(Ordering::Acquire)
    }
}

/// Map a non-OK status to an upstream event.
pub fn classify_status(status: &Status) -> UpstreamEvent {
    match status.code() {
        Code::Cancelled => UpstreamEvent::Cancelled,
        code => UpstreamEvent::TransportError(UpstreamError::Status {
            code: format!("{code:?}"),
            message: status.message().to_string(),
        }),
    }
}

#[async_trait]
impl UpstreamSource for GrpcStateSource {
    async fn next(&self) -> UpstreamEvent {
        if self.is_closed() || self.scope.is_cancelled() {
            return UpstreamEvent::Cancelled;
        }

        let mut guard = self.stream.lock().await;
        let Some(stream) = guard.as_mut() else {
            return UpstreamEvent::Cancelled;
        };

        let item = tokio::select! {
            biased;
            () = self.scope.cancelled() => {
                *guard = None;
                return UpstreamEvent::Cancelled;
            }
            item = stream.next() => item,
        };

        match item {
            Some(Ok(update)) => UpstreamEvent::Update(update),
            Some(Err(status)) => {
                *guard = None;
                let event = classify_status(&status);
                debug!(code = ?status.code(), message = status.message(), "state stream failed");
                event
            }
            None => {
                *guard = None;
                UpstreamEvent::EndOfStream
            }
        }
    }

    async fn close(&self) {
        if self.closed.swap(true, Ordering::AcqRel) {
            return;
        }
        self.scope.cancel();
        // A pump inside `next` holds the lock and drops the stream itself.
        if let Ok(mut guard) = self.stream.try_lock() {
            *guard = None;
        }
        debug!("state stream closed");
    }
}
