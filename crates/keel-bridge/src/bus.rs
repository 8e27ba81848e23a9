//! Fan-in of pump termination reasons.
//!
//! The bus is a bounded channel with room for exactly one signal per pump.
//! Each pump holds a [`Publisher`] that is consumed by [`Publisher::publish`],
//! so a path can never report twice and a report never waits on the
//! controller.

use std::fmt;

use tokio::sync::mpsc;
use tracing::warn;

use crate::error::{BridgeError, SendError, UpstreamError};

/// Number of publishers, and so the channel capacity.
pub const BUS_CAPACITY: usize = 2;

/// Why a data path stopped.
#[derive(Debug)]
pub enum TerminationSignal {
    /// The client went away or the client channel was closed.
    ClientClosed,
    /// The upstream stream finished normally.
    UpstreamEnded,
    /// The upstream call was cancelled.
    UpstreamCancelled,
    /// The upstream stream failed.
    UpstreamFailed(UpstreamError),
    /// Forwarding an update to the client failed.
    ForwardFailed(SendError),
}

/// Payload-free form of [`TerminationSignal`].
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum TerminationKind {
    /// See [`TerminationSignal::ClientClosed`].
    ClientClosed,
    /// See [`TerminationSignal::UpstreamEnded`].
    UpstreamEnded,
    /// See [`TerminationSignal::UpstreamCancelled`].
    UpstreamCancelled,
    /// See [`TerminationSignal::UpstreamFailed`].
    UpstreamFailed,
    /// See [`TerminationSignal::ForwardFailed`].
    ForwardFailed,
}

impl TerminationKind {
    /// Stable label for logs and metrics.
    pub fn as_str(self) -> &'static str {
        match self {
            Self::ClientClosed => "client_closed",
            Self::UpstreamEnded => "upstream_ended",
            Self::UpstreamCancelled => "upstream_cancelled",
            Self::UpstreamFailed => "upstream_failed",
            Self::ForwardFailed => "forward_failed",
        }
    }

    /// Whether this termination is a reportable failure.
    pub fn is_error(self) -> bool {
        matches!(self, Self::UpstreamFailed | Self::ForwardFailed)
    }
}

impl fmt::Display for TerminationKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl TerminationSignal {
    /// The signal's kind.
    pub fn kind(&self) -> TerminationKind {
        match self {
            Self::ClientClosed => TerminationKind::ClientClosed,
            Self::UpstreamEnded => TerminationKind::UpstreamEnded,
            Self::UpstreamCancelled => TerminationKind::UpstreamCancelled,
            Self::UpstreamFailed(_) => TerminationKind::UpstreamFailed,
            Self::ForwardFailed(_) => TerminationKind::ForwardFailed,
        }
    }

    /// Split into the kind and, for failures, the reportable error.
    pub fn into_parts(self) -> (TerminationKind, Option<BridgeError>) {
        let kind = self.kind();
        let error = match self {
            Self::UpstreamFailed(e) => Some(BridgeError::Upstream(e)),
            Self::ForwardFailed(e) => Some(BridgeError::Forward(e)),
            Self::ClientClosed | Self::UpstreamEnded | Self::UpstreamCancelled => None,
        };
        (kind, error)
    }
}

/// Which pump a publisher belongs to.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum PumpPath {
    /// Upstream to client forwarding.
    Upstream,
    /// Client liveness watch.
    Client,
}

/// Single-use write handle held by one pump.
#[derive(Debug)]
pub struct Publisher {
    tx: mpsc::Sender<TerminationSignal>,
    path: PumpPath,
}

impl Publisher {
    /// The path this publisher reports for.
    pub fn path(&self) -> PumpPath {
        self.path
    }

    /// Report why this path stopped. Never waits.
    pub fn publish(self, signal: TerminationSignal) {
        if let Err(err) = self.tx.try_send(signal) {
            warn!(path = ?self.path, error = %err, "termination signal dropped");
        }
    }
}

/// Read side of the bus, owned by the controller.
#[derive(Debug)]
pub struct TerminationBus {
    rx: mpsc::Receiver<TerminationSignal>,
}

impl TerminationBus {
    /// Create a bus and its two publishers `(bus, upstream, client)`.
    pub fn new() -> (Self, Publisher, Publisher) {
        let (tx, rx) = mpsc::channel(BUS_CAPACITY);
        let upstream = Publisher {
            tx: tx.clone(),
            path: PumpPath::Upstream,
        };
        let client = Publisher {
            tx,
            path: PumpPath::Client,
        };
        (Self { rx }, upstream, client)
    }

    /// Wait for the next signal. `None` once every publisher is gone and the
    /// buffer is empty.
    pub async fn recv(&mut self) -> Option<TerminationSignal> {
        self.rx.recv().await
    }

    /// Refuse further writes. Buffered signals can still be read.
    pub fn close(&mut self) {
        self.rx.close();
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn both_publishers_fit_without_a_reader() {
        let (mut bus, upstream, client) = TerminationBus::new();
        upstream.publish(TerminationSignal::UpstreamEnded);
        client.publish(TerminationSignal::ClientClosed);

        assert_eq!(bus.recv().await.unwrap().kind(), TerminationKind::UpstreamEnded);
        assert_eq!(bus.recv().await.unwrap().kind(), TerminationKind::ClientClosed);
        assert!(bus.recv().await.is_none());
    }

    #[tokio::test]
    async fn recv_ends_when_publishers_drop_unused() {
        let (mut bus, upstream, client) = TerminationBus::new();
        drop(upstream);
        drop(client);
        assert!(bus.recv().await.is_none());
    }

    #[tokio::test]
    async fn publish_after_close_is_dropped() {
        let (mut bus, upstream, client) = TerminationBus::new();
        client.publish(TerminationSignal::ClientClosed);
        bus.close();
        upstream.publish(TerminationSignal::UpstreamCancelled);

        assert_eq!(bus.recv().await.unwrap().kind(), TerminationKind::ClientClosed);
        assert!(bus.recv().await.is_none());
    }

    #[test]
    fn publishers_know_their_path() {
        let (_bus, upstream, client) = TerminationBus::new();
        assert_eq!(upstream.path(), PumpPath::Upstream);
        assert_eq!(client.path(), PumpPath::Client);
    }

    #[test]
    fn only_failures_carry_errors() {
        let (kind, err) = TerminationSignal::ForwardFailed(SendError::Closed).into_parts();
        assert_eq!(kind, TerminationKind::ForwardFailed);
        assert!(kind.is_error());
        assert_eq!(err.unwrap().kind(), "forward");

        for signal in [
            TerminationSignal::ClientClosed,
            TerminationSignal::UpstreamEnded,
            TerminationSignal::UpstreamCancelled,
        ] {
            let (kind, err) = signal.into_parts();
            assert!(!kind.is_error());
            assert!(err.is_none());
        }
    }

    #[test]
    fn kind_labels() {
        assert_eq!(TerminationKind::UpstreamFailed.to_string(), "upstream_failed");
        assert_eq!(TerminationKind::ClientClosed.as_str(), "client_closed");
    }
}
