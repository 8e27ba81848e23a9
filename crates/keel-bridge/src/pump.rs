//! The two per-session pump tasks.
//!
//! Pumps only read from their transport and report once on the bus. They
//! never close or cancel anything.

use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};

use metrics::counter;
use tokio_util::sync::CancellationToken;
use tracing::{debug, trace};

use crate::bus::{Publisher, TerminationSignal};
use crate::client::ClientChannel;
use crate::metrics::BRIDGE_UPDATES_FORWARDED_TOTAL;
use crate::upstream::{UpstreamEvent, UpstreamSource};

/// Forward upstream updates to the client until either side stops.
pub(crate) async fn upstream_pump(
    upstream: Arc<dyn UpstreamSource>,
    client: Arc<dyn ClientChannel>,
    scope: CancellationToken,
    forwarded: Arc<AtomicU64>,
    publisher: Publisher,
) {
    let signal = loop {
        let event = tokio::select! {
            biased;
            () = scope.cancelled() => UpstreamEvent::Cancelled,
            event = upstream.next() => event,
        };

        match event {
            UpstreamEvent::Update(update) => {
                // Anything that arrives after cancellation is discarded.
                if scope.is_cancelled() {
                    break TerminationSignal::UpstreamCancelled;
                }
                if let Err(err) = client.send(&update).await {
                    break TerminationSignal::ForwardFailed(err);
                }
                let _ = forwarded.fetch_add(1, Ordering::Relaxed);
                counter!(BRIDGE_UPDATES_FORWARDED_TOTAL).increment(1);
                trace!(resource_id = %update.resource_id, status = %update.status, "update forwarded");
            }
            UpstreamEvent::EndOfStream => break TerminationSignal::UpstreamEnded,
            UpstreamEvent::Cancelled => break TerminationSignal::UpstreamCancelled,
            UpstreamEvent::TransportError(err) => break TerminationSignal::UpstreamFailed(err),
        }
    };

    debug!(signal = %signal.kind(), "upstream pump stopped");
    publisher.publish(signal);
}

/// Report once the client goes away.
pub(crate) async fn client_watch_pump(client: Arc<dyn ClientChannel>, publisher: Publisher) {
    client.watch_for_close().await;
    debug!("client watch pump stopped");
    publisher.publish(TerminationSignal::ClientClosed);
}
