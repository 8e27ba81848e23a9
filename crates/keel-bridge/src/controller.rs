//! Session lifecycle: start both pumps, tear down on the first termination
//! signal, drain, report.
//!
//! ```text
//! Idle ──start──▶ Streaming ──first signal──▶ Draining ──pumps gone──▶ Closed
//! ```

use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::Duration;

use keel_core::{InfraTarget, SessionId};
use metrics::{counter, gauge, histogram};
use tokio::sync::watch;
use tokio::task::JoinSet;
use tokio::time::Instant;
use tokio_util::sync::CancellationToken;
use tracing::{Instrument, debug, error, info, info_span, warn};

use crate::bus::{TerminationBus, TerminationKind, TerminationSignal};
use crate::client::ClientChannel;
use crate::error::BridgeError;
use crate::metrics::{
    BRIDGE_FORCED_SHUTDOWNS_TOTAL, BRIDGE_SESSION_DURATION_SECONDS, BRIDGE_SESSION_ERRORS_TOTAL,
    BRIDGE_SESSIONS_ACTIVE, BRIDGE_SESSIONS_TOTAL, BRIDGE_TERMINATIONS_TOTAL,
};
use crate::pump::{client_watch_pump, upstream_pump};
use crate::upstream::UpstreamSource;

/// Default bound on how long teardown waits for the pumps.
pub const DEFAULT_DRAIN_TIMEOUT: Duration = Duration::from_secs(5);

/// Lifecycle state of one session.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum BridgeState {
    /// Constructed, pumps not started.
    Idle,
    /// Both pumps running.
    Streaming,
    /// Teardown issued, waiting for the pumps.
    Draining,
    /// Terminal.
    Closed,
}

/// Controller tuning.
#[derive(Clone, Debug)]
pub struct BridgeConfig {
    /// Upper bound on the drain phase before pumps are aborted.
    pub drain_timeout: Duration,
}

impl Default for BridgeConfig {
    fn default() -> Self {
        Self {
            drain_timeout: DEFAULT_DRAIN_TIMEOUT,
        }
    }
}

/// Everything one bridge instance owns.
pub struct Session {
    /// Session identifier.
    pub id: SessionId,
    /// What is being watched. Used for log context only.
    pub target: InfraTarget,
    /// Execution scope; cancelling it stops the upstream path.
    pub scope: CancellationToken,
    /// Upstream feed.
    pub upstream: Arc<dyn UpstreamSource>,
    /// Client connection.
    pub client: Arc<dyn ClientChannel>,
}

impl Session {
    /// Assemble a session with a fresh [`SessionId`].
    pub fn new(
        target: InfraTarget,
        scope: CancellationToken,
        upstream: Arc<dyn UpstreamSource>,
        client: Arc<dyn ClientChannel>,
    ) -> Self {
        Self {
            id: SessionId::new(),
            target,
            scope,
            upstream,
            client,
        }
    }
}

/// Receives the one reportable failure of a session, if there is one.
pub trait ErrorReporter: Send + Sync {
    /// Report the error that ended `session_id`.
    fn report(&self, session_id: &SessionId, target: &InfraTarget, error: &BridgeError);
}

/// Default reporter: an `error` event plus a labelled counter.
#[derive(Clone, Copy, Debug, Default)]
pub struct TracingReporter;

impl ErrorReporter for TracingReporter {
    fn report(&self, session_id: &SessionId, target: &InfraTarget, err: &BridgeError) {
        error!(
            session_id = %session_id,
            project_id = target.project_id,
            infra_id = target.infra_id,
            operation_id = %target.operation_id,
            kind = err.kind(),
            error = %err,
            "state stream session failed"
        );
        counter!(BRIDGE_SESSION_ERRORS_TOTAL, "kind" => err.kind()).increment(1);
    }
}

/// Outcome of one session.
#[derive(Debug)]
pub struct SessionReport {
    /// Session identifier.
    pub session_id: SessionId,
    /// The signal that started teardown.
    pub trigger: TerminationKind,
    /// The reported failure, when the trigger was one.
    pub error: Option<BridgeError>,
    /// Updates delivered to the client.
    pub updates_forwarded: u64,
    /// Time from start to `Closed`.
    pub duration: Duration,
    /// Whether the drain timed out and pumps were aborted.
    pub forced_shutdown: bool,
}

/// Runs one [`Session`] from `Idle` to `Closed`.
pub struct BridgeController {
    session: Session,
    config: BridgeConfig,
    reporter: Arc<dyn ErrorReporter>,
    state: watch::Sender<BridgeState>,
}

impl BridgeController {
    /// Create an idle controller with the [`TracingReporter`].
    pub fn new(session: Session, config: BridgeConfig) -> Self {
        let (state, _) = watch::channel(BridgeState::Idle);
        Self {
            session,
            config,
            reporter: Arc::new(TracingReporter),
            state,
        }
    }

    /// Replace the error reporter.
    #[must_use]
    pub fn with_reporter(mut self, reporter: Arc<dyn ErrorReporter>) -> Self {
        self.reporter = reporter;
        self
    }

    /// The session identifier.
    pub fn session_id(&self) -> &SessionId {
        &self.session.id
    }

    /// Observe state transitions.
    pub fn subscribe(&self) -> watch::Receiver<BridgeState> {
        self.state.subscribe()
    }

    fn transition(&self, next: BridgeState) {
        let prev = self.state.send_replace(next);
        debug!(from = ?prev, to = ?next, "bridge state");
    }

    /// Run the session to completion.
    pub async fn run(self) -> SessionReport {
        let span = info_span!(
            "bridge_session",
            session_id = %self.session.id,
            project_id = self.session.target.project_id,
            infra_id = self.session.target.infra_id,
            operation_id = %self.session.target.operation_id,
        );
        self.run_inner().instrument(span).await
    }

    async fn run_inner(self) -> SessionReport {
        let started = Instant::now();
        let forwarded = Arc::new(AtomicU64::new(0));
        let (mut bus, upstream_publisher, client_publisher) = TerminationBus::new();

        let mut pumps = JoinSet::new();
        let _ = pumps.spawn(
            upstream_pump(
                Arc::clone(&self.session.upstream),
                Arc::clone(&self.session.client),
                self.session.scope.clone(),
                Arc::clone(&forwarded),
                upstream_publisher,
            )
            .in_current_span(),
        );
        let _ = pumps.spawn(
            client_watch_pump(Arc::clone(&self.session.client), client_publisher)
                .in_current_span(),
        );
        self.transition(BridgeState::Streaming);
        counter!(BRIDGE_SESSIONS_TOTAL).increment(1);
        gauge!(BRIDGE_SESSIONS_ACTIVE).increment(1.0);
        info!("state stream session started");

        let first = if let Some(signal) = bus.recv().await {
            signal
        } else {
            // Both pumps exited without reporting (panicked).
            warn!("pumps stopped without a termination signal");
            TerminationSignal::ClientClosed
        };
        let (trigger, err) = first.into_parts();

        self.transition(BridgeState::Draining);
        self.teardown().await;
        let forced_shutdown = self.drain(&mut bus, &mut pumps).await;
        bus.close();
        self.transition(BridgeState::Closed);

        if let Some(err) = &err {
            self.reporter
                .report(&self.session.id, &self.session.target, err);
        }

        let duration = started.elapsed();
        let updates_forwarded = forwarded.load(Ordering::Relaxed);
        gauge!(BRIDGE_SESSIONS_ACTIVE).decrement(1.0);
        counter!(BRIDGE_TERMINATIONS_TOTAL, "trigger" => trigger.as_str()).increment(1);
        histogram!(BRIDGE_SESSION_DURATION_SECONDS).record(duration.as_secs_f64());
        info!(
            trigger = %trigger,
            updates_forwarded,
            duration_ms = duration.as_millis() as u64,
            forced_shutdown,
            "state stream session closed"
        );

        SessionReport {
            session_id: self.session.id,
            trigger,
            error: err,
            updates_forwarded,
            duration,
            forced_shutdown,
        }
    }

    /// Cancel the scope, then close upstream, then close the client.
    async fn teardown(&self) {
        self.session.scope.cancel();
        self.session.upstream.close().await;
        self.session.client.close().await;
    }

    /// Wait for both pumps, aborting them after the drain timeout.
    /// Returns whether they had to be aborted.
    async fn drain(&self, bus: &mut TerminationBus, pumps: &mut JoinSet<()>) -> bool {
        let drained = async {
            while let Some(signal) = bus.recv().await {
                debug!(signal = %signal.kind(), "drained termination signal");
            }
            while let Some(joined) = pumps.join_next().await {
                if let Err(err) = joined {
                    warn!(error = %err, "pump task failed");
                }
            }
        };

        if tokio::time::timeout(self.config.drain_timeout, drained)
            .await
            .is_ok()
        {
            return false;
        }

        warn!(
            timeout_ms = self.config.drain_timeout.as_millis() as u64,
            remaining = pumps.len(),
            "drain timed out, aborting pumps"
        );
        counter!(BRIDGE_FORCED_SHUTDOWNS_TOTAL).increment(1);
        pumps.abort_all();
        while pumps.join_next().await.is_some() {}
        true
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::UpstreamError;
    use crate::fakes::{
        DeafUpstream, FakeClient, FakeUpstream, RecordingReporter, StubbornUpstream, StuckClient,
        update,
    };
    use crate::upstream::UpstreamEvent;

    const TIMEOUT: Duration = Duration::from_secs(5);

    fn target() -> InfraTarget {
        InfraTarget::new(1, 2, "op-1").with_kind("eks").with_suffix("abc")
    }

    fn controller(
        upstream: Arc<dyn UpstreamSource>,
        client: Arc<dyn ClientChannel>,
        scope: CancellationToken,
        reporter: Arc<RecordingReporter>,
    ) -> BridgeController {
        let session = Session::new(target(), scope, upstream, client);
        BridgeController::new(session, BridgeConfig::default()).with_reporter(reporter)
    }

    async fn run_with_timeout(controller: BridgeController) -> SessionReport {
        tokio::time::timeout(TIMEOUT, controller.run())
            .await
            .expect("session did not close in time")
    }

    #[tokio::test]
    async fn forwards_every_update_in_order() {
        let updates: Vec<_> = (0..25).map(update).collect();
        let mut script: Vec<_> = updates.iter().cloned().map(UpstreamEvent::Update).collect();
        script.push(UpstreamEvent::EndOfStream);
        let upstream = FakeUpstream::scripted(script);
        let client = FakeClient::new();
        let reporter = Arc::new(RecordingReporter::default());

        let report = run_with_timeout(controller(
            upstream.clone(),
            client.clone(),
            CancellationToken::new(),
            reporter.clone(),
        ))
        .await;

        assert_eq!(client.sent(), updates);
        assert_eq!(report.updates_forwarded, 25);
        assert_eq!(report.trigger, TerminationKind::UpstreamEnded);
        assert!(report.error.is_none());
        assert!(reporter.reports().is_empty());
    }

    #[tokio::test]
    async fn client_close_stops_forwarding_and_cancels() {
        let (upstream, tx) = FakeUpstream::new();
        let client = FakeClient::new();
        let scope = CancellationToken::new();
        let reporter = Arc::new(RecordingReporter::default());
        let ctrl = controller(upstream.clone(), client.clone(), scope.clone(), reporter.clone());
        let mut state = ctrl.subscribe();
        let handle = tokio::spawn(ctrl.run());

        tx.send(UpstreamEvent::Update(update(0))).unwrap();
        while client.sent().is_empty() {
            tokio::task::yield_now().await;
        }

        client.peer_close();
        let _ = state
            .wait_for(|s| *s != BridgeState::Streaming)
            .await
            .unwrap();
        assert!(scope.is_cancelled());

        // Enqueued after closure was detected.
        let _ = tx.send(UpstreamEvent::Update(update(1)));
        let _ = tx.send(UpstreamEvent::Update(update(2)));

        let report = tokio::time::timeout(TIMEOUT, handle).await.unwrap().unwrap();
        assert_eq!(client.sent(), vec![update(0)]);
        assert_eq!(report.trigger, TerminationKind::ClientClosed);
        assert!(report.error.is_none());
        assert_eq!(upstream.close_calls(), 1);
        assert!(reporter.reports().is_empty());
        assert_eq!(*state.borrow(), BridgeState::Closed);
    }

    #[tokio::test]
    async fn updates_after_client_close_never_reach_a_writable_client() {
        // Neither transport refuses traffic on its own: only the pump's
        // cancellation check keeps late updates off the socket.
        let (upstream, tx) = StubbornUpstream::new();
        let client = FakeClient::lenient();
        let scope = CancellationToken::new();
        let reporter = Arc::new(RecordingReporter::default());
        let ctrl = controller(upstream, client.clone(), scope.clone(), reporter.clone());
        let mut state = ctrl.subscribe();
        let handle = tokio::spawn(ctrl.run());

        tx.send(UpstreamEvent::Update(update(0))).unwrap();
        while client.sent().is_empty() {
            tokio::task::yield_now().await;
        }

        client.peer_close();
        let _ = state
            .wait_for(|s| *s != BridgeState::Streaming)
            .await
            .unwrap();
        let _ = tx.send(UpstreamEvent::Update(update(1)));
        let _ = tx.send(UpstreamEvent::Update(update(2)));

        let report = tokio::time::timeout(TIMEOUT, handle).await.unwrap().unwrap();
        assert_eq!(client.sent(), vec![update(0)]);
        assert_eq!(client.attempts(), 1);
        assert_eq!(report.updates_forwarded, 1);
        assert_eq!(report.trigger, TerminationKind::ClientClosed);
        assert!(!report.forced_shutdown);
        assert!(reporter.reports().is_empty());
    }

    #[tokio::test]
    async fn transport_error_after_k_updates_reports_once() {
        let upstream = FakeUpstream::scripted(vec![
            UpstreamEvent::Update(update(0)),
            UpstreamEvent::Update(update(1)),
            UpstreamEvent::Update(update(2)),
            UpstreamEvent::TransportError(UpstreamError::Status {
                code: "Unavailable".into(),
                message: "provisioner restarted".into(),
            }),
            UpstreamEvent::Update(update(3)),
        ]);
        let client = FakeClient::new();
        let reporter = Arc::new(RecordingReporter::default());
        let ctrl = controller(
            upstream.clone(),
            client.clone(),
            CancellationToken::new(),
            reporter.clone(),
        );
        let session_id = ctrl.session_id().clone();

        let report = run_with_timeout(ctrl).await;

        assert_eq!(client.sent().len(), 3);
        assert_eq!(report.updates_forwarded, 3);
        assert_eq!(report.trigger, TerminationKind::UpstreamFailed);
        assert!(matches!(report.error, Some(BridgeError::Upstream(_))));

        let reports = reporter.reports();
        assert_eq!(reports.len(), 1);
        assert_eq!(reports[0].0, session_id);
        assert!(reports[0].1.contains("provisioner restarted"));

        assert!(client.is_closed());
        assert_eq!(client.close_calls(), 1);
        assert_eq!(upstream.close_calls(), 1);
    }

    #[tokio::test]
    async fn send_failure_stops_the_upstream_pump_immediately() {
        let upstream = FakeUpstream::scripted(vec![
            UpstreamEvent::Update(update(0)),
            UpstreamEvent::Update(update(1)),
            UpstreamEvent::Update(update(2)),
            UpstreamEvent::EndOfStream,
        ]);
        let client = FakeClient::failing_on(1);
        let reporter = Arc::new(RecordingReporter::default());

        let report = run_with_timeout(controller(
            upstream.clone(),
            client.clone(),
            CancellationToken::new(),
            reporter.clone(),
        ))
        .await;

        assert_eq!(client.sent(), vec![update(0)]);
        assert_eq!(report.trigger, TerminationKind::ForwardFailed);
        assert!(matches!(report.error, Some(BridgeError::Forward(_))));
        assert_eq!(reporter.reports().len(), 1);
        assert_eq!(client.attempts(), 2);
    }

    #[tokio::test]
    async fn repeated_close_is_harmless() {
        let (upstream, _tx) = FakeUpstream::new();
        let client = FakeClient::new();
        let reporter = Arc::new(RecordingReporter::default());
        let ctrl = controller(
            upstream.clone(),
            client.clone(),
            CancellationToken::new(),
            reporter.clone(),
        );
        let handle = tokio::spawn(ctrl.run());

        // Race the controller: both transports are closed from outside first.
        upstream.close().await;
        upstream.close().await;
        client.close().await;
        client.close().await;

        let report = tokio::time::timeout(TIMEOUT, handle).await.unwrap().unwrap();
        assert!(!report.trigger.is_error());
        assert!(report.error.is_none());
        assert!(!report.forced_shutdown);
        assert_eq!(upstream.close_calls(), 3);
        assert_eq!(client.close_calls(), 3);
        assert!(reporter.reports().is_empty());

        // And again after the session closed.
        upstream.close().await;
        client.close().await;
        assert!(matches!(upstream.next().await, UpstreamEvent::Cancelled));
        assert!(matches!(
            client.send(&update(9)).await,
            Err(crate::error::SendError::Closed)
        ));
    }

    #[tokio::test]
    async fn empty_stream_closes_client_without_error() {
        let upstream = FakeUpstream::scripted(vec![UpstreamEvent::EndOfStream]);
        let client = FakeClient::new();
        let reporter = Arc::new(RecordingReporter::default());

        let report = run_with_timeout(controller(
            upstream,
            client.clone(),
            CancellationToken::new(),
            reporter.clone(),
        ))
        .await;

        assert_eq!(report.trigger, TerminationKind::UpstreamEnded);
        assert_eq!(report.updates_forwarded, 0);
        assert!(report.error.is_none());
        assert!(client.is_closed());
        assert!(client.sent().is_empty());
        assert!(reporter.reports().is_empty());
    }

    #[tokio::test]
    async fn scope_cancellation_unblocks_a_pump_stuck_in_next() {
        let client = FakeClient::new();
        let scope = CancellationToken::new();
        let reporter = Arc::new(RecordingReporter::default());
        let ctrl = controller(
            Arc::new(DeafUpstream),
            client.clone(),
            scope.clone(),
            reporter.clone(),
        );
        let mut state = ctrl.subscribe();
        let handle = tokio::spawn(ctrl.run());

        let _ = state
            .wait_for(|s| *s == BridgeState::Streaming)
            .await
            .unwrap();
        scope.cancel();

        let report = tokio::time::timeout(TIMEOUT, handle).await.unwrap().unwrap();
        assert_eq!(report.trigger, TerminationKind::UpstreamCancelled);
        assert!(report.error.is_none());
        assert!(!report.forced_shutdown);
        assert!(client.is_closed());
        assert_eq!(*state.borrow(), BridgeState::Closed);
    }

    #[tokio::test(start_paused = true)]
    async fn stuck_pump_is_aborted_after_drain_timeout() {
        let upstream = FakeUpstream::scripted(vec![UpstreamEvent::EndOfStream]);
        let reporter = Arc::new(RecordingReporter::default());
        let session = Session::new(
            target(),
            CancellationToken::new(),
            upstream,
            Arc::new(StuckClient),
        );
        let config = BridgeConfig {
            drain_timeout: Duration::from_millis(250),
        };
        let ctrl = BridgeController::new(session, config).with_reporter(reporter.clone());
        let state = ctrl.subscribe();

        let report = ctrl.run().await;

        assert!(report.forced_shutdown);
        assert_eq!(report.trigger, TerminationKind::UpstreamEnded);
        assert!(report.error.is_none());
        assert!(report.duration >= Duration::from_millis(250));
        assert_eq!(*state.borrow(), BridgeState::Closed);
    }

    #[tokio::test]
    async fn state_starts_idle() {
        let (upstream, _tx) = FakeUpstream::new();
        let ctrl = controller(
            upstream,
            FakeClient::new(),
            CancellationToken::new(),
            Arc::new(RecordingReporter::default()),
        );
        assert_eq!(*ctrl.subscribe().borrow(), BridgeState::Idle);
    }

    #[test]
    fn default_drain_timeout_is_five_seconds() {
        assert_eq!(BridgeConfig::default().drain_timeout, Duration::from_secs(5));
    }
}
