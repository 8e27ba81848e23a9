//! In-memory transports for exercising the controller.

use std::sync::Arc;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};

use async_trait::async_trait;
use keel_core::{InfraTarget, SessionId, StateUpdate};
use parking_lot::Mutex;
use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;

use crate::client::ClientChannel;
use crate::controller::ErrorReporter;
use crate::error::{BridgeError, SendError};
use crate::upstream::{UpstreamEvent, UpstreamSource};

pub(crate) fn update(n: usize) -> StateUpdate {
    StateUpdate::new(format!("aws_instance.node[{n}]"), "created")
}

/// Upstream fed through a channel. An exhausted script stays open.
pub(crate) struct FakeUpstream {
    rx: tokio::sync::Mutex<mpsc::UnboundedReceiver<UpstreamEvent>>,
    closed: AtomicBool,
    close_calls: AtomicUsize,
    close_token: CancellationToken,
}

impl FakeUpstream {
    pub(crate) fn new() -> (Arc<Self>, mpsc::UnboundedSender<UpstreamEvent>) {
        let (tx, rx) = mpsc::unbounded_channel();
        let source = Arc::new(Self {
            rx: tokio::sync::Mutex::new(rx),
            closed: AtomicBool::new(false),
            close_calls: AtomicUsize::new(0),
            close_token: CancellationToken::new(),
        });
        (source, tx)
    }

    pub(crate) fn scripted(events: Vec<UpstreamEvent>) -> Arc<Self> {
        let (source, tx) = Self::new();
        for event in events {
            tx.send(event).unwrap();
        }
        source
    }

    pub(crate) fn close_calls(&self) -> usize {
        self.close_calls.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl UpstreamSource for FakeUpstream {
    async fn next(&self) -> UpstreamEvent {
        if self.closed.load(Ordering::SeqCst) {
            return UpstreamEvent::Cancelled;
        }
        let mut rx = self.rx.lock().await;
        tokio::select! {
            () = self.close_token.cancelled() => UpstreamEvent::Cancelled,
            event = rx.recv() => match event {
                Some(event) => event,
                None => {
                    self.close_token.cancelled().await;
                    UpstreamEvent::Cancelled
                }
            },
        }
    }

    async fn close(&self) {
        let _ = self.close_calls.fetch_add(1, Ordering::SeqCst);
        if !self.closed.swap(true, Ordering::SeqCst) {
            self.close_token.cancel();
        }
    }
}

/// Upstream that ignores `close` and keeps delivering whatever is pushed.
pub(crate) struct StubbornUpstream {
    rx: tokio::sync::Mutex<mpsc::UnboundedReceiver<UpstreamEvent>>,
}

impl StubbornUpstream {
    pub(crate) fn new() -> (Arc<Self>, mpsc::UnboundedSender<UpstreamEvent>) {
        let (tx, rx) = mpsc::unbounded_channel();
        let source = Arc::new(Self {
            rx: tokio::sync::Mutex::new(rx),
        });
        (source, tx)
    }
}

#[async_trait]
impl UpstreamSource for StubbornUpstream {
    async fn next(&self) -> UpstreamEvent {
        let mut rx = self.rx.lock().await;
        match rx.recv().await {
            Some(event) => event,
            None => std::future::pending().await,
        }
    }

    async fn close(&self) {}
}

/// Upstream that only the session scope can interrupt.
pub(crate) struct DeafUpstream;

#[async_trait]
impl UpstreamSource for DeafUpstream {
    async fn next(&self) -> UpstreamEvent {
        std::future::pending().await
    }

    async fn close(&self) {}
}

/// Client that records what it was sent.
pub(crate) struct FakeClient {
    sent: Mutex<Vec<StateUpdate>>,
    closed: AtomicBool,
    close_calls: AtomicUsize,
    gone: CancellationToken,
    attempts: AtomicUsize,
    fail_on: Option<usize>,
    lenient: bool,
}

impl FakeClient {
    pub(crate) fn new() -> Arc<Self> {
        Self::build(None, false)
    }

    /// Fail the send attempt with this zero-based index.
    pub(crate) fn failing_on(index: usize) -> Arc<Self> {
        Self::build(Some(index), false)
    }

    /// Accepts sends after the peer hangs up and after `close`, like a
    /// socket whose write half outlives the read half.
    pub(crate) fn lenient() -> Arc<Self> {
        Self::build(None, true)
    }

    fn build(fail_on: Option<usize>, lenient: bool) -> Arc<Self> {
        Arc::new(Self {
            sent: Mutex::new(Vec::new()),
            closed: AtomicBool::new(false),
            close_calls: AtomicUsize::new(0),
            gone: CancellationToken::new(),
            attempts: AtomicUsize::new(0),
            fail_on,
            lenient,
        })
    }

    /// Simulate the peer hanging up.
    pub(crate) fn peer_close(&self) {
        if !self.lenient {
            self.closed.store(true, Ordering::SeqCst);
        }
        self.gone.cancel();
    }

    pub(crate) fn sent(&self) -> Vec<StateUpdate> {
        self.sent.lock().clone()
    }

    pub(crate) fn is_closed(&self) -> bool {
        self.closed.load(Ordering::SeqCst)
    }

    pub(crate) fn close_calls(&self) -> usize {
        self.close_calls.load(Ordering::SeqCst)
    }

    pub(crate) fn attempts(&self) -> usize {
        self.attempts.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl ClientChannel for FakeClient {
    async fn send(&self, update: &StateUpdate) -> Result<(), SendError> {
        if !self.lenient && self.closed.load(Ordering::SeqCst) {
            return Err(SendError::Closed);
        }
        let attempt = self.attempts.fetch_add(1, Ordering::SeqCst);
        if self.fail_on == Some(attempt) {
            return Err(SendError::Transport("broken pipe".into()));
        }
        self.sent.lock().push(update.clone());
        Ok(())
    }

    async fn watch_for_close(&self) {
        self.gone.cancelled().await;
    }

    async fn close(&self) {
        let _ = self.close_calls.fetch_add(1, Ordering::SeqCst);
        if !self.closed.swap(true, Ordering::SeqCst) {
            self.gone.cancel();
        }
    }
}

/// Client whose close watch never resolves.
pub(crate) struct StuckClient;

#[async_trait]
impl ClientChannel for StuckClient {
    async fn send(&self, _update: &StateUpdate) -> Result<(), SendError> {
        Ok(())
    }

    async fn watch_for_close(&self) {
        std::future::pending().await
    }

    async fn close(&self) {}
}

/// Reporter that keeps every report.
#[derive(Default)]
pub(crate) struct RecordingReporter {
    reports: Mutex<Vec<(SessionId, String)>>,
}

impl RecordingReporter {
    pub(crate) fn reports(&self) -> Vec<(SessionId, String)> {
        self.reports.lock().clone()
    }
}

impl ErrorReporter for RecordingReporter {
    fn report(&self, session_id: &SessionId, _target: &InfraTarget, error: &BridgeError) {
        self.reports.lock().push((session_id.clone(), error.to_string()));
    }
}
