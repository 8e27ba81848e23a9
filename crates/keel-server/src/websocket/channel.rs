//! [`ClientChannel`] over an axum WebSocket.

use std::pin::Pin;
use std::sync::atomic::{AtomicBool, Ordering};
use std::time::Duration;

use async_trait::async_trait;
use axum::body::Bytes;
use axum::extract::ws::{CloseFrame, Message, WebSocket, close_code};
use futures::stream::BoxStream;
use futures::{Sink, SinkExt, StreamExt};
use keel_bridge::{ClientChannel, SendError};
use keel_core::StateUpdate;
use metrics::counter;
use tokio::sync::Mutex;
use tokio::time::{self, MissedTickBehavior};
use tokio_util::sync::CancellationToken;
use tracing::{debug, trace};

use super::heartbeat::{Heartbeat, HeartbeatTick};
use crate::metrics::WS_HEARTBEAT_TIMEOUTS_TOTAL;

/// Write half of a client socket.
pub type WsSink = Pin<Box<dyn Sink<Message, Error = axum::Error> + Send>>;
/// Read half of a client socket.
pub type WsStream = BoxStream<'static, Result<Message, axum::Error>>;

/// Shortest usable ping interval; zero would stall the ticker.
pub const MIN_HEARTBEAT_INTERVAL: Duration = Duration::from_millis(1);

/// Per-connection settings.
#[derive(Clone, Debug)]
pub struct ChannelConfig {
    /// Interval between pings.
    pub heartbeat_interval: Duration,
    /// Silence after which the client is treated as gone.
    pub heartbeat_timeout: Duration,
    /// Largest outbound text frame.
    pub max_message_size: usize,
    /// Bound on the close handshake.
    pub close_timeout: Duration,
}

impl ChannelConfig {
    /// Ping interval, never below [`MIN_HEARTBEAT_INTERVAL`].
    pub fn ping_interval(&self) -> Duration {
        self.heartbeat_interval.max(MIN_HEARTBEAT_INTERVAL)
    }
}

impl Default for ChannelConfig {
    fn default() -> Self {
        Self {
            heartbeat_interval: Duration::from_secs(30),
            heartbeat_timeout: Duration::from_secs(60),
            max_message_size: 1024 * 1024,
            close_timeout: Duration::from_secs(1),
        }
    }
}

/// One client's WebSocket, split so sending and close detection run
/// independently.
pub struct WsClientChannel {
    sink: Mutex<WsSink>,
    stream: Mutex<WsStream>,
    config: ChannelConfig,
    closed: AtomicBool,
    local_close: CancellationToken,
}

impl WsClientChannel {
    /// Take ownership of an upgraded socket.
    pub fn new(socket: WebSocket, config: ChannelConfig) -> Self {
        let (sink, stream) = socket.split();
        Self::from_parts(Box::pin(sink), stream.boxed(), config)
    }

    /// Build from separate halves.
    pub fn from_parts(sink: WsSink, stream: WsStream, config: ChannelConfig) -> Self {
        Self {
            sink: Mutex::new(sink),
            stream: Mutex::new(stream),
            config,
            closed: AtomicBool::new(false),
            local_close: CancellationToken::new(),
        }
    }

    /// Whether `close` has been called.
    pub fn is_closed(&self) -> bool {
        self.closed.load(Ordering::Acquire)
    }

    /// Best-effort ping, bounded by one heartbeat interval.
    async fn ping(&self) -> bool {
        let ping = async {
            let mut sink = self.sink.lock().await;
            sink.send(Message::Ping(Bytes::new())).await
        };
        matches!(
            time::timeout(self.config.ping_interval(), ping).await,
            Ok(Ok(()))
        )
    }
}

#[async_trait]
impl ClientChannel for WsClientChannel {
    async fn send(&self, update: &StateUpdate) -> Result<(), SendError> {
        if self.is_closed() {
            return Err(SendError::Closed);
        }
        let text = update.to_json()?;
        if text.len() > self.config.max_message_size {
            return Err(SendError::TooLarge {
                size: text.len(),
                limit: self.config.max_message_size,
            });
        }

        let mut sink = tokio::select! {
            biased;
            () = self.local_close.cancelled() => return Err(SendError::Closed),
            sink = self.sink.lock() => sink,
        };
        tokio::select! {
            biased;
            () = self.local_close.cancelled() => Err(SendError::Closed),
            result = sink.send(Message::Text(text.into())) => {
                result.map_err(|e| SendError::Transport(e.to_string()))
            }
        }
    }

    async fn watch_for_close(&self) {
        let mut stream = self.stream.lock().await;
        let interval = self.config.ping_interval();
        let mut heartbeat = Heartbeat::new(interval, self.config.heartbeat_timeout);
        let mut ticker = time::interval_at(time::Instant::now() + interval, interval);
        ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);

        let reason = loop {
            tokio::select! {
                biased;
                () = self.local_close.cancelled() => break "closed locally",
                frame = stream.next() => match frame {
                    Some(Ok(Message::Close(frame))) => {
                        debug!(?frame, "close frame received");
                        break "peer closed";
                    }
                    // Client payloads are not part of the protocol; any frame
                    // still proves the peer is there.
                    Some(Ok(_)) => heartbeat.mark_alive(),
                    Some(Err(err)) => {
                        debug!(error = %err, "websocket read failed");
                        break "transport error";
                    }
                    None => break "peer disconnected",
                },
                _ = ticker.tick() => match heartbeat.tick() {
                    HeartbeatTick::TimedOut => {
                        counter!(WS_HEARTBEAT_TIMEOUTS_TOTAL).increment(1);
                        break "heartbeat timeout";
                    }
                    HeartbeatTick::Ping => tokio::select! {
                        biased;
                        () = self.local_close.cancelled() => break "closed locally",
                        delivered = self.ping() => if !delivered {
                            trace!("ping not delivered");
                        },
                    },
                },
            }
        };
        debug!(reason, "client channel ended");
    }

    async fn close(&self) {
        if self.closed.swap(true, Ordering::AcqRel) {
            return;
        }
        self.local_close.cancel();

        let goodbye = async {
            let mut sink = self.sink.lock().await;
            let frame = CloseFrame {
                code: close_code::NORMAL,
                reason: "state stream closed".into(),
            };
            let _ = sink.send(Message::Close(Some(frame))).await;
            let _ = sink.close().await;
        };
        if time::timeout(self.config.close_timeout, goodbye).await.is_err() {
            debug!("close handshake timed out");
        }
    }
}
