//! `GET .../operations/{operation_id}/state`: one bridge session per socket.
//!
//! The upstream stream is opened before the upgrade so resolution and
//! provisioner failures surface as HTTP errors instead of a socket that
//! closes immediately.

use std::sync::Arc;

use axum::extract::ws::{WebSocket, WebSocketUpgrade};
use axum::extract::{Path, Query, State};
use axum::response::Response;
use keel_bridge::{BridgeController, Session, UpstreamSource};
use keel_core::InfraTarget;
use metrics::counter;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use crate::error::ApiError;
use crate::metrics::{STATE_STREAM_REQUESTS_TOTAL, WS_UPGRADE_FAILURES_TOTAL};
use crate::resolver::{StateStreamQuery, StateStreamRequest};
use crate::server::AppState;
use crate::sessions::SessionPermit;
use crate::websocket::channel::WsClientChannel;

/// Upgrade handler for the state stream route.
pub async fn state_stream_handler(
    ws: WebSocketUpgrade,
    Path((project_id, infra_id, operation_id)): Path<(u64, u64, String)>,
    Query(query): Query<StateStreamQuery>,
    State(state): State<AppState>,
) -> Result<Response, ApiError> {
    counter!(STATE_STREAM_REQUESTS_TOTAL).increment(1);

    if state.shutdown.is_shutting_down() {
        return Err(ApiError::ShuttingDown);
    }
    let permit = state.sessions.try_acquire().ok_or_else(|| {
        warn!(
            max = state.sessions.max(),
            "state stream refused, session limit reached"
        );
        ApiError::TooManySessions
    })?;

    let target = state
        .resolver
        .resolve(StateStreamRequest {
            project_id,
            infra_id,
            operation_id,
            query,
        })
        .await?;

    let scope = state.shutdown.session_scope();
    let upstream = match state.connector.open(&target, scope.clone()).await {
        Ok(upstream) => upstream,
        Err(err) => {
            scope.cancel();
            info!(infra = %target, error = %err, "state stream open failed");
            return Err(err.into());
        }
    };
    debug!(infra = %target, "upstream opened, upgrading");

    let failed_upstream = Arc::clone(&upstream);
    let failed_scope = scope.clone();
    Ok(ws
        .max_message_size(state.channel.max_message_size)
        .on_failed_upgrade(move |err| {
            counter!(WS_UPGRADE_FAILURES_TOTAL).increment(1);
            warn!(error = %err, "websocket upgrade failed");
            failed_scope.cancel();
            drop(tokio::spawn(async move { failed_upstream.close().await }));
        })
        .on_upgrade(move |socket| run_session(socket, state, target, scope, upstream, permit)))
}

async fn run_session(
    socket: WebSocket,
    state: AppState,
    target: InfraTarget,
    scope: CancellationToken,
    upstream: Arc<dyn UpstreamSource>,
    permit: SessionPermit,
) {
    let client = Arc::new(WsClientChannel::new(socket, state.channel.clone()));
    let session = Session::new(target, scope, upstream, client);
    let controller =
        BridgeController::new(session, state.bridge.clone()).with_reporter(Arc::clone(&state.reporter));

    let handle = state.shutdown.track_future(async move {
        let _permit = permit;
        controller.run().await
    });
    match handle.await {
        Ok(report) => info!(
            session_id = %report.session_id,
            trigger = %report.trigger,
            updates = report.updates_forwarded,
            duration_ms = report.duration.as_millis() as u64,
            forced = report.forced_shutdown,
            "state stream session ended"
        ),
        Err(err) => warn!(error = %err, "state stream session task failed"),
    }
}
