//! WebSocket endpoint: one session task per connected UI client.
//!
//! Each connection gets a single outbound frame queue drained by one writer
//! task, so every producer (agent updates, MCP dispatches, status frames)
//! funnels through one serialized sink and source order is preserved.
//!
//! A panic while handling one frame is caught, logged, and tears down only
//! that session; other sessions are unaffected.

use std::collections::HashMap;
use std::sync::Arc;

use axum::extract::ws::{CloseFrame, Message, WebSocket, WebSocketUpgrade};
use axum::extract::{Query, State};
use axum::response::Response;
use futures_util::{FutureExt, SinkExt, StreamExt};
use tokio::sync::mpsc;
use tracing::{debug, error, info, warn};

use super::{auth, AppState};
use crate::bridge::Bridge;
use crate::server::frames::{ServerFrame, UiFrame};
use crate::session::{SessionCtx, SessionHandle};

/// Depth of the per-session outbound frame queue.
const FRAME_QUEUE_DEPTH: usize = 64;

/// `GET /ws` — authenticate and upgrade.
pub async fn ws_handler(
    ws: WebSocketUpgrade,
    Query(params): Query<HashMap<String, String>>,
    State(state): State<Arc<AppState>>,
) -> Response {
    let presented = params.get("token").map(String::as_str);
    if !auth::check_upgrade(&state.config.auth, presented) {
        return ws.on_upgrade(|mut socket| async move {
            let _ = socket
                .send(Message::Close(Some(CloseFrame {
                    code: auth::CLOSE_INVALID_TOKEN,
                    reason: auth::CLOSE_REASON.into(),
                })))
                .await;
        });
    }

    ws.on_upgrade(move |socket| run_session(socket, state))
}

/// Drive one UI session until the socket closes.
async fn run_session(socket: WebSocket, state: Arc<AppState>) {
    let (mut sink, mut stream) = socket.split();
    let session_id = uuid::Uuid::new_v4().to_string();
    let (frame_tx, mut frame_rx) = mpsc::channel::<ServerFrame>(FRAME_QUEUE_DEPTH);

    let ctx = Arc::new(SessionCtx::new(session_id.clone(), frame_tx.clone()));
    state
        .registry
        .register(SessionHandle {
            id: session_id.clone(),
            frame_tx,
        })
        .await;
    info!(session_id, "UI client connected");

    // Single writer: the only task that touches the sink.
    let writer = {
        let session_id = session_id.clone();
        tokio::spawn(async move {
            while let Some(frame) = frame_rx.recv().await {
                let text = match serde_json::to_string(&frame) {
                    Ok(text) => text,
                    Err(err) => {
                        warn!(session_id, %err, "failed to serialise outbound frame");
                        continue;
                    }
                };
                if sink.send(Message::Text(text.into())).await.is_err() {
                    debug!(session_id, "socket sink closed, stopping writer");
                    break;
                }
            }
        })
    };

    let mut bridge = Bridge::new(
        Arc::clone(&ctx),
        Arc::clone(&state.config),
        state.watchers.clone(),
        state.pending.clone(),
    );

    loop {
        let message = tokio::select! {
            biased;

            () = state.shutdown.cancelled() => {
                debug!(session_id, "shutdown requested, closing session");
                break;
            }

            message = stream.next() => match message {
                Some(message) => message,
                None => break,
            },
        };

        match message {
            Ok(Message::Text(text)) => {
                let frame: UiFrame = match serde_json::from_str(&text) {
                    Ok(frame) => frame,
                    Err(err) => {
                        warn!(session_id, %err, "unrecognised UI frame, dropping");
                        continue;
                    }
                };
                let dispatch =
                    std::panic::AssertUnwindSafe(bridge.handle_frame(frame)).catch_unwind();
                if dispatch.await.is_err() {
                    error!(session_id, "session task panicked; tearing this session down");
                    break;
                }
            }
            Ok(Message::Close(_)) => {
                debug!(session_id, "UI client sent close");
                break;
            }
            Ok(_) => {
                // Ping/pong are handled by the transport; binary is not
                // part of the protocol.
            }
            Err(err) => {
                debug!(session_id, %err, "socket error");
                break;
            }
        }
    }

    // The session is terminal: no reattach.
    bridge.teardown().await;
    state.registry.remove(&session_id).await;
    writer.abort();
    info!(session_id, "UI client disconnected");
}
