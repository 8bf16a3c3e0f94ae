//! JSON-RPC 2.0 client over the agent's stdio.
//!
//! One reader task decodes NDJSON lines from the agent's stdout; one writer
//! task serialises outbound messages to its stdin. Outbound calls carry
//! monotonic numeric ids and park a oneshot resolver in a pending map;
//! responses resolve by id and unmatched responses are dropped with a
//! warning.
//!
//! Agent-initiated traffic is dispatched to an [`AgentHandler`]:
//!
//! - `session/update` notifications are forwarded **inline**, in stdout
//!   order — the causal order of updates is a protocol guarantee and must
//!   survive the hop to the UI.
//! - Requests (`session/requestPermission`, `fs/readTextFile`,
//!   `fs/writeTextFile`) may block for minutes, so each one runs in its own
//!   task; the response reuses the incoming id.
//!
//! A stdout line that is not JSON is a protocol error: every outstanding
//! call is rejected, the connection shuts down, and the owning session is
//! handed the offending line.

use std::collections::HashMap;
use std::future::Future;
use std::pin::Pin;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

use futures_util::StreamExt;
use serde_json::{json, Value};
use tokio::io::{AsyncRead, AsyncWrite, AsyncWriteExt};
use tokio::sync::{mpsc, oneshot, Mutex};
use tokio_util::codec::FramedRead;
use tokio_util::sync::CancellationToken;
use tracing::{debug, warn};

use crate::acp::codec::NdjsonCodec;
use crate::{AppError, Result};

/// Boxed future used by [`AgentHandler`] so the trait stays object-safe.
pub type BoxFuture<'a, T> = Pin<Box<dyn Future<Output = T> + Send + 'a>>;

/// Lifecycle signals the client surfaces to its owning session.
#[derive(Debug, Clone)]
pub enum AgentLifecycle {
    /// The agent's stdout reached EOF or the process exited.
    Exited {
        /// Human-readable reason.
        reason: String,
    },
    /// A stdout line failed to parse as JSON.
    ProtocolError {
        /// The offending line.
        line: String,
    },
}

/// The client half of ACP: callbacks the agent may invoke on the proxy.
pub trait AgentHandler: Send + Sync {
    /// Forward a `session/update` notification. Called inline, in order.
    fn session_update(&self, params: Value) -> BoxFuture<'_, ()>;

    /// Handle `session/requestPermission`. May block until the user decides.
    fn request_permission(&self, params: Value) -> BoxFuture<'_, Result<Value>>;

    /// Handle `fs/readTextFile` under the session sandbox.
    fn read_text_file(&self, params: Value) -> BoxFuture<'_, Result<Value>>;

    /// Handle `fs/writeTextFile` under the session sandbox.
    fn write_text_file(&self, params: Value) -> BoxFuture<'_, Result<Value>>;
}

type PendingCalls = Arc<Mutex<HashMap<u64, oneshot::Sender<Result<Value>>>>>;

/// Handle for issuing JSON-RPC calls to the agent.
///
/// Cloneable; all clones share the same connection.
#[derive(Clone)]
pub struct AgentClient {
    outbound_tx: mpsc::Sender<Value>,
    pending: PendingCalls,
    next_id: Arc<AtomicU64>,
    cancel: CancellationToken,
}

impl AgentClient {
    /// Start the reader/writer tasks over the given stdio streams.
    ///
    /// Lifecycle events (exit, protocol error) are delivered once through
    /// `lifecycle_tx`.
    pub fn start<R, W>(
        stdout: R,
        stdin: W,
        handler: Arc<dyn AgentHandler>,
        lifecycle_tx: mpsc::Sender<AgentLifecycle>,
    ) -> Self
    where
        R: AsyncRead + Unpin + Send + 'static,
        W: AsyncWrite + Unpin + Send + 'static,
    {
        let (outbound_tx, outbound_rx) = mpsc::channel::<Value>(64);
        let pending: PendingCalls = Arc::default();
        let cancel = CancellationToken::new();

        tokio::spawn(run_writer(stdin, outbound_rx, cancel.clone()));
        tokio::spawn(run_reader(
            stdout,
            handler,
            Arc::clone(&pending),
            outbound_tx.clone(),
            lifecycle_tx,
            cancel.clone(),
        ));

        Self {
            outbound_tx,
            pending,
            next_id: Arc::new(AtomicU64::new(1)),
            cancel,
        }
    }

    /// Issue a request and await the matching response.
    ///
    /// # Errors
    ///
    /// Returns [`AppError::Acp`] when the agent replied with an RPC error or
    /// the process exited before responding.
    pub async fn call(&self, method: &str, params: Value) -> Result<Value> {
        let id = self.next_id.fetch_add(1, Ordering::Relaxed);
        let (tx, rx) = oneshot::channel();
        self.pending.lock().await.insert(id, tx);

        let msg = json!({ "jsonrpc": "2.0", "id": id, "method": method, "params": params });
        if self.outbound_tx.send(msg).await.is_err() {
            self.pending.lock().await.remove(&id);
            return Err(AppError::Acp("agent process exited".into()));
        }

        match rx.await {
            Ok(result) => result,
            Err(_) => Err(AppError::Acp("agent process exited".into())),
        }
    }

    /// Send a notification (no id, no response).
    ///
    /// # Errors
    ///
    /// Returns [`AppError::Acp`] when the connection is closed.
    pub async fn notify(&self, method: &str, params: Value) -> Result<()> {
        let msg = json!({ "jsonrpc": "2.0", "method": method, "params": params });
        self.outbound_tx
            .send(msg)
            .await
            .map_err(|_| AppError::Acp("agent process exited".into()))
    }

    /// Shut the connection down and reject all outstanding calls.
    pub async fn close(&self) {
        self.cancel.cancel();
        reject_all_pending(&self.pending, "agent process exited").await;
    }
}

/// Writer task: serialise outbound values as NDJSON lines on stdin.
async fn run_writer<W>(mut stdin: W, mut rx: mpsc::Receiver<Value>, cancel: CancellationToken)
where
    W: AsyncWrite + Unpin + Send,
{
    loop {
        tokio::select! {
            biased;

            () = cancel.cancelled() => {
                debug!("agent writer: cancellation received, stopping");
                break;
            }

            msg = rx.recv() => {
                let Some(value) = msg else {
                    debug!("agent writer: channel closed, stopping");
                    break;
                };
                let mut bytes = match serde_json::to_vec(&value) {
                    Ok(b) => b,
                    Err(err) => {
                        warn!(%err, "agent writer: failed to serialise outbound message");
                        continue;
                    }
                };
                bytes.push(b'\n');
                if let Err(err) = stdin.write_all(&bytes).await {
                    warn!(%err, "agent writer: write to stdin failed, stopping");
                    break;
                }
            }
        }
    }
    let _ = stdin.shutdown().await;
}

/// Reader task: decode stdout lines and route them.
async fn run_reader<R>(
    stdout: R,
    handler: Arc<dyn AgentHandler>,
    pending: PendingCalls,
    outbound_tx: mpsc::Sender<Value>,
    lifecycle_tx: mpsc::Sender<AgentLifecycle>,
    cancel: CancellationToken,
) where
    R: AsyncRead + Unpin + Send,
{
    let mut framed = FramedRead::new(stdout, NdjsonCodec::new());

    loop {
        tokio::select! {
            biased;

            () = cancel.cancelled() => {
                debug!("agent reader: cancellation received, stopping");
                return;
            }

            item = framed.next() => {
                match item {
                    None => {
                        debug!("agent reader: EOF");
                        reject_all_pending(&pending, "agent process exited").await;
                        let _ = lifecycle_tx
                            .send(AgentLifecycle::Exited { reason: "agent stream closed".into() })
                            .await;
                        return;
                    }
                    Some(Err(err)) => {
                        warn!(%err, "agent reader: stream error, stopping");
                        reject_all_pending(&pending, "agent stream error").await;
                        let _ = lifecycle_tx
                            .send(AgentLifecycle::Exited { reason: format!("agent stream error: {err}") })
                            .await;
                        return;
                    }
                    Some(Ok(line)) => {
                        if line.trim().is_empty() {
                            continue;
                        }
                        let Ok(value) = serde_json::from_str::<Value>(&line) else {
                            warn!(raw_line = %line, "agent reader: non-JSON line, failing connection");
                            reject_all_pending(&pending, "agent protocol error").await;
                            cancel.cancel();
                            let _ = lifecycle_tx
                                .send(AgentLifecycle::ProtocolError { line })
                                .await;
                            return;
                        };
                        dispatch_inbound(value, &handler, &pending, &outbound_tx).await;
                    }
                }
            }
        }
    }
}

/// Route one parsed inbound message.
async fn dispatch_inbound(
    value: Value,
    handler: &Arc<dyn AgentHandler>,
    pending: &PendingCalls,
    outbound_tx: &mpsc::Sender<Value>,
) {
    let method = value.get("method").and_then(Value::as_str);
    let id = value.get("id").cloned();

    match method {
        // Notification: forwarded inline to preserve update ordering.
        Some("session/update") => {
            let params = value.get("params").cloned().unwrap_or(Value::Null);
            handler.session_update(params).await;
        }
        // Requests that may block: one task each, reply reuses the id.
        Some(m @ ("session/requestPermission" | "fs/readTextFile" | "fs/writeTextFile")) => {
            let Some(id) = id else {
                warn!(method = m, "agent reader: request without id, skipping");
                return;
            };
            let method = m.to_owned();
            let params = value.get("params").cloned().unwrap_or(Value::Null);
            let handler = Arc::clone(handler);
            let outbound_tx = outbound_tx.clone();
            tokio::spawn(async move {
                let result = match method.as_str() {
                    "session/requestPermission" => handler.request_permission(params).await,
                    "fs/readTextFile" => handler.read_text_file(params).await,
                    _ => handler.write_text_file(params).await,
                };
                let reply = match result {
                    Ok(result) => json!({ "jsonrpc": "2.0", "id": id, "result": result }),
                    Err(err) => json!({
                        "jsonrpc": "2.0",
                        "id": id,
                        "error": { "code": -32603, "message": err.to_string() },
                    }),
                };
                if outbound_tx.send(reply).await.is_err() {
                    debug!(method, "agent reader: connection closed before reply");
                }
            });
        }
        Some(other) => {
            if let Some(id) = id {
                // Unknown request: decline without tearing the stream down.
                let reply = json!({
                    "jsonrpc": "2.0",
                    "id": id,
                    "error": { "code": -32601, "message": format!("method not found: {other}") },
                });
                let _ = outbound_tx.send(reply).await;
            } else {
                debug!(method = other, "agent reader: skipping unknown notification");
            }
        }
        // No method: a response to one of our calls.
        None => {
            let Some(id) = id.as_ref().and_then(Value::as_u64) else {
                warn!("agent reader: response without a numeric id, dropping");
                return;
            };
            let Some(tx) = pending.lock().await.remove(&id) else {
                warn!(id, "agent reader: unmatched response id, dropping");
                return;
            };
            let outcome = if let Some(error) = value.get("error") {
                let message = error
                    .get("message")
                    .and_then(Value::as_str)
                    .unwrap_or("unknown agent error");
                Err(AppError::Acp(message.to_owned()))
            } else {
                Ok(value.get("result").cloned().unwrap_or(Value::Null))
            };
            let _ = tx.send(outcome);
        }
    }
}

/// Resolve every outstanding call with an error.
async fn reject_all_pending(pending: &PendingCalls, reason: &str) {
    let drained: Vec<_> = pending.lock().await.drain().collect();
    for (_, tx) in drained {
        let _ = tx.send(Err(AppError::Acp(reason.to_owned())));
    }
}
