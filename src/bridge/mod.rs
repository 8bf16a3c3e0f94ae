//! Translation between UI frames and ACP method calls.
//!
//! One [`Bridge`] exists per WebSocket connection, owned by the connection
//! task. It holds the heavyweight session resources — the agent link, the
//! watcher subscription, the lifecycle forwarder — while the shareable
//! state lives in [`SessionCtx`].
//!
//! [`BridgeHandler`] is the client half of ACP: the agent's
//! `session/update` notifications are forwarded to the UI verbatim and in
//! order; `session/requestPermission` parks a resolver with a five-minute
//! deadline and round-trips through the UI; the `fs/*` callbacks are
//! delegated to the sandbox rooted at the session working directory.

use std::path::PathBuf;
use std::sync::atomic::Ordering;
use std::sync::Arc;
use std::time::Duration;

use serde_json::{json, Value};
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tracing::{debug, info, warn};

use crate::acp::client::{AgentHandler, AgentLifecycle, BoxFuture};
use crate::acp::protocol::{
    InitializeResponse, NewSessionResponse, PermissionOutcome, PromptResponse, StopReason,
    PROTOCOL_VERSION,
};
use crate::acp::AgentLink;
use crate::config::ServerConfig;
use crate::mcp::PendingBrowserCalls;
use crate::sandbox;
use crate::sandbox::watcher::{WatchKey, WatcherRegistry};
use crate::server::frames::{ModelState, ServerFrame, UiFrame};
use crate::session::SessionCtx;
use crate::{AppError, Result};

/// Deadline for the ACP `initialize` exchange.
pub const INITIALIZE_TIMEOUT: Duration = Duration::from_secs(10);

/// Per-connection bridge between the UI socket and the agent.
pub struct Bridge {
    ctx: Arc<SessionCtx>,
    config: Arc<ServerConfig>,
    watchers: WatcherRegistry,
    pending_mcp: PendingBrowserCalls,
    agent: Option<AgentLink>,
    lifecycle_task: Option<JoinHandle<()>>,
    watch_key: Option<WatchKey>,
    watch_task: Option<JoinHandle<()>>,
}

impl Bridge {
    /// Create the bridge for one connected UI client.
    #[must_use]
    pub fn new(
        ctx: Arc<SessionCtx>,
        config: Arc<ServerConfig>,
        watchers: WatcherRegistry,
        pending_mcp: PendingBrowserCalls,
    ) -> Self {
        Self {
            ctx,
            config,
            watchers,
            pending_mcp,
            agent: None,
            lifecycle_task: None,
            watch_key: None,
            watch_task: None,
        }
    }

    /// Shared session context.
    #[must_use]
    pub fn ctx(&self) -> &Arc<SessionCtx> {
        &self.ctx
    }

    /// Dispatch one inbound UI frame.
    pub async fn handle_frame(&mut self, frame: UiFrame) {
        match frame {
            UiFrame::Connect => self.connect().await,
            UiFrame::Disconnect => self.close_agent(true).await,
            UiFrame::NewSession { cwd } => self.new_session(cwd).await,
            UiFrame::Prompt { content } => self.prompt(content).await,
            UiFrame::Cancel => self.cancel().await,
            UiFrame::PermissionResponse {
                request_id,
                outcome,
            } => self.ctx.resolve_permission(&request_id, outcome).await,
            UiFrame::BrowserToolResult {
                call_id,
                result,
                error,
            } => {
                let outcome = match (result, error) {
                    (_, Some(message)) => Err(message),
                    (Some(result), None) => Ok(result),
                    (None, None) => Err("malformed browser_tool_result".to_owned()),
                };
                self.pending_mcp.resolve(&call_id, outcome).await;
            }
            UiFrame::SetSessionModel { model_id } => self.set_session_model(model_id).await,
            UiFrame::FsList { path } => self.fs_list(&path).await,
            UiFrame::FsRead { path } => self.fs_read(&path).await,
            UiFrame::FsWatchStart => self.start_watch().await,
            UiFrame::FsWatchStop => self.stop_watch(),
        }
    }

    async fn error_frame(&self, message: impl Into<String>) {
        self.ctx
            .send(ServerFrame::Error {
                message: message.into(),
            })
            .await;
    }

    // ── connect ──────────────────────────────────────────────────────────────

    /// Spawn the agent and run ACP `initialize`.
    async fn connect(&mut self) {
        if self.agent.is_some() && !self.ctx.agent_gone.load(Ordering::SeqCst) {
            self.error_frame("agent already connected").await;
            return;
        }
        // Replace a dead link from a previous connect.
        if let Some(old) = self.agent.take() {
            if let Some(task) = self.lifecycle_task.take() {
                task.abort();
            }
            old.close().await;
        }

        let (lifecycle_tx, lifecycle_rx) = mpsc::channel(4);
        let handler: Arc<dyn AgentHandler> = Arc::new(BridgeHandler {
            ctx: Arc::clone(&self.ctx),
        });

        let link = match AgentLink::spawn(
            &self.config.agent_cmd,
            &self.config.agent_args,
            &self.ctx.working_dir(),
            handler,
            lifecycle_tx,
        ) {
            Ok(link) => link,
            Err(err) => {
                warn!(session_id = %self.ctx.id, %err, "agent spawn failed");
                self.error_frame(err.to_string()).await;
                return;
            }
        };

        let init_params = json!({
            "protocolVersion": PROTOCOL_VERSION,
            "clientInfo": {
                "name": "acp-proxy",
                "version": env!("CARGO_PKG_VERSION"),
            },
            "clientCapabilities": {
                "fs": { "readTextFile": true, "writeTextFile": true },
            },
        });

        let init = tokio::time::timeout(
            INITIALIZE_TIMEOUT,
            link.client.call("initialize", init_params),
        )
        .await;

        let response = match init {
            Ok(Ok(value)) => value,
            Ok(Err(err)) => {
                self.error_frame(format!("initialize failed: {err}")).await;
                link.close().await;
                return;
            }
            Err(_elapsed) => {
                self.error_frame("initialize timed out").await;
                link.close().await;
                return;
            }
        };

        let parsed: InitializeResponse = match serde_json::from_value(response.clone()) {
            Ok(parsed) => parsed,
            Err(err) => {
                self.error_frame(format!("malformed initialize response: {err}"))
                    .await;
                link.close().await;
                return;
            }
        };

        *self
            .ctx
            .prompt_capabilities
            .lock()
            .unwrap_or_else(std::sync::PoisonError::into_inner) =
            parsed.agent_capabilities.prompt_capabilities;

        let agent_info = response.get("agentInfo").cloned();
        info!(
            session_id = %self.ctx.id,
            protocol_version = parsed.protocol_version,
            "agent connected"
        );

        self.ctx.agent_gone.store(false, Ordering::SeqCst);
        self.lifecycle_task = Some(spawn_lifecycle_forwarder(
            Arc::clone(&self.ctx),
            lifecycle_rx,
        ));
        self.agent = Some(link);

        self.ctx
            .send(ServerFrame::Status {
                connected: true,
                agent_info,
                capabilities: Some(parsed.agent_capabilities.prompt_capabilities),
            })
            .await;
    }

    // ── new_session ──────────────────────────────────────────────────────────

    /// Create an ACP session rooted at `cwd`, advertising this proxy's MCP
    /// endpoint so the agent can reach the browser tools.
    async fn new_session(&mut self, cwd: Option<String>) {
        let Some(link) = &self.agent else {
            self.error_frame("agent not connected").await;
            return;
        };

        let cwd = match cwd {
            Some(dir) => PathBuf::from(dir),
            None => std::env::current_dir().unwrap_or_else(|_| PathBuf::from(".")),
        };
        let cwd = match cwd.canonicalize() {
            Ok(dir) => dir,
            Err(err) => {
                self.error_frame(format!("invalid working directory: {err}"))
                    .await;
                return;
            }
        };

        let params = json!({
            "cwd": cwd.to_string_lossy(),
            "mcpServers": [{
                "name": "browser",
                "type": "http",
                "url": self.config.mcp_url(&self.ctx.id),
            }],
        });

        let response = match link.client.call("session/new", params).await {
            Ok(value) => value,
            Err(err) => {
                self.error_frame(err.to_string()).await;
                return;
            }
        };

        let parsed: NewSessionResponse = match serde_json::from_value(response) {
            Ok(parsed) => parsed,
            Err(err) => {
                self.error_frame(format!("malformed session/new response: {err}"))
                    .await;
                return;
            }
        };

        let models = parsed.models.map(|state| ModelState {
            available: state.available_models,
            current_id: state.current_model_id,
        });

        *self
            .ctx
            .acp_session_id
            .lock()
            .unwrap_or_else(std::sync::PoisonError::into_inner) = Some(parsed.session_id.clone());
        *self
            .ctx
            .model_state
            .lock()
            .unwrap_or_else(std::sync::PoisonError::into_inner) = models.clone();
        self.ctx.set_working_dir(cwd);

        // The file tree follows the session root from the moment the
        // session exists.
        self.start_watch().await;

        let prompt_capabilities = *self
            .ctx
            .prompt_capabilities
            .lock()
            .unwrap_or_else(std::sync::PoisonError::into_inner);

        info!(session_id = %self.ctx.id, acp_session_id = %parsed.session_id, "session created");
        self.ctx
            .send(ServerFrame::SessionCreated {
                session_id: parsed.session_id,
                prompt_capabilities,
                models,
            })
            .await;
    }

    // ── prompt ───────────────────────────────────────────────────────────────

    /// Forward one user turn to the agent.
    ///
    /// The RPC runs in a detached task so permission responses, browser
    /// tool results, and `cancel` keep flowing while the turn is open. The
    /// at-most-one-prompt slot is released only when the turn completes.
    async fn prompt(&mut self, content: Vec<Value>) {
        let Some(link) = &self.agent else {
            self.error_frame("agent not connected").await;
            return;
        };
        let Some(acp_session_id) = self.ctx.acp_session_id() else {
            self.error_frame("no active session").await;
            return;
        };
        if !self.ctx.try_begin_prompt() {
            self.error_frame("prompt already in progress").await;
            return;
        }

        let client = link.client.clone();
        let ctx = Arc::clone(&self.ctx);
        tokio::spawn(async move {
            let params = json!({ "sessionId": acp_session_id, "prompt": content });
            match client.call("session/prompt", params).await {
                Ok(value) => {
                    let stop_reason = serde_json::from_value::<PromptResponse>(value)
                        .map_or(StopReason::Unknown, |r| r.stop_reason);
                    ctx.send(ServerFrame::PromptComplete { stop_reason }).await;
                }
                Err(err) => {
                    ctx.send(ServerFrame::Error {
                        message: err.to_string(),
                    })
                    .await;
                }
            }
            ctx.end_prompt();
        });
    }

    // ── cancel ───────────────────────────────────────────────────────────────

    /// Cancel the in-flight prompt.
    ///
    /// Pending permissions resolve locally as cancelled first; the agent is
    /// then notified and remains the one to complete the turn with
    /// `stopReason: cancelled`. Safe to call repeatedly.
    async fn cancel(&mut self) {
        self.ctx.cancel_pending_permissions().await;

        let Some(link) = &self.agent else {
            return;
        };
        let Some(acp_session_id) = self.ctx.acp_session_id() else {
            return;
        };
        if let Err(err) = link
            .client
            .notify("session/cancel", json!({ "sessionId": acp_session_id }))
            .await
        {
            debug!(session_id = %self.ctx.id, %err, "session/cancel not delivered");
        }
    }

    // ── set_session_model ────────────────────────────────────────────────────

    async fn set_session_model(&mut self, model_id: String) {
        let Some(link) = &self.agent else {
            self.error_frame("agent not connected").await;
            return;
        };
        let Some(acp_session_id) = self.ctx.acp_session_id() else {
            self.error_frame("no active session").await;
            return;
        };

        let params = json!({ "sessionId": acp_session_id, "modelId": model_id });
        match link.client.call("session/setModel", params).await {
            Ok(_) => {
                if let Some(state) = self
                    .ctx
                    .model_state
                    .lock()
                    .unwrap_or_else(std::sync::PoisonError::into_inner)
                    .as_mut()
                {
                    state.current_id.clone_from(&model_id);
                }
                self.ctx.send(ServerFrame::ModelChanged { model_id }).await;
            }
            Err(err) => self.error_frame(err.to_string()).await,
        }
    }

    // ── filesystem verbs ─────────────────────────────────────────────────────

    async fn fs_list(&self, path: &str) {
        let root = self.ctx.working_dir();
        match sandbox::list_dir(&root, path).await {
            Ok(items) => {
                self.ctx
                    .send(ServerFrame::FsListing {
                        path: path.to_owned(),
                        items,
                    })
                    .await;
            }
            Err(err) => self.error_frame(fs_error_message(&err)).await,
        }
    }

    async fn fs_read(&self, path: &str) {
        let root = self.ctx.working_dir();
        match sandbox::read_file(&root, path).await {
            Ok(file) => {
                self.ctx
                    .send(ServerFrame::FsContent {
                        path: path.to_owned(),
                        content: file.content,
                        size: file.size,
                        binary: file.binary,
                        truncated: file.truncated,
                        mime_type: file.mime_type,
                    })
                    .await;
            }
            Err(err) => self.error_frame(fs_error_message(&err)).await,
        }
    }

    async fn start_watch(&mut self) {
        self.stop_watch();

        let root = self.ctx.working_dir();
        match self.watchers.subscribe(&root) {
            Ok(mut sub) => {
                let ctx = Arc::clone(&self.ctx);
                self.watch_key = Some(sub.key.clone());
                self.watch_task = Some(tokio::spawn(async move {
                    while let Some(batch) = sub.rx.recv().await {
                        ctx.send(ServerFrame::FsChanges { batch }).await;
                    }
                }));
            }
            Err(err) => self.error_frame(err.to_string()).await,
        }
    }

    fn stop_watch(&mut self) {
        if let Some(key) = self.watch_key.take() {
            self.watchers.unsubscribe(&key);
        }
        if let Some(task) = self.watch_task.take() {
            task.abort();
        }
    }

    // ── teardown ─────────────────────────────────────────────────────────────

    /// Tear the agent down. Pending permissions resolve as cancelled; the
    /// process receives SIGTERM and, after the grace window, SIGKILL.
    async fn close_agent(&mut self, emit_status: bool) {
        if let Some(task) = self.lifecycle_task.take() {
            // Intentional teardown must not surface as an unsolicited exit.
            task.abort();
        }
        if let Some(link) = self.agent.take() {
            self.ctx.cancel_pending_permissions().await;
            link.close().await;
            info!(session_id = %self.ctx.id, "agent closed");
        }
        self.ctx.end_prompt();
        self.ctx.agent_gone.store(false, Ordering::SeqCst);

        if emit_status {
            self.ctx
                .send(ServerFrame::Status {
                    connected: false,
                    agent_info: None,
                    capabilities: None,
                })
                .await;
        }
    }

    /// Full session teardown on socket close. The session is terminal:
    /// permissions cancel, owned browser calls fail, the watcher
    /// unsubscribes, and the agent process dies.
    pub async fn teardown(&mut self) {
        self.stop_watch();
        self.pending_mcp
            .drain_owner(&self.ctx.id, "session closed")
            .await;
        self.close_agent(false).await;
    }
}

/// Map sandbox errors to the message the UI expects for violations.
fn fs_error_message(err: &AppError) -> String {
    match err {
        AppError::PathViolation(_) => "path escapes sandbox".to_owned(),
        other => other.to_string(),
    }
}

/// Surface the first lifecycle event (unsolicited exit or framing error)
/// as a disconnect to the UI.
fn spawn_lifecycle_forwarder(
    ctx: Arc<SessionCtx>,
    mut lifecycle_rx: mpsc::Receiver<AgentLifecycle>,
) -> JoinHandle<()> {
    tokio::spawn(async move {
        let Some(event) = lifecycle_rx.recv().await else {
            return;
        };

        let message = match event {
            AgentLifecycle::Exited { reason } => reason,
            AgentLifecycle::ProtocolError { line } => {
                format!("agent protocol error: non-JSON line: {line}")
            }
        };

        warn!(session_id = %ctx.id, %message, "agent connection lost");
        ctx.agent_gone.store(true, Ordering::SeqCst);
        ctx.cancel_pending_permissions().await;

        ctx.send(ServerFrame::Status {
            connected: false,
            agent_info: None,
            capabilities: None,
        })
        .await;
        ctx.send(ServerFrame::Error { message }).await;

        // Drain any follow-up events; the first one is terminal.
        while lifecycle_rx.recv().await.is_some() {}
    })
}

// ── Agent-facing callbacks ────────────────────────────────────────────────────

/// The client half of ACP, dispatched by the agent supervisor.
pub struct BridgeHandler {
    /// Shared session context.
    pub ctx: Arc<SessionCtx>,
}

impl AgentHandler for BridgeHandler {
    fn session_update(&self, params: Value) -> BoxFuture<'_, ()> {
        Box::pin(async move {
            let session_id = params
                .get("sessionId")
                .and_then(Value::as_str)
                .unwrap_or_default()
                .to_owned();
            let update = params.get("update").cloned().unwrap_or(Value::Null);

            // The proxy forwards updates opaquely, but keeps the model
            // bookkeeping current when the agent switches models itself.
            if update.get("sessionUpdate").and_then(Value::as_str)
                == Some("current_model_update")
            {
                if let Some(model_id) = update.get("modelId").and_then(Value::as_str) {
                    if let Some(state) = self
                        .ctx
                        .model_state
                        .lock()
                        .unwrap_or_else(std::sync::PoisonError::into_inner)
                        .as_mut()
                    {
                        state.current_id = model_id.to_owned();
                    }
                }
            }

            self.ctx
                .send(ServerFrame::SessionUpdate { session_id, update })
                .await;
        })
    }

    fn request_permission(&self, params: Value) -> BoxFuture<'_, Result<Value>> {
        Box::pin(async move {
            let request_id = uuid::Uuid::new_v4().to_string();
            let session_id = params
                .get("sessionId")
                .and_then(Value::as_str)
                .unwrap_or_default()
                .to_owned();
            let options = params.get("options").cloned().unwrap_or_else(|| json!([]));
            let tool_call = params.get("toolCall").cloned().unwrap_or(Value::Null);

            let (tx, rx) = tokio::sync::oneshot::channel();
            self.ctx
                .permissions
                .lock()
                .await
                .insert(request_id.clone(), tx);

            self.ctx
                .send(ServerFrame::PermissionRequest {
                    request_id: request_id.clone(),
                    session_id,
                    options,
                    tool_call,
                })
                .await;

            let outcome = match tokio::time::timeout(self.ctx.permission_timeout, rx).await {
                Ok(Ok(outcome)) => outcome,
                // Sender dropped: the request was drained by cancel/close.
                Ok(Err(_)) => PermissionOutcome::Cancelled,
                Err(_elapsed) => {
                    self.ctx.permissions.lock().await.remove(&request_id);
                    debug!(request_id, "permission request timed out");
                    PermissionOutcome::Cancelled
                }
            };

            Ok(json!({ "outcome": outcome }))
        })
    }

    fn read_text_file(&self, params: Value) -> BoxFuture<'_, Result<Value>> {
        Box::pin(async move {
            let path = params
                .get("path")
                .and_then(Value::as_str)
                .ok_or_else(|| AppError::Acp("fs/readTextFile: missing path".into()))?;
            let line = params.get("line").and_then(Value::as_u64);
            let limit = params.get("limit").and_then(Value::as_u64);
            let root = self.ctx.working_dir();
            let content = sandbox::read_text_for_agent(&root, path, line, limit).await?;
            Ok(json!({ "content": content }))
        })
    }

    fn write_text_file(&self, params: Value) -> BoxFuture<'_, Result<Value>> {
        Box::pin(async move {
            let path = params
                .get("path")
                .and_then(Value::as_str)
                .ok_or_else(|| AppError::Acp("fs/writeTextFile: missing path".into()))?;
            let content = params
                .get("content")
                .and_then(Value::as_str)
                .ok_or_else(|| AppError::Acp("fs/writeTextFile: missing content".into()))?;
            let root = self.ctx.working_dir();
            sandbox::write_text_for_agent(&root, path, content).await?;
            Ok(Value::Null)
        })
    }
}
