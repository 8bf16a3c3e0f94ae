//! Per-client session state and the process-wide session registry.
//!
//! Each WebSocket connection owns one [`SessionCtx`]. The context is shared
//! (via `Arc`) between the connection task, the agent callback handler, and
//! detached prompt tasks; everything heavier — the agent link, the watcher
//! subscription — stays owned by the connection task inside the bridge.
//!
//! The [`SessionRegistry`] maps proxy-minted session ids to lightweight
//! handles so the MCP endpoint can route a tool call to the WebSocket that
//! must service it.

use std::collections::HashMap;
use std::path::PathBuf;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;

use tokio::sync::{mpsc, oneshot, Mutex};
use tracing::{debug, warn};

use crate::acp::protocol::{PermissionOutcome, PromptCapabilities};
use crate::server::frames::{ModelState, ServerFrame};

/// Proxy-minted id identifying one UI connection.
pub type SessionId = String;

/// Deadline for a pending permission request.
pub const PERMISSION_TIMEOUT: Duration = Duration::from_secs(5 * 60);

/// Map of pending permission resolvers keyed by proxy request id.
pub type PermissionMap = Arc<Mutex<HashMap<String, oneshot::Sender<PermissionOutcome>>>>;

/// Shared per-session state.
pub struct SessionCtx {
    /// Proxy-minted session id; also the MCP URL path segment.
    pub id: SessionId,
    /// Send half of the session's single outbound frame queue.
    pub frame_tx: mpsc::Sender<ServerFrame>,
    /// Pending permission resolvers.
    pub permissions: PermissionMap,
    /// Sandbox root; process cwd until `new_session` sets it.
    pub working_dir: std::sync::Mutex<PathBuf>,
    /// Agent-minted ACP session id.
    pub acp_session_id: std::sync::Mutex<Option<String>>,
    /// Prompt capabilities from ACP `initialize`.
    pub prompt_capabilities: std::sync::Mutex<PromptCapabilities>,
    /// Model selection state, absent when the agent lacks model switching.
    pub model_state: std::sync::Mutex<Option<ModelState>>,
    /// At-most-one-prompt guard.
    pub prompt_in_flight: AtomicBool,
    /// Set when the agent died underneath us; cleared by a fresh `connect`.
    pub agent_gone: AtomicBool,
    /// Permission deadline; shortened in tests.
    pub permission_timeout: Duration,
}

impl SessionCtx {
    /// Create session state around an outbound frame queue.
    #[must_use]
    pub fn new(id: SessionId, frame_tx: mpsc::Sender<ServerFrame>) -> Self {
        let cwd = std::env::current_dir().unwrap_or_else(|_| PathBuf::from("."));
        Self {
            id,
            frame_tx,
            permissions: PermissionMap::default(),
            working_dir: std::sync::Mutex::new(cwd),
            acp_session_id: std::sync::Mutex::new(None),
            prompt_capabilities: std::sync::Mutex::new(PromptCapabilities::default()),
            model_state: std::sync::Mutex::new(None),
            prompt_in_flight: AtomicBool::new(false),
            agent_gone: AtomicBool::new(false),
            permission_timeout: PERMISSION_TIMEOUT,
        }
    }

    /// Override the permission deadline (used by tests).
    #[must_use]
    pub fn with_permission_timeout(mut self, timeout: Duration) -> Self {
        self.permission_timeout = timeout;
        self
    }

    /// Queue a frame for the UI. Drops (with a log line) when the writer is
    /// gone, i.e. the socket already closed.
    pub async fn send(&self, frame: ServerFrame) {
        if self.frame_tx.send(frame).await.is_err() {
            debug!(session_id = %self.id, "frame queue closed; dropping frame");
        }
    }

    /// Current sandbox root.
    #[must_use]
    pub fn working_dir(&self) -> PathBuf {
        self.working_dir
            .lock()
            .unwrap_or_else(std::sync::PoisonError::into_inner)
            .clone()
    }

    /// Replace the sandbox root (on `new_session`).
    pub fn set_working_dir(&self, dir: PathBuf) {
        *self
            .working_dir
            .lock()
            .unwrap_or_else(std::sync::PoisonError::into_inner) = dir;
    }

    /// Current ACP session id.
    #[must_use]
    pub fn acp_session_id(&self) -> Option<String> {
        self.acp_session_id
            .lock()
            .unwrap_or_else(std::sync::PoisonError::into_inner)
            .clone()
    }

    /// Resolve every pending permission request as cancelled.
    ///
    /// Each resolver fires exactly once: entries are drained out of the map
    /// before being resolved, so a racing `permission_response` finds the
    /// map empty.
    pub async fn cancel_pending_permissions(&self) {
        let drained: Vec<_> = self.permissions.lock().await.drain().collect();
        for (request_id, tx) in drained {
            debug!(session_id = %self.id, request_id, "cancelling pending permission");
            let _ = tx.send(PermissionOutcome::Cancelled);
        }
    }

    /// Resolve one pending permission with the user's decision.
    ///
    /// Unknown request ids are dropped with a warning (late replies race
    /// the deadline and lose).
    pub async fn resolve_permission(&self, request_id: &str, outcome: PermissionOutcome) {
        match self.permissions.lock().await.remove(request_id) {
            Some(tx) => {
                let _ = tx.send(outcome);
            }
            None => {
                warn!(session_id = %self.id, request_id, "permission response for unknown request");
            }
        }
    }

    /// Try to claim the prompt slot. Fails when a prompt is in flight.
    #[must_use]
    pub fn try_begin_prompt(&self) -> bool {
        self.prompt_in_flight
            .compare_exchange(false, true, Ordering::SeqCst, Ordering::SeqCst)
            .is_ok()
    }

    /// Release the prompt slot once the turn completed.
    pub fn end_prompt(&self) {
        self.prompt_in_flight.store(false, Ordering::SeqCst);
    }
}

/// Routing handle the MCP endpoint needs: the session's frame queue.
#[derive(Clone)]
pub struct SessionHandle {
    /// Proxy session id.
    pub id: SessionId,
    /// Send half of the session's outbound frame queue.
    pub frame_tx: mpsc::Sender<ServerFrame>,
}

/// Process-wide map of connected UI sessions.
#[derive(Clone, Default)]
pub struct SessionRegistry {
    inner: Arc<Mutex<HashMap<SessionId, SessionHandle>>>,
}

impl SessionRegistry {
    /// Create an empty registry.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a freshly connected session.
    pub async fn register(&self, handle: SessionHandle) {
        self.inner.lock().await.insert(handle.id.clone(), handle);
    }

    /// Remove a session on disconnect.
    pub async fn remove(&self, id: &str) {
        self.inner.lock().await.remove(id);
    }

    /// Look a session up by id.
    pub async fn get(&self, id: &str) -> Option<SessionHandle> {
        self.inner.lock().await.get(id).cloned()
    }

    /// The sole connected session, if exactly one exists.
    ///
    /// Backs the bare `/mcp` route: with several UIs connected the caller
    /// must use the session-scoped URL instead.
    pub async fn sole(&self) -> Option<SessionHandle> {
        let map = self.inner.lock().await;
        if map.len() == 1 {
            map.values().next().cloned()
        } else {
            None
        }
    }

    /// Number of connected sessions.
    pub async fn len(&self) -> usize {
        self.inner.lock().await.len()
    }

    /// Whether no session is connected.
    pub async fn is_empty(&self) -> bool {
        self.inner.lock().await.is_empty()
    }
}
