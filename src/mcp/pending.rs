//! Process-wide map of in-flight browser tool calls.
//!
//! Every MCP `tools/call` registers a correlation id here before its
//! `browser_tool_call` frame goes out on the owning session's WebSocket.
//! Three parties race to resolve an entry — the UI reply, the 30-second
//! deadline, and session close — and the map guarantees a single winner:
//! resolution always goes through [`PendingBrowserCalls::take`], which
//! removes the entry atomically, so a correlation id is consumed exactly
//! once.

use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;

use tokio::sync::{oneshot, Mutex};
use tracing::{debug, warn};

use crate::server::frames::BrowserToolResult;
use crate::session::SessionId;

/// Deadline for a browser tool call round-trip.
pub const BROWSER_CALL_TIMEOUT: Duration = Duration::from_secs(30);

/// Outcome delivered to the awaiting MCP handler.
pub type CallOutcome = std::result::Result<BrowserToolResult, String>;

struct PendingCall {
    tx: oneshot::Sender<CallOutcome>,
    owner: SessionId,
}

/// Shared pending-call map keyed by correlation id.
#[derive(Clone, Default)]
pub struct PendingBrowserCalls {
    inner: Arc<Mutex<HashMap<String, PendingCall>>>,
}

impl PendingBrowserCalls {
    /// Create an empty map.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a new call owned by `owner`, returning the minted
    /// correlation id and the receiver the MCP handler awaits.
    pub async fn register(&self, owner: SessionId) -> (String, oneshot::Receiver<CallOutcome>) {
        let call_id = uuid::Uuid::new_v4().to_string();
        let (tx, rx) = oneshot::channel();
        self.inner
            .lock()
            .await
            .insert(call_id.clone(), PendingCall { tx, owner });
        (call_id, rx)
    }

    /// Remove the entry for `call_id` and resolve it with `outcome`.
    ///
    /// Returns `false` when no such call is pending (late or unsolicited
    /// replies race the deadline and lose).
    pub async fn resolve(&self, call_id: &str, outcome: CallOutcome) -> bool {
        match self.inner.lock().await.remove(call_id) {
            Some(entry) => {
                let _ = entry.tx.send(outcome);
                true
            }
            None => {
                warn!(call_id, "browser tool result for unknown call, dropping");
                false
            }
        }
    }

    /// Remove the entry for `call_id` without resolving it.
    ///
    /// Used by the deadline path: winning the removal race means the
    /// receiver is already gone from the await site.
    pub async fn take(&self, call_id: &str) -> bool {
        self.inner.lock().await.remove(call_id).is_some()
    }

    /// Resolve every call owned by `session_id` with an error.
    ///
    /// Called when the owning WebSocket closes.
    pub async fn drain_owner(&self, session_id: &str, reason: &str) {
        let mut map = self.inner.lock().await;
        let ids: Vec<String> = map
            .iter()
            .filter(|(_, call)| call.owner == session_id)
            .map(|(id, _)| id.clone())
            .collect();
        for id in ids {
            if let Some(entry) = map.remove(&id) {
                debug!(call_id = %id, session_id, "failing browser call: session closed");
                let _ = entry.tx.send(Err(reason.to_owned()));
            }
        }
    }

    /// Number of in-flight calls (for tests and diagnostics).
    pub async fn len(&self) -> usize {
        self.inner.lock().await.len()
    }

    /// Whether no call is in flight.
    pub async fn is_empty(&self) -> bool {
        self.inner.lock().await.is_empty()
    }
}
