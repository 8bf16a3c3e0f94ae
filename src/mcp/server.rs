//! HTTP JSON-RPC endpoint the agent calls to reach the browser.
//!
//! Mounted at `POST /mcp` and `POST /mcp/{session}`. The session-scoped
//! route is what `session/new` advertises to the agent; the bare route is a
//! convenience that resolves only while exactly one UI is connected.
//!
//! `tools/call` is a correlated round-trip: the call is parked in the
//! pending map, a `browser_tool_call` frame goes out on the owning
//! session's WebSocket, and the UI's `browser_tool_result` (or the
//! 30-second deadline) produces the MCP reply. Tool failures — including
//! the timeout — are returned as tool results with `isError: true`, never
//! as JSON-RPC errors, so the agent can reason about them.

use std::sync::Arc;
use std::time::Duration;

use axum::extract::{Path, State};
use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use axum::Json;
use serde_json::{json, Value};
use tracing::{debug, info_span, warn, Instrument};

use super::{jsonrpc, pending::PendingBrowserCalls, tools};
use crate::server::frames::ServerFrame;
use crate::session::{SessionHandle, SessionRegistry};

/// MCP protocol revision implemented by this endpoint.
pub const MCP_PROTOCOL_VERSION: &str = "2024-11-05";

/// Shared state of the MCP endpoint.
#[derive(Clone)]
pub struct McpState {
    /// Connected UI sessions, for routing.
    pub registry: SessionRegistry,
    /// In-flight browser calls.
    pub pending: PendingBrowserCalls,
    /// Round-trip deadline; shortened in tests.
    pub call_timeout: Duration,
}

impl McpState {
    /// Create endpoint state over the shared registry and pending map.
    #[must_use]
    pub fn new(registry: SessionRegistry, pending: PendingBrowserCalls) -> Self {
        Self {
            registry,
            pending,
            call_timeout: super::pending::BROWSER_CALL_TIMEOUT,
        }
    }
}

/// `POST /mcp` — route to the sole connected session.
pub async fn handle_default(
    State(state): State<Arc<McpState>>,
    body: String,
) -> Response {
    handle(state, None, body).await
}

/// `POST /mcp/{session}` — route to the session named in the URL.
pub async fn handle_for_session(
    State(state): State<Arc<McpState>>,
    Path(session): Path<String>,
    body: String,
) -> Response {
    handle(state, Some(session), body).await
}

async fn handle(state: Arc<McpState>, session: Option<String>, body: String) -> Response {
    let Ok(request) = serde_json::from_str::<jsonrpc::RpcRequest>(&body) else {
        return Json(jsonrpc::parse_error()).into_response();
    };

    let method = request.method.clone().unwrap_or_default();
    let span = info_span!("mcp_request", %method);

    async move {
        match (method.as_str(), request.id.clone()) {
            ("initialize", Some(id)) => Json(jsonrpc::success(
                id,
                json!({
                    "protocolVersion": MCP_PROTOCOL_VERSION,
                    "capabilities": { "tools": {} },
                    "serverInfo": {
                        "name": "acp-proxy",
                        "version": env!("CARGO_PKG_VERSION"),
                    },
                }),
            ))
            .into_response(),

            // Client acknowledgement; no body expected back.
            ("notifications/initialized", _) => StatusCode::ACCEPTED.into_response(),

            ("tools/list", Some(id)) => Json(jsonrpc::success(
                id,
                json!({ "tools": tools::tool_list() }),
            ))
            .into_response(),

            ("tools/call", Some(id)) => {
                Json(handle_tools_call(&state, session.as_deref(), id, request.params).await)
                    .into_response()
            }

            (_, None) => {
                debug!(%method, "unhandled MCP notification");
                StatusCode::ACCEPTED.into_response()
            }

            (other, Some(id)) => Json(jsonrpc::error(
                id,
                jsonrpc::METHOD_NOT_FOUND,
                format!("Method not found: {other}"),
            ))
            .into_response(),
        }
    }
    .instrument(span)
    .await
}

/// Run one `tools/call` round-trip through the owning session's WebSocket.
async fn handle_tools_call(
    state: &McpState,
    session: Option<&str>,
    id: Value,
    params: Option<Value>,
) -> jsonrpc::RpcResponse {
    let params = params.unwrap_or(Value::Null);
    let Some(tool) = params.get("name").and_then(Value::as_str).map(str::to_owned) else {
        return jsonrpc::error(id, jsonrpc::INVALID_PARAMS, "missing tool name");
    };
    let arguments = params.get("arguments").cloned().unwrap_or_else(|| json!({}));

    // ── Resolve the target session ───────────────────────
    let handle = match session {
        Some(sid) => state.registry.get(sid).await,
        None => state.registry.sole().await,
    };
    let Some(handle) = handle else {
        return jsonrpc::error(
            id,
            jsonrpc::NO_BROWSER_CONNECTED,
            "No browser extension connected",
        );
    };

    if !tools::is_known_tool(&tool) {
        return jsonrpc::success(id, tools::error_result(&format!("Unknown tool: {tool}")));
    }

    // ── Correlated round-trip ────────────────────────────
    let (call_id, rx) = state.pending.register(handle.id.clone()).await;
    debug!(call_id = %call_id, tool = %tool, session_id = %handle.id, "dispatching browser tool call");

    let frame = ServerFrame::BrowserToolCall {
        call_id: call_id.clone(),
        params: json!({ "name": tool, "arguments": arguments }),
    };
    if handle.frame_tx.send(frame).await.is_err() {
        state.pending.take(&call_id).await;
        return jsonrpc::success(id, tools::error_result("Browser session closed"));
    }

    let result = match tokio::time::timeout(state.call_timeout, rx).await {
        Ok(Ok(Ok(result))) => tools::format_result(&tool, &result),
        Ok(Ok(Err(message))) => tools::error_result(&message),
        Ok(Err(_recv)) => tools::error_result("Browser session closed"),
        Err(_elapsed) => {
            // Deadline won the race iff the entry was still pending.
            if state.pending.take(&call_id).await {
                warn!(call_id = %call_id, "browser tool call timed out");
            }
            tools::error_result("Browser tool call timed out")
        }
    };

    jsonrpc::success(id, result)
}

/// Build the two MCP routes over shared state.
#[must_use]
pub fn router(state: Arc<McpState>) -> axum::Router {
    axum::Router::new()
        .route("/mcp", axum::routing::post(handle_default))
        .route("/mcp/{session}", axum::routing::post(handle_for_session))
        .with_state(state)
}
