//! MCP endpoint round-trips: correlation, timeout, and session routing.
//!
//! Covers:
//! - S2: `tools/call` emits one `browser_tool_call` with a fresh id and
//!   the MCP reply is derived from the matching `browser_tool_result`
//! - S3: an unanswered call times out into `isError: true` with
//!   "Browser tool call timed out"
//! - no connected session yields JSON-RPC error -32000
//! - the default deadline is 30 seconds

use std::sync::Arc;
use std::time::Duration;

use axum::body::Body;
use axum::http::{header, Request, StatusCode};
use http_body_util::BodyExt;
use serde_json::{json, Value};
use tokio::sync::mpsc;
use tower::ServiceExt;

use acp_proxy::mcp::{server::router, McpState, PendingBrowserCalls, BROWSER_CALL_TIMEOUT};
use acp_proxy::server::frames::{BrowserToolResult, ServerFrame};
use acp_proxy::session::{SessionHandle, SessionRegistry};

async fn post_json(app: axum::Router, uri: &str, body: Value) -> (StatusCode, Value) {
    let request = Request::post(uri)
        .header(header::CONTENT_TYPE, "application/json")
        .body(Body::from(body.to_string()))
        .unwrap();
    let response = app.oneshot(request).await.unwrap();
    let status = response.status();
    let bytes = response.into_body().collect().await.unwrap().to_bytes();
    let value = if bytes.is_empty() {
        Value::Null
    } else {
        serde_json::from_slice(&bytes).unwrap()
    };
    (status, value)
}

async fn state_with_session(
    timeout: Duration,
) -> (Arc<McpState>, mpsc::Receiver<ServerFrame>, PendingBrowserCalls) {
    let registry = SessionRegistry::new();
    let pending = PendingBrowserCalls::new();
    let (frame_tx, frame_rx) = mpsc::channel(8);

    registry
        .register(SessionHandle {
            id: "ui-1".into(),
            frame_tx,
        })
        .await;

    let state = Arc::new(McpState {
        registry,
        pending: pending.clone(),
        call_timeout: timeout,
    });

    (state, frame_rx, pending)
}

// ── S2: execute round-trip ────────────────────────────────────────────────────

/// The UI's result for the matching `callId` becomes the MCP reply; the
/// text block contains the JSON-encoded value.
#[tokio::test]
async fn execute_round_trip_returns_the_value() {
    let (state, mut frame_rx, pending) = state_with_session(Duration::from_secs(5)).await;
    let app = router(Arc::clone(&state));

    // UI simulator: answer the first browser_tool_call.
    tokio::spawn(async move {
        if let Some(ServerFrame::BrowserToolCall { call_id, params }) = frame_rx.recv().await {
            assert_eq!(params["name"], "browser_execute");
            assert_eq!(params["arguments"]["script"], "return 2+2");
            pending
                .resolve(
                    &call_id,
                    Ok(BrowserToolResult {
                        action: Some("execute".into()),
                        url: Some("https://a.test/".into()),
                        result: Some(json!(4)),
                        ..Default::default()
                    }),
                )
                .await;
        }
    });

    let (status, body) = post_json(
        app,
        "/mcp/ui-1",
        json!({
            "jsonrpc": "2.0",
            "id": 1,
            "method": "tools/call",
            "params": {
                "name": "browser_execute",
                "arguments": { "script": "return 2+2" },
            },
        }),
    )
    .await;

    assert_eq!(status, StatusCode::OK);
    let text = body["result"]["content"][0]["text"].as_str().unwrap();
    assert!(text.contains('4'), "reply must contain the value, got: {text}");
    assert!(
        body["result"].get("isError").is_none(),
        "a successful call must not set isError"
    );
    assert!(body.get("error").is_none());
}

// ── S3: timeout ───────────────────────────────────────────────────────────────

/// With no UI reply the call resolves at the deadline into an isError
/// tool result, not a JSON-RPC error.
#[tokio::test]
async fn unanswered_call_times_out_as_tool_error() {
    let (state, mut frame_rx, _pending) = state_with_session(Duration::from_millis(150)).await;
    let app = router(Arc::clone(&state));

    // Receive the dispatch but never answer.
    tokio::spawn(async move {
        let _ = frame_rx.recv().await;
        std::future::pending::<()>().await;
    });

    let (status, body) = post_json(
        app,
        "/mcp/ui-1",
        json!({
            "jsonrpc": "2.0",
            "id": 2,
            "method": "tools/call",
            "params": { "name": "browser_read", "arguments": {} },
        }),
    )
    .await;

    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["result"]["isError"], true);
    assert_eq!(
        body["result"]["content"][0]["text"],
        "Browser tool call timed out"
    );
    assert!(body.get("error").is_none(), "timeouts are tool results");
    assert!(
        state.pending.is_empty().await,
        "the timed-out entry must be removed from the map"
    );
}

/// The production deadline is the documented 30 seconds.
#[test]
fn default_deadline_is_thirty_seconds() {
    assert_eq!(BROWSER_CALL_TIMEOUT, Duration::from_secs(30));
}

// ── Routing ───────────────────────────────────────────────────────────────────

/// An unknown session id (and an empty registry on the bare route) yields
/// JSON-RPC error -32000.
#[tokio::test]
async fn missing_session_yields_no_browser_error() {
    let state = Arc::new(McpState {
        registry: SessionRegistry::new(),
        pending: PendingBrowserCalls::new(),
        call_timeout: Duration::from_secs(1),
    });

    for uri in ["/mcp", "/mcp/ghost"] {
        let app = router(Arc::clone(&state));
        let (status, body) = post_json(
            app,
            uri,
            json!({
                "jsonrpc": "2.0",
                "id": 3,
                "method": "tools/call",
                "params": { "name": "browser_read", "arguments": {} },
            }),
        )
        .await;

        assert_eq!(status, StatusCode::OK);
        assert_eq!(body["error"]["code"], -32000, "uri: {uri}");
        assert_eq!(body["error"]["message"], "No browser extension connected");
    }
}

/// A tool outside the advertised table fails as a tool result, keeping the
/// round-trip shape.
#[tokio::test]
async fn unknown_tool_fails_as_tool_result() {
    let (state, _frame_rx, _pending) = state_with_session(Duration::from_secs(1)).await;
    let app = router(Arc::clone(&state));

    let (status, body) = post_json(
        app,
        "/mcp/ui-1",
        json!({
            "jsonrpc": "2.0",
            "id": 4,
            "method": "tools/call",
            "params": { "name": "browser_teleport", "arguments": {} },
        }),
    )
    .await;

    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["result"]["isError"], true);
    assert!(
        state.pending.is_empty().await,
        "an unknown tool must not leave a pending entry behind"
    );
}
