//! JSON-RPC 2.0 wire types and response helpers for the MCP endpoint.
//!
//! The MCP surface is three methods over a single HTTP POST route, so the
//! full wire layer fits in this module: incoming message deserialization,
//! outgoing response serialization, and the standard error constructors.

use serde::{Deserialize, Serialize};
use serde_json::Value;

/// JSON-RPC error code: parse error.
pub const PARSE_ERROR: i64 = -32700;

/// JSON-RPC error code: method not found.
pub const METHOD_NOT_FOUND: i64 = -32601;

/// JSON-RPC error code: invalid params.
pub const INVALID_PARAMS: i64 = -32602;

/// Server-defined error code: no browser extension connected.
pub const NO_BROWSER_CONNECTED: i64 = -32000;

/// An incoming JSON-RPC 2.0 message.
#[derive(Debug, Deserialize)]
pub struct RpcRequest {
    /// Protocol marker; must be `"2.0"` but is not enforced.
    #[allow(dead_code)]
    #[serde(default)]
    pub jsonrpc: String,
    /// Request id; absent for notifications.
    #[serde(default)]
    pub id: Option<Value>,
    /// Method name.
    #[serde(default)]
    pub method: Option<String>,
    /// Method parameters.
    #[serde(default)]
    pub params: Option<Value>,
}

/// An outgoing JSON-RPC 2.0 response.
#[derive(Debug, Serialize)]
pub struct RpcResponse {
    /// Always `"2.0"`.
    pub jsonrpc: &'static str,
    /// Result on success.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub result: Option<Value>,
    /// Error on failure.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<RpcError>,
    /// Echoed request id.
    pub id: Value,
}

/// A JSON-RPC 2.0 error object.
#[derive(Debug, Serialize)]
pub struct RpcError {
    /// Error code.
    pub code: i64,
    /// Human-readable message.
    pub message: String,
}

/// Build a success response.
#[must_use]
pub fn success(id: Value, result: Value) -> RpcResponse {
    RpcResponse {
        jsonrpc: "2.0",
        result: Some(result),
        error: None,
        id,
    }
}

/// Build an error response.
#[must_use]
pub fn error(id: Value, code: i64, message: impl Into<String>) -> RpcResponse {
    RpcResponse {
        jsonrpc: "2.0",
        result: None,
        error: Some(RpcError {
            code,
            message: message.into(),
        }),
        id,
    }
}

/// Build a parse-error response (null id per the JSON-RPC spec).
#[must_use]
pub fn parse_error() -> RpcResponse {
    error(Value::Null, PARSE_ERROR, "Parse error")
}
