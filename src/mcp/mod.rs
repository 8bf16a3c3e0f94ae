//! MCP endpoint: the HTTP JSON-RPC surface the agent uses to reach the
//! browser.
//!
//! # Submodules
//!
//! - [`jsonrpc`]: JSON-RPC 2.0 wire types and error constructors.
//! - [`tools`]: browser tool declarations and result formatting.
//! - [`pending`]: process-wide correlation map for in-flight tool calls.
//! - [`server`]: the axum routes and `tools/call` round-trip.

pub mod jsonrpc;
pub mod pending;
pub mod server;
pub mod tools;

pub use pending::{PendingBrowserCalls, BROWSER_CALL_TIMEOUT};
pub use server::{McpState, MCP_PROTOCOL_VERSION};
