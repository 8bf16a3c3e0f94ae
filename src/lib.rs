#![forbid(unsafe_code)]

//! `acp-proxy` — local bridging proxy between browser UIs and an ACP agent.
//!
//! The proxy owns three concurrent protocol surfaces and keeps them coherent:
//!
//! 1. a stdio JSON-RPC (ACP) channel to a spawned agent subprocess,
//! 2. a long-lived WebSocket channel to one or more UI clients,
//! 3. an HTTP JSON-RPC (MCP) endpoint that lets the agent call back into the
//!    browser through the same UI client.
//!
//! The [`bridge`] module translates between the surfaces; [`acp`] supervises
//! the agent process; [`mcp`] serves the browser tools; [`sandbox`] confines
//! filesystem access to the session working directory; [`tls`] caches the
//! self-signed certificate for the optional HTTPS listener.

pub mod acp;
pub mod banner;
pub mod bridge;
pub mod config;
pub mod errors;
pub mod mcp;
pub mod sandbox;
pub mod server;
pub mod session;
pub mod tls;

pub use errors::{AppError, Result};
