//! Error types shared across the application.

use std::fmt::{Display, Formatter};

/// Shared application result type.
pub type Result<T> = std::result::Result<T, AppError>;

/// Application error enumeration covering all domain failure modes.
#[derive(Debug)]
pub enum AppError {
    /// Configuration parsing or validation failure.
    Config(String),
    /// ACP stdio framing or RPC failure against the agent process.
    Acp(String),
    /// MCP protocol or tool dispatch failure.
    Mcp(String),
    /// WebSocket transport failure.
    Ws(String),
    /// TLS certificate generation or persistence failure.
    Tls(String),
    /// File system path failed validation against the sandbox root.
    PathViolation(String),
    /// Requested entity does not exist.
    NotFound(String),
    /// Caller presented an invalid or missing auth token.
    Auth(String),
    /// File-system or I/O operation failure.
    Io(String),
}

impl Display for AppError {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Config(msg) => write!(f, "config: {msg}"),
            Self::Acp(msg) => write!(f, "acp: {msg}"),
            Self::Mcp(msg) => write!(f, "mcp: {msg}"),
            Self::Ws(msg) => write!(f, "ws: {msg}"),
            Self::Tls(msg) => write!(f, "tls: {msg}"),
            Self::PathViolation(msg) => write!(f, "path violation: {msg}"),
            Self::NotFound(msg) => write!(f, "not found: {msg}"),
            Self::Auth(msg) => write!(f, "auth: {msg}"),
            Self::Io(msg) => write!(f, "io: {msg}"),
        }
    }
}

impl std::error::Error for AppError {}

impl From<std::io::Error> for AppError {
    fn from(err: std::io::Error) -> Self {
        Self::Io(err.to_string())
    }
}
