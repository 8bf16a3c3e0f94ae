//! Server configuration assembled by the CLI entry point.
//!
//! The CLI is a thin loader: it parses flags, resolves the auth token, and
//! produces one immutable [`ServerConfig`] that the rest of the server reads.

use std::path::PathBuf;

use rand::RngCore;

/// Environment variable holding a fixed auth token.
pub const AUTH_TOKEN_ENV: &str = "ACP_AUTH_TOKEN";

/// Default TCP port.
pub const DEFAULT_PORT: u16 = 9315;

/// Auth token gating WebSocket access.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum AuthToken {
    /// `--no-auth`: every upgrade is accepted; a warning is logged at startup.
    Disabled,
    /// A fixed or generated bearer token checked on every upgrade.
    Token(String),
}

impl AuthToken {
    /// Resolve the effective token: `--no-auth` wins, then [`AUTH_TOKEN_ENV`],
    /// then a freshly generated 32-byte hex token.
    #[must_use]
    pub fn resolve(no_auth: bool) -> Self {
        if no_auth {
            return Self::Disabled;
        }
        match std::env::var(AUTH_TOKEN_ENV) {
            Ok(token) if !token.is_empty() => Self::Token(token),
            _ => Self::Token(generate_token()),
        }
    }

    /// Whether auth is disabled.
    #[must_use]
    pub fn is_disabled(&self) -> bool {
        matches!(self, Self::Disabled)
    }

    /// The token string, when auth is enabled.
    #[must_use]
    pub fn token(&self) -> Option<&str> {
        match self {
            Self::Disabled => None,
            Self::Token(t) => Some(t.as_str()),
        }
    }

    /// Check a token supplied by a client.
    ///
    /// Always true when auth is disabled.
    #[must_use]
    pub fn accepts(&self, presented: Option<&str>) -> bool {
        match self {
            Self::Disabled => true,
            Self::Token(expected) => presented == Some(expected.as_str()),
        }
    }
}

/// Generate a random 32-byte token rendered as lowercase hex.
#[must_use]
pub fn generate_token() -> String {
    let mut bytes = [0u8; 32];
    rand::thread_rng().fill_bytes(&mut bytes);
    bytes.iter().fold(String::with_capacity(64), |mut acc, b| {
        use std::fmt::Write;
        let _ = write!(acc, "{b:02x}");
        acc
    })
}

/// Immutable server configuration shared by every component.
#[derive(Debug, Clone)]
pub struct ServerConfig {
    /// Bind address (`--host`).
    pub host: String,
    /// TCP port (`--port`).
    pub port: u16,
    /// Serve HTTPS using the cached self-signed certificate (`--https`).
    pub https: bool,
    /// Effective auth token.
    pub auth: AuthToken,
    /// URL override embedded in the QR/banner (`--public-url`).
    pub public_url: Option<String>,
    /// Attempt to launch the PWA via Android `am start` (`--termux`).
    pub termux: bool,
    /// Write trace logs to `./.acp-proxy/` (`--debug`).
    pub debug: bool,
    /// Agent command to spawn on `connect`.
    pub agent_cmd: String,
    /// Arguments passed to the agent command.
    pub agent_args: Vec<String>,
    /// Directory holding the static PWA assets served under `/app/`.
    pub asset_dir: PathBuf,
    /// Directory holding the cached TLS certificate (`~/.acp-proxy`).
    pub cert_dir: PathBuf,
}

impl ServerConfig {
    /// Scheme for user-facing URLs.
    #[must_use]
    pub fn scheme(&self) -> &'static str {
        if self.https {
            "https"
        } else {
            "http"
        }
    }

    /// The URL a UI client should open, including the token query parameter
    /// when auth is enabled. `--public-url` overrides the derived base.
    #[must_use]
    pub fn connect_url(&self) -> String {
        let base = self.public_url.clone().unwrap_or_else(|| {
            format!("{}://{}:{}/app/", self.scheme(), self.host, self.port)
        });
        match self.auth.token() {
            Some(token) => {
                let sep = if base.contains('?') { '&' } else { '?' };
                format!("{base}{sep}token={token}")
            }
            None => base,
        }
    }

    /// The MCP URL advertised to the agent for a given UI session.
    ///
    /// Always loopback: the agent subprocess shares the host with the proxy.
    #[must_use]
    pub fn mcp_url(&self, ui_session_id: &str) -> String {
        format!(
            "{}://127.0.0.1:{}/mcp/{ui_session_id}",
            self.scheme(),
            self.port
        )
    }

    /// Default certificate directory: `~/.acp-proxy`.
    #[must_use]
    pub fn default_cert_dir() -> PathBuf {
        std::env::var_os("HOME")
            .map_or_else(|| PathBuf::from("."), PathBuf::from)
            .join(".acp-proxy")
    }

    /// Default asset directory: `app/` next to the executable, falling back
    /// to `./app` when the executable path is unavailable.
    #[must_use]
    pub fn default_asset_dir() -> PathBuf {
        std::env::current_exe()
            .ok()
            .and_then(|exe| exe.parent().map(|dir| dir.join("app")))
            .unwrap_or_else(|| PathBuf::from("app"))
    }
}
