//! Token check for the WebSocket upgrade.
//!
//! The token travels as the `token` query parameter. A mismatch closes the
//! socket with code [`CLOSE_INVALID_TOKEN`] before any frame is exchanged.
//! The MCP endpoint is intentionally not token-gated: it binds loopback by
//! default and the agent subprocess shares the host; operators exposing the
//! proxy publicly must front it with a reverse proxy.

use tracing::warn;

use crate::config::AuthToken;

/// WebSocket close code sent on token mismatch.
pub const CLOSE_INVALID_TOKEN: u16 = 4001;

/// Close reason sent on token mismatch.
pub const CLOSE_REASON: &str = "invalid token";

/// Validate an upgrade attempt. Logs the rejection.
#[must_use]
pub fn check_upgrade(auth: &AuthToken, presented: Option<&str>) -> bool {
    if auth.accepts(presented) {
        return true;
    }
    warn!(
        token_present = presented.is_some(),
        "rejecting WebSocket upgrade: invalid token"
    );
    false
}
