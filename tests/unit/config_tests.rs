//! Unit tests for server configuration: URL derivation and defaults.

use std::path::PathBuf;

use acp_proxy::config::{AuthToken, ServerConfig, DEFAULT_PORT};

fn base_config() -> ServerConfig {
    ServerConfig {
        host: "localhost".into(),
        port: DEFAULT_PORT,
        https: false,
        auth: AuthToken::Token("tok123".into()),
        public_url: None,
        termux: false,
        debug: false,
        agent_cmd: "fake-agent".into(),
        agent_args: vec![],
        asset_dir: PathBuf::from("app"),
        cert_dir: PathBuf::from(".acp-proxy"),
    }
}

/// The default port matches the documented CLI default.
#[test]
fn default_port_is_9315() {
    assert_eq!(DEFAULT_PORT, 9315);
}

/// The connect URL embeds the token as a query parameter.
#[test]
fn connect_url_carries_the_token() {
    let config = base_config();
    assert_eq!(
        config.connect_url(),
        "http://localhost:9315/app/?token=tok123"
    );
}

/// With auth disabled the connect URL has no token parameter.
#[test]
fn connect_url_without_auth_has_no_token() {
    let config = ServerConfig {
        auth: AuthToken::Disabled,
        ..base_config()
    };
    assert_eq!(config.connect_url(), "http://localhost:9315/app/");
}

/// `--public-url` overrides the derived base but keeps the token.
#[test]
fn public_url_overrides_the_base() {
    let config = ServerConfig {
        public_url: Some("https://phone.example/acp/".into()),
        ..base_config()
    };
    assert_eq!(
        config.connect_url(),
        "https://phone.example/acp/?token=tok123"
    );
}

/// The scheme follows the `--https` flag.
#[test]
fn scheme_follows_https_flag() {
    assert_eq!(base_config().scheme(), "http");
    let https = ServerConfig {
        https: true,
        ..base_config()
    };
    assert_eq!(https.scheme(), "https");
}

/// The MCP URL is loopback, carries the session id, and follows the scheme.
#[test]
fn mcp_url_is_loopback_and_session_scoped() {
    let config = base_config();
    assert_eq!(
        config.mcp_url("ui-abc"),
        "http://127.0.0.1:9315/mcp/ui-abc"
    );

    let https = ServerConfig {
        https: true,
        ..base_config()
    };
    assert_eq!(https.mcp_url("ui-abc"), "https://127.0.0.1:9315/mcp/ui-abc");
}
