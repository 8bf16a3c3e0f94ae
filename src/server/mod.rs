//! HTTP + WebSocket transport.
//!
//! One axum router carries the whole surface: `/health`, the `/app/` static
//! PWA assets, the `/mcp` JSON-RPC routes, and the `/ws` upgrade. With
//! `--https` the router is served through `axum-server`'s rustls binding
//! using the cached self-signed certificate.

pub mod auth;
pub mod frames;
pub mod ws;

use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;

use axum::response::Redirect;
use axum::routing::get;
use axum::{Json, Router};
use axum_server::tls_rustls::RustlsConfig;
use tokio_util::sync::CancellationToken;
use tower_http::services::ServeDir;
use tracing::info;

use crate::config::ServerConfig;
use crate::mcp::{McpState, PendingBrowserCalls};
use crate::sandbox::watcher::WatcherRegistry;
use crate::session::SessionRegistry;
use crate::tls::TlsMaterial;
use crate::{AppError, Result};

/// Shared application state behind every route.
pub struct AppState {
    /// Immutable server configuration.
    pub config: Arc<ServerConfig>,
    /// Connected UI sessions.
    pub registry: SessionRegistry,
    /// Refcounted filesystem watchers.
    pub watchers: WatcherRegistry,
    /// In-flight browser tool calls.
    pub pending: PendingBrowserCalls,
    /// Fired once on shutdown; every session task watches it.
    pub shutdown: CancellationToken,
}

impl AppState {
    /// Build fresh state around a configuration.
    #[must_use]
    pub fn new(config: Arc<ServerConfig>) -> Arc<Self> {
        Arc::new(Self {
            config,
            registry: SessionRegistry::new(),
            watchers: WatcherRegistry::new(),
            pending: PendingBrowserCalls::new(),
            shutdown: CancellationToken::new(),
        })
    }
}

/// Assemble the full router over shared state.
#[must_use]
pub fn build_router(state: &Arc<AppState>) -> Router {
    let mcp_state = Arc::new(McpState::new(
        state.registry.clone(),
        state.pending.clone(),
    ));

    Router::new()
        .route("/health", get(health))
        .route("/", get(|| async { Redirect::permanent("/app/") }))
        .nest_service("/app", ServeDir::new(&state.config.asset_dir))
        .route("/ws", get(ws::ws_handler))
        .with_state(Arc::clone(state))
        .merge(crate::mcp::server::router(mcp_state))
}

async fn health() -> Json<serde_json::Value> {
    Json(serde_json::json!({ "status": "ok" }))
}

/// Resolve the configured bind address.
///
/// # Errors
///
/// Returns [`AppError::Config`] when the host does not resolve.
pub async fn resolve_bind_addr(host: &str, port: u16) -> Result<SocketAddr> {
    tokio::net::lookup_host((host, port))
        .await
        .ok()
        .and_then(|mut addrs| addrs.next())
        .ok_or_else(|| AppError::Config(format!("cannot resolve bind address '{host}:{port}'")))
}

/// Serve the router until `state.shutdown` fires.
///
/// # Errors
///
/// Returns [`AppError::Config`] when the port cannot be bound (fatal
/// startup) and [`AppError::Tls`] when the TLS material is rejected.
pub async fn serve(state: Arc<AppState>, tls: Option<TlsMaterial>) -> Result<()> {
    let ct = state.shutdown.clone();
    let router = build_router(&state);
    let addr = resolve_bind_addr(&state.config.host, state.config.port).await?;

    match tls {
        None => {
            let listener = tokio::net::TcpListener::bind(addr).await.map_err(|err| {
                AppError::Config(format!("failed to bind {addr}: {err}"))
            })?;
            info!(%addr, "listening (http)");
            axum::serve(listener, router)
                .with_graceful_shutdown(ct.cancelled_owned())
                .await
                .map_err(|err| AppError::Config(format!("server error: {err}")))?;
        }
        Some(material) => {
            let rustls = RustlsConfig::from_pem(
                material.cert_pem.into_bytes(),
                material.key_pem.into_bytes(),
            )
            .await
            .map_err(|err| AppError::Tls(format!("TLS material rejected: {err}")))?;

            let handle = axum_server::Handle::new();
            {
                let handle = handle.clone();
                let ct = ct.clone();
                tokio::spawn(async move {
                    ct.cancelled().await;
                    handle.graceful_shutdown(Some(Duration::from_secs(5)));
                });
            }

            info!(%addr, "listening (https)");
            axum_server::bind_rustls(addr, rustls)
                .handle(handle)
                .serve(router.into_make_service())
                .await
                .map_err(|err| AppError::Config(format!("server error: {err}")))?;
        }
    }

    info!("transport shut down");
    Ok(())
}
