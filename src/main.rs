#![forbid(unsafe_code)]

//! `acp-proxy` binary.
//!
//! Parses the CLI, sets up tracing (optionally mirrored to a trace log
//! file), resolves the auth token, prepares TLS material when `--https` is
//! given, prints the connect banner, and runs the transport until a
//! shutdown signal arrives.

use std::sync::Arc;

use clap::Parser;
use tracing::{error, info, warn};
use tracing_subscriber::layer::SubscriberExt;
use tracing_subscriber::util::SubscriberInitExt;
use tracing_subscriber::EnvFilter;

use acp_proxy::config::{AuthToken, ServerConfig, DEFAULT_PORT};
use acp_proxy::server::AppState;
use acp_proxy::tls::{lan_ipv4_addrs, CertStore, TlsMaterial};
use acp_proxy::{banner, server, AppError, Result};

#[derive(Debug, Parser)]
#[command(
    name = "acp-proxy",
    about = "Local bridging proxy between browser UIs and an ACP coding agent",
    version
)]
struct Cli {
    /// TCP port to listen on.
    #[arg(long, default_value_t = DEFAULT_PORT)]
    port: u16,

    /// Bind address.
    #[arg(long, default_value = "localhost")]
    host: String,

    /// Serve HTTPS using a cached self-signed certificate.
    #[arg(long)]
    https: bool,

    /// Disable the auth token check (logged loudly).
    #[arg(long)]
    no_auth: bool,

    /// Override the URL embedded in the QR code and banner.
    #[arg(long)]
    public_url: Option<String>,

    /// Attempt to launch the PWA via Android `am start` (Termux).
    #[arg(long)]
    termux: bool,

    /// Write trace logs to ./.acp-proxy/acp-proxy-<timestamp>.log.
    #[arg(long)]
    debug: bool,

    /// Agent command to spawn on connect (e.g. `claude-code-acp`).
    agent_cmd: String,

    /// Arguments passed to the agent command, after `--`.
    #[arg(last = true)]
    agent_args: Vec<String>,
}

fn main() {
    let args = match Cli::try_parse() {
        Ok(args) => args,
        Err(err) => {
            // --help/--version are not usage errors.
            let code = match err.kind() {
                clap::error::ErrorKind::DisplayHelp | clap::error::ErrorKind::DisplayVersion => 0,
                _ => 1,
            };
            let _ = err.print();
            std::process::exit(code);
        }
    };

    if let Err(err) = init_tracing(args.debug) {
        eprintln!("failed to initialise logging: {err}");
        std::process::exit(2);
    }

    let runtime = match tokio::runtime::Builder::new_multi_thread().enable_all().build() {
        Ok(rt) => rt,
        Err(err) => {
            error!(%err, "failed to build tokio runtime");
            std::process::exit(2);
        }
    };

    if let Err(err) = runtime.block_on(run(args)) {
        error!(%err, "fatal startup error");
        std::process::exit(2);
    }
}

async fn run(args: Cli) -> Result<()> {
    let auth = AuthToken::resolve(args.no_auth);
    if auth.is_disabled() {
        warn!("running without auth — every WebSocket upgrade will be accepted");
    }

    let config = Arc::new(ServerConfig {
        host: args.host,
        port: args.port,
        https: args.https,
        auth,
        public_url: args.public_url,
        termux: args.termux,
        debug: args.debug,
        agent_cmd: args.agent_cmd,
        agent_args: args.agent_args,
        asset_dir: ServerConfig::default_asset_dir(),
        cert_dir: ServerConfig::default_cert_dir(),
    });

    // ── TLS material ────────────────────────────────────
    let tls: Option<TlsMaterial> = if config.https {
        let lan_ips = lan_ipv4_addrs();
        let material = CertStore::new(&config.cert_dir).load_or_generate(&lan_ips)?;
        info!(
            fingerprint = %material.fingerprint,
            regenerated = material.regenerated,
            "TLS certificate ready"
        );
        Some(material)
    } else {
        None
    };

    // ── Transport ───────────────────────────────────────
    let state = AppState::new(Arc::clone(&config));
    let ct = state.shutdown.clone();

    let mut server_task = {
        let state = Arc::clone(&state);
        let tls = tls.clone();
        tokio::spawn(async move { server::serve(state, tls).await })
    };

    banner::print_banner(&config);
    if config.termux {
        banner::launch_android(&config.connect_url()).await;
    }

    // ── Wait for shutdown ───────────────────────────────
    tokio::select! {
        () = shutdown_signal() => {
            info!("shutdown signal received — starting graceful shutdown");
            ct.cancel();

            // Force-exit on a second signal.
            tokio::spawn(async {
                shutdown_signal().await;
                error!("second shutdown signal received — forcing exit");
                std::process::exit(1);
            });

            match tokio::time::timeout(SHUTDOWN_TIMEOUT, &mut server_task).await {
                Ok(result) => flatten_server_result(result)?,
                Err(_elapsed) => {
                    error!(
                        timeout_secs = SHUTDOWN_TIMEOUT.as_secs(),
                        "graceful shutdown timed out — exiting"
                    );
                }
            }
        }
        result = &mut server_task => {
            // The server ended on its own: surface bind errors as fatal.
            return flatten_server_result(result);
        }
    }

    info!("acp-proxy shut down");
    Ok(())
}

/// Maximum time to wait for graceful shutdown before giving up.
const SHUTDOWN_TIMEOUT: std::time::Duration = std::time::Duration::from_secs(10);

fn flatten_server_result(
    result: std::result::Result<Result<()>, tokio::task::JoinError>,
) -> Result<()> {
    match result {
        Ok(inner) => inner,
        Err(err) => Err(AppError::Config(format!("server task failed: {err}"))),
    }
}

async fn shutdown_signal() {
    let ctrl_c = tokio::signal::ctrl_c();

    #[cfg(unix)]
    {
        match tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate()) {
            Ok(mut sigterm) => {
                tokio::select! {
                    _ = ctrl_c => {}
                    _ = sigterm.recv() => {}
                }
            }
            Err(err) => {
                warn!(%err, "failed to register SIGTERM handler, using ctrl-c only");
                let _ = ctrl_c.await;
            }
        }
    }

    #[cfg(not(unix))]
    {
        if let Err(err) = ctrl_c.await {
            error!(%err, "ctrl-c signal handler failed");
        }
    }
}

fn init_tracing(debug: bool) -> Result<()> {
    let default_level = if debug { "debug" } else { "info" };
    let env_filter =
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default_level));

    let console = tracing_subscriber::fmt::layer();
    let registry = tracing_subscriber::registry().with(env_filter).with(console);

    if debug {
        let dir = std::path::Path::new(".acp-proxy");
        std::fs::create_dir_all(dir)
            .map_err(|err| AppError::Config(format!("cannot create log dir: {err}")))?;
        let name = format!(
            "acp-proxy-{}.log",
            chrono::Local::now().format("%Y-%m-%d_%H-%M-%S")
        );
        let file = std::fs::File::create(dir.join(name))
            .map_err(|err| AppError::Config(format!("cannot create log file: {err}")))?;
        let file_layer = tracing_subscriber::fmt::layer()
            .with_ansi(false)
            .with_writer(Arc::new(file));
        registry
            .with(file_layer)
            .try_init()
            .map_err(|err| AppError::Config(format!("failed to init tracing: {err}")))?;
    } else {
        registry
            .try_init()
            .map_err(|err| AppError::Config(format!("failed to init tracing: {err}")))?;
    }

    Ok(())
}
