//! Startup banner: connect URL, QR code, and the Android launcher helper.

use qrcode::render::unicode;
use qrcode::QrCode;
use tracing::{info, warn};

use crate::config::ServerConfig;
use crate::tls::lan_ipv4_addrs;

/// Print the connect URL, per-interface variants, and a scannable QR code.
pub fn print_banner(config: &ServerConfig) {
    let url = config.connect_url();

    println!();
    println!("  acp-proxy v{}", env!("CARGO_PKG_VERSION"));
    println!("  agent: {} {}", config.agent_cmd, config.agent_args.join(" "));
    println!();
    println!("  Open on this device:  {url}");

    // When bound beyond loopback, list the LAN addresses a phone can reach.
    if config.public_url.is_none() && config.host != "localhost" && config.host != "127.0.0.1" {
        for ip in lan_ipv4_addrs() {
            let mut lan = format!("{}://{ip}:{}/app/", config.scheme(), config.port);
            if let Some(token) = config.auth.token() {
                lan.push_str(&format!("?token={token}"));
            }
            println!("  Open on your LAN:     {lan}");
        }
    }

    if config.auth.is_disabled() {
        warn!("auth disabled (--no-auth): anyone who can reach this port controls the agent");
    }

    match QrCode::new(url.as_bytes()) {
        Ok(code) => {
            let image = code
                .render::<unicode::Dense1x2>()
                .quiet_zone(true)
                .build();
            println!();
            println!("{image}");
        }
        Err(err) => warn!(%err, "could not render QR code"),
    }
    println!();
}

/// Best-effort PWA launch through the Android activity manager (`--termux`).
pub async fn launch_android(url: &str) {
    let status = tokio::process::Command::new("am")
        .args(["start", "-a", "android.intent.action.VIEW", "-d", url])
        .status()
        .await;

    match status {
        Ok(status) if status.success() => info!("launched PWA via am start"),
        Ok(status) => warn!(?status, "am start exited with failure"),
        Err(err) => warn!(%err, "am start unavailable"),
    }
}
