//! # danmaku-relay
//!
//! Relay server binary: loads settings, installs logging and metrics, and
//! runs the HTTP/WebSocket server until Ctrl-C.

#![deny(unsafe_code)]

use std::path::PathBuf;

use anyhow::{Context, Result};
use clap::Parser;
use danmaku_core::Relay;
use danmaku_logging::LogFormat;
use danmaku_server::{DanmakuServer, ServerConfig};
use danmaku_settings::DanmakuSettings;

/// Danmaku relay server.
#[derive(Parser, Debug)]
#[command(name = "danmaku-relay", about = "Real-time danmaku relay server")]
struct Cli {
    /// Settings file (defaults to `~/.danmaku/settings.json`).
    #[arg(long)]
    config: Option<PathBuf>,

    /// Host to bind (overrides settings).
    #[arg(long)]
    host: Option<String>,

    /// Port to bind, 0 for auto-assign (overrides settings).
    #[arg(long)]
    port: Option<u16>,

    /// Admin password (overrides settings). Empty disables admin login.
    #[arg(long)]
    admin_password: Option<String>,

    /// Log level or filter directive (overrides settings).
    #[arg(long)]
    log_level: Option<String>,
}

impl Cli {
    /// Apply command-line overrides on top of loaded settings.
    fn apply(self, settings: &mut DanmakuSettings) {
        if let Some(host) = self.host {
            settings.server.host = host;
        }
        if let Some(port) = self.port {
            settings.server.port = port;
        }
        if let Some(password) = self.admin_password {
            settings.admin.password = password;
        }
        if let Some(level) = self.log_level {
            settings.logging.level = level;
        }
    }
}

#[tokio::main]
async fn main() -> Result<()> {
    let mut args = Cli::parse();

    let settings_path = args
        .config
        .take()
        .unwrap_or_else(danmaku_settings::settings_path);
    let mut settings = danmaku_settings::load_settings_from_path(&settings_path)
        .with_context(|| format!("Failed to load settings from {}", settings_path.display()))?;
    args.apply(&mut settings);

    danmaku_logging::init_subscriber(
        &settings.logging.level,
        LogFormat::from_json_flag(settings.logging.json),
    );
    tracing::debug!(path = %settings_path.display(), "settings loaded");

    let metrics = danmaku_server::metrics::install_recorder()
        .context("Failed to install metrics recorder")?;

    let relay = Relay::new(
        settings.display.to_display_settings(),
        settings.display.banned_words(),
        settings.admin.gate(),
    );
    let config = ServerConfig::from_settings(&settings);
    let server = DanmakuServer::new(config, relay, metrics);

    let (addr, handle) = server
        .listen()
        .await
        .context("Failed to bind server")?;

    tracing::info!("Danmaku relay listening on http://{addr} (WebSocket at ws://{addr}/ws)");

    tokio::signal::ctrl_c()
        .await
        .context("Failed to listen for ctrl-c")?;

    tracing::info!("Shutting down...");
    server.stop(handle).await;

    tracing::info!("Shutdown complete");
    Ok(())
}
