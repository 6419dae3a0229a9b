//! # boardcast
//!
//! Server binary: loads settings, initializes logging and metrics, and serves
//! the board broadcast hub until interrupted.

#![deny(unsafe_code)]

mod logging;

use std::path::PathBuf;

use anyhow::{Context, Result};
use boardcast_server::metrics::install_recorder;
use boardcast_server::{BoardcastServer, ServerConfig};
use boardcast_settings::BoardcastSettings;
use clap::Parser;

/// Real-time board broadcast server.
#[derive(Parser, Debug)]
#[command(name = "boardcast", about = "Real-time board broadcast server")]
struct Cli {
    /// Host to bind (overrides settings).
    #[arg(long)]
    host: Option<String>,

    /// Port to bind, 0 for auto-assign (overrides settings).
    #[arg(long)]
    port: Option<u16>,

    /// Path to the settings file. Defaults to `~/.boardcast/settings.json`.
    #[arg(long)]
    settings: Option<PathBuf>,

    /// Maximum concurrent connections (overrides settings).
    #[arg(long)]
    max_connections: Option<usize>,

    /// Disable the Prometheus `/metrics` endpoint.
    #[arg(long)]
    no_metrics: bool,
}

impl Cli {
    /// Apply command-line overrides on top of loaded settings.
    fn apply_overrides(&self, settings: &mut BoardcastSettings) {
        if let Some(host) = &self.host {
            settings.server.host.clone_from(host);
        }
        if let Some(port) = self.port {
            settings.server.port = port;
        }
        if let Some(max) = self.max_connections {
            settings.server.max_connections = max;
        }
    }
}

fn load_settings(cli: &Cli) -> Result<BoardcastSettings> {
    let path = cli
        .settings
        .clone()
        .unwrap_or_else(boardcast_settings::settings_path);
    let mut settings = boardcast_settings::load_settings_from_path(&path)
        .with_context(|| format!("Failed to load settings from {}", path.display()))?;
    cli.apply_overrides(&mut settings);
    settings.validate().context("Invalid settings after overrides")?;
    Ok(settings)
}

/// Resolve on Ctrl-C, or SIGTERM on Unix.
async fn shutdown_signal() -> Result<()> {
    #[cfg(unix)]
    {
        use tokio::signal::unix::{SignalKind, signal};
        let mut term =
            signal(SignalKind::terminate()).context("Failed to install SIGTERM handler")?;
        tokio::select! {
            result = tokio::signal::ctrl_c() => result.context("Failed to listen for ctrl-c")?,
            _ = term.recv() => {}
        }
        Ok(())
    }
    #[cfg(not(unix))]
    {
        tokio::signal::ctrl_c()
            .await
            .context("Failed to listen for ctrl-c")
    }
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    // Settings first: the log level comes from them.
    let settings = load_settings(&cli)?;
    logging::init_subscriber(&settings.logging);

    let metrics = if cli.no_metrics {
        None
    } else {
        Some(install_recorder().context("Failed to install metrics recorder")?)
    };

    let config = ServerConfig::from_settings(&settings);
    let server = BoardcastServer::new(config, metrics);
    let (addr, handle) = server.listen().await.context("Failed to bind server")?;

    tracing::info!(
        %addr,
        max_connections = settings.server.max_connections,
        heartbeat_interval_secs = settings.hub.heartbeat_interval_secs,
        "boardcast listening on ws://{addr}/ws"
    );

    shutdown_signal().await?;

    tracing::info!("Shutting down...");
    server.stop(vec![handle]).await;
    tracing::info!("Shutdown complete");
    Ok(())
}
