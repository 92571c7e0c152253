//! # courier
//!
//! Courier relay binary: loads settings, wires logging and metrics, and runs
//! the `WebSocket` server until ctrl-c.

#![deny(unsafe_code)]

use std::path::PathBuf;

use anyhow::{Context, Result};
use clap::Parser;
use courier_server::{RelayServer, ServerConfig};
use courier_settings::{CourierSettings, LogFormat};

/// Point-to-point `WebSocket` relay.
#[derive(Parser, Debug)]
#[command(name = "courier", about = "Point-to-point WebSocket relay")]
struct Cli {
    /// Host to bind (overrides settings).
    #[arg(long)]
    host: Option<String>,

    /// Port to bind, 0 for auto-assign (overrides settings).
    #[arg(long)]
    port: Option<u16>,

    /// Settings file (default `~/.courier/settings.json`).
    #[arg(long)]
    settings: Option<PathBuf>,

    /// Log filter, e.g. `info` or `courier_core=debug` (overrides settings).
    #[arg(long)]
    log_level: Option<String>,
}

impl Cli {
    /// Layer command-line flags over loaded settings.
    fn apply(&self, settings: &mut CourierSettings) {
        if let Some(ref host) = self.host {
            settings.server.host.clone_from(host);
        }
        if let Some(port) = self.port {
            settings.server.port = port;
        }
        if let Some(ref level) = self.log_level {
            settings.logging.level.clone_from(level);
        }
    }
}

fn load_settings(cli: &Cli) -> Result<CourierSettings> {
    let path = cli
        .settings
        .clone()
        .unwrap_or_else(courier_settings::settings_path);
    let mut settings = courier_settings::load_settings_from_path(&path)
        .with_context(|| format!("Failed to load settings from {}", path.display()))?;
    cli.apply(&mut settings);
    settings
        .validate()
        .context("Invalid settings after command-line overrides")?;
    Ok(settings)
}

#[tokio::main]
async fn main() -> Result<()> {
    let args = Cli::parse();
    let settings = load_settings(&args)?;

    match settings.logging.format {
        LogFormat::Compact => courier_core::logging::init_subscriber(&settings.logging.level),
        LogFormat::Json => courier_core::logging::init_json_subscriber(&settings.logging.level),
    }

    let metrics_handle =
        courier_server::metrics::install_recorder().context("Failed to install metrics")?;

    let server = RelayServer::new(ServerConfig::from_settings(&settings.server), metrics_handle);
    let (addr, handle) = server.listen().await.context("Failed to bind server")?;
    tracing::info!("Courier relay listening on ws://{addr}/websocket/{{userId}}");

    tokio::signal::ctrl_c()
        .await
        .context("Failed to listen for ctrl-c")?;

    tracing::info!(online = server.registry().current_count(), "Shutting down...");
    server.stop(handle).await;

    tracing::info!("Shutdown complete");
    Ok(())
}
