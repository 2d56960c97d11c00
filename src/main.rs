//! # switchboard
//!
//! Signaling relay binary: loads configuration, initializes telemetry and
//! serves `/ws` until ctrl-c.

use std::path::PathBuf;

use anyhow::{Context, Result};
use clap::Parser;
use switchboard_server::{load_config, ServerConfig};
use switchboard_telemetry::{init_telemetry, TelemetryConfig};

/// WebSocket signaling relay for peer-to-peer call setup.
#[derive(Parser, Debug)]
#[command(name = "switchboard", version, about)]
struct Cli {
    /// JSON config file; missing file means defaults.
    #[arg(long)]
    config: Option<PathBuf>,

    /// Host to bind.
    #[arg(long)]
    host: Option<String>,

    /// Port to bind (0 for auto-assign).
    #[arg(long)]
    port: Option<u16>,

    /// Default log level (RUST_LOG still wins).
    #[arg(long)]
    log_level: Option<String>,

    /// Emit logs as JSON lines.
    #[arg(long)]
    json_logs: bool,
}

impl Cli {
    fn apply(&self, config: &mut ServerConfig) {
        if let Some(host) = &self.host {
            config.host.clone_from(host);
        }
        if let Some(port) = self.port {
            config.port = port;
        }
        if let Some(level) = &self.log_level {
            config.log_level.clone_from(level);
        }
        if self.json_logs {
            config.log_json = true;
        }
    }
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    let mut config = load_config(cli.config.as_deref()).context("Failed to load configuration")?;
    cli.apply(&mut config);
    config.validate().context("Invalid configuration")?;

    let telemetry = init_telemetry(&TelemetryConfig {
        log_level: config.level()?,
        json: config.log_json,
        metrics_enabled: config.metrics_enabled,
    });

    tracing::info!(version = env!("CARGO_PKG_VERSION"), "starting switchboard");

    let handle = switchboard_server::start(config, telemetry.metrics().cloned())
        .await
        .context("Failed to start server")?;

    tracing::info!(addr = %handle.local_addr(), "switchboard ready");

    tokio::signal::ctrl_c()
        .await
        .context("Failed to listen for ctrl+c")?;

    tracing::info!("shutting down");
    handle.shutdown().await;
    Ok(())
}
