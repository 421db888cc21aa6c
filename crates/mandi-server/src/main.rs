//! Mandi price analytics server - entry point.

use anyhow::Result;
use clap::Parser;
use tracing::info;

/// Agricultural market price analytics and alerts server
#[derive(Parser, Debug)]
#[command(version, about, long_about = None)]
struct Args {
    /// Configuration file path (can also be set via MANDI_CONFIG env var)
    #[arg(short, long)]
    config: Option<String>,
}

#[tokio::main]
async fn main() -> Result<()> {
    let args = Args::parse();

    mandi_telemetry::init_logging()?;

    info!("Starting mandi-server v{}", env!("CARGO_PKG_VERSION"));

    let config_path = mandi_server::AppConfig::resolve_path(args.config);
    info!(config_path = %config_path, "Loading configuration");

    let config = mandi_server::AppConfig::load(&config_path)?;
    info!(
        addr = %config.server.socket_addr(),
        sweep_enabled = config.alerts.sweep_enabled,
        dispatcher = ?config.alerts.dispatcher,
        "Configuration loaded"
    );

    let app = mandi_server::Application::new(config)?;
    app.run().await?;

    Ok(())
}
