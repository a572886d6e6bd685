//! Camview CLI
//!
//! Command-line interface for the camera stream viewer.

use std::path::PathBuf;

use camview::{load_config, Config};
use clap::Parser;
use tracing::Level;

#[derive(Parser)]
#[command(name = "camview")]
#[command(about = "Camera stream viewer with liveness monitoring")]
#[command(version)]
struct Args {
    /// Path to configuration file
    #[arg(short, long)]
    config: Option<PathBuf>,

    /// Base address of the camera device, e.g. http://192.168.4.1:8000
    /// (overrides config file)
    #[arg(short, long)]
    base: Option<String>,

    /// Device origin used while the base is empty (overrides config file)
    #[arg(long)]
    device_origin: Option<String>,

    /// Viewer page port (overrides config file)
    #[arg(long)]
    dashboard_port: Option<u16>,

    /// Log level
    #[arg(short, long, default_value = "info")]
    log_level: Level,
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    let args = Args::parse();

    tracing_subscriber::fmt()
        .with_max_level(args.log_level)
        .init();

    tracing::debug!(
        "Parsed command line arguments: config={:?}, base={:?}, device_origin={:?}, dashboard_port={:?}, log_level={:?}",
        args.config,
        args.base,
        args.device_origin,
        args.dashboard_port,
        args.log_level
    );

    let mut config = if let Some(config_path) = &args.config {
        tracing::debug!("Loading configuration from {:?}", config_path);
        load_config(config_path)?
    } else {
        tracing::debug!("Using default configuration");
        Config::default()
    };

    if let Some(base) = args.base {
        config.base = base;
    }
    if let Some(device_origin) = args.device_origin {
        config.device_origin = device_origin;
    }
    if let Some(dashboard_port) = args.dashboard_port {
        config.dashboard.port = dashboard_port;
    }

    tracing::info!("Starting camera viewer");
    tracing::debug!(
        "Poll interval: {:?}, stream attacher: {}, viewer page: {}",
        config.liveness.poll_interval(),
        config.stream.enabled,
        config.dashboard.enabled
    );

    camview::run(config).await?;

    Ok(())
}
