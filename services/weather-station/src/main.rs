//! Weather Station CLI
//!
//! Command-line interface for the environmental telemetry station.

use std::path::PathBuf;

use clap::Parser;
use tracing::Level;

#[cfg(feature = "mock")]
use weather_station::SimulatedHardware;
use weather_station::{load_config, Config, StationBuilder};

#[derive(Parser)]
#[command(name = "weather-station")]
#[command(about = "Wind, rain and atmosphere telemetry station")]
#[command(version)]
struct Args {
    /// Path to configuration file
    #[arg(short, long)]
    config: Option<PathBuf>,

    /// Status server port (overrides config file)
    #[arg(long)]
    server_port: Option<u16>,

    /// Enable or disable the wind pipeline (overrides config file)
    #[arg(long)]
    enable_wind: Option<bool>,

    /// Enable or disable the rain pipeline (overrides config file)
    #[arg(long)]
    enable_rain: Option<bool>,

    /// Enable or disable the atmosphere pipeline (overrides config file)
    #[arg(long)]
    enable_atmosphere: Option<bool>,

    /// Do not upload to WOW even if configured
    #[arg(long)]
    no_wow: bool,

    /// Log level
    #[arg(short, long, default_value = "info", value_parser = parse_log_level)]
    log_level: Level,
}

fn parse_log_level(s: &str) -> Result<Level, String> {
    s.parse().map_err(|_| {
        format!(
            "Invalid log level: {}. Use: trace, debug, info, warn, error",
            s
        )
    })
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    let args = Args::parse();

    tracing_subscriber::fmt()
        .with_max_level(args.log_level)
        .init();

    tracing::debug!(
        "Parsed command line arguments: config={:?}, server_port={:?}, log_level={:?}",
        args.config,
        args.server_port,
        args.log_level
    );

    let mut config = if let Some(config_path) = &args.config {
        tracing::debug!("Loading configuration from {:?}", config_path);
        load_config(config_path)?
    } else {
        tracing::debug!("Using default configuration");
        Config::default()
    };

    config.resolve_secrets();

    if let Some(server_port) = args.server_port {
        config.server.port = server_port;
    }
    if let Some(enabled) = args.enable_wind {
        config.wind.enabled = enabled;
    }
    if let Some(enabled) = args.enable_rain {
        config.rain.enabled = enabled;
    }
    if let Some(enabled) = args.enable_atmosphere {
        config.atmosphere.enabled = enabled;
    }
    if args.no_wow {
        config.reporting.wow = None;
    }

    tracing::info!("Starting weather station");
    tracing::info!(
        "Wind: {}, Rain: {}, Atmosphere: {}",
        config.wind.enabled,
        config.rain.enabled,
        config.atmosphere.enabled
    );
    tracing::info!("Status server port: {}", config.server.port);

    #[cfg(feature = "mock")]
    {
        tracing::info!("Running in MOCK MODE - simulated sensors");
        let factory = std::sync::Arc::new(SimulatedHardware::default());
        StationBuilder::new(config)
            .with_factory(factory)
            .build()
            .await?
            .run()
            .await?;
    }

    #[cfg(not(feature = "mock"))]
    {
        StationBuilder::new(config).build().await?.run().await?;
    }

    Ok(())
}
