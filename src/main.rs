//! telemetryd - main entry point
//!
//! Loads configuration, builds the sensors and the MQTT client, then hands
//! control to the publish loop until SIGINT/SIGTERM.

use clap::{Parser, Subcommand};
use std::path::PathBuf;
use std::process;
use tokio::signal::unix::{signal, SignalKind};
use tokio::sync::watch;
use tracing::{error, info};

use telemetryd::config::{ConfigError, TelemetryConfig};
use telemetryd::driver::{PublishLoop, SensorEntry};
use telemetryd::error::TelemetryResult;
use telemetryd::transport::mqtt::{BrokerEndpoint, BrokerLink, MqttClient, StatusAnnouncer};
use telemetryd::{observability, sensor};

/// Resilient publish-only MQTT telemetry daemon
#[derive(Parser)]
#[command(name = "telemetryd")]
#[command(about = "Publish simulated device telemetry to an MQTT broker")]
#[command(version)]
struct Cli {
    /// Configuration file path
    #[arg(short, long, value_name = "FILE")]
    config: Option<PathBuf>,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Run the daemon
    Run,
    /// Validate configuration
    Config {
        /// Show the resolved configuration
        #[arg(long)]
        show: bool,
    },
}

#[tokio::main]
async fn main() {
    let cli = Cli::parse();

    // Configuration comes first so the configured log level applies from the
    // start; config errors go to stderr directly.
    let config = match load_configuration(&cli.config) {
        Ok(config) => config,
        Err(err) => {
            eprintln!("configuration error: {err}");
            process::exit(1);
        }
    };

    observability::init_from_config(&config.log_level);
    info!(version = env!("CARGO_PKG_VERSION"), "starting telemetryd");

    let result = match cli.command {
        Commands::Run => run_daemon(config).await,
        Commands::Config { show } => handle_config_command(&config, show),
    };

    if let Err(err) = result {
        error!("{err}");
        process::exit(1);
    }

    info!("shutdown complete");
}

fn load_configuration(config_path: &Option<PathBuf>) -> Result<TelemetryConfig, ConfigError> {
    match config_path {
        Some(path) => TelemetryConfig::load_from_file(path),
        None => {
            let default_paths = ["telemetryd.toml", "config/telemetryd.toml"];
            for path_str in default_paths {
                let path = PathBuf::from(path_str);
                if path.exists() {
                    return TelemetryConfig::load_from_file(&path);
                }
            }
            Err(ConfigError::InvalidConfig(
                "no configuration file found; pass one with -c/--config or create telemetryd.toml"
                    .to_string(),
            ))
        }
    }
}

async fn run_daemon(config: TelemetryConfig) -> TelemetryResult<()> {
    info!(
        client_id = %config.device.client_id,
        broker = %config.broker.url,
        interval_ms = config.publish.interval_ms,
        metrics = config.metrics.len(),
        "configuration loaded"
    );

    // Build sensors from the config metrics.
    let mut sensors = Vec::with_capacity(config.metrics.len());
    for metric in &config.metrics {
        let mut sensor = sensor::build_sensor(metric);
        sensor.init()?;
        sensors.push(SensorEntry {
            topic_suffix: metric.topic_suffix.clone(),
            sensor,
        });
    }

    // Wire the client: endpoint, session handle, status announcer.
    let endpoint = BrokerEndpoint::parse(&config.broker.url)?;
    let link = BrokerLink::open(endpoint, &config.device.client_id)?;
    let announcer = StatusAnnouncer::new(&config.device.client_id, config.qos())?;
    let client = MqttClient::new(link, announcer);

    info!("connecting to broker");
    client.connect(config.keepalive())?;

    // Translate process signals into the cancellation channel the driver
    // loop observes.
    let (shutdown_tx, shutdown_rx) = watch::channel(false);
    let mut sigint = signal(SignalKind::interrupt())?;
    let mut sigterm = signal(SignalKind::terminate())?;
    tokio::spawn(async move {
        tokio::select! {
            _ = sigint.recv() => info!("received SIGINT, shutting down"),
            _ = sigterm.recv() => info!("received SIGTERM, shutting down"),
        }
        let _ = shutdown_tx.send(true);
    });

    let driver = PublishLoop::new(client.clone(), &config, sensors, shutdown_rx);
    let counters = driver.run().await;

    info!(
        publish_ok = counters.publish_ok,
        publish_fail = counters.publish_fail,
        reconnects = client.reconnects(),
        "stopping mqtt client"
    );
    client.stop().await;

    Ok(())
}

fn handle_config_command(config: &TelemetryConfig, show: bool) -> TelemetryResult<()> {
    if show {
        println!(
            "{}",
            toml::to_string_pretty(config).map_err(ConfigError::TomlRender)?
        );
    }
    info!("configuration is valid");
    Ok(())
}
