use std::path::PathBuf;
use std::time::Duration;

use clap::{Parser, Subcommand};
use storewatch_common::StoreId;
use storewatch_client::buffer::open_buffer;
use storewatch_client::collector::{ApplicationCounters, TelemetryCollector};
use storewatch_client::config::ClientConfig;
use storewatch_client::shipper::HeartbeatShipper;
use tracing::info;

#[derive(Parser)]
#[command(name = "storewatch-client")]
#[command(about = "StoreWatch client agent - reports liveness and health telemetry")]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Start the heartbeat shipper loop (reads configuration from the environment)
    Start,
    /// Print the configuration that would be used and exit
    Info,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(tracing_subscriber::EnvFilter::from_default_env())
        .init();

    let cli = Cli::parse();
    let config = ClientConfig::load()?;

    match cli.command {
        Commands::Info => {
            info!(?config, "resolved configuration");
            println!("{config:#?}");
            Ok(())
        }
        Commands::Start => {
            info!(store_id = %config.store_id, server = %config.monitoring_server_url, "starting storewatch client");

            let collector =
                TelemetryCollector::new(StoreId::new(config.store_id.clone()), config.store_name.clone());
            let buffer = open_buffer(&PathBuf::from(&config.heartbeat_buffer_path)).await;
            let shipper = HeartbeatShipper::new(
                config.monitoring_server_url.clone(),
                collector,
                buffer,
                Duration::from_millis(config.heartbeat_interval_ms),
            );

            shipper.run(ApplicationCounters::default).await;
            Ok(())
        }
    }
}
