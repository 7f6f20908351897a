//! Farmhand CLI
//!
//! Command-line interface for planning and submitting render jobs to the farm.

mod commands;
mod config;

use anyhow::Result;
use clap::Parser;
use commands::{Commands, handle_command};
use config::Config;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

#[derive(Parser)]
#[command(name = "farmhand")]
#[command(about = "Render farm submission CLI", long_about = None)]
struct Cli {
    /// Farm server URL
    #[arg(
        long,
        env = "FARMHAND_FARM_URL",
        default_value = farmhand_client::DEFAULT_FARM_URL
    )]
    farm_url: String,

    /// JSON file holding the pool cache and presets
    #[arg(long, env = "FARMHAND_CONFIG_FILE", default_value = "farmhand.json")]
    config_file: std::path::PathBuf,

    #[command(subcommand)]
    command: Commands,
}

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "farmhand_cli=info,farmhand_broker=info".into()),
        )
        .with(tracing_subscriber::fmt::layer())
        .init();

    let cli = Cli::parse();

    tracing::debug!("Using farm at {}", cli.farm_url);

    let config = Config {
        farm_url: cli.farm_url,
        config_file: cli.config_file,
    };

    handle_command(cli.command, &config).await
}
