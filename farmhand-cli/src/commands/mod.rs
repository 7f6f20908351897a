//! Commands module
//!
//! Defines all CLI commands and their handlers.

mod job;
mod plan;
mod pools;
mod submit;

pub use pools::PoolCommands;

use std::path::PathBuf;

use anyhow::Result;
use clap::Subcommand;

use crate::config::Config;

/// Top-level CLI commands
#[derive(Subcommand)]
pub enum Commands {
    /// Show how a frame range splits into tasks
    Plan {
        /// Frame range, e.g. `1-100` or a single frame `42`
        frames: String,

        /// Frames per task
        #[arg(short, long, default_value_t = 1)]
        chunk: u32,
    },
    /// Submit the jobs described by a parameters file
    Submit {
        /// JSON file with submission parameters
        params: PathBuf,

        /// Pool preset to apply before submitting
        #[arg(long)]
        preset: Option<String>,

        /// Wait until every job finishes on the farm
        #[arg(short, long)]
        wait: bool,

        /// Write the final job records to this file
        #[arg(long)]
        save: Option<PathBuf>,
    },
    /// Show the farm's view of a job
    Status {
        /// Farm job id
        remote_id: String,
    },
    /// Remove a job from the farm
    Cancel {
        /// Farm job id
        remote_id: String,
    },
    /// Pool catalog and presets
    Pools {
        #[command(subcommand)]
        command: PoolCommands,
    },
}

/// Handle a CLI command
///
/// Routes the command to the appropriate handler module.
pub async fn handle_command(command: Commands, config: &Config) -> Result<()> {
    match command {
        Commands::Plan { frames, chunk } => plan::handle_plan_command(&frames, chunk),
        Commands::Submit {
            params,
            preset,
            wait,
            save,
        } => submit::handle_submit_command(config, &params, preset.as_deref(), wait, save.as_deref()).await,
        Commands::Status { remote_id } => job::handle_status_command(config, &remote_id).await,
        Commands::Cancel { remote_id } => job::handle_cancel_command(config, &remote_id).await,
        Commands::Pools { command } => pools::handle_pool_command(command, config).await,
    }
}
