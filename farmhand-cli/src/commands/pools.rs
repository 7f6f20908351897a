//! Pool command handlers
//!
//! Lists and refreshes the cached farm pools and manages pool presets.

use anyhow::{Result, bail};
use clap::Subcommand;
use colored::*;
use farmhand_broker::service::{PoolCatalog, PoolPreset};

use crate::config::Config;

/// Pool subcommands
#[derive(Subcommand)]
pub enum PoolCommands {
    /// List pools, asking the farm only if none are cached
    List,
    /// Fetch the pool list from the farm
    Refresh,
    /// List pool presets
    Presets,
    /// Add or replace a pool preset
    AddPreset {
        name: String,
        pool: String,

        #[arg(long)]
        secondary_pool: Option<String>,

        #[arg(long)]
        group: Option<String>,
    },
    /// Remove a pool preset
    RemovePreset { name: String },
}

/// Handle pool commands
pub async fn handle_pool_command(command: PoolCommands, config: &Config) -> Result<()> {
    let service = config.service()?;
    let catalog = config.catalog(&service);

    let result = match command {
        PoolCommands::List => list_pools(&catalog).await,
        PoolCommands::Refresh => refresh_pools(&catalog).await,
        PoolCommands::Presets => list_presets(&catalog),
        PoolCommands::AddPreset {
            name,
            pool,
            secondary_pool,
            group,
        } => add_preset(
            &catalog,
            PoolPreset {
                name,
                pool,
                secondary_pool,
                group,
            },
        ),
        PoolCommands::RemovePreset { name } => remove_preset(&catalog, &name),
    };

    service.shutdown().await;
    result
}

async fn list_pools(catalog: &PoolCatalog) -> Result<()> {
    print_pools(&catalog.pools().await?);
    Ok(())
}

async fn refresh_pools(catalog: &PoolCatalog) -> Result<()> {
    let pools = catalog.refresh().await?;
    println!("{}", "✓ Pool cache refreshed".green());
    print_pools(&pools);
    Ok(())
}

fn list_presets(catalog: &PoolCatalog) -> Result<()> {
    let presets = catalog.presets()?;

    if presets.is_empty() {
        println!("{}", "No pool presets saved.".yellow());
        return Ok(());
    }

    println!("{}", format!("Found {} preset(s):", presets.len()).bold());
    for preset in presets {
        println!("  {} {}", "▸".cyan(), preset.name.bold());
        println!("    Pool:      {}", preset.pool);
        if let Some(secondary) = &preset.secondary_pool {
            println!("    Secondary: {}", secondary.dimmed());
        }
        if let Some(group) = &preset.group {
            println!("    Group:     {}", group.dimmed());
        }
    }
    Ok(())
}

fn add_preset(catalog: &PoolCatalog, preset: PoolPreset) -> Result<()> {
    let name = preset.name.clone();
    catalog.save_preset(preset)?;
    println!("{} Saved preset {}", "✓".green(), name.cyan());
    Ok(())
}

fn remove_preset(catalog: &PoolCatalog, name: &str) -> Result<()> {
    if !catalog.remove_preset(name)? {
        bail!("No pool preset named '{}'", name);
    }
    println!("{} Removed preset {}", "✓".green(), name.cyan());
    Ok(())
}

fn print_pools(pools: &[String]) {
    if pools.is_empty() {
        println!("{}", "The farm reports no pools.".yellow());
        return;
    }
    println!("{}", format!("Found {} pool(s):", pools.len()).bold());
    for pool in pools {
        println!("  {} {}", "▸".cyan(), pool);
    }
}
