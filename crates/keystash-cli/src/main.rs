//! CLI entry point for keystash.
//!
//! This binary provides the `keystash` command with subcommands for reading
//! and editing slots, searching them, and producing or restoring backups.

mod cli;
mod commands;
mod helpers;

use anyhow::{Context, Result};
use clap::Parser;
use keystash_store::{StoreConfig, StoreRegistry};
use tracing::debug;

use crate::cli::Cli;

#[tokio::main]
async fn main() -> Result<()> {
    dotenvy::dotenv().ok();
    let cli = Cli::parse();
    helpers::init_tracing(&cli.log_level, cli.log_json);

    let mut config = StoreConfig::load(&cli.config)
        .with_context(|| format!("failed to load {}", cli.config.display()))?;
    config.apply_env();
    debug!(backend = config.backend.kind(), "configuration ready");

    let registry = StoreRegistry::open(config).context("failed to open backend")?;

    let output = commands::execute(&registry, cli.command).await?;
    println!("{}", serde_json::to_string_pretty(&output)?);
    Ok(())
}
