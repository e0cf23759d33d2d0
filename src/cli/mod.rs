//! CLI module for Fabula
//!
//! Provides operator commands:
//! - `migrate`: apply schema migrations to the configured store
//! - `doctor`: check the store schema and print row counts
//! - `tenant`: create and list tenants

use crate::config::AppConfig;
use anyhow::Context;
use clap::{Parser, Subcommand};
use fabula_store::{Database, StoreConfig};
use std::path::PathBuf;

pub mod doctor;
pub mod migrate;
pub mod tenant;

/// Fabula store CLI
#[derive(Parser, Debug)]
#[command(name = "fabula")]
#[command(about = "Narrative authoring store")]
#[command(version)]
pub struct Cli {
    /// Store path, overriding `database.path`
    #[arg(long, global = true)]
    pub db: Option<String>,

    #[command(subcommand)]
    pub command: Option<Commands>,
}

#[derive(Subcommand, Debug)]
pub enum Commands {
    /// Apply migrations
    Migrate {
        /// Read migration scripts from this directory instead of the embedded set
        #[arg(long)]
        dir: Option<PathBuf>,
    },
    /// Check the store schema
    Doctor,
    /// Tenant administration
    Tenant {
        #[command(subcommand)]
        command: tenant::TenantCommand,
    },
}

/// Run the CLI command
pub async fn run(cli: Cli, config: AppConfig) -> anyhow::Result<()> {
    let mut store = config.database;
    if let Some(path) = cli.db {
        store.path = path;
    }

    match cli.command {
        Some(Commands::Migrate { dir }) => migrate::run(&store, dir).await,
        Some(Commands::Doctor) => doctor::run(&store).await,
        Some(Commands::Tenant { command }) => tenant::run(&store, command).await,
        None => {
            let mut cmd = <Cli as clap::CommandFactory>::command();
            cmd.print_help()?;
            println!();
            Ok(())
        }
    }
}

/// Open the store and bring the schema up to date
pub(crate) async fn open_store(store: &StoreConfig) -> anyhow::Result<Database> {
    Database::connect(store)
        .await
        .with_context(|| format!("Failed to open store at {}", store.path))
}
