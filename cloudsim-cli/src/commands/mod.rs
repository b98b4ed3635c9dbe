//! Commands module
//!
//! Defines all CLI commands and their handlers.

mod deployment;
mod migrate;

pub use deployment::DeploymentCommands;

use anyhow::{Context, Result};
use clap::Subcommand;
use cloudsim_actions::{Config, db};
use sqlx::PgPool;

/// Top-level CLI commands
#[derive(Subcommand)]
pub enum Commands {
    /// Create the action engine tables
    Migrate,
    /// Inspect action deployments
    Deployment {
        #[command(subcommand)]
        command: DeploymentCommands,
    },
}

/// Routes the command to the appropriate handler module
pub async fn handle_command(command: Commands, config: &Config) -> Result<()> {
    let pool = connect(config).await?;

    match command {
        Commands::Migrate => migrate::handle_migrate_command(&pool).await,
        Commands::Deployment { command } => {
            deployment::handle_deployment_command(command, &pool).await
        }
    }
}

async fn connect(config: &Config) -> Result<PgPool> {
    tracing::debug!("Connecting to database...");
    db::create_pool(config)
        .await
        .context("failed to connect to the database")
}
