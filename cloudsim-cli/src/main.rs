//! Cloudsim CLI
//!
//! Operator interface to the action engine's audit tables.

mod commands;

use anyhow::{Context, Result};
use clap::Parser;
use cloudsim_actions::Config;
use commands::{Commands, handle_command};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

#[derive(Parser)]
#[command(name = "cloudsim")]
#[command(about = "Cloudsim action deployments CLI", long_about = None)]
struct Cli {
    /// Postgres connection string
    #[arg(long, env = "DATABASE_URL")]
    database_url: Option<String>,

    #[command(subcommand)]
    command: Commands,
}

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "cloudsim_actions=debug,cloudsim_cli=info".into()),
        )
        .with(tracing_subscriber::fmt::layer().with_writer(std::io::stderr))
        .init();

    let cli = Cli::parse();

    let mut config = Config::from_env()?;
    if let Some(url) = cli.database_url {
        config.database_url = url;
    }
    config.validate().context("invalid configuration")?;

    handle_command(cli.command, &config).await
}

#[cfg(test)]
mod tests {
    use super::*;
    use clap::CommandFactory;

    #[test]
    fn test_cli_definition() {
        Cli::command().debug_assert();
    }

    #[test]
    fn test_parse_deployment_list_with_status() {
        let cli = Cli::try_parse_from(["cloudsim", "deployment", "list", "--status", "rollback"])
            .unwrap();
        assert!(matches!(
            cli.command,
            Commands::Deployment {
                command: commands::DeploymentCommands::List { status: Some(_) }
            }
        ));
    }

    #[test]
    fn test_parse_rejects_unknown_status() {
        let result = Cli::try_parse_from(["cloudsim", "deployment", "list", "--status", "paused"]);
        assert!(result.is_err());
    }
}
