//! Deployment command handlers
//!
//! Read-only views of action runs: the deployment record, the payload
//! snapshots its jobs stored and the errors it recorded.

use anyhow::Result;
use clap::Subcommand;
use cloudsim_actions::{PgTx, Tx};
use cloudsim_core::domain::data::DeploymentData;
use cloudsim_core::domain::deployment::{Deployment, DeploymentStatus};
use cloudsim_core::domain::error_log::DeploymentError;
use colored::*;
use sqlx::PgPool;
use uuid::Uuid;

/// Deployment subcommands
#[derive(Subcommand)]
pub enum DeploymentCommands {
    /// List deployments, newest first
    List {
        /// Only show deployments with this status (running, finished, rollback)
        #[arg(long)]
        status: Option<DeploymentStatus>,
    },
    /// Show a deployment with its payloads and errors
    Show {
        /// Deployment UUID
        uuid: Uuid,
    },
}

pub async fn handle_deployment_command(command: DeploymentCommands, pool: &PgPool) -> Result<()> {
    let tx = PgTx::begin(pool).await?;

    let result = match command {
        DeploymentCommands::List { status } => list_deployments(&tx, status).await,
        DeploymentCommands::Show { uuid } => show_deployment(&tx, uuid).await,
    };

    // Nothing here writes; never keep the transaction
    tx.rollback().await?;

    result
}

async fn list_deployments(tx: &PgTx, status: Option<DeploymentStatus>) -> Result<()> {
    let deployments = tx.list_deployments(status).await?;

    if deployments.is_empty() {
        println!("{}", "No deployments found.".yellow());
        return Ok(());
    }

    println!(
        "{}",
        format!("Found {} deployment(s):", deployments.len()).bold()
    );
    println!();
    for deployment in &deployments {
        print_deployment_summary(deployment);
    }

    Ok(())
}

async fn show_deployment(tx: &PgTx, uuid: Uuid) -> Result<()> {
    let Some(deployment) = tx.find_deployment(uuid).await? else {
        anyhow::bail!("Deployment {} not found", uuid);
    };

    let data = tx.list_data(deployment.id).await?;
    let errors = tx.find_errors(deployment.id, None).await?;

    print_deployment_details(&deployment);

    if !data.is_empty() {
        println!("\n{}", "Payloads:".bold());
        for row in &data {
            print_data_row(row);
        }
    }

    if errors.is_empty() {
        println!("\n{}", "No errors recorded.".green());
    } else {
        println!("\n{}", format!("Errors ({}):", errors.len()).bold());
        println!("{}", "─".repeat(80).dimmed());
        for error in &errors {
            print_error_row(error);
        }
        println!("{}", "─".repeat(80).dimmed());
    }

    Ok(())
}

fn print_deployment_summary(deployment: &Deployment) {
    println!(
        "  {} Deployment {}",
        "▸".cyan(),
        deployment.uuid.to_string().dimmed()
    );
    println!("    Action:  {}", deployment.action);
    println!("    Status:  {}", colorize_status(&deployment.status));
    println!("    Job:     {}", deployment.current_job);
    println!(
        "    Created: {}",
        deployment
            .created_at
            .format("%Y-%m-%d %H:%M:%S")
            .to_string()
            .dimmed()
    );
    println!();
}

fn print_deployment_details(deployment: &Deployment) {
    println!("{}", "Deployment Details:".bold());
    println!("  UUID:        {}", deployment.uuid.to_string().cyan());
    println!("  Action:      {}", deployment.action);
    println!("  Status:      {}", colorize_status(&deployment.status));
    println!("  Current Job: {}", deployment.current_job);
    println!(
        "  Created:     {}",
        deployment.created_at.format("%Y-%m-%d %H:%M:%S")
    );
    println!(
        "  Updated:     {}",
        deployment.updated_at.format("%Y-%m-%d %H:%M:%S")
    );

    if let Some(reason) = &deployment.rollback_error {
        println!("\n{}", "Rollback Reason:".bold());
        println!("{}", reason.red());
    }
}

fn print_data_row(row: &DeploymentData) {
    println!(
        "  {} {} [{}] {}",
        "▸".cyan(),
        row.job,
        row.kind,
        row.data_type.dimmed()
    );
    match &row.data {
        Some(data) => println!("    {}", data),
        None => println!("    {}", "(no data)".dimmed()),
    }
}

fn print_error_row(error: &DeploymentError) {
    let job = error.job.as_deref().unwrap_or("-");
    println!(
        "{} [{}] {}",
        error
            .created_at
            .format("%H:%M:%S")
            .to_string()
            .dimmed(),
        job.cyan(),
        error.error.red()
    );
}

/// Colorize deployment status for display
fn colorize_status(status: &DeploymentStatus) -> colored::ColoredString {
    let status_str = status.as_str();
    match status {
        DeploymentStatus::Running => status_str.cyan(),
        DeploymentStatus::Finished => status_str.green(),
        DeploymentStatus::Rollback => status_str.red(),
    }
}
