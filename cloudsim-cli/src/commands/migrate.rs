//! Migrate command handler

use anyhow::{Context, Result};
use cloudsim_actions::db;
use colored::*;
use sqlx::PgPool;

pub async fn handle_migrate_command(pool: &PgPool) -> Result<()> {
    db::run_migrations(pool)
        .await
        .context("failed to run database migrations")?;

    println!("{}", "✓ Action engine tables are up to date".green());

    Ok(())
}
