use sqlx::{PgPool, postgres::PgPoolOptions};

use crate::config::Config;

pub async fn create_pool(config: &Config) -> Result<PgPool, sqlx::Error> {
    PgPoolOptions::new()
        .max_connections(config.max_connections)
        .acquire_timeout(config.acquire_timeout)
        .connect(&config.database_url)
        .await
}

pub async fn run_migrations(pool: &PgPool) -> Result<(), sqlx::Error> {
    // Create deployments table
    sqlx::query(
        r#"
        CREATE TABLE IF NOT EXISTS action_deployments (
            id BIGSERIAL PRIMARY KEY,
            uuid UUID NOT NULL UNIQUE,
            action VARCHAR(255) NOT NULL,
            status VARCHAR(50) NOT NULL,
            current_job VARCHAR(255) NOT NULL,
            rollback_error TEXT,
            created_at TIMESTAMPTZ NOT NULL,
            updated_at TIMESTAMPTZ NOT NULL
        )
        "#,
    )
    .execute(pool)
    .await?;

    // Create payload snapshots table
    sqlx::query(
        r#"
        CREATE TABLE IF NOT EXISTS action_deployments_data (
            id BIGSERIAL PRIMARY KEY,
            deployment_id BIGINT NOT NULL REFERENCES action_deployments(id) ON DELETE CASCADE,
            job VARCHAR(255) NOT NULL,
            type VARCHAR(20) NOT NULL,
            data_type VARCHAR(255) NOT NULL,
            data TEXT,
            created_at TIMESTAMPTZ NOT NULL,
            updated_at TIMESTAMPTZ NOT NULL,
            UNIQUE (deployment_id, job, type)
        )
        "#,
    )
    .execute(pool)
    .await?;

    // Create error log table
    sqlx::query(
        r#"
        CREATE TABLE IF NOT EXISTS action_deployments_errors (
            id BIGSERIAL PRIMARY KEY,
            deployment_id BIGINT NOT NULL REFERENCES action_deployments(id) ON DELETE CASCADE,
            job VARCHAR(255),
            error TEXT NOT NULL,
            created_at TIMESTAMPTZ NOT NULL
        )
        "#,
    )
    .execute(pool)
    .await?;

    sqlx::query(
        "CREATE INDEX IF NOT EXISTS idx_action_deployments_status ON action_deployments(status)",
    )
    .execute(pool)
    .await?;

    sqlx::query(
        "CREATE INDEX IF NOT EXISTS idx_action_deployments_created_at ON action_deployments(created_at DESC)",
    )
    .execute(pool)
    .await?;

    sqlx::query(
        "CREATE INDEX IF NOT EXISTS idx_action_deployments_errors_deployment ON action_deployments_errors(deployment_id, job)",
    )
    .execute(pool)
    .await?;

    tracing::info!("Database migrations completed successfully");
    Ok(())
}
