//! Deployment state machine
//!
//! `Running -> Finished` when every job succeeds, `Running -> Rollback` when
//! a job fails. `Rollback` is terminal: the record keeps the reason, and a
//! marker row under [`COMPENSATED_MARKER`] tells that compensation completed.

use cloudsim_core::domain::data::DataKind;
use cloudsim_core::domain::deployment::{Deployment, DeploymentStatus};
use cloudsim_core::domain::error_log::DeploymentError;

use crate::data;
use crate::error::{ActionError, Result};
use crate::payload::{Data, NilType, Payload};
use crate::repository::Tx;

/// Job key of the row written once the backward walk reached the first job.
///
/// Job names starting with `@` are rejected, so it never collides with a job.
pub const COMPENSATED_MARKER: &str = "@compensated";

/// Creates the record of a new run positioned at `first_job`
pub async fn create<T: Tx>(tx: &T, action: &str, first_job: &str) -> Result<Deployment> {
    let deployment = tx.create_deployment(action, first_job).await?;

    tracing::info!(
        "Deployment {} created for action '{}'",
        deployment.uuid,
        action
    );

    Ok(deployment)
}

/// Moves the cursor to `job` and stores the input it is about to run with.
///
/// Nothing is written when the deployment is already at `job`, so a resumed
/// run keeps the snapshot it crashed with.
pub async fn set_job<T: Tx>(
    tx: &T,
    deployment: &mut Deployment,
    job: &str,
    input: Option<&Data>,
) -> Result<()> {
    if deployment.current_job == job {
        return Ok(());
    }

    deployment.current_job = job.to_string();
    deployment.updated_at = chrono::Utc::now();
    tx.update_deployment(deployment).await?;

    data::set_job_data(tx, deployment, Some(job), DataKind::Input, input).await?;

    tracing::debug!("Deployment {} moved to job '{}'", deployment.uuid, job);

    Ok(())
}

/// Moves the cursor to `job` without touching any snapshot.
///
/// Used while compensating, where the forward inputs must stay intact.
pub async fn move_to_job<T: Tx>(tx: &T, deployment: &mut Deployment, job: &str) -> Result<()> {
    if deployment.current_job == job {
        return Ok(());
    }

    deployment.current_job = job.to_string();
    deployment.updated_at = chrono::Utc::now();
    tx.update_deployment(deployment).await?;

    tracing::debug!(
        "Deployment {} compensating at job '{}'",
        deployment.uuid,
        job
    );

    Ok(())
}

/// Marks the deployment for rollback. A reason is mandatory.
pub async fn set_rollback_status<T: Tx>(
    tx: &T,
    deployment: &mut Deployment,
    reason: Option<&str>,
) -> Result<()> {
    let reason = match reason {
        Some(reason) if !reason.is_empty() => reason,
        _ => return Err(ActionError::RollbackErrIsNil),
    };

    deployment.status = DeploymentStatus::Rollback;
    deployment.rollback_error = Some(reason.to_string());
    deployment.updated_at = chrono::Utc::now();
    tx.update_deployment(deployment).await?;

    tracing::info!(
        "Deployment {} entered rollback: {}",
        deployment.uuid,
        reason
    );

    Ok(())
}

pub async fn set_finished_status<T: Tx>(tx: &T, deployment: &mut Deployment) -> Result<()> {
    deployment.status = DeploymentStatus::Finished;
    deployment.updated_at = chrono::Utc::now();
    tx.update_deployment(deployment).await?;

    tracing::info!("Deployment {} finished", deployment.uuid);

    Ok(())
}

/// Records that every rollback handler of the deployment ran successfully
pub async fn set_compensated<T: Tx>(tx: &T, deployment: &Deployment) -> Result<()> {
    tx.upsert_data(
        deployment.id,
        COMPENSATED_MARKER,
        DataKind::JobData,
        NilType::TYPE_NAME,
        None,
    )
    .await?;

    tracing::info!("Deployment {} compensated", deployment.uuid);

    Ok(())
}

pub async fn is_compensated<T: Tx>(tx: &T, deployment: &Deployment) -> Result<bool> {
    let marker = tx
        .find_data(deployment.id, COMPENSATED_MARKER, DataKind::JobData)
        .await?;
    Ok(marker.is_some())
}

/// Appends an error row for the deployment
pub async fn log_error<T: Tx>(
    tx: &T,
    deployment: &Deployment,
    job: Option<&str>,
    error: &ActionError,
) -> Result<DeploymentError> {
    let row = tx
        .insert_error(deployment.id, job, &error.to_string())
        .await?;

    tracing::warn!(
        "Deployment {} recorded error{}: {}",
        deployment.uuid,
        job.map(|j| format!(" in job '{}'", j)).unwrap_or_default(),
        error
    );

    Ok(row)
}

/// Recorded errors of the deployment, optionally narrowed to one job
pub async fn errors<T: Tx>(
    tx: &T,
    deployment: &Deployment,
    job: Option<&str>,
) -> Result<Vec<DeploymentError>> {
    Ok(tx.find_errors(deployment.id, job).await?)
}
