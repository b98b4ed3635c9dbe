//! Deployment payload snapshots
//!
//! Stores the input each job was run with and any auxiliary data a job wants
//! to keep for its rollback handler. Rows are keyed by (deployment, job,
//! kind) and written with upsert semantics.

use cloudsim_core::domain::data::DataKind;
use cloudsim_core::domain::deployment::Deployment;

use crate::error::{ActionError, Result};
use crate::payload::{Data, NilType, Payload};
use crate::registry::TypeRegistry;
use crate::repository::Tx;

/// Stores `value` for `job` (or the deployment's current job).
///
/// `None` is persisted as an explicit "no data" row.
pub async fn set_job_data<T: Tx>(
    tx: &T,
    deployment: &Deployment,
    job: Option<&str>,
    kind: DataKind,
    value: Option<&Data>,
) -> Result<()> {
    let job = job.unwrap_or(&deployment.current_job);

    let (data_type, data) = match value {
        Some(value) => (value.type_name(), Some(value.encode()?)),
        None => (NilType::TYPE_NAME, None),
    };

    tx.upsert_data(deployment.id, job, kind, data_type, data)
        .await?;

    tracing::debug!(
        "Stored {} data for job '{}' of deployment {} ({})",
        kind,
        job,
        deployment.uuid,
        data_type
    );

    Ok(())
}

/// Loads the payload stored for `job` (or the deployment's current job).
///
/// Fails with [`ActionError::NoData`] when the row explicitly holds no
/// payload, and with [`ActionError::DataNotFound`] when nothing was ever
/// recorded.
pub async fn get_job_data<T: Tx>(
    tx: &T,
    registry: &TypeRegistry,
    deployment: &Deployment,
    job: Option<&str>,
    kind: DataKind,
) -> Result<Data> {
    let job = job.unwrap_or(&deployment.current_job);

    let row = tx
        .find_data(deployment.id, job, kind)
        .await?
        .ok_or_else(|| ActionError::DataNotFound {
            job: job.to_string(),
            kind: kind.to_string(),
        })?;

    let raw = row.data.ok_or(ActionError::NoData)?;
    let descriptor = registry.resolve(&row.data_type)?;

    descriptor.decode(&raw)
}

/// Like [`get_job_data`], but maps an explicit "no data" row to `None`
pub(crate) async fn get_optional<T: Tx>(
    tx: &T,
    registry: &TypeRegistry,
    deployment: &Deployment,
    job: Option<&str>,
    kind: DataKind,
) -> Result<Option<Data>> {
    match get_job_data(tx, registry, deployment, job, kind).await {
        Ok(data) => Ok(Some(data)),
        Err(ActionError::NoData) => Ok(None),
        Err(e) => Err(e),
    }
}
