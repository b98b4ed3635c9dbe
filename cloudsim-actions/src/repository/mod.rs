//! Repository layer
//!
//! Data access for the three audit tables of the engine. A [`Tx`] value is
//! one open transaction owned by the caller: the engine only reads and
//! writes through it, it never begins or commits. Hooks receive the same
//! handle, so a job's own domain writes commit together with the engine's
//! bookkeeping.
//!
//! The trait is implemented for Postgres and for an in-memory backend used
//! by tests and dry runs.

pub mod memory;
pub mod postgres;

use async_trait::async_trait;
use cloudsim_core::domain::data::{DataKind, DeploymentData};
use cloudsim_core::domain::deployment::{Deployment, DeploymentStatus};
use cloudsim_core::domain::error_log::DeploymentError;
use uuid::Uuid;

use crate::error::StoreError;

pub use memory::MemoryTx;
pub use postgres::PgTx;

pub type StoreResult<T> = std::result::Result<T, StoreError>;

/// Transaction handle threaded through every engine call and hook
#[async_trait]
pub trait Tx: Clone + Send + Sync + 'static {
    /// Serializes concurrent executions of the same deployment.
    ///
    /// Held until the transaction ends.
    async fn lock_deployment(&self, uuid: Uuid) -> StoreResult<()>;

    /// Inserts a new `Running` deployment positioned at `current_job`
    async fn create_deployment(&self, action: &str, current_job: &str)
    -> StoreResult<Deployment>;

    /// Persists status, current job and rollback error of a deployment
    async fn update_deployment(&self, deployment: &Deployment) -> StoreResult<()>;

    async fn find_deployment(&self, uuid: Uuid) -> StoreResult<Option<Deployment>>;

    /// Lists deployments, newest first
    async fn list_deployments(
        &self,
        status: Option<DeploymentStatus>,
    ) -> StoreResult<Vec<Deployment>>;

    /// Creates or replaces the payload row for (deployment, job, kind)
    async fn upsert_data(
        &self,
        deployment_id: i64,
        job: &str,
        kind: DataKind,
        data_type: &str,
        data: Option<String>,
    ) -> StoreResult<()>;

    async fn find_data(
        &self,
        deployment_id: i64,
        job: &str,
        kind: DataKind,
    ) -> StoreResult<Option<DeploymentData>>;

    async fn list_data(&self, deployment_id: i64) -> StoreResult<Vec<DeploymentData>>;

    /// Appends an error row
    async fn insert_error(
        &self,
        deployment_id: i64,
        job: Option<&str>,
        error: &str,
    ) -> StoreResult<DeploymentError>;

    /// Error rows of a deployment in insertion order, optionally for one job
    async fn find_errors(
        &self,
        deployment_id: i64,
        job: Option<&str>,
    ) -> StoreResult<Vec<DeploymentError>>;
}

// =============================================================================
// Helper Functions
// =============================================================================

fn parse_status(s: &str) -> StoreResult<DeploymentStatus> {
    s.parse().map_err(StoreError::Corrupt)
}

fn parse_kind(s: &str) -> StoreResult<DataKind> {
    s.parse().map_err(StoreError::Corrupt)
}
