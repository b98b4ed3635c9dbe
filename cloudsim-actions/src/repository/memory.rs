//! In-memory repository
//!
//! Keeps the three audit tables in process memory with the same upsert and
//! append semantics as Postgres. Clones share state, like clones of a
//! transaction handle share one transaction.

use async_trait::async_trait;
use cloudsim_core::domain::data::{DataKind, DeploymentData};
use cloudsim_core::domain::deployment::{Deployment, DeploymentStatus};
use cloudsim_core::domain::error_log::DeploymentError;
use std::collections::HashMap;
use std::sync::Arc;
use tokio::sync::RwLock;
use uuid::Uuid;

use super::{StoreResult, Tx};
use crate::error::StoreError;

#[derive(Debug, Default)]
struct Tables {
    deployments: Vec<Deployment>,
    data: HashMap<(i64, String, DataKind), DeploymentData>,
    /// Insertion order of `data` keys, so listings match the Postgres id order
    data_order: Vec<(i64, String, DataKind)>,
    errors: Vec<DeploymentError>,
}

/// Shared in-memory transaction
#[derive(Debug, Default, Clone)]
pub struct MemoryTx {
    tables: Arc<RwLock<Tables>>,
}

impl MemoryTx {
    pub fn new() -> Self {
        Self::default()
    }

    /// Number of payload rows across all deployments
    pub async fn data_len(&self) -> usize {
        self.tables.read().await.data.len()
    }
}

#[async_trait]
impl Tx for MemoryTx {
    async fn lock_deployment(&self, _uuid: Uuid) -> StoreResult<()> {
        Ok(())
    }

    async fn create_deployment(
        &self,
        action: &str,
        current_job: &str,
    ) -> StoreResult<Deployment> {
        let mut tables = self.tables.write().await;
        let now = chrono::Utc::now();

        let deployment = Deployment {
            id: tables.deployments.len() as i64 + 1,
            uuid: Uuid::new_v4(),
            action: action.to_string(),
            status: DeploymentStatus::Running,
            current_job: current_job.to_string(),
            rollback_error: None,
            created_at: now,
            updated_at: now,
        };
        tables.deployments.push(deployment.clone());

        Ok(deployment)
    }

    async fn update_deployment(&self, deployment: &Deployment) -> StoreResult<()> {
        let mut tables = self.tables.write().await;
        let stored = tables
            .deployments
            .iter_mut()
            .find(|d| d.id == deployment.id)
            .ok_or_else(|| StoreError::NotFound(format!("deployment {}", deployment.uuid)))?;

        stored.status = deployment.status;
        stored.current_job = deployment.current_job.clone();
        stored.rollback_error = deployment.rollback_error.clone();
        stored.updated_at = deployment.updated_at;

        Ok(())
    }

    async fn find_deployment(&self, uuid: Uuid) -> StoreResult<Option<Deployment>> {
        Ok(self
            .tables
            .read()
            .await
            .deployments
            .iter()
            .find(|d| d.uuid == uuid)
            .cloned())
    }

    async fn list_deployments(
        &self,
        status: Option<DeploymentStatus>,
    ) -> StoreResult<Vec<Deployment>> {
        Ok(self
            .tables
            .read()
            .await
            .deployments
            .iter()
            .rev()
            .filter(|d| status.is_none_or(|s| d.status == s))
            .cloned()
            .collect())
    }

    async fn upsert_data(
        &self,
        deployment_id: i64,
        job: &str,
        kind: DataKind,
        data_type: &str,
        data: Option<String>,
    ) -> StoreResult<()> {
        let mut tables = self.tables.write().await;
        let now = chrono::Utc::now();
        let key = (deployment_id, job.to_string(), kind);

        match tables.data.get_mut(&key) {
            Some(row) => {
                row.data_type = data_type.to_string();
                row.data = data;
                row.updated_at = now;
            }
            None => {
                tables.data_order.push(key.clone());
                tables.data.insert(
                    key,
                    DeploymentData {
                        deployment_id,
                        job: job.to_string(),
                        kind,
                        data_type: data_type.to_string(),
                        data,
                        created_at: now,
                        updated_at: now,
                    },
                );
            }
        }

        Ok(())
    }

    async fn find_data(
        &self,
        deployment_id: i64,
        job: &str,
        kind: DataKind,
    ) -> StoreResult<Option<DeploymentData>> {
        Ok(self
            .tables
            .read()
            .await
            .data
            .get(&(deployment_id, job.to_string(), kind))
            .cloned())
    }

    async fn list_data(&self, deployment_id: i64) -> StoreResult<Vec<DeploymentData>> {
        let tables = self.tables.read().await;
        Ok(tables
            .data_order
            .iter()
            .filter(|(id, _, _)| *id == deployment_id)
            .filter_map(|key| tables.data.get(key).cloned())
            .collect())
    }

    async fn insert_error(
        &self,
        deployment_id: i64,
        job: Option<&str>,
        error: &str,
    ) -> StoreResult<DeploymentError> {
        let mut tables = self.tables.write().await;

        let row = DeploymentError {
            id: tables.errors.len() as i64 + 1,
            deployment_id,
            job: job.map(str::to_string),
            error: error.to_string(),
            created_at: chrono::Utc::now(),
        };
        tables.errors.push(row.clone());

        Ok(row)
    }

    async fn find_errors(
        &self,
        deployment_id: i64,
        job: Option<&str>,
    ) -> StoreResult<Vec<DeploymentError>> {
        Ok(self
            .tables
            .read()
            .await
            .errors
            .iter()
            .filter(|e| e.deployment_id == deployment_id)
            .filter(|e| job.is_none_or(|j| e.job.as_deref() == Some(j)))
            .cloned()
            .collect())
    }
}
