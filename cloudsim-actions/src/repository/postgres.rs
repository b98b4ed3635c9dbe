//! Postgres repository
//!
//! Handles all database operations of the engine inside one caller-owned
//! `sqlx` transaction.

use async_trait::async_trait;
use cloudsim_core::domain::data::{DataKind, DeploymentData};
use cloudsim_core::domain::deployment::{Deployment, DeploymentStatus};
use cloudsim_core::domain::error_log::DeploymentError;
use sqlx::postgres::{PgArguments, PgQueryResult};
use sqlx::{PgPool, Postgres, Transaction};
use std::sync::Arc;
use tokio::sync::Mutex;
use uuid::Uuid;

use super::{StoreResult, Tx, parse_kind, parse_status};
use crate::error::StoreError;

/// Shared handle to an open Postgres transaction
#[derive(Clone)]
pub struct PgTx {
    inner: Arc<Mutex<Option<Transaction<'static, Postgres>>>>,
}

impl PgTx {
    /// Begins a new transaction on `pool`
    pub async fn begin(pool: &PgPool) -> Result<Self, sqlx::Error> {
        let tx = pool.begin().await?;
        Ok(Self {
            inner: Arc::new(Mutex::new(Some(tx))),
        })
    }

    /// Commits the transaction. Every clone of this handle is closed afterwards.
    pub async fn commit(&self) -> StoreResult<()> {
        let tx = self
            .inner
            .lock()
            .await
            .take()
            .ok_or(StoreError::TransactionClosed)?;
        tx.commit().await?;
        Ok(())
    }

    /// Rolls the transaction back. Every clone of this handle is closed afterwards.
    pub async fn rollback(&self) -> StoreResult<()> {
        let tx = self
            .inner
            .lock()
            .await
            .take()
            .ok_or(StoreError::TransactionClosed)?;
        tx.rollback().await?;
        Ok(())
    }

    /// Runs a domain statement inside this transaction
    pub async fn execute<'q>(
        &self,
        query: sqlx::query::Query<'q, Postgres, PgArguments>,
    ) -> StoreResult<PgQueryResult> {
        let mut guard = self.inner.lock().await;
        let tx = guard.as_mut().ok_or(StoreError::TransactionClosed)?;
        Ok(query.execute(&mut **tx).await?)
    }
}

#[async_trait]
impl Tx for PgTx {
    async fn lock_deployment(&self, uuid: Uuid) -> StoreResult<()> {
        let mut guard = self.inner.lock().await;
        let tx = guard.as_mut().ok_or(StoreError::TransactionClosed)?;

        sqlx::query("SELECT pg_advisory_xact_lock($1)")
            .bind(advisory_key(uuid))
            .execute(&mut **tx)
            .await?;

        Ok(())
    }

    async fn create_deployment(
        &self,
        action: &str,
        current_job: &str,
    ) -> StoreResult<Deployment> {
        let mut guard = self.inner.lock().await;
        let tx = guard.as_mut().ok_or(StoreError::TransactionClosed)?;

        let uuid = Uuid::new_v4();
        let now = chrono::Utc::now();

        let row = sqlx::query_as::<_, DeploymentRow>(
            r#"
            INSERT INTO action_deployments (uuid, action, status, current_job, created_at, updated_at)
            VALUES ($1, $2, $3, $4, $5, $5)
            RETURNING id, uuid, action, status, current_job, rollback_error, created_at, updated_at
            "#,
        )
        .bind(uuid)
        .bind(action)
        .bind(DeploymentStatus::Running.as_str())
        .bind(current_job)
        .bind(now)
        .fetch_one(&mut **tx)
        .await?;

        row.try_into()
    }

    async fn update_deployment(&self, deployment: &Deployment) -> StoreResult<()> {
        let mut guard = self.inner.lock().await;
        let tx = guard.as_mut().ok_or(StoreError::TransactionClosed)?;

        let result = sqlx::query(
            r#"
            UPDATE action_deployments
            SET status = $1, current_job = $2, rollback_error = $3, updated_at = $4
            WHERE id = $5
            "#,
        )
        .bind(deployment.status.as_str())
        .bind(&deployment.current_job)
        .bind(&deployment.rollback_error)
        .bind(deployment.updated_at)
        .bind(deployment.id)
        .execute(&mut **tx)
        .await?;

        if result.rows_affected() == 0 {
            return Err(StoreError::NotFound(format!(
                "deployment {}",
                deployment.uuid
            )));
        }

        Ok(())
    }

    async fn find_deployment(&self, uuid: Uuid) -> StoreResult<Option<Deployment>> {
        let mut guard = self.inner.lock().await;
        let tx = guard.as_mut().ok_or(StoreError::TransactionClosed)?;

        let row = sqlx::query_as::<_, DeploymentRow>(
            r#"
            SELECT id, uuid, action, status, current_job, rollback_error, created_at, updated_at
            FROM action_deployments
            WHERE uuid = $1
            "#,
        )
        .bind(uuid)
        .fetch_optional(&mut **tx)
        .await?;

        row.map(Deployment::try_from).transpose()
    }

    async fn list_deployments(
        &self,
        status: Option<DeploymentStatus>,
    ) -> StoreResult<Vec<Deployment>> {
        let mut guard = self.inner.lock().await;
        let tx = guard.as_mut().ok_or(StoreError::TransactionClosed)?;

        let rows = sqlx::query_as::<_, DeploymentRow>(
            r#"
            SELECT id, uuid, action, status, current_job, rollback_error, created_at, updated_at
            FROM action_deployments
            WHERE $1::VARCHAR IS NULL OR status = $1
            ORDER BY created_at DESC, id DESC
            "#,
        )
        .bind(status.map(|s| s.as_str()))
        .fetch_all(&mut **tx)
        .await?;

        rows.into_iter().map(Deployment::try_from).collect()
    }

    async fn upsert_data(
        &self,
        deployment_id: i64,
        job: &str,
        kind: DataKind,
        data_type: &str,
        data: Option<String>,
    ) -> StoreResult<()> {
        let mut guard = self.inner.lock().await;
        let tx = guard.as_mut().ok_or(StoreError::TransactionClosed)?;

        sqlx::query(
            r#"
            INSERT INTO action_deployments_data (deployment_id, job, type, data_type, data, created_at, updated_at)
            VALUES ($1, $2, $3, $4, $5, $6, $6)
            ON CONFLICT (deployment_id, job, type)
            DO UPDATE SET data_type = EXCLUDED.data_type, data = EXCLUDED.data, updated_at = EXCLUDED.updated_at
            "#,
        )
        .bind(deployment_id)
        .bind(job)
        .bind(kind.as_str())
        .bind(data_type)
        .bind(data)
        .bind(chrono::Utc::now())
        .execute(&mut **tx)
        .await?;

        Ok(())
    }

    async fn find_data(
        &self,
        deployment_id: i64,
        job: &str,
        kind: DataKind,
    ) -> StoreResult<Option<DeploymentData>> {
        let mut guard = self.inner.lock().await;
        let tx = guard.as_mut().ok_or(StoreError::TransactionClosed)?;

        let row = sqlx::query_as::<_, DataRow>(
            r#"
            SELECT deployment_id, job, type, data_type, data, created_at, updated_at
            FROM action_deployments_data
            WHERE deployment_id = $1 AND job = $2 AND type = $3
            "#,
        )
        .bind(deployment_id)
        .bind(job)
        .bind(kind.as_str())
        .fetch_optional(&mut **tx)
        .await?;

        row.map(DeploymentData::try_from).transpose()
    }

    async fn list_data(&self, deployment_id: i64) -> StoreResult<Vec<DeploymentData>> {
        let mut guard = self.inner.lock().await;
        let tx = guard.as_mut().ok_or(StoreError::TransactionClosed)?;

        let rows = sqlx::query_as::<_, DataRow>(
            r#"
            SELECT deployment_id, job, type, data_type, data, created_at, updated_at
            FROM action_deployments_data
            WHERE deployment_id = $1
            ORDER BY id ASC
            "#,
        )
        .bind(deployment_id)
        .fetch_all(&mut **tx)
        .await?;

        rows.into_iter().map(DeploymentData::try_from).collect()
    }

    async fn insert_error(
        &self,
        deployment_id: i64,
        job: Option<&str>,
        error: &str,
    ) -> StoreResult<DeploymentError> {
        let mut guard = self.inner.lock().await;
        let tx = guard.as_mut().ok_or(StoreError::TransactionClosed)?;

        let row = sqlx::query_as::<_, ErrorRow>(
            r#"
            INSERT INTO action_deployments_errors (deployment_id, job, error, created_at)
            VALUES ($1, $2, $3, $4)
            RETURNING id, deployment_id, job, error, created_at
            "#,
        )
        .bind(deployment_id)
        .bind(job)
        .bind(error)
        .bind(chrono::Utc::now())
        .fetch_one(&mut **tx)
        .await?;

        Ok(row.into())
    }

    async fn find_errors(
        &self,
        deployment_id: i64,
        job: Option<&str>,
    ) -> StoreResult<Vec<DeploymentError>> {
        let mut guard = self.inner.lock().await;
        let tx = guard.as_mut().ok_or(StoreError::TransactionClosed)?;

        let rows = sqlx::query_as::<_, ErrorRow>(
            r#"
            SELECT id, deployment_id, job, error, created_at
            FROM action_deployments_errors
            WHERE deployment_id = $1 AND ($2::VARCHAR IS NULL OR job = $2)
            ORDER BY id ASC
            "#,
        )
        .bind(deployment_id)
        .bind(job)
        .fetch_all(&mut **tx)
        .await?;

        Ok(rows.into_iter().map(|r| r.into()).collect())
    }
}

// =============================================================================
// Helper Functions
// =============================================================================

/// Folds a UUID into the 64-bit key space of Postgres advisory locks
fn advisory_key(uuid: Uuid) -> i64 {
    let (high, low) = uuid.as_u64_pair();
    (high ^ low) as i64
}

// =============================================================================
// Database Row Types
// =============================================================================

#[derive(sqlx::FromRow)]
struct DeploymentRow {
    id: i64,
    uuid: Uuid,
    action: String,
    status: String,
    current_job: String,
    rollback_error: Option<String>,
    created_at: chrono::DateTime<chrono::Utc>,
    updated_at: chrono::DateTime<chrono::Utc>,
}

impl TryFrom<DeploymentRow> for Deployment {
    type Error = StoreError;

    fn try_from(row: DeploymentRow) -> Result<Self, Self::Error> {
        Ok(Deployment {
            id: row.id,
            uuid: row.uuid,
            action: row.action,
            status: parse_status(&row.status)?,
            current_job: row.current_job,
            rollback_error: row.rollback_error,
            created_at: row.created_at,
            updated_at: row.updated_at,
        })
    }
}

#[derive(sqlx::FromRow)]
struct DataRow {
    deployment_id: i64,
    job: String,
    #[sqlx(rename = "type")]
    kind: String,
    data_type: String,
    data: Option<String>,
    created_at: chrono::DateTime<chrono::Utc>,
    updated_at: chrono::DateTime<chrono::Utc>,
}

impl TryFrom<DataRow> for DeploymentData {
    type Error = StoreError;

    fn try_from(row: DataRow) -> Result<Self, Self::Error> {
        Ok(DeploymentData {
            deployment_id: row.deployment_id,
            job: row.job,
            kind: parse_kind(&row.kind)?,
            data_type: row.data_type,
            data: row.data,
            created_at: row.created_at,
            updated_at: row.updated_at,
        })
    }
}

#[derive(sqlx::FromRow)]
struct ErrorRow {
    id: i64,
    deployment_id: i64,
    job: Option<String>,
    error: String,
    created_at: chrono::DateTime<chrono::Utc>,
}

impl From<ErrorRow> for DeploymentError {
    fn from(row: ErrorRow) -> Self {
        DeploymentError {
            id: row.id,
            deployment_id: row.deployment_id,
            job: row.job,
            error: row.error,
            created_at: row.created_at,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_advisory_key_is_stable() {
        let uuid = Uuid::parse_str("67e55044-10b1-426f-9247-bb680e5fe0c8").unwrap();
        assert_eq!(advisory_key(uuid), advisory_key(uuid));
    }

    #[test]
    fn test_advisory_key_differs_between_runs() {
        let a = Uuid::parse_str("67e55044-10b1-426f-9247-bb680e5fe0c8").unwrap();
        let b = Uuid::parse_str("67e55044-10b1-426f-9247-bb680e5fe0c9").unwrap();
        assert_ne!(advisory_key(a), advisory_key(b));
    }
}
