//! Execution input
//!
//! In-memory handle for one run of an action: the persisted deployment (once
//! it exists) plus the index of the job the run is at. A fresh handle creates
//! its deployment on first execution; a restored handle recomputes its index
//! from the deployment's current job.

use cloudsim_core::domain::data::DataKind;
use cloudsim_core::domain::deployment::Deployment;
use uuid::Uuid;

use crate::action::{Action, action_key};
use crate::data;
use crate::deployment;
use crate::error::{ActionError, Result};
use crate::payload::Data;
use crate::repository::Tx;

#[derive(Debug, Clone)]
pub struct ExecutionInput {
    action: String,
    deployment: Option<Deployment>,
    index: usize,
}

impl ExecutionInput {
    /// Handle for a new run of the action registered under `application`/`name`
    pub fn new(application: Option<&str>, name: &str) -> Self {
        Self {
            action: action_key(application, name),
            deployment: None,
            index: 0,
        }
    }

    /// Handle resuming an existing deployment
    pub fn from_deployment(deployment: Deployment) -> Self {
        Self {
            action: deployment.action.clone(),
            deployment: Some(deployment),
            index: 0,
        }
    }

    /// Loads the deployment `uuid` and returns a handle resuming it
    pub async fn load<T: Tx>(tx: &T, uuid: Uuid) -> Result<Self> {
        let deployment = tx
            .find_deployment(uuid)
            .await?
            .ok_or(ActionError::ExecutionInputRestoreNoDeployment)?;

        Ok(Self::from_deployment(deployment))
    }

    /// Registry key of the action this run executes
    pub fn action(&self) -> &str {
        &self.action
    }

    pub fn deployment(&self) -> Option<&Deployment> {
        self.deployment.as_ref()
    }

    /// Index of the current job within the action
    pub fn index(&self) -> usize {
        self.index
    }

    /// Whether the run has no deployment yet
    pub fn is_fresh(&self) -> bool {
        self.deployment.is_none()
    }

    pub(crate) fn set_index(&mut self, index: usize) {
        self.index = index;
    }

    pub(crate) fn deployment_mut(&mut self) -> Result<&mut Deployment> {
        self.deployment
            .as_mut()
            .ok_or(ActionError::ExecutionInputRestoreNoDeployment)
    }

    /// Creates the deployment of a fresh run positioned at the first job and
    /// records that job's input
    pub(crate) async fn initialize<T: Tx>(
        &mut self,
        tx: &T,
        action: &Action<T>,
        input: Option<&Data>,
    ) -> Result<()> {
        let first = action
            .jobs()
            .first()
            .ok_or_else(|| ActionError::EmptyAction(action.name().to_string()))?;

        let created = deployment::create(tx, &self.action, first.name()).await?;
        data::set_job_data(tx, &created, None, DataKind::Input, input).await?;

        self.deployment = Some(created);
        self.index = 0;

        Ok(())
    }

    /// Rebuilds the cursor of a resumed run from its deployment
    pub(crate) fn restore<T: Tx>(&mut self, action: Option<&Action<T>>) -> Result<()> {
        let deployment = self
            .deployment
            .as_ref()
            .ok_or(ActionError::ExecutionInputRestoreNoDeployment)?;
        let action = action.ok_or(ActionError::ExecutionInputRestoreNoAction)?;

        if deployment.action != self.action {
            return Err(ActionError::ExecutionInputRestoreNoAction);
        }

        self.index = action
            .position(&deployment.current_job)
            .ok_or_else(|| ActionError::UnknownJob {
                action: self.action.clone(),
                job: deployment.current_job.clone(),
            })?;

        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::job::Job;
    use crate::payload::NilType;
    use crate::repository::MemoryTx;

    fn action() -> Action<MemoryTx> {
        let jobs = ["set-status", "launch", "wait"]
            .into_iter()
            .map(|name| {
                Job::builder(name, |_ctx, input| async move { Ok(input) })
                    .input::<NilType>()
                    .output::<NilType>()
                    .build()
            })
            .collect();
        Action::new("start", jobs).unwrap()
    }

    #[tokio::test]
    async fn test_initialize_creates_deployment_at_first_job() {
        let tx = MemoryTx::new();
        let mut input = ExecutionInput::new(Some("sim"), "start");
        assert!(input.is_fresh());

        input.initialize(&tx, &action(), None).await.unwrap();

        let deployment = input.deployment().unwrap();
        assert_eq!(deployment.action, "sim.start");
        assert_eq!(deployment.current_job, "set-status");
        assert!(deployment.is_running());
        assert_eq!(input.index(), 0);
        assert_eq!(tx.data_len().await, 1);
    }

    #[tokio::test]
    async fn test_restore_finds_current_job() {
        let tx = MemoryTx::new();
        let mut deployment = tx.create_deployment("start", "set-status").await.unwrap();
        deployment.current_job = "wait".into();

        let mut input = ExecutionInput::from_deployment(deployment);
        input.restore(Some(&action())).unwrap();

        assert_eq!(input.index(), 2);
    }

    #[tokio::test]
    async fn test_restore_unknown_job() {
        let tx = MemoryTx::new();
        let mut deployment = tx.create_deployment("start", "set-status").await.unwrap();
        deployment.current_job = "removed-job".into();

        let mut input = ExecutionInput::from_deployment(deployment);
        let result = input.restore(Some(&action()));
        assert!(matches!(result, Err(ActionError::UnknownJob { job, .. }) if job == "removed-job"));
    }

    #[test]
    fn test_restore_without_deployment() {
        let mut input = ExecutionInput::new(None, "start");
        let result = input.restore(Some(&action()));
        assert!(matches!(result, Err(ActionError::ExecutionInputRestoreNoDeployment)));
    }

    #[tokio::test]
    async fn test_restore_without_action() {
        let tx = MemoryTx::new();
        let deployment = tx.create_deployment("start", "set-status").await.unwrap();

        let mut input = ExecutionInput::from_deployment(deployment);
        let result = input.restore::<MemoryTx>(None);
        assert!(matches!(result, Err(ActionError::ExecutionInputRestoreNoAction)));
    }

    #[tokio::test]
    async fn test_load_missing_deployment() {
        let tx = MemoryTx::new();
        let result = ExecutionInput::load(&tx, Uuid::new_v4()).await;
        assert!(matches!(result, Err(ActionError::ExecutionInputRestoreNoDeployment)));
    }
}
