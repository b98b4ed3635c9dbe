//! Action Service
//!
//! Registers actions under namespaced keys and drives their runs: the
//! forward loop over jobs, and the backward compensation loop when a job
//! fails or panics.

use futures::FutureExt;
use std::any::Any;
use std::collections::HashMap;
use std::panic::AssertUnwindSafe;
use std::sync::{Arc, PoisonError, RwLock};

use cloudsim_core::domain::data::DataKind;
use cloudsim_core::domain::deployment::{Deployment, DeploymentStatus};

use crate::action::{Action, action_key};
use crate::data;
use crate::deployment;
use crate::error::{ActionError, Result};
use crate::execution::ExecutionInput;
use crate::job::JobContext;
use crate::payload::Data;
use crate::registry::TypeRegistry;
use crate::repository::Tx;
use crate::store::Store;

/// Orchestrator for registered actions
pub struct Service<T: Tx> {
    registry: Arc<TypeRegistry>,
    actions: RwLock<HashMap<String, Arc<Action<T>>>>,
}

impl<T: Tx> Service<T> {
    pub fn new(registry: Arc<TypeRegistry>) -> Self {
        Self {
            registry,
            actions: RwLock::new(HashMap::new()),
        }
    }

    pub fn registry(&self) -> &Arc<TypeRegistry> {
        &self.registry
    }

    /// Registers `action` under `application.name` (or `name` alone).
    ///
    /// The payload types of every job are registered along with it, so all
    /// snapshots the action writes can be decoded later.
    pub fn register_action(
        &self,
        application: Option<&str>,
        name: &str,
        action: Action<T>,
    ) -> Result<()> {
        if name.trim().is_empty() {
            return Err(ActionError::ActionIsNil);
        }

        let key = action_key(application, name);
        let mut actions = self.actions.write().unwrap_or_else(PoisonError::into_inner);

        if actions.contains_key(&key) {
            return Err(ActionError::ActionExists(key));
        }

        action.register_types(&self.registry)?;

        tracing::info!("Registered action '{}' ({} jobs)", key, action.len());
        actions.insert(key, Arc::new(action));

        Ok(())
    }

    /// Looks up a registered action by key
    pub fn action(&self, key: &str) -> Option<Arc<Action<T>>> {
        self.actions
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .get(key)
            .cloned()
    }

    /// Keys of all registered actions, sorted
    pub fn action_keys(&self) -> Vec<String> {
        let mut keys: Vec<_> = self
            .actions
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .keys()
            .cloned()
            .collect();
        keys.sort();
        keys
    }

    /// Runs (or resumes) the action of `exec` inside the caller's transaction.
    ///
    /// A fresh run starts at the first job with `job_input`. A resumed run
    /// ignores `job_input` and continues from the persisted cursor with the
    /// persisted input snapshot. Any job error or panic puts the deployment
    /// into `Rollback` and compensates the jobs from the failing one back to
    /// the first; the job error is returned once compensation completes.
    /// Re-entering a `Rollback` deployment resumes an interrupted
    /// compensation, or only returns the recorded reason when compensation
    /// already completed. A `Finished` deployment is left untouched.
    pub async fn execute(
        &self,
        store: &Store,
        tx: &T,
        exec: &mut ExecutionInput,
        job_input: Option<Data>,
    ) -> Result<()> {
        let action = self
            .action(exec.action())
            .ok_or_else(|| ActionError::ActionNotFound(exec.action().to_string()))?;

        let input = match self.prepare(tx, &action, exec, job_input).await {
            Ok(input) => input,
            Err(err) => {
                if let Some(deployment) = exec.deployment() {
                    record_error(tx, deployment, None, &err).await;
                }
                return Err(err);
            }
        };

        let deployment = exec.deployment_mut()?;
        let status = deployment.status;
        match status {
            DeploymentStatus::Finished => {
                tracing::info!("Deployment {} already finished", deployment.uuid);
                Ok(())
            }
            DeploymentStatus::Rollback => {
                let reason = deployment.rollback_error.clone().unwrap_or_default();
                if deployment::is_compensated(tx, deployment).await? {
                    tracing::info!("Deployment {} already compensated", deployment.uuid);
                    return Err(ActionError::Recovered(reason));
                }

                tracing::info!(
                    "Resuming rollback of deployment {} at job '{}'",
                    deployment.uuid,
                    deployment.current_job
                );

                let cause = Arc::new(ActionError::Recovered(reason));
                self.rollback(store, tx, &action, exec, cause.clone()).await?;
                Err(unwrap_cause(cause))
            }
            DeploymentStatus::Running => {
                tracing::info!(
                    "Executing deployment {} of '{}' from job '{}'",
                    deployment.uuid,
                    deployment.action,
                    deployment.current_job
                );

                let outcome = AssertUnwindSafe(self.run_forward(store, tx, &action, exec, input))
                    .catch_unwind()
                    .await
                    .unwrap_or_else(|panic| {
                        Err(ActionError::Panic {
                            job: action.jobs()[exec.index()].name().to_string(),
                            message: panic_message(&*panic),
                        })
                    });

                self.finalize(store, tx, &action, exec, outcome).await
            }
        }
    }

    /// Creates or restores the deployment of `exec` and returns the input of
    /// the job the run is at
    async fn prepare(
        &self,
        tx: &T,
        action: &Action<T>,
        exec: &mut ExecutionInput,
        job_input: Option<Data>,
    ) -> Result<Option<Data>> {
        if exec.is_fresh() {
            exec.initialize(tx, action, job_input.as_ref()).await?;
            let deployment = exec.deployment_mut()?;
            tx.lock_deployment(deployment.uuid).await?;
            return Ok(job_input);
        }

        exec.restore(Some(action))?;

        // Another run may have moved the record while we waited for the lock
        let uuid = exec.deployment_mut()?.uuid;
        tx.lock_deployment(uuid).await?;
        let current = tx
            .find_deployment(uuid)
            .await?
            .ok_or(ActionError::ExecutionInputRestoreNoDeployment)?;
        *exec.deployment_mut()? = current;
        exec.restore(Some(action))?;

        let deployment = exec.deployment_mut()?;
        if !deployment.is_running() {
            return Ok(None);
        }

        if job_input.is_some() {
            tracing::debug!(
                "Ignoring caller input for resumed deployment {}",
                deployment.uuid
            );
        }

        data::get_optional(tx, &self.registry, deployment, None, DataKind::Input).await
    }

    async fn run_forward(
        &self,
        store: &Store,
        tx: &T,
        action: &Action<T>,
        exec: &mut ExecutionInput,
        mut input: Option<Data>,
    ) -> Result<()> {
        for (index, job) in action.jobs().iter().enumerate().skip(exec.index()) {
            exec.set_index(index);

            let deployment = exec.deployment_mut()?;
            deployment::set_job(tx, deployment, job.name(), input.as_ref()).await?;

            tracing::debug!(
                "Running job '{}' ({}/{}) of deployment {}",
                job.name(),
                index + 1,
                action.len(),
                deployment.uuid
            );

            let ctx = JobContext::new(
                tx.clone(),
                store.clone(),
                deployment.clone(),
                self.registry.clone(),
            );
            input = job.run(ctx, input).await?;
        }

        Ok(())
    }

    /// Settles the outcome of the forward loop: `Finished` on success,
    /// otherwise `Rollback` followed by compensation
    async fn finalize(
        &self,
        store: &Store,
        tx: &T,
        action: &Action<T>,
        exec: &mut ExecutionInput,
        outcome: Result<()>,
    ) -> Result<()> {
        let deployment = exec.deployment_mut()?;

        let err = match outcome {
            Ok(()) => return deployment::set_finished_status(tx, deployment).await,
            Err(err) => err,
        };

        let job = err
            .job_name()
            .map(str::to_string)
            .unwrap_or_else(|| deployment.current_job.clone());
        record_error(tx, deployment, Some(&job), &err).await;

        // The transaction may be unusable after the job's own failure; the job
        // error still wins over a failed status write
        let reason = err.to_string();
        if let Err(e) = deployment::set_rollback_status(tx, deployment, Some(&reason)).await {
            tracing::error!(
                "Failed to mark deployment {} for rollback: {}",
                deployment.uuid,
                e
            );
            return Err(err);
        }

        let cause = Arc::new(err);
        self.rollback(store, tx, action, exec, cause.clone()).await?;

        Err(unwrap_cause(cause))
    }

    /// Walks the jobs backward from the cursor to the first job, invoking
    /// each rollback handler. The first handler error stops the walk.
    async fn rollback(
        &self,
        store: &Store,
        tx: &T,
        action: &Action<T>,
        exec: &mut ExecutionInput,
        cause: Arc<ActionError>,
    ) -> Result<()> {
        let start = exec.index().min(action.len().saturating_sub(1));

        for index in (0..=start).rev() {
            let job = &action.jobs()[index];
            exec.set_index(index);

            let deployment = exec.deployment_mut()?;
            deployment::move_to_job(tx, deployment, job.name()).await?;

            let Some(handler) = job.rollback_handler() else {
                continue;
            };

            let input = match data::get_optional(
                tx,
                &self.registry,
                deployment,
                None,
                DataKind::Input,
            )
            .await
            {
                Ok(input) => input,
                Err(ActionError::DataNotFound { .. }) => None,
                Err(err) => {
                    let err = ActionError::rollback(job.name(), err.into());
                    record_error(tx, deployment, Some(job.name()), &err).await;
                    return Err(err);
                }
            };

            let ctx = JobContext::new(
                tx.clone(),
                store.clone(),
                deployment.clone(),
                self.registry.clone(),
            );

            let outcome = AssertUnwindSafe(handler(ctx, input, cause.clone()))
                .catch_unwind()
                .await
                .unwrap_or_else(|panic| {
                    Err(anyhow::anyhow!("panicked: {}", panic_message(&*panic)))
                });

            if let Err(source) = outcome {
                let err = ActionError::rollback(job.name(), source);
                record_error(tx, deployment, Some(job.name()), &err).await;
                return Err(err);
            }

            tracing::info!(
                "Compensated job '{}' of deployment {}",
                job.name(),
                deployment.uuid
            );
        }

        if let Some(deployment) = exec.deployment() {
            if let Err(e) = deployment::set_compensated(tx, deployment).await {
                tracing::error!(
                    "Failed to mark deployment {} compensated: {}",
                    deployment.uuid,
                    e
                );
            }
        }

        Ok(())
    }
}

/// Appends an error row. A failure to record is logged, never returned, so
/// it cannot mask the error being recorded.
async fn record_error<T: Tx>(
    tx: &T,
    deployment: &Deployment,
    job: Option<&str>,
    err: &ActionError,
) {
    if let Err(e) = deployment::log_error(tx, deployment, job, err).await {
        tracing::error!(
            "Failed to record error for deployment {}: {}",
            deployment.uuid,
            e
        );
    }
}

/// Takes the cause back once no handler holds it anymore
fn unwrap_cause(cause: Arc<ActionError>) -> ActionError {
    Arc::try_unwrap(cause).unwrap_or_else(|shared| ActionError::Recovered(shared.to_string()))
}

fn panic_message(payload: &(dyn Any + Send)) -> String {
    if let Some(message) = payload.downcast_ref::<&str>() {
        message.to_string()
    } else if let Some(message) = payload.downcast_ref::<String>() {
        message.clone()
    } else {
        "unknown panic".to_string()
    }
}
