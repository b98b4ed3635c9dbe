//! Actions
//!
//! An [`Action`] is a named, ordered and validated list of jobs: the
//! definition of a workflow. A run of an action is a
//! [`Deployment`](cloudsim_core::domain::deployment::Deployment).

use std::collections::HashSet;

use crate::error::{ActionError, Result};
use crate::job::Job;
use crate::registry::TypeRegistry;
use crate::repository::Tx;

/// Ordered sequence of jobs
pub struct Action<T: Tx> {
    name: String,
    jobs: Vec<Job<T>>,
}

impl<T: Tx> Action<T> {
    /// Builds an action, validating every job.
    ///
    /// Fails when the list is empty, a job is missing a required field, or
    /// two jobs share a name.
    pub fn new(name: impl Into<String>, jobs: Vec<Job<T>>) -> Result<Self> {
        let name = name.into();

        if jobs.is_empty() {
            return Err(ActionError::EmptyAction(name));
        }

        let mut seen = HashSet::new();
        for job in &jobs {
            job.validate()?;
            if !seen.insert(job.name()) {
                return Err(ActionError::DuplicateJob {
                    action: name,
                    job: job.name().to_string(),
                });
            }
        }

        Ok(Self { name, jobs })
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn jobs(&self) -> &[Job<T>] {
        &self.jobs
    }

    pub fn len(&self) -> usize {
        self.jobs.len()
    }

    pub fn is_empty(&self) -> bool {
        self.jobs.is_empty()
    }

    /// Index of the job called `name`
    pub fn position(&self, name: &str) -> Option<usize> {
        self.jobs.iter().position(|job| job.name() == name)
    }

    /// Registers the declared input and output types of every job
    pub fn register_types(&self, registry: &TypeRegistry) -> Result<()> {
        for job in &self.jobs {
            for descriptor in [job.input_type(), job.output_type()].into_iter().flatten() {
                registry.register(descriptor)?;
            }
        }
        Ok(())
    }
}

impl<T: Tx> std::fmt::Debug for Action<T> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Action")
            .field("name", &self.name)
            .field("jobs", &self.jobs)
            .finish()
    }
}

/// Key an action is registered under: the application prefix, if any,
/// joined to the action name with a dot
pub fn action_key(application: Option<&str>, name: &str) -> String {
    match application {
        Some(app) if !app.is_empty() => format!("{}.{}", app, name),
        _ => name.to_string(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::payload::{NilType, Payload};
    use crate::repository::MemoryTx;
    use serde::{Deserialize, Serialize};

    #[derive(Debug, Clone, Serialize, Deserialize)]
    struct GroupId(String);

    impl Payload for GroupId {
        const TYPE_NAME: &'static str = "test.GroupId";
    }

    fn job(name: &str) -> Job<MemoryTx> {
        Job::builder(name, |_ctx, input| async move { Ok(input) })
            .input::<GroupId>()
            .output::<GroupId>()
            .build()
    }

    #[test]
    fn test_new_rejects_empty_action() {
        let result = Action::<MemoryTx>::new("start", vec![]);
        assert!(matches!(result, Err(ActionError::EmptyAction(name)) if name == "start"));
    }

    #[test]
    fn test_new_rejects_invalid_job() {
        let untyped = Job::builder("untyped", |_ctx, input| async move { Ok(input) }).build();
        let result = Action::<MemoryTx>::new("start", vec![job("a"), untyped]);
        assert!(matches!(result, Err(ActionError::InvalidJob { job, .. }) if job == "untyped"));
    }

    #[test]
    fn test_new_rejects_duplicate_job() {
        let result = Action::new("start", vec![job("a"), job("b"), job("a")]);
        assert!(matches!(result, Err(ActionError::DuplicateJob { job, .. }) if job == "a"));
    }

    #[test]
    fn test_position() {
        let action = Action::new("start", vec![job("a"), job("b"), job("c")]).unwrap();
        assert_eq!(action.position("b"), Some(1));
        assert_eq!(action.position("z"), None);
        assert_eq!(action.len(), 3);
    }

    #[test]
    fn test_register_types() {
        let registry = TypeRegistry::new();
        let finish = job("b").extend().output::<NilType>().build();
        let action = Action::new("start", vec![job("a"), finish]).unwrap();

        action.register_types(&registry).unwrap();

        assert!(registry.contains(GroupId::TYPE_NAME));
        assert!(registry.contains(NilType::TYPE_NAME));
    }

    #[test]
    fn test_action_key() {
        assert_eq!(action_key(Some("subt"), "start"), "subt.start");
        assert_eq!(action_key(Some(""), "start"), "start");
        assert_eq!(action_key(None, "start"), "start");
    }
}
