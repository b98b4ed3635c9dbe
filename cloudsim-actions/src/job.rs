//! Jobs
//!
//! A [`Job`] is one atomic step of an action: an ordered list of pre-hooks,
//! exactly one execute function, an ordered list of post-hooks and an
//! optional rollback handler. Values flow through the chain as
//! `Option<Data>`; each function receives the previous one's output.
//!
//! Jobs are assembled with [`JobBuilder`]. A small set of generic jobs can
//! be specialized for a domain with [`Job::extend`], which keeps the base
//! job's execute function and lets the caller rename the job and replace
//! everything around it. Hooks given to an extending builder replace the
//! base's hooks rather than adding to them.

use futures::future::BoxFuture;
use std::future::Future;
use std::sync::Arc;

use cloudsim_core::domain::data::DataKind;
use cloudsim_core::domain::deployment::Deployment;

use crate::data;
use crate::error::{ActionError, Result};
use crate::payload::{Data, Payload, TypeDescriptor};
use crate::registry::TypeRegistry;
use crate::repository::Tx;
use crate::store::Store;

/// Pre-hook, execute function or post-hook
pub type StepFn<T> = Arc<
    dyn Fn(JobContext<T>, Option<Data>) -> BoxFuture<'static, anyhow::Result<Option<Data>>>
        + Send
        + Sync,
>;

/// Compensation function. Receives the job's persisted input and the error
/// that triggered the rollback.
pub type RollbackFn<T> = Arc<
    dyn Fn(JobContext<T>, Option<Data>, Arc<ActionError>) -> BoxFuture<'static, anyhow::Result<()>>
        + Send
        + Sync,
>;

/// Everything a hook can reach while a job runs
#[derive(Clone)]
pub struct JobContext<T: Tx> {
    /// Transaction shared with the engine's bookkeeping
    pub tx: T,
    /// Run-scoped side-channel
    pub store: Store,
    deployment: Deployment,
    registry: Arc<TypeRegistry>,
}

impl<T: Tx> JobContext<T> {
    pub(crate) fn new(
        tx: T,
        store: Store,
        deployment: Deployment,
        registry: Arc<TypeRegistry>,
    ) -> Self {
        Self {
            tx,
            store,
            deployment,
            registry,
        }
    }

    /// Snapshot of the deployment taken when the job started
    pub fn deployment(&self) -> &Deployment {
        &self.deployment
    }

    /// Name of the job currently running
    pub fn job(&self) -> &str {
        &self.deployment.current_job
    }

    pub fn registry(&self) -> &TypeRegistry {
        &self.registry
    }

    /// Stashes auxiliary data for the current job, e.g. the identifiers of
    /// resources a rollback handler will need to remove
    pub async fn set_job_data<P: Payload>(&self, value: P) -> Result<()> {
        data::set_job_data(
            &self.tx,
            &self.deployment,
            None,
            DataKind::JobData,
            Some(&Data::new(value)),
        )
        .await
    }

    /// Reads back the auxiliary data of `job`, or of the current job when `None`
    pub async fn get_job_data<P: Payload + Clone>(&self, job: Option<&str>) -> Result<P> {
        data::get_job_data(&self.tx, &self.registry, &self.deployment, job, DataKind::JobData)
            .await?
            .get::<P>()
    }
}

/// One atomic workflow step
pub struct Job<T: Tx> {
    name: String,
    pre_hooks: Vec<StepFn<T>>,
    execute: StepFn<T>,
    post_hooks: Vec<StepFn<T>>,
    rollback: Option<RollbackFn<T>>,
    input_type: Option<TypeDescriptor>,
    output_type: Option<TypeDescriptor>,
}

impl<T: Tx> Clone for Job<T> {
    fn clone(&self) -> Self {
        Self {
            name: self.name.clone(),
            pre_hooks: self.pre_hooks.clone(),
            execute: self.execute.clone(),
            post_hooks: self.post_hooks.clone(),
            rollback: self.rollback.clone(),
            input_type: self.input_type,
            output_type: self.output_type,
        }
    }
}

impl<T: Tx> std::fmt::Debug for Job<T> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Job")
            .field("name", &self.name)
            .field("pre_hooks", &self.pre_hooks.len())
            .field("post_hooks", &self.post_hooks.len())
            .field("rollback", &self.rollback.is_some())
            .field("input_type", &self.input_type)
            .field("output_type", &self.output_type)
            .finish()
    }
}

impl<T: Tx> Job<T> {
    /// Starts a job definition around its execute function
    pub fn builder<F, Fut>(name: impl Into<String>, execute: F) -> JobBuilder<T>
    where
        F: Fn(JobContext<T>, Option<Data>) -> Fut + Send + Sync + 'static,
        Fut: Future<Output = anyhow::Result<Option<Data>>> + Send + 'static,
    {
        JobBuilder {
            name: name.into(),
            pre_hooks: Vec::new(),
            execute: step_fn(execute),
            post_hooks: Vec::new(),
            rollback: None,
            input_type: None,
            output_type: None,
            pre_hooks_inherited: false,
            post_hooks_inherited: false,
        }
    }

    /// Starts a specialization of this job.
    ///
    /// The result keeps this job's name and execute function; every setter on
    /// the returned builder overrides the corresponding field. The first
    /// pre-hook (or post-hook) added replaces the inherited list, later ones
    /// append to it. `self` is left untouched.
    pub fn extend(&self) -> JobBuilder<T> {
        JobBuilder {
            name: self.name.clone(),
            pre_hooks: self.pre_hooks.clone(),
            execute: self.execute.clone(),
            post_hooks: self.post_hooks.clone(),
            rollback: self.rollback.clone(),
            input_type: self.input_type,
            output_type: self.output_type,
            pre_hooks_inherited: true,
            post_hooks_inherited: true,
        }
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn input_type(&self) -> Option<TypeDescriptor> {
        self.input_type
    }

    pub fn output_type(&self) -> Option<TypeDescriptor> {
        self.output_type
    }

    pub fn has_rollback(&self) -> bool {
        self.rollback.is_some()
    }

    pub(crate) fn rollback_handler(&self) -> Option<&RollbackFn<T>> {
        self.rollback.as_ref()
    }

    /// Checks the fields every job must declare
    pub fn validate(&self) -> Result<()> {
        if self.name.trim().is_empty() {
            return Err(ActionError::InvalidJob {
                job: self.name.clone(),
                reason: "name is empty".to_string(),
            });
        }
        if self.name.starts_with('@') {
            return Err(ActionError::InvalidJob {
                job: self.name.clone(),
                reason: "names starting with '@' are reserved".to_string(),
            });
        }
        if self.input_type.is_none() {
            return Err(ActionError::InvalidJob {
                job: self.name.clone(),
                reason: "input type is not declared".to_string(),
            });
        }
        if self.output_type.is_none() {
            return Err(ActionError::InvalidJob {
                job: self.name.clone(),
                reason: "output type is not declared".to_string(),
            });
        }
        Ok(())
    }

    /// Runs pre-hooks, execute and post-hooks in order.
    ///
    /// The first error stops the chain. A job that was given an input must
    /// produce an output; `None` after a `Some` input is reported as
    /// [`ActionError::JobNilOutput`].
    pub async fn run(&self, ctx: JobContext<T>, input: Option<Data>) -> Result<Option<Data>> {
        let had_input = input.is_some();
        let mut value = input;

        for hook in &self.pre_hooks {
            value = hook(ctx.clone(), value)
                .await
                .map_err(|e| ActionError::job(&self.name, e))?;
        }

        value = (self.execute)(ctx.clone(), value)
            .await
            .map_err(|e| ActionError::job(&self.name, e))?;

        for hook in &self.post_hooks {
            value = hook(ctx.clone(), value)
                .await
                .map_err(|e| ActionError::job(&self.name, e))?;
        }

        if had_input && value.is_none() {
            return Err(ActionError::JobNilOutput(self.name.clone()));
        }

        Ok(value)
    }
}

/// Builder for [`Job`].
///
/// There is no way to replace the execute function once a builder exists.
pub struct JobBuilder<T: Tx> {
    name: String,
    pre_hooks: Vec<StepFn<T>>,
    execute: StepFn<T>,
    post_hooks: Vec<StepFn<T>>,
    rollback: Option<RollbackFn<T>>,
    input_type: Option<TypeDescriptor>,
    output_type: Option<TypeDescriptor>,
    // Set while the hook lists still hold the base job's hooks
    pre_hooks_inherited: bool,
    post_hooks_inherited: bool,
}

impl<T: Tx> JobBuilder<T> {
    /// Renames the job. An empty name keeps the current one.
    pub fn name(mut self, name: impl Into<String>) -> Self {
        let name = name.into();
        if !name.is_empty() {
            self.name = name;
        }
        self
    }

    /// Adds a pre-hook. On a builder from [`Job::extend`] the first call
    /// replaces the base job's pre-hooks.
    pub fn pre_hook<F, Fut>(mut self, hook: F) -> Self
    where
        F: Fn(JobContext<T>, Option<Data>) -> Fut + Send + Sync + 'static,
        Fut: Future<Output = anyhow::Result<Option<Data>>> + Send + 'static,
    {
        if std::mem::take(&mut self.pre_hooks_inherited) {
            self.pre_hooks.clear();
        }
        self.pre_hooks.push(step_fn(hook));
        self
    }

    /// Drops all pre-hooks, inherited ones included
    pub fn clear_pre_hooks(mut self) -> Self {
        self.pre_hooks.clear();
        self.pre_hooks_inherited = false;
        self
    }

    /// Adds a post-hook. On a builder from [`Job::extend`] the first call
    /// replaces the base job's post-hooks.
    pub fn post_hook<F, Fut>(mut self, hook: F) -> Self
    where
        F: Fn(JobContext<T>, Option<Data>) -> Fut + Send + Sync + 'static,
        Fut: Future<Output = anyhow::Result<Option<Data>>> + Send + 'static,
    {
        if std::mem::take(&mut self.post_hooks_inherited) {
            self.post_hooks.clear();
        }
        self.post_hooks.push(step_fn(hook));
        self
    }

    /// Drops all post-hooks, inherited ones included
    pub fn clear_post_hooks(mut self) -> Self {
        self.post_hooks.clear();
        self.post_hooks_inherited = false;
        self
    }

    /// Sets (or replaces) the rollback handler
    pub fn rollback<F, Fut>(mut self, handler: F) -> Self
    where
        F: Fn(JobContext<T>, Option<Data>, Arc<ActionError>) -> Fut + Send + Sync + 'static,
        Fut: Future<Output = anyhow::Result<()>> + Send + 'static,
    {
        let handler: RollbackFn<T> = Arc::new(
            move |ctx: JobContext<T>,
                  input: Option<Data>,
                  cause: Arc<ActionError>|
                  -> BoxFuture<'static, anyhow::Result<()>> {
                Box::pin(handler(ctx, input, cause))
            },
        );
        self.rollback = Some(handler);
        self
    }

    pub fn input<P: Payload>(mut self) -> Self {
        self.input_type = Some(TypeDescriptor::of::<P>());
        self
    }

    pub fn output<P: Payload>(mut self) -> Self {
        self.output_type = Some(TypeDescriptor::of::<P>());
        self
    }

    pub fn input_type(mut self, descriptor: TypeDescriptor) -> Self {
        self.input_type = Some(descriptor);
        self
    }

    pub fn output_type(mut self, descriptor: TypeDescriptor) -> Self {
        self.output_type = Some(descriptor);
        self
    }

    pub fn build(self) -> Job<T> {
        Job {
            name: self.name,
            pre_hooks: self.pre_hooks,
            execute: self.execute,
            post_hooks: self.post_hooks,
            rollback: self.rollback,
            input_type: self.input_type,
            output_type: self.output_type,
        }
    }
}

fn step_fn<T, F, Fut>(f: F) -> StepFn<T>
where
    T: Tx,
    F: Fn(JobContext<T>, Option<Data>) -> Fut + Send + Sync + 'static,
    Fut: Future<Output = anyhow::Result<Option<Data>>> + Send + 'static,
{
    Arc::new(
        move |ctx: JobContext<T>,
              input: Option<Data>|
              -> BoxFuture<'static, anyhow::Result<Option<Data>>> {
            Box::pin(f(ctx, input))
        },
    )
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::payload::NilType;
    use crate::repository::MemoryTx;
    use serde::{Deserialize, Serialize};
    use std::sync::Mutex;

    #[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
    struct Counter(u32);

    impl Payload for Counter {
        const TYPE_NAME: &'static str = "test.Counter";
    }

    async fn context(tx: &MemoryTx) -> JobContext<MemoryTx> {
        let deployment = tx.create_deployment("test", "job").await.unwrap();
        JobContext::new(tx.clone(), Store::new(), deployment, Arc::new(TypeRegistry::new()))
    }

    fn increment() -> Job<MemoryTx> {
        Job::builder("increment", |_ctx, input: Option<Data>| async move {
            let n = input.map(|d| d.get::<Counter>()).transpose()?.map_or(0, |c| c.0);
            Ok::<_, anyhow::Error>(Some(Data::new(Counter(n + 1))))
        })
        .input::<Counter>()
        .output::<Counter>()
        .build()
    }

    #[tokio::test]
    async fn test_run_chains_hooks_in_order() {
        let tx = MemoryTx::new();
        let trace = Arc::new(Mutex::new(Vec::new()));

        let (pre, post) = (trace.clone(), trace.clone());
        let job = increment()
            .extend()
            .pre_hook(move |_ctx, input| {
                pre.lock().unwrap().push("pre");
                let input = input.map(|d| d.get::<Counter>()).transpose();
                async move { Ok::<_, anyhow::Error>(input?.map(|c| Data::new(Counter(c.0 * 10)))) }
            })
            .post_hook(move |_ctx, output| {
                post.lock().unwrap().push("post");
                async move { Ok(output) }
            })
            .build();

        let output = job
            .run(context(&tx).await, Some(Data::new(Counter(2))))
            .await
            .unwrap();

        assert_eq!(output.unwrap().get::<Counter>().unwrap(), Counter(21));
        assert_eq!(*trace.lock().unwrap(), vec!["pre", "post"]);
    }

    #[tokio::test]
    async fn test_pre_hook_error_short_circuits() {
        let tx = MemoryTx::new();
        let executed = Arc::new(Mutex::new(false));
        let flag = executed.clone();

        let job = Job::builder("launch", move |_ctx, input| {
            *flag.lock().unwrap() = true;
            async move { Ok(input) }
        })
        .pre_hook(|_ctx, _input| async { Err(anyhow::anyhow!("quota exceeded")) })
        .pre_hook(|_ctx, _input| async { panic!("second pre-hook must not run") })
        .input_type(TypeDescriptor::nil())
        .output_type(TypeDescriptor::nil())
        .build();

        let err = job.run(context(&tx).await, None).await.unwrap_err();

        assert!(matches!(&err, ActionError::Job { job, .. } if job == "launch"));
        assert_eq!(err.to_string(), "job 'launch' failed: quota exceeded");
        assert!(!*executed.lock().unwrap());
    }

    #[tokio::test]
    async fn test_nil_output_after_input_is_rejected() {
        let tx = MemoryTx::new();
        let job: Job<MemoryTx> = Job::builder("drop", |_ctx, _input| async { Ok(None) })
            .input::<Counter>()
            .output::<NilType>()
            .build();

        let err = job
            .run(context(&tx).await, Some(Data::new(Counter(1))))
            .await
            .unwrap_err();
        assert!(matches!(err, ActionError::JobNilOutput(name) if name == "drop"));
    }

    #[tokio::test]
    async fn test_nil_output_after_nil_input_is_accepted() {
        let tx = MemoryTx::new();
        let job: Job<MemoryTx> = Job::builder("noop", |_ctx, _input| async { Ok(None) })
            .input::<NilType>()
            .output::<NilType>()
            .build();

        let output = job.run(context(&tx).await, None).await.unwrap();
        assert!(output.is_none());
    }

    #[test]
    fn test_extend_keeps_execute_and_base() {
        let base = increment()
            .extend()
            .rollback(|_ctx, _input, _cause| async { Ok(()) })
            .build();

        let extended = base
            .extend()
            .name("increment-twice")
            .output::<NilType>()
            .build();

        assert!(Arc::ptr_eq(&extended.execute, &base.execute));
        assert_eq!(extended.name(), "increment-twice");
        assert!(extended.has_rollback());
        assert_eq!(extended.input_type(), Some(TypeDescriptor::of::<Counter>()));
        assert_eq!(extended.output_type(), Some(TypeDescriptor::nil()));

        assert_eq!(base.name(), "increment");
        assert_eq!(base.output_type(), Some(TypeDescriptor::of::<Counter>()));
    }

    #[test]
    fn test_extend_with_empty_name_keeps_base_name() {
        let extended = increment().extend().name("").build();
        assert_eq!(extended.name(), "increment");
    }

    fn traced(trace: &Arc<Mutex<Vec<&'static str>>>, label: &'static str) -> Job<MemoryTx> {
        let (pre, post) = (trace.clone(), trace.clone());
        Job::builder("scale", |_ctx, input| async move { Ok(input) })
            .pre_hook(move |_ctx, input| {
                pre.lock().unwrap().push(label);
                async move { Ok(input) }
            })
            .post_hook(move |_ctx, input| {
                post.lock().unwrap().push(label);
                async move { Ok(input) }
            })
            .input::<NilType>()
            .output::<NilType>()
            .build()
    }

    #[tokio::test]
    async fn test_extend_hooks_replace_base_hooks() {
        let tx = MemoryTx::new();
        let trace = Arc::new(Mutex::new(Vec::new()));
        let base = traced(&trace, "base");

        let (first, second, post) = (trace.clone(), trace.clone(), trace.clone());
        let extended = base
            .extend()
            .pre_hook(move |_ctx, input| {
                first.lock().unwrap().push("override-1");
                async move { Ok(input) }
            })
            .pre_hook(move |_ctx, input| {
                second.lock().unwrap().push("override-2");
                async move { Ok(input) }
            })
            .post_hook(move |_ctx, input| {
                post.lock().unwrap().push("override-post");
                async move { Ok(input) }
            })
            .build();

        assert_eq!(extended.pre_hooks.len(), 2);
        assert_eq!(extended.post_hooks.len(), 1);
        assert_eq!(base.pre_hooks.len(), 1);

        extended.run(context(&tx).await, None).await.unwrap();
        assert_eq!(
            *trace.lock().unwrap(),
            vec!["override-1", "override-2", "override-post"]
        );
    }

    #[tokio::test]
    async fn test_extend_without_hooks_keeps_base_hooks() {
        let tx = MemoryTx::new();
        let trace = Arc::new(Mutex::new(Vec::new()));
        let extended = traced(&trace, "base").extend().name("scale-gzserver").build();

        extended.run(context(&tx).await, None).await.unwrap();
        assert_eq!(*trace.lock().unwrap(), vec!["base", "base"]);
    }

    #[test]
    fn test_extend_clear_drops_base_hooks() {
        let trace = Arc::new(Mutex::new(Vec::new()));
        let extended = traced(&trace, "base")
            .extend()
            .clear_pre_hooks()
            .clear_post_hooks()
            .build();

        assert!(extended.pre_hooks.is_empty());
        assert!(extended.post_hooks.is_empty());
    }

    #[test]
    fn test_validate_requires_types() {
        let job: Job<MemoryTx> =
            Job::builder("untyped", |_ctx, input| async move { Ok(input) }).build();
        assert!(matches!(
            job.validate(),
            Err(ActionError::InvalidJob { reason, .. }) if reason.contains("input")
        ));

        let job = job.extend().input::<NilType>().build();
        assert!(matches!(
            job.validate(),
            Err(ActionError::InvalidJob { reason, .. }) if reason.contains("output")
        ));

        let job = job.extend().output::<NilType>().build();
        assert!(job.validate().is_ok());
    }

    #[test]
    fn test_validate_requires_name() {
        let job: Job<MemoryTx> = Job::builder(" ", |_ctx, input| async move { Ok(input) })
            .input::<NilType>()
            .output::<NilType>()
            .build();
        assert!(matches!(job.validate(), Err(ActionError::InvalidJob { .. })));

        let job = job.extend().name("@compensated").build();
        assert!(matches!(
            job.validate(),
            Err(ActionError::InvalidJob { reason, .. }) if reason.contains("reserved")
        ));
    }
}
