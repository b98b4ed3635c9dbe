//! Cloudsim Actions
//!
//! Durable workflow engine for the simulation fleet. An [`Action`] is an
//! ordered list of [`Job`]s; each run of an action is a persisted
//! deployment that survives process restarts and compensates its completed
//! jobs in reverse order when one of them fails.
//!
//! This crate contains:
//! - Definitions: jobs, actions and the payload types they exchange
//! - Persistence: deployments, payload snapshots and the error log, behind
//!   the caller-owned [`Tx`] transaction handle
//! - The [`Service`] that registers actions and drives their runs
//!
//! # Example
//!
//! ```no_run
//! use std::sync::Arc;
//! use cloudsim_actions::{
//!     Action, ExecutionInput, Job, NilType, PgTx, Service, Store, TypeRegistry,
//! };
//!
//! # async fn run(pool: sqlx::PgPool) -> anyhow::Result<()> {
//! let service: Service<PgTx> = Service::new(Arc::new(TypeRegistry::new()));
//!
//! let greet = Job::builder("greet", |_ctx, input| async move { Ok(input) })
//!     .input::<NilType>()
//!     .output::<NilType>()
//!     .build();
//! service.register_action(Some("sim"), "greet", Action::new("greet", vec![greet])?)?;
//!
//! let tx = PgTx::begin(&pool).await?;
//! let mut exec = ExecutionInput::new(Some("sim"), "greet");
//! service.execute(&Store::new(), &tx, &mut exec, None).await?;
//! tx.commit().await?;
//! # Ok(())
//! # }
//! ```

pub mod action;
pub mod config;
pub mod data;
pub mod db;
pub mod deployment;
pub mod error;
pub mod execution;
pub mod job;
pub mod jobs;
pub mod payload;
pub mod registry;
pub mod repository;
pub mod service;
pub mod store;

// Re-export commonly used types
pub use action::{Action, action_key};
pub use config::Config;
pub use error::{ActionError, Result, StoreError};
pub use execution::ExecutionInput;
pub use job::{Job, JobBuilder, JobContext};
pub use payload::{Data, NilType, Payload, TypeDescriptor};
pub use registry::TypeRegistry;
pub use repository::{MemoryTx, PgTx, Tx};
pub use service::Service;
pub use store::Store;
