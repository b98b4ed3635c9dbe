//! Error types for the action engine

use thiserror::Error;

/// Result type alias for engine operations
pub type Result<T> = std::result::Result<T, ActionError>;

/// Errors raised by the persistence backends
#[derive(Debug, Error)]
pub enum StoreError {
    /// Database query failed
    #[error("database error: {0}")]
    Database(#[from] sqlx::Error),

    /// The transaction was already committed or rolled back
    #[error("transaction is no longer open")]
    TransactionClosed,

    /// A row that must exist was not found
    #[error("record not found: {0}")]
    NotFound(String),

    /// A persisted value could not be mapped back into a domain record
    #[error("corrupt record: {0}")]
    Corrupt(String),
}

/// Errors that can occur when defining or running actions
#[derive(Debug, Error)]
pub enum ActionError {
    /// Job definition is missing a required field
    #[error("invalid job '{job}': {reason}")]
    InvalidJob { job: String, reason: String },

    /// Action has no jobs
    #[error("action '{0}' has no jobs")]
    EmptyAction(String),

    /// Two jobs in one action share a name
    #[error("action '{action}' contains job '{job}' more than once")]
    DuplicateJob { action: String, job: String },

    /// Action registered without a name
    #[error("action is nil")]
    ActionIsNil,

    /// Action already registered under the same key
    #[error("action already exists: {0}")]
    ActionExists(String),

    /// No action registered under the key
    #[error("action not found: {0}")]
    ActionNotFound(String),

    /// Restoring an execution input that has no deployment
    #[error("cannot restore execution input: deployment not found")]
    ExecutionInputRestoreNoDeployment,

    /// Restoring an execution input whose action does not match
    #[error("cannot restore execution input: action not found")]
    ExecutionInputRestoreNoAction,

    /// The persisted current job is not part of the action
    #[error("job '{job}' is not part of action '{action}'")]
    UnknownJob { action: String, job: String },

    /// A job returned no output for a non-empty input
    #[error("job '{0}' returned a nil output for a non-nil input")]
    JobNilOutput(String),

    /// A payload type name was never registered
    #[error("type not found: {0}")]
    TypeNotFound(String),

    /// Two different types were registered under the same name
    #[error("type name '{0}' is already registered for a different type")]
    TypeConflict(String),

    /// A payload held a different type than the one requested
    #[error("payload type mismatch: expected {expected}, found {found}")]
    PayloadMismatch {
        expected: &'static str,
        found: &'static str,
    },

    /// The persisted row explicitly holds no payload
    #[error("no data")]
    NoData,

    /// No payload row was ever recorded
    #[error("no {kind} data recorded for job '{job}'")]
    DataNotFound { job: String, kind: String },

    /// Rollback status requires a reason
    #[error("rollback error cannot be empty")]
    RollbackErrIsNil,

    /// A pre-hook, execute function or post-hook failed
    #[error("job '{job}' failed: {source}")]
    Job {
        job: String,
        #[source]
        source: anyhow::Error,
    },

    /// A job panicked while running
    #[error("job '{job}' panicked: {message}")]
    Panic { job: String, message: String },

    /// A rollback handler failed
    #[error("rollback: {source}")]
    Rollback {
        job: String,
        #[source]
        source: anyhow::Error,
    },

    /// Cause of a rollback resumed from the persisted deployment
    #[error("{0}")]
    Recovered(String),

    /// Payload (de)serialization failed
    #[error("payload encoding error: {0}")]
    Encoding(#[from] serde_json::Error),

    /// Persistence failed
    #[error(transparent)]
    Store(#[from] StoreError),
}

impl ActionError {
    /// Wrap an error returned by a step function
    pub fn job(job: impl Into<String>, source: anyhow::Error) -> Self {
        Self::Job {
            job: job.into(),
            source,
        }
    }

    /// Wrap an error returned by a rollback handler
    pub fn rollback(job: impl Into<String>, source: anyhow::Error) -> Self {
        Self::Rollback {
            job: job.into(),
            source,
        }
    }

    /// Name of the job the error happened in, when known
    pub fn job_name(&self) -> Option<&str> {
        match self {
            Self::Job { job, .. }
            | Self::Panic { job, .. }
            | Self::Rollback { job, .. }
            | Self::JobNilOutput(job) => Some(job),
            _ => None,
        }
    }

    /// Errors that mean persisted state and running code disagree.
    ///
    /// Retrying these cannot succeed without a deploy or manual repair.
    pub fn is_fatal(&self) -> bool {
        matches!(
            self,
            Self::ExecutionInputRestoreNoDeployment
                | Self::ExecutionInputRestoreNoAction
                | Self::UnknownJob { .. }
                | Self::TypeNotFound(_)
                | Self::TypeConflict(_)
                | Self::JobNilOutput(_)
        )
    }
}
