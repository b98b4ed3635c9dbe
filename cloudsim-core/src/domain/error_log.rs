//! Deployment error log

use serde::{Deserialize, Serialize};

/// A single recorded error of a deployment. Rows are append-only.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DeploymentError {
    pub id: i64,
    pub deployment_id: i64,
    /// Job that produced the error, if it happened inside one
    pub job: Option<String>,
    pub error: String,
    pub created_at: chrono::DateTime<chrono::Utc>,
}
