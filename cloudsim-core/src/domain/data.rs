//! Deployment payload snapshots

use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

/// What a persisted payload row represents for its job
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum DataKind {
    /// The input the job was (or is about to be) run with
    Input,
    /// Auxiliary context a job stashed for later compensation
    JobData,
}

impl DataKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            DataKind::Input => "input",
            DataKind::JobData => "job",
        }
    }
}

impl fmt::Display for DataKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for DataKind {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "input" => Ok(DataKind::Input),
            "job" => Ok(DataKind::JobData),
            other => Err(format!("unknown deployment data kind: {}", other)),
        }
    }
}

/// One payload snapshot, unique per (deployment, job, kind).
///
/// `data` is `None` when the job explicitly stored no payload, which is
/// different from the row not existing at all.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DeploymentData {
    pub deployment_id: i64,
    pub job: String,
    pub kind: DataKind,
    /// Registry name of the payload type
    pub data_type: String,
    /// JSON-encoded payload
    pub data: Option<String>,
    pub created_at: chrono::DateTime<chrono::Utc>,
    pub updated_at: chrono::DateTime<chrono::Utc>,
}
