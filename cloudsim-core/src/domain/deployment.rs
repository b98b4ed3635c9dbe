//! Deployment domain types

use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;
use uuid::Uuid;

/// Persistent record of a single action run.
///
/// Created once when a run starts and never deleted: it is both the audit
/// trail and the point a crashed run resumes from.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Deployment {
    pub id: i64,
    pub uuid: Uuid,
    /// Namespaced key of the action this run executes
    pub action: String,
    pub status: DeploymentStatus,
    /// Name of the job the run is currently at
    pub current_job: String,
    /// Reason the run entered rollback. Only set while `status` is `Rollback`.
    pub rollback_error: Option<String>,
    pub created_at: chrono::DateTime<chrono::Utc>,
    pub updated_at: chrono::DateTime<chrono::Utc>,
}

impl Deployment {
    pub fn is_running(&self) -> bool {
        self.status == DeploymentStatus::Running
    }
}

/// Lifecycle status of a deployment
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum DeploymentStatus {
    Running,
    Finished,
    Rollback,
}

impl DeploymentStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            DeploymentStatus::Running => "Running",
            DeploymentStatus::Finished => "Finished",
            DeploymentStatus::Rollback => "Rollback",
        }
    }
}

impl fmt::Display for DeploymentStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for DeploymentStatus {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "Running" | "running" => Ok(DeploymentStatus::Running),
            "Finished" | "finished" => Ok(DeploymentStatus::Finished),
            "Rollback" | "rollback" => Ok(DeploymentStatus::Rollback),
            other => Err(format!("unknown deployment status: {}", other)),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_status_round_trips_through_str() {
        for status in [
            DeploymentStatus::Running,
            DeploymentStatus::Finished,
            DeploymentStatus::Rollback,
        ] {
            assert_eq!(status.as_str().parse::<DeploymentStatus>(), Ok(status));
        }
    }

    #[test]
    fn test_status_parse_accepts_lowercase() {
        assert_eq!(
            "rollback".parse::<DeploymentStatus>(),
            Ok(DeploymentStatus::Rollback)
        );
        assert!("Cancelled".parse::<DeploymentStatus>().is_err());
    }
}
