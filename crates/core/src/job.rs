// SPDX-License-Identifier: MIT

//! Job identifier and record.

use crate::ids::JobId;
use crate::role::JobState;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// One repair task.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Job {
    pub id: JobId,
    pub repo_url: String,
    pub revision: String,
    pub task_description: Option<String>,
    pub failing_test: Option<String>,
    pub state: JobState,
    /// Opaque string the execution service uses to address the cloned
    /// working tree. Set exactly once, at submission.
    pub workspace_ref: String,
    pub snapshot_key: Option<String>,
    pub consecutive_test_failures: i32,
    pub iteration_count: i32,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl Job {
    pub fn is_terminal(&self) -> bool {
        matches!(self.state, JobState::Done | JobState::Failed)
    }
}

/// Request body accepted by `POST /jobs`, already validated
/// (blank `git_ref` normalized to `"main"` by the caller).
#[derive(Debug, Clone)]
pub struct SubmitJob {
    pub repo_url: String,
    pub revision: String,
    pub task_description: Option<String>,
    pub failing_test: Option<String>,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn fresh_job_is_not_terminal() {
        let job = Job {
            id: JobId::new(),
            repo_url: "git://example/r.git".into(),
            revision: "main".into(),
            task_description: None,
            failing_test: None,
            state: JobState::MapRepo,
            workspace_ref: "job-abc".into(),
            snapshot_key: None,
            consecutive_test_failures: 0,
            iteration_count: 0,
            created_at: Utc::now(),
            updated_at: Utc::now(),
        };
        assert!(!job.is_terminal());
    }
}
