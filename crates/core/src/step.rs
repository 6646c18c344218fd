// SPDX-License-Identifier: MIT

//! Step identifier and state machine.

use crate::ids::{JobId, StepId};
use crate::role::AgentRole;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Execution state of a step.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum StepState {
    Pending,
    Running,
    Done,
    Failed,
}

impl StepState {
    pub fn as_str(self) -> &'static str {
        match self {
            StepState::Pending => "PENDING",
            StepState::Running => "RUNNING",
            StepState::Done => "DONE",
            StepState::Failed => "FAILED",
        }
    }

    pub fn from_str_db(s: &str) -> Option<StepState> {
        Some(match s {
            "PENDING" => StepState::Pending,
            "RUNNING" => StepState::Running,
            "DONE" => StepState::Done,
            "FAILED" => StepState::Failed,
            _ => return None,
        })
    }
}

crate::simple_display! {
    StepState {
        Pending => "PENDING",
        Running => "RUNNING",
        Done => "DONE",
        Failed => "FAILED",
    }
}

/// Default cap on attempts before a step is permanently failed.
pub const MAX_ATTEMPTS: i32 = 3;

/// One agent-role execution within a job.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Step {
    pub id: StepId,
    pub job_id: JobId,
    pub role: AgentRole,
    pub state: StepState,
    pub attempt: i32,
    pub worker_id: Option<String>,
    pub heartbeat_at: Option<DateTime<Utc>>,
    pub created_at: DateTime<Utc>,
    pub started_at: Option<DateTime<Utc>>,
    pub finished_at: Option<DateTime<Utc>>,
    /// Opaque serialized result object produced by the agent's terminal output.
    pub result_payload: Option<String>,
    /// Serialized JSON array of `{role, content}` messages.
    pub conversation_history: Option<String>,
}

impl Step {
    /// Construct a fresh Pending step for `role` within `job_id`.
    pub fn new_pending(job_id: JobId, role: AgentRole, now: DateTime<Utc>) -> Self {
        Self {
            id: StepId::new(),
            job_id,
            role,
            state: StepState::Pending,
            attempt: 0,
            worker_id: None,
            heartbeat_at: None,
            created_at: now,
            started_at: None,
            finished_at: None,
            result_payload: None,
            conversation_history: None,
        }
    }

    /// Invariant check used by tests: `Done` state implies a non-null
    /// result payload, a set `finished_at`, and no worker_id; conversely
    /// for every other state the result payload is null.
    pub fn upholds_done_invariant(&self) -> bool {
        match self.state {
            StepState::Done => {
                self.result_payload.is_some()
                    && self.finished_at.is_some()
                    && self.worker_id.is_none()
            }
            _ => self.result_payload.is_none(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn fresh_step_is_pending_with_no_worker() {
        let step = Step::new_pending(JobId::new(), AgentRole::RepoMapper, Utc::now());
        assert_eq!(step.state, StepState::Pending);
        assert!(step.worker_id.is_none());
        assert!(step.started_at.is_none());
        assert!(step.upholds_done_invariant());
    }

    #[test]
    fn state_round_trips_through_db_string() {
        for state in [StepState::Pending, StepState::Running, StepState::Done, StepState::Failed] {
            assert_eq!(StepState::from_str_db(state.as_str()), Some(state));
        }
    }
}
