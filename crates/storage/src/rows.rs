// SPDX-License-Identifier: MIT

//! Raw row shapes returned by `sqlx::query_as!`/`FromRow`, and their
//! conversion into the domain types from `oc-core`.
//!
//! The durable schema stores IDs, roles, and states as plain `TEXT`; these
//! types exist purely so `sqlx` has concrete column types to decode into.
//! Converting into `oc_core::Job`/`oc_core::Step` happens once, at the
//! storage boundary.

use chrono::{DateTime, Utc};
use oc_core::{AgentRole, Job, JobId, JobState, Step, StepId, StepState};

use crate::error::StoreError;

#[derive(Debug, sqlx::FromRow)]
pub(crate) struct JobRow {
    pub id: String,
    pub repo_url: String,
    pub revision: String,
    pub state: String,
    pub workspace_ref: String,
    pub snapshot_key: Option<String>,
    pub task_description: Option<String>,
    pub failing_test: Option<String>,
    pub consecutive_test_failures: i32,
    pub iteration_count: i32,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl TryFrom<JobRow> for Job {
    type Error = StoreError;

    fn try_from(row: JobRow) -> Result<Self, Self::Error> {
        let state = JobState::from_str_db(&row.state)
            .ok_or_else(|| StoreError::MalformedRow(format!("job state {:?}", row.state)))?;
        Ok(Job {
            id: JobId::from_string(row.id),
            repo_url: row.repo_url,
            revision: row.revision,
            task_description: row.task_description,
            failing_test: row.failing_test,
            state,
            workspace_ref: row.workspace_ref,
            snapshot_key: row.snapshot_key,
            consecutive_test_failures: row.consecutive_test_failures,
            iteration_count: row.iteration_count,
            created_at: row.created_at,
            updated_at: row.updated_at,
        })
    }
}

#[derive(Debug, sqlx::FromRow)]
pub(crate) struct StepRow {
    pub id: String,
    pub job_id: String,
    pub role: String,
    pub state: String,
    pub attempt: i32,
    pub worker_id: Option<String>,
    pub heartbeat_at: Option<DateTime<Utc>>,
    pub created_at: DateTime<Utc>,
    pub started_at: Option<DateTime<Utc>>,
    pub finished_at: Option<DateTime<Utc>>,
    pub result_payload: Option<String>,
    pub conversation_history: Option<String>,
}

impl TryFrom<StepRow> for Step {
    type Error = StoreError;

    fn try_from(row: StepRow) -> Result<Self, Self::Error> {
        let role = AgentRole::from_str_db(&row.role)
            .ok_or_else(|| StoreError::MalformedRow(format!("step role {:?}", row.role)))?;
        let state = StepState::from_str_db(&row.state)
            .ok_or_else(|| StoreError::MalformedRow(format!("step state {:?}", row.state)))?;
        Ok(Step {
            id: StepId::from_string(row.id),
            job_id: JobId::from_string(row.job_id),
            role,
            state,
            attempt: row.attempt,
            worker_id: row.worker_id,
            heartbeat_at: row.heartbeat_at,
            created_at: row.created_at,
            started_at: row.started_at,
            finished_at: row.finished_at,
            result_payload: row.result_payload,
            conversation_history: row.conversation_history,
        })
    }
}
