// SPDX-License-Identifier: MIT

//! The Job Service: the durable store's transactional custodian
//! of the Job/Step state machine.

use std::collections::HashMap;
use std::sync::Arc;

use oc_core::{
    AgentRole, Job, JobId, JobState, Step, StepId, StepState, SubmitJob, WorkspaceClient,
    MAX_ATTEMPTS,
};
use sqlx::PgPool;

use crate::error::StoreError;
use crate::rows::{JobRow, StepRow};
use crate::tester;

/// Stall cutoff for `reclaimStalled`: a Running step whose
/// heartbeat is older than this is presumed crashed.
const STALL_CUTOFF: &str = "5 minutes";

/// Transactional custodian of the Job/Step state machine, backed by
/// PostgreSQL. Holds the only handle to the Workspace Client the store needs
/// — for cloning at submission and deleting at job termination.
pub struct JobService {
    pool: PgPool,
    workspace: Arc<dyn WorkspaceClient>,
}

impl JobService {
    pub fn new(pool: PgPool, workspace: Arc<dyn WorkspaceClient>) -> Self {
        Self { pool, workspace }
    }

    pub fn pool(&self) -> &PgPool {
        &self.pool
    }

    /// Run the embedded schema migrations. Called once at daemon startup,
    /// before the scheduler's first tick.
    pub async fn migrate(pool: &PgPool) -> Result<(), StoreError> {
        sqlx::migrate!("./migrations").run(pool).await?;
        Ok(())
    }

    /// **submit**. Clones the repository via the Workspace
    /// Client before the durable write; on clone failure the job is
    /// persisted directly as Failed with no step created.
    pub async fn submit(&self, req: SubmitJob) -> Result<Job, StoreError> {
        let id = JobId::new();
        let workspace_ref = id.to_string();

        let clone_ok = self.workspace.create(&workspace_ref, &req.repo_url, &req.revision).await;

        let mut tx = self.pool.begin().await?;

        let initial_state = match &clone_ok {
            Ok(()) => JobState::MapRepo,
            Err(e) => {
                tracing::warn!(error = %e, job_id = %id, "workspace create failed; job marked Failed");
                JobState::Failed
            }
        };

        let row: JobRow = sqlx::query_as(
            "INSERT INTO jobs (id, repo_url, revision, state, workspace_ref, task_description, failing_test)
             VALUES ($1, $2, $3, $4, $5, $6, $7)
             RETURNING *",
        ).bind(id.as_str()).bind(&req.repo_url).bind(&req.revision).bind(initial_state.as_str()).bind(&workspace_ref).bind(&req.task_description).bind(&req.failing_test).fetch_one(&mut *tx).await?;

        if clone_ok.is_ok() {
            let step_id = StepId::new();
            sqlx::query("INSERT INTO steps (id, job_id, role, state) VALUES ($1, $2, $3, $4)").bind(step_id.as_str()).bind(id.as_str()).bind(AgentRole::RepoMapper.as_str()).bind(StepState::Pending.as_str()).execute(&mut *tx).await?;
        }

        tx.commit().await?;
        Job::try_from(row)
    }

    /// **claimNextStep**: row-level skip-locked claim of the
    /// oldest Pending step, tie-broken by `created_at`.
    pub async fn claim_next_step(&self, worker_id: &str) -> Result<Option<Step>, StoreError> {
        let mut tx = self.pool.begin().await?;
        let row: Option<StepRow> = sqlx::query_as(
            r#"
            WITH next AS (
                SELECT id FROM steps
                WHERE state = 'PENDING'
                ORDER BY created_at ASC
                FOR UPDATE SKIP LOCKED
                LIMIT 1
            )
            UPDATE steps
            SET state = 'RUNNING', worker_id = $1, started_at = now(), heartbeat_at = now()
            FROM next
            WHERE steps.id = next.id
            RETURNING steps.*
            "#,
        ).bind(worker_id).fetch_optional(&mut *tx).await?;
        tx.commit().await?;
        row.map(Step::try_from).transpose()
    }

    /// **completeStep**: transitions the step to Done and either
    /// advances the pipeline, backtracks to Planner, or fails the job on a
    /// second consecutive Tester failure.
    pub async fn complete_step(
        &self,
        step_id: &StepId,
        result_payload: String,
    ) -> Result<(), StoreError> {
        let mut tx = self.pool.begin().await?;

        let step_row: StepRow = sqlx::query_as(
            "UPDATE steps
             SET state = 'DONE', finished_at = now(), worker_id = NULL, result_payload = $1
             WHERE id = $2
             RETURNING *",
        ).bind(&result_payload).bind(step_id.as_str()).fetch_one(&mut *tx).await?;
        let step = Step::try_from(step_row)?;

        let job_row: JobRow = sqlx::query_as("SELECT * FROM jobs WHERE id = $1 FOR UPDATE").bind(step.job_id.as_str()).fetch_one(&mut *tx).await?;
        let job = Job::try_from(job_row)?;

        let mut cleanup_ref = None;

        if step.role == AgentRole::Tester && !tester::tests_passed(&result_payload) {
            let new_count = job.consecutive_test_failures + 1;
            if new_count >= 2 {
                sqlx::query(
                    "UPDATE jobs SET state = $1, consecutive_test_failures = $2, updated_at = now() WHERE id = $3",
                ).bind(JobState::Failed.as_str()).bind(new_count).bind(job.id.as_str()).execute(&mut *tx).await?;
                cleanup_ref = Some(job.workspace_ref.clone());
            } else {
                sqlx::query(
                    "UPDATE jobs SET consecutive_test_failures = $1, iteration_count = iteration_count + 1, state = $2, updated_at = now() WHERE id = $3",
                ).bind(new_count).bind(JobState::Plan.as_str()).bind(job.id.as_str()).execute(&mut *tx).await?;
                insert_pending_step(&mut tx, &job.id, AgentRole::Planner).await?;
            }
        } else {
            if step.role == AgentRole::Tester {
                sqlx::query("UPDATE jobs SET consecutive_test_failures = 0 WHERE id = $1").bind(job.id.as_str()).execute(&mut *tx).await?;
            }
            match step.role.next() {
                Some(next_role) => {
                    insert_pending_step(&mut tx, &job.id, next_role).await?;
                    sqlx::query("UPDATE jobs SET state = $1, updated_at = now() WHERE id = $2").bind(JobState::from(next_role).as_str()).bind(job.id.as_str()).execute(&mut *tx).await?;
                }
                None => {
                    sqlx::query("UPDATE jobs SET state = $1, updated_at = now() WHERE id = $2").bind(JobState::Done.as_str()).bind(job.id.as_str()).execute(&mut *tx).await?;
                    cleanup_ref = Some(job.workspace_ref.clone());
                }
            }
        }

        tx.commit().await?;

        if let Some(workspace_ref) = cleanup_ref {
            self.cleanup_workspace(&workspace_ref).await;
        }
        Ok(())
    }

    /// **failStep**. Reason is logged only — it has no column
    /// in the durable schema (a Failed step always carries a null
    /// `result_payload`, per invariant #2).
    pub async fn fail_step(&self, step_id: &StepId, reason: &str) -> Result<(), StoreError> {
        let mut tx = self.pool.begin().await?;
        let step_row: StepRow = sqlx::query_as("SELECT * FROM steps WHERE id = $1 FOR UPDATE").bind(step_id.as_str()).fetch_one(&mut *tx).await?;
        let step = Step::try_from(step_row)?;
        let new_attempt = step.attempt + 1;

        let mut job_failed_ref = None;
        if new_attempt < MAX_ATTEMPTS {
            sqlx::query(
                "UPDATE steps SET state = 'PENDING', attempt = $1, worker_id = NULL, started_at = NULL, finished_at = NULL, heartbeat_at = NULL WHERE id = $2",
            ).bind(new_attempt).bind(step_id.as_str()).execute(&mut *tx).await?;
        } else {
            sqlx::query(
                "UPDATE steps SET state = 'FAILED', attempt = $1, worker_id = NULL WHERE id = $2",
            ).bind(new_attempt).bind(step_id.as_str()).execute(&mut *tx).await?;
            let job_row: JobRow = sqlx::query_as(
                "UPDATE jobs SET state = $1, updated_at = now() WHERE id = $2 RETURNING *",
            ).bind(JobState::Failed.as_str()).bind(step.job_id.as_str()).fetch_one(&mut *tx).await?;
            job_failed_ref = Some(Job::try_from(job_row)?.workspace_ref);
        }

        tx.commit().await?;
        tracing::warn!(step_id = %step_id, attempt = new_attempt, reason, "step failed");

        if let Some(workspace_ref) = job_failed_ref {
            self.cleanup_workspace(&workspace_ref).await;
        }
        Ok(())
    }

    /// **heartbeat**: single-row update.
    pub async fn heartbeat(&self, step_id: &StepId) -> Result<(), StoreError> {
        sqlx::query("UPDATE steps SET heartbeat_at = now() WHERE id = $1").bind(step_id.as_str()).execute(&self.pool).await?;
        Ok(())
    }

    /// **reclaimStalled**: the sole liveness mechanism for
    /// crashed workers. Returns the number of steps reclaimed.
    pub async fn reclaim_stalled(&self) -> Result<u64, StoreError> {
        let rows: Vec<StepRow> = sqlx::query_as(&format!(
            "SELECT * FROM steps WHERE state = 'RUNNING' AND heartbeat_at < now() - interval '{STALL_CUTOFF}'"
        )).fetch_all(&self.pool).await?;

        let count = rows.len() as u64;
        for row in rows {
            let step = Step::try_from(row)?;
            self.fail_step(&step.id, "heartbeat timed out").await?;
        }
        Ok(count)
    }

    /// **completedResults**: latest Done payload per role.
    pub async fn completed_results(
        &self,
        job_id: &JobId,
    ) -> Result<HashMap<AgentRole, String>, StoreError> {
        #[derive(sqlx::FromRow)]
        struct LatestResult {
            role: String,
            result_payload: Option<String>,
        }

        let rows: Vec<LatestResult> = sqlx::query_as(
            "SELECT DISTINCT ON (role) role, result_payload FROM steps
             WHERE job_id = $1 AND state = 'DONE'
             ORDER BY role, created_at DESC",
        ).bind(job_id.as_str()).fetch_all(&self.pool).await?;

        let mut map = HashMap::with_capacity(rows.len());
        for row in rows {
            let role = AgentRole::from_str_db(&row.role).ok_or_else(|| StoreError::MalformedRow(format!("step role {:?}", row.role)))?;
            if let Some(payload) = row.result_payload {
                map.insert(role, payload);
            }
        }
        Ok(map)
    }

    /// **saveHistory**: single-row update.
    pub async fn save_history(
        &self,
        step_id: &StepId,
        serialized_history: &str,
    ) -> Result<(), StoreError> {
        sqlx::query("UPDATE steps SET conversation_history = $1 WHERE id = $2").bind(serialized_history).bind(step_id.as_str()).execute(&self.pool).await?;
        Ok(())
    }

    /// **saveSnapshotKey**: single-row update.
    pub async fn save_snapshot_key(&self, job_id: &JobId, key: &str) -> Result<(), StoreError> {
        sqlx::query("UPDATE jobs SET snapshot_key = $1 WHERE id = $2").bind(key).bind(job_id.as_str()).execute(&self.pool).await?;
        Ok(())
    }

    pub async fn get_job(&self, job_id: &JobId) -> Result<Job, StoreError> {
        let row: Option<JobRow> = sqlx::query_as("SELECT * FROM jobs WHERE id = $1").bind(job_id.as_str()).fetch_optional(&self.pool).await?;
        match row {
            Some(row) => Job::try_from(row),
            None => Err(StoreError::JobNotFound(job_id.to_string())),
        }
    }

    pub async fn list_steps(&self, job_id: &JobId) -> Result<Vec<Step>, StoreError> {
        let rows: Vec<StepRow> =
            sqlx::query_as("SELECT * FROM steps WHERE job_id = $1 ORDER BY created_at ASC").bind(job_id.as_str()).fetch_all(&self.pool).await?;
        rows.into_iter().map(Step::try_from).collect()
    }

    /// Workspace cleanup after terminal states never rolls back the
    /// committing transaction: errors are logged and swallowed.
    async fn cleanup_workspace(&self, workspace_ref: &str) {
        if let Err(e) = self.workspace.delete(workspace_ref).await {
            tracing::warn!(workspace_ref, error = %e, "workspace cleanup failed; swallowed");
        }
    }
}

async fn insert_pending_step(
    tx: &mut sqlx::Transaction<'_, sqlx::Postgres>,
    job_id: &JobId,
    role: AgentRole,
) -> Result<(), StoreError> {
    let step_id = StepId::new();
    sqlx::query("INSERT INTO steps (id, job_id, role, state) VALUES ($1, $2, $3, $4)").bind(step_id.as_str()).bind(job_id.as_str()).bind(role.as_str()).bind(StepState::Pending.as_str()).execute(&mut **tx).await?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use async_trait::async_trait;
    use oc_core::{RunCodeResult, SnapshotResult, WorkspaceError};

    struct FakeWorkspace;

    #[async_trait]
    impl WorkspaceClient for FakeWorkspace {
        async fn create(&self, _: &str, _: &str, _: &str) -> Result<(), WorkspaceError> {
            Ok(())
        }
        async fn snapshot(&self, _: &str) -> Result<SnapshotResult, WorkspaceError> {
            Ok(SnapshotResult { snapshot_key: "snap-1".into(), size_bytes: 0 })
        }
        async fn restore(&self, _: &str, _: &str) -> Result<(), WorkspaceError> {
            Ok(())
        }
        async fn run_code(&self, _: &str, _: &str, _: u64) -> Result<RunCodeResult, WorkspaceError> {
            unimplemented!("not exercised by storage tests")
        }
        async fn delete(&self, _: &str) -> Result<(), WorkspaceError> {
            Ok(())
        }
    }

    fn service(pool: PgPool) -> JobService {
        JobService::new(pool, Arc::new(FakeWorkspace))
    }

    fn submission() -> SubmitJob {
        SubmitJob {
            repo_url: "git://example/r.git".into(),
            revision: "main".into(),
            task_description: Some("fix the bug".into()),
            failing_test: None,
        }
    }

    #[sqlx::test(migrations = "./migrations")]
    async fn submit_creates_job_and_repo_mapper_step(pool: PgPool) -> sqlx::Result<()> {
        let svc = service(pool);
        let job = svc.submit(submission()).await.unwrap();
        assert_eq!(job.state, JobState::MapRepo);

        let steps = svc.list_steps(&job.id).await.unwrap();
        assert_eq!(steps.len(), 1);
        assert_eq!(steps[0].role, AgentRole::RepoMapper);
        assert_eq!(steps[0].state, StepState::Pending);
        Ok(())
    }

    #[sqlx::test(migrations = "./migrations")]
    async fn claim_then_complete_advances_pipeline(pool: PgPool) -> sqlx::Result<()> {
        let svc = service(pool);
        let job = svc.submit(submission()).await.unwrap();

        let step = svc.claim_next_step("worker-1").await.unwrap().unwrap();
        assert_eq!(step.role, AgentRole::RepoMapper);
        assert_eq!(step.state, StepState::Running);

        svc.complete_step(&step.id, r#"{"summary":"ok"}"#.into()).await.unwrap();

        let job = svc.get_job(&job.id).await.unwrap();
        assert_eq!(job.state, JobState::Plan);

        let steps = svc.list_steps(&job.id).await.unwrap();
        assert_eq!(steps.len(), 2);
        assert_eq!(steps[1].role, AgentRole::Planner);
        Ok(())
    }

    #[sqlx::test(migrations = "./migrations")]
    async fn claim_on_empty_pending_set_returns_none(pool: PgPool) -> sqlx::Result<()> {
        let svc = service(pool);
        assert!(svc.claim_next_step("worker-1").await.unwrap().is_none());
        Ok(())
    }

    #[sqlx::test(migrations = "./migrations")]
    async fn tester_failure_backtracks_to_planner(pool: PgPool) -> sqlx::Result<()> {
        let svc = service(pool);
        let job = svc.submit(submission()).await.unwrap();

        for _ in 0..3 {
            let step = svc.claim_next_step("w").await.unwrap().unwrap();
            svc.complete_step(&step.id, r#"{"ok":true}"#.into()).await.unwrap();
        }
        let tester_step = svc.claim_next_step("w").await.unwrap().unwrap();
        assert_eq!(tester_step.role, AgentRole::Tester);

        svc.complete_step(&tester_step.id, r#"{"tests_passed":false,"failures":1}"#.into()).await.unwrap();

        let job = svc.get_job(&job.id).await.unwrap();
        assert_eq!(job.state, JobState::Plan);
        assert_eq!(job.consecutive_test_failures, 1);
        assert_eq!(job.iteration_count, 1);

        let steps = svc.list_steps(&job.id).await.unwrap();
        let planner_steps: Vec<_> =
            steps.iter().filter(|s| s.role == AgentRole::Planner).collect();
        assert_eq!(planner_steps.len(), 2);
        Ok(())
    }

    #[sqlx::test(migrations = "./migrations")]
    async fn second_tester_failure_fails_the_job(pool: PgPool) -> sqlx::Result<()> {
        let svc = service(pool);
        let job = svc.submit(submission()).await.unwrap();

        for _ in 0..3 {
            let step = svc.claim_next_step("w").await.unwrap().unwrap();
            svc.complete_step(&step.id, r#"{"ok":true}"#.into()).await.unwrap();
        }
        let tester_step = svc.claim_next_step("w").await.unwrap().unwrap();
        svc.complete_step(&tester_step.id, r#"{"tests_passed": false}"#.into()).await.unwrap();

        // backtrack: Planner -> Implementer -> Tester again
        for _ in 0..2 {
            let step = svc.claim_next_step("w").await.unwrap().unwrap();
            svc.complete_step(&step.id, r#"{"ok":true}"#.into()).await.unwrap();
        }
        let tester_step = svc.claim_next_step("w").await.unwrap().unwrap();
        assert_eq!(tester_step.role, AgentRole::Tester);
        svc.complete_step(&tester_step.id, r#"{"tests_passed":false}"#.into()).await.unwrap();

        let job = svc.get_job(&job.id).await.unwrap();
        assert_eq!(job.state, JobState::Failed);
        assert_eq!(job.consecutive_test_failures, 2);

        let steps = svc.list_steps(&job.id).await.unwrap();
        assert!(steps.iter().all(|s| s.role != AgentRole::Reviewer));
        Ok(())
    }

    #[sqlx::test(migrations = "./migrations")]
    async fn fail_step_retries_until_attempt_cap_then_fails_job(pool: PgPool) -> sqlx::Result<()> {
        let svc = service(pool);
        let job = svc.submit(submission()).await.unwrap();

        for attempt in 0..MAX_ATTEMPTS {
            let step = svc.claim_next_step("w").await.unwrap().unwrap();
            svc.fail_step(&step.id, "boom").await.unwrap();
            let steps = svc.list_steps(&job.id).await.unwrap();
            if attempt + 1 < MAX_ATTEMPTS {
                assert_eq!(steps[0].state, StepState::Pending);
            } else {
                assert_eq!(steps[0].state, StepState::Failed);
            }
        }

        let job = svc.get_job(&job.id).await.unwrap();
        assert_eq!(job.state, JobState::Failed);
        Ok(())
    }

    #[sqlx::test(migrations = "./migrations")]
    async fn reclaim_stalled_on_empty_running_set_is_a_noop(pool: PgPool) -> sqlx::Result<()> {
        let svc = service(pool);
        assert_eq!(svc.reclaim_stalled().await.unwrap(), 0);
        Ok(())
    }

    #[sqlx::test(migrations = "./migrations")]
    async fn completed_results_keeps_latest_per_role_after_backtrack(
        pool: PgPool,
    ) -> sqlx::Result<()> {
        let svc = service(pool);
        let job = svc.submit(submission()).await.unwrap();

        for _ in 0..3 {
            let step = svc.claim_next_step("w").await.unwrap().unwrap();
            svc.complete_step(&step.id, r#"{"ok":true}"#.into()).await.unwrap();
        }
        let tester_step = svc.claim_next_step("w").await.unwrap().unwrap();
        svc.complete_step(&tester_step.id, r#"{"tests_passed":false}"#.into()).await.unwrap();

        for _ in 0..2 {
            let step = svc.claim_next_step("w").await.unwrap().unwrap();
            svc.complete_step(&step.id, r#"{"revised":true}"#.into()).await.unwrap();
        }
        let tester_step = svc.claim_next_step("w").await.unwrap().unwrap();
        svc.complete_step(&tester_step.id, r#"{"tests_passed":true}"#.into()).await.unwrap();

        let results = svc.completed_results(&job.id).await.unwrap();
        assert_eq!(results.get(&AgentRole::Planner).unwrap(), r#"{"revised":true}"#);
        assert_eq!(results.get(&AgentRole::Tester).unwrap(), r#"{"tests_passed":true}"#);
        Ok(())
    }
}
