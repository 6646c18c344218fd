// SPDX-License-Identifier: MIT

//! The Step Scheduler: a claim-tick driver feeding a bounded
//! worker pool, plus a separate stall-reclamation driver.

use std::sync::Arc;
use std::time::Duration;

use oc_core::{LlmClient, StepId, WorkspaceClient};
use oc_storage::JobService;
use tokio::sync::Semaphore;
use tokio::task::JoinHandle;

use crate::agent_loop;
use crate::error::AgentLoopError;
use crate::skills::SkillRegistry;

const CLAIM_TICK: Duration = Duration::from_secs(2);
const RECLAIM_TICK: Duration = Duration::from_secs(60);
const DEFAULT_POOL_SIZE: usize = 4;

/// Runtime configuration for the scheduler, constructed once at process
/// start.
pub struct SchedulerConfig {
    pub pool_size: usize,
    pub model: String,
}

impl Default for SchedulerConfig {
    fn default() -> Self {
        Self { pool_size: DEFAULT_POOL_SIZE, model: "default".to_string() }
    }
}

/// Drives the claim tick and the stall-reclamation tick concurrently until
/// `shutdown` resolves. Both loops share the same `JobService`; the claim
/// loop additionally owns the bounded worker pool.
pub async fn run(
    job_service: Arc<JobService>,
    llm: Arc<dyn LlmClient>,
    workspace: Arc<dyn WorkspaceClient>,
    registry: Arc<SkillRegistry>,
    config: SchedulerConfig,
    shutdown: impl std::future::Future<Output = ()>,
) {
    tokio::pin!(shutdown);
    let claim_loop = run_claim_loop(job_service.clone(), llm, workspace, registry, config);
    let reclaim_loop = run_reclaim_loop(job_service);

    tokio::select! {
        _ = claim_loop => {}
        _ = reclaim_loop => {}
        _ = &mut shutdown => {}
    }
}

/// Ticks every two seconds; each tick claims at most one step and, if one
/// was claimed, dispatches it into the bounded worker pool.
/// Panics inside a worker are caught at the task boundary by Tokio and
/// funneled into `failStep` here — they never kill the pool.
async fn run_claim_loop(
    job_service: Arc<JobService>,
    llm: Arc<dyn LlmClient>,
    workspace: Arc<dyn WorkspaceClient>,
    registry: Arc<SkillRegistry>,
    config: SchedulerConfig,
) {
    let semaphore = Arc::new(Semaphore::new(config.pool_size));
    let mut interval = tokio::time::interval(CLAIM_TICK);
    let mut in_flight: Vec<(StepId, JoinHandle<Result<(), AgentLoopError>>)> = Vec::new();

    loop {
        interval.tick().await;
        in_flight = reap_finished(&job_service, in_flight).await;

        let worker_id = fresh_worker_id();
        match job_service.claim_next_step(&worker_id).await {
            Ok(Some(step)) => {
                let step_id = step.id.clone();
                let job_service = job_service.clone();
                let llm = llm.clone();
                let workspace = workspace.clone();
                let registry = registry.clone();
                let model = config.model.clone();
                let permit = semaphore.clone().acquire_owned().await.expect("semaphore never closed");

                let handle = tokio::spawn(async move {
                    let _permit = permit;
                    agent_loop::run_step(&job_service, llm.as_ref(), workspace.as_ref(), &registry, step, &model).await
                });
                in_flight.push((step_id, handle));
            }
            Ok(None) => {}
            Err(e) => tracing::error!(error = %e, "claim_next_step failed"),
        }
    }
}

/// Drain finished worker tasks, logging errors and converting both panics
/// and returned errors into a `failStep` call so a crashed or erroring
/// worker never leaves its step stuck Running past the next
/// stall-reclamation tick.
async fn reap_finished(
    job_service: &JobService,
    handles: Vec<(StepId, JoinHandle<Result<(), AgentLoopError>>)>,
) -> Vec<(StepId, JoinHandle<Result<(), AgentLoopError>>)> {
    let mut still_running = Vec::with_capacity(handles.len());
    for (step_id, handle) in handles {
        if !handle.is_finished() {
            still_running.push((step_id, handle));
            continue;
        }
        match handle.await {
            Ok(Ok(())) => {}
            Ok(Err(e)) => {
                tracing::error!(step_id = %step_id, error = %e, "agent loop returned an error");
                if let Err(e) = job_service.fail_step(&step_id, &format!("agent loop returned an error: {e}")).await {
                    tracing::error!(step_id = %step_id, error = %e, "failed to record agent loop error as a step failure");
                }
            }
            Err(join_error) => {
                tracing::error!(step_id = %step_id, error = %join_error, "worker task panicked");
                if let Err(e) = job_service.fail_step(&step_id, &format!("worker panicked: {join_error}")).await {
                    tracing::error!(step_id = %step_id, error = %e, "failed to record panic as a step failure");
                }
            }
        }
    }
    still_running
}

/// Ticks every sixty seconds and reclaims steps whose heartbeat has gone
/// stale.
async fn run_reclaim_loop(job_service: Arc<JobService>) {
    let mut interval = tokio::time::interval(RECLAIM_TICK);
    loop {
        interval.tick().await;
        match job_service.reclaim_stalled().await {
            Ok(0) => {}
            Ok(n) => tracing::info!(reclaimed = n, "reclaimed stalled steps"),
            Err(e) => tracing::error!(error = %e, "reclaim_stalled failed"),
        }
    }
}

fn fresh_worker_id() -> String {
    format!("wkr-{}", nanoid::nanoid!(10))
}

#[cfg(test)]
mod tests {
    use super::*;
    use oc_adapters::fakes::{FakeLlmClient, FakeWorkspaceClient};
    use oc_core::SubmitJob;
    use sqlx::PgPool;

    #[sqlx::test(migrations = "../storage/migrations")]
    async fn claim_loop_drains_a_single_pending_step(pool: PgPool) -> sqlx::Result<()> {
        let workspace: Arc<dyn WorkspaceClient> = Arc::new(FakeWorkspaceClient::new());
        let job_service = Arc::new(JobService::new(pool, workspace.clone()));
        let job = job_service.submit(SubmitJob {
                repo_url: "git://example/r.git".into(),
                revision: "main".into(),
                task_description: None,
                failing_test: None,
            }).await.expect("submit");

        let llm = FakeLlmClient::new();
        llm.push_reply("<result>{\"ok\":true}</result>");
        let llm: Arc<dyn LlmClient> = Arc::new(llm);
        let registry = Arc::new(crate::skills::build_registry());

        let (shutdown_tx, shutdown_rx) = tokio::sync::oneshot::channel();
        let service = job_service.clone();
        let task = tokio::spawn(run(
            service,
            llm,
            workspace,
            registry,
            SchedulerConfig { pool_size: 1, model: "test-model".into() },
            async move {
                let _ = shutdown_rx.await;
            },
        ));

        // A few ticks: one to claim, a couple idle ones for the spawned
        // worker to finish the step before shutdown.
        tokio::time::sleep(CLAIM_TICK * 3).await;
        let _ = shutdown_tx.send(());
        task.await.expect("scheduler task panicked");

        let steps = job_service.list_steps(&job.id).await.expect("list");
        assert_eq!(steps[0].state.as_str(), "DONE");
        Ok(())
    }
}
