// SPDX-License-Identifier: MIT

//! The Agent Loop: one multi-turn LLM/execution-service
//! interaction per claimed step.

use std::collections::HashMap;
use std::time::Duration;

use oc_core::{
    deserialize_history, estimate_tokens, serialize_history, AgentRole, History, Job, LlmClient,
    LlmError, Message, Step, WorkspaceClient,
};
use oc_storage::JobService;
use tracing::Instrument;

use crate::context;
use crate::error::AgentLoopError;
use crate::skills::SkillRegistry;

const MAX_TURNS: u32 = 20;
const RUN_CODE_TIMEOUT_SEC: u64 = 300;
const HISTORY_TOKEN_LIMIT: usize = 150_000;
const RATE_LIMIT_SLEEP: Duration = Duration::from_secs(60);

/// Drive one claimed step to completion, ending in exactly one
/// `completeStep` or `failStep` call on the Job Service.
/// Diagnostic context (job id, step id, role, attempt, worker id) is
/// attached via a tracing span entered for the duration of the returned
/// future and cleared on every exit path, including early returns.
pub async fn run_step(
    job_service: &JobService,
    llm: &dyn LlmClient,
    workspace: &dyn WorkspaceClient,
    registry: &SkillRegistry,
    step: Step,
    model: &str,
) -> Result<(), AgentLoopError> {
    let span = tracing::info_span!(
        "agent_loop",
        job_id = %step.job_id,
        step_id = %step.id,
        role = %step.role,
        attempt = step.attempt,
        worker_id = step.worker_id.as_deref().unwrap_or("unknown"),
    );
    run_step_inner(job_service, llm, workspace, registry, step, model).instrument(span).await
}

async fn run_step_inner(
    job_service: &JobService,
    llm: &dyn LlmClient,
    workspace: &dyn WorkspaceClient,
    registry: &SkillRegistry,
    step: Step,
    model: &str,
) -> Result<(), AgentLoopError> {
    let job = job_service.get_job(&step.job_id).await?;

    if step.role == AgentRole::Implementer {
        pre_implementer_snapshot_protocol(job_service, workspace, &job).await;
    }

    let completed_results = job_service.completed_results(&job.id).await?;
    let mut history = initial_history(&step, &job, &completed_results);
    let system_prompt = system_prompt(step.role, registry);

    let mut turn: u32 = 0;
    while turn < MAX_TURNS {
        let reply = match llm.complete(model, &system_prompt, &history).await {
            Ok(reply) => reply,
            Err(LlmError::RateLimited) => {
                tracing::warn!("llm rate limited; sleeping one minute before retrying the turn");
                tokio::time::sleep(RATE_LIMIT_SLEEP).await;
                continue;
            }
            Err(e) => {
                job_service.fail_step(&step.id, &format!("llm error: {e}")).await?;
                return Ok(());
            }
        };
        history.push(Message::assistant(reply.clone()));

        if let Some(result_payload) = context::extract_result(&reply) {
            job_service.complete_step(&step.id, result_payload).await?;
            return Ok(());
        }

        let observation = match context::extract_code_block(&reply) {
            Some(code) => match workspace.run_code(&job.workspace_ref, &code, RUN_CODE_TIMEOUT_SEC).await {
                Ok(result) => context::format_observation(&result),
                Err(e) => {
                    job_service.fail_step(&step.id, &format!("executor error: {e}")).await?;
                    return Ok(());
                }
            },
            None => "Continue; use a code block or emit a <result> block when done.".to_string(),
        };
        let observation = context::truncate_observation(&observation, context::MAX_OBSERVATION_CHARS);
        history.push(Message::user(format!("Observation:\n{observation}")));

        match serialize_history(&history) {
            Ok(serialized) => {
                if let Err(e) = job_service.save_history(&step.id, &serialized).await {
                    tracing::warn!(error = %e, "failed to persist history; continuing");
                }
            }
            Err(e) => tracing::warn!(error = %e, "failed to serialize history; continuing without persisting"),
        }

        turn += 1;
        if turn % 3 == 0 {
            if let Err(e) = job_service.heartbeat(&step.id).await {
                tracing::warn!(error = %e, "heartbeat failed");
            }
        }
    }

    job_service.fail_step(&step.id, "max turns reached").await?;
    Ok(())
}

/// Pre-implementer snapshot protocol: restore the prior
/// snapshot if one exists, then take a fresh one. Failures on either call
/// degrade to "no rollback available" rather than failing the step.
async fn pre_implementer_snapshot_protocol(
    job_service: &JobService,
    workspace: &dyn WorkspaceClient,
    job: &Job,
) {
    if let Some(snapshot_key) = &job.snapshot_key {
        if let Err(e) = workspace.restore(&job.workspace_ref, snapshot_key).await {
            tracing::warn!(error = %e, "pre-implementer restore failed; continuing without rollback");
        }
    }
    match workspace.snapshot(&job.workspace_ref).await {
        Ok(snapshot) => {
            if let Err(e) = job_service.save_snapshot_key(&job.id, &snapshot.snapshot_key).await {
                tracing::warn!(error = %e, "failed to persist snapshot key");
            }
        }
        Err(e) => tracing::warn!(error = %e, "pre-implementer snapshot failed; no rollback available"),
    }
}

fn initial_history(step: &Step, job: &Job, completed_results: &HashMap<AgentRole, String>) -> History {
    if let Some(raw) = &step.conversation_history {
        match deserialize_history(raw) {
            Ok(history) if estimate_tokens(&history) <= HISTORY_TOKEN_LIMIT => return history,
            Ok(_) => tracing::warn!("persisted history exceeds the token safety threshold; discarding"),
            Err(e) => tracing::warn!(error = %e, "persisted history failed to deserialize; discarding"),
        }
    }

    // `consecutive_test_failures` is incremented exactly when the Job
    // Service backtracks to Planner and only reset on a Tester pass, so it
    // doubles as the backtrack signal without re-parsing the Tester payload.
    let backtracking = step.role == AgentRole::Planner && job.consecutive_test_failures > 0;
    let message = context::build_initial_message(
        step.role,
        job.task_description.as_deref(),
        job.failing_test.as_deref(),
        completed_results,
        backtracking,
    );
    vec![Message::user(message)]
}

fn system_prompt(role: AgentRole, registry: &SkillRegistry) -> String {
    format!(
        "You are operating as the {} stage of an automated code-repair pipeline.\n\n{}",
        role.as_str(),
        registry.render_tool_documentation()
    )
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::skills::build_registry;
    use oc_adapters::fakes::{FakeLlmClient, FakeWorkspaceClient, WorkspaceCall};
    use oc_core::{RunCodeResult, SubmitJob};
    use sqlx::PgPool;
    use std::sync::Arc;

    #[sqlx::test(migrations = "../storage/migrations")]
    async fn happy_path_completes_on_first_turn(pool: PgPool) -> sqlx::Result<()> {
        let workspace = Arc::new(FakeWorkspaceClient::new());
        let job_service = JobService::new(pool, workspace.clone());
        let job = job_service.submit(SubmitJob {
            repo_url: "git://example/r.git".into(),
            revision: "main".into(),
            task_description: None,
            failing_test: None,
        }).await.expect("submit");
        let step = job_service.claim_next_step("worker-1").await.expect("claim").expect("step");

        let llm = FakeLlmClient::new();
        llm.push_reply("<result>{\"ok\":true}</result>");
        let registry = build_registry();

        run_step(&job_service, &llm, workspace.as_ref(), &registry, step.clone(), "test-model").await.expect("run_step");

        let steps = job_service.list_steps(&job.id).await.expect("list");
        assert_eq!(steps[0].state.as_str(), "DONE");
        assert_eq!(steps[0].result_payload.as_deref(), Some("{\"ok\":true}"));
        Ok(())
    }

    #[sqlx::test(migrations = "../storage/migrations")]
    async fn code_action_runs_through_workspace_and_is_observed(pool: PgPool) -> sqlx::Result<()> {
        let workspace = Arc::new(FakeWorkspaceClient::new());
        workspace.push_run_code_result(RunCodeResult {
            exit_code: 0,
            stdout: "hello".into(),
            stderr: String::new(),
            elapsed_sec: 0.1,
            error_type: None,
        });
        let job_service = JobService::new(pool, workspace.clone());
        let job = job_service.submit(SubmitJob {
            repo_url: "git://example/r.git".into(),
            revision: "main".into(),
            task_description: None,
            failing_test: None,
        }).await.expect("submit");
        let step = job_service.claim_next_step("worker-1").await.expect("claim").expect("step");

        let llm = FakeLlmClient::new();
        llm.push_reply("```python\nprint('hello')\n```");
        llm.push_reply("<result>{\"ok\":true}</result>");
        let registry = build_registry();

        run_step(&job_service, &llm, workspace.as_ref(), &registry, step.clone(), "test-model").await.expect("run_step");

        assert_eq!(workspace.call_count(|c| matches!(c, WorkspaceCall::RunCode { .. })), 1);
        let steps = job_service.list_steps(&job.id).await.expect("list");
        assert_eq!(steps[0].state.as_str(), "DONE");
        Ok(())
    }

    #[sqlx::test(migrations = "../storage/migrations")]
    async fn exhausting_max_turns_retries_until_the_attempt_cap_then_fails_the_job(
        pool: PgPool,
    ) -> sqlx::Result<()> {
        let workspace = Arc::new(FakeWorkspaceClient::new());
        let job_service = JobService::new(pool, workspace.clone());
        let job = job_service.submit(SubmitJob {
            repo_url: "git://example/r.git".into(),
            revision: "main".into(),
            task_description: None,
            failing_test: None,
        }).await.expect("submit");

        let llm = FakeLlmClient::new();
        let registry = build_registry();

        // MAX_ATTEMPTS (3) rounds, each exhausting MAX_TURNS without a
        // <result> block: the first two land the step back in Pending with
        // an incremented attempt; the third crosses the cap and fails it.
        for _ in 0..3 {
            let step = job_service.claim_next_step("worker-1").await.expect("claim").expect("step");
            for _ in 0..MAX_TURNS {
                llm.push_reply("no result or code here, just prose");
            }
            run_step(&job_service, &llm, workspace.as_ref(), &registry, step, "test-model").await.expect("run_step");
        }

        let steps = job_service.list_steps(&job.id).await.expect("list");
        assert_eq!(steps[0].state.as_str(), "FAILED");
        assert_eq!(steps[0].attempt, 3);
        let failed_job = job_service.get_job(&job.id).await.expect("get_job");
        assert_eq!(failed_job.state.as_str(), "FAILED");
        Ok(())
    }

    #[sqlx::test(migrations = "../storage/migrations")]
    async fn rate_limit_sleeps_and_retries_without_consuming_the_turn(pool: PgPool) -> sqlx::Result<()> {
        tokio::time::pause();
        let workspace = Arc::new(FakeWorkspaceClient::new());
        let job_service = JobService::new(pool, workspace.clone());
        let job = job_service.submit(SubmitJob {
            repo_url: "git://example/r.git".into(),
            revision: "main".into(),
            task_description: None,
            failing_test: None,
        }).await.expect("submit");
        let step = job_service.claim_next_step("worker-1").await.expect("claim").expect("step");

        let llm = FakeLlmClient::new();
        llm.rate_limit_at(0);
        llm.push_reply("<result>{\"ok\":true}</result>");
        let registry = build_registry();

        run_step(&job_service, &llm, workspace.as_ref(), &registry, step.clone(), "test-model").await.expect("run_step");

        assert_eq!(llm.calls_made(), 2);
        let steps = job_service.list_steps(&job.id).await.expect("list");
        assert_eq!(steps[0].state.as_str(), "DONE");
        Ok(())
    }

    #[sqlx::test(migrations = "../storage/migrations")]
    async fn implementer_restores_before_snapshotting_when_a_key_already_exists(pool: PgPool) -> sqlx::Result<()> {
        let workspace = Arc::new(FakeWorkspaceClient::new());
        let job_service = JobService::new(pool, workspace.clone());
        let job = job_service.submit(SubmitJob {
            repo_url: "git://example/r.git".into(),
            revision: "main".into(),
            task_description: None,
            failing_test: None,
        }).await.expect("submit");
        job_service.save_snapshot_key(&job.id, "snap-existing").await.expect("save snapshot key");

        // Drive RepoMapper and Planner out of the way so Implementer is next.
        let repo_mapper = job_service.claim_next_step("w").await.expect("claim").expect("step");
        job_service.complete_step(&repo_mapper.id, "{}".into()).await.expect("complete");
        let planner = job_service.claim_next_step("w").await.expect("claim").expect("step");
        job_service.complete_step(&planner.id, "{}".into()).await.expect("complete");
        let implementer = job_service.claim_next_step("w").await.expect("claim").expect("step");
        assert_eq!(implementer.role, AgentRole::Implementer);

        let llm = FakeLlmClient::new();
        llm.push_reply("<result>{\"ok\":true}</result>");
        let registry = build_registry();

        run_step(&job_service, &llm, workspace.as_ref(), &registry, implementer, "test-model").await.expect("run_step");

        let calls = workspace.calls();
        let restore_idx = calls.iter().position(|c| matches!(c, WorkspaceCall::Restore { .. }));
        let snapshot_idx = calls.iter().position(|c| matches!(c, WorkspaceCall::Snapshot { .. }));
        assert!(restore_idx.is_some() && snapshot_idx.is_some());
        assert!(restore_idx.unwrap() < snapshot_idx.unwrap());
        Ok(())
    }
}
