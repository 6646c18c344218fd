// SPDX-License-Identifier: MIT

//! In-memory fakes for `WorkspaceClient`/`LlmClient`, gated behind
//! `test-support` for use by `oc-engine` and `oc-daemon`'s own test suites,
//! which need to observe call counts, not just outcomes.

use async_trait::async_trait;
use oc_core::{
    History, LlmClient, LlmError, RunCodeResult, SnapshotResult, WorkspaceClient, WorkspaceError,
};
use parking_lot::Mutex;

/// One observed call against a [`FakeWorkspaceClient`], in call order.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum WorkspaceCall {
    Create { workspace_ref: String },
    Snapshot { workspace_ref: String },
    Restore { workspace_ref: String, snapshot_key: String },
    RunCode { workspace_ref: String },
    Delete { workspace_ref: String },
}

/// Scripted, call-recording fake of the execution service.
#[derive(Default)]
pub struct FakeWorkspaceClient {
    calls: Mutex<Vec<WorkspaceCall>>,
    run_code_script: Mutex<Vec<RunCodeResult>>,
}

impl FakeWorkspaceClient {
    pub fn new() -> Self {
        Self::default()
    }

    /// Queue a `run_code` result to be returned, in order, on each call.
    /// When the queue is exhausted, a successful no-op result is returned.
    pub fn push_run_code_result(&self, result: RunCodeResult) {
        self.run_code_script.lock().push(result);
    }

    pub fn calls(&self) -> Vec<WorkspaceCall> {
        self.calls.lock().clone()
    }

    pub fn call_count(&self, matches: impl Fn(&WorkspaceCall) -> bool) -> usize {
        self.calls.lock().iter().filter(|c| matches(c)).count()
    }
}

#[async_trait]
impl WorkspaceClient for FakeWorkspaceClient {
    async fn create(
        &self,
        workspace_ref: &str,
        _repo_url: &str,
        _git_ref: &str,
    ) -> Result<(), WorkspaceError> {
        self.calls.lock().push(WorkspaceCall::Create { workspace_ref: workspace_ref.to_string() });
        Ok(())
    }

    async fn snapshot(&self, workspace_ref: &str) -> Result<SnapshotResult, WorkspaceError> {
        self.calls.lock().push(WorkspaceCall::Snapshot { workspace_ref: workspace_ref.to_string() });
        Ok(SnapshotResult { snapshot_key: format!("snap-{workspace_ref}"), size_bytes: 0 })
    }

    async fn restore(
        &self,
        workspace_ref: &str,
        snapshot_key: &str,
    ) -> Result<(), WorkspaceError> {
        self.calls.lock().push(WorkspaceCall::Restore {
            workspace_ref: workspace_ref.to_string(),
            snapshot_key: snapshot_key.to_string(),
        });
        Ok(())
    }

    async fn run_code(
        &self,
        workspace_ref: &str,
        _code: &str,
        _timeout_sec: u64,
    ) -> Result<RunCodeResult, WorkspaceError> {
        self.calls.lock().push(WorkspaceCall::RunCode { workspace_ref: workspace_ref.to_string() });
        let mut script = self.run_code_script.lock();
        if script.is_empty() {
            Ok(RunCodeResult {
                exit_code: 0,
                stdout: String::new(),
                stderr: String::new(),
                elapsed_sec: 0.0,
                error_type: None,
            })
        } else {
            Ok(script.remove(0))
        }
    }

    async fn delete(&self, workspace_ref: &str) -> Result<(), WorkspaceError> {
        self.calls.lock().push(WorkspaceCall::Delete { workspace_ref: workspace_ref.to_string() });
        Ok(())
    }
}

/// Scripted fake of the LLM service: returns queued replies in order, and
/// can be told to return a rate-limit signal on a specific call index.
#[derive(Default)]
pub struct FakeLlmClient {
    replies: Mutex<Vec<String>>,
    rate_limit_once_at: Mutex<Option<usize>>,
    calls_made: Mutex<usize>,
}

impl FakeLlmClient {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn push_reply(&self, reply: impl Into<String>) {
        self.replies.lock().push(reply.into());
    }

    /// The call at this zero-based index returns `LlmError::RateLimited`
    /// instead of consuming a reply.
    pub fn rate_limit_at(&self, call_index: usize) {
        *self.rate_limit_once_at.lock() = Some(call_index);
    }

    pub fn calls_made(&self) -> usize {
        *self.calls_made.lock()
    }
}

#[async_trait]
impl LlmClient for FakeLlmClient {
    async fn complete(
        &self,
        _model: &str,
        _system_prompt: &str,
        _history: &History,
    ) -> Result<String, LlmError> {
        let index = {
            let mut calls = self.calls_made.lock();
            let idx = *calls;
            *calls += 1;
            idx
        };

        if *self.rate_limit_once_at.lock() == Some(index) {
            *self.rate_limit_once_at.lock() = None;
            return Err(LlmError::RateLimited);
        }

        let mut replies = self.replies.lock();
        if replies.is_empty() {
            Err(LlmError::ServiceError("fake exhausted".into()))
        } else {
            Ok(replies.remove(0))
        }
    }
}
