// SPDX-License-Identifier: MIT

//! Workspace Client port — the execution service's five
//! endpoints, abstracted as a trait so `oc-storage` and `oc-engine` depend on
//! the contract, not on `oc-adapters`' `reqwest` implementation.

use async_trait::async_trait;
use thiserror::Error;

#[derive(Debug, Clone)]
pub struct SnapshotResult {
    pub snapshot_key: String,
    pub size_bytes: u64,
}

/// Distinguished non-success outcome a sandboxed code run can report
/// through `run_code`'s `error_type`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RunCodeErrorType {
    Timeout,
    PolicyViolation,
}

impl RunCodeErrorType {
    pub fn as_str(self) -> &'static str {
        match self {
            RunCodeErrorType::Timeout => "TIMEOUT",
            RunCodeErrorType::PolicyViolation => "POLICY_VIOLATION",
        }
    }
}

#[derive(Debug, Clone)]
pub struct RunCodeResult {
    pub exit_code: i32,
    pub stdout: String,
    pub stderr: String,
    pub elapsed_sec: f64,
    pub error_type: Option<RunCodeErrorType>,
}

/// Error surfaced by any Workspace Client call: unreachable executor
/// or an executor-reported error status.
#[derive(Debug, Error)]
pub enum WorkspaceError {
    #[error("execution service unreachable: {0}")]
    Unreachable(String),
    #[error("execution service returned an error status: {0}")]
    ExecutorError(String),
}

/// Port to the external execution service. Implemented by
/// `oc-adapters::WorkspaceClient` over HTTP; faked in tests.
#[async_trait]
pub trait WorkspaceClient: Send + Sync {
    async fn create(
        &self,
        workspace_ref: &str,
        repo_url: &str,
        git_ref: &str,
    ) -> Result<(), WorkspaceError>;

    async fn snapshot(&self, workspace_ref: &str) -> Result<SnapshotResult, WorkspaceError>;

    async fn restore(
        &self,
        workspace_ref: &str,
        snapshot_key: &str,
    ) -> Result<(), WorkspaceError>;

    async fn run_code(
        &self,
        workspace_ref: &str,
        code: &str,
        timeout_sec: u64,
    ) -> Result<RunCodeResult, WorkspaceError>;

    async fn delete(&self, workspace_ref: &str) -> Result<(), WorkspaceError>;
}
