// SPDX-License-Identifier: MIT

//! HTTP client for the execution service's five endpoints.

use std::time::Duration;

use async_trait::async_trait;
use oc_core::{RunCodeErrorType, RunCodeResult, SnapshotResult, WorkspaceClient, WorkspaceError};
use serde::{Deserialize, Serialize};

const DEFAULT_TIMEOUT: Duration = Duration::from_secs(120);
const DELETE_TIMEOUT: Duration = Duration::from_secs(30);
const RUN_CODE_TIMEOUT_HEADROOM: u64 = 30;

/// `reqwest`-based client for the execution service's five
/// `/workspace/*` endpoints.
pub struct HttpWorkspaceClient {
    base_url: String,
    http: reqwest::Client,
}

impl HttpWorkspaceClient {
    pub fn new(base_url: impl Into<String>) -> Self {
        Self { base_url: base_url.into(), http: reqwest::Client::new() }
    }

    fn url(&self, path: &str) -> String {
        format!("{}{}", self.base_url.trim_end_matches('/'), path)
    }

    async fn expect_2xx(&self, resp: reqwest::Response) -> Result<reqwest::Response, WorkspaceError> {
        if resp.status().is_success() {
            Ok(resp)
        } else {
            let status = resp.status();
            let body = resp.text().await.unwrap_or_default();
            Err(WorkspaceError::ExecutorError(format!("{status}: {body}")))
        }
    }
}

#[derive(Serialize)]
struct CreateRequest<'a> {
    workspace_ref: &'a str,
    repo_url: &'a str,
    git_ref: &'a str,
}

#[derive(Serialize)]
struct SnapshotRequest<'a> {
    workspace_ref: &'a str,
}

#[derive(Deserialize)]
struct SnapshotResponse {
    #[allow(dead_code)]
    workspace_ref: String,
    snapshot_key: String,
    size_bytes: u64,
}

#[derive(Serialize)]
struct RestoreRequest<'a> {
    workspace_ref: &'a str,
    snapshot_key: &'a str,
}

#[derive(Serialize)]
struct RunCodeRequest<'a> {
    code: &'a str,
    workspace_ref: &'a str,
    timeout_sec: u64,
}

#[derive(Deserialize)]
struct RunCodeResponse {
    exit_code: i32,
    stdout: String,
    stderr: String,
    elapsed_sec: f64,
    error_type: Option<String>,
}

fn parse_error_type(raw: Option<String>) -> Option<RunCodeErrorType> {
    match raw.as_deref() {
        Some("TIMEOUT") => Some(RunCodeErrorType::Timeout),
        Some("POLICY_VIOLATION") => Some(RunCodeErrorType::PolicyViolation),
        _ => None,
    }
}

#[async_trait]
impl WorkspaceClient for HttpWorkspaceClient {
    async fn create(
        &self,
        workspace_ref: &str,
        repo_url: &str,
        git_ref: &str,
    ) -> Result<(), WorkspaceError> {
        let resp = self.http.post(self.url("/workspace/create")).timeout(DEFAULT_TIMEOUT).json(&CreateRequest { workspace_ref, repo_url, git_ref }).send().await.map_err(|e| WorkspaceError::Unreachable(e.to_string()))?;
        self.expect_2xx(resp).await?;
        Ok(())
    }

    async fn snapshot(&self, workspace_ref: &str) -> Result<SnapshotResult, WorkspaceError> {
        let resp = self.http.post(self.url("/workspace/snapshot")).timeout(DEFAULT_TIMEOUT).json(&SnapshotRequest { workspace_ref }).send().await.map_err(|e| WorkspaceError::Unreachable(e.to_string()))?;
        let resp = self.expect_2xx(resp).await?;
        let body: SnapshotResponse = resp.json().await.map_err(|e| WorkspaceError::ExecutorError(format!("malformed snapshot response: {e}")))?;
        Ok(SnapshotResult { snapshot_key: body.snapshot_key, size_bytes: body.size_bytes })
    }

    async fn restore(
        &self,
        workspace_ref: &str,
        snapshot_key: &str,
    ) -> Result<(), WorkspaceError> {
        let resp = self.http.post(self.url("/workspace/restore")).timeout(DEFAULT_TIMEOUT).json(&RestoreRequest { workspace_ref, snapshot_key }).send().await.map_err(|e| WorkspaceError::Unreachable(e.to_string()))?;
        self.expect_2xx(resp).await?;
        Ok(())
    }

    async fn run_code(
        &self,
        workspace_ref: &str,
        code: &str,
        timeout_sec: u64,
    ) -> Result<RunCodeResult, WorkspaceError> {
        let wall_clock = Duration::from_secs(timeout_sec + RUN_CODE_TIMEOUT_HEADROOM);
        let resp = self.http.post(self.url("/workspace/run_code")).timeout(wall_clock).json(&RunCodeRequest { code, workspace_ref, timeout_sec }).send().await.map_err(|e| WorkspaceError::Unreachable(e.to_string()))?;
        let resp = self.expect_2xx(resp).await?;
        let body: RunCodeResponse = resp.json().await.map_err(|e| WorkspaceError::ExecutorError(format!("malformed run_code response: {e}")))?;
        Ok(RunCodeResult {
            exit_code: body.exit_code,
            stdout: body.stdout,
            stderr: body.stderr,
            elapsed_sec: body.elapsed_sec,
            error_type: parse_error_type(body.error_type),
        })
    }

    async fn delete(&self, workspace_ref: &str) -> Result<(), WorkspaceError> {
        let resp = self.http.delete(self.url(&format!("/workspace/{workspace_ref}"))).timeout(DELETE_TIMEOUT).send().await.map_err(|e| WorkspaceError::Unreachable(e.to_string()))?;
        self.expect_2xx(resp).await?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_distinguished_error_types() {
        assert_eq!(parse_error_type(Some("TIMEOUT".into())), Some(RunCodeErrorType::Timeout));
        assert_eq!(
            parse_error_type(Some("POLICY_VIOLATION".into())),
            Some(RunCodeErrorType::PolicyViolation)
        );
        assert_eq!(parse_error_type(None), None);
        assert_eq!(parse_error_type(Some("WEIRD".into())), None);
    }

    #[test]
    fn url_joins_base_and_path_regardless_of_trailing_slash() {
        let client = HttpWorkspaceClient::new("http://exec.local/");
        assert_eq!(client.url("/workspace/create"), "http://exec.local/workspace/create");
    }
}
