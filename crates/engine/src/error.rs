// SPDX-License-Identifier: MIT

//! Error taxonomy for the engine crate.

use thiserror::Error;

#[derive(Debug, Error)]
pub enum RegistryError {
    #[error("unknown skill: {0}")]
    UnknownSkill(String),
    #[error("skill timed out: {0}")]
    Timeout(String),
    #[error("policy violation: {0}")]
    PolicyViolation(String),
    #[error("failed to parse skill arguments: {0}")]
    ParseError(String),
    #[error("skill execution failed: {0}")]
    ExecutorError(String),
}

impl RegistryError {
    /// The `skill.calls{skill, status}` status tag for this outcome.
    pub fn status_tag(&self) -> &'static str {
        match self {
            RegistryError::UnknownSkill(_) => "executor_error",
            RegistryError::Timeout(_) => "timeout",
            RegistryError::PolicyViolation(_) => "policy_violation",
            RegistryError::ParseError(_) => "parse_error",
            RegistryError::ExecutorError(_) => "executor_error",
        }
    }
}

#[derive(Debug, Error)]
pub enum AgentLoopError {
    #[error("storage error: {0}")]
    Storage(#[from] oc_storage::StoreError),
    #[error("core error: {0}")]
    Core(#[from] oc_core::CoreError),
}

#[derive(Debug, Error)]
pub enum SchedulerError {
    #[error("storage error: {0}")]
    Storage(#[from] oc_storage::StoreError),
}
