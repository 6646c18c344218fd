// SPDX-License-Identifier: MIT

//! Skill descriptor types.

use serde::{Deserialize, Serialize};

/// Where a skill's implementation lives.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum RoutingTarget {
    /// Executed in-process, through the skill's `execute` function.
    InProcess,
    /// Invoked indirectly: agents emit code that the Agent Loop runs through
    /// the Workspace Client. The registry never calls `execute` for these.
    ExternalExecutor,
}

/// Execution policy attached to a skill.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct SkillPolicy {
    pub network_allowed: bool,
    pub filesystem_write_allowed: bool,
    pub command_timeout_secs: u64,
}

/// A tool capability descriptor exposed to agents.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SkillDescriptor {
    pub name: String,
    pub version: String,
    pub signature: String,
    pub description: String,
    pub target: RoutingTarget,
    pub policy: SkillPolicy,
}
