// SPDX-License-Identifier: MIT

//! Output extraction, observation formatting, and initial-message building
//! for the Agent Loop.

use std::collections::HashMap;
use std::sync::LazyLock;

use oc_core::{AgentRole, RunCodeResult};
use regex::Regex;

/// Maximum size of a formatted observation appended to history.
pub const MAX_OBSERVATION_CHARS: usize = 8000;

const TRUNCATION_MARKER: &str = "\n...[truncated]";

static RESULT_RE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"(?s)<result>(.*?)</result>").expect("valid regex"));

static CODE_BLOCK_RE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"(?s)```[^\n`]*\n(.*?)```").expect("valid regex"));

/// First non-greedy `<result>...</result>` match, trimmed. No JSON
/// validation — the Job Service does a substring check for Tester.
pub fn extract_result(text: &str) -> Option<String> {
    RESULT_RE.captures(text).map(|c| c[1].trim().to_string())
}

/// First fenced code block, language tag optional, body stripped. A newline
/// must separate the opening fence (and its optional tag) from the body.
pub fn extract_code_block(text: &str) -> Option<String> {
    CODE_BLOCK_RE.captures(text).map(|c| c[1].trim().to_string())
}

/// Render a run-code result into the observation text appended to history:
/// stdout, then stderr, then "(no output)" if both are blank, then exit
/// code, then an optional error-type tag.
pub fn format_observation(result: &RunCodeResult) -> String {
    let stdout = result.stdout.trim();
    let stderr = result.stderr.trim();

    let mut out = String::new();
    if !stdout.is_empty() {
        out.push_str("stdout:\n");
        out.push_str(stdout);
    }
    if !stderr.is_empty() {
        if !out.is_empty() {
            out.push_str("\n\n");
        }
        out.push_str("stderr:\n");
        out.push_str(stderr);
    }
    if out.is_empty() {
        out.push_str("(no output)");
    }

    out.push_str(&format!("\n\nexit_code: {}", result.exit_code));
    if let Some(error_type) = result.error_type {
        out.push_str(&format!("\nerror_type: {}", error_type.as_str()));
    }
    out
}

/// Truncate an observation to `max` characters, ending with an explicit
/// truncation marker when truncation occurred.
pub fn truncate_observation(text: &str, max: usize) -> String {
    if text.chars().count() <= max {
        return text.to_string();
    }
    let budget = max.saturating_sub(TRUNCATION_MARKER.chars().count());
    let head: String = text.chars().take(budget).collect();
    format!("{head}{TRUNCATION_MARKER}")
}

fn role_instruction(role: AgentRole, backtracking: bool) -> &'static str {
    match role {
        AgentRole::RepoMapper => {
            "You are the RepoMapper agent. Explore the repository and produce a structural map \
             of the areas relevant to the task."
        }
        AgentRole::Planner if backtracking => {
            "You are the Planner agent. The prior implementation failed its tests. Review the \
             failure below and produce a revised plan."
        }
        AgentRole::Planner => {
            "You are the Planner agent. Produce a concrete, ordered plan to implement the fix."
        }
        AgentRole::Implementer => {
            "You are the Implementer agent. Carry out the plan by editing the repository."
        }
        AgentRole::Tester => {
            "You are the Tester agent. Run the test suite and report whether it passes."
        }
        AgentRole::Reviewer => {
            "You are the Reviewer agent. Review the applied changes for correctness and style."
        }
        AgentRole::Finalizer => {
            "You are the Finalizer agent. Summarize the outcome and produce the final report."
        }
    }
}

/// Build the initial user message for a fresh step: a role-specific
/// instruction, an optional task-context block (RepoMapper and Planner
/// only), and a context block of each previously completed role's latest
/// result, in pipeline order.
pub fn build_initial_message(
    role: AgentRole,
    task_description: Option<&str>,
    failing_test: Option<&str>,
    completed_results: &HashMap<AgentRole, String>,
    backtracking: bool,
) -> String {
    let mut out = String::new();
    out.push_str(role_instruction(role, backtracking));

    if matches!(role, AgentRole::RepoMapper | AgentRole::Planner)
        && (task_description.is_some() || failing_test.is_some())
    {
        out.push_str("\n\nTask context:\n");
        if let Some(desc) = task_description {
            out.push_str("description: ");
            out.push_str(desc);
            out.push('\n');
        }
        if let Some(test) = failing_test {
            out.push_str("failing_test: ");
            out.push_str(test);
            out.push('\n');
        }
    }

    if !completed_results.is_empty() {
        out.push_str("\nPrior results:\n");
        for prior_role in AgentRole::SEQUENCE {
            if let Some(payload) = completed_results.get(&prior_role) {
                out.push_str(prior_role.as_str());
                out.push_str(": ");
                out.push_str(payload);
                out.push('\n');
            }
        }
    }

    out
}
