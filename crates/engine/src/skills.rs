// SPDX-License-Identifier: MIT

//! Skill Registry: process-local lookup, in-process execution,
//! and tool-documentation rendering for the five registered skills.

use std::collections::HashMap;
use std::sync::Arc;
use std::time::Instant;

use async_trait::async_trait;
use oc_core::{RoutingTarget, RunCodeErrorType, SkillDescriptor, SkillPolicy, WorkspaceClient};

use crate::error::RegistryError;

/// An in-process skill's runtime behavior. Descriptor metadata lives in
/// `oc_core::SkillDescriptor`; the executable half lives here because a
/// closure/trait object isn't domain data.
#[async_trait]
pub trait InProcessSkill: Send + Sync {
    async fn execute(
        &self,
        workspace: &dyn WorkspaceClient,
        workspace_ref: &str,
        args: &str,
    ) -> Result<String, RegistryError>;
}

async fn run_embedded(
    workspace: &dyn WorkspaceClient,
    workspace_ref: &str,
    code: &str,
    timeout_sec: u64,
) -> Result<String, RegistryError> {
    let result = workspace.run_code(workspace_ref, code, timeout_sec).await.map_err(|e| RegistryError::ExecutorError(e.to_string()))?;
    match result.error_type {
        Some(RunCodeErrorType::Timeout) => {
            Err(RegistryError::Timeout("run_code exceeded its timeout".into()))
        }
        Some(RunCodeErrorType::PolicyViolation) => {
            Err(RegistryError::PolicyViolation("run_code reported a policy violation".into()))
        }
        None if result.exit_code == 0 => Ok(result.stdout),
        None => Err(RegistryError::ExecutorError(result.stderr)),
    }
}

struct ReadFileSkill;

#[async_trait]
impl InProcessSkill for ReadFileSkill {
    async fn execute(
        &self,
        workspace: &dyn WorkspaceClient,
        workspace_ref: &str,
        args: &str,
    ) -> Result<String, RegistryError> {
        let path = args.trim();
        if path.is_empty() {
            return Err(RegistryError::ParseError("read_file requires a path argument".into()));
        }
        let code = format!("print(open({path:?}).read())");
        run_embedded(workspace, workspace_ref, &code, 5).await
    }
}

struct GrepRepoSkill;

#[async_trait]
impl InProcessSkill for GrepRepoSkill {
    async fn execute(
        &self,
        workspace: &dyn WorkspaceClient,
        workspace_ref: &str,
        args: &str,
    ) -> Result<String, RegistryError> {
        let pattern = args.trim();
        if pattern.is_empty() {
            return Err(RegistryError::ParseError("grep_repo requires a pattern argument".into()));
        }
        let code = format!(
            "import subprocess\nresult = subprocess.run(['grep', '-rn', {pattern:?}, '.'], capture_output=True, text=True)\nprint(result.stdout)"
        );
        run_embedded(workspace, workspace_ref, &code, 10).await
    }
}

/// Process-local registry of Skill descriptors, indexed by name at
/// construction.
pub struct SkillRegistry {
    descriptors: Vec<SkillDescriptor>,
    executors: HashMap<String, Arc<dyn InProcessSkill>>,
}

impl SkillRegistry {
    pub fn lookup(&self, name: &str) -> Result<&SkillDescriptor, RegistryError> {
        self.descriptors.iter().find(|d| d.name == name).ok_or_else(|| RegistryError::UnknownSkill(name.to_string()))
    }

    pub fn descriptors(&self) -> &[SkillDescriptor] {
        &self.descriptors
    }

    /// Execute an in-process skill, timed and counted under the
    /// `skill.calls{skill, status}`/`skill.duration{skill, target}` metric
    /// families. Emitted as structured `tracing` events tagged `metric =
    /// "skill.calls"`/`"skill.duration"` — this corpus has no standalone
    /// metrics crate, and a log-shipped counter is its idiom for exactly
    /// this kind of low-cardinality instrumentation.
    pub async fn execute(
        &self,
        name: &str,
        workspace: &dyn WorkspaceClient,
        workspace_ref: &str,
        args: &str,
    ) -> Result<String, RegistryError> {
        let descriptor = self.lookup(name)?;
        if descriptor.target != RoutingTarget::InProcess {
            return Err(RegistryError::ExecutorError(format!(
                "{name} is an external-executor skill; the registry never invokes its execute path"
            )));
        }
        let executor = self.executors.get(name).ok_or_else(|| RegistryError::UnknownSkill(name.to_string()))?;

        let start = Instant::now();
        let result = executor.execute(workspace, workspace_ref, args).await;
        let elapsed_ms = start.elapsed().as_millis() as u64;

        let status = match &result {
            Ok(_) => "success",
            Err(e) => e.status_tag(),
        };
        tracing::info!(metric = "skill.calls", skill = name, status, "skill call completed");
        tracing::info!(
            metric = "skill.duration",
            skill = name,
            target = "in_process",
            duration_ms = elapsed_ms,
            "skill call duration"
        );
        result
    }

    /// Render the single documentation block injected into every agent's
    /// system prompt: preamble, one entry per skill ordered
    /// external-executor-first then in-process, ties broken by name, then
    /// a rules block.
    pub fn render_tool_documentation(&self) -> String {
        let mut ordered: Vec<&SkillDescriptor> = self.descriptors.iter().collect();
        ordered.sort_by(|a, b| {
            let rank = |d: &SkillDescriptor| match d.target {
                RoutingTarget::ExternalExecutor => 0,
                RoutingTarget::InProcess => 1,
            };
            rank(a).cmp(&rank(b)).then_with(|| a.name.cmp(&b.name))
        });

        let mut out = String::new();
        out.push_str(
            "You act by emitting a single fenced Python code block per turn and waiting for \
             its observation before continuing. Available tools:\n\n",
        );
        for skill in ordered {
            out.push_str("  ");
            out.push_str(&skill.signature);
            out.push('\n');
            out.push_str("      ");
            out.push_str(&skill.description);
            out.push_str("\n\n");
        }
        out.push_str(
            "Emit at most one code block per turn. When you are done, conclude with a single \
             <result>...</result> block wrapping a JSON object.",
        );
        out
    }
}

/// Build the registry's fixed set of five skills.
pub fn build_registry() -> SkillRegistry {
    let descriptors = vec![
        SkillDescriptor {
            name: "run_python".into(),
            version: "1.0.0".into(),
            signature: "run_python(code: str) -> Observation".into(),
            description: "Run a Python snippet in the job's workspace and observe stdout/stderr/exit code.".into(),
            target: RoutingTarget::ExternalExecutor,
            policy: SkillPolicy { network_allowed: false, filesystem_write_allowed: true, command_timeout_secs: 300 },
        },
        SkillDescriptor {
            name: "read_file".into(),
            version: "1.0.0".into(),
            signature: "read_file(path: str) -> str".into(),
            description: "Read and return the contents of a file in the workspace.".into(),
            target: RoutingTarget::InProcess,
            policy: SkillPolicy { network_allowed: false, filesystem_write_allowed: false, command_timeout_secs: 5 },
        },
        SkillDescriptor {
            name: "grep_repo".into(),
            version: "1.0.0".into(),
            signature: "grep_repo(pattern: str) -> str".into(),
            description: "Search the workspace recursively for a pattern, returning matching lines.".into(),
            target: RoutingTarget::InProcess,
            policy: SkillPolicy { network_allowed: false, filesystem_write_allowed: false, command_timeout_secs: 10 },
        },
        SkillDescriptor {
            name: "apply_patch".into(),
            version: "1.0.0".into(),
            signature: "apply_patch(diff: str) -> Observation".into(),
            description: "Apply a unified diff to the workspace and observe the result.".into(),
            target: RoutingTarget::ExternalExecutor,
            policy: SkillPolicy { network_allowed: false, filesystem_write_allowed: true, command_timeout_secs: 60 },
        },
        SkillDescriptor {
            name: "run_tests".into(),
            version: "1.0.0".into(),
            signature: "run_tests(selector: str = \"\") -> Observation".into(),
            description: "Run the workspace's test suite, optionally scoped to a selector.".into(),
            target: RoutingTarget::ExternalExecutor,
            policy: SkillPolicy { network_allowed: false, filesystem_write_allowed: false, command_timeout_secs: 300 },
        },
    ];

    let mut executors: HashMap<String, Arc<dyn InProcessSkill>> = HashMap::new();
    executors.insert("read_file".into(), Arc::new(ReadFileSkill));
    executors.insert("grep_repo".into(), Arc::new(GrepRepoSkill));

    SkillRegistry { descriptors, executors }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn lookup_fails_loudly_for_unknown_skill() {
        let registry = build_registry();
        assert!(matches!(registry.lookup("does_not_exist"), Err(RegistryError::UnknownSkill(_))));
    }

    #[test]
    fn documentation_orders_external_executors_before_in_process_ties_by_name() {
        let registry = build_registry();
        let doc = registry.render_tool_documentation();
        let pos = |needle: &str| doc.find(needle).unwrap();
        // external-executor: apply_patch, run_python, run_tests (alpha)
        assert!(pos("apply_patch") < pos("run_python"));
        assert!(pos("run_python") < pos("run_tests"));
        // in-process after all external-executor entries
        assert!(pos("run_tests") < pos("grep_repo"));
        assert!(pos("grep_repo") < pos("read_file"));
        assert!(doc.ends_with("<result>...</result> block wrapping a JSON object."));
    }

    #[tokio::test]
    async fn executing_an_external_executor_skill_through_the_registry_is_rejected() {
        let registry = build_registry();
        struct Unused;
        #[async_trait::async_trait]
        impl oc_core::WorkspaceClient for Unused {
            async fn create(&self, _: &str, _: &str, _: &str) -> Result<(), oc_core::WorkspaceError> {
                unimplemented!()
            }
            async fn snapshot(&self, _: &str) -> Result<oc_core::SnapshotResult, oc_core::WorkspaceError> {
                unimplemented!()
            }
            async fn restore(&self, _: &str, _: &str) -> Result<(), oc_core::WorkspaceError> {
                unimplemented!()
            }
            async fn run_code(&self, _: &str, _: &str, _: u64) -> Result<oc_core::RunCodeResult, oc_core::WorkspaceError> {
                unimplemented!()
            }
            async fn delete(&self, _: &str) -> Result<(), oc_core::WorkspaceError> {
                unimplemented!()
            }
        }
        let result = registry.execute("run_python", &Unused, "job-1", "print(1)").await;
        assert!(matches!(result, Err(RegistryError::ExecutorError(_))));
    }
}
