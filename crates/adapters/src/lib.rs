// SPDX-License-Identifier: MIT

//! oc-adapters: typed HTTP adapters to the execution service and the LLM
//! service, implementing the port traits declared in `oc-core`.

pub mod llm;
pub mod workspace;

#[cfg(feature = "test-support")]
pub mod fakes;

pub use llm::HttpLlmClient;
// Re-exported so the crate boundary named in the design docs
// (`oc_adapters::{WorkspaceError, LlmError}`) resolves here even though the
// types are declared alongside the port traits in `oc-core`.
pub use oc_core::{LlmError, WorkspaceError};
pub use workspace::HttpWorkspaceClient;
