// SPDX-License-Identifier: MIT

//! LLM Client port — a single call interface, abstracted so
//! `oc-engine`'s Agent Loop depends on the contract, not on `oc-adapters`'
//! `reqwest` implementation.

use async_trait::async_trait;
use thiserror::Error;

use crate::message::History;

/// Error surfaced by an LLM call. `RateLimited` is a distinguished signal:
/// the Agent Loop sleeps and retries the turn rather than failing the step.
#[derive(Debug, Error)]
pub enum LlmError {
    #[error("rate limited")]
    RateLimited,
    #[error("llm service error: {0}")]
    ServiceError(String),
}

/// Port to the external LLM service.
#[async_trait]
pub trait LlmClient: Send + Sync {
    async fn complete(
        &self,
        model: &str,
        system_prompt: &str,
        history: &History,
    ) -> Result<String, LlmError>;
}
