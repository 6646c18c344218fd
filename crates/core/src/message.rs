// SPDX-License-Identifier: MIT

//! Conversation message — the unit of a step's persisted history.

use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Role {
    User,
    Assistant,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Message {
    pub role: Role,
    pub content: String,
}

impl Message {
    pub fn user(content: impl Into<String>) -> Self {
        Self { role: Role::User, content: content.into() }
    }

    pub fn assistant(content: impl Into<String>) -> Self {
        Self { role: Role::Assistant, content: content.into() }
    }
}

/// A full conversation history, as persisted to and restored from a step row.
pub type History = Vec<Message>;

/// Serialize a history to the JSON array form stored in
/// `steps.conversation_history`.
pub fn serialize_history(history: &History) -> serde_json::Result<String> {
    serde_json::to_string(history)
}

/// Deserialize a persisted history back into its in-memory form.
pub fn deserialize_history(raw: &str) -> serde_json::Result<History> {
    serde_json::from_str(raw)
}

/// Coarse token estimate used by the Agent Loop's history-discard rule:
/// characters divided by four.
pub fn estimate_tokens(history: &History) -> usize {
    history.iter().map(|m| m.content.len()).sum::<usize>() / 4
}
