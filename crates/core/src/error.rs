// SPDX-License-Identifier: MIT

//! Error taxonomy shared across the core domain types.

use thiserror::Error;

#[derive(Debug, Error)]
pub enum CoreError {
    #[error("invalid agent role: {0}")]
    InvalidRole(String),
    #[error("invalid job state: {0}")]
    InvalidJobState(String),
    #[error("invalid step state: {0}")]
    InvalidStepState(String),
    #[error("serialization failed: {0}")]
    Serialization(#[from] serde_json::Error),
}
