// SPDX-License-Identifier: MIT

//! Storage-layer error taxonomy.

use thiserror::Error;

#[derive(Debug, Error)]
pub enum StoreError {
    #[error("database error: {0}")]
    Database(#[from] sqlx::Error),
    #[error("migration failed: {0}")]
    Migration(#[from] sqlx::migrate::MigrateError),
    #[error("job not found: {0}")]
    JobNotFound(String),
    #[error("step not found: {0}")]
    StepNotFound(String),
    #[error("malformed row: {0}")]
    MalformedRow(String),
    #[error(transparent)]
    Core(#[from] oc_core::CoreError),
}
