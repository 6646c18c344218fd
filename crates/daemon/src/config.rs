// SPDX-License-Identifier: MIT

//! Process configuration: required external endpoints fail loudly
//! at startup, purely operational knobs default to fixed values.

use std::env;

use anyhow::{Context, Result};

use oc_engine::SchedulerConfig;

/// Everything `main` needs to wire the process together, read once at
/// startup from the environment (optionally via a `.env` file).
pub struct Config {
    pub database_url: String,
    pub workspace_base_url: String,
    pub llm_base_url: String,
    pub llm_api_key: String,
    pub llm_model: String,
    pub bind_addr: String,
    pub pool_size: usize,
}

impl Config {
    pub fn from_env() -> Result<Self> {
        dotenvy::dotenv().ok();

        Ok(Config {
            database_url: require_env("DATABASE_URL")?,
            workspace_base_url: require_env("WORKSPACE_SERVICE_URL")?,
            llm_base_url: require_env("LLM_SERVICE_URL")?,
            llm_api_key: require_env("LLM_API_KEY")?,
            llm_model: env::var("LLM_MODEL").unwrap_or_else(|_| "default".to_string()),
            bind_addr: env::var("BIND_ADDR").unwrap_or_else(|_| "0.0.0.0:8080".to_string()),
            pool_size: env::var("WORKER_POOL_SIZE").ok().and_then(|v| v.parse().ok()).unwrap_or(4),
        })
    }

    pub fn scheduler_config(&self) -> SchedulerConfig {
        SchedulerConfig { pool_size: self.pool_size, model: self.llm_model.clone() }
    }
}

fn require_env(key: &str) -> Result<String> {
    env::var(key).with_context(|| format!("missing required environment variable {key}"))
}
