// SPDX-License-Identifier: MIT

#![cfg_attr(test, allow(clippy::panic))]
#![cfg_attr(test, allow(clippy::unwrap_used))]
#![cfg_attr(test, allow(clippy::expect_used))]

//! `oc-daemon`: the control-plane process. Serves the ingress HTTP API and
//! runs the step scheduler side by side until `SIGINT`.

mod config;
mod http;

use std::sync::Arc;

use anyhow::Result;
use oc_adapters::{HttpLlmClient, HttpWorkspaceClient};
use oc_core::{LlmClient, WorkspaceClient};
use oc_storage::JobService;
use sqlx::postgres::PgPoolOptions;

use config::Config;

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(tracing_subscriber::EnvFilter::from_default_env())
        .init();

    let config = Config::from_env()?;

    let pool = PgPoolOptions::new().max_connections(10).connect(&config.database_url).await?;
    JobService::migrate(&pool).await?;

    let workspace: Arc<dyn WorkspaceClient> =
        Arc::new(HttpWorkspaceClient::new(config.workspace_base_url.clone()));
    let llm: Arc<dyn LlmClient> =
        Arc::new(HttpLlmClient::new(config.llm_base_url.clone(), config.llm_api_key.clone()));
    let registry = Arc::new(oc_engine::build_registry());
    let job_service = Arc::new(JobService::new(pool, workspace.clone()));

    let scheduler = tokio::spawn(oc_engine::run_scheduler(
        job_service.clone(),
        llm,
        workspace,
        registry,
        config.scheduler_config(),
        shutdown_signal(),
    ));

    let listener = tokio::net::TcpListener::bind(&config.bind_addr).await?;
    tracing::info!(addr = %config.bind_addr, "listening");
    axum::serve(listener, http::router(job_service))
        .with_graceful_shutdown(shutdown_signal())
        .await?;

    scheduler.abort();
    Ok(())
}

async fn shutdown_signal() {
    let _ = tokio::signal::ctrl_c().await;
}
