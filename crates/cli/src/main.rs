// SPDX-License-Identifier: MIT

//! `oc`: operator CLI for the orchestration daemon. A thin HTTP
//! client — it has no state and no business logic of its own.

mod client;

use anyhow::Result;
use clap::{Parser, Subcommand};
use oc_wire::SubmitJobRequest;

use client::ApiClient;

#[derive(Parser)]
#[command(name = "oc", version = concat!(env!("CARGO_PKG_VERSION"), "+", env!("BUILD_GIT_HASH")))]
struct Cli {
    /// Base URL of the orchestration daemon's HTTP ingress.
    #[arg(long, env = "OC_DAEMON_URL", default_value = "http://localhost:8080")]
    daemon_url: String,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand)]
enum Command {
    /// Submit a new repair job.
    Submit {
        /// Git URL of the repository to repair.
        repo_url: String,

        /// Revision to check out (defaults to "main").
        #[arg(long)]
        git_ref: Option<String>,

        /// Free-text description of the bug to fix.
        #[arg(long)]
        task_description: Option<String>,

        /// Identifier of a failing test the Implementer should make pass.
        #[arg(long)]
        failing_test: Option<String>,
    },
    /// Show a job's current state.
    Get {
        /// Job id, as returned by `oc submit`.
        id: String,
    },
    /// List a job's steps in creation order.
    Steps {
        /// Job id, as returned by `oc submit`.
        id: String,
    },
    /// Fetch a job's final report, or its pending status if not done yet.
    Report {
        /// Job id, as returned by `oc submit`.
        id: String,
    },
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();
    let client = ApiClient::new(cli.daemon_url);

    let output = match cli.command {
        Command::Submit { repo_url, git_ref, task_description, failing_test } => {
            let job = client.submit_job(SubmitJobRequest { repo_url, git_ref, task_description, failing_test }).await?;
            serde_json::to_value(job)?
        }
        Command::Get { id } => serde_json::to_value(client.get_job(&id).await?)?,
        Command::Steps { id } => serde_json::to_value(client.get_steps(&id).await?)?,
        Command::Report { id } => client.get_report(&id).await?,
    };

    println!("{}", serde_json::to_string_pretty(&output)?);
    Ok(())
}
