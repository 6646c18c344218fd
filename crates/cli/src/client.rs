// SPDX-License-Identifier: MIT

//! HTTP client for the daemon's ingress API. Thin request/response
//! wrappers — no retries, no caching, nothing the daemon doesn't already do.

use anyhow::{bail, Result};
use oc_wire::{JobResponse, StepEntry, SubmitJobRequest};
use serde_json::Value;

pub struct ApiClient {
    http: reqwest::Client,
    base_url: String,
}

impl ApiClient {
    pub fn new(base_url: String) -> Self {
        Self { http: reqwest::Client::new(), base_url }
    }

    pub async fn submit_job(&self, req: SubmitJobRequest) -> Result<JobResponse> {
        let resp = self.http.post(format!("{}/jobs", self.base_url)).json(&req).send().await?;
        Self::into_json(resp).await
    }

    pub async fn get_job(&self, id: &str) -> Result<JobResponse> {
        let resp = self.http.get(format!("{}/jobs/{id}", self.base_url)).send().await?;
        Self::into_json(resp).await
    }

    pub async fn get_steps(&self, id: &str) -> Result<Vec<StepEntry>> {
        let resp = self.http.get(format!("{}/jobs/{id}/steps", self.base_url)).send().await?;
        Self::into_json(resp).await
    }

    /// Returns the raw report body, which is either the pending envelope or
    /// the enriched Finalizer payload — the CLI prints whichever
    /// shape it got rather than modeling both.
    pub async fn get_report(&self, id: &str) -> Result<Value> {
        let resp = self.http.get(format!("{}/jobs/{id}/report", self.base_url)).send().await?;
        Self::into_json(resp).await
    }

    async fn into_json<T: serde::de::DeserializeOwned>(resp: reqwest::Response) -> Result<T> {
        let status = resp.status();
        let body = resp.text().await?;
        if !status.is_success() {
            bail!("request failed with {status}: {body}");
        }
        Ok(serde_json::from_str(&body)?)
    }
}
