// SPDX-License-Identifier: MIT

//! HTTP client for the LLM service's single call interface.

use std::time::Duration;

use async_trait::async_trait;
use oc_core::{History, LlmClient, LlmError, Role};
use reqwest::StatusCode;
use serde::{Deserialize, Serialize};

const CALL_TIMEOUT: Duration = Duration::from_secs(60);

#[derive(Serialize)]
struct WireMessage<'a> {
    role: &'a str,
    content: &'a str,
}

fn wire_role(role: Role) -> &'static str {
    match role {
        Role::User => "user",
        Role::Assistant => "assistant",
    }
}

#[derive(Serialize)]
struct CompleteRequest<'a> {
    model: &'a str,
    system_prompt: &'a str,
    messages: Vec<WireMessage<'a>>,
}

#[derive(Deserialize)]
struct CompleteResponse {
    reply: String,
}

/// `reqwest`-based client for the LLM service's single `complete` call.
pub struct HttpLlmClient {
    base_url: String,
    api_key: String,
    http: reqwest::Client,
}

impl HttpLlmClient {
    pub fn new(base_url: impl Into<String>, api_key: impl Into<String>) -> Self {
        Self { base_url: base_url.into(), api_key: api_key.into(), http: reqwest::Client::new() }
    }
}

#[async_trait]
impl LlmClient for HttpLlmClient {
    async fn complete(
        &self,
        model: &str,
        system_prompt: &str,
        history: &History,
    ) -> Result<String, LlmError> {
        let messages: Vec<WireMessage> =
            history.iter().map(|m| WireMessage { role: wire_role(m.role), content: &m.content }).collect();

        let resp = self.http.post(format!("{}/complete", self.base_url.trim_end_matches('/'))).bearer_auth(&self.api_key).timeout(CALL_TIMEOUT).json(&CompleteRequest { model, system_prompt, messages }).send().await.map_err(|e| LlmError::ServiceError(e.to_string()))?;

        if resp.status() == StatusCode::TOO_MANY_REQUESTS {
            return Err(LlmError::RateLimited);
        }
        if !resp.status().is_success() {
            let status = resp.status();
            let body = resp.text().await.unwrap_or_default();
            return Err(LlmError::ServiceError(format!("{status}: {body}")));
        }

        let body: CompleteResponse = resp.json().await.map_err(|e| LlmError::ServiceError(format!("malformed response: {e}")))?;
        Ok(body.reply)
    }
}
