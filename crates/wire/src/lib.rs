// SPDX-License-Identifier: MIT

//! oc-wire: JSON DTOs for the ingress HTTP API, shared by the
//! daemon (server) and the CLI (client).

use chrono::{DateTime, Utc};
use oc_core::{Job, JobState, Step};
use serde::{Deserialize, Serialize};

/// Body accepted by `POST /jobs`.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SubmitJobRequest {
    pub repo_url: String,
    #[serde(default)]
    pub git_ref: Option<String>,
    #[serde(default)]
    pub task_description: Option<String>,
    #[serde(default)]
    pub failing_test: Option<String>,
}

/// `git_ref` defaults to `"main"` when absent or blank.
pub fn normalize_git_ref(git_ref: Option<&str>) -> String {
    match git_ref {
        Some(r) if !r.trim().is_empty() => r.to_string(),
        _ => "main".to_string(),
    }
}

/// Response shape for `POST /jobs` and `GET /jobs/{id}`.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct JobResponse {
    pub id: String,
    pub state: String,
    pub repo_url: String,
    pub git_ref: String,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl From<&Job> for JobResponse {
    fn from(job: &Job) -> Self {
        JobResponse {
            id: job.id.to_string(),
            state: job.state.as_str().to_string(),
            repo_url: job.repo_url.clone(),
            git_ref: job.revision.clone(),
            created_at: job.created_at,
            updated_at: job.updated_at,
        }
    }
}

/// One entry in `GET /jobs/{id}/steps`.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct StepEntry {
    pub id: String,
    pub role: String,
    pub state: String,
    pub attempt: i32,
    pub worker_id: Option<String>,
    pub created_at: DateTime<Utc>,
    pub started_at: Option<DateTime<Utc>>,
    pub finished_at: Option<DateTime<Utc>>,
    pub heartbeat_at: Option<DateTime<Utc>>,
    pub result_json: Option<String>,
}

impl From<&Step> for StepEntry {
    fn from(step: &Step) -> Self {
        StepEntry {
            id: step.id.to_string(),
            role: step.role.as_str().to_string(),
            state: step.state.as_str().to_string(),
            attempt: step.attempt,
            worker_id: step.worker_id.clone(),
            created_at: step.created_at,
            started_at: step.started_at,
            finished_at: step.finished_at,
            heartbeat_at: step.heartbeat_at,
            result_json: step.result_payload.clone(),
        }
    }
}

/// Body returned by `GET /jobs/{id}/report` while the Finalizer has not
/// completed yet (HTTP 202).
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct PendingReport {
    pub status: String,
    pub job_state: String,
}

impl PendingReport {
    pub fn for_state(state: JobState) -> Self {
        PendingReport { status: "pending".to_string(), job_state: state.as_str().to_string() }
    }
}

/// Envelope merged into the Finalizer's result payload for `GET
/// /jobs/{id}/report` once the job has a completed Finalizer step.
/// `merge_into` folds these fields into the payload object (or, if
/// the payload isn't a JSON object, falls back to a `report` key holding the
/// raw text).
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct ReportEnvelope {
    pub job_id: String,
    pub job_state: String,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
    pub iterations: i32,
}

impl ReportEnvelope {
    /// Merges this envelope into the Finalizer's raw result payload. A
    /// payload that parses as a JSON object is enriched in place; anything
    /// else (malformed JSON, a bare string, a number) is carried under a
    /// `report` key instead.
    pub fn merge_into(self, raw_payload: &str) -> serde_json::Value {
        let envelope = serde_json::to_value(&self).expect("envelope always serializes");
        let mut merged = match serde_json::from_str::<serde_json::Value>(raw_payload) {
            Ok(serde_json::Value::Object(map)) => serde_json::Value::Object(map),
            _ => {
                let mut map = serde_json::Map::new();
                map.insert("report".to_string(), serde_json::Value::String(raw_payload.to_string()));
                serde_json::Value::Object(map)
            }
        };
        if let (serde_json::Value::Object(merged), serde_json::Value::Object(envelope)) =
            (&mut merged, envelope)
        {
            for (k, v) in envelope {
                merged.insert(k, v);
            }
        }
        merged
    }
}

/// A minimal API-error body, used for 404s.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct ErrorBody {
    pub error: String,
}

pub fn unknown_job_error() -> ErrorBody {
    ErrorBody { error: "job not found".to_string() }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn blank_git_ref_normalizes_to_main() {
        assert_eq!(normalize_git_ref(None), "main");
        assert_eq!(normalize_git_ref(Some("")), "main");
        assert_eq!(normalize_git_ref(Some("   ")), "main");
        assert_eq!(normalize_git_ref(Some("develop")), "develop");
    }

    #[test]
    fn submit_job_request_deserializes_camel_case_wire_keys() {
        let req: SubmitJobRequest = serde_json::from_str(r#"{"repoUrl":"x"}"#).unwrap();
        assert_eq!(req.repo_url, "x");
        assert!(req.git_ref.is_none());
    }

    #[test]
    fn report_envelope_enriches_a_json_object_payload() {
        let envelope = ReportEnvelope {
            job_id: "job_1".to_string(),
            job_state: "DONE".to_string(),
            created_at: Utc::now(),
            updated_at: Utc::now(),
            iterations: 2,
        };
        let merged = envelope.merge_into(r#"{"summary":"fixed the bug"}"#);
        assert_eq!(merged["summary"], "fixed the bug");
        assert_eq!(merged["jobId"], "job_1");
        assert_eq!(merged["iterations"], 2);
    }

    #[test]
    fn report_envelope_falls_back_to_raw_text_for_non_object_payload() {
        let envelope = ReportEnvelope {
            job_id: "job_1".to_string(),
            job_state: "DONE".to_string(),
            created_at: Utc::now(),
            updated_at: Utc::now(),
            iterations: 0,
        };
        let merged = envelope.merge_into("not json at all");
        assert_eq!(merged["report"], "not json at all");
        assert_eq!(merged["jobId"], "job_1");
    }
}
