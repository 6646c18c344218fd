// SPDX-License-Identifier: MIT

//! The ingress HTTP API: thin handlers that translate wire DTOs
//! into `JobService` calls. Routing and error mapping only — no policy
//! lives here.

use std::sync::Arc;

use axum::extract::{Path, State};
use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use axum::routing::{get, post};
use axum::{Json, Router};
use oc_core::{AgentRole, JobId, SubmitJob};
use oc_storage::{JobService, StoreError};
use oc_wire::{ErrorBody, JobResponse, PendingReport, ReportEnvelope, StepEntry, SubmitJobRequest};
use tower_http::trace::TraceLayer;

#[derive(Clone)]
pub struct AppState {
    pub job_service: Arc<JobService>,
}

pub fn router(job_service: Arc<JobService>) -> Router {
    Router::new()
        .route("/jobs", post(submit_job))
        .route("/jobs/:id", get(get_job))
        .route("/jobs/:id/steps", get(get_steps))
        .route("/jobs/:id/report", get(get_report))
        .with_state(AppState { job_service })
        .layer(TraceLayer::new_for_http())
}

async fn submit_job(
    State(state): State<AppState>,
    Json(body): Json<SubmitJobRequest>,
) -> Result<(StatusCode, Json<JobResponse>), ApiError> {
    let revision = oc_wire::normalize_git_ref(body.git_ref.as_deref());
    let job = state
        .job_service
        .submit(SubmitJob {
            repo_url: body.repo_url,
            revision,
            task_description: body.task_description,
            failing_test: body.failing_test,
        })
        .await?;
    Ok((StatusCode::CREATED, Json(JobResponse::from(&job))))
}

async fn get_job(
    State(state): State<AppState>,
    Path(id): Path<String>,
) -> Result<Json<JobResponse>, ApiError> {
    let job = state.job_service.get_job(&JobId::from_string(id)).await?;
    Ok(Json(JobResponse::from(&job)))
}

async fn get_steps(
    State(state): State<AppState>,
    Path(id): Path<String>,
) -> Result<Json<Vec<StepEntry>>, ApiError> {
    let job_id = JobId::from_string(id);
    // list_steps on an unknown job returns an empty list; confirm the job
    // exists first so callers get the documented 404 instead.
    state.job_service.get_job(&job_id).await?;
    let steps = state.job_service.list_steps(&job_id).await?;
    Ok(Json(steps.iter().map(StepEntry::from).collect()))
}

async fn get_report(
    State(state): State<AppState>,
    Path(id): Path<String>,
) -> Result<Response, ApiError> {
    let job_id = JobId::from_string(id);
    let job = state.job_service.get_job(&job_id).await?;
    let steps = state.job_service.list_steps(&job_id).await?;

    let finalizer_result = steps
        .iter()
        .find(|s| s.role == AgentRole::Finalizer && s.state.as_str() == "DONE")
        .and_then(|s| s.result_payload.clone());

    match finalizer_result {
        None => {
            Ok((StatusCode::ACCEPTED, Json(PendingReport::for_state(job.state))).into_response())
        }
        Some(payload) => {
            let envelope = ReportEnvelope {
                job_id: job.id.to_string(),
                job_state: job.state.as_str().to_string(),
                created_at: job.created_at,
                updated_at: job.updated_at,
                iterations: job.iteration_count,
            };
            Ok(Json(envelope.merge_into(&payload)).into_response())
        }
    }
}

#[derive(Debug, thiserror::Error)]
#[error(transparent)]
struct ApiError(#[from] StoreError);

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        match self.0 {
            StoreError::JobNotFound(_) => {
                (StatusCode::NOT_FOUND, Json(ErrorBody { error: "job not found".to_string() }))
                    .into_response()
            }
            e => {
                tracing::error!(error = %e, "request failed");
                (
                    StatusCode::INTERNAL_SERVER_ERROR,
                    Json(ErrorBody { error: "internal error".to_string() }),
                )
                    .into_response()
            }
        }
    }
}
