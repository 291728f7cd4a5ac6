//! REST routes over the dispatch facade
//!
//! JSON over HTTP: jobs are PUT under client-chosen ids, workers claim
//! through `/api/commitments` and report back through the commitment
//! resource. Outcomes and ids travel as strings, timestamps as ISO-8601.

use crate::error::ApiError;
use axum::extract::{Path, Query, State};
use axum::http::StatusCode;
use axum::response::IntoResponse;
use axum::routing::{get, post, put};
use axum::{Json, Router};
use charter_application::DispatchService;
use charter_domain::agents::AgentDetails;
use charter_domain::commitments::HeartbeatResponse;
use charter_domain::contracts::{ContractView, WorkFilter, WorkResult};
use charter_domain::jobs::JobSubmission;
use charter_domain::shared_kernel::{CommitmentId, JobId};
use charter_domain::store::{JobSummary, PutJobOutcome};
use serde::{Deserialize, Serialize};
use tower_http::cors::{Any, CorsLayer};
use uuid::Uuid;

#[derive(Clone)]
pub struct AppState {
    pub service: DispatchService,
}

/// Build the HTTP router over a dispatch service.
pub fn router(service: DispatchService) -> Router {
    let cors = CorsLayer::new()
        .allow_origin(Any)
        .allow_methods(Any)
        .allow_headers(Any);

    Router::new()
        .route("/healthz", get(healthz))
        .route("/api/agents", put(register_agent))
        .route("/api/jobs", get(list_jobs))
        .route("/api/jobs/{id}", get(get_job).put(put_job))
        .route("/api/jobs/{id}/pause", post(pause_job))
        .route("/api/jobs/{id}/retry", post(retry_job))
        .route("/api/commitments", put(request_work))
        .route("/api/commitments/{id}", put(complete_work))
        .route("/api/commitments/{id}/heartbeat", post(heartbeat))
        .layer(cors)
        .with_state(AppState { service })
}

async fn healthz() -> impl IntoResponse {
    Json(serde_json::json!({"status": "ok"}))
}

#[derive(Debug, Serialize)]
struct RegisterAgentResponse {
    agent_id: String,
}

async fn register_agent(
    State(state): State<AppState>,
    Json(details): Json<AgentDetails>,
) -> Result<Json<RegisterAgentResponse>, ApiError> {
    let agent_id = state.service.register_agent(&details).await?;
    Ok(Json(RegisterAgentResponse {
        agent_id: agent_id.to_string(),
    }))
}

#[derive(Debug, Serialize)]
struct PutJobResponse {
    job_id: String,
    status: PutJobOutcome,
}

async fn put_job(
    State(state): State<AppState>,
    Path(id): Path<Uuid>,
    Json(submission): Json<JobSubmission>,
) -> Result<impl IntoResponse, ApiError> {
    let job_id = JobId(id);
    let outcome = state.service.put_job(job_id, &submission).await?;
    let status = match outcome {
        PutJobOutcome::Created => StatusCode::CREATED,
        PutJobOutcome::Unchanged => StatusCode::OK,
    };
    Ok((
        status,
        Json(PutJobResponse {
            job_id: job_id.to_string(),
            status: outcome,
        }),
    ))
}

async fn get_job(
    State(state): State<AppState>,
    Path(id): Path<Uuid>,
) -> Result<impl IntoResponse, ApiError> {
    match state.service.get_job(JobId(id)).await? {
        Some(view) => Ok(Json(view).into_response()),
        None => Ok(StatusCode::NOT_FOUND.into_response()),
    }
}

#[derive(Debug, Deserialize)]
struct ListParams {
    #[serde(default = "default_limit")]
    limit: usize,
    #[serde(default)]
    offset: usize,
}

fn default_limit() -> usize {
    50
}

#[derive(Debug, Serialize)]
struct ListJobsResponse {
    jobs: Vec<JobSummary>,
    total: usize,
}

async fn list_jobs(
    State(state): State<AppState>,
    Query(params): Query<ListParams>,
) -> Result<Json<ListJobsResponse>, ApiError> {
    let (jobs, total) = state.service.list_jobs(params.limit, params.offset).await?;
    Ok(Json(ListJobsResponse { jobs, total }))
}

async fn pause_job(
    State(state): State<AppState>,
    Path(id): Path<Uuid>,
) -> Result<StatusCode, ApiError> {
    state.service.pause_job(JobId(id)).await?;
    Ok(StatusCode::NO_CONTENT)
}

async fn retry_job(
    State(state): State<AppState>,
    Path(id): Path<Uuid>,
) -> Result<StatusCode, ApiError> {
    state.service.retry_job(JobId(id)).await?;
    Ok(StatusCode::NO_CONTENT)
}

#[derive(Debug, Deserialize)]
struct RequestWorkBody {
    commitment_id: CommitmentId,
    filter: WorkFilter,
    agent: AgentDetails,
}

#[derive(Debug, Serialize)]
struct ContractBody {
    job_id: JobId,
    contract_id: charter_domain::shared_kernel::ContractId,
    job_type: String,
    request_body: serde_json::Value,
    tags: Vec<String>,
    dependencies: Vec<charter_domain::contracts::DependencyResult>,
}

#[derive(Debug, Serialize)]
struct ClaimResponse {
    commitment_id: CommitmentId,
    contract: ContractBody,
}

impl From<ContractView> for ClaimResponse {
    fn from(view: ContractView) -> Self {
        Self {
            commitment_id: view.commitment_id,
            contract: ContractBody {
                job_id: view.job_id,
                contract_id: view.contract_id,
                job_type: view.job_type,
                request_body: view.request_body,
                tags: view.tags,
                dependencies: view.dependencies,
            },
        }
    }
}

/// `200` with the claimed contract, or `200` with a JSON `null` body when
/// no contract qualifies, so pollers can keep one code path.
async fn request_work(
    State(state): State<AppState>,
    Json(body): Json<RequestWorkBody>,
) -> Result<Json<Option<ClaimResponse>>, ApiError> {
    let view = state
        .service
        .request_work(body.commitment_id, &body.filter, &body.agent)
        .await?;
    Ok(Json(view.map(ClaimResponse::from)))
}

async fn heartbeat(
    State(state): State<AppState>,
    Path(id): Path<Uuid>,
) -> Result<Json<HeartbeatResponse>, ApiError> {
    let response = state.service.heartbeat(CommitmentId(id)).await?;
    Ok(Json(response))
}

#[derive(Debug, Deserialize)]
struct CompleteWorkBody {
    result: WorkResult,
}

async fn complete_work(
    State(state): State<AppState>,
    Path(id): Path<Uuid>,
    Json(body): Json<CompleteWorkBody>,
) -> Result<Json<serde_json::Value>, ApiError> {
    state
        .service
        .complete_work(CommitmentId(id), body.result)
        .await?;
    Ok(Json(serde_json::json!({"status": "ok"})))
}
