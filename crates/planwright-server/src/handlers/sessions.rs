use axum::extract::rejection::{JsonRejection, QueryRejection};
use axum::extract::{Path, Query, State};
use axum::http::StatusCode;
use axum::Json;
use chrono::Utc;
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

use planwright_core::checklist::ChecklistResult;
use planwright_core::session::{PhaseSubmission, Session, SessionSummary};
use planwright_engine::{GenerationStatus, PhaseCompletion, ProgressReport};

use super::{require, session_id};
use crate::error::{ApiError, ApiResponse, ApiResult};
use crate::server::AppState;

const DEFAULT_LIST_LIMIT: u32 = 50;
const MAX_LIST_LIMIT: u32 = 500;

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct HealthResponse {
    pub status: &'static str,
    pub uptime_secs: u64,
    pub session_backend: &'static str,
    pub generation: GenerationStatus,
}

pub async fn health(State(state): State<AppState>) -> ApiResult<HealthResponse> {
    Ok(ApiResponse::ok(HealthResponse {
        status: "ok",
        uptime_secs: state.started_at.elapsed().as_secs(),
        session_backend: state.sessions.backend(),
        generation: state.assembler.status(),
    }))
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CreateSessionBody {
    #[serde(default)]
    pub project_name: String,
    #[serde(default)]
    pub description: Option<String>,
}

pub async fn create(
    State(state): State<AppState>,
    body: Result<Json<CreateSessionBody>, JsonRejection>,
) -> Result<(StatusCode, Json<ApiResponse<Session>>), ApiError> {
    let Json(body) = body?;
    let session = state
        .sessions
        .create_session(&body.project_name, body.description)
        .await?;
    Ok((StatusCode::CREATED, ApiResponse::ok(session)))
}

#[derive(Debug, Deserialize)]
pub struct ListParams {
    pub limit: Option<u32>,
}

pub async fn list(
    State(state): State<AppState>,
    params: Result<Query<ListParams>, QueryRejection>,
) -> ApiResult<Vec<SessionSummary>> {
    let Query(params) = params?;
    let limit = params.limit.unwrap_or(DEFAULT_LIST_LIMIT).clamp(1, MAX_LIST_LIMIT);
    Ok(ApiResponse::ok(state.sessions.list(limit).await?))
}

pub async fn get(State(state): State<AppState>, Path(id): Path<String>) -> ApiResult<Session> {
    let id = session_id(id)?;
    Ok(ApiResponse::ok(state.sessions.get(&id).await?))
}

#[derive(Debug, Serialize)]
pub struct Deleted {
    pub deleted: bool,
}

pub async fn delete(State(state): State<AppState>, Path(id): Path<String>) -> ApiResult<Deleted> {
    let id = session_id(id)?;
    if !state.sessions.delete(&id).await? {
        return Err(ApiError::not_found(format!("session {id}")));
    }
    let _ = state.packaging.revoke_session(&id).await?;
    Ok(ApiResponse::ok(Deleted { deleted: true }))
}

pub async fn archive(State(state): State<AppState>, Path(id): Path<String>) -> ApiResult<Session> {
    let id = session_id(id)?;
    Ok(ApiResponse::ok(state.sessions.archive(&id).await?))
}

pub async fn progress(State(state): State<AppState>, Path(id): Path<String>) -> ApiResult<ProgressReport> {
    let id = session_id(id)?;
    Ok(ApiResponse::ok(state.sessions.progress(&id).await?))
}

#[derive(Debug, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CompletePhaseBody {
    #[serde(flatten)]
    pub submission: PhaseSubmission,
    #[serde(default)]
    pub expected_revision: Option<u64>,
}

pub async fn complete_phase(
    State(state): State<AppState>,
    Path((id, phase)): Path<(String, String)>,
    body: Result<Json<CompletePhaseBody>, JsonRejection>,
) -> ApiResult<PhaseCompletion> {
    let id = session_id(id)?;
    let Json(body) = body?;
    let completion = state
        .sessions
        .complete_phase(&id, &phase, body.submission, body.expected_revision)
        .await?;
    Ok(ApiResponse::ok(completion))
}

#[derive(Debug, Default, Deserialize)]
pub struct ChecklistBody {
    #[serde(default)]
    pub responses: Map<String, Value>,
}

#[derive(Debug, Serialize)]
pub struct ChecklistRecorded {
    pub session: Session,
    pub result: ChecklistResult,
}

pub async fn record_checklist(
    State(state): State<AppState>,
    Path((id, phase, name)): Path<(String, String, String)>,
    body: Result<Json<ChecklistBody>, JsonRejection>,
) -> ApiResult<ChecklistRecorded> {
    let id = session_id(id)?;
    let Json(body) = body?;
    let (session, result) = state
        .sessions
        .record_checklist(&id, &phase, &name, body.responses)
        .await?;
    Ok(ApiResponse::ok(ChecklistRecorded { session, result }))
}

pub async fn validate_checklist(
    State(state): State<AppState>,
    Path(name): Path<String>,
    body: Result<Json<ChecklistBody>, JsonRejection>,
) -> ApiResult<ChecklistResult> {
    require("checklist name", &name)?;
    let Json(body) = body?;
    let result = state
        .library
        .validate_checklist(&name, body.responses, Utc::now())
        .await?;
    Ok(ApiResponse::ok(result))
}
