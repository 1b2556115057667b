use axum::body::Body;
use axum::extract::{Path, State};
use axum::http::header;
use axum::response::{IntoResponse, Response};
use serde::Serialize;
use tokio_util::io::ReaderStream;
use tracing::info;

use planwright_engine::{PackagePreview, PackageSummary};

use super::{package_id, session_id};
use crate::error::{ApiError, ApiResponse, ApiResult};
use crate::server::AppState;

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct PackageCreated {
    #[serde(flatten)]
    pub summary: PackageSummary,
    pub download_url: String,
}

pub async fn build(State(state): State<AppState>, Path(id): Path<String>) -> ApiResult<PackageCreated> {
    let id = session_id(id)?;
    let summary = state.packaging.build_package(&id).await?;
    let download_url = format!("/api/generator/download/{}", summary.package_id);
    Ok(ApiResponse::ok(PackageCreated { summary, download_url }))
}

pub async fn preview(State(state): State<AppState>, Path(id): Path<String>) -> ApiResult<PackagePreview> {
    let id = session_id(id)?;
    Ok(ApiResponse::ok(state.packaging.preview_package(&id).await?))
}

#[derive(Debug, Serialize)]
pub struct Cancelled {
    pub cancelled: bool,
}

pub async fn cancel(State(state): State<AppState>, Path(id): Path<String>) -> ApiResult<Cancelled> {
    let id = session_id(id)?;
    if !state.packaging.cancel_build(&id) {
        return Err(ApiError::not_found(format!("no package build in progress for session {id}")));
    }
    Ok(ApiResponse::ok(Cancelled { cancelled: true }))
}

/// Stream the archive. The first successful open starts its retention
/// countdown.
pub async fn download(State(state): State<AppState>, Path(id): Path<String>) -> Result<Response, ApiError> {
    let id = package_id(id)?;
    let record = state.packaging.open_download(&id).await?;
    let file = match tokio::fs::File::open(&record.archive_path).await {
        Ok(f) => f,
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
            return Err(ApiError::not_found(format!("package {id}")));
        }
        Err(e) => return Err(planwright_engine::EngineError::from(e).into()),
    };
    info!(package_id = %id, bytes = record.size_bytes, "package download started");

    let headers = [
        (header::CONTENT_TYPE, "application/zip".to_owned()),
        (header::CONTENT_LENGTH, record.size_bytes.to_string()),
        (
            header::CONTENT_DISPOSITION,
            format!("attachment; filename=\"{}\"", record.download_name),
        ),
    ];
    Ok((headers, Body::from_stream(ReaderStream::new(file))).into_response())
}
