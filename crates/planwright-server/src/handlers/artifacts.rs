//! Generated documents of a session, as stored by the document store.

use axum::extract::{Path, State};

use planwright_store::{ArtifactDescriptor, SessionDocument, StoredArtifact};

use super::session_id;
use crate::error::{ApiError, ApiResponse, ApiResult};
use crate::handlers::sessions::Deleted;
use crate::server::AppState;

pub async fn list(State(state): State<AppState>, Path(id): Path<String>) -> ApiResult<Vec<ArtifactDescriptor>> {
    let id = session_id(id)?;
    Ok(ApiResponse::ok(state.documents.list(&id).await?))
}

pub async fn read(
    State(state): State<AppState>,
    Path((id, filename)): Path<(String, String)>,
) -> ApiResult<StoredArtifact> {
    let id = session_id(id)?;
    match state.documents.read(&id, &filename).await? {
        Some(artifact) => Ok(ApiResponse::ok(artifact)),
        None => Err(ApiError::not_found(format!("file {filename} in session {id}"))),
    }
}

pub async fn delete(
    State(state): State<AppState>,
    Path((id, filename)): Path<(String, String)>,
) -> ApiResult<Deleted> {
    let id = session_id(id)?;
    let deleted = state.documents.delete(&id, &filename).await?;
    if !deleted {
        return Err(ApiError::not_found(format!("file {filename} in session {id}")));
    }
    Ok(ApiResponse::ok(Deleted { deleted }))
}

/// Every document of the session in listing order, headers stripped.
pub async fn context(State(state): State<AppState>, Path(id): Path<String>) -> ApiResult<Vec<SessionDocument>> {
    let id = session_id(id)?;
    Ok(ApiResponse::ok(state.documents.context(&id).await?))
}

#[cfg(test)]
mod tests {
    use crate::server::test_support::*;
    use axum::http::StatusCode;
    use planwright_core::ids::SessionId;
    use planwright_store::ArtifactMetadata;

    async fn seed(app: &TestApp, id: &SessionId, name: &str, content: &str) {
        let _ = app
            .state
            .documents
            .save(id, name, content, &ArtifactMetadata::default())
            .await
            .unwrap();
    }

    #[tokio::test]
    async fn list_read_delete_roundtrip() {
        let app = app();
        let id = SessionId::new();
        seed(&app, &id, "acme-prd.md", "# PRD").await;

        let (status, body) = send(app.router(), "GET", &format!("/api/ai/sessions/{id}/files"), None).await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(body["data"][0]["filename"], "acme-prd.md");

        let uri = format!("/api/ai/sessions/{id}/files/acme-prd.md");
        let (status, body) = send(app.router(), "GET", &uri, None).await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(body["data"]["content"], "# PRD");

        let (status, _) = send(app.router(), "DELETE", &uri, None).await;
        assert_eq!(status, StatusCode::OK);
        let (status, _) = send(app.router(), "GET", &uri, None).await;
        assert_eq!(status, StatusCode::NOT_FOUND);
        let (status, _) = send(app.router(), "DELETE", &uri, None).await;
        assert_eq!(status, StatusCode::NOT_FOUND);
    }

    #[tokio::test]
    async fn unknown_session_lists_nothing() {
        let app = app();
        let (status, body) = send(app.router(), "GET", "/api/ai/sessions/sess_none/files", None).await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(body["data"], serde_json::json!([]));
    }

    #[tokio::test]
    async fn traversal_filenames_are_rejected() {
        let app = app();
        let (status, body) = send(
            app.router(),
            "GET",
            "/api/ai/sessions/sess_a/files/..%2Fsecret.md",
            None,
        )
        .await;
        assert_eq!(status, StatusCode::BAD_REQUEST);
        assert_eq!(body["error"]["code"], "VALIDATION_ERROR");
    }

    #[tokio::test]
    async fn context_returns_stripped_documents() {
        let app = app();
        let id = SessionId::new();
        seed(&app, &id, "acme-project-brief.md", "# Brief").await;
        let (status, body) = send(app.router(), "GET", &format!("/api/ai/sessions/{id}/context"), None).await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(body["data"][0]["name"], "acme-project-brief");
        assert_eq!(body["data"][0]["content"], "# Brief");
    }
}
