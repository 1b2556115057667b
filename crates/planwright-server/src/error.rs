//! Response envelope and error → HTTP status mapping.
//!
//! Every JSON response is wrapped: `{success: true, data}` on success,
//! `{success: false, error: {code, message}}` otherwise.

use axum::extract::rejection::{JsonRejection, QueryRejection};
use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use axum::Json;
use serde::Serialize;
use tracing::{debug, error};

use planwright_core::errors::GatewayError;
use planwright_engine::EngineError;
use planwright_store::StoreError;

pub const VALIDATION_ERROR: &str = "VALIDATION_ERROR";
pub const INVALID_PHASE: &str = "INVALID_PHASE";
pub const NOT_FOUND: &str = "NOT_FOUND";
pub const CONFLICT: &str = "CONFLICT";
pub const GENERATION_UNAVAILABLE: &str = "GENERATION_UNAVAILABLE";
pub const UPSTREAM_ERROR: &str = "UPSTREAM_ERROR";
pub const CANCELLED: &str = "CANCELLED";
pub const INTERNAL_ERROR: &str = "INTERNAL_ERROR";

#[derive(Debug, Serialize)]
pub struct ApiResponse<T> {
    pub success: bool,
    pub data: T,
}

impl<T: Serialize> ApiResponse<T> {
    pub fn ok(data: T) -> Json<Self> {
        Json(Self { success: true, data })
    }
}

#[derive(Debug, Serialize)]
struct ErrorBody {
    success: bool,
    error: ErrorDetail,
}

#[derive(Debug, Serialize)]
struct ErrorDetail {
    code: &'static str,
    message: String,
}

#[derive(Debug)]
pub struct ApiError {
    pub status: StatusCode,
    pub code: &'static str,
    pub message: String,
}

impl ApiError {
    pub fn new(status: StatusCode, code: &'static str, message: impl Into<String>) -> Self {
        Self {
            status,
            code,
            message: message.into(),
        }
    }

    pub fn validation(message: impl Into<String>) -> Self {
        Self::new(StatusCode::BAD_REQUEST, VALIDATION_ERROR, message)
    }

    pub fn not_found(message: impl Into<String>) -> Self {
        Self::new(StatusCode::NOT_FOUND, NOT_FOUND, message)
    }
}

impl From<EngineError> for ApiError {
    fn from(e: EngineError) -> Self {
        let (status, code) = match &e {
            EngineError::Validation(_) => (StatusCode::BAD_REQUEST, VALIDATION_ERROR),
            EngineError::InvalidPhase(_) => (StatusCode::BAD_REQUEST, INVALID_PHASE),
            EngineError::NotFound(_) => (StatusCode::NOT_FOUND, NOT_FOUND),
            EngineError::Conflict(_) => (StatusCode::CONFLICT, CONFLICT),
            EngineError::Upstream(GatewayError::NotConfigured(_)) => {
                (StatusCode::SERVICE_UNAVAILABLE, GENERATION_UNAVAILABLE)
            }
            EngineError::Upstream(_) => (StatusCode::BAD_GATEWAY, UPSTREAM_ERROR),
            EngineError::Cancelled => (StatusCode::SERVICE_UNAVAILABLE, CANCELLED),
            EngineError::Store(_) | EngineError::Io(_) | EngineError::Archive(_) => {
                (StatusCode::INTERNAL_SERVER_ERROR, INTERNAL_ERROR)
            }
        };
        Self::new(status, code, e.to_string())
    }
}

impl From<StoreError> for ApiError {
    fn from(e: StoreError) -> Self {
        EngineError::from(e).into()
    }
}

impl From<JsonRejection> for ApiError {
    fn from(rejection: JsonRejection) -> Self {
        Self::validation(rejection.body_text())
    }
}

impl From<QueryRejection> for ApiError {
    fn from(rejection: QueryRejection) -> Self {
        Self::validation(rejection.body_text())
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        if self.status.is_server_error() {
            error!(status = self.status.as_u16(), code = self.code, message = %self.message, "request failed");
        } else {
            debug!(status = self.status.as_u16(), code = self.code, message = %self.message, "request rejected");
        }
        let body = ErrorBody {
            success: false,
            error: ErrorDetail {
                code: self.code,
                message: self.message,
            },
        };
        (self.status, Json(body)).into_response()
    }
}

pub type ApiResult<T> = Result<Json<ApiResponse<T>>, ApiError>;
