//! Route handlers, grouped by resource.

pub mod ai;
pub mod artifacts;
pub mod packages;
pub mod sessions;

use planwright_core::ids::{PackageId, SessionId};

use crate::error::ApiError;

/// Ids come straight from the URL and end up in file paths.
pub(crate) fn session_id(raw: String) -> Result<SessionId, ApiError> {
    let id = SessionId::from_raw(raw);
    if id.is_path_safe() {
        Ok(id)
    } else {
        Err(ApiError::validation(format!("invalid session id: {id}")))
    }
}

pub(crate) fn package_id(raw: String) -> Result<PackageId, ApiError> {
    let id = PackageId::from_raw(raw);
    if id.is_path_safe() {
        Ok(id)
    } else {
        Err(ApiError::validation(format!("invalid package id: {id}")))
    }
}

pub(crate) fn require(field: &str, value: &str) -> Result<(), ApiError> {
    if value.trim().is_empty() {
        return Err(ApiError::validation(format!("{field} is required")));
    }
    Ok(())
}
