use planwright_core::errors::GatewayError;
use planwright_core::phase::InvalidPhase;
use planwright_core::session::ValidationError;
use planwright_store::StoreError;

#[derive(Debug, thiserror::Error)]
pub enum EngineError {
    /// Missing or malformed caller input. Nothing was mutated.
    #[error("validation error: {0}")]
    Validation(String),

    #[error("invalid phase: {0}")]
    InvalidPhase(String),

    #[error("not found: {0}")]
    NotFound(String),

    /// Stale revision or an operation already in flight.
    #[error("conflict: {0}")]
    Conflict(String),

    #[error("generation failed: {0}")]
    Upstream(#[from] GatewayError),

    #[error("store error: {0}")]
    Store(StoreError),

    #[error("io error: {0}")]
    Io(#[from] std::io::Error),

    #[error("archive error: {0}")]
    Archive(String),

    #[error("operation cancelled")]
    Cancelled,
}

impl From<StoreError> for EngineError {
    fn from(e: StoreError) -> Self {
        match e {
            StoreError::NotFound(what) => EngineError::NotFound(what),
            StoreError::Conflict(what) => EngineError::Conflict(what),
            StoreError::InvalidInput(what) => EngineError::Validation(what),
            other => EngineError::Store(other),
        }
    }
}

impl From<InvalidPhase> for EngineError {
    fn from(e: InvalidPhase) -> Self {
        EngineError::InvalidPhase(e.0)
    }
}

impl From<ValidationError> for EngineError {
    fn from(e: ValidationError) -> Self {
        EngineError::Validation(e.0)
    }
}

impl From<zip::result::ZipError> for EngineError {
    fn from(e: zip::result::ZipError) -> Self {
        EngineError::Archive(e.to_string())
    }
}
