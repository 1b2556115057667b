use std::time::Duration;

/// Failures of the text-generation backend.
///
/// Nothing inside the workflow core retries; the classification helpers exist
/// so callers and logs can tell transient failures from permanent ones.
#[derive(Clone, Debug, PartialEq, thiserror::Error)]
pub enum GatewayError {
    /// No credentials or backend configured; generation is unavailable.
    #[error("generation gateway not configured: {0}")]
    NotConfigured(String),
    #[error("authentication failed: {0}")]
    AuthenticationFailed(String),
    #[error("invalid request: {0}")]
    InvalidRequest(String),
    /// The backend answered but the payload carried no usable text.
    #[error("malformed response: {0}")]
    MalformedResponse(String),

    #[error("rate limited")]
    RateLimited { retry_after: Option<Duration> },
    #[error("server error {status}: {body}")]
    ServerError { status: u16, body: String },
    #[error("network error: {0}")]
    NetworkError(String),

    #[error("timeout after {0:?}")]
    Timeout(Duration),
    #[error("cancelled")]
    Cancelled,
}

impl GatewayError {
    pub fn is_retryable(&self) -> bool {
        matches!(
            self,
            Self::RateLimited { .. } | Self::ServerError { .. } | Self::NetworkError(_) | Self::Timeout(_)
        )
    }

    pub fn is_fatal(&self) -> bool {
        matches!(
            self,
            Self::NotConfigured(_) | Self::AuthenticationFailed(_) | Self::InvalidRequest(_)
        )
    }

    pub fn suggested_delay(&self) -> Option<Duration> {
        if let Self::RateLimited { retry_after } = self {
            *retry_after
        } else {
            None
        }
    }

    /// Short classification string for logs and error codes.
    pub fn error_kind(&self) -> &'static str {
        match self {
            Self::NotConfigured(_) => "not_configured",
            Self::AuthenticationFailed(_) => "authentication_failed",
            Self::InvalidRequest(_) => "invalid_request",
            Self::MalformedResponse(_) => "malformed_response",
            Self::RateLimited { .. } => "rate_limited",
            Self::ServerError { .. } => "server_error",
            Self::NetworkError(_) => "network_error",
            Self::Timeout(_) => "timeout",
            Self::Cancelled => "cancelled",
        }
    }

    /// Classify an HTTP status code from the backend.
    pub fn from_status(status: u16, body: String) -> Self {
        match status {
            401 | 403 => Self::AuthenticationFailed(body),
            400 | 404 => Self::InvalidRequest(body),
            429 => Self::RateLimited { retry_after: None },
            500..=599 => Self::ServerError { status, body },
            _ => Self::InvalidRequest(format!("unexpected status {status}: {body}")),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn retryable_classification() {
        assert!(GatewayError::RateLimited { retry_after: None }.is_retryable());
        assert!(GatewayError::ServerError { status: 503, body: "busy".into() }.is_retryable());
        assert!(GatewayError::NetworkError("reset".into()).is_retryable());
        assert!(GatewayError::Timeout(Duration::from_secs(1)).is_retryable());
        assert!(!GatewayError::Cancelled.is_retryable());
        assert!(!GatewayError::MalformedResponse("no candidates".into()).is_retryable());
    }

    #[test]
    fn fatal_classification() {
        assert!(GatewayError::NotConfigured("no key".into()).is_fatal());
        assert!(GatewayError::AuthenticationFailed("bad key".into()).is_fatal());
        assert!(GatewayError::InvalidRequest("bad".into()).is_fatal());
        assert!(!GatewayError::Cancelled.is_fatal());
    }

    #[test]
    fn from_status_mapping() {
        assert_eq!(
            GatewayError::from_status(403, "denied".into()).error_kind(),
            "authentication_failed"
        );
        assert_eq!(GatewayError::from_status(400, "bad".into()).error_kind(), "invalid_request");
        assert_eq!(GatewayError::from_status(429, "slow down".into()).error_kind(), "rate_limited");
        assert_eq!(GatewayError::from_status(500, "oops".into()).error_kind(), "server_error");
        assert_eq!(GatewayError::from_status(302, "moved".into()).error_kind(), "invalid_request");
    }

    #[test]
    fn suggested_delay_only_for_rate_limit() {
        let rl = GatewayError::RateLimited {
            retry_after: Some(Duration::from_secs(5)),
        };
        assert_eq!(rl.suggested_delay(), Some(Duration::from_secs(5)));
        assert_eq!(GatewayError::Cancelled.suggested_delay(), None);
    }
}
