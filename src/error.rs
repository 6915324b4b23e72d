use axum::{ http::StatusCode, response::{ IntoResponse, Response }, Json };
use serde_json::json;
use thiserror::Error;

/// Errors surfaced by the relay, each mapped to the HTTP status returned to the caller.
#[derive(Debug, Error)]
pub enum RelayError {
    /// Request rejected before anything was sent upstream.
    #[error("{0}")]
    InvalidRequest(String),

    #[error("Unauthorized")]
    Unauthorized,

    #[error("Rate limit exceeded, try again later")]
    RateLimited,

    /// ASI1.AI answered with a non-success status.
    #[error("ASI1.AI API Error: {status}")]
    Upstream {
        status: u16,
        body: String,
    },

    #[error("Timeout connecting to ASI1.AI")]
    Timeout,

    #[error("Connection error: {0}")]
    Connection(String),

    /// ASI1.AI answered 2xx with a body that is not usable.
    #[error("Invalid response from ASI1.AI: {0}")]
    InvalidResponse(String),

    #[error("Configuration error: {0}")]
    Config(String),

    #[error("Internal error: {0}")]
    Internal(String),
}

impl RelayError {
    pub fn status_code(&self) -> StatusCode {
        match self {
            RelayError::InvalidRequest(_) => StatusCode::BAD_REQUEST,
            RelayError::Unauthorized => StatusCode::UNAUTHORIZED,
            RelayError::RateLimited => StatusCode::TOO_MANY_REQUESTS,
            RelayError::Upstream { status, .. } =>
                StatusCode::from_u16(*status)
                    .ok()
                    .filter(|s| s.is_client_error() || s.is_server_error())
                    .unwrap_or(StatusCode::BAD_GATEWAY),
            RelayError::Timeout => StatusCode::GATEWAY_TIMEOUT,
            RelayError::Connection(_) => StatusCode::SERVICE_UNAVAILABLE,
            RelayError::InvalidResponse(_) => StatusCode::BAD_GATEWAY,
            RelayError::Config(_) | RelayError::Internal(_) => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }

    /// True when the failure happened on the way to or from ASI1.AI.
    pub fn is_upstream(&self) -> bool {
        matches!(
            self,
            RelayError::Upstream { .. } |
                RelayError::Timeout |
                RelayError::Connection(_) |
                RelayError::InvalidResponse(_)
        )
    }
}

impl From<reqwest::Error> for RelayError {
    fn from(err: reqwest::Error) -> Self {
        if err.is_timeout() {
            RelayError::Timeout
        } else if err.is_connect() || err.is_request() {
            RelayError::Connection(err.to_string())
        } else if err.is_decode() {
            RelayError::InvalidResponse(err.to_string())
        } else {
            RelayError::Internal(err.to_string())
        }
    }
}

impl IntoResponse for RelayError {
    fn into_response(self) -> Response {
        (self.status_code(), Json(json!({ "detail": self.to_string() }))).into_response()
    }
}
