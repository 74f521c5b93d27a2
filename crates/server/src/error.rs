//! Errors surfaced by the HTTP front.
//!
//! Anything the worker cannot answer goes to the network; these cover the
//! cases where even that is impossible.

use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};

#[derive(Debug, thiserror::Error)]
pub enum FrontError {
    /// The request target or body could not be read.
    #[error("INVALID_INPUT: {0}")]
    InvalidInput(String),

    /// An absolute-form target outside the configured upstream origins.
    #[error("FORBIDDEN_TARGET: {0}")]
    ForbiddenTarget(String),

    /// The passthrough fetch failed.
    #[error("{0}")]
    BadGateway(tether_core::Error),

    /// A status query against the cache database failed.
    #[error("{0}")]
    Internal(tether_core::Error),
}

impl FrontError {
    pub fn status(&self) -> StatusCode {
        match self {
            FrontError::InvalidInput(_) => StatusCode::BAD_REQUEST,
            FrontError::ForbiddenTarget(_) => StatusCode::FORBIDDEN,
            FrontError::BadGateway(_) => StatusCode::BAD_GATEWAY,
            FrontError::Internal(_) => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }
}

impl IntoResponse for FrontError {
    fn into_response(self) -> Response {
        let status = self.status();
        tracing::warn!(status = status.as_u16(), "{self}");
        (status, self.to_string()).into_response()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tether_core::Error;

    #[test]
    fn test_status_mapping() {
        assert_eq!(FrontError::InvalidInput("bad target".into()).status(), StatusCode::BAD_REQUEST);
        assert_eq!(FrontError::ForbiddenTarget("http://10.0.0.1".into()).status(), StatusCode::FORBIDDEN);
        assert_eq!(FrontError::BadGateway(Error::Network("refused".into())).status(), StatusCode::BAD_GATEWAY);
        assert_eq!(
            FrontError::Internal(Error::MigrationFailed("x".into())).status(),
            StatusCode::INTERNAL_SERVER_ERROR
        );
    }

    #[test]
    fn test_body_carries_error_code() {
        let err = FrontError::BadGateway(Error::FetchTimeout("https://web.dev/".into()));
        assert_eq!(err.to_string(), "FETCH_TIMEOUT: https://web.dev/");
        assert_eq!(err.into_response().status(), StatusCode::BAD_GATEWAY);
    }
}
