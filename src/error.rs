//! Error types for the cache layer
//!
//! Provides unified error handling using thiserror.

use axum::{
    http::StatusCode,
    response::{IntoResponse, Response},
    Json,
};
use thiserror::Error;

use crate::domain::ValidationError;
use crate::models::ErrorResponse;

// == Cache Error Enum ==
/// Unified error type for the cache layer.
///
/// Variants carry owned strings so a single outcome can be cloned out to
/// every caller waiting on a coalesced operation.
#[derive(Error, Debug, Clone, PartialEq)]
pub enum CacheError {
    /// A wrapped asynchronous producer failed
    #[error("Fetch failed: {0}")]
    Fetch(String),

    /// The retry budget for a key was used up
    #[error("Retries exhausted for {key} after {attempts} attempts: {last_error}")]
    RetryExhausted {
        key: String,
        attempts: u32,
        last_error: String,
    },

    /// An operation did not finish within its allotted time
    #[error("Timed out after {0} ms")]
    Timeout(u64),

    /// Pending work was torn down before it could finish
    #[error("Operation cancelled: {0}")]
    Cancelled(String),

    /// The receiving side of a stream or action log is gone
    #[error("Channel closed")]
    ChannelClosed,

    /// Key not found in cache
    #[error("Key not found: {0}")]
    NotFound(String),

    /// Invalid request data
    #[error("Invalid request: {0}")]
    InvalidRequest(String),

    /// Domain validation rejected the input; never retried
    #[error("Validation failed: {0}")]
    Validation(#[from] ValidationError),
}

impl CacheError {
    /// Wraps a producer error, keeping its full context chain.
    pub fn fetch(err: anyhow::Error) -> Self {
        CacheError::Fetch(format!("{:#}", err))
    }
}

// == IntoResponse Implementation ==
impl IntoResponse for CacheError {
    fn into_response(self) -> Response {
        let status = match &self {
            CacheError::NotFound(_) => StatusCode::NOT_FOUND,
            CacheError::InvalidRequest(_) | CacheError::Validation(_) => StatusCode::BAD_REQUEST,
            CacheError::Timeout(_) => StatusCode::GATEWAY_TIMEOUT,
            CacheError::Fetch(_) | CacheError::RetryExhausted { .. } => StatusCode::BAD_GATEWAY,
            CacheError::Cancelled(_) | CacheError::ChannelClosed => {
                StatusCode::SERVICE_UNAVAILABLE
            }
        };

        let body = Json(ErrorResponse::new(self.to_string()));

        (status, body).into_response()
    }
}

// == Result Type Alias ==
/// Convenience Result type for the cache layer.
pub type Result<T> = std::result::Result<T, CacheError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_fetch_keeps_context_chain() {
        let err = anyhow::anyhow!("connection reset").context("loading transactions");
        let wrapped = CacheError::fetch(err);
        assert_eq!(
            wrapped.to_string(),
            "Fetch failed: loading transactions: connection reset"
        );
    }

    #[test]
    fn test_validation_error_converts() {
        let err: CacheError = ValidationError::NonPositiveAmount.into();
        assert_eq!(err, CacheError::Validation(ValidationError::NonPositiveAmount));
        assert_eq!(err.into_response().status(), StatusCode::BAD_REQUEST);
    }

    #[test]
    fn test_status_codes() {
        let resp = CacheError::NotFound("k".into()).into_response();
        assert_eq!(resp.status(), StatusCode::NOT_FOUND);

        let resp = CacheError::InvalidRequest("bad".into()).into_response();
        assert_eq!(resp.status(), StatusCode::BAD_REQUEST);

        let resp = CacheError::Timeout(5).into_response();
        assert_eq!(resp.status(), StatusCode::GATEWAY_TIMEOUT);
    }
}
