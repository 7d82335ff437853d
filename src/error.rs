/// Unified error types for the Tandem interaction engine
use axum::{
    http::StatusCode,
    response::{IntoResponse, Response},
    Json,
};
use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Main error type for the engine and its HTTP surface
#[derive(Error, Debug)]
pub enum EngineError {
    /// Self-referential decision, or unknown / inactive actor
    #[error("Invalid actor: {0}")]
    InvalidActor(String),

    /// The actor already liked or passed this target
    #[error("Decision already recorded: {0}")]
    DuplicateDecision(String),

    /// Daily super-like allowance exhausted
    #[error("Super-like quota exceeded: {used} of {allowance} used today")]
    QuotaExceeded { used: u32, allowance: u32 },

    /// Transient persistence failure
    #[error("Storage unavailable: {0}")]
    StorageUnavailable(#[from] sqlx::Error),

    /// Notification could not be persisted or published (never surfaced to callers)
    #[error("Notification dispatch failed: {0}")]
    NotificationDispatchFailed(String),

    /// Authentication errors
    #[error("Authentication failed: {0}")]
    Authentication(String),

    /// Authorization errors
    #[error("Not authorized: {0}")]
    Forbidden(String),

    /// Validation errors
    #[error("Validation error: {0}")]
    Validation(String),

    /// Not found errors
    #[error("Not found: {0}")]
    NotFound(String),

    /// Rate limiting errors
    #[error("Rate limit exceeded")]
    RateLimitExceeded,

    /// Internal server errors
    #[error("Internal error: {0}")]
    Internal(String),

    /// IO errors
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

/// Reason code for a declined like/pass
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum DeclineReason {
    DuplicateDecision,
    QuotaExceeded,
}

impl DeclineReason {
    pub fn as_str(&self) -> &'static str {
        match self {
            DeclineReason::DuplicateDecision => "duplicate_decision",
            DeclineReason::QuotaExceeded => "quota_exceeded",
        }
    }
}

impl EngineError {
    /// Declines are reported to the UI as a no-op with a reason, not as a failure
    pub fn decline_reason(&self) -> Option<DeclineReason> {
        match self {
            EngineError::DuplicateDecision(_) => Some(DeclineReason::DuplicateDecision),
            EngineError::QuotaExceeded { .. } => Some(DeclineReason::QuotaExceeded),
            _ => None,
        }
    }

    /// True when the wrapped storage error is a uniqueness violation
    pub fn is_unique_violation(err: &sqlx::Error) -> bool {
        err.as_database_error()
            .map(|db| db.is_unique_violation())
            .unwrap_or(false)
    }
}

/// JSON error body
#[derive(Debug, Serialize, Deserialize)]
pub struct ErrorResponse {
    pub error: String,
    pub message: String,
}

impl IntoResponse for EngineError {
    fn into_response(self) -> Response {
        let (status, error_code, message) = match self {
            EngineError::InvalidActor(_) => (
                StatusCode::UNPROCESSABLE_ENTITY,
                "InvalidActor",
                self.to_string(),
            ),
            EngineError::DuplicateDecision(_) => (
                StatusCode::CONFLICT,
                "DuplicateDecision",
                self.to_string(),
            ),
            EngineError::QuotaExceeded { .. } => (
                StatusCode::CONFLICT,
                "QuotaExceeded",
                self.to_string(),
            ),
            EngineError::Authentication(_) => (
                StatusCode::UNAUTHORIZED,
                "AuthenticationRequired",
                self.to_string(),
            ),
            EngineError::Forbidden(_) => (StatusCode::FORBIDDEN, "Forbidden", self.to_string()),
            EngineError::Validation(_) => (
                StatusCode::BAD_REQUEST,
                "InvalidRequest",
                self.to_string(),
            ),
            EngineError::NotFound(_) => (StatusCode::NOT_FOUND, "NotFound", self.to_string()),
            EngineError::RateLimitExceeded => (
                StatusCode::TOO_MANY_REQUESTS,
                "RateLimitExceeded",
                "Rate limit exceeded".to_string(),
            ),
            EngineError::StorageUnavailable(_) => (
                StatusCode::SERVICE_UNAVAILABLE,
                "StorageUnavailable",
                "Storage temporarily unavailable, retry later".to_string(), // Don't leak details
            ),
            EngineError::NotificationDispatchFailed(_)
            | EngineError::Internal(_)
            | EngineError::Io(_) => (
                StatusCode::INTERNAL_SERVER_ERROR,
                "InternalServerError",
                "Internal server error".to_string(),
            ),
        };

        let body = Json(ErrorResponse {
            error: error_code.to_string(),
            message,
        });

        (status, body).into_response()
    }
}

/// Result type alias for engine operations
pub type EngineResult<T> = Result<T, EngineError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_decline_reasons() {
        assert_eq!(
            EngineError::DuplicateDecision("x".into()).decline_reason(),
            Some(DeclineReason::DuplicateDecision)
        );
        assert_eq!(
            EngineError::QuotaExceeded { used: 1, allowance: 1 }.decline_reason(),
            Some(DeclineReason::QuotaExceeded)
        );
        assert_eq!(EngineError::InvalidActor("self".into()).decline_reason(), None);
    }

    #[test]
    fn test_status_mapping() {
        let resp = EngineError::NotFound("user".into()).into_response();
        assert_eq!(resp.status(), StatusCode::NOT_FOUND);

        let resp = EngineError::StorageUnavailable(sqlx::Error::PoolTimedOut).into_response();
        assert_eq!(resp.status(), StatusCode::SERVICE_UNAVAILABLE);

        let resp = EngineError::RateLimitExceeded.into_response();
        assert_eq!(resp.status(), StatusCode::TOO_MANY_REQUESTS);
    }
}
