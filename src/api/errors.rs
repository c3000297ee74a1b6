//! API error responses.
//!
//! Engine failures map one-to-one onto stable machine-readable codes with
//! appropriate HTTP statuses. Validation and conflict outcomes keep their
//! messages; integrity and internal failures are logged with full context
//! and reach the caller as a generic 500.

use crate::errors::EngineError;
use axum::{
    http::StatusCode,
    response::{IntoResponse, Response},
    Json,
};
use serde::{Deserialize, Serialize};
use std::fmt;

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ErrorResponse {
    pub request_id: String,
    pub error: ErrorBody,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ErrorBody {
    /// Stable code (INVALID_STAKE, SESSION_ACTIVE, RATE_LIMITED, ...).
    pub code: String,
    pub message: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub details: Option<serde_json::Value>,
}

#[derive(Debug)]
pub struct ApiError {
    pub status: StatusCode,
    pub code: String,
    pub message: String,
    pub details: Option<serde_json::Value>,
    pub request_id: String,
}

impl ApiError {
    pub fn from_engine(request_id: String, err: EngineError) -> Self {
        let code = err.code().to_string();
        let (status, message, details) = match &err {
            EngineError::InvalidStake { .. }
            | EngineError::InvalidField(_)
            | EngineError::AlreadyRevealed(_)
            | EngineError::InsufficientBalance { .. } => {
                (StatusCode::BAD_REQUEST, err.to_string(), None)
            }
            EngineError::SessionActive => (StatusCode::CONFLICT, err.to_string(), None),
            EngineError::NoActiveGame | EngineError::NoActiveSeed => {
                (StatusCode::NOT_FOUND, err.to_string(), None)
            }
            EngineError::FeatureDisabled(_) => {
                (StatusCode::SERVICE_UNAVAILABLE, err.to_string(), None)
            }
            EngineError::RateLimited { retry_after_ms } => (
                StatusCode::TOO_MANY_REQUESTS,
                err.to_string(),
                Some(serde_json::json!({ "retry_after_ms": retry_after_ms })),
            ),
            EngineError::Integrity(_) | EngineError::Store(_) | EngineError::Internal(_) => {
                tracing::error!(request_id = %request_id, error = %err, "engine failure");
                (
                    StatusCode::INTERNAL_SERVER_ERROR,
                    "internal error".to_string(),
                    None,
                )
            }
        };
        Self {
            status,
            code,
            message,
            details,
            request_id,
        }
    }

    pub fn unauthorized(request_id: String) -> Self {
        Self {
            status: StatusCode::UNAUTHORIZED,
            code: "UNAUTHORIZED".to_string(),
            message: "missing or malformed x-user-id header".to_string(),
            details: None,
            request_id,
        }
    }

    pub fn bad_request(request_id: String, message: String) -> Self {
        Self {
            status: StatusCode::BAD_REQUEST,
            code: "BAD_REQUEST".to_string(),
            message,
            details: None,
            request_id,
        }
    }

    pub fn not_found(request_id: String, message: String) -> Self {
        Self {
            status: StatusCode::NOT_FOUND,
            code: "NOT_FOUND".to_string(),
            message,
            details: None,
            request_id,
        }
    }
}

impl fmt::Display for ApiError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "[{}] {}: {}", self.request_id, self.code, self.message)
    }
}

impl std::error::Error for ApiError {}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let body = Json(ErrorResponse {
            request_id: self.request_id,
            error: ErrorBody {
                code: self.code,
                message: self.message,
                details: self.details,
            },
        });
        (self.status, body).into_response()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::money::Amount;

    #[test]
    fn engine_errors_map_to_statuses_and_codes() {
        let err = ApiError::from_engine("rid".into(), EngineError::SessionActive);
        assert_eq!(err.status, StatusCode::CONFLICT);
        assert_eq!(err.code, "SESSION_ACTIVE");

        let err = ApiError::from_engine(
            "rid".into(),
            EngineError::RateLimited { retry_after_ms: 120 },
        );
        assert_eq!(err.status, StatusCode::TOO_MANY_REQUESTS);
        assert_eq!(
            err.details,
            Some(serde_json::json!({ "retry_after_ms": 120 }))
        );

        let err = ApiError::from_engine(
            "rid".into(),
            EngineError::InsufficientBalance {
                needed: Amount::from_minor(100),
                available: Amount::from_minor(50),
            },
        );
        assert_eq!(err.status, StatusCode::BAD_REQUEST);
    }

    #[test]
    fn internal_failures_never_leak_detail() {
        let err = ApiError::from_engine(
            "rid".into(),
            EngineError::Integrity("corrupt row at session:open:mines:1".into()),
        );
        assert_eq!(err.status, StatusCode::INTERNAL_SERVER_ERROR);
        assert_eq!(err.code, "INTEGRITY_ERROR");
        assert_eq!(err.message, "internal error");
    }
}
