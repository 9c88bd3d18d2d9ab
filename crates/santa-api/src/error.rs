//! API error types.

use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use axum::Json;
use serde::Serialize;
use thiserror::Error;

use santa_pipeline::PipelineError;

pub type ApiResult<T> = Result<T, ApiError>;

#[derive(Debug, Error)]
pub enum ApiError {
    #[error("Unauthorized: {0}")]
    Unauthorized(String),

    #[error("Forbidden: {0}")]
    Forbidden(String),

    #[error("Not found: {0}")]
    NotFound(String),

    #[error("Bad request: {0}")]
    BadRequest(String),

    #[error("Validation error: {0}")]
    Validation(String),

    #[error("Invalid transition: {0}")]
    InvalidTransition(String),

    #[error("Conflict: {0}")]
    Conflict(String),

    #[error("Rate limited")]
    RateLimited,

    #[error("External generation failed: {0}")]
    ExternalGeneration(String),

    #[error("Timed out: {0}")]
    Timeout(String),

    #[error("Storage error: {0}")]
    Storage(String),

    #[error("Internal error: {0}")]
    Internal(String),
}

impl ApiError {
    pub fn unauthorized(msg: impl Into<String>) -> Self {
        Self::Unauthorized(msg.into())
    }

    pub fn forbidden(msg: impl Into<String>) -> Self {
        Self::Forbidden(msg.into())
    }

    pub fn not_found(msg: impl Into<String>) -> Self {
        Self::NotFound(msg.into())
    }

    pub fn bad_request(msg: impl Into<String>) -> Self {
        Self::BadRequest(msg.into())
    }

    pub fn internal(msg: impl Into<String>) -> Self {
        Self::Internal(msg.into())
    }

    pub fn status_code(&self) -> StatusCode {
        match self {
            ApiError::Unauthorized(_) => StatusCode::UNAUTHORIZED,
            ApiError::Forbidden(_) => StatusCode::FORBIDDEN,
            ApiError::NotFound(_) => StatusCode::NOT_FOUND,
            ApiError::BadRequest(_) | ApiError::Validation(_) => StatusCode::BAD_REQUEST,
            ApiError::InvalidTransition(_) | ApiError::Conflict(_) => StatusCode::CONFLICT,
            ApiError::RateLimited => StatusCode::TOO_MANY_REQUESTS,
            ApiError::ExternalGeneration(_) => StatusCode::BAD_GATEWAY,
            ApiError::Timeout(_) => StatusCode::GATEWAY_TIMEOUT,
            ApiError::Storage(_) | ApiError::Internal(_) => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }

    /// Stable machine-readable code for clients.
    pub fn code(&self) -> &'static str {
        match self {
            ApiError::Unauthorized(_) => "unauthorized",
            ApiError::Forbidden(_) => "forbidden",
            ApiError::NotFound(_) => "not_found",
            ApiError::BadRequest(_) => "bad_request",
            ApiError::Validation(_) => "validation_error",
            ApiError::InvalidTransition(_) => "invalid_transition",
            ApiError::Conflict(_) => "conflict",
            ApiError::RateLimited => "rate_limited",
            ApiError::ExternalGeneration(_) => "external_generation_failure",
            ApiError::Timeout(_) => "timeout",
            ApiError::Storage(_) => "storage_failure",
            ApiError::Internal(_) => "internal",
        }
    }

    fn is_internal(&self) -> bool {
        matches!(self, ApiError::Internal(_) | ApiError::Storage(_))
    }
}

impl From<PipelineError> for ApiError {
    fn from(err: PipelineError) -> Self {
        let msg = err.to_string();
        match err {
            PipelineError::Validation(_) => ApiError::Validation(msg),
            PipelineError::NotFound(_) => ApiError::NotFound(msg),
            PipelineError::Unauthorized(_) => ApiError::Forbidden(msg),
            PipelineError::InvalidTransition { .. } => ApiError::InvalidTransition(msg),
            PipelineError::Conflict(_) => ApiError::Conflict(msg),
            PipelineError::ExternalGeneration { .. } => ApiError::ExternalGeneration(msg),
            PipelineError::Timeout(_) => ApiError::Timeout(msg),
            PipelineError::Storage(_)
            | PipelineError::Persistence(_)
            | PipelineError::SegmentFetchFailed { .. } => ApiError::Storage(msg),
            PipelineError::Media(_) | PipelineError::Io(_) => ApiError::Internal(msg),
        }
    }
}

#[derive(Serialize)]
struct ErrorResponse {
    detail: String,
    code: &'static str,
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let status = self.status_code();

        // Don't expose internal error details in production
        let detail = if self.is_internal()
            && std::env::var("ENVIRONMENT").unwrap_or_default() == "production"
        {
            "An internal error occurred".to_string()
        } else {
            self.to_string()
        };

        let body = ErrorResponse {
            detail,
            code: self.code(),
        };

        (status, Json(body)).into_response()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use santa_models::{OrderId, OrderStatus};

    #[test]
    fn test_pipeline_errors_map_to_http() {
        let id = OrderId::from_string("order-1234");
        let cases = [
            (PipelineError::validation("bad"), StatusCode::BAD_REQUEST),
            (PipelineError::NotFound(id.clone()), StatusCode::NOT_FOUND),
            (PipelineError::Unauthorized(id.clone()), StatusCode::FORBIDDEN),
            (
                PipelineError::InvalidTransition {
                    from: OrderStatus::Complete,
                    to: OrderStatus::Paid,
                },
                StatusCode::CONFLICT,
            ),
            (PipelineError::Conflict(id), StatusCode::CONFLICT),
            (
                PipelineError::ExternalGeneration {
                    stage: "script",
                    message: "quota".into(),
                },
                StatusCode::BAD_GATEWAY,
            ),
            (PipelineError::Timeout("scene 1".into()), StatusCode::GATEWAY_TIMEOUT),
            (
                PipelineError::Persistence("write lost".into()),
                StatusCode::INTERNAL_SERVER_ERROR,
            ),
        ];

        for (err, status) in cases {
            assert_eq!(ApiError::from(err).status_code(), status);
        }
    }

    #[test]
    fn test_invalid_transition_code() {
        let err = ApiError::from(PipelineError::InvalidTransition {
            from: OrderStatus::Complete,
            to: OrderStatus::Paid,
        });
        assert_eq!(err.code(), "invalid_transition");
    }
}
