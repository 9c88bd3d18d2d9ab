//! Firestore error types.

use thiserror::Error;

/// Result type for Firestore operations.
pub type FirestoreResult<T> = Result<T, FirestoreError>;

/// Errors that can occur during Firestore operations.
#[derive(Debug, Error)]
pub enum FirestoreError {
    #[error("Authentication failed: {0}")]
    AuthError(String),

    #[error("Document not found: {0}")]
    NotFound(String),

    #[error("Document already exists: {0}")]
    AlreadyExists(String),

    #[error("Permission denied: {0}")]
    PermissionDenied(String),

    #[error("Request failed ({status}): {message}")]
    Http { status: u16, message: String },

    #[error("Request failed: {0}")]
    RequestFailed(String),

    #[error("Invalid response: {0}")]
    InvalidResponse(String),

    #[error("Serialization error: {0}")]
    SerializationError(String),

    #[error("Rate limited, retry after {0}ms")]
    RateLimited(u64),

    #[error("Network error: {0}")]
    Network(#[from] reqwest::Error),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("Precondition failed: {0}")]
    PreconditionFailed(String),
}

impl FirestoreError {
    pub fn auth_error(msg: impl Into<String>) -> Self {
        Self::AuthError(msg.into())
    }

    pub fn not_found(path: impl Into<String>) -> Self {
        Self::NotFound(path.into())
    }

    pub fn request_failed(msg: impl Into<String>) -> Self {
        Self::RequestFailed(msg.into())
    }

    pub fn serialization(msg: impl Into<String>) -> Self {
        Self::SerializationError(msg.into())
    }

    /// Map a non-success HTTP status to an error.
    pub fn from_http_status(status: u16, message: String) -> Self {
        match status {
            401 => Self::AuthError(message),
            403 => Self::PermissionDenied(message),
            404 => Self::NotFound(message),
            409 => Self::AlreadyExists(message),
            412 => Self::PreconditionFailed(message),
            429 => Self::RateLimited(1000),
            _ => Self::Http { status, message },
        }
    }

    /// HTTP status equivalent, used for request metrics.
    pub fn http_status(&self) -> Option<u16> {
        match self {
            FirestoreError::AuthError(_) => Some(401),
            FirestoreError::PermissionDenied(_) => Some(403),
            FirestoreError::NotFound(_) => Some(404),
            FirestoreError::AlreadyExists(_) => Some(409),
            FirestoreError::PreconditionFailed(_) => Some(412),
            FirestoreError::RateLimited(_) => Some(429),
            FirestoreError::Http { status, .. } => Some(*status),
            FirestoreError::Network(e) => e.status().map(|s| s.as_u16()),
            _ => None,
        }
    }

    /// Delay requested by the server, if any.
    pub fn retry_after_ms(&self) -> Option<u64> {
        match self {
            FirestoreError::RateLimited(ms) => Some(*ms),
            _ => None,
        }
    }

    /// Check if error is retryable.
    pub fn is_retryable(&self) -> bool {
        match self {
            FirestoreError::Network(_) | FirestoreError::RateLimited(_) => true,
            FirestoreError::Http { status, .. } => *status >= 500,
            _ => false,
        }
    }

    /// True if the error was caused by a failed precondition (e.g., updateTime mismatch).
    pub fn is_precondition_failed(&self) -> bool {
        matches!(self, FirestoreError::PreconditionFailed(_))
            || matches!(
                self,
                FirestoreError::Http { message, .. }
                if message.contains("FAILED_PRECONDITION")
            )
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_from_http_status() {
        assert!(matches!(
            FirestoreError::from_http_status(412, "x".into()),
            FirestoreError::PreconditionFailed(_)
        ));
        assert!(FirestoreError::from_http_status(503, "x".into()).is_retryable());
        assert!(!FirestoreError::from_http_status(400, "x".into()).is_retryable());
        assert_eq!(
            FirestoreError::from_http_status(429, "x".into()).retry_after_ms(),
            Some(1000)
        );
    }

    #[test]
    fn test_precondition_detection() {
        let err = FirestoreError::Http {
            status: 400,
            message: "FAILED_PRECONDITION: the stored version does not match".into(),
        };
        assert!(err.is_precondition_failed());
        assert_eq!(err.http_status(), Some(400));
    }
}
