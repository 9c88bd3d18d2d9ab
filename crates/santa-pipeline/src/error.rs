//! Pipeline error types.

use santa_firestore::{FirestoreError, UpdateError};
use santa_generators::GeneratorError;
use santa_media::MediaError;
use santa_models::{ModelError, OrderId, OrderStatus};
use santa_storage::StorageError;
use thiserror::Error;

pub type PipelineResult<T> = Result<T, PipelineError>;

#[derive(Debug, Error)]
pub enum PipelineError {
    #[error("Validation failed: {0}")]
    Validation(String),

    #[error("Order not found: {0}")]
    NotFound(OrderId),

    #[error("Not authorized for order {0}")]
    Unauthorized(OrderId),

    #[error("{stage} generation failed: {message}")]
    ExternalGeneration { stage: &'static str, message: String },

    #[error("{0} timed out")]
    Timeout(String),

    #[error("Storage failed: {0}")]
    Storage(#[from] StorageError),

    #[error("Invalid transition from {from} to {to}")]
    InvalidTransition { from: OrderStatus, to: OrderStatus },

    #[error("Segment fetch failed for order {order} ({url}): {reason}")]
    SegmentFetchFailed {
        order: OrderId,
        url: String,
        reason: String,
    },

    #[error("Stitch already in progress for order {0}")]
    Conflict(OrderId),

    #[error("Media processing failed: {0}")]
    Media(#[from] MediaError),

    #[error("Order persistence failed: {0}")]
    Persistence(String),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

impl PipelineError {
    pub fn validation(msg: impl Into<String>) -> Self {
        Self::Validation(msg.into())
    }

    pub fn generation(stage: &'static str, err: GeneratorError) -> Self {
        Self::ExternalGeneration {
            stage,
            message: err.to_string(),
        }
    }

    /// Errors that describe the request rather than a failed run; they must
    /// not mark the order failed.
    pub fn is_caller_error(&self) -> bool {
        matches!(
            self,
            Self::Validation(_)
                | Self::NotFound(_)
                | Self::Unauthorized(_)
                | Self::InvalidTransition { .. }
                | Self::Conflict(_)
        )
    }
}

impl From<ModelError> for PipelineError {
    fn from(err: ModelError) -> Self {
        match err {
            ModelError::InvalidTransition { from, to } => Self::InvalidTransition { from, to },
            ModelError::Validation(msg) => Self::Validation(msg),
        }
    }
}

impl From<FirestoreError> for PipelineError {
    fn from(err: FirestoreError) -> Self {
        Self::Persistence(err.to_string())
    }
}

impl From<UpdateError> for PipelineError {
    fn from(err: UpdateError) -> Self {
        match err {
            UpdateError::NotFound(id) => Self::NotFound(id),
            UpdateError::Rejected(model) => model.into(),
            UpdateError::Store(store) => store.into(),
            contended @ UpdateError::Contended { .. } => Self::Persistence(contended.to_string()),
        }
    }
}
