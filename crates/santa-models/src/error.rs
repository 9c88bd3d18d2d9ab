//! Model-level errors.

use thiserror::Error;

use crate::OrderStatus;

/// Errors raised by model constructors and state transitions.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ModelError {
    #[error("invalid transition from {from} to {to}")]
    InvalidTransition { from: OrderStatus, to: OrderStatus },

    #[error("validation error: {0}")]
    Validation(String),
}

impl ModelError {
    pub fn validation(msg: impl Into<String>) -> Self {
        Self::Validation(msg.into())
    }

    pub fn invalid_transition(from: OrderStatus, to: OrderStatus) -> Self {
        Self::InvalidTransition { from, to }
    }
}

pub type ModelResult<T> = Result<T, ModelError>;
