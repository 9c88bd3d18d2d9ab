//! Generator error types.

use thiserror::Error;

pub type GeneratorResult<T> = Result<T, GeneratorError>;

#[derive(Debug, Error)]
pub enum GeneratorError {
    #[error("Configuration error: {0}")]
    Config(String),

    #[error("Request failed: {0}")]
    Request(#[from] reqwest::Error),

    #[error("API returned {status}: {message}")]
    Api { status: u16, message: String },

    #[error("Invalid response: {0}")]
    InvalidResponse(String),

    /// The generator explicitly refused or failed the job.
    #[error("Generation rejected: {0}")]
    Rejected(String),
}

impl GeneratorError {
    pub fn config(msg: impl Into<String>) -> Self {
        Self::Config(msg.into())
    }

    pub fn invalid_response(msg: impl Into<String>) -> Self {
        Self::InvalidResponse(msg.into())
    }

    pub fn rejected(msg: impl Into<String>) -> Self {
        Self::Rejected(msg.into())
    }

    /// Network faults and 429/5xx responses; everything else is final.
    pub fn is_transient(&self) -> bool {
        match self {
            Self::Request(e) => e.is_timeout() || e.is_connect() || e.is_request(),
            Self::Api { status, .. } => *status == 429 || *status >= 500,
            _ => false,
        }
    }
}
