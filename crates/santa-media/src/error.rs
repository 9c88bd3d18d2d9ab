//! Error types for media operations.

use std::path::PathBuf;
use thiserror::Error;

/// Result type for media operations.
pub type MediaResult<T> = Result<T, MediaError>;

/// Errors that can occur while invoking FFmpeg.
#[derive(Debug, Error)]
pub enum MediaError {
    #[error("FFmpeg not found in PATH")]
    FfmpegNotFound,

    #[error("FFmpeg command failed: {message}")]
    FfmpegFailed {
        message: String,
        stderr: Option<String>,
        exit_code: Option<i32>,
    },

    #[error("FFprobe not found in PATH")]
    FfprobeNotFound,

    #[error("FFprobe failed: {message}")]
    FfprobeFailed {
        message: String,
        stderr: Option<String>,
    },

    #[error("Invalid video: {0}")]
    InvalidVideo(String),

    #[error("File not found: {0}")]
    FileNotFound(PathBuf),

    #[error("No input segments supplied")]
    NoInputs,

    #[error("Operation timed out after {0} seconds")]
    Timeout(u64),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),
}

impl MediaError {
    /// Create an FFmpeg failure error.
    pub fn ffmpeg_failed(
        message: impl Into<String>,
        stderr: Option<String>,
        exit_code: Option<i32>,
    ) -> Self {
        Self::FfmpegFailed {
            message: message.into(),
            stderr,
            exit_code,
        }
    }

    /// Last non-empty stderr line, if FFmpeg produced any.
    pub fn stderr_tail(&self) -> Option<&str> {
        match self {
            Self::FfmpegFailed {
                stderr: Some(stderr),
                ..
            } => stderr.lines().rev().find(|l| !l.trim().is_empty()),
            _ => None,
        }
    }
}
