//! Error types and handling
//!
//! Error taxonomy shared by the capture and recording pipeline.

use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Pipeline error type
///
/// Cloneable so a session can keep the error that terminated it and hand
/// copies to every caller that asks.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum RecorderError {
    #[error("No live audio track available to mix")]
    NoAudioSource,

    #[error("Surface unavailable: {0}")]
    SurfaceUnavailable(String),

    #[error("None of the preferred formats is supported: {0:?}")]
    UnsupportedFormat(Vec<String>),

    #[error("Cannot {operation} while {state}")]
    InvalidState {
        operation: &'static str,
        state: String,
    },

    #[error("Chunk buffer is closed")]
    BufferClosed,

    #[error("Source ended unexpectedly: {0}")]
    SourceEnded(String),

    #[error("Encoder error: {0}")]
    Encoder(String),

    #[error("Platform error: {0}")]
    Platform(String),

    #[error("Invalid configuration: {0}")]
    InvalidConfig(String),
}

impl RecorderError {
    pub fn invalid_state(operation: &'static str, state: impl ToString) -> Self {
        Self::InvalidState {
            operation,
            state: state.to_string(),
        }
    }
}

/// Error response for a UI layer
#[derive(Debug, Serialize, Deserialize)]
pub struct ErrorResponse {
    pub code: String,
    pub message: String,
}

impl From<RecorderError> for ErrorResponse {
    fn from(error: RecorderError) -> Self {
        let code = match &error {
            RecorderError::NoAudioSource => "NO_AUDIO_SOURCE",
            RecorderError::SurfaceUnavailable(_) => "SURFACE_UNAVAILABLE",
            RecorderError::UnsupportedFormat(_) => "UNSUPPORTED_FORMAT",
            RecorderError::InvalidState { .. } => "INVALID_STATE",
            RecorderError::BufferClosed => "BUFFER_CLOSED",
            RecorderError::SourceEnded(_) => "SOURCE_ENDED",
            RecorderError::Encoder(_) => "ENCODER_ERROR",
            RecorderError::Platform(_) => "PLATFORM_ERROR",
            RecorderError::InvalidConfig(_) => "INVALID_CONFIG",
        };

        ErrorResponse {
            code: code.to_string(),
            message: error.to_string(),
        }
    }
}

/// Result type alias using RecorderError
pub type RecorderResult<T> = Result<T, RecorderError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_error_response_codes() {
        let response = ErrorResponse::from(RecorderError::NoAudioSource);
        assert_eq!(response.code, "NO_AUDIO_SOURCE");

        let response = ErrorResponse::from(RecorderError::invalid_state("stop", "idle"));
        assert_eq!(response.code, "INVALID_STATE");
        assert_eq!(response.message, "Cannot stop while idle");
    }

    #[test]
    fn test_unsupported_format_lists_candidates() {
        let error = RecorderError::UnsupportedFormat(vec!["video/webm".to_string()]);
        assert!(error.to_string().contains("video/webm"));
    }
}
