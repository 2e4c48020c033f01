//! Protocol error types.

use thiserror::Error;

/// Errors from parsing or validating protocol messages.
#[derive(Debug, Error)]
pub enum ProtocolError {
    #[error("invalid status tag: '{tag}'")]
    InvalidStatus { tag: String },

    #[error("history is not append-only: previous length {previous}, new length {current}")]
    HistoryTruncated { previous: usize, current: usize },

    #[error("history diverged at index {index}")]
    HistoryDiverged { index: usize },

    #[error("envelope keyed by '{actual}' where '{expected}' was expected")]
    ConfirmationIdMismatch { expected: String, actual: String },

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),
}

impl ProtocolError {
    /// Stable error code for diagnostics.
    pub fn error_code(&self) -> &'static str {
        match self {
            ProtocolError::InvalidStatus { .. } => "INVALID_STATUS",
            ProtocolError::HistoryTruncated { .. } => "HISTORY_TRUNCATED",
            ProtocolError::HistoryDiverged { .. } => "HISTORY_DIVERGED",
            ProtocolError::ConfirmationIdMismatch { .. } => "CONFIRMATION_ID_MISMATCH",
            ProtocolError::Json(_) => "BAD_PAYLOAD",
        }
    }
}
