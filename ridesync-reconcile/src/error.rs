//! Reconciliation error types.

use ridesync_protocol::ProtocolError;
use thiserror::Error;

/// Errors from stream projection, cursor persistence, and settlement
/// tracking.
#[derive(Debug, Error)]
pub enum ReconcileError {
    #[error("envelope for ride '{actual}' fed to cursor bound to '{expected}'")]
    RideMismatch { expected: String, actual: String },

    #[error("ride not found: {confirmation_id}")]
    RideNotFound { confirmation_id: String },

    #[error("ride already exists: {confirmation_id}")]
    RideExists { confirmation_id: String },

    #[error("preimage does not hash to the committed payment hash")]
    PreimageMismatch,

    #[error("protocol error: {0}")]
    Protocol(#[from] ProtocolError),

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),
}

impl ReconcileError {
    /// Stable error code for diagnostics.
    pub fn error_code(&self) -> &'static str {
        match self {
            ReconcileError::RideMismatch { .. } => "RIDE_MISMATCH",
            ReconcileError::RideNotFound { .. } => "RIDE_NOT_FOUND",
            ReconcileError::RideExists { .. } => "RIDE_EXISTS",
            ReconcileError::PreimageMismatch => "PREIMAGE_MISMATCH",
            ReconcileError::Protocol(_) => "PROTOCOL_ERROR",
            ReconcileError::Io(_) => "IO_ERROR",
            ReconcileError::Json(_) => "BAD_PAYLOAD",
        }
    }
}
