//! Core error types.
//!
//! Expected protocol outcomes (invalid transition, guard rejection, action
//! failure) are values of [`TransitionResult`](crate::engine::TransitionResult),
//! not errors. `CoreError` covers configuration faults surfaced by the
//! startup table validation, which are fatal at startup/test time.

use crate::event::EventKind;
use crate::state::RideState;
use thiserror::Error;

/// Configuration errors from the transition table.
#[derive(Debug, Error)]
pub enum CoreError {
    #[error("terminal state '{state}' must not appear as a transition source")]
    TerminalStateSource { state: RideState },

    #[error("ambiguous transitions from '{state}' on '{event}': every competing row must be guarded")]
    UnguardedAmbiguity { state: RideState, event: EventKind },
}

impl CoreError {
    /// Stable error code for diagnostics.
    pub fn error_code(&self) -> &'static str {
        match self {
            CoreError::TerminalStateSource { .. } => "TERMINAL_STATE_SOURCE",
            CoreError::UnguardedAmbiguity { .. } => "UNGUARDED_AMBIGUITY",
        }
    }
}
