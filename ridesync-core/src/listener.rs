//! Transition observers.

use crate::context::RideContext;
use crate::engine::TransitionResult;
use crate::event::EventKind;
use crate::state::RideState;
use crate::table::RideTransition;

/// Pre-registered observer notified at each phase of event processing.
///
/// The listener list is append-only during engine setup and is never mutated
/// concurrently with dispatch.
pub trait RideListener: Send + Sync {
    /// A transition is about to be attempted.
    fn on_transition_attempt(&self, _state: RideState, _event: EventKind) {}

    /// A transition succeeded.
    fn on_transition(
        &self,
        _from: RideState,
        _to: RideState,
        _context: &RideContext,
        _transition: &RideTransition,
    ) {
    }

    /// The ride state changed (fires after `on_transition`).
    fn on_state_changed(&self, _from: RideState, _to: RideState) {}

    /// Event processing failed; carries the failure kind. Partially-updated
    /// contexts are never exposed here.
    fn on_transition_failed(&self, _result: &TransitionResult) {}
}
