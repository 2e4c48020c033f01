//! The authoritative transition table.
//!
//! Rows are evaluated in list order; the first row whose guard passes wins.
//! Multiple rows for the same `(state, event)` pair are only legal when
//! their guards are mutually exclusive, e.g. the two `VerifyPin` rows from
//! `Arrived`. The success row is listed first so a successful verification
//! is never mis-classified as brute force.

use crate::action::Action;
use crate::error::CoreError;
use crate::event::EventKind;
use crate::guard::Guard;
use crate::state::RideState;
use std::collections::HashSet;

/// A static transition rule.
#[derive(Debug, Clone, PartialEq)]
pub struct RideTransition {
    pub from: RideState,
    pub event: EventKind,
    pub to: RideState,
    /// Absent means unconditional.
    pub guard: Option<Guard>,
    pub action: Option<Action>,
    pub description: &'static str,
}

/// The complete transition table.
pub static TRANSITIONS: &[RideTransition] = &[
    RideTransition {
        from: RideState::Created,
        event: EventKind::Accept,
        to: RideState::Accepted,
        guard: Some(Guard::IsNotRider),
        action: Some(Action::AssignDriver),
        description: "driver accepts the offer",
    },
    RideTransition {
        from: RideState::Created,
        event: EventKind::Cancel,
        to: RideState::Cancelled,
        guard: Some(Guard::IsRiderOrDriver),
        action: Some(Action::NotifyCancellation),
        description: "cancel before acceptance",
    },
    RideTransition {
        from: RideState::Created,
        event: EventKind::ConfirmationTimeout,
        to: RideState::Cancelled,
        guard: None,
        action: Some(Action::NotifyTimeout),
        description: "offer expired without acceptance",
    },
    RideTransition {
        from: RideState::Accepted,
        event: EventKind::Confirm,
        to: RideState::Confirmed,
        guard: Some(Guard::IsRider),
        action: Some(Action::LockEscrow),
        description: "rider confirms the driver and locks escrow",
    },
    RideTransition {
        from: RideState::Accepted,
        event: EventKind::Cancel,
        to: RideState::Cancelled,
        guard: Some(Guard::IsRiderOrDriver),
        action: Some(Action::NotifyCancellation),
        description: "cancel before confirmation",
    },
    RideTransition {
        from: RideState::Accepted,
        event: EventKind::ConfirmationTimeout,
        to: RideState::Cancelled,
        guard: None,
        action: Some(Action::NotifyTimeout),
        description: "acceptance expired without confirmation",
    },
    RideTransition {
        from: RideState::Confirmed,
        event: EventKind::StartRoute,
        to: RideState::EnRoute,
        guard: Some(Guard::IsDriver),
        action: None,
        description: "driver heads to pickup",
    },
    // Shortcut for drivers who never announce route start.
    RideTransition {
        from: RideState::Confirmed,
        event: EventKind::Arrive,
        to: RideState::Arrived,
        guard: Some(Guard::IsDriver),
        action: None,
        description: "driver arrives without announcing route start",
    },
    RideTransition {
        from: RideState::Confirmed,
        event: EventKind::Cancel,
        to: RideState::Cancelled,
        guard: Some(Guard::IsRiderOrDriver),
        action: Some(Action::NotifyCancellation),
        description: "cancel after confirmation",
    },
    RideTransition {
        from: RideState::EnRoute,
        event: EventKind::Arrive,
        to: RideState::Arrived,
        guard: Some(Guard::IsDriver),
        action: None,
        description: "driver arrives at pickup",
    },
    RideTransition {
        from: RideState::EnRoute,
        event: EventKind::Cancel,
        to: RideState::Cancelled,
        guard: Some(Guard::IsRiderOrDriver),
        action: Some(Action::NotifyCancellation),
        description: "cancel while en route",
    },
    RideTransition {
        from: RideState::Arrived,
        event: EventKind::VerifyPin,
        to: RideState::InProgress,
        guard: Some(Guard::IsPinVerified),
        action: Some(Action::StartRideAfterPin),
        description: "pin verified, ride starts",
    },
    RideTransition {
        from: RideState::Arrived,
        event: EventKind::VerifyPin,
        to: RideState::Cancelled,
        guard: Some(Guard::IsPinBruteForce),
        action: Some(Action::NotifyPinBruteForce),
        description: "pin attempts exhausted",
    },
    RideTransition {
        from: RideState::Arrived,
        event: EventKind::StartRide,
        to: RideState::InProgress,
        guard: Some(Guard::IsDriverAndPinVerified),
        action: None,
        description: "driver starts the verified ride",
    },
    RideTransition {
        from: RideState::Arrived,
        event: EventKind::Cancel,
        to: RideState::Cancelled,
        guard: Some(Guard::IsRiderOrDriver),
        action: Some(Action::NotifyCancellation),
        description: "cancel at pickup",
    },
    RideTransition {
        from: RideState::InProgress,
        event: EventKind::Complete,
        to: RideState::Completed,
        guard: Some(Guard::IsDriver),
        action: Some(Action::SettlePayment),
        description: "driver completes the ride and claims settlement",
    },
    RideTransition {
        from: RideState::InProgress,
        event: EventKind::Cancel,
        to: RideState::Cancelled,
        guard: Some(Guard::IsRiderOrDriver),
        action: Some(Action::NotifyCancellation),
        description: "cancel mid-ride",
    },
];

/// All rows matching `(state, event)`, in table order.
pub fn candidates(state: RideState, event: EventKind) -> Vec<&'static RideTransition> {
    TRANSITIONS
        .iter()
        .filter(|t| t.from == state && t.event == event)
        .collect()
}

/// All rows leaving `state`, in table order.
pub fn transitions_from(state: RideState) -> Vec<&'static RideTransition> {
    TRANSITIONS.iter().filter(|t| t.from == state).collect()
}

/// The distinct event kinds valid from `state`, in table order.
pub fn valid_events_from(state: RideState) -> Vec<EventKind> {
    let mut seen = HashSet::new();
    TRANSITIONS
        .iter()
        .filter(|t| t.from == state)
        .map(|t| t.event)
        .filter(|e| seen.insert(*e))
        .collect()
}

/// Static analysis of the table, run as a startup assertion.
///
/// Guard and action references are enum-keyed, so the unknown-name failure
/// class cannot occur; what remains to check is that no terminal state is a
/// transition source and that competing rows for one `(state, event)` pair
/// are all guarded.
pub fn validate_transition_table() -> Result<(), CoreError> {
    for t in TRANSITIONS {
        if t.from.is_terminal() {
            return Err(CoreError::TerminalStateSource { state: t.from });
        }
    }

    let mut seen_pairs = HashSet::new();
    for t in TRANSITIONS {
        seen_pairs.insert((t.from, t.event));
    }
    for (state, event) in seen_pairs {
        let group = candidates(state, event);
        if group.len() > 1 && group.iter().any(|t| t.guard.is_none()) {
            return Err(CoreError::UnguardedAmbiguity { state, event });
        }
    }

    Ok(())
}
