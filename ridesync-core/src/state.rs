//! Ride lifecycle states.

use serde::{Deserialize, Serialize};
use std::fmt;

/// The closed set of states a ride moves through.
///
/// `Completed` and `Cancelled` are terminal: no transition row may use them
/// as a source, which is asserted by
/// [`validate_transition_table`](crate::table::validate_transition_table).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RideState {
    /// Offer published, no driver yet.
    Created,
    /// A driver accepted the offer.
    Accepted,
    /// Rider confirmed the driver and locked escrow.
    Confirmed,
    /// Driver announced route start.
    EnRoute,
    /// Driver arrived at the pickup point.
    Arrived,
    /// PIN verified, ride underway.
    InProgress,
    /// Ride finished and settled.
    Completed,
    /// Ride cancelled by either party or by timeout.
    Cancelled,
}

impl RideState {
    /// Stable wire tag for this state.
    pub fn as_str(&self) -> &'static str {
        match self {
            RideState::Created => "created",
            RideState::Accepted => "accepted",
            RideState::Confirmed => "confirmed",
            RideState::EnRoute => "en_route",
            RideState::Arrived => "arrived",
            RideState::InProgress => "in_progress",
            RideState::Completed => "completed",
            RideState::Cancelled => "cancelled",
        }
    }

    /// Parses a wire tag back into a state.
    pub fn from_str_tag(s: &str) -> Option<Self> {
        match s {
            "created" => Some(RideState::Created),
            "accepted" => Some(RideState::Accepted),
            "confirmed" => Some(RideState::Confirmed),
            "en_route" => Some(RideState::EnRoute),
            "arrived" => Some(RideState::Arrived),
            "in_progress" => Some(RideState::InProgress),
            "completed" => Some(RideState::Completed),
            "cancelled" => Some(RideState::Cancelled),
            _ => None,
        }
    }

    /// Returns true if no transitions may leave this state.
    pub fn is_terminal(&self) -> bool {
        matches!(self, RideState::Completed | RideState::Cancelled)
    }
}

impl fmt::Display for RideState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}
