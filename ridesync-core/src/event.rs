//! Actor-attributed ride events.

use crate::context::PaymentMethod;
use serde::{Deserialize, Serialize};
use std::fmt;

/// What a `RevealLocation` payload describes.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum LocationKind {
    PrecisePickup,
    Destination,
    DriverPosition,
}

/// An input that may drive a transition, attributed to the acting party.
///
/// Encrypted fields (`pin_encrypted`, `preimage_encrypted`, ...) are opaque
/// ciphertext; the transport collaborator decrypts before or after this core
/// sees them, never inside it.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum RideEvent {
    /// Driver accepts the offer, publishing its claim wallet key.
    Accept {
        pubkey: String,
        wallet_pubkey: Option<String>,
        mint_url: Option<String>,
        payment_method: Option<PaymentMethod>,
    },
    /// Rider confirms the driver; the confirmation id becomes the canonical
    /// ride key.
    Confirm {
        pubkey: String,
        confirmation_id: String,
        precise_pickup: Option<String>,
        escrow_token: Option<String>,
        payment_hash: Option<String>,
    },
    StartRoute {
        pubkey: String,
    },
    Arrive {
        pubkey: String,
    },
    SubmitPin {
        pubkey: String,
        pin_encrypted: String,
    },
    VerifyPin {
        pubkey: String,
        verified: bool,
        attempt: u32,
    },
    StartRide {
        pubkey: String,
    },
    Complete {
        pubkey: String,
        final_fare: Option<u64>,
    },
    Cancel {
        pubkey: String,
        reason: Option<String>,
    },
    SharePreimage {
        pubkey: String,
        preimage_encrypted: String,
        escrow_token_encrypted: Option<String>,
    },
    BridgeComplete {
        pubkey: String,
        preimage: String,
        amount: u64,
        fees: u64,
    },
    RevealLocation {
        pubkey: String,
        kind: LocationKind,
        encrypted: String,
    },
    ConfirmationTimeout {
        pubkey: String,
    },
    PinTimeout {
        pubkey: String,
    },
}

impl RideEvent {
    /// The acting party's public key.
    pub fn pubkey(&self) -> &str {
        match self {
            RideEvent::Accept { pubkey, .. }
            | RideEvent::Confirm { pubkey, .. }
            | RideEvent::StartRoute { pubkey }
            | RideEvent::Arrive { pubkey }
            | RideEvent::SubmitPin { pubkey, .. }
            | RideEvent::VerifyPin { pubkey, .. }
            | RideEvent::StartRide { pubkey }
            | RideEvent::Complete { pubkey, .. }
            | RideEvent::Cancel { pubkey, .. }
            | RideEvent::SharePreimage { pubkey, .. }
            | RideEvent::BridgeComplete { pubkey, .. }
            | RideEvent::RevealLocation { pubkey, .. }
            | RideEvent::ConfirmationTimeout { pubkey }
            | RideEvent::PinTimeout { pubkey } => pubkey,
        }
    }

    /// The transition-table lookup tag for this event.
    pub fn kind(&self) -> EventKind {
        match self {
            RideEvent::Accept { .. } => EventKind::Accept,
            RideEvent::Confirm { .. } => EventKind::Confirm,
            RideEvent::StartRoute { .. } => EventKind::StartRoute,
            RideEvent::Arrive { .. } => EventKind::Arrive,
            RideEvent::SubmitPin { .. } => EventKind::SubmitPin,
            RideEvent::VerifyPin { .. } => EventKind::VerifyPin,
            RideEvent::StartRide { .. } => EventKind::StartRide,
            RideEvent::Complete { .. } => EventKind::Complete,
            RideEvent::Cancel { .. } => EventKind::Cancel,
            RideEvent::SharePreimage { .. } => EventKind::SharePreimage,
            RideEvent::BridgeComplete { .. } => EventKind::BridgeComplete,
            RideEvent::RevealLocation { .. } => EventKind::RevealLocation,
            RideEvent::ConfirmationTimeout { .. } => EventKind::ConfirmationTimeout,
            RideEvent::PinTimeout { .. } => EventKind::PinTimeout,
        }
    }
}

/// Stable event tags, used as transition-table lookup keys.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum EventKind {
    Accept,
    Confirm,
    StartRoute,
    Arrive,
    SubmitPin,
    VerifyPin,
    StartRide,
    Complete,
    Cancel,
    SharePreimage,
    BridgeComplete,
    RevealLocation,
    ConfirmationTimeout,
    PinTimeout,
}

impl EventKind {
    /// Stable string tag.
    pub fn as_str(&self) -> &'static str {
        match self {
            EventKind::Accept => "accept",
            EventKind::Confirm => "confirm",
            EventKind::StartRoute => "start_route",
            EventKind::Arrive => "arrive",
            EventKind::SubmitPin => "submit_pin",
            EventKind::VerifyPin => "verify_pin",
            EventKind::StartRide => "start_ride",
            EventKind::Complete => "complete",
            EventKind::Cancel => "cancel",
            EventKind::SharePreimage => "share_preimage",
            EventKind::BridgeComplete => "bridge_complete",
            EventKind::RevealLocation => "reveal_location",
            EventKind::ConfirmationTimeout => "confirmation_timeout",
            EventKind::PinTimeout => "pin_timeout",
        }
    }
}

impl fmt::Display for EventKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}
