//! Negotiation message kinds.
//!
//! These are the byte payloads the relay transport carries before a ride has
//! a replaceable state stream: offer, acceptance, confirmation, and the
//! standalone cancellation notice. Sensitive fields travel as
//! [`EncryptedPayload`] ciphertext; encryption and decryption happen in the
//! transport collaborator, never here.

use chrono::{DateTime, Utc};
use ridesync_core::{PaymentMethod, Role};
use serde::{Deserialize, Serialize};
use std::fmt;
use uuid::Uuid;

/// Opaque per-recipient ciphertext.
///
/// `Debug` is redacted so ciphertext (and accidentally-unencrypted content)
/// never lands in logs.
#[derive(Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct EncryptedPayload(String);

impl EncryptedPayload {
    pub fn new(ciphertext: impl Into<String>) -> Self {
        Self(ciphertext.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }

    pub fn into_inner(self) -> String {
        self.0
    }
}

impl fmt::Debug for EncryptedPayload {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "EncryptedPayload(<{} bytes>)", self.0.len())
    }
}

/// How the escrow is realized.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum EscrowType {
    /// Same-mint HTLC token.
    Htlc,
    /// Cross-mint settlement through a Lightning bridge.
    LightningBridge,
}

/// Rider → drivers: a ride is wanted.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RideOffer {
    pub id: String,
    pub rider_pubkey: String,
    /// Sats.
    pub fare_estimate: u64,
    /// Coarse location, precise pickup is withheld until confirmation.
    pub approx_pickup: String,
    pub destination: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub payment_method: Option<PaymentMethod>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub rider_mint_url: Option<String>,
    pub created_at: DateTime<Utc>,
}

impl RideOffer {
    pub fn new(
        rider_pubkey: impl Into<String>,
        fare_estimate: u64,
        approx_pickup: impl Into<String>,
        destination: impl Into<String>,
    ) -> Self {
        Self {
            id: Uuid::new_v4().to_string(),
            rider_pubkey: rider_pubkey.into(),
            fare_estimate,
            approx_pickup: approx_pickup.into(),
            destination: destination.into(),
            payment_method: None,
            rider_mint_url: None,
            created_at: Utc::now(),
        }
    }

    pub fn with_payment(mut self, method: PaymentMethod, mint_url: Option<String>) -> Self {
        self.payment_method = Some(method);
        self.rider_mint_url = mint_url;
        self
    }
}

/// Driver → rider: offer accepted, claim key published.
///
/// `wallet_pubkey` is the escrow claim key, deliberately distinct from the
/// driver's identity key so funds are never locked to the protocol identity.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RideAcceptance {
    pub id: String,
    pub offer_id: String,
    pub driver_pubkey: String,
    pub wallet_pubkey: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub mint_url: Option<String>,
    pub escrow_type: EscrowType,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub escrow_expiry: Option<DateTime<Utc>>,
    pub created_at: DateTime<Utc>,
}

impl RideAcceptance {
    pub fn new(
        offer_id: impl Into<String>,
        driver_pubkey: impl Into<String>,
        wallet_pubkey: impl Into<String>,
        escrow_type: EscrowType,
    ) -> Self {
        Self {
            id: Uuid::new_v4().to_string(),
            offer_id: offer_id.into(),
            driver_pubkey: driver_pubkey.into(),
            wallet_pubkey: wallet_pubkey.into(),
            mint_url: None,
            escrow_type,
            escrow_expiry: None,
            created_at: Utc::now(),
        }
    }
}

/// Rider → driver: driver confirmed, escrow locked.
///
/// This message's id becomes the canonical ride key; both parties key their
/// replaceable state streams by it.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RideConfirmation {
    pub id: String,
    pub offer_id: String,
    pub acceptance_id: String,
    pub rider_pubkey: String,
    pub precise_pickup: EncryptedPayload,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub payment_hash: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub escrow_token: Option<EncryptedPayload>,
    pub created_at: DateTime<Utc>,
}

impl RideConfirmation {
    pub fn new(
        offer_id: impl Into<String>,
        acceptance_id: impl Into<String>,
        rider_pubkey: impl Into<String>,
        precise_pickup: EncryptedPayload,
    ) -> Self {
        Self {
            id: Uuid::new_v4().to_string(),
            offer_id: offer_id.into(),
            acceptance_id: acceptance_id.into(),
            rider_pubkey: rider_pubkey.into(),
            precise_pickup,
            payment_hash: None,
            escrow_token: None,
            created_at: Utc::now(),
        }
    }

    pub fn with_escrow(
        mut self,
        payment_hash: impl Into<String>,
        escrow_token: Option<EncryptedPayload>,
    ) -> Self {
        self.payment_hash = Some(payment_hash.into());
        self.escrow_token = escrow_token;
        self
    }
}

/// Either party → the other: the ride is off.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RideCancellation {
    /// The canonical ride key, or the offer id if cancellation happens
    /// before confirmation.
    pub ride_id: String,
    pub pubkey: String,
    pub cancelled_by: Role,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub reason: Option<String>,
    pub created_at: DateTime<Utc>,
}

impl RideCancellation {
    pub fn new(ride_id: impl Into<String>, pubkey: impl Into<String>, cancelled_by: Role) -> Self {
        Self {
            ride_id: ride_id.into(),
            pubkey: pubkey.into(),
            cancelled_by,
            reason: None,
            created_at: Utc::now(),
        }
    }

    pub fn with_reason(mut self, reason: impl Into<String>) -> Self {
        self.reason = Some(reason.into());
        self
    }
}
