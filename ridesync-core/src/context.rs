//! Immutable ride context.
//!
//! A [`RideContext`] is created once per ride at offer time and replaced
//! (never mutated in place) on every accepted transition. The copy-on-write
//! discipline is what makes per-ride serialization sufficient without
//! field-level locking.

use crate::event::LocationKind;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::time::Duration;

/// Default number of PIN attempts before the brute-force guard trips.
pub const DEFAULT_MAX_PIN_ATTEMPTS: u32 = 3;

/// Default confirmation timeout.
pub const DEFAULT_CONFIRMATION_TIMEOUT: Duration = Duration::from_secs(30);

/// Default PIN verification timeout.
pub const DEFAULT_PIN_TIMEOUT: Duration = Duration::from_secs(30);

/// A participant role in a ride.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Role {
    Rider,
    Driver,
}

impl Role {
    pub fn as_str(&self) -> &'static str {
        match self {
            Role::Rider => "rider",
            Role::Driver => "driver",
        }
    }
}

/// Payment method tag carried through the protocol.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum PaymentMethod {
    /// Ecash token escrow on a shared or bridged mint.
    Ecash,
    /// Direct Lightning invoice settlement.
    Lightning,
}

/// Snapshot of all ride facts consulted by guards, actions, and projections.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RideContext {
    // Participants
    pub rider_pubkey: String,
    pub driver_pubkey: Option<String>,
    /// The party attributed as originator of the current action.
    pub inputter_pubkey: String,

    // Identifiers
    pub offer_id: String,
    pub acceptance_id: Option<String>,
    /// Canonical ride key once assigned at confirmation.
    pub confirmation_id: Option<String>,

    // Location
    pub approx_pickup: Option<String>,
    /// Revealed post-confirmation; ciphertext handled by the transport.
    pub precise_pickup: Option<String>,
    pub destination: Option<String>,
    /// Latest position update shared by the driver.
    pub driver_position: Option<String>,

    // Payment
    pub fare_estimate: Option<u64>,
    pub final_fare: Option<u64>,
    pub payment_hash: Option<String>,
    /// Driver key used for escrow claims, distinct from the identity key.
    pub driver_wallet_pubkey: Option<String>,
    pub rider_mint_url: Option<String>,
    pub driver_mint_url: Option<String>,
    pub payment_method: Option<PaymentMethod>,
    pub escrow_locked: bool,
    pub escrow_token: Option<String>,
    pub preimage: Option<String>,

    // PIN verification
    pub pin: Option<String>,
    pub pin_attempts: u32,
    pub pin_verified: bool,
    pub max_pin_attempts: u32,

    // Timing
    pub created_at: DateTime<Utc>,
    pub accepted_at: Option<DateTime<Utc>>,
    pub confirmed_at: Option<DateTime<Utc>>,
    pub confirmation_timeout: Duration,
    pub pin_timeout: Duration,

    // Cancellation
    pub cancel_reason: Option<String>,
    pub cancelled_by: Option<Role>,
}

impl RideContext {
    /// Creates the initial context at offer time.
    pub fn new(rider_pubkey: impl Into<String>, offer_id: impl Into<String>) -> Self {
        let rider_pubkey = rider_pubkey.into();
        Self {
            inputter_pubkey: rider_pubkey.clone(),
            rider_pubkey,
            driver_pubkey: None,
            offer_id: offer_id.into(),
            acceptance_id: None,
            confirmation_id: None,
            approx_pickup: None,
            precise_pickup: None,
            destination: None,
            driver_position: None,
            fare_estimate: None,
            final_fare: None,
            payment_hash: None,
            driver_wallet_pubkey: None,
            rider_mint_url: None,
            driver_mint_url: None,
            payment_method: None,
            escrow_locked: false,
            escrow_token: None,
            preimage: None,
            pin: None,
            pin_attempts: 0,
            pin_verified: false,
            max_pin_attempts: DEFAULT_MAX_PIN_ATTEMPTS,
            created_at: Utc::now(),
            accepted_at: None,
            confirmed_at: None,
            confirmation_timeout: DEFAULT_CONFIRMATION_TIMEOUT,
            pin_timeout: DEFAULT_PIN_TIMEOUT,
            cancel_reason: None,
            cancelled_by: None,
        }
    }

    // =========================================================================
    // Copy-on-write builders
    // =========================================================================

    /// Returns a copy attributed to the given acting party.
    pub fn with_inputter(&self, pubkey: impl Into<String>) -> Self {
        Self {
            inputter_pubkey: pubkey.into(),
            ..self.clone()
        }
    }

    /// Returns a copy with offer-time ride facts filled in.
    pub fn with_offer(
        &self,
        fare_estimate: u64,
        approx_pickup: impl Into<String>,
        destination: impl Into<String>,
    ) -> Self {
        Self {
            fare_estimate: Some(fare_estimate),
            approx_pickup: Some(approx_pickup.into()),
            destination: Some(destination.into()),
            ..self.clone()
        }
    }

    /// Returns a copy with the rider-side mint endpoint.
    pub fn with_rider_mint(&self, mint_url: impl Into<String>) -> Self {
        Self {
            rider_mint_url: Some(mint_url.into()),
            ..self.clone()
        }
    }

    /// Returns a copy with the rider-established payment hash.
    pub fn with_payment_hash(&self, payment_hash: impl Into<String>) -> Self {
        Self {
            payment_hash: Some(payment_hash.into()),
            ..self.clone()
        }
    }

    /// Returns a copy with driver identity, wallet and mint merged in,
    /// stamped as accepted now.
    pub fn with_driver(
        &self,
        driver_pubkey: impl Into<String>,
        wallet_pubkey: Option<String>,
        mint_url: Option<String>,
        payment_method: Option<PaymentMethod>,
    ) -> Self {
        Self {
            driver_pubkey: Some(driver_pubkey.into()),
            driver_wallet_pubkey: wallet_pubkey,
            driver_mint_url: mint_url,
            payment_method: payment_method.or(self.payment_method),
            accepted_at: Some(Utc::now()),
            ..self.clone()
        }
    }

    /// Returns a copy with confirmation facts merged in and escrow marked
    /// locked, stamped as confirmed now.
    pub fn with_confirmation(
        &self,
        confirmation_id: impl Into<String>,
        precise_pickup: Option<String>,
        escrow_token: Option<String>,
        payment_hash: Option<String>,
    ) -> Self {
        Self {
            confirmation_id: Some(confirmation_id.into()),
            precise_pickup: precise_pickup.or_else(|| self.precise_pickup.clone()),
            escrow_locked: true,
            escrow_token: escrow_token.or_else(|| self.escrow_token.clone()),
            payment_hash: payment_hash.or_else(|| self.payment_hash.clone()),
            confirmed_at: Some(Utc::now()),
            ..self.clone()
        }
    }

    /// Returns a copy with the revealed location merged in.
    pub fn with_location(&self, kind: LocationKind, value: impl Into<String>) -> Self {
        let value = Some(value.into());
        let mut next = self.clone();
        match kind {
            LocationKind::PrecisePickup => next.precise_pickup = value,
            LocationKind::Destination => next.destination = value,
            LocationKind::DriverPosition => next.driver_position = value,
        }
        next
    }

    /// Returns a copy with the revealed escrow token merged in.
    pub fn with_escrow_token(&self, token: impl Into<String>) -> Self {
        Self {
            escrow_token: Some(token.into()),
            ..self.clone()
        }
    }

    /// Returns a copy with the verification PIN set.
    pub fn with_pin(&self, pin: impl Into<String>) -> Self {
        Self {
            pin: Some(pin.into()),
            ..self.clone()
        }
    }

    /// Returns a copy with the attempt counter advanced to `attempt`.
    pub fn with_pin_attempt(&self, attempt: u32) -> Self {
        Self {
            pin_attempts: attempt.max(self.pin_attempts),
            ..self.clone()
        }
    }

    /// Returns a copy with the PIN marked verified.
    pub fn with_pin_verified(&self) -> Self {
        Self {
            pin_verified: true,
            ..self.clone()
        }
    }

    /// Returns a copy with the settlement preimage revealed.
    pub fn with_preimage(&self, preimage: impl Into<String>) -> Self {
        Self {
            preimage: Some(preimage.into()),
            ..self.clone()
        }
    }

    /// Returns a copy with the final fare recorded.
    pub fn with_final_fare(&self, final_fare: u64) -> Self {
        Self {
            final_fare: Some(final_fare),
            ..self.clone()
        }
    }

    /// Returns a copy recording who cancelled and why.
    pub fn with_cancellation(&self, reason: Option<String>, cancelled_by: Option<Role>) -> Self {
        Self {
            cancel_reason: reason,
            cancelled_by,
            ..self.clone()
        }
    }

    // =========================================================================
    // Derived predicates
    // =========================================================================

    /// Returns true if the current inputter is the rider.
    pub fn is_inputter_rider(&self) -> bool {
        self.inputter_pubkey == self.rider_pubkey
    }

    /// Returns true if the current inputter is the assigned driver.
    pub fn is_inputter_driver(&self) -> bool {
        self.driver_pubkey.as_deref() == Some(self.inputter_pubkey.as_str())
    }

    /// Returns true if the current inputter is either participant.
    pub fn is_inputter_participant(&self) -> bool {
        self.is_inputter_rider() || self.is_inputter_driver()
    }

    /// Returns true if both mint endpoints are known and equal.
    pub fn is_same_mint(&self) -> bool {
        match (&self.rider_mint_url, &self.driver_mint_url) {
            (Some(r), Some(d)) => r == d,
            _ => false,
        }
    }

    /// Returns true once the failed-attempt counter has reached the limit.
    pub fn is_pin_brute_force_limit_reached(&self) -> bool {
        self.pin_attempts >= self.max_pin_attempts
    }

    /// Returns true if the escrow is claimable: locked, preimage known,
    /// token present.
    pub fn can_settle(&self) -> bool {
        self.escrow_locked && self.preimage.is_some() && self.escrow_token.is_some()
    }

    /// Returns the role of the given pubkey within this ride, if any.
    pub fn role_of(&self, pubkey: &str) -> Option<Role> {
        if pubkey == self.rider_pubkey {
            Some(Role::Rider)
        } else if self.driver_pubkey.as_deref() == Some(pubkey) {
            Some(Role::Driver)
        } else {
            None
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn base() -> RideContext {
        RideContext::new("rider-pk", "offer-1")
    }

    #[test]
    fn test_new_defaults() {
        let ctx = base();
        assert_eq!(ctx.inputter_pubkey, "rider-pk");
        assert_eq!(ctx.max_pin_attempts, DEFAULT_MAX_PIN_ATTEMPTS);
        assert_eq!(ctx.confirmation_timeout, DEFAULT_CONFIRMATION_TIMEOUT);
        assert!(!ctx.escrow_locked);
        assert!(ctx.is_inputter_rider());
        assert!(!ctx.is_inputter_driver());
    }

    #[test]
    fn test_with_driver_assigns_identity_and_wallet() {
        let ctx = base().with_driver(
            "driver-pk",
            Some("wallet-pk".to_string()),
            Some("https://mint.a".to_string()),
            Some(PaymentMethod::Ecash),
        );
        assert_eq!(ctx.driver_pubkey.as_deref(), Some("driver-pk"));
        assert_eq!(ctx.driver_wallet_pubkey.as_deref(), Some("wallet-pk"));
        assert!(ctx.accepted_at.is_some());
        assert_eq!(ctx.role_of("driver-pk"), Some(Role::Driver));
        assert_eq!(ctx.role_of("rider-pk"), Some(Role::Rider));
        assert_eq!(ctx.role_of("stranger"), None);
    }

    #[test]
    fn test_can_settle_roundtrip() {
        let ctx = base()
            .with_confirmation("conf-1", None, Some("token".to_string()), None)
            .with_preimage("p");
        assert!(ctx.can_settle());
    }

    #[test]
    fn test_can_settle_requires_all_three() {
        let locked_only = base().with_confirmation("conf-1", None, None, None);
        assert!(!locked_only.can_settle());

        let no_preimage = base().with_confirmation("conf-1", None, Some("t".to_string()), None);
        assert!(!no_preimage.can_settle());

        let unlocked = base().with_preimage("p");
        assert!(!unlocked.can_settle());
    }

    #[test]
    fn test_same_mint() {
        let ctx = base();
        assert!(!ctx.is_same_mint());

        let ctx = ctx.with_rider_mint("https://mint.a").with_driver(
            "d",
            None,
            Some("https://mint.a".to_string()),
            None,
        );
        assert!(ctx.is_same_mint());

        let cross = base().with_rider_mint("https://mint.a").with_driver(
            "d",
            None,
            Some("https://mint.b".to_string()),
            None,
        );
        assert!(!cross.is_same_mint());
    }

    #[test]
    fn test_pin_attempt_counter_never_regresses() {
        let ctx = base().with_pin_attempt(2).with_pin_attempt(1);
        assert_eq!(ctx.pin_attempts, 2);
        assert!(!ctx.is_pin_brute_force_limit_reached());
        assert!(ctx.with_pin_attempt(3).is_pin_brute_force_limit_reached());
    }

    #[test]
    fn test_with_location_merges_by_kind() {
        let ctx = base()
            .with_location(LocationKind::PrecisePickup, "enc:pickup")
            .with_location(LocationKind::Destination, "enc:dest")
            .with_location(LocationKind::DriverPosition, "enc:pos-1")
            .with_location(LocationKind::DriverPosition, "enc:pos-2");
        assert_eq!(ctx.precise_pickup.as_deref(), Some("enc:pickup"));
        assert_eq!(ctx.destination.as_deref(), Some("enc:dest"));
        assert_eq!(ctx.driver_position.as_deref(), Some("enc:pos-2"));
    }

    #[test]
    fn test_copy_on_write_leaves_original_untouched() {
        let ctx = base();
        let updated = ctx.with_preimage("p").with_pin("1234");
        assert!(ctx.preimage.is_none());
        assert!(ctx.pin.is_none());
        assert_eq!(updated.preimage.as_deref(), Some("p"));
        assert_eq!(updated.pin.as_deref(), Some("1234"));
    }
}
