//! HTLC escrow settlement tracking.
//!
//! The payment hash is committed by the rider before locking funds; the
//! driver publishes a claim key (distinct from its identity key) at
//! acceptance; the rider locks the HTLC to that key only after acceptance
//! and reveals the preimage only after PIN verification, which is the
//! economic proof that pickup occurred. The actual fund movement is the
//! application's job; this tracker records what is known and answers
//! "claimable or refundable".

use crate::error::ReconcileError;
use ridesync_core::{RideContext, Role};
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};

/// Where the escrowed funds go after a cancellation.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SettlementOutcome {
    /// Funds return to the rider.
    RefundRider,
    /// The driver already holds the preimage and may still claim.
    DriverMayClaim,
}

/// Cross-mint settlement facts carried by a `bridge_complete` record.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct BridgeSettlement {
    pub preimage: String,
    pub amount: u64,
    pub fees: u64,
}

/// Driver-recorded escrow claim facts.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SettlementClaim {
    pub amount: Option<u64>,
    pub fees: Option<u64>,
}

/// Cross-mint deposit invoice shared by the driver.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DepositInvoice {
    pub invoice: String,
    pub mint_url: Option<String>,
}

/// Accumulated escrow state for one ride.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct EscrowSettlement {
    pub payment_hash: Option<String>,
    /// Driver's escrow claim key.
    pub claim_pubkey: Option<String>,
    pub escrow_token: Option<String>,
    pub preimage: Option<String>,
    pub escrow_locked: bool,
    pub pin_verified: bool,
    pub bridge: Option<BridgeSettlement>,
    /// Set once the driver records its escrow claim.
    pub claim: Option<SettlementClaim>,
    pub deposit_invoice: Option<DepositInvoice>,
}

impl EscrowSettlement {
    pub fn new() -> Self {
        Self::default()
    }

    /// Records the rider's pre-lock hash commitment.
    pub fn record_payment_hash(&mut self, payment_hash: impl Into<String>) {
        self.payment_hash = Some(payment_hash.into());
    }

    /// Records the driver's claim key from the acceptance message.
    pub fn record_claim_key(&mut self, claim_pubkey: impl Into<String>) {
        self.claim_pubkey = Some(claim_pubkey.into());
    }

    /// Records the escrow lock from the confirmation.
    pub fn record_lock(&mut self, escrow_token: Option<String>) {
        self.escrow_locked = true;
        if escrow_token.is_some() {
            self.escrow_token = escrow_token;
        }
    }

    /// Records successful PIN verification.
    pub fn record_pin_verified(&mut self) {
        self.pin_verified = true;
    }

    /// Records the revealed preimage, verifying it against the committed
    /// payment hash when one is known.
    pub fn record_preimage(&mut self, preimage: impl Into<String>) -> Result<(), ReconcileError> {
        let preimage = preimage.into();
        if let Some(hash) = &self.payment_hash {
            if !preimage_matches(&preimage, hash) {
                return Err(ReconcileError::PreimageMismatch);
            }
        }
        self.preimage = Some(preimage);
        Ok(())
    }

    /// Records a Lightning-bridge completion for cross-mint settlement.
    pub fn record_bridge(&mut self, bridge: BridgeSettlement) -> Result<(), ReconcileError> {
        if let Some(hash) = &self.payment_hash {
            if !preimage_matches(&bridge.preimage, hash) {
                return Err(ReconcileError::PreimageMismatch);
            }
        }
        self.preimage = Some(bridge.preimage.clone());
        self.bridge = Some(bridge);
        Ok(())
    }

    /// Records the driver's escrow claim.
    pub fn record_claim(&mut self, amount: Option<u64>, fees: Option<u64>) {
        self.claim = Some(SettlementClaim { amount, fees });
    }

    /// Records a deposit invoice shared for cross-mint top-up.
    pub fn record_deposit_invoice(&mut self, invoice: impl Into<String>, mint_url: Option<String>) {
        self.deposit_invoice = Some(DepositInvoice {
            invoice: invoice.into(),
            mint_url,
        });
    }

    /// True once the driver has recorded its claim.
    pub fn is_claimed(&self) -> bool {
        self.claim.is_some()
    }

    /// Mirrors settlement-relevant facts from a post-transition context.
    pub fn sync_from_context(&mut self, ctx: &RideContext) {
        if let Some(hash) = &ctx.payment_hash {
            self.payment_hash = Some(hash.clone());
        }
        if let Some(key) = &ctx.driver_wallet_pubkey {
            self.claim_pubkey = Some(key.clone());
        }
        if ctx.escrow_locked {
            self.escrow_locked = true;
        }
        if let Some(token) = &ctx.escrow_token {
            self.escrow_token = Some(token.clone());
        }
        if ctx.pin_verified {
            self.pin_verified = true;
        }
        if let Some(preimage) = &ctx.preimage {
            self.preimage = Some(preimage.clone());
        }
    }

    /// True once the escrow is claimable: locked, preimage and token known.
    pub fn can_claim(&self) -> bool {
        self.escrow_locked && self.preimage.is_some() && self.escrow_token.is_some()
    }

    /// Where the funds go if the ride is cancelled now.
    ///
    /// Driver-initiated cancellation always refunds the rider. A rider
    /// cancelling after PIN verification has already revealed the preimage,
    /// so the driver may still claim.
    pub fn cancellation_outcome(&self, cancelled_by: Role) -> SettlementOutcome {
        match cancelled_by {
            Role::Driver => SettlementOutcome::RefundRider,
            Role::Rider => {
                if self.pin_verified {
                    SettlementOutcome::DriverMayClaim
                } else {
                    SettlementOutcome::RefundRider
                }
            }
        }
    }
}

/// Checks `sha256(preimage) == payment_hash` with hex comparison.
pub fn preimage_matches(preimage: &str, payment_hash: &str) -> bool {
    let digest = Sha256::digest(preimage.as_bytes());
    hex::encode(digest).eq_ignore_ascii_case(payment_hash)
}

#[cfg(test)]
mod tests {
    use super::*;

    const PREIMAGE: &str = "ride-preimage";

    fn hash_of(preimage: &str) -> String {
        hex::encode(Sha256::digest(preimage.as_bytes()))
    }

    #[test]
    fn test_preimage_verification() {
        let hash = hash_of(PREIMAGE);
        assert!(preimage_matches(PREIMAGE, &hash));
        assert!(preimage_matches(PREIMAGE, &hash.to_uppercase()));
        assert!(!preimage_matches("wrong", &hash));
    }

    #[test]
    fn test_record_preimage_rejects_mismatch() {
        let mut settlement = EscrowSettlement::new();
        settlement.record_payment_hash(hash_of(PREIMAGE));

        assert!(matches!(
            settlement.record_preimage("wrong"),
            Err(ReconcileError::PreimageMismatch)
        ));
        assert!(settlement.preimage.is_none());

        settlement.record_preimage(PREIMAGE).unwrap();
        assert_eq!(settlement.preimage.as_deref(), Some(PREIMAGE));
    }

    #[test]
    fn test_can_claim_requires_lock_preimage_and_token() {
        let mut settlement = EscrowSettlement::new();
        settlement.record_payment_hash(hash_of(PREIMAGE));
        assert!(!settlement.can_claim());

        settlement.record_lock(Some("token".to_string()));
        assert!(!settlement.can_claim());

        settlement.record_preimage(PREIMAGE).unwrap();
        assert!(settlement.can_claim());
    }

    #[test]
    fn test_bridge_settlement_cross_mint() {
        let mut settlement = EscrowSettlement::new();
        settlement.record_payment_hash(hash_of(PREIMAGE));
        settlement.record_lock(Some("token".to_string()));

        settlement
            .record_bridge(BridgeSettlement {
                preimage: PREIMAGE.to_string(),
                amount: 21_000,
                fees: 42,
            })
            .unwrap();

        assert!(settlement.can_claim());
        assert_eq!(settlement.bridge.as_ref().unwrap().fees, 42);
    }

    #[test]
    fn test_claim_and_deposit_invoice_records() {
        let mut settlement = EscrowSettlement::new();
        assert!(!settlement.is_claimed());

        settlement.record_claim(Some(21_000), Some(10));
        settlement.record_deposit_invoice("lnbc210n1...", Some("https://mint.b".to_string()));

        assert!(settlement.is_claimed());
        assert_eq!(settlement.claim.as_ref().unwrap().amount, Some(21_000));
        assert_eq!(
            settlement.deposit_invoice.as_ref().unwrap().invoice,
            "lnbc210n1..."
        );
    }

    #[test]
    fn test_cancellation_policy_matrix() {
        let mut settlement = EscrowSettlement::new();

        // Before PIN verification: everyone refunds the rider.
        assert_eq!(
            settlement.cancellation_outcome(Role::Rider),
            SettlementOutcome::RefundRider
        );
        assert_eq!(
            settlement.cancellation_outcome(Role::Driver),
            SettlementOutcome::RefundRider
        );

        // After PIN verification the preimage is out: a rider cancellation
        // no longer blocks the driver's claim, a driver cancellation still
        // refunds.
        settlement.record_pin_verified();
        assert_eq!(
            settlement.cancellation_outcome(Role::Rider),
            SettlementOutcome::DriverMayClaim
        );
        assert_eq!(
            settlement.cancellation_outcome(Role::Driver),
            SettlementOutcome::RefundRider
        );
    }

    #[test]
    fn test_sync_from_context() {
        let ctx = ridesync_core::RideContext::new("rider-pk", "offer-1")
            .with_driver("driver-pk", Some("wallet-pk".to_string()), None, None)
            .with_confirmation("conf-1", None, Some("token".to_string()), Some(hash_of(PREIMAGE)))
            .with_preimage(PREIMAGE);

        let mut settlement = EscrowSettlement::new();
        settlement.sync_from_context(&ctx);

        assert_eq!(settlement.claim_pubkey.as_deref(), Some("wallet-pk"));
        assert!(settlement.escrow_locked);
        assert!(settlement.can_claim());
    }
}
