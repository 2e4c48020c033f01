//! Transition guards.
//!
//! Guards are pure, synchronous predicates over `(context, event)`. They are
//! enum-keyed rather than looked up by name, so a transition can never
//! reference a guard that does not exist; the string name survives only for
//! diagnostics and audit logs.

use crate::context::RideContext;
use crate::event::RideEvent;

/// The closed set of guards the transition table may reference.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Guard {
    /// The acting party is the rider.
    IsRider,
    /// The acting party is the assigned driver.
    IsDriver,
    /// The acting party is anyone but the rider (rejects self-acceptance).
    IsNotRider,
    /// The acting party is one of the two participants.
    IsRiderOrDriver,
    /// A successful PIN verification, before the brute-force limit.
    IsPinVerified,
    /// A failed PIN verification that exhausts the attempt budget.
    IsPinBruteForce,
    /// The driver acting after the PIN has been verified.
    IsDriverAndPinVerified,
    /// Escrow has been locked.
    HasEscrowLocked,
    /// Escrow is claimable (locked, preimage and token known).
    CanSettle,
    /// Both parties use the same mint.
    IsSameMint,
}

impl Guard {
    /// Stable snake_case name for diagnostics.
    pub fn name(&self) -> &'static str {
        match self {
            Guard::IsRider => "is_rider",
            Guard::IsDriver => "is_driver",
            Guard::IsNotRider => "is_not_rider",
            Guard::IsRiderOrDriver => "is_rider_or_driver",
            Guard::IsPinVerified => "is_pin_verified",
            Guard::IsPinBruteForce => "is_pin_brute_force",
            Guard::IsDriverAndPinVerified => "is_driver_and_pin_verified",
            Guard::HasEscrowLocked => "has_escrow_locked",
            Guard::CanSettle => "can_settle",
            Guard::IsSameMint => "is_same_mint",
        }
    }

    /// Evaluates the guard. Pure and non-blocking.
    pub fn evaluate(&self, ctx: &RideContext, event: &RideEvent) -> bool {
        match self {
            Guard::IsRider => event.pubkey() == ctx.rider_pubkey,
            Guard::IsDriver => ctx.driver_pubkey.as_deref() == Some(event.pubkey()),
            Guard::IsNotRider => event.pubkey() != ctx.rider_pubkey,
            Guard::IsRiderOrDriver => {
                Guard::IsRider.evaluate(ctx, event) || Guard::IsDriver.evaluate(ctx, event)
            }
            Guard::IsPinVerified => {
                matches!(event, RideEvent::VerifyPin { verified: true, .. })
                    && !ctx.is_pin_brute_force_limit_reached()
            }
            Guard::IsPinBruteForce => match event {
                RideEvent::VerifyPin {
                    verified: false,
                    attempt,
                    ..
                } => *attempt >= ctx.max_pin_attempts,
                _ => false,
            },
            Guard::IsDriverAndPinVerified => {
                Guard::IsDriver.evaluate(ctx, event) && ctx.pin_verified
            }
            Guard::HasEscrowLocked => ctx.escrow_locked,
            Guard::CanSettle => ctx.can_settle(),
            Guard::IsSameMint => ctx.is_same_mint(),
        }
    }

    /// Human-readable explanation for a rejection, built from context and
    /// event. Surfaced to callers and audit logs, never swallowed.
    pub fn reason(&self, ctx: &RideContext, event: &RideEvent) -> String {
        match self {
            Guard::IsRider => format!("'{}' is not the rider for this ride", event.pubkey()),
            Guard::IsDriver => format!(
                "'{}' is not the assigned driver for this ride",
                event.pubkey()
            ),
            Guard::IsNotRider => {
                "riders cannot accept their own offer".to_string()
            }
            Guard::IsRiderOrDriver => format!(
                "'{}' is not a participant in this ride",
                event.pubkey()
            ),
            Guard::IsPinVerified => {
                if ctx.is_pin_brute_force_limit_reached() {
                    format!(
                        "pin attempt limit of {} already reached",
                        ctx.max_pin_attempts
                    )
                } else {
                    "pin verification did not succeed".to_string()
                }
            }
            Guard::IsPinBruteForce => format!(
                "failed attempts have not reached the limit of {}",
                ctx.max_pin_attempts
            ),
            Guard::IsDriverAndPinVerified => {
                if ctx.pin_verified {
                    format!("'{}' is not the assigned driver", event.pubkey())
                } else {
                    "pin has not been verified yet".to_string()
                }
            }
            Guard::HasEscrowLocked => "escrow has not been locked".to_string(),
            Guard::CanSettle => {
                "escrow is not claimable: requires lock, preimage and token".to_string()
            }
            Guard::IsSameMint => "rider and driver mints differ or are unknown".to_string(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::context::RideContext;
    use proptest::prelude::*;

    fn ctx_with_driver() -> RideContext {
        RideContext::new("rider-pk", "offer-1").with_driver("driver-pk", None, None, None)
    }

    fn cancel(pubkey: &str) -> RideEvent {
        RideEvent::Cancel {
            pubkey: pubkey.to_string(),
            reason: None,
        }
    }

    #[test]
    fn test_identity_guards() {
        let ctx = ctx_with_driver();

        assert!(Guard::IsRider.evaluate(&ctx, &cancel("rider-pk")));
        assert!(!Guard::IsRider.evaluate(&ctx, &cancel("driver-pk")));

        assert!(Guard::IsDriver.evaluate(&ctx, &cancel("driver-pk")));
        assert!(!Guard::IsDriver.evaluate(&ctx, &cancel("rider-pk")));

        assert!(Guard::IsRiderOrDriver.evaluate(&ctx, &cancel("rider-pk")));
        assert!(Guard::IsRiderOrDriver.evaluate(&ctx, &cancel("driver-pk")));
        assert!(!Guard::IsRiderOrDriver.evaluate(&ctx, &cancel("stranger")));
    }

    #[test]
    fn test_is_driver_fails_before_assignment() {
        let ctx = RideContext::new("rider-pk", "offer-1");
        assert!(!Guard::IsDriver.evaluate(&ctx, &cancel("driver-pk")));
    }

    #[test]
    fn test_self_acceptance_rejected() {
        let ctx = RideContext::new("rider-pk", "offer-1");
        let accept = RideEvent::Accept {
            pubkey: "rider-pk".to_string(),
            wallet_pubkey: None,
            mint_url: None,
            payment_method: None,
        };
        assert!(!Guard::IsNotRider.evaluate(&ctx, &accept));
    }

    #[test]
    fn test_pin_verified_guard() {
        let ctx = ctx_with_driver();
        let ok = RideEvent::VerifyPin {
            pubkey: "rider-pk".to_string(),
            verified: true,
            attempt: 1,
        };
        let failed = RideEvent::VerifyPin {
            pubkey: "rider-pk".to_string(),
            verified: false,
            attempt: 1,
        };
        assert!(Guard::IsPinVerified.evaluate(&ctx, &ok));
        assert!(!Guard::IsPinVerified.evaluate(&ctx, &failed));

        // Once the limit is reached, even a "successful" verification is
        // rejected.
        let exhausted = ctx.with_pin_attempt(3);
        assert!(!Guard::IsPinVerified.evaluate(&exhausted, &ok));
    }

    #[test]
    fn test_brute_force_threshold() {
        let ctx = ctx_with_driver();
        for attempt in [1u32, 2] {
            let event = RideEvent::VerifyPin {
                pubkey: "rider-pk".to_string(),
                verified: false,
                attempt,
            };
            assert!(!Guard::IsPinBruteForce.evaluate(&ctx, &event));
        }
        let third = RideEvent::VerifyPin {
            pubkey: "rider-pk".to_string(),
            verified: false,
            attempt: 3,
        };
        assert!(Guard::IsPinBruteForce.evaluate(&ctx, &third));
    }

    #[test]
    fn test_driver_and_pin_verified() {
        let ctx = ctx_with_driver();
        let start = RideEvent::StartRide {
            pubkey: "driver-pk".to_string(),
        };
        assert!(!Guard::IsDriverAndPinVerified.evaluate(&ctx, &start));
        assert!(Guard::IsDriverAndPinVerified.evaluate(&ctx.with_pin_verified(), &start));
    }

    #[test]
    fn test_reasons_are_informative() {
        let ctx = ctx_with_driver();
        let event = cancel("stranger");
        let reason = Guard::IsRiderOrDriver.reason(&ctx, &event);
        assert!(reason.contains("stranger"));
    }

    proptest! {
        // The two VerifyPin guards must be mutually exclusive on any
        // reachable context: a verification is never both a success and a
        // brute-force trip.
        #[test]
        fn prop_verify_pin_guards_mutually_exclusive(
            verified in any::<bool>(),
            attempt in 0u32..10,
            prior_attempts in 0u32..10,
            max in 1u32..6,
        ) {
            let mut ctx = RideContext::new("rider-pk", "offer-1")
                .with_driver("driver-pk", None, None, None)
                .with_pin_attempt(prior_attempts);
            ctx.max_pin_attempts = max;

            let event = RideEvent::VerifyPin {
                pubkey: "rider-pk".to_string(),
                verified,
                attempt,
            };

            let success = Guard::IsPinVerified.evaluate(&ctx, &event);
            let brute = Guard::IsPinBruteForce.evaluate(&ctx, &event);
            prop_assert!(!(success && brute));
        }
    }
}
