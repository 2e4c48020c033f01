//! Transition actions.
//!
//! Each action pairs a pure context update with a dispatch to the external
//! [`ActionHandler`] capability. The context update always runs first; with
//! no handler registered the action degrades to the pure update alone.

use crate::context::RideContext;
use crate::event::RideEvent;
use crate::handler::{ActionHandler, EffectOutcome};
use uuid::Uuid;

/// Result of executing an action.
#[derive(Debug, Clone, PartialEq)]
pub enum ActionResult {
    /// Context update applied, side effect (if any) completed.
    Success(RideContext),
    /// The side effect failed; the transition must not advance.
    Failure { error: String, recoverable: bool },
    /// The side effect is still pending; the transition advances and the
    /// caller reconciles the operation out of band.
    Async { operation_id: Uuid },
}

/// The closed set of actions the transition table may reference.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Action {
    /// Merge driver identity, wallet and mint into the context.
    AssignDriver,
    /// Merge confirmation facts and mark the escrow locked.
    LockEscrow,
    /// Record who cancelled and why, notify the application.
    NotifyCancellation,
    /// Record a timeout cancellation, notify the application.
    NotifyTimeout,
    /// Flip `pin_verified` and advance the attempt counter.
    StartRideAfterPin,
    /// Record the exhausted attempt budget, notify the application.
    NotifyPinBruteForce,
    /// Claim the escrow during ride completion.
    SettlePayment,
}

impl Action {
    /// Stable snake_case name for diagnostics.
    pub fn name(&self) -> &'static str {
        match self {
            Action::AssignDriver => "assign_driver",
            Action::LockEscrow => "lock_escrow",
            Action::NotifyCancellation => "notify_cancellation",
            Action::NotifyTimeout => "notify_timeout",
            Action::StartRideAfterPin => "start_ride_after_pin",
            Action::NotifyPinBruteForce => "notify_pin_brute_force",
            Action::SettlePayment => "settle_payment",
        }
    }

    /// The pure half: computes the replacement context for this action.
    ///
    /// `ctx` is expected to already carry the event's pubkey as inputter;
    /// the engine threads that through before calling.
    pub fn apply(&self, ctx: &RideContext, event: &RideEvent) -> RideContext {
        match (self, event) {
            (
                Action::AssignDriver,
                RideEvent::Accept {
                    pubkey,
                    wallet_pubkey,
                    mint_url,
                    payment_method,
                },
            ) => ctx.with_driver(
                pubkey.clone(),
                wallet_pubkey.clone(),
                mint_url.clone(),
                *payment_method,
            ),

            (
                Action::LockEscrow,
                RideEvent::Confirm {
                    confirmation_id,
                    precise_pickup,
                    escrow_token,
                    payment_hash,
                    ..
                },
            ) => ctx.with_confirmation(
                confirmation_id.clone(),
                precise_pickup.clone(),
                escrow_token.clone(),
                payment_hash.clone(),
            ),

            (Action::NotifyCancellation, RideEvent::Cancel { pubkey, reason }) => {
                ctx.with_cancellation(reason.clone(), ctx.role_of(pubkey))
            }

            (Action::NotifyTimeout, RideEvent::ConfirmationTimeout { .. }) => {
                ctx.with_cancellation(Some("confirmation timed out".to_string()), None)
            }
            (Action::NotifyTimeout, RideEvent::PinTimeout { .. }) => {
                ctx.with_cancellation(Some("pin verification timed out".to_string()), None)
            }

            (Action::StartRideAfterPin, RideEvent::VerifyPin { attempt, .. }) => {
                ctx.with_pin_attempt(*attempt).with_pin_verified()
            }

            (Action::NotifyPinBruteForce, RideEvent::VerifyPin { attempt, .. }) => ctx
                .with_pin_attempt(*attempt)
                .with_cancellation(Some("pin attempts exhausted".to_string()), None),

            (Action::SettlePayment, RideEvent::Complete { final_fare, .. }) => match final_fare {
                Some(fare) => ctx.with_final_fare(*fare),
                None => ctx.clone(),
            },

            // Table rows pair each action with the event kind that carries
            // its payload; any other pairing is a no-op update.
            _ => ctx.clone(),
        }
    }

    /// Runs the pure update, then dispatches to the handler.
    pub async fn execute(
        &self,
        ctx: &RideContext,
        event: &RideEvent,
        handler: Option<&dyn ActionHandler>,
    ) -> ActionResult {
        let updated = self.apply(ctx, event);

        let handler = match handler {
            Some(h) => h,
            None => return ActionResult::Success(updated),
        };

        match self {
            Action::AssignDriver => {
                handler.on_driver_assigned(&updated, event);
                ActionResult::Success(updated)
            }
            Action::NotifyCancellation => {
                handler.on_cancellation(&updated, event);
                ActionResult::Success(updated)
            }
            Action::NotifyTimeout => {
                handler.on_timeout(&updated, event);
                ActionResult::Success(updated)
            }
            Action::StartRideAfterPin => {
                handler.on_pin_verified(&updated, event);
                ActionResult::Success(updated)
            }
            Action::NotifyPinBruteForce => {
                handler.on_pin_brute_force(&updated, event);
                ActionResult::Success(updated)
            }
            Action::LockEscrow => {
                Self::from_outcome(handler.on_lock_escrow(&updated, event).await, updated)
            }
            Action::SettlePayment => {
                Self::from_outcome(handler.on_settle_payment(&updated, event).await, updated)
            }
        }
    }

    fn from_outcome(outcome: EffectOutcome, updated: RideContext) -> ActionResult {
        match outcome {
            EffectOutcome::Done => ActionResult::Success(updated),
            EffectOutcome::Failed { error, recoverable } => {
                ActionResult::Failure { error, recoverable }
            }
            EffectOutcome::Pending { operation_id } => ActionResult::Async { operation_id },
        }
    }
}
