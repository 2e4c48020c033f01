//! Side-effect handler capability.
//!
//! The engine consumes this surface; the surrounding application implements
//! it (publish protocol messages, move funds, surface UI notifications).
//! Notification hooks are synchronous and cannot fail or block a transition.
//! Only `on_lock_escrow` and `on_settle_payment` perform externally-visible,
//! possibly-failing operations, so only they return a future.

use crate::context::RideContext;
use crate::event::RideEvent;
use std::future::Future;
use std::pin::Pin;
use uuid::Uuid;

/// Future returned by the two fallible side-effect hooks.
pub type EffectFuture<'a> = Pin<Box<dyn Future<Output = EffectOutcome> + Send + 'a>>;

/// Outcome of a fallible side effect.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum EffectOutcome {
    /// The side effect completed.
    Done,
    /// The side effect failed; the transition does not advance.
    Failed { error: String, recoverable: bool },
    /// The side effect is still in flight; the transition advances and the
    /// caller tracks the operation out of band.
    Pending { operation_id: Uuid },
}

impl EffectOutcome {
    /// Convenience constructor for a non-recoverable failure.
    pub fn fatal(error: impl Into<String>) -> Self {
        EffectOutcome::Failed {
            error: error.into(),
            recoverable: false,
        }
    }

    /// Convenience constructor for a recoverable failure.
    pub fn failed(error: impl Into<String>) -> Self {
        EffectOutcome::Failed {
            error: error.into(),
            recoverable: true,
        }
    }

    /// Convenience constructor for an in-flight operation.
    pub fn pending() -> Self {
        EffectOutcome::Pending {
            operation_id: Uuid::new_v4(),
        }
    }
}

fn done<'a>() -> EffectFuture<'a> {
    Box::pin(std::future::ready(EffectOutcome::Done))
}

/// Externally supplied side-effect handler.
///
/// Every hook has a no-op default, so implementors override only what they
/// care about; with no handler registered at all, actions degrade to pure
/// context updates.
pub trait ActionHandler: Send + Sync {
    /// A driver was assigned to the ride.
    fn on_driver_assigned(&self, _ctx: &RideContext, _event: &RideEvent) {}

    /// The ride was cancelled by a participant.
    fn on_cancellation(&self, _ctx: &RideContext, _event: &RideEvent) {}

    /// The ride timed out waiting for confirmation or PIN verification.
    fn on_timeout(&self, _ctx: &RideContext, _event: &RideEvent) {}

    /// The rider's PIN was verified at pickup.
    fn on_pin_verified(&self, _ctx: &RideContext, _event: &RideEvent) {}

    /// Repeated failed PIN attempts exhausted the budget.
    fn on_pin_brute_force(&self, _ctx: &RideContext, _event: &RideEvent) {}

    /// Lock the HTLC escrow for the confirmed ride.
    fn on_lock_escrow<'a>(&'a self, _ctx: &'a RideContext, _event: &'a RideEvent) -> EffectFuture<'a> {
        done()
    }

    /// Claim the escrow with preimage and claim-key signature.
    fn on_settle_payment<'a>(
        &'a self,
        _ctx: &'a RideContext,
        _event: &'a RideEvent,
    ) -> EffectFuture<'a> {
        done()
    }
}
