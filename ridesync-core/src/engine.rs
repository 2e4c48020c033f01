//! State machine engine - candidate lookup, guard selection, action
//! execution, observer dispatch.

use crate::action::ActionResult;
use crate::context::RideContext;
use crate::event::{EventKind, RideEvent};
use crate::guard::Guard;
use crate::handler::ActionHandler;
use crate::listener::RideListener;
use crate::state::RideState;
use crate::table::{self, RideTransition};
use std::sync::Arc;
use uuid::Uuid;

/// Result of processing one event.
#[derive(Debug, Clone)]
pub enum TransitionResult {
    /// The transition was applied.
    Success {
        from: RideState,
        to: RideState,
        /// Post-action context, or the pre-action context if the action is
        /// still pending.
        context: RideContext,
        transition: &'static RideTransition,
        /// Set when the action completed asynchronously; the caller tracks
        /// the operation out of band.
        pending_operation: Option<Uuid>,
    },
    /// No table row matches `(state, event)`; `valid_events` lists the legal
    /// alternatives for UI affordance and tests.
    InvalidTransition {
        state: RideState,
        event: EventKind,
        valid_events: Vec<EventKind>,
    },
    /// Rows exist but every guard rejected. Carries the name and reason of
    /// the last evaluated guard: later rows in a multi-candidate group are
    /// the exceptional path, so their explanation is the most informative.
    GuardFailed {
        state: RideState,
        event: EventKind,
        guard: &'static str,
        reason: String,
    },
    /// The selected action's side effect failed; neither state nor context
    /// advanced and the caller may retry the same event.
    ActionFailed {
        state: RideState,
        event: EventKind,
        action: &'static str,
        error: String,
        recoverable: bool,
    },
}

impl TransitionResult {
    /// Returns true for a successful transition.
    pub fn is_success(&self) -> bool {
        matches!(self, TransitionResult::Success { .. })
    }

    /// The destination state, if the transition succeeded.
    pub fn to_state(&self) -> Option<RideState> {
        match self {
            TransitionResult::Success { to, .. } => Some(*to),
            _ => None,
        }
    }
}

/// Handle returned by listener registration.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct ListenerId(u64);

/// Orchestrates event processing for ride state machines.
///
/// The engine itself is stateless with respect to rides: callers own
/// `(RideState, RideContext)` pairs and must serialize `process_event`
/// invocations per ride. Distinct rides may be processed in parallel.
pub struct RideEngine {
    handler: Option<Arc<dyn ActionHandler>>,
    listeners: Vec<(ListenerId, Arc<dyn RideListener>)>,
    next_listener: u64,
}

impl RideEngine {
    /// Creates an engine, asserting the transition table is well formed.
    pub fn new() -> Result<Self, crate::error::CoreError> {
        table::validate_transition_table()?;
        Ok(Self {
            handler: None,
            listeners: Vec::new(),
            next_listener: 0,
        })
    }

    /// Registers the side-effect handler capability.
    pub fn set_action_handler(&mut self, handler: Arc<dyn ActionHandler>) {
        self.handler = Some(handler);
    }

    /// Registers a transition observer. Registration is a setup-phase
    /// operation; it must not race with `process_event`.
    pub fn add_listener(&mut self, listener: Arc<dyn RideListener>) -> ListenerId {
        let id = ListenerId(self.next_listener);
        self.next_listener += 1;
        self.listeners.push((id, listener));
        id
    }

    /// Removes a previously registered observer.
    pub fn remove_listener(&mut self, id: ListenerId) {
        self.listeners.retain(|(lid, _)| *lid != id);
    }

    /// Processes one event against the given ride.
    ///
    /// Guard evaluation and table lookup are synchronous and pure; the only
    /// suspension points are inside action-handler dispatch. Callers must
    /// not interleave two concurrent calls for the same ride.
    pub async fn process_event(
        &self,
        state: RideState,
        ctx: &RideContext,
        event: &RideEvent,
    ) -> TransitionResult {
        let kind = event.kind();

        for (_, listener) in &self.listeners {
            listener.on_transition_attempt(state, kind);
        }

        let candidates = table::candidates(state, kind);
        if candidates.is_empty() {
            let result = TransitionResult::InvalidTransition {
                state,
                event: kind,
                valid_events: table::valid_events_from(state),
            };
            tracing::debug!(state = %state, event = %kind, "no matching transition");
            self.notify_failed(&result);
            return result;
        }

        // First row whose guard passes wins; remember the last rejection so
        // the most specific explanation survives a total failure.
        let mut selected: Option<&'static RideTransition> = None;
        let mut last_rejection: Option<(Guard, String)> = None;
        for candidate in candidates {
            match candidate.guard {
                None => {
                    selected = Some(candidate);
                    break;
                }
                Some(guard) => {
                    if guard.evaluate(ctx, event) {
                        selected = Some(candidate);
                        break;
                    }
                    last_rejection = Some((guard, guard.reason(ctx, event)));
                }
            }
        }

        let transition = match selected {
            Some(t) => t,
            None => {
                // candidates was non-empty, so a rejection was recorded.
                let (guard, reason) = last_rejection
                    .unwrap_or((Guard::IsRiderOrDriver, "no guard evaluated".to_string()));
                let result = TransitionResult::GuardFailed {
                    state,
                    event: kind,
                    guard: guard.name(),
                    reason,
                };
                tracing::debug!(state = %state, event = %kind, guard = guard.name(), "guard rejected");
                self.notify_failed(&result);
                return result;
            }
        };

        // The acting party becomes the inputter of the successor context.
        let attributed = ctx.with_inputter(event.pubkey());

        let (context, pending_operation) = match transition.action {
            None => (attributed, None),
            Some(action) => {
                match action
                    .execute(&attributed, event, self.handler.as_deref())
                    .await
                {
                    ActionResult::Success(updated) => (updated, None),
                    ActionResult::Failure { error, recoverable } => {
                        let result = TransitionResult::ActionFailed {
                            state,
                            event: kind,
                            action: action.name(),
                            error,
                            recoverable,
                        };
                        tracing::warn!(state = %state, event = %kind, action = action.name(), "action failed");
                        self.notify_failed(&result);
                        return result;
                    }
                    // State advances immediately with the pre-action context;
                    // the caller reconciles the pending operation itself.
                    ActionResult::Async { operation_id } => (attributed, Some(operation_id)),
                }
            }
        };

        let result = TransitionResult::Success {
            from: state,
            to: transition.to,
            context,
            transition,
            pending_operation,
        };

        if let TransitionResult::Success { ref context, .. } = result {
            for (_, listener) in &self.listeners {
                listener.on_transition(state, transition.to, context, transition);
            }
            for (_, listener) in &self.listeners {
                listener.on_state_changed(state, transition.to);
            }
        }
        tracing::info!(from = %state, to = %transition.to, event = %kind, "transition applied");

        result
    }

    /// Pure guard check: would this event select a transition? Never
    /// executes actions or notifies listeners.
    pub fn can_transition(&self, state: RideState, ctx: &RideContext, event: &RideEvent) -> bool {
        table::candidates(state, event.kind())
            .into_iter()
            .any(|t| match t.guard {
                None => true,
                Some(guard) => guard.evaluate(ctx, event),
            })
    }

    /// Event kinds the given actor could currently fire, probed with
    /// synthesized minimal events. For UI affordance only, never for
    /// authoritative decisions.
    pub fn available_events(
        &self,
        state: RideState,
        ctx: &RideContext,
        actor_pubkey: &str,
    ) -> Vec<EventKind> {
        table::valid_events_from(state)
            .into_iter()
            .filter(|kind| {
                let probe = probe_event(*kind, actor_pubkey, ctx);
                self.can_transition(state, ctx, &probe)
            })
            .collect()
    }

    fn notify_failed(&self, result: &TransitionResult) {
        for (_, listener) in &self.listeners {
            listener.on_transition_failed(result);
        }
    }
}

/// Synthesizes a minimal event of the given kind attributed to `pubkey`.
///
/// Kept private to this module so probes can only ever reach the pure
/// `can_transition` path, never `process_event`.
fn probe_event(kind: EventKind, pubkey: &str, ctx: &RideContext) -> RideEvent {
    let pubkey = pubkey.to_string();
    match kind {
        EventKind::Accept => RideEvent::Accept {
            pubkey,
            wallet_pubkey: None,
            mint_url: None,
            payment_method: None,
        },
        EventKind::Confirm => RideEvent::Confirm {
            pubkey,
            confirmation_id: String::new(),
            precise_pickup: None,
            escrow_token: None,
            payment_hash: None,
        },
        EventKind::StartRoute => RideEvent::StartRoute { pubkey },
        EventKind::Arrive => RideEvent::Arrive { pubkey },
        EventKind::SubmitPin => RideEvent::SubmitPin {
            pubkey,
            pin_encrypted: String::new(),
        },
        EventKind::VerifyPin => RideEvent::VerifyPin {
            pubkey,
            verified: true,
            attempt: ctx.pin_attempts + 1,
        },
        EventKind::StartRide => RideEvent::StartRide { pubkey },
        EventKind::Complete => RideEvent::Complete {
            pubkey,
            final_fare: None,
        },
        EventKind::Cancel => RideEvent::Cancel {
            pubkey,
            reason: None,
        },
        EventKind::SharePreimage => RideEvent::SharePreimage {
            pubkey,
            preimage_encrypted: String::new(),
            escrow_token_encrypted: None,
        },
        EventKind::BridgeComplete => RideEvent::BridgeComplete {
            pubkey,
            preimage: String::new(),
            amount: 0,
            fees: 0,
        },
        EventKind::RevealLocation => RideEvent::RevealLocation {
            pubkey,
            kind: crate::event::LocationKind::PrecisePickup,
            encrypted: String::new(),
        },
        EventKind::ConfirmationTimeout => RideEvent::ConfirmationTimeout { pubkey },
        EventKind::PinTimeout => RideEvent::PinTimeout { pubkey },
    }
}
