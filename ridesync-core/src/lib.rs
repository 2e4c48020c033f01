//! # ridesync-core
//!
//! Ride coordination state machine.
//!
//! This crate provides:
//! - The immutable ride context and actor-attributed event model
//! - Enum-keyed guards and actions over a static transition table
//! - The state machine engine with observer and handler capabilities
//!
//! It performs no I/O; side effects are dispatched to an externally supplied
//! [`ActionHandler`], and counterparty events arrive through the
//! reconciliation layer.

pub mod action;
pub mod context;
pub mod engine;
pub mod error;
pub mod event;
pub mod guard;
pub mod handler;
pub mod listener;
pub mod state;
pub mod table;

pub use action::{Action, ActionResult};
pub use context::{PaymentMethod, RideContext, Role};
pub use engine::{ListenerId, RideEngine, TransitionResult};
pub use error::CoreError;
pub use event::{EventKind, LocationKind, RideEvent};
pub use guard::Guard;
pub use handler::{ActionHandler, EffectFuture, EffectOutcome};
pub use listener::RideListener;
pub use state::RideState;
pub use table::{validate_transition_table, RideTransition, TRANSITIONS};
