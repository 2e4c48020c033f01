//! # ridesync-reconcile
//!
//! Replicated-history reconciliation for ride coordination.
//!
//! This crate provides:
//! - Per-stream cursors with monotonic advance and rebind semantics
//! - Projection of counterparty history envelopes into session inputs
//! - The HTLC escrow settlement tracker
//! - A registry of concurrent rides, each serialized behind its own mutex
//!
//! Each party runs its own state machine and re-derives the counterparty's
//! actions from published history; nothing in here trusts the relay.

pub mod cursor;
pub mod error;
pub mod projection;
pub mod ride;
pub mod settlement;

pub use cursor::StreamCursor;
pub use error::ReconcileError;
pub use projection::{project, StreamInput};
pub use ride::{RideRegistry, RideSession};
pub use settlement::{
    preimage_matches, BridgeSettlement, DepositInvoice, EscrowSettlement, SettlementClaim,
    SettlementOutcome,
};
