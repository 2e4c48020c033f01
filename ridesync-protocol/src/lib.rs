//! # ridesync-protocol
//!
//! Wire message kinds for ride coordination over untrusted broadcast relays.
//!
//! This crate provides:
//! - Negotiation messages: offer, acceptance, confirmation, cancellation
//! - The replaceable ride-state envelope with its append-only history log
//! - Typed history payloads with forward-compatible unknown-action handling
//!
//! Transport and cryptography are collaborator concerns; everything here is
//! plain data plus validation.

pub mod error;
pub mod history;
pub mod message;

pub use error::ProtocolError;
pub use history::{
    BridgeCompletePayload, DepositInvoiceSharePayload, HistoryAction, HistoryEntry,
    LocationRevealPayload, PinSubmitPayload, PinVerifyPayload, PreimageSharePayload,
    RideStateEnvelope, SettlementPayload, StatusPayload,
};
pub use message::{
    EncryptedPayload, EscrowType, RideAcceptance, RideCancellation, RideConfirmation, RideOffer,
};
