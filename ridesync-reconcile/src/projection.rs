//! History stream projection.
//!
//! A pure fold from "history entries not yet processed" to "inputs fed into
//! the local ride session". Each party advances its own machine from events
//! it personally witnesses or re-derives from the counterparty's published
//! history; there is no cross-party atomicity. Safety comes from the engine
//! guards plus the rule enforced here: only the legitimate actor's stream
//! can assert that actor's actions.

use crate::cursor::StreamCursor;
use crate::error::ReconcileError;
use ridesync_core::{RideEvent, RideState, Role};
use ridesync_protocol::{
    BridgeCompletePayload, DepositInvoiceSharePayload, HistoryAction, HistoryEntry,
    LocationRevealPayload, PinSubmitPayload, PinVerifyPayload, PreimageSharePayload,
    RideStateEnvelope, SettlementPayload, StatusPayload,
};

/// One projected input from a counterparty stream.
#[derive(Debug, Clone, PartialEq)]
pub enum StreamInput {
    /// Feeds the local ride session. Lifecycle events drive the state
    /// machine; payload-bearing events (pin submission, location reveals,
    /// preimage handoff) are absorbed by the session without a transition.
    Event(RideEvent),
    /// The driver's escrow claim record, consumed by the settlement tracker.
    Claim(SettlementPayload),
    /// A cross-mint deposit invoice from the driver.
    DepositInvoice(DepositInvoiceSharePayload),
}

/// Projects unprocessed history entries into session inputs and advances the
/// cursor past them.
///
/// Idempotent by construction: republished envelopes whose history is no
/// longer than the processed count yield no inputs. Entries that are
/// malformed, unknown, or assert an action the publishing stream is not
/// authorized for are skipped (the cursor still advances, so they are
/// skipped exactly once).
pub fn project(
    envelope: &RideStateEnvelope,
    cursor: &mut StreamCursor,
) -> Result<Vec<StreamInput>, ReconcileError> {
    if envelope.confirmation_id != cursor.confirmation_id() {
        return Err(ReconcileError::RideMismatch {
            expected: cursor.confirmation_id().to_string(),
            actual: envelope.confirmation_id.clone(),
        });
    }

    let processed = cursor.processed(envelope.author);
    if envelope.history.len() < processed {
        tracing::warn!(
            ride = %envelope.confirmation_id,
            author = envelope.author.as_str(),
            published = envelope.history.len(),
            processed,
            "stale republish with shorter history, ignoring"
        );
        return Ok(Vec::new());
    }

    let mut inputs = Vec::new();
    for (index, entry) in envelope.history.iter().enumerate().skip(processed) {
        match derive_input(envelope, entry) {
            Ok(Some(input)) => inputs.push(input),
            Ok(None) => {}
            Err(e) => {
                tracing::warn!(
                    ride = %envelope.confirmation_id,
                    index,
                    action = entry.action.as_str(),
                    error = %e,
                    "skipping malformed history entry"
                );
            }
        }
    }

    cursor.advance(envelope.author, envelope.history.len());
    Ok(inputs)
}

/// Maps one history entry to a session input, or `None` for entries that
/// carry nothing for the local side.
fn derive_input(
    envelope: &RideStateEnvelope,
    entry: &HistoryEntry,
) -> Result<Option<StreamInput>, ReconcileError> {
    let author = envelope.author;
    let pubkey = envelope.author_pubkey.clone();

    let input = match (&entry.action, author) {
        (HistoryAction::Status, _) => {
            let payload: StatusPayload = entry.decode()?;
            derive_status_event(author, pubkey, &payload)?.map(StreamInput::Event)
        }

        (HistoryAction::PinSubmit, Role::Driver) => {
            let payload: PinSubmitPayload = entry.decode()?;
            Some(StreamInput::Event(RideEvent::SubmitPin {
                pubkey,
                pin_encrypted: payload.pin.into_inner(),
            }))
        }

        (HistoryAction::PinVerify, Role::Rider) => {
            let payload: PinVerifyPayload = entry.decode()?;
            Some(StreamInput::Event(RideEvent::VerifyPin {
                pubkey,
                verified: payload.verified,
                attempt: payload.attempt,
            }))
        }

        (HistoryAction::LocationReveal, Role::Rider) => {
            let payload: LocationRevealPayload = entry.decode()?;
            Some(StreamInput::Event(RideEvent::RevealLocation {
                pubkey,
                kind: payload.kind,
                encrypted: payload.data.into_inner(),
            }))
        }

        (HistoryAction::PreimageShare, Role::Rider) => {
            let payload: PreimageSharePayload = entry.decode()?;
            Some(StreamInput::Event(RideEvent::SharePreimage {
                pubkey,
                preimage_encrypted: payload.preimage.into_inner(),
                escrow_token_encrypted: payload.escrow_token.map(|t| t.into_inner()),
            }))
        }

        (HistoryAction::BridgeComplete, Role::Rider) => {
            let payload: BridgeCompletePayload = entry.decode()?;
            Some(StreamInput::Event(RideEvent::BridgeComplete {
                pubkey,
                preimage: payload.preimage,
                amount: payload.amount,
                fees: payload.fees,
            }))
        }

        (HistoryAction::Settlement, Role::Driver) => {
            let payload: SettlementPayload = entry.decode()?;
            Some(StreamInput::Claim(payload))
        }

        (HistoryAction::DepositInvoiceShare, Role::Driver) => {
            let payload: DepositInvoiceSharePayload = entry.decode()?;
            Some(StreamInput::DepositInvoice(payload))
        }

        (HistoryAction::Unknown(tag), _) => {
            tracing::debug!(action = %tag, "skipping unknown history action");
            None
        }

        // Anything else asserts an action this stream's author is not
        // authorized to perform.
        (action, _) => {
            tracing::warn!(
                ride = %envelope.confirmation_id,
                author = author.as_str(),
                action = action.as_str(),
                "stream asserted an action its author is not authorized for"
            );
            None
        }
    };

    Ok(input)
}

fn derive_status_event(
    author: Role,
    pubkey: String,
    payload: &StatusPayload,
) -> Result<Option<RideEvent>, ReconcileError> {
    let state = RideState::from_str_tag(&payload.status).ok_or_else(|| {
        ReconcileError::Protocol(ridesync_protocol::ProtocolError::InvalidStatus {
            tag: payload.status.clone(),
        })
    })?;

    let event = match (author, state) {
        (Role::Driver, RideState::EnRoute) => Some(RideEvent::StartRoute { pubkey }),
        (Role::Driver, RideState::Arrived) => Some(RideEvent::Arrive { pubkey }),
        (Role::Driver, RideState::Completed) => Some(RideEvent::Complete {
            pubkey,
            final_fare: payload.final_fare,
        }),
        (_, RideState::Cancelled) => Some(RideEvent::Cancel {
            pubkey,
            reason: payload.reason.clone(),
        }),
        // Remaining statuses echo transitions the local side already
        // witnessed through its own inputs or other actions.
        _ => None,
    };
    Ok(event)
}
