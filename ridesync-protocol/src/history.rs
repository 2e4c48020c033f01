//! Replaceable ride-state envelopes and their append-only history.
//!
//! Each party continuously republishes exactly one state object keyed by the
//! confirmation id. The envelope carries a few current-status fields plus a
//! strictly-growing ordered history of timestamped action records; consumers
//! re-derive events from entries they have not yet processed.

use crate::error::ProtocolError;
use crate::message::EncryptedPayload;
use chrono::{DateTime, Utc};
use ridesync_core::{LocationKind, RideState, Role};
use serde::de::DeserializeOwned;
use serde::{Deserialize, Deserializer, Serialize, Serializer};
use serde_json::Value;

/// The action recorded by one history entry.
///
/// Unrecognized tags deserialize to `Unknown` and survive re-serialization,
/// so older clients pass newer protocol actions through untouched.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum HistoryAction {
    /// Lifecycle status change (both streams).
    Status,
    /// Driver forwards the rider's encrypted PIN attempt.
    PinSubmit,
    /// Rider reports the verification outcome.
    PinVerify,
    /// Rider reveals an encrypted location.
    LocationReveal,
    /// Rider reveals the settlement preimage after PIN verification.
    PreimageShare,
    /// Lightning bridge confirmation for cross-mint settlement.
    BridgeComplete,
    /// Driver records the escrow claim.
    Settlement,
    /// Driver shares a deposit invoice for cross-mint top-up.
    DepositInvoiceShare,
    /// Forward-compatible passthrough.
    Unknown(String),
}

impl HistoryAction {
    /// Stable wire tag.
    pub fn as_str(&self) -> &str {
        match self {
            HistoryAction::Status => "status",
            HistoryAction::PinSubmit => "pin_submit",
            HistoryAction::PinVerify => "pin_verify",
            HistoryAction::LocationReveal => "location_reveal",
            HistoryAction::PreimageShare => "preimage_share",
            HistoryAction::BridgeComplete => "bridge_complete",
            HistoryAction::Settlement => "settlement",
            HistoryAction::DepositInvoiceShare => "deposit_invoice_share",
            HistoryAction::Unknown(tag) => tag,
        }
    }

    /// Parses a wire tag; anything unrecognized becomes `Unknown`.
    pub fn from_tag(tag: &str) -> Self {
        match tag {
            "status" => HistoryAction::Status,
            "pin_submit" => HistoryAction::PinSubmit,
            "pin_verify" => HistoryAction::PinVerify,
            "location_reveal" => HistoryAction::LocationReveal,
            "preimage_share" => HistoryAction::PreimageShare,
            "bridge_complete" => HistoryAction::BridgeComplete,
            "settlement" => HistoryAction::Settlement,
            "deposit_invoice_share" => HistoryAction::DepositInvoiceShare,
            other => HistoryAction::Unknown(other.to_string()),
        }
    }
}

impl Serialize for HistoryAction {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_str(self.as_str())
    }
}

impl<'de> Deserialize<'de> for HistoryAction {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        let tag = String::deserialize(deserializer)?;
        Ok(HistoryAction::from_tag(&tag))
    }
}

/// One timestamped record in a party's append-only history.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct HistoryEntry {
    pub action: HistoryAction,
    pub at: DateTime<Utc>,
    /// Action-specific payload; see the typed payload structs below.
    #[serde(default, skip_serializing_if = "Value::is_null")]
    pub data: Value,
}

impl HistoryEntry {
    pub fn new(action: HistoryAction, data: Value) -> Self {
        Self {
            action,
            at: Utc::now(),
            data,
        }
    }

    /// Decodes the payload into a typed struct.
    pub fn decode<T: DeserializeOwned>(&self) -> Result<T, ProtocolError> {
        Ok(serde_json::from_value(self.data.clone())?)
    }
}

// =============================================================================
// Typed history payloads
// =============================================================================

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StatusPayload {
    pub status: String,
    /// Set on cancellation entries.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub reason: Option<String>,
    /// Set on the driver's completion entry.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub final_fare: Option<u64>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PinSubmitPayload {
    pub pin: EncryptedPayload,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PinVerifyPayload {
    pub verified: bool,
    pub attempt: u32,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LocationRevealPayload {
    pub kind: LocationKind,
    pub data: EncryptedPayload,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PreimageSharePayload {
    pub preimage: EncryptedPayload,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub escrow_token: Option<EncryptedPayload>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct BridgeCompletePayload {
    pub preimage: String,
    pub amount: u64,
    pub fees: u64,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SettlementPayload {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub amount: Option<u64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub fees: Option<u64>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DepositInvoiceSharePayload {
    pub invoice: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub mint_url: Option<String>,
}

// =============================================================================
// Envelope
// =============================================================================

/// A party's replaceable ride-state object.
///
/// Republished versions supersede prior ones, but the embedded history may
/// only grow within one ride; [`RideStateEnvelope::extends`] checks that
/// property against a previously seen version.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RideStateEnvelope {
    /// Canonical ride key.
    pub confirmation_id: String,
    pub author: Role,
    pub author_pubkey: String,
    /// Current lifecycle status tag.
    pub status: String,
    pub history: Vec<HistoryEntry>,
    pub updated_at: DateTime<Utc>,
}

impl RideStateEnvelope {
    pub fn new(
        confirmation_id: impl Into<String>,
        author: Role,
        author_pubkey: impl Into<String>,
        status: RideState,
    ) -> Self {
        Self {
            confirmation_id: confirmation_id.into(),
            author,
            author_pubkey: author_pubkey.into(),
            status: status.as_str().to_string(),
            history: Vec::new(),
            updated_at: Utc::now(),
        }
    }

    /// Appends one history record and refreshes the publish timestamp.
    pub fn append(&mut self, entry: HistoryEntry) {
        self.history.push(entry);
        self.updated_at = Utc::now();
    }

    /// Appends a status record and updates the envelope status field.
    pub fn append_status(&mut self, status: RideState) {
        self.status = status.as_str().to_string();
        self.append(HistoryEntry::new(
            HistoryAction::Status,
            serde_json::json!({ "status": status.as_str() }),
        ));
    }

    /// Parses the current status tag.
    pub fn status_state(&self) -> Result<RideState, ProtocolError> {
        RideState::from_str_tag(&self.status).ok_or_else(|| ProtocolError::InvalidStatus {
            tag: self.status.clone(),
        })
    }

    /// Checks that this envelope is an append-only extension of `previous`:
    /// same ride key, no truncation, and a shared prefix.
    pub fn extends(&self, previous: &RideStateEnvelope) -> Result<(), ProtocolError> {
        if self.confirmation_id != previous.confirmation_id {
            return Err(ProtocolError::ConfirmationIdMismatch {
                expected: previous.confirmation_id.clone(),
                actual: self.confirmation_id.clone(),
            });
        }
        if self.history.len() < previous.history.len() {
            return Err(ProtocolError::HistoryTruncated {
                previous: previous.history.len(),
                current: self.history.len(),
            });
        }
        for (index, (old, new)) in previous.history.iter().zip(&self.history).enumerate() {
            if old != new {
                return Err(ProtocolError::HistoryDiverged { index });
            }
        }
        Ok(())
    }
}
