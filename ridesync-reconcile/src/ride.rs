//! Per-ride sessions and the ride registry.
//!
//! `process_event` must never interleave for one ride, so every ride gets an
//! async mutex and all inputs (locally witnessed events and counterparty
//! envelopes) funnel through it. Distinct rides are independent and run in
//! parallel.

use crate::cursor::StreamCursor;
use crate::error::ReconcileError;
use crate::projection::{project, StreamInput};
use crate::settlement::{BridgeSettlement, EscrowSettlement};
use dashmap::DashMap;
use ridesync_core::{RideContext, RideEngine, RideEvent, RideState, TransitionResult};
use ridesync_protocol::RideStateEnvelope;
use std::sync::Arc;
use tokio::sync::Mutex;

/// Live state for one ride.
#[derive(Debug, Clone)]
pub struct RideSession {
    pub state: RideState,
    pub context: RideContext,
    pub cursor: StreamCursor,
    pub settlement: EscrowSettlement,
}

impl RideSession {
    /// Creates a session keyed by the given confirmation id.
    pub fn new(
        confirmation_id: impl Into<String>,
        state: RideState,
        context: RideContext,
    ) -> Self {
        let mut settlement = EscrowSettlement::new();
        settlement.sync_from_context(&context);
        Self {
            state,
            context,
            cursor: StreamCursor::new(confirmation_id),
            settlement,
        }
    }

    fn apply_success(&mut self, result: &TransitionResult) {
        if let TransitionResult::Success { to, context, .. } = result {
            self.state = *to;
            self.context = context.clone();
            self.settlement.sync_from_context(context);
        }
    }

    /// Applies a payload-bearing event that carries session facts rather
    /// than a lifecycle transition. Returns false when the event must go
    /// through the state machine instead.
    ///
    /// A revealed preimage is verified against the committed payment hash
    /// before it is recorded; one that does not match is logged and dropped,
    /// never stored.
    fn absorb(&mut self, event: &RideEvent) -> bool {
        match event {
            RideEvent::SubmitPin { pin_encrypted, .. } => {
                self.context = self.context.with_pin(pin_encrypted.clone());
            }
            RideEvent::RevealLocation {
                kind, encrypted, ..
            } => {
                self.context = self.context.with_location(*kind, encrypted.clone());
            }
            RideEvent::SharePreimage {
                preimage_encrypted,
                escrow_token_encrypted,
                ..
            } => match self.settlement.record_preimage(preimage_encrypted.clone()) {
                Ok(()) => {
                    self.context = self.context.with_preimage(preimage_encrypted.clone());
                    if let Some(token) = escrow_token_encrypted {
                        self.settlement.escrow_token = Some(token.clone());
                        self.context = self.context.with_escrow_token(token.clone());
                    }
                }
                Err(e) => {
                    tracing::warn!(error = %e, "rejecting shared preimage");
                }
            },
            RideEvent::BridgeComplete {
                preimage,
                amount,
                fees,
                ..
            } => {
                let bridge = BridgeSettlement {
                    preimage: preimage.clone(),
                    amount: *amount,
                    fees: *fees,
                };
                match self.settlement.record_bridge(bridge) {
                    Ok(()) => {
                        self.context = self.context.with_preimage(preimage.clone());
                    }
                    Err(e) => {
                        tracing::warn!(error = %e, "rejecting bridge completion");
                    }
                }
            }
            _ => return false,
        }
        true
    }
}

/// Registry of concurrent rides, each serialized behind its own mutex.
pub struct RideRegistry {
    engine: Arc<RideEngine>,
    rides: DashMap<String, Arc<Mutex<RideSession>>>,
}

impl RideRegistry {
    /// Wraps a configured engine. Handler and listeners must be registered
    /// on the engine before it is handed over.
    pub fn new(engine: RideEngine) -> Self {
        Self {
            engine: Arc::new(engine),
            rides: DashMap::new(),
        }
    }

    /// Opens a session for a ride.
    pub fn open(
        &self,
        confirmation_id: &str,
        state: RideState,
        context: RideContext,
    ) -> Result<(), ReconcileError> {
        if self.rides.contains_key(confirmation_id) {
            return Err(ReconcileError::RideExists {
                confirmation_id: confirmation_id.to_string(),
            });
        }
        let session = RideSession::new(confirmation_id, state, context);
        self.rides
            .insert(confirmation_id.to_string(), Arc::new(Mutex::new(session)));
        Ok(())
    }

    /// Returns a snapshot of the session.
    pub async fn snapshot(&self, confirmation_id: &str) -> Result<RideSession, ReconcileError> {
        let session = self.session(confirmation_id)?;
        let guard = session.lock().await;
        Ok(guard.clone())
    }

    /// Removes a ride from the registry.
    pub fn close(&self, confirmation_id: &str) {
        self.rides.remove(confirmation_id);
    }

    /// Number of open rides.
    pub fn ride_count(&self) -> usize {
        self.rides.len()
    }

    /// Drives a locally witnessed lifecycle event through the ride's
    /// serialized path.
    pub async fn submit(
        &self,
        confirmation_id: &str,
        event: RideEvent,
    ) -> Result<TransitionResult, ReconcileError> {
        let session = self.session(confirmation_id)?;
        let mut guard = session.lock().await;

        let result = self
            .engine
            .process_event(guard.state, &guard.context, &event)
            .await;
        guard.apply_success(&result);
        Ok(result)
    }

    /// Ingests a counterparty envelope: projects unprocessed history into
    /// session inputs and applies them strictly in order. Lifecycle events
    /// go through the engine; payload-bearing events and settlement records
    /// are absorbed by the session directly.
    ///
    /// Returns one result per lifecycle event. Events rejected by the
    /// engine (invalid transition, guard failure) appear in the results;
    /// they do not halt processing of later entries.
    pub async fn ingest(
        &self,
        envelope: &RideStateEnvelope,
    ) -> Result<Vec<TransitionResult>, ReconcileError> {
        let session = self.session(&envelope.confirmation_id)?;
        let mut guard = session.lock().await;

        let inputs = project(envelope, &mut guard.cursor)?;
        let mut results = Vec::new();
        for input in inputs {
            match input {
                StreamInput::Event(event) => {
                    if guard.absorb(&event) {
                        continue;
                    }
                    let result = self
                        .engine
                        .process_event(guard.state, &guard.context, &event)
                        .await;
                    guard.apply_success(&result);
                    results.push(result);
                }
                StreamInput::Claim(payload) => {
                    guard.settlement.record_claim(payload.amount, payload.fees);
                }
                StreamInput::DepositInvoice(payload) => {
                    guard
                        .settlement
                        .record_deposit_invoice(payload.invoice, payload.mint_url);
                }
            }
        }
        Ok(results)
    }

    fn session(&self, confirmation_id: &str) -> Result<Arc<Mutex<RideSession>>, ReconcileError> {
        self.rides
            .get(confirmation_id)
            .map(|r| r.value().clone())
            .ok_or_else(|| ReconcileError::RideNotFound {
                confirmation_id: confirmation_id.to_string(),
            })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use ridesync_core::{EventKind, Role};
    use ridesync_protocol::{HistoryAction, HistoryEntry};
    use serde_json::json;
    use sha2::{Digest, Sha256};

    const RIDER: &str = "rider-pk";
    const DRIVER: &str = "driver-pk";

    fn hash_of(preimage: &str) -> String {
        hex::encode(Sha256::digest(preimage.as_bytes()))
    }

    fn registry() -> RideRegistry {
        RideRegistry::new(RideEngine::new().unwrap())
    }

    fn confirmed_context() -> RideContext {
        RideContext::new(RIDER, "offer-1")
            .with_driver(DRIVER, Some("wallet-pk".to_string()), None, None)
            .with_confirmation("conf-1", None, Some("token".to_string()), None)
    }

    fn driver_envelope() -> RideStateEnvelope {
        RideStateEnvelope::new("conf-1", Role::Driver, DRIVER, RideState::Confirmed)
    }

    #[tokio::test]
    async fn test_ingest_advances_through_driver_stream() {
        let registry = registry();
        registry
            .open("conf-1", RideState::Confirmed, confirmed_context())
            .unwrap();

        let mut env = driver_envelope();
        env.append_status(RideState::EnRoute);
        env.append_status(RideState::Arrived);

        let results = registry.ingest(&env).await.unwrap();
        assert_eq!(results.len(), 2);
        assert!(results.iter().all(|r| r.is_success()));

        let session = registry.snapshot("conf-1").await.unwrap();
        assert_eq!(session.state, RideState::Arrived);
    }

    #[tokio::test]
    async fn test_reingest_is_idempotent() {
        let registry = registry();
        registry
            .open("conf-1", RideState::Confirmed, confirmed_context())
            .unwrap();

        let mut env = driver_envelope();
        env.append_status(RideState::EnRoute);

        assert_eq!(registry.ingest(&env).await.unwrap().len(), 1);
        // The relay redelivers the same envelope; no double transition.
        assert!(registry.ingest(&env).await.unwrap().is_empty());

        let session = registry.snapshot("conf-1").await.unwrap();
        assert_eq!(session.state, RideState::EnRoute);
    }

    #[tokio::test]
    async fn test_full_ride_both_streams() {
        let registry = registry();
        registry
            .open("conf-1", RideState::Confirmed, confirmed_context())
            .unwrap();

        let mut driver_env = driver_envelope();
        driver_env.append_status(RideState::EnRoute);
        driver_env.append_status(RideState::Arrived);
        registry.ingest(&driver_env).await.unwrap();

        // Rider verifies the PIN through its own stream.
        let mut rider_env =
            RideStateEnvelope::new("conf-1", Role::Rider, RIDER, RideState::Arrived);
        rider_env.append(HistoryEntry::new(
            HistoryAction::PinVerify,
            json!({"verified": true, "attempt": 1}),
        ));
        let results = registry.ingest(&rider_env).await.unwrap();
        assert!(results[0].is_success());

        let session = registry.snapshot("conf-1").await.unwrap();
        assert_eq!(session.state, RideState::InProgress);
        assert!(session.settlement.pin_verified);

        // Driver completes.
        driver_env.append(HistoryEntry::new(
            HistoryAction::Status,
            json!({"status": "completed", "final_fare": 21_500}),
        ));
        let results = registry.ingest(&driver_env).await.unwrap();
        assert_eq!(results.len(), 1);
        assert_eq!(results[0].to_state(), Some(RideState::Completed));

        let session = registry.snapshot("conf-1").await.unwrap();
        assert_eq!(session.context.final_fare, Some(21_500));
    }

    #[tokio::test]
    async fn test_shared_preimage_reaches_settlement() {
        let registry = registry();
        let ctx = confirmed_context().with_payment_hash(hash_of("secret"));
        registry.open("conf-1", RideState::Arrived, ctx).unwrap();

        // The rider verifies the pin and then hands over the preimage plus
        // escrow token through its stream.
        let mut rider_env =
            RideStateEnvelope::new("conf-1", Role::Rider, RIDER, RideState::InProgress);
        rider_env.append(HistoryEntry::new(
            HistoryAction::PinVerify,
            json!({"verified": true, "attempt": 1}),
        ));
        rider_env.append(HistoryEntry::new(
            HistoryAction::PreimageShare,
            json!({"preimage": "secret", "escrow_token": "token-2"}),
        ));

        let results = registry.ingest(&rider_env).await.unwrap();
        // Only the verification drives a transition; the handoff is
        // absorbed without one.
        assert_eq!(results.len(), 1);
        assert!(results[0].is_success());

        let session = registry.snapshot("conf-1").await.unwrap();
        assert_eq!(session.state, RideState::InProgress);
        assert_eq!(session.settlement.preimage.as_deref(), Some("secret"));
        assert_eq!(session.settlement.escrow_token.as_deref(), Some("token-2"));
        assert!(session.settlement.can_claim());
        assert!(session.context.can_settle());
    }

    #[tokio::test]
    async fn test_wrong_preimage_not_recorded() {
        let registry = registry();
        let ctx = confirmed_context().with_payment_hash(hash_of("secret"));
        registry.open("conf-1", RideState::InProgress, ctx).unwrap();

        let mut rider_env =
            RideStateEnvelope::new("conf-1", Role::Rider, RIDER, RideState::InProgress);
        rider_env.append(HistoryEntry::new(
            HistoryAction::PreimageShare,
            json!({"preimage": "forged"}),
        ));

        let results = registry.ingest(&rider_env).await.unwrap();
        assert!(results.is_empty());

        let session = registry.snapshot("conf-1").await.unwrap();
        assert!(session.settlement.preimage.is_none());
        assert!(!session.settlement.can_claim());
        // The entry is consumed; a republish does not retry it.
        assert!(registry.ingest(&rider_env).await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_bridge_completion_reaches_settlement() {
        let registry = registry();
        let ctx = confirmed_context().with_payment_hash(hash_of("secret"));
        registry.open("conf-1", RideState::InProgress, ctx).unwrap();

        let mut rider_env =
            RideStateEnvelope::new("conf-1", Role::Rider, RIDER, RideState::InProgress);
        rider_env.append(HistoryEntry::new(
            HistoryAction::BridgeComplete,
            json!({"preimage": "secret", "amount": 21_000, "fees": 42}),
        ));

        let results = registry.ingest(&rider_env).await.unwrap();
        assert!(results.is_empty());

        let session = registry.snapshot("conf-1").await.unwrap();
        assert_eq!(session.settlement.preimage.as_deref(), Some("secret"));
        assert_eq!(session.settlement.bridge.as_ref().unwrap().fees, 42);
        assert!(session.settlement.can_claim());
    }

    #[tokio::test]
    async fn test_driver_settlement_records_consumed() {
        let registry = registry();
        registry
            .open("conf-1", RideState::Completed, confirmed_context())
            .unwrap();

        let mut env =
            RideStateEnvelope::new("conf-1", Role::Driver, DRIVER, RideState::Completed);
        env.append(HistoryEntry::new(
            HistoryAction::Settlement,
            json!({"amount": 21_000, "fees": 10}),
        ));
        env.append(HistoryEntry::new(
            HistoryAction::DepositInvoiceShare,
            json!({"invoice": "lnbc210n1...", "mint_url": "https://mint.b"}),
        ));

        let results = registry.ingest(&env).await.unwrap();
        assert!(results.is_empty());

        let session = registry.snapshot("conf-1").await.unwrap();
        assert!(session.settlement.is_claimed());
        assert_eq!(session.settlement.claim.as_ref().unwrap().amount, Some(21_000));
        assert_eq!(
            session.settlement.deposit_invoice.as_ref().unwrap().invoice,
            "lnbc210n1..."
        );
    }

    #[tokio::test]
    async fn test_forwarded_pin_and_locations_absorbed() {
        let registry = registry();
        registry
            .open("conf-1", RideState::Arrived, confirmed_context())
            .unwrap();

        let mut driver_env = driver_envelope();
        driver_env.append(HistoryEntry::new(
            HistoryAction::PinSubmit,
            json!({"pin": "enc:1234"}),
        ));
        let results = registry.ingest(&driver_env).await.unwrap();
        assert!(results.is_empty());

        let mut rider_env =
            RideStateEnvelope::new("conf-1", Role::Rider, RIDER, RideState::Arrived);
        rider_env.append(HistoryEntry::new(
            HistoryAction::LocationReveal,
            json!({"kind": "destination", "data": "enc:dest"}),
        ));
        rider_env.append(HistoryEntry::new(
            HistoryAction::LocationReveal,
            json!({"kind": "precise_pickup", "data": "enc:pickup-2"}),
        ));
        let results = registry.ingest(&rider_env).await.unwrap();
        assert!(results.is_empty());

        let session = registry.snapshot("conf-1").await.unwrap();
        // Nothing transitioned, but the payloads landed in the context.
        assert_eq!(session.state, RideState::Arrived);
        assert_eq!(session.context.pin.as_deref(), Some("enc:1234"));
        assert_eq!(session.context.destination.as_deref(), Some("enc:dest"));
        assert_eq!(
            session.context.precise_pickup.as_deref(),
            Some("enc:pickup-2")
        );
    }

    #[tokio::test]
    async fn test_forged_stream_rejected_by_guards() {
        let registry = registry();
        registry
            .open("conf-1", RideState::Confirmed, confirmed_context())
            .unwrap();

        // An attacker republishes a driver-stream envelope under its own
        // key; the projection derives events attributed to that key and the
        // engine's guards reject them.
        let mut forged =
            RideStateEnvelope::new("conf-1", Role::Driver, "attacker-pk", RideState::Confirmed);
        forged.append_status(RideState::Arrived);

        let results = registry.ingest(&forged).await.unwrap();
        assert_eq!(results.len(), 1);
        assert!(matches!(
            results[0],
            TransitionResult::GuardFailed { guard: "is_driver", .. }
        ));

        let session = registry.snapshot("conf-1").await.unwrap();
        assert_eq!(session.state, RideState::Confirmed);
    }

    #[tokio::test]
    async fn test_terminal_ride_ignores_later_entries() {
        let registry = registry();
        registry
            .open("conf-1", RideState::Confirmed, confirmed_context())
            .unwrap();

        let mut env = driver_envelope();
        env.append(HistoryEntry::new(
            HistoryAction::Status,
            json!({"status": "cancelled", "reason": "vehicle breakdown"}),
        ));
        env.append_status(RideState::Arrived);

        let results = registry.ingest(&env).await.unwrap();
        assert_eq!(results.len(), 2);
        assert!(results[0].is_success());
        assert!(matches!(
            results[1],
            TransitionResult::InvalidTransition { ref valid_events, .. } if valid_events.is_empty()
        ));

        let session = registry.snapshot("conf-1").await.unwrap();
        assert_eq!(session.state, RideState::Cancelled);
        assert_eq!(
            session.context.cancel_reason.as_deref(),
            Some("vehicle breakdown")
        );
    }

    #[tokio::test]
    async fn test_submit_local_event() {
        let registry = registry();
        registry
            .open("conf-1", RideState::Confirmed, confirmed_context())
            .unwrap();

        let result = registry
            .submit(
                "conf-1",
                RideEvent::Cancel {
                    pubkey: RIDER.to_string(),
                    reason: Some("changed plans".to_string()),
                },
            )
            .await
            .unwrap();
        assert_eq!(result.to_state(), Some(RideState::Cancelled));
    }

    #[tokio::test]
    async fn test_unknown_ride() {
        let registry = registry();
        let result = registry
            .submit(
                "conf-missing",
                RideEvent::Cancel {
                    pubkey: RIDER.to_string(),
                    reason: None,
                },
            )
            .await;
        assert!(matches!(result, Err(ReconcileError::RideNotFound { .. })));
    }

    #[tokio::test]
    async fn test_duplicate_open_rejected() {
        let registry = registry();
        registry
            .open("conf-1", RideState::Confirmed, confirmed_context())
            .unwrap();
        assert!(matches!(
            registry.open("conf-1", RideState::Confirmed, confirmed_context()),
            Err(ReconcileError::RideExists { .. })
        ));
    }

    #[tokio::test]
    async fn test_distinct_rides_are_independent() {
        let registry = registry();
        registry
            .open("conf-1", RideState::Confirmed, confirmed_context())
            .unwrap();
        let other = RideContext::new("rider-2", "offer-2")
            .with_driver("driver-2", None, None, None)
            .with_confirmation("conf-2", None, None, None);
        registry.open("conf-2", RideState::Confirmed, other).unwrap();

        let mut env = driver_envelope();
        env.append_status(RideState::EnRoute);
        registry.ingest(&env).await.unwrap();

        assert_eq!(
            registry.snapshot("conf-1").await.unwrap().state,
            RideState::EnRoute
        );
        assert_eq!(
            registry.snapshot("conf-2").await.unwrap().state,
            RideState::Confirmed
        );
        assert_eq!(registry.ride_count(), 2);

        registry.close("conf-2");
        assert_eq!(registry.ride_count(), 1);
    }

    #[test]
    fn test_session_event_kinds_available() {
        // Sanity: the projection produces kinds the table knows from
        // Confirmed.
        let engine = RideEngine::new().unwrap();
        let ctx = confirmed_context();
        let kinds = engine.available_events(RideState::Confirmed, &ctx, DRIVER);
        assert!(kinds.contains(&EventKind::Arrive));
    }
}
