//! Per-stream processing cursors.
//!
//! Reconciliation is idempotent because each side records the number of
//! history entries it has already processed per stream, and persists that
//! count across restarts. Binding the cursor to a confirmation id and
//! clearing it on rebind is the explicit guard against replaying a prior
//! ride's history ("phantom actions").

use crate::error::ReconcileError;
use ridesync_core::Role;
use serde::{Deserialize, Serialize};
use std::fs;
use std::path::Path;

/// Highest-processed history index per party stream, keyed by ride.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct StreamCursor {
    confirmation_id: String,
    driver_processed: usize,
    rider_processed: usize,
}

impl StreamCursor {
    /// Creates a cursor bound to a ride with nothing processed.
    pub fn new(confirmation_id: impl Into<String>) -> Self {
        Self {
            confirmation_id: confirmation_id.into(),
            driver_processed: 0,
            rider_processed: 0,
        }
    }

    /// The ride this cursor is bound to.
    pub fn confirmation_id(&self) -> &str {
        &self.confirmation_id
    }

    /// Number of entries already processed from the given party's stream.
    pub fn processed(&self, side: Role) -> usize {
        match side {
            Role::Driver => self.driver_processed,
            Role::Rider => self.rider_processed,
        }
    }

    /// Advances the processed count for one stream. Counts never move
    /// backwards, so replaying an older envelope cannot rewind progress.
    pub fn advance(&mut self, side: Role, processed: usize) {
        let slot = match side {
            Role::Driver => &mut self.driver_processed,
            Role::Rider => &mut self.rider_processed,
        };
        *slot = (*slot).max(processed);
    }

    /// Rebinds the cursor to a new ride, clearing both counts.
    ///
    /// Starting a new ride without clearing history was a known defect
    /// class in earlier coordination protocols; the clear is deliberate and
    /// unconditional.
    pub fn rebind(&mut self, confirmation_id: impl Into<String>) {
        let confirmation_id = confirmation_id.into();
        if self.confirmation_id == confirmation_id {
            return;
        }
        if self.driver_processed > 0 || self.rider_processed > 0 {
            tracing::info!(
                old = %self.confirmation_id,
                new = %confirmation_id,
                "rebinding cursor, clearing processed history"
            );
        }
        self.confirmation_id = confirmation_id;
        self.driver_processed = 0;
        self.rider_processed = 0;
    }

    /// Loads a cursor from a JSON file.
    pub fn load(path: impl AsRef<Path>) -> Result<Self, ReconcileError> {
        let bytes = fs::read(path)?;
        Ok(serde_json::from_slice(&bytes)?)
    }

    /// Persists the cursor as JSON.
    pub fn save(&self, path: impl AsRef<Path>) -> Result<(), ReconcileError> {
        let bytes = serde_json::to_vec_pretty(self)?;
        fs::write(path, bytes)?;
        Ok(())
    }
}
