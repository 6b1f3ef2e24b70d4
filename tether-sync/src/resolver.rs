//! Conflict resolver
//!
//! Last-write-wins gate for two-way sync. Tracks, per state identifier,
//! the provenance of the value currently in the local cell — whether it
//! got there by local edit or by applied remote update — and judges every
//! incoming message against it. Higher `(version, timestamp, origin)`
//! wins; the origin leg makes the tie-break deterministic, so every
//! replica observing the same pair of messages keeps the same one.

use std::collections::HashMap;
use std::sync::{Arc, Mutex};
use tether_model::{OriginId, StateId, SyncMessage, Version};

/// Where the local value of one state id came from.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Provenance {
    pub version: Version,
    pub timestamp: u64,
    pub origin: OriginId,
}

/// Outcome of judging an incoming message.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Verdict {
    /// The message is fresher than the local value; apply it.
    Apply,
    /// The message loses to the local value; discard without mutation.
    Stale,
}

/// Shared LWW provenance table.
///
/// One instance per participant per two-way registration, shared between
/// that participant's publisher (which records local emissions) and
/// subscriber (which admits remote updates). Clones share state.
#[derive(Clone, Debug, Default)]
pub struct ConflictResolver {
    table: Arc<Mutex<HashMap<StateId, Provenance>>>,
}

impl ConflictResolver {
    pub fn new() -> Self {
        Self::default()
    }

    /// Judge `message` against the current provenance and, if it wins,
    /// record it as the new provenance. Judging and recording happen under
    /// one lock so racing deliveries for the same state id serialize.
    pub fn admit(&self, message: &SyncMessage, from: &OriginId) -> Verdict {
        let Ok(mut table) = self.table.lock() else {
            return Verdict::Stale;
        };
        if let Some(applied) = table.get(&message.state_id) {
            let incoming = (message.version, message.timestamp, from);
            let current = (applied.version, applied.timestamp, &applied.origin);
            if incoming <= current {
                return Verdict::Stale;
            }
        }
        table.insert(
            message.state_id.clone(),
            Provenance {
                version: message.version,
                timestamp: message.timestamp,
                origin: from.clone(),
            },
        );
        Verdict::Apply
    }

    /// Record the provenance of a locally emitted message, unconditionally:
    /// the cell now holds that value, whatever was applied before.
    pub fn record(&self, message: &SyncMessage, origin: &OriginId) {
        let Ok(mut table) = self.table.lock() else {
            return;
        };
        table.insert(
            message.state_id.clone(),
            Provenance {
                version: message.version,
                timestamp: message.timestamp,
                origin: origin.clone(),
            },
        );
    }

    /// Current provenance for a state id, if any value was recorded.
    pub fn provenance(&self, state_id: &StateId) -> Option<Provenance> {
        self.table
            .lock()
            .ok()
            .and_then(|table| table.get(state_id).cloned())
    }
}
