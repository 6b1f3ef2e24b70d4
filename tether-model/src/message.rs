//! Sync message payload
//!
//! The unit the protocol exchanges: one versioned, timestamped value for
//! one state identifier. The bus wraps it in an `Envelope` for routing.

use crate::names::StateId;
use crate::Value;
use serde::{Deserialize, Serialize};

/// Per-state-identifier publish counter.
///
/// Strictly increasing by 1 per emitted message from one allocator; the
/// first publish of a state id carries version 1.
pub type Version = u64;

/// One versioned update for one state identifier.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SyncMessage {
    /// Which synchronized value this update belongs to.
    pub state_id: StateId,
    /// The full new value (updates are whole-value, not deltas).
    pub value: Value,
    /// Publish counter allocated by the emitting origin.
    pub version: Version,
    /// Wall-clock milliseconds at emission; conflict tie-break key.
    pub timestamp: u64,
}

impl SyncMessage {
    /// Build a message for one update.
    pub fn new(state_id: StateId, value: Value, version: Version, timestamp: u64) -> Self {
        Self {
            state_id,
            value,
            version,
            timestamp,
        }
    }

    /// The `(version, timestamp)` pair the conflict resolver orders by.
    pub fn stamp(&self) -> (Version, u64) {
        (self.version, self.timestamp)
    }
}
