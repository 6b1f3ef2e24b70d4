//! Version allocator
//!
//! Per-state-identifier publish counters. Counters are per-process, not
//! globally coordinated: with a single writer per state id that is enough
//! for total order, and with two writers the conflict resolver breaks the
//! resulting ties.

use std::collections::HashMap;
use std::sync::{Arc, Mutex};
use tether_model::{StateId, Version};

/// Allocates strictly increasing versions per state identifier.
///
/// Cheap to clone; clones share the same counters. Injected into every
/// publisher of one process so tests can run isolated allocator instances
/// side by side.
#[derive(Clone, Debug, Default)]
pub struct VersionAllocator {
    counters: Arc<Mutex<HashMap<StateId, Version>>>,
}

impl VersionAllocator {
    pub fn new() -> Self {
        Self::default()
    }

    /// Allocate the next version for a state id. The first call for a
    /// given id returns 1.
    pub fn next(&self, state_id: &StateId) -> Version {
        let Ok(mut counters) = self.counters.lock() else {
            return 0;
        };
        let counter = counters.entry(state_id.clone()).or_insert(0);
        *counter += 1;
        *counter
    }

    /// The most recently allocated version for a state id; 0 if none was
    /// allocated yet.
    pub fn current(&self, state_id: &StateId) -> Version {
        self.counters
            .lock()
            .map(|counters| counters.get(state_id).copied().unwrap_or(0))
            .unwrap_or(0)
    }
}
