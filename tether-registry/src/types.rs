//! Entry and watcher types for the registry

use std::sync::Arc;
use tether_model::Value;
use thiserror::Error;

/// Errors from registry operations
#[derive(Debug, Error)]
pub enum RegistryError {
    #[error("key not found: {0}")]
    NotFound(String),

    #[error("reference chain starting at {0} revisits a key")]
    Cycle(String),

    #[error("key {0} holds a reference, not a value")]
    NotAValue(String),

    #[error("key {0} holds a value, not a reference")]
    NotARef(String),

    #[error("key already registered: {0}")]
    AlreadyRegistered(String),

    #[error("registry lock poisoned")]
    Poisoned,
}

/// What an entry stores: a concrete value or an indirection to another key.
#[derive(Debug, Clone, PartialEq)]
pub enum Slot {
    Value(Value),
    Ref(String),
}

/// Change callback, invoked with (old, new).
///
/// Invoked synchronously on the mutating thread, outside any registry lock.
pub type WatchFn = Arc<dyn Fn(&Value, &Value) + Send + Sync>;

/// Which mutations a watcher observes.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum WatchKind {
    /// Direct value changes at the watched key, from any write path.
    Direct,
    /// Direct value changes from local mutation only; the sync-apply path
    /// does not fire these. Hook point for publishers.
    LocalDirect,
    /// Changes to the resolved value observed from the watched key,
    /// including changes at the far end of a reference chain.
    Resolved,
}

/// A registered watcher: caller-supplied id maps to one of these per key.
pub(crate) struct Watcher {
    pub kind: WatchKind,
    pub callback: WatchFn,
}

impl std::fmt::Debug for Watcher {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Watcher").field("kind", &self.kind).finish()
    }
}
