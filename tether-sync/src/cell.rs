//! Cell — handle to one synchronized registry entry
//!
//! Thin (registry, key) pair. Application code mutates through `set` /
//! `swap`; the subscriber lands remote updates through the crate-internal
//! apply path, which the publisher's local-change hook does not observe.

use tether_model::Value;
use tether_registry::{Registry, RegistryError};

/// Handle to one registry entry participating in sync.
#[derive(Clone, Debug)]
pub struct Cell {
    registry: Registry,
    key: String,
}

impl Cell {
    /// Wrap an existing entry. The entry must already be registered;
    /// operations on a missing key fail with [`RegistryError::NotFound`].
    pub fn new(registry: &Registry, key: impl Into<String>) -> Self {
        Self {
            registry: registry.clone(),
            key: key.into(),
        }
    }

    /// Wrap an entry, creating it with `initial` if absent.
    pub fn attach(
        registry: &Registry,
        key: impl Into<String>,
        initial: Value,
    ) -> Result<Self, RegistryError> {
        let key = key.into();
        registry.ensure(&key, initial)?;
        Ok(Self {
            registry: registry.clone(),
            key,
        })
    }

    pub fn registry(&self) -> &Registry {
        &self.registry
    }

    pub fn key(&self) -> &str {
        &self.key
    }

    /// Current value of the cell.
    pub fn get(&self) -> Result<Value, RegistryError> {
        self.registry.value(&self.key)
    }

    /// Local mutation; observed by the publisher hook.
    pub fn set(&self, value: Value) -> Result<(), RegistryError> {
        self.registry.set_value(&self.key, value)
    }

    /// Atomic local read-modify-write; observed by the publisher hook.
    pub fn swap(&self, f: impl FnOnce(&Value) -> Value) -> Result<Value, RegistryError> {
        self.registry.swap_value(&self.key, f)
    }

    /// Sync-apply path: land a remote value without waking the publisher
    /// hook. Only the subscriber calls this.
    pub(crate) fn apply(&self, value: Value) -> Result<(), RegistryError> {
        self.registry.apply_value(&self.key, value)
    }
}
