//! Registry - named values, indirect references, change watchers
//!
//! In-process table mapping string keys to concrete values or to references
//! naming other keys. Reference chains resolve transitively; watchers observe
//! direct changes, resolved changes across chains, or local-only changes
//! (the sync layer's hook point). A reverse dependency index propagates
//! resolved-watch notifications without re-walking chains on every change.
//!
//! All operations are synchronous in-memory table updates; no I/O happens
//! here. Callbacks run on the mutating thread, after every lock is released,
//! in per-key mutation order (see `notify`).

use crate::notify::{NotifyPump, Pending};
use crate::types::{RegistryError, Slot, WatchFn, WatchKind, Watcher};
use std::collections::{HashMap, HashSet, VecDeque};
use std::sync::{Arc, RwLock, RwLockReadGuard, RwLockWriteGuard};
use tether_model::Value;
use tracing::debug;

struct Entry {
    slot: Slot,
    watchers: HashMap<String, Watcher>,
}

#[derive(Default)]
struct Tables {
    entries: HashMap<String, Entry>,
    /// target key -> keys whose slot is `Ref(target)`. Maintained in the
    /// same critical section as every pointer change.
    reverse: HashMap<String, HashSet<String>>,
}

/// Named-reference registry.
///
/// Cheap to clone; clones share the same table.
#[derive(Clone, Default)]
pub struct Registry {
    inner: Arc<RegistryInner>,
}

#[derive(Default)]
struct RegistryInner {
    tables: RwLock<Tables>,
    pump: NotifyPump,
}

impl std::fmt::Debug for Registry {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Registry").finish_non_exhaustive()
    }
}

impl Registry {
    pub fn new() -> Self {
        Self::default()
    }

    // ==================== Entry lifecycle ====================

    /// Create an entry holding `value`. Errors if the key already exists.
    pub fn register(
        &self,
        key: impl Into<String>,
        value: Value,
    ) -> Result<(), RegistryError> {
        let key = key.into();
        let mut tables = self.write_tables()?;
        if tables.entries.contains_key(&key) {
            return Err(RegistryError::AlreadyRegistered(key));
        }
        tables.entries.insert(
            key,
            Entry {
                slot: Slot::Value(value),
                watchers: HashMap::new(),
            },
        );
        Ok(())
    }

    /// Create an entry holding `default` if absent; returns the value the
    /// key holds afterwards. Idempotent.
    pub fn ensure(
        &self,
        key: impl Into<String>,
        default: Value,
    ) -> Result<Value, RegistryError> {
        let key = key.into();
        let mut tables = self.write_tables()?;
        match tables.entries.get(&key) {
            Some(entry) => match &entry.slot {
                Slot::Value(v) => Ok(v.clone()),
                Slot::Ref(_) => Err(RegistryError::NotAValue(key)),
            },
            None => {
                tables.entries.insert(
                    key,
                    Entry {
                        slot: Slot::Value(default.clone()),
                        watchers: HashMap::new(),
                    },
                );
                Ok(default)
            }
        }
    }

    /// Remove an entry, detaching its watchers and its outgoing reference
    /// edge. Watchers on other keys whose chains pass through `key` stop
    /// resolving until the key is registered again.
    pub fn unregister(&self, key: &str) -> Result<(), RegistryError> {
        {
            let mut tables = self.write_tables()?;
            let entry = tables
                .entries
                .remove(key)
                .ok_or_else(|| RegistryError::NotFound(key.to_string()))?;
            if let Slot::Ref(target) = &entry.slot {
                unlink(&mut tables.reverse, target, key);
            }
            self.inner.pump.forget(key);
        }
        Ok(())
    }

    /// Remove every entry whose key starts with `prefix`; returns how many
    /// were removed. Each removal is atomic per key.
    pub fn unregister_prefix(&self, prefix: &str) -> usize {
        let Ok(mut tables) = self.inner.tables.write() else {
            return 0;
        };
        let doomed: Vec<String> = tables
            .entries
            .keys()
            .filter(|k| k.starts_with(prefix))
            .cloned()
            .collect();
        for key in &doomed {
            if let Some(entry) = tables.entries.remove(key) {
                if let Slot::Ref(target) = &entry.slot {
                    unlink(&mut tables.reverse, target, key);
                }
            }
            self.inner.pump.forget(key);
        }
        doomed.len()
    }

    // ==================== Reads ====================

    /// True if the key has an entry (value or reference).
    pub fn contains(&self, key: &str) -> bool {
        let Ok(tables) = self.inner.tables.read() else {
            return false;
        };
        tables.entries.contains_key(key)
    }

    /// Direct read of a concrete value. References are not followed; use
    /// [`Registry::resolve`] for that.
    pub fn value(&self, key: &str) -> Result<Value, RegistryError> {
        let tables = self.read_tables()?;
        let entry = tables
            .entries
            .get(key)
            .ok_or_else(|| RegistryError::NotFound(key.to_string()))?;
        match &entry.slot {
            Slot::Value(v) => Ok(v.clone()),
            Slot::Ref(_) => Err(RegistryError::NotAValue(key.to_string())),
        }
    }

    /// Read the target key of a reference entry.
    pub fn ref_target(&self, key: &str) -> Result<String, RegistryError> {
        let tables = self.read_tables()?;
        let entry = tables
            .entries
            .get(key)
            .ok_or_else(|| RegistryError::NotFound(key.to_string()))?;
        match &entry.slot {
            Slot::Ref(target) => Ok(target.clone()),
            Slot::Value(_) => Err(RegistryError::NotARef(key.to_string())),
        }
    }

    /// Follow the reference chain from `key` to its concrete value.
    /// A chain that revisits a key fails with [`RegistryError::Cycle`]
    /// instead of looping.
    pub fn resolve(&self, key: &str) -> Result<Value, RegistryError> {
        let tables = self.read_tables()?;
        resolve_in(&tables, key)
    }

    /// All registered keys. Order is not guaranteed.
    pub fn keys(&self) -> Vec<String> {
        let Ok(tables) = self.inner.tables.read() else {
            return Vec::new();
        };
        tables.entries.keys().cloned().collect()
    }

    /// All registered keys starting with `prefix`. Order is not guaranteed.
    pub fn keys_with_prefix(&self, prefix: &str) -> Vec<String> {
        let Ok(tables) = self.inner.tables.read() else {
            return Vec::new();
        };
        tables
            .entries
            .keys()
            .filter(|k| k.starts_with(prefix))
            .cloned()
            .collect()
    }

    // ==================== Value writes ====================

    /// Overwrite a concrete value. Fires direct and resolved watchers when
    /// the value actually changed.
    pub fn set_value(&self, key: &str, value: Value) -> Result<(), RegistryError> {
        self.write_concrete(key, |_| value, true).map(|_| ())
    }

    /// Atomic read-modify-write of a concrete value; `f` sees the current
    /// value and returns the replacement, which is also returned to the
    /// caller. `f` runs inside the table's critical section and must not
    /// call back into the registry.
    pub fn swap_value(
        &self,
        key: &str,
        f: impl FnOnce(&Value) -> Value,
    ) -> Result<Value, RegistryError> {
        self.write_concrete(key, f, true)
    }

    /// Sync-apply entry point: same write semantics as
    /// [`Registry::set_value`] but local-only watchers do not fire. This is
    /// how a subscriber applies a remote update without re-triggering the
    /// publisher hook watching the same key.
    pub fn apply_value(&self, key: &str, value: Value) -> Result<(), RegistryError> {
        self.write_concrete(key, |_| value, false).map(|_| ())
    }

    // ==================== Reference writes ====================

    /// Point `key` at `target`, creating or remapping the indirection.
    /// The reverse dependency index is updated in the same critical section.
    /// Self-references are rejected eagerly; longer cycles surface as
    /// [`RegistryError::Cycle`] at resolution time.
    pub fn set_ref(&self, key: &str, target: impl Into<String>) -> Result<(), RegistryError> {
        let target = target.into();
        self.write_ref(key, |_| Ok(target))
    }

    /// Atomic remap of a reference: `f` sees the current target and returns
    /// the new one. Errors with [`RegistryError::NotARef`] if the entry
    /// holds a value.
    pub fn swap_ref(
        &self,
        key: &str,
        f: impl FnOnce(&str) -> String,
    ) -> Result<String, RegistryError> {
        let mut new_target = String::new();
        self.write_ref(key, |slot| match slot {
            Slot::Ref(old) => {
                new_target = f(old);
                Ok(new_target.clone())
            }
            Slot::Value(_) => Err(RegistryError::NotARef(key.to_string())),
        })?;
        Ok(new_target)
    }

    // ==================== Watchers ====================

    /// Watch direct value changes at `key`; `f` is invoked with
    /// `(old, new)` for every write where they differ, from any write path.
    /// Registering an existing `id` on the same key replaces the watcher.
    pub fn watch(
        &self,
        key: &str,
        id: impl Into<String>,
        f: impl Fn(&Value, &Value) + Send + Sync + 'static,
    ) -> Result<(), RegistryError> {
        self.add_watcher(key, id.into(), WatchKind::Direct, Arc::new(f))
    }

    /// Watch the value as resolved from `key` through any reference chain;
    /// fires when the far end changes or when a remap changes what the
    /// chain resolves to.
    pub fn watch_resolved(
        &self,
        key: &str,
        id: impl Into<String>,
        f: impl Fn(&Value, &Value) + Send + Sync + 'static,
    ) -> Result<(), RegistryError> {
        self.add_watcher(key, id.into(), WatchKind::Resolved, Arc::new(f))
    }

    /// Watch direct changes made through the local mutation API only;
    /// writes through [`Registry::apply_value`] do not fire. Publishers
    /// hook cells with this to stay silent while remote updates land.
    pub fn watch_local(
        &self,
        key: &str,
        id: impl Into<String>,
        f: impl Fn(&Value, &Value) + Send + Sync + 'static,
    ) -> Result<(), RegistryError> {
        self.add_watcher(key, id.into(), WatchKind::LocalDirect, Arc::new(f))
    }

    /// Remove the watcher registered under `id` at `key`. Unknown ids are
    /// a no-op; an unknown key is an error.
    pub fn unwatch(&self, key: &str, id: &str) -> Result<(), RegistryError> {
        let mut tables = self.write_tables()?;
        let entry = tables
            .entries
            .get_mut(key)
            .ok_or_else(|| RegistryError::NotFound(key.to_string()))?;
        entry.watchers.remove(id);
        Ok(())
    }

    // ==================== Internals ====================

    fn read_tables(&self) -> Result<RwLockReadGuard<'_, Tables>, RegistryError> {
        self.inner.tables.read().map_err(|_| RegistryError::Poisoned)
    }

    fn write_tables(&self) -> Result<RwLockWriteGuard<'_, Tables>, RegistryError> {
        self.inner.tables.write().map_err(|_| RegistryError::Poisoned)
    }

    fn add_watcher(
        &self,
        key: &str,
        id: String,
        kind: WatchKind,
        callback: WatchFn,
    ) -> Result<(), RegistryError> {
        let mut tables = self.write_tables()?;
        let entry = tables
            .entries
            .get_mut(key)
            .ok_or_else(|| RegistryError::NotFound(key.to_string()))?;
        entry.watchers.insert(id, Watcher { kind, callback });
        Ok(())
    }

    /// Shared write path for `set_value` / `swap_value` / `apply_value`.
    /// Mutates, collects and enqueues notifications under the table lock,
    /// then drains queues after releasing it.
    fn write_concrete(
        &self,
        key: &str,
        f: impl FnOnce(&Value) -> Value,
        local: bool,
    ) -> Result<Value, RegistryError> {
        let mut touched = Vec::new();
        let new = {
            let mut tables = self.write_tables()?;
            let old = match tables.entries.get(key) {
                None => return Err(RegistryError::NotFound(key.to_string())),
                Some(entry) => match &entry.slot {
                    Slot::Value(v) => v.clone(),
                    Slot::Ref(_) => return Err(RegistryError::NotAValue(key.to_string())),
                },
            };
            let new = f(&old);
            if new == old {
                return Ok(new);
            }
            if let Some(entry) = tables.entries.get_mut(key) {
                entry.slot = Slot::Value(new.clone());
            }
            for (queue_key, batch) in change_events(&tables, key, &old, &new, local) {
                self.inner.pump.enqueue(&queue_key, batch);
                touched.push(queue_key);
            }
            new
        };
        for key in &touched {
            self.inner.pump.drain(key);
        }
        Ok(new)
    }

    /// Shared write path for `set_ref` / `swap_ref`: swaps the slot to a new
    /// reference, fixes reverse edges, and fires resolved watchers when the
    /// resolved value observably changed across the remap.
    fn write_ref(
        &self,
        key: &str,
        f: impl FnOnce(&Slot) -> Result<String, RegistryError>,
    ) -> Result<(), RegistryError> {
        let mut touched = Vec::new();
        let mut unresolvable = false;
        {
            let mut tables = self.write_tables()?;
            let old_slot = match tables.entries.get(key) {
                None => return Err(RegistryError::NotFound(key.to_string())),
                Some(entry) => entry.slot.clone(),
            };
            let target = f(&old_slot)?;
            if target == key {
                return Err(RegistryError::Cycle(key.to_string()));
            }

            let old_resolved = resolve_in(&tables, key).ok();

            if let Slot::Ref(old_target) = &old_slot {
                if *old_target == target {
                    return Ok(());
                }
                unlink(&mut tables.reverse, old_target, key);
            }
            if let Some(entry) = tables.entries.get_mut(key) {
                entry.slot = Slot::Ref(target.clone());
            }
            tables
                .reverse
                .entry(target)
                .or_default()
                .insert(key.to_string());

            let new_resolved = resolve_in(&tables, key).ok();
            match (old_resolved, new_resolved) {
                (Some(old), Some(new)) if old != new => {
                    for (queue_key, batch) in resolved_events(&tables, key, &old, &new) {
                        self.inner.pump.enqueue(&queue_key, batch);
                        touched.push(queue_key);
                    }
                }
                (Some(_), Some(_)) => {}
                _ => unresolvable = true,
            }
        }
        if unresolvable {
            debug!(key, "remapped reference does not resolve; watchers not notified");
        }
        for key in &touched {
            self.inner.pump.drain(key);
        }
        Ok(())
    }
}

/// Remove the `dependent -> target` reverse edge, dropping empty sets.
fn unlink(reverse: &mut HashMap<String, HashSet<String>>, target: &str, dependent: &str) {
    if let Some(set) = reverse.get_mut(target) {
        set.remove(dependent);
        if set.is_empty() {
            reverse.remove(target);
        }
    }
}

/// Follow the chain from `start` to a concrete value. The visited set
/// bounds the walk at chain length and turns revisits into `Cycle`.
fn resolve_in(tables: &Tables, start: &str) -> Result<Value, RegistryError> {
    let mut visited: HashSet<&str> = HashSet::new();
    let mut cursor = start;
    loop {
        if !visited.insert(cursor) {
            return Err(RegistryError::Cycle(start.to_string()));
        }
        let entry = tables
            .entries
            .get(cursor)
            .ok_or_else(|| RegistryError::NotFound(cursor.to_string()))?;
        match &entry.slot {
            Slot::Value(v) => return Ok(v.clone()),
            Slot::Ref(target) => cursor = target.as_str(),
        }
    }
}

/// Every key whose chain passes through `root`, by walking reverse edges.
/// The visited set keeps cyclic graphs from looping the walk.
fn dependents_of<'t>(tables: &'t Tables, root: &str) -> Vec<&'t str> {
    let mut out = Vec::new();
    let mut visited: HashSet<&str> = HashSet::new();
    let mut frontier: VecDeque<&str> = VecDeque::new();
    frontier.push_back(root);
    visited.insert(root);
    while let Some(key) = frontier.pop_front() {
        if let Some(deps) = tables.reverse.get(key) {
            for dep in deps {
                if visited.insert(dep.as_str()) {
                    out.push(dep.as_str());
                    frontier.push_back(dep.as_str());
                }
            }
        }
    }
    out
}

/// Notifications for a concrete write at `key`: direct watchers (filtered
/// by write path), resolved watchers at the key itself, and resolved
/// watchers on every transitive dependent.
fn change_events(
    tables: &Tables,
    key: &str,
    old: &Value,
    new: &Value,
    local: bool,
) -> Vec<(String, Vec<Pending>)> {
    let mut out = Vec::new();
    if let Some(entry) = tables.entries.get(key) {
        let batch: Vec<Pending> = entry
            .watchers
            .values()
            .filter(|w| match w.kind {
                WatchKind::Direct | WatchKind::Resolved => true,
                WatchKind::LocalDirect => local,
            })
            .map(|w| Pending {
                callback: w.callback.clone(),
                old: old.clone(),
                new: new.clone(),
            })
            .collect();
        if !batch.is_empty() {
            out.push((key.to_string(), batch));
        }
    }
    out.extend(dependent_resolved_events(tables, key, old, new));
    out
}

/// Notifications for a resolved-value change observed from `key`: resolved
/// watchers at the key plus its transitive dependents.
fn resolved_events(
    tables: &Tables,
    key: &str,
    old: &Value,
    new: &Value,
) -> Vec<(String, Vec<Pending>)> {
    let mut out = Vec::new();
    if let Some(entry) = tables.entries.get(key) {
        let batch: Vec<Pending> = entry
            .watchers
            .values()
            .filter(|w| w.kind == WatchKind::Resolved)
            .map(|w| Pending {
                callback: w.callback.clone(),
                old: old.clone(),
                new: new.clone(),
            })
            .collect();
        if !batch.is_empty() {
            out.push((key.to_string(), batch));
        }
    }
    out.extend(dependent_resolved_events(tables, key, old, new));
    out
}

fn dependent_resolved_events(
    tables: &Tables,
    key: &str,
    old: &Value,
    new: &Value,
) -> Vec<(String, Vec<Pending>)> {
    let mut out = Vec::new();
    for dep in dependents_of(tables, key) {
        if let Some(entry) = tables.entries.get(dep) {
            let batch: Vec<Pending> = entry
                .watchers
                .values()
                .filter(|w| w.kind == WatchKind::Resolved)
                .map(|w| Pending {
                    callback: w.callback.clone(),
                    old: old.clone(),
                    new: new.clone(),
                })
                .collect();
            if !batch.is_empty() {
                out.push((dep.to_string(), batch));
            }
        }
    }
    out
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::sync::Mutex;

    fn recorder() -> (Arc<Mutex<Vec<(Value, Value)>>>, impl Fn(&Value, &Value) + Send + Sync) {
        let seen = Arc::new(Mutex::new(Vec::new()));
        let sink = seen.clone();
        (seen, move |old: &Value, new: &Value| {
            sink.lock().unwrap().push((old.clone(), new.clone()));
        })
    }

    #[test]
    fn test_register_and_read() {
        let reg = Registry::new();
        reg.register("cfg/name", json!("alpha")).unwrap();

        assert!(reg.contains("cfg/name"));
        assert_eq!(reg.value("cfg/name").unwrap(), json!("alpha"));
        assert!(matches!(
            reg.register("cfg/name", json!("beta")),
            Err(RegistryError::AlreadyRegistered(_))
        ));
        assert!(matches!(
            reg.value("missing"),
            Err(RegistryError::NotFound(_))
        ));
    }

    #[test]
    fn test_ensure_is_idempotent() {
        let reg = Registry::new();
        assert_eq!(reg.ensure("counter", json!(0)).unwrap(), json!(0));
        reg.set_value("counter", json!(5)).unwrap();
        // Second ensure returns the live value, not the default.
        assert_eq!(reg.ensure("counter", json!(0)).unwrap(), json!(5));
    }

    #[test]
    fn test_swap_value_returns_new() {
        let reg = Registry::new();
        reg.register("n", json!(1)).unwrap();
        let new = reg
            .swap_value("n", |old| json!(old.as_i64().unwrap() + 41))
            .unwrap();
        assert_eq!(new, json!(42));
        assert_eq!(reg.value("n").unwrap(), json!(42));
    }

    #[test]
    fn test_watch_fires_in_mutation_order() {
        let reg = Registry::new();
        reg.register("k", json!(0)).unwrap();
        let (seen, record) = recorder();
        reg.watch("k", "w", record).unwrap();

        reg.set_value("k", json!(1)).unwrap();
        reg.set_value("k", json!(2)).unwrap();

        let seen = seen.lock().unwrap();
        assert_eq!(*seen, vec![(json!(0), json!(1)), (json!(1), json!(2))]);
    }

    #[test]
    fn test_unchanged_write_is_not_an_event() {
        let reg = Registry::new();
        reg.register("k", json!("same")).unwrap();
        let (seen, record) = recorder();
        reg.watch("k", "w", record).unwrap();

        reg.set_value("k", json!("same")).unwrap();
        assert!(seen.lock().unwrap().is_empty());
    }

    #[test]
    fn test_apply_skips_local_watchers_only() {
        let reg = Registry::new();
        reg.register("cell", json!(0)).unwrap();
        let local_calls = Arc::new(AtomicUsize::new(0));
        let direct_calls = Arc::new(AtomicUsize::new(0));
        let l = local_calls.clone();
        let d = direct_calls.clone();
        reg.watch_local("cell", "hook", move |_, _| {
            l.fetch_add(1, Ordering::SeqCst);
        })
        .unwrap();
        reg.watch("cell", "obs", move |_, _| {
            d.fetch_add(1, Ordering::SeqCst);
        })
        .unwrap();

        reg.set_value("cell", json!(1)).unwrap();
        reg.apply_value("cell", json!(2)).unwrap();

        assert_eq!(local_calls.load(Ordering::SeqCst), 1, "hook saw only the local write");
        assert_eq!(direct_calls.load(Ordering::SeqCst), 2, "observer saw both writes");
    }

    #[test]
    fn test_unwatch_stops_delivery() {
        let reg = Registry::new();
        reg.register("k", json!(0)).unwrap();
        let (seen, record) = recorder();
        reg.watch("k", "w", record).unwrap();

        reg.set_value("k", json!(1)).unwrap();
        reg.unwatch("k", "w").unwrap();
        reg.set_value("k", json!(2)).unwrap();

        assert_eq!(seen.lock().unwrap().len(), 1);
    }

    #[test]
    fn test_ref_chain_resolution() {
        let reg = Registry::new();
        reg.register("c", json!("end")).unwrap();
        reg.register("b", json!(null)).unwrap();
        reg.register("a", json!(null)).unwrap();
        reg.set_ref("b", "c").unwrap();
        reg.set_ref("a", "b").unwrap();

        assert_eq!(reg.resolve("a").unwrap(), json!("end"));
        assert_eq!(reg.ref_target("a").unwrap(), "b");
        assert!(matches!(
            reg.value("a"),
            Err(RegistryError::NotAValue(_))
        ));
        assert!(matches!(
            reg.ref_target("c"),
            Err(RegistryError::NotARef(_))
        ));
    }

    #[test]
    fn test_cycle_detected_at_resolution() {
        let reg = Registry::new();
        reg.register("a", json!(null)).unwrap();
        reg.register("b", json!(null)).unwrap();
        reg.set_ref("a", "b").unwrap();
        reg.set_ref("b", "a").unwrap();

        assert!(matches!(reg.resolve("a"), Err(RegistryError::Cycle(_))));
        assert!(matches!(reg.resolve("b"), Err(RegistryError::Cycle(_))));
    }

    #[test]
    fn test_self_reference_rejected() {
        let reg = Registry::new();
        reg.register("a", json!(null)).unwrap();
        assert!(matches!(
            reg.set_ref("a", "a"),
            Err(RegistryError::Cycle(_))
        ));
    }

    #[test]
    fn test_dangling_ref_reports_missing_key() {
        let reg = Registry::new();
        reg.register("a", json!(null)).unwrap();
        reg.set_ref("a", "ghost").unwrap();
        match reg.resolve("a") {
            Err(RegistryError::NotFound(k)) => assert_eq!(k, "ghost"),
            other => panic!("expected NotFound, got {:?}", other.map(|_| ())),
        }
    }

    #[test]
    fn test_resolved_watch_follows_chain() {
        let reg = Registry::new();
        reg.register("z", json!(1)).unwrap();
        reg.register("mid", json!(null)).unwrap();
        reg.register("top", json!(null)).unwrap();
        reg.set_ref("mid", "z").unwrap();
        reg.set_ref("top", "mid").unwrap();

        let (seen, record) = recorder();
        reg.watch_resolved("top", "w", record).unwrap();

        reg.set_value("z", json!(2)).unwrap();

        let seen = seen.lock().unwrap();
        assert_eq!(*seen, vec![(json!(1), json!(2))]);
    }

    #[test]
    fn test_remap_fires_resolved_watch_with_new_resolution() {
        let reg = Registry::new();
        reg.register("left", json!("L")).unwrap();
        reg.register("right", json!("R")).unwrap();
        reg.register("ptr", json!(null)).unwrap();
        reg.set_ref("ptr", "left").unwrap();

        let (seen, record) = recorder();
        reg.watch_resolved("ptr", "w", record).unwrap();

        reg.set_ref("ptr", "right").unwrap();
        assert_eq!(*seen.lock().unwrap(), vec![(json!("L"), json!("R"))]);

        // After remapping, changes on the old target are silent...
        reg.set_value("left", json!("L2")).unwrap();
        assert_eq!(seen.lock().unwrap().len(), 1);
        // ...and changes on the new target are observed.
        reg.set_value("right", json!("R2")).unwrap();
        assert_eq!(seen.lock().unwrap().len(), 2);
    }

    #[test]
    fn test_swap_ref_requires_ref_entry() {
        let reg = Registry::new();
        reg.register("v", json!(1)).unwrap();
        assert!(matches!(
            reg.swap_ref("v", |t| t.to_string()),
            Err(RegistryError::NotARef(_))
        ));

        reg.register("target-a", json!("a")).unwrap();
        reg.register("target-b", json!("b")).unwrap();
        reg.register("p", json!(null)).unwrap();
        reg.set_ref("p", "target-a").unwrap();
        let new = reg.swap_ref("p", |_| "target-b".to_string()).unwrap();
        assert_eq!(new, "target-b");
        assert_eq!(reg.resolve("p").unwrap(), json!("b"));
    }

    #[test]
    fn test_unregister_detaches_watchers_and_edges() {
        let reg = Registry::new();
        reg.register("z", json!(0)).unwrap();
        reg.register("a", json!(null)).unwrap();
        reg.set_ref("a", "z").unwrap();

        let fired = Arc::new(AtomicUsize::new(0));
        let f = fired.clone();
        reg.watch_resolved("a", "w", move |_, _| {
            f.fetch_add(1, Ordering::SeqCst);
        })
        .unwrap();

        reg.unregister("a").unwrap();
        reg.set_value("z", json!(1)).unwrap();
        assert_eq!(fired.load(Ordering::SeqCst), 0);
        assert!(matches!(reg.value("a"), Err(RegistryError::NotFound(_))));
    }

    #[test]
    fn test_prefix_listing_and_removal() {
        let reg = Registry::new();
        reg.register("cfg.host", json!("h")).unwrap();
        reg.register("cfg.port", json!(9)).unwrap();
        reg.register("other", json!(true)).unwrap();

        let mut cfg = reg.keys_with_prefix("cfg.");
        cfg.sort();
        assert_eq!(cfg, vec!["cfg.host", "cfg.port"]);

        assert_eq!(reg.unregister_prefix("cfg."), 2);
        assert!(matches!(
            reg.value("cfg.host"),
            Err(RegistryError::NotFound(_))
        ));
        assert!(matches!(
            reg.value("cfg.port"),
            Err(RegistryError::NotFound(_))
        ));
        assert_eq!(reg.value("other").unwrap(), json!(true));
        assert_eq!(reg.keys().len(), 1);
    }

    #[test]
    fn test_listener_mutating_own_key_does_not_deadlock() {
        let reg = Registry::new();
        reg.register("n", json!(0)).unwrap();
        let inner = reg.clone();
        reg.watch("n", "grow", move |_, new| {
            let n = new.as_i64().unwrap();
            if n < 3 {
                inner.set_value("n", json!(n + 1)).unwrap();
            }
        })
        .unwrap();

        reg.set_value("n", json!(1)).unwrap();
        assert_eq!(reg.value("n").unwrap(), json!(3));
    }

    #[test]
    fn test_concurrent_swaps_are_atomic_per_key() {
        let reg = Registry::new();
        reg.register("count", json!(0)).unwrap();

        let threads: Vec<_> = (0..8)
            .map(|_| {
                let reg = reg.clone();
                std::thread::spawn(move || {
                    for _ in 0..100 {
                        reg.swap_value("count", |old| json!(old.as_i64().unwrap() + 1))
                            .unwrap();
                    }
                })
            })
            .collect();
        for t in threads {
            t.join().unwrap();
        }

        assert_eq!(reg.value("count").unwrap(), json!(800));
    }
}
