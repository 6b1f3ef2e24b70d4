//! Named-reference registry: keys bound to values or to other keys.
//!
//! The registry is the local half of the system. Every piece of shared
//! state lives under a string key, holding either a concrete JSON value or
//! a reference that names another key. Reads can follow reference chains
//! ([`Registry::resolve`]), watchers can observe a key directly or through
//! whatever chain currently reaches it, and prefix operations manage whole
//! namespaces at once.
//!
//! The sync layer (`tether-sync`) builds replication on top of two hooks
//! here: [`Registry::watch_local`] to observe local mutations without
//! echoing remote ones, and [`Registry::apply_value`] to land remote
//! updates without re-triggering that hook.
//!
//! ```
//! use tether_registry::Registry;
//! use serde_json::json;
//!
//! let reg = Registry::new();
//! reg.register("profile/alice", json!({"theme": "dark"}))?;
//! reg.register("profile/current", json!(null))?;
//! reg.set_ref("profile/current", "profile/alice")?;
//!
//! assert_eq!(reg.resolve("profile/current")?, json!({"theme": "dark"}));
//! # Ok::<(), tether_registry::RegistryError>(())
//! ```

mod notify;
mod registry;
mod types;

pub use registry::Registry;
pub use types::{RegistryError, WatchFn};
