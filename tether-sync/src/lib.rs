//! Tether Sync
//!
//! The synchronization protocol: a [`Publisher`] watches a registry cell
//! and emits each local change as a versioned, timestamped message on a
//! bus channel; a [`Subscriber`] mirrors those messages into its own cell.
//! One-way setups have a single authoritative writer; two-way setups run
//! both roles per participant and gate incoming updates through a shared
//! [`ConflictResolver`] (last-write-wins on `(version, timestamp, origin)`).
//!
//! Delivery is deliberately at-most-once: a failed publish is logged and
//! dropped, and convergence is carried by the next change or by
//! [`Publisher::publish_current`].

mod allocator;
mod cell;
mod publisher;
mod resolver;
mod subscriber;

pub use allocator::VersionAllocator;
pub use cell::Cell;
pub use publisher::{Publisher, PublisherOptions};
pub use resolver::{ConflictResolver, Provenance, Verdict};
pub use subscriber::{ApplyPolicy, Subscriber, SubscriberOptions, UpdateFn};

use tether_bus::BusError;
use tether_registry::RegistryError;

/// Error type for sync operations.
#[derive(Debug, thiserror::Error)]
pub enum SyncError {
    #[error(transparent)]
    Registry(#[from] RegistryError),

    #[error(transparent)]
    Bus(#[from] BusError),

    /// The registration this call went through has already been stopped.
    #[error("sync registration is stopped")]
    Stopped,

    /// Reserved surface with no implementation behind it.
    #[error("operation not supported: {0}")]
    Unsupported(&'static str),
}
