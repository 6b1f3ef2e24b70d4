//! Tether Model
//!
//! Pure vocabulary types for the Tether system, decoupled from the
//! registry, the sync protocol, and the bus implementations.

pub mod clock;
pub mod message;
pub mod names;

// Re-exports
pub use clock::{Clock, MockClock, SystemClock};
pub use message::{SyncMessage, Version};
pub use names::{ChannelId, OriginId, StateId};

/// Dynamic value carried by registry entries and sync messages.
///
/// Anything JSON-representable syncs; the bus moves it as structured data
/// and a real transport would serialize it transparently.
pub use serde_json::Value;
