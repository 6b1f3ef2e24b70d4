//! Tether Bus
//!
//! Pub/sub channel abstraction the sync protocol runs over, decoupled from
//! any concrete transport. Production would back [`Bus`] with a real
//! networked broker; tests and single-process wiring use the in-memory
//! implementation in `tether-bus-mem`.
//!
//! This crate provides:
//! - `Envelope`: the channel-level wrapper around a `SyncMessage`
//! - `Bus`: subscribe/publish/handler registration seam
//! - `BusEvent`: connectivity events (late-joiner announcements hang off these)

mod bus;
mod envelope;

pub use bus::{Bus, BusError, BusEvent, MessageHandler, MessagePredicate};
pub use envelope::{Envelope, HandlerId};
