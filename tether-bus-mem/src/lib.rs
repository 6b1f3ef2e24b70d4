//! Tether Bus (in-memory)
//!
//! `tokio::sync::broadcast`-backed implementation of the `tether-bus`
//! seam. A shared [`BusNetwork`] broker connects any number of
//! [`MemoryBus`] endpoints, so multiple simulated processes can exchange
//! sync messages inside one test binary.

mod memory_bus;
mod network;

pub use memory_bus::MemoryBus;
pub use network::BusNetwork;
