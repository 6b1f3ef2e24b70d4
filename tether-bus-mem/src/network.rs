//! BusNetwork — shared broker connecting MemoryBus endpoints
//!
//! Each channel gets one broadcast sender; every subscribed endpoint holds
//! a receiver on it, simulating fan-out across processes.

use tether_bus::{BusEvent, Envelope};
use tether_model::ChannelId;
use std::collections::HashMap;
use std::sync::Arc;
use tokio::sync::{broadcast, RwLock};

/// Shared in-memory broker — routes envelopes between `MemoryBus` endpoints.
#[derive(Clone, Debug)]
pub struct BusNetwork {
    channels: Arc<RwLock<HashMap<ChannelId, broadcast::Sender<Envelope>>>>,
    events: broadcast::Sender<BusEvent>,
}

impl BusNetwork {
    pub fn new() -> Self {
        let (events, _) = broadcast::channel(64);
        Self {
            channels: Arc::new(RwLock::new(HashMap::new())),
            events,
        }
    }

    /// Get or create the broadcast channel for a channel id.
    pub(crate) async fn get_or_create(&self, channel: &ChannelId) -> broadcast::Sender<Envelope> {
        let mut channels = self.channels.write().await;
        channels
            .entry(channel.clone())
            .or_insert_with(|| broadcast::channel(256).0)
            .clone()
    }

    /// Broadcast a connectivity event to every listening endpoint.
    pub(crate) fn announce(&self, event: BusEvent) {
        let _ = self.events.send(event);
    }

    pub(crate) fn event_receiver(&self) -> broadcast::Receiver<BusEvent> {
        self.events.subscribe()
    }
}

impl Default for BusNetwork {
    fn default() -> Self {
        Self::new()
    }
}
