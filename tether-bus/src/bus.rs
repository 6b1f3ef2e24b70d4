//! Bus abstraction for Tether sync
//!
//! Decouples the sync protocol from the concrete pub/sub substrate.
//! Production backs this with a networked broker; test harnesses use the
//! in-memory `MemoryBus` from `tether-bus-mem`.

use crate::Envelope;
use crate::HandlerId;
use std::sync::Arc;
use tether_model::{ChannelId, OriginId};

/// Error type for bus operations.
#[derive(Debug, thiserror::Error)]
pub enum BusError {
    #[error("origin is not subscribed to channel: {0}")]
    NotSubscribed(ChannelId),
    #[error("publish failed: {0}")]
    Publish(String),
}

/// Connectivity events observable through [`Bus::events`].
#[derive(Debug, Clone, PartialEq)]
pub enum BusEvent {
    /// Some origin (possibly this one) joined a channel. Publishers use
    /// this to re-announce current state to late joiners.
    PeerSubscribed {
        channel: ChannelId,
        origin: OriginId,
    },
}

/// Filter deciding whether a handler wants a given envelope.
pub type MessagePredicate = Arc<dyn Fn(&Envelope) -> bool + Send + Sync>;

/// Callback invoked with each envelope the predicate accepted. Runs on the
/// origin's delivery task: a slow handler stalls delivery (and `off`) for
/// that origin, and a handler must not call back into the bus.
pub type MessageHandler = Arc<dyn Fn(&Envelope) + Send + Sync>;

/// Pub/sub bus abstraction.
///
/// Guarantees the sync protocol relies on, and which every implementation
/// must provide:
/// - envelopes from one origin are delivered to each subscriber in publish
///   order per channel;
/// - an origin never receives its own messages back;
/// - payloads move as structured data (serialization, framing and
///   reconnection are the implementation's concern).
#[async_trait::async_trait]
pub trait Bus: Send + Sync + 'static {
    /// Join a channel on behalf of an origin. Subscriptions are counted:
    /// each `subscribe` needs a matching `unsubscribe`.
    async fn subscribe(&self, origin: &OriginId, channel: &ChannelId) -> Result<(), BusError>;

    /// Leave a channel. Message delivery for the channel stops once the
    /// last subscription is released.
    async fn unsubscribe(&self, origin: &OriginId, channel: &ChannelId);

    /// Publish an envelope's payload on a channel. Requires an active
    /// subscription. Best-effort: delivery failure surfaces here, and the
    /// caller decides whether that matters.
    async fn publish(
        &self,
        origin: &OriginId,
        channel: &ChannelId,
        message: tether_model::SyncMessage,
    ) -> Result<(), BusError>;

    /// Register a handler for inbound envelopes matching `predicate`.
    /// Handlers see messages from every channel the origin is subscribed
    /// to; the predicate narrows that down.
    async fn on_message(
        &self,
        origin: &OriginId,
        predicate: MessagePredicate,
        handler: MessageHandler,
    ) -> HandlerId;

    /// Remove a handler. After this returns the handler is not invoked
    /// again.
    async fn off(&self, origin: &OriginId, id: HandlerId);

    /// Subscribe to connectivity events. The stream carries events for all
    /// origins on the bus, including the caller's own.
    fn events(&self) -> tokio::sync::broadcast::Receiver<BusEvent>;
}
