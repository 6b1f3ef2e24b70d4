//! Channel envelope and handler identity

use serde::{Deserialize, Serialize};
use std::fmt;
use tether_model::{ChannelId, OriginId, SyncMessage};
use uuid::Uuid;

/// What the bus routes: one sync message, tagged with the channel it was
/// published on and the origin that published it.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Envelope {
    /// Channel the message was published on.
    pub channel: ChannelId,
    /// The sync payload itself.
    pub data: SyncMessage,
    /// Origin that published the message.
    pub from: OriginId,
}

impl Envelope {
    pub fn new(channel: ChannelId, data: SyncMessage, from: OriginId) -> Self {
        Self {
            channel,
            data,
            from,
        }
    }
}

/// Opaque handle for a registered message handler; pass back to
/// [`Bus::off`](crate::Bus::off) to deregister.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct HandlerId(Uuid);

impl HandlerId {
    /// Allocate a fresh handler id.
    pub fn generate() -> Self {
        Self(Uuid::new_v4())
    }
}

impl fmt::Display for HandlerId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        self.0.fmt(f)
    }
}
