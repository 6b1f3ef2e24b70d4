//! Subscriber — mirrors channel messages into a local cell
//!
//! Registers a bus handler filtered on (channel, state id) and lands each
//! admitted value through the registry's apply path, which the local
//! publisher hook does not observe — that split is what stops a two-way
//! pair from echoing updates back and forth forever.

use crate::{Cell, ConflictResolver, SyncError, Verdict};
use std::sync::Arc;
use tether_bus::{Bus, Envelope, HandlerId, MessageHandler, MessagePredicate};
use tether_model::{ChannelId, OriginId, StateId, Value};
use tracing::{debug, warn};

/// Callback observing applied updates, invoked with `(old, new)`.
pub type UpdateFn = Arc<dyn Fn(&Value, &Value) + Send + Sync>;

/// Configuration for one subscriber registration.
pub struct SubscriberOptions {
    pub state_id: StateId,
    pub channel: ChannelId,
    /// How incoming messages reach the cell: unconditional overwrite
    /// (one-way, single authoritative writer) or gated through a shared
    /// conflict resolver (two-way).
    pub policy: ApplyPolicy,
    /// Invoked after each applied update.
    pub on_update: Option<UpdateFn>,
}

impl SubscriberOptions {
    pub fn new(state_id: impl Into<StateId>, channel: impl Into<ChannelId>) -> Self {
        Self {
            state_id: state_id.into(),
            channel: channel.into(),
            policy: ApplyPolicy::Overwrite,
            on_update: None,
        }
    }
}

/// Active subscriber registration. Returned by [`Subscriber::start`]; must
/// be retained and passed to [`Subscriber::stop`] to release the handler
/// and the channel subscription.
pub struct Subscriber {
    bus: Arc<dyn Bus>,
    origin: OriginId,
    channel: ChannelId,
    handler: HandlerId,
}

impl Subscriber {
    /// Subscribe `origin` to the channel and start mirroring into `cell`.
    pub async fn start(
        bus: Arc<dyn Bus>,
        cell: Cell,
        origin: OriginId,
        options: SubscriberOptions,
    ) -> Result<Self, SyncError> {
        let SubscriberOptions {
            state_id,
            channel,
            policy,
            on_update,
        } = options;

        bus.subscribe(&origin, &channel).await?;

        let predicate: MessagePredicate = {
            let channel = channel.clone();
            let state_id = state_id.clone();
            Arc::new(move |env: &Envelope| env.channel == channel && env.data.state_id == state_id)
        };
        let handler: MessageHandler = Arc::new(move |env: &Envelope| {
            apply_envelope(&cell, &policy, on_update.as_ref(), env);
        });
        let handler = bus.on_message(&origin, predicate, handler).await;

        Ok(Self {
            bus,
            origin,
            channel,
            handler,
        })
    }

    /// Reserved: ask the publisher for the current value. There is no
    /// request/response flow behind this; late joiners are served by the
    /// publisher's `announce_to_joiners` / `publish_current` instead.
    pub fn request_current(&self) -> Result<(), SyncError> {
        Err(SyncError::Unsupported("request_current"))
    }

    /// Tear the registration down. Safe to call while a delivery is in
    /// flight; once this returns, no further update is applied and no
    /// listener is invoked for it.
    pub async fn stop(self) {
        self.bus.off(&self.origin, self.handler).await;
        self.bus.unsubscribe(&self.origin, &self.channel).await;
    }
}

/// One delivery: judge, apply, notify. Conflict-resolution discards are
/// steady-state behavior, logged at debug and otherwise invisible.
fn apply_envelope(
    cell: &Cell,
    policy: &ApplyPolicy,
    on_update: Option<&UpdateFn>,
    env: &Envelope,
) {
    if let ApplyPolicy::LastWriteWins(resolver) = policy {
        if resolver.admit(&env.data, &env.from) == Verdict::Stale {
            debug!(
                state_id = %env.data.state_id,
                from = %env.from,
                version = env.data.version,
                "discarding stale update"
            );
            return;
        }
    }

    let old = match cell.get() {
        Ok(value) => value,
        Err(e) => {
            warn!(error = %e, key = cell.key(), "mirrored cell is unreadable; dropping update");
            return;
        }
    };
    if let Err(e) = cell.apply(env.data.value.clone()) {
        warn!(error = %e, key = cell.key(), "failed to apply remote update");
        return;
    }
    if let Some(on_update) = on_update {
        on_update(&old, &env.data.value);
    }
}

/// Apply policy for incoming messages.
pub enum ApplyPolicy {
    /// Apply every matching message unconditionally. One-way mode: the
    /// single publisher is authoritative, no version check needed.
    Overwrite,
    /// Gate through a shared [`ConflictResolver`]; stale messages are
    /// dropped with no mutation and no listener invocation.
    LastWriteWins(ConflictResolver),
}
