//! Publisher — emits local cell changes onto a channel
//!
//! Hooks the cell with a local-only watcher, queues each changed value on
//! an mpsc channel, and drains the queue from a single emit task that
//! allocates versions, stamps timestamps and publishes. Routing the
//! out-of-band `publish_current` through the same queue keeps emission
//! order equal to version order.
//!
//! Publish failures are logged and dropped: delivery is at-most-once, and
//! a lagging mirror converges on the next change or an explicit
//! `publish_current`.

use crate::{Cell, ConflictResolver, SyncError, VersionAllocator};
use std::sync::Arc;
use tether_bus::{Bus, BusEvent};
use tether_model::{ChannelId, Clock, OriginId, StateId, SyncMessage, Value};
use tokio::sync::broadcast;
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::{debug, warn};
use uuid::Uuid;

/// Configuration for one publisher registration.
pub struct PublisherOptions {
    pub state_id: StateId,
    pub channel: ChannelId,
    /// Re-publish the current value whenever another origin joins the
    /// channel (resync for late joiners).
    pub announce_to_joiners: bool,
    /// Two-way mode: record the provenance of every emitted message into
    /// the resolver shared with this participant's subscriber.
    pub resolver: Option<ConflictResolver>,
}

impl PublisherOptions {
    pub fn new(state_id: impl Into<StateId>, channel: impl Into<ChannelId>) -> Self {
        Self {
            state_id: state_id.into(),
            channel: channel.into(),
            announce_to_joiners: false,
            resolver: None,
        }
    }
}

enum Emit {
    /// A local mutation produced this value.
    Changed(Value),
    /// Out-of-band request: read and publish the cell's current value.
    Current,
}

/// Active publisher registration. Returned by [`Publisher::start`]; must
/// be retained and passed to [`Publisher::stop`] to release the watch, the
/// emit task and the channel subscription.
///
/// At most one publisher should observe a given (cell, state id) pair;
/// this is not enforced, and a duplicate registration emits every change
/// twice with independent version counters.
pub struct Publisher {
    bus: Arc<dyn Bus>,
    cell: Cell,
    origin: OriginId,
    channel: ChannelId,
    watch_id: String,
    emit_tx: mpsc::UnboundedSender<Emit>,
    token: CancellationToken,
    emit_task: JoinHandle<()>,
    announce_task: Option<JoinHandle<()>>,
}

impl Publisher {
    /// Subscribe `origin` to the channel, hook the cell and start emitting.
    pub async fn start(
        bus: Arc<dyn Bus>,
        cell: Cell,
        allocator: VersionAllocator,
        clock: Arc<dyn Clock>,
        origin: OriginId,
        options: PublisherOptions,
    ) -> Result<Self, SyncError> {
        let PublisherOptions {
            state_id,
            channel,
            announce_to_joiners,
            resolver,
        } = options;

        bus.subscribe(&origin, &channel).await?;

        let (emit_tx, emit_rx) = mpsc::unbounded_channel();
        let watch_id = format!("tether/publisher/{}", Uuid::new_v4());
        let hook_tx = emit_tx.clone();
        let hooked = cell.registry().watch_local(cell.key(), &watch_id, move |_, new| {
            let _ = hook_tx.send(Emit::Changed(new.clone()));
        });
        if let Err(e) = hooked {
            bus.unsubscribe(&origin, &channel).await;
            return Err(e.into());
        }

        let token = CancellationToken::new();
        let emit_task = tokio::spawn(Self::emit_loop(
            bus.clone(),
            cell.clone(),
            allocator,
            clock,
            origin.clone(),
            state_id.clone(),
            channel.clone(),
            resolver,
            emit_rx,
            token.clone(),
        ));

        let announce_task = announce_to_joiners.then(|| {
            tokio::spawn(Self::announce_loop(
                bus.events(),
                origin.clone(),
                channel.clone(),
                emit_tx.clone(),
                token.clone(),
            ))
        });

        Ok(Self {
            bus,
            cell,
            origin,
            channel,
            watch_id,
            emit_tx,
            token,
            emit_task,
            announce_task,
        })
    }

    /// Publish the cell's current value without waiting for a mutation.
    /// Goes through the emit queue, not the change hook, so it is never
    /// double counted as a local change.
    pub fn publish_current(&self) -> Result<(), SyncError> {
        self.emit_tx
            .send(Emit::Current)
            .map_err(|_| SyncError::Stopped)
    }

    /// Tear the registration down. Safe to call while a change event is in
    /// flight; once this returns, no further message is emitted for it.
    pub async fn stop(self) {
        // Unhook first so nothing new enters the queue, then cancel and
        // await the tasks so in-flight emission finishes or aborts.
        match self.cell.registry().unwatch(self.cell.key(), &self.watch_id) {
            Ok(()) | Err(tether_registry::RegistryError::NotFound(_)) => {}
            Err(e) => warn!(error = %e, "failed to unhook publisher watch"),
        }
        self.token.cancel();
        let _ = self.emit_task.await;
        if let Some(task) = self.announce_task {
            let _ = task.await;
        }
        self.bus.unsubscribe(&self.origin, &self.channel).await;
    }

    #[allow(clippy::too_many_arguments)]
    async fn emit_loop(
        bus: Arc<dyn Bus>,
        cell: Cell,
        allocator: VersionAllocator,
        clock: Arc<dyn Clock>,
        origin: OriginId,
        state_id: StateId,
        channel: ChannelId,
        resolver: Option<ConflictResolver>,
        mut emit_rx: mpsc::UnboundedReceiver<Emit>,
        token: CancellationToken,
    ) {
        loop {
            let emit = tokio::select! {
                _ = token.cancelled() => break,
                emit = emit_rx.recv() => match emit {
                    Some(emit) => emit,
                    None => break,
                },
            };
            let value = match emit {
                Emit::Changed(value) => value,
                Emit::Current => match cell.get() {
                    Ok(value) => value,
                    Err(e) => {
                        warn!(error = %e, state_id = %state_id, "cannot publish current value");
                        continue;
                    }
                },
            };

            let version = allocator.next(&state_id);
            let message = SyncMessage::new(state_id.clone(), value, version, clock.now_ms());
            if let Some(resolver) = &resolver {
                // The cell holds this value now whether or not the publish
                // lands, so provenance advances either way.
                resolver.record(&message, &origin);
            }
            if let Err(e) = bus.publish(&origin, &channel, message).await {
                warn!(
                    error = %e,
                    state_id = %state_id,
                    version,
                    "publish failed; dropping update"
                );
            }
        }
    }

    async fn announce_loop(
        mut events: broadcast::Receiver<BusEvent>,
        origin: OriginId,
        channel: ChannelId,
        emit_tx: mpsc::UnboundedSender<Emit>,
        token: CancellationToken,
    ) {
        loop {
            tokio::select! {
                _ = token.cancelled() => break,
                event = events.recv() => match event {
                    Ok(BusEvent::PeerSubscribed { channel: joined, origin: peer }) => {
                        if joined == channel && peer != origin {
                            debug!(peer = %peer, channel = %channel, "announcing current value to joiner");
                            let _ = emit_tx.send(Emit::Current);
                        }
                    }
                    Err(broadcast::error::RecvError::Lagged(n)) => {
                        warn!(lagged = n, "bus event stream lagged");
                    }
                    Err(broadcast::error::RecvError::Closed) => break,
                },
            }
        }
    }
}
