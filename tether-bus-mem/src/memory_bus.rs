//! MemoryBus — in-memory Bus implementation
//!
//! One endpoint can carry any number of origins. Each (origin, channel)
//! subscription runs a receive task pulling envelopes off the shared
//! broker; subscriptions are refcounted so a publisher and a subscriber of
//! the same origin can independently join and leave the same channel.

use crate::BusNetwork;
use std::collections::{HashMap, HashSet};
use std::sync::{Arc, Mutex as StdMutex, RwLock as StdRwLock};
use tether_bus::{Bus, BusError, BusEvent, Envelope, HandlerId, MessageHandler, MessagePredicate};
use tether_model::{ChannelId, OriginId, SyncMessage};
use tokio::sync::{broadcast, Mutex};
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::warn;

struct Subscription {
    count: usize,
    token: CancellationToken,
    task: JoinHandle<()>,
}

struct HandlerEntry {
    predicate: MessagePredicate,
    handler: MessageHandler,
}

type HandlerTable = HashMap<OriginId, HashMap<HandlerId, HandlerEntry>>;

/// In-memory [`Bus`] endpoint attached to a shared [`BusNetwork`].
pub struct MemoryBus {
    network: BusNetwork,
    subscriptions: Mutex<HashMap<(OriginId, ChannelId), Subscription>>,
    handlers: Arc<StdRwLock<HandlerTable>>,
    fail_next_publish: StdMutex<HashSet<OriginId>>,
}

impl MemoryBus {
    pub fn new(network: &BusNetwork) -> Self {
        Self {
            network: network.clone(),
            subscriptions: Mutex::new(HashMap::new()),
            handlers: Arc::new(StdRwLock::new(HashMap::new())),
            fail_next_publish: StdMutex::new(HashSet::new()),
        }
    }

    /// Make the next `publish` from `origin` fail with
    /// [`BusError::Publish`] without delivering. Test hook for exercising
    /// the at-most-once publish path.
    pub fn fail_next_publish(&self, origin: &OriginId) {
        if let Ok(mut failing) = self.fail_next_publish.lock() {
            failing.insert(origin.clone());
        }
    }

    fn take_fail_flag(&self, origin: &OriginId) -> bool {
        self.fail_next_publish
            .lock()
            .map(|mut failing| failing.remove(origin))
            .unwrap_or(false)
    }

    /// Receive task body for one (origin, channel) subscription: skip own
    /// messages, then fan each envelope out to the origin's matching
    /// handlers. Handlers run under the table's read lock; `off` takes the
    /// write lock, so it cannot return while a deregistered handler is
    /// mid-flight, and once it has returned the handler is gone from every
    /// later dispatch. Handlers must not call back into the bus.
    async fn pump(
        origin: OriginId,
        mut receiver: broadcast::Receiver<Envelope>,
        handlers: Arc<StdRwLock<HandlerTable>>,
        token: CancellationToken,
    ) {
        loop {
            tokio::select! {
                _ = token.cancelled() => break,
                result = receiver.recv() => {
                    match result {
                        Ok(envelope) => {
                            if envelope.from == origin {
                                continue;
                            }
                            let Ok(table) = handlers.read() else { break };
                            if let Some(entries) = table.get(&origin) {
                                for entry in entries.values() {
                                    if (entry.predicate)(&envelope) {
                                        (entry.handler)(&envelope);
                                    }
                                }
                            }
                        }
                        Err(broadcast::error::RecvError::Lagged(n)) => {
                            warn!(lagged = n, origin = %origin, "memory bus receiver lagged");
                        }
                        Err(broadcast::error::RecvError::Closed) => break,
                    }
                }
            }
        }
    }
}

#[async_trait::async_trait]
impl Bus for MemoryBus {
    async fn subscribe(&self, origin: &OriginId, channel: &ChannelId) -> Result<(), BusError> {
        let mut subscriptions = self.subscriptions.lock().await;
        let key = (origin.clone(), channel.clone());
        if let Some(sub) = subscriptions.get_mut(&key) {
            sub.count += 1;
        } else {
            let receiver = self.network.get_or_create(channel).await.subscribe();
            let token = CancellationToken::new();
            let task = tokio::spawn(Self::pump(
                origin.clone(),
                receiver,
                self.handlers.clone(),
                token.clone(),
            ));
            subscriptions.insert(
                key,
                Subscription {
                    count: 1,
                    token,
                    task,
                },
            );
        }
        drop(subscriptions);

        self.network.announce(BusEvent::PeerSubscribed {
            channel: channel.clone(),
            origin: origin.clone(),
        });
        Ok(())
    }

    async fn unsubscribe(&self, origin: &OriginId, channel: &ChannelId) {
        let key = (origin.clone(), channel.clone());
        let finished = {
            let mut subscriptions = self.subscriptions.lock().await;
            let last = match subscriptions.get_mut(&key) {
                Some(sub) if sub.count > 1 => {
                    sub.count -= 1;
                    false
                }
                Some(_) => true,
                None => false,
            };
            if last {
                subscriptions.remove(&key)
            } else {
                None
            }
        };
        // Awaiting the pump guarantees no handler runs for this
        // subscription once unsubscribe returns.
        if let Some(sub) = finished {
            sub.token.cancel();
            let _ = sub.task.await;
        }
    }

    async fn publish(
        &self,
        origin: &OriginId,
        channel: &ChannelId,
        message: SyncMessage,
    ) -> Result<(), BusError> {
        if self.take_fail_flag(origin) {
            return Err(BusError::Publish("injected publish failure".into()));
        }
        {
            let subscriptions = self.subscriptions.lock().await;
            if !subscriptions.contains_key(&(origin.clone(), channel.clone())) {
                return Err(BusError::NotSubscribed(channel.clone()));
            }
        }
        let sender = self.network.get_or_create(channel).await;
        let envelope = Envelope::new(channel.clone(), message, origin.clone());
        // No receivers yet is not a failure; the message is simply unheard.
        let _ = sender.send(envelope);
        Ok(())
    }

    async fn on_message(
        &self,
        origin: &OriginId,
        predicate: MessagePredicate,
        handler: MessageHandler,
    ) -> HandlerId {
        let id = HandlerId::generate();
        if let Ok(mut table) = self.handlers.write() {
            table
                .entry(origin.clone())
                .or_default()
                .insert(id, HandlerEntry { predicate, handler });
        }
        id
    }

    async fn off(&self, origin: &OriginId, id: HandlerId) {
        // The write lock waits out any dispatch currently holding the read
        // lock, so a removed handler is never mid-flight once this returns.
        if let Ok(mut table) = self.handlers.write() {
            if let Some(entries) = table.get_mut(origin) {
                entries.remove(&id);
                if entries.is_empty() {
                    table.remove(origin);
                }
            }
        }
    }

    fn events(&self) -> broadcast::Receiver<BusEvent> {
        self.network.event_receiver()
    }
}
