//! Per-key notification pump
//!
//! Watch callbacks run synchronously on the mutating thread but never under
//! the table lock. Each key has a FIFO of pending invocations: mutations
//! enqueue while still holding the lock (so queue order is mutation order)
//! and drain after releasing it. Whichever thread claims the drain flag
//! empties the queue; a callback that mutates its own key enqueues, fails to
//! claim, and returns — the outer drain picks the event up next iteration,
//! so reentrant listeners neither deadlock nor recurse unboundedly.

use crate::types::WatchFn;
use std::collections::{HashMap, VecDeque};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex};
use tether_model::Value;

/// One pending callback invocation.
pub(crate) struct Pending {
    pub callback: WatchFn,
    pub old: Value,
    pub new: Value,
}

#[derive(Default)]
struct KeyQueue {
    pending: Mutex<VecDeque<Pending>>,
    draining: AtomicBool,
}

/// Ordered, reentrancy-safe callback dispatch, one queue per key.
#[derive(Default)]
pub(crate) struct NotifyPump {
    queues: Mutex<HashMap<String, Arc<KeyQueue>>>,
}

impl NotifyPump {
    /// Append invocations for `key`. Callers hold the table lock here, which
    /// is what makes queue order match mutation order.
    pub fn enqueue(&self, key: &str, batch: Vec<Pending>) {
        if batch.is_empty() {
            return;
        }
        let queue = self.queue_for(key);
        let Ok(mut pending) = queue.pending.lock() else {
            return;
        };
        pending.extend(batch);
    }

    /// Run pending invocations for `key` until its queue is empty.
    /// Must be called with no registry lock held.
    pub fn drain(&self, key: &str) {
        let queue = self.queue_for(key);
        loop {
            if queue
                .draining
                .compare_exchange(false, true, Ordering::SeqCst, Ordering::SeqCst)
                .is_err()
            {
                // Another invocation (possibly further up this thread's own
                // stack) owns the drain and will run our events in order.
                return;
            }

            loop {
                let next = {
                    let Ok(mut pending) = queue.pending.lock() else {
                        break;
                    };
                    pending.pop_front()
                };
                match next {
                    Some(p) => (p.callback)(&p.old, &p.new),
                    None => break,
                }
            }

            queue.draining.store(false, Ordering::SeqCst);

            let empty = queue.pending.lock().map(|q| q.is_empty()).unwrap_or(true);
            if empty {
                return;
            }
            // A producer enqueued between our last pop and the flag release;
            // take another turn so nothing is stranded.
        }
    }

    /// Drop the queue and any undelivered events for a removed key. Called
    /// under the table lock, so nothing can enqueue for the key afterwards
    /// until it is registered again.
    pub fn forget(&self, key: &str) {
        let Ok(mut queues) = self.queues.lock() else {
            return;
        };
        if let Some(queue) = queues.remove(key) {
            if let Ok(mut pending) = queue.pending.lock() {
                pending.clear();
            }
        }
    }

    fn queue_for(&self, key: &str) -> Arc<KeyQueue> {
        let Ok(mut queues) = self.queues.lock() else {
            return Arc::new(KeyQueue::default());
        };
        queues.entry(key.to_string()).or_default().clone()
    }
}
