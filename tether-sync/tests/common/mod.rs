// Each integration test compiles as a separate binary that includes this module via `mod common;`.
// Not every test binary uses every helper, so Rust emits spurious dead_code warnings.
#![allow(dead_code)]
//! Shared test utilities for tether-sync integration tests.

use std::sync::{Arc, Mutex};
use std::time::Duration;
use tether_bus::{Bus, Envelope, MessageHandler, MessagePredicate};
use tether_bus_mem::MemoryBus;
use tether_model::{ChannelId, OriginId, Value};
use tether_sync::UpdateFn;

/// Install the fmt subscriber once per test binary, env-filtered.
pub fn init_logging() {
    let _ = tracing_subscriber::fmt()
        .with_env_filter(tracing_subscriber::EnvFilter::from_default_env())
        .try_init();
}

/// Poll `probe` until it holds, panicking after ~2s.
pub async fn wait_until(mut probe: impl FnMut() -> bool) {
    for _ in 0..400 {
        if probe() {
            return;
        }
        tokio::time::sleep(Duration::from_millis(5)).await;
    }
    panic!("condition not reached in time");
}

/// Sleep long enough for any in-flight delivery to have landed, so a test
/// can assert that nothing (more) arrived.
pub async fn settle() {
    tokio::time::sleep(Duration::from_millis(50)).await;
}

/// An `on_update` callback that records every `(old, new)` pair.
pub fn recorder() -> (Arc<Mutex<Vec<(Value, Value)>>>, UpdateFn) {
    let seen: Arc<Mutex<Vec<(Value, Value)>>> = Arc::new(Mutex::new(Vec::new()));
    let sink = seen.clone();
    let callback: UpdateFn = Arc::new(move |old: &Value, new: &Value| {
        sink.lock().unwrap().push((old.clone(), new.clone()));
    });
    (seen, callback)
}

/// Attach a passive observer origin that records every envelope on a
/// channel. Used to assert on the wire traffic itself.
pub async fn observe_channel(
    bus: &Arc<MemoryBus>,
    origin: &str,
    channel: &str,
) -> Arc<Mutex<Vec<Envelope>>> {
    let origin: OriginId = origin.into();
    let channel: ChannelId = channel.into();
    bus.subscribe(&origin, &channel).await.expect("subscribe observer");

    let seen: Arc<Mutex<Vec<Envelope>>> = Arc::new(Mutex::new(Vec::new()));
    let sink = seen.clone();
    let predicate: MessagePredicate = {
        let channel = channel.clone();
        Arc::new(move |env: &Envelope| env.channel == channel)
    };
    let handler: MessageHandler = Arc::new(move |env: &Envelope| {
        sink.lock().unwrap().push(env.clone());
    });
    bus.on_message(&origin, predicate, handler).await;
    seen
}
