// src/stream.rs
//
// The process-wide table of live stream subscribers and the broadcast fan-out.
// Delivery is best-effort, at-most-once: a subscriber whose bounded queue is
// saturated is evicted immediately so it can never block the polling loop or
// the other subscribers.

use std::collections::HashMap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex};

use metrics::{counter, gauge};
use serde_json::{json, Value};
use tokio::sync::mpsc::{self, error::TrySendError};

pub type SubscriberId = u64;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EventKind {
    Connected,
    RateUpdate,
    Error,
    Ping,
    Shutdown,
}

impl EventKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            EventKind::Connected => "connected",
            EventKind::RateUpdate => "rateUpdate",
            EventKind::Error => "error",
            EventKind::Ping => "ping",
            EventKind::Shutdown => "shutdown",
        }
    }
}

/// One queued outbound message: an event tag plus its JSON payload.
#[derive(Debug, Clone)]
pub struct Envelope {
    pub kind: EventKind,
    pub data: Value,
}

impl Envelope {
    pub fn new(kind: EventKind, data: Value) -> Self {
        Self { kind, data }
    }

    /// Keep-alive frame carrying a millisecond timestamp.
    pub fn ping() -> Self {
        Self::new(
            EventKind::Ping,
            json!({ "timestamp": chrono::Utc::now().timestamp_millis() }),
        )
    }
}

pub struct Registry {
    subscribers: Mutex<HashMap<SubscriberId, mpsc::Sender<Envelope>>>,
    next_id: AtomicU64,
    capacity: usize,
}

impl Registry {
    /// `capacity` bounds each subscriber's pending-message queue.
    pub fn new(capacity: usize) -> Self {
        Self {
            subscribers: Mutex::new(HashMap::new()),
            next_id: AtomicU64::new(1),
            capacity,
        }
    }

    /// Allocate a unique id and a bounded queue for one new subscriber.
    pub fn register(&self) -> (SubscriberId, mpsc::Receiver<Envelope>) {
        let id = self.next_id.fetch_add(1, Ordering::Relaxed);
        let (tx, rx) = mpsc::channel(self.capacity);

        let total = {
            let mut subs = self.subscribers.lock().expect("registry mutex poisoned");
            subs.insert(id, tx);
            subs.len()
        };
        gauge!("relay_stream_subscribers").set(total as f64);
        tracing::info!(subscriber = id, total, "stream subscriber connected");

        (id, rx)
    }

    /// Idempotent removal; unknown ids are ignored.
    pub fn unregister(&self, id: SubscriberId) {
        let (removed, total) = {
            let mut subs = self.subscribers.lock().expect("registry mutex poisoned");
            (subs.remove(&id).is_some(), subs.len())
        };
        if removed {
            gauge!("relay_stream_subscribers").set(total as f64);
            tracing::info!(subscriber = id, total, "stream subscriber disconnected");
        }
    }

    pub fn subscriber_count(&self) -> usize {
        self.subscribers
            .lock()
            .expect("registry mutex poisoned")
            .len()
    }

    /// Fan one event out to every live subscriber with a non-blocking
    /// enqueue. A full queue evicts its subscriber on the spot.
    pub fn publish(&self, kind: EventKind, data: Value) {
        let mut subs = self.subscribers.lock().expect("registry mutex poisoned");
        if subs.is_empty() {
            return;
        }

        let envelope = Envelope::new(kind, data);
        let mut evicted: Vec<SubscriberId> = Vec::new();
        for (id, tx) in subs.iter() {
            match tx.try_send(envelope.clone()) {
                Ok(()) => {}
                Err(TrySendError::Full(_)) => {
                    tracing::warn!(subscriber = *id, "queue full, evicting subscriber");
                    evicted.push(*id);
                }
                Err(TrySendError::Closed(_)) => evicted.push(*id),
            }
        }

        for id in evicted {
            subs.remove(&id);
            counter!("relay_subscribers_evicted_total").increment(1);
        }
        gauge!("relay_stream_subscribers").set(subs.len() as f64);
    }

    /// Best-effort shutdown notification to everyone, then clear the table.
    /// Enqueue failures are ignored; the process is exiting either way.
    pub fn shutdown(&self) {
        let mut subs = self.subscribers.lock().expect("registry mutex poisoned");
        let envelope = Envelope::new(
            EventKind::Shutdown,
            json!({ "message": "Server shutting down" }),
        );
        for tx in subs.values() {
            let _ = tx.try_send(envelope.clone());
        }
        let notified = subs.len();
        subs.clear();
        gauge!("relay_stream_subscribers").set(0.0);
        tracing::info!(notified, "registry cleared for shutdown");
    }
}

/// Unregisters its subscriber when the owning stream is dropped, so a closed
/// transport cleans up without any cooperative handshake.
pub struct SubscriberGuard {
    registry: Arc<Registry>,
    id: SubscriberId,
}

impl SubscriberGuard {
    pub fn new(registry: Arc<Registry>, id: SubscriberId) -> Self {
        Self { registry, id }
    }
}

impl Drop for SubscriberGuard {
    fn drop(&mut self) {
        self.registry.unregister(self.id);
    }
}
