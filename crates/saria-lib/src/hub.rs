//! Broadcast hub — in-process publish/subscribe fanout.
//!
//! Best-effort: no retained history, no replay. Listeners that connect
//! after an event was published never see it. Each listener is an unbounded
//! channel of pre-serialized event JSON; a listener whose receiving half
//! went away is evicted on the next publish without disturbing delivery to
//! the rest.

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex, Weak};

use tokio::sync::mpsc;
use tracing::debug;

use saria_core::types::RelayEvent;

struct Sink {
    id: u64,
    tx: mpsc::UnboundedSender<String>,
}

#[derive(Default)]
pub struct BroadcastHub {
    sinks: Arc<Mutex<Vec<Sink>>>,
    next_id: AtomicU64,
}

/// Receiving half of a subscription. Unsubscribes itself on drop.
pub struct Listener {
    id: u64,
    rx: mpsc::UnboundedReceiver<String>,
    registry: Weak<Mutex<Vec<Sink>>>,
}

impl BroadcastHub {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a new listener.
    ///
    /// The connection acknowledgement is already queued on the returned
    /// channel, so a subscriber never observes a gap between connecting and
    /// being ready to receive.
    pub fn subscribe(&self) -> Listener {
        let id = self.next_id.fetch_add(1, Ordering::Relaxed);
        let (tx, rx) = mpsc::unbounded_channel();
        let _ = tx.send(serialize(&RelayEvent::Connected));
        self.sinks
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .push(Sink { id, tx });
        debug!("hub: listener {id} subscribed");
        Listener {
            id,
            rx,
            registry: Arc::downgrade(&self.sinks),
        }
    }

    /// Remove a listener. A no-op if it is already gone.
    pub fn unsubscribe(&self, id: u64) {
        self.sinks
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .retain(|sink| sink.id != id);
    }

    /// Deliver an event to every currently-subscribed listener, in
    /// subscription order.
    ///
    /// Publishes serialize on the registry lock, so all listeners observe
    /// the same event order. A sink that fails to accept the event is
    /// evicted; delivery to the rest continues.
    pub fn publish(&self, event: &RelayEvent) {
        let line = serialize(event);
        let mut sinks = self.sinks.lock().unwrap_or_else(|e| e.into_inner());
        sinks.retain(|sink| {
            let delivered = sink.tx.send(line.clone()).is_ok();
            if !delivered {
                debug!("hub: evicting listener {}", sink.id);
            }
            delivered
        });
    }

    pub fn listener_count(&self) -> usize {
        self.sinks.lock().unwrap_or_else(|e| e.into_inner()).len()
    }
}

impl Listener {
    pub fn id(&self) -> u64 {
        self.id
    }

    /// Receive the next serialized event, or `None` once the hub is gone
    /// and the queue is drained.
    pub async fn recv(&mut self) -> Option<String> {
        self.rx.recv().await
    }

    /// Non-blocking receive.
    pub fn try_recv(&mut self) -> Option<String> {
        self.rx.try_recv().ok()
    }
}

impl Drop for Listener {
    fn drop(&mut self) {
        if let Some(registry) = self.registry.upgrade() {
            registry
                .lock()
                .unwrap_or_else(|e| e.into_inner())
                .retain(|sink| sink.id != self.id);
        }
    }
}

fn serialize(event: &RelayEvent) -> String {
    serde_json::to_string(event).expect("relay events serialize infallibly")
}
