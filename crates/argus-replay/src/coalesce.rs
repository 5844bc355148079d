//! Render coalescing
//!
//! High-frequency delta events are decoupled from expensive re-render work
//! by a debounce timer per render key: scheduling a key that already has a
//! pending timer is a no-op, so any number of deltas inside one window
//! collapse into a single emission on the drain channel.

use crate::reconciler::RenderKey;
use std::collections::HashSet;
use std::sync::{Arc, Mutex};
use std::time::Duration;
use tokio::sync::mpsc;

/// Debounced, per-key render scheduler.
#[derive(Clone)]
pub struct RenderCoalescer {
    interval: Duration,
    pending: Arc<Mutex<HashSet<RenderKey>>>,
    tx: mpsc::UnboundedSender<RenderKey>,
}

impl RenderCoalescer {
    /// Create a coalescer emitting at most once per `interval` per key.
    /// The receiver yields the keys whose windows elapsed.
    #[must_use]
    pub fn new(interval: Duration) -> (Self, mpsc::UnboundedReceiver<RenderKey>) {
        let (tx, rx) = mpsc::unbounded_channel();
        (
            Self {
                interval,
                pending: Arc::new(Mutex::new(HashSet::new())),
                tx,
            },
            rx,
        )
    }

    /// Schedule a render for `key`. Returns false when a timer for the key
    /// is already pending (the render is coalesced into it).
    pub fn schedule(&self, key: RenderKey) -> bool {
        {
            let mut pending = self.pending.lock().expect("pending lock poisoned");
            if !pending.insert(key) {
                return false;
            }
        }
        let interval = self.interval;
        let pending = self.pending.clone();
        let tx = self.tx.clone();
        tokio::spawn(async move {
            tokio::time::sleep(interval).await;
            pending.lock().expect("pending lock poisoned").remove(&key);
            // receiver gone means the observer went away; nothing to render
            let _ = tx.send(key);
        });
        true
    }

    /// Number of keys with a pending timer.
    #[must_use]
    pub fn pending_count(&self) -> usize {
        self.pending.lock().expect("pending lock poisoned").len()
    }
}
