//! Per-node traffic counters.

use std::fmt;
use std::sync::atomic::{AtomicU64, Ordering};

use serde::Serialize;

/// Count of something a node's runtime did. Only ever goes up.
pub struct Counter(AtomicU64);

impl Counter {
    pub fn new() -> Self {
        Self(AtomicU64::new(0))
    }

    /// Add one. Relaxed ordering; nothing else is published through it.
    pub fn inc(&self) {
        self.0.fetch_add(1, Ordering::Relaxed);
    }

    pub fn get(&self) -> u64 {
        self.0.load(Ordering::Relaxed)
    }
}

impl Default for Counter {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Debug for Counter {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_tuple("Counter").field(&self.get()).finish()
    }
}

impl Serialize for Counter {
    fn serialize<S: serde::Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        self.get().serialize(serializer)
    }
}

/// Counters updated by a node's runtime. Read them through
/// [`Node::metrics`](crate::Node::metrics).
#[derive(Debug, Default, Serialize)]
pub struct NodeMetrics {
    /// Events queued for the application, including STOP.
    pub events_received: Counter,
    pub whispers_sent: Counter,
    pub shouts_sent: Counter,
    pub peers_entered: Counter,
    pub peers_exited: Counter,
    /// Outbound messages dropped because a peer's queue was full or gone.
    pub messages_dropped: Counter,
    /// Events dropped because the application left the event queue full.
    pub events_dropped: Counter,
}

impl NodeMetrics {
    /// Point-in-time copy of every counter.
    pub fn snapshot(&self) -> MetricsSnapshot {
        MetricsSnapshot {
            events_received: self.events_received.get(),
            whispers_sent: self.whispers_sent.get(),
            shouts_sent: self.shouts_sent.get(),
            peers_entered: self.peers_entered.get(),
            peers_exited: self.peers_exited.get(),
            messages_dropped: self.messages_dropped.get(),
            events_dropped: self.events_dropped.get(),
        }
    }
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct MetricsSnapshot {
    pub events_received: u64,
    pub whispers_sent: u64,
    pub shouts_sent: u64,
    pub peers_entered: u64,
    pub peers_exited: u64,
    pub messages_dropped: u64,
    pub events_dropped: u64,
}
