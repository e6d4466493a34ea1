//! Counters for nodes and listeners

use std::sync::atomic::{AtomicU64, Ordering};

/// Node-level statistics
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct NodeStats {
    /// Listeners currently attached
    pub listeners: usize,
    /// Buffers replicated to the fan-out set
    pub buffers_forwarded: u64,
    /// Events replicated to the fan-out set
    pub events_forwarded: u64,
    /// End-of-stream notifications forwarded
    pub eos_forwarded: u64,
    /// Listener deliveries that returned an error
    pub delivery_errors: u64,
    /// Upstream events passed to the producer
    pub upstream_events: u64,
    /// Listeners refused during negotiation or detached by it
    pub rejected_listeners: u64,
}

/// Listener-level statistics
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct SourceStats {
    /// Buffers accepted into the output queue
    pub buffers_received: u64,
    /// Buffers discarded by timestamp reconciliation or state
    pub buffers_dropped: u64,
    /// Buffers handed to the consuming pipeline
    pub buffers_pulled: u64,
    /// Serialized events parked until their timestamp is due
    pub events_queued: u64,
    /// Events delivered to the consuming pipeline
    pub events_forwarded: u64,
    /// Buffers waiting in the output queue
    pub queued_buffers: usize,
    /// Events waiting in the pending queue
    pub pending_events: usize,
}

/// Lock-free node counters
#[derive(Debug, Default)]
pub(crate) struct NodeCounters {
    buffers_forwarded: AtomicU64,
    events_forwarded: AtomicU64,
    eos_forwarded: AtomicU64,
    delivery_errors: AtomicU64,
    upstream_events: AtomicU64,
    rejected_listeners: AtomicU64,
}

impl NodeCounters {
    pub fn inc_buffers(&self) {
        self.buffers_forwarded.fetch_add(1, Ordering::Relaxed);
    }

    pub fn inc_events(&self) {
        self.events_forwarded.fetch_add(1, Ordering::Relaxed);
    }

    pub fn inc_eos(&self) {
        self.eos_forwarded.fetch_add(1, Ordering::Relaxed);
    }

    pub fn inc_delivery_errors(&self) {
        self.delivery_errors.fetch_add(1, Ordering::Relaxed);
    }

    pub fn inc_upstream(&self) {
        self.upstream_events.fetch_add(1, Ordering::Relaxed);
    }

    pub fn add_rejected(&self, n: u64) {
        self.rejected_listeners.fetch_add(n, Ordering::Relaxed);
    }

    pub fn snapshot(&self, listeners: usize) -> NodeStats {
        NodeStats {
            listeners,
            buffers_forwarded: self.buffers_forwarded.load(Ordering::Relaxed),
            events_forwarded: self.events_forwarded.load(Ordering::Relaxed),
            eos_forwarded: self.eos_forwarded.load(Ordering::Relaxed),
            delivery_errors: self.delivery_errors.load(Ordering::Relaxed),
            upstream_events: self.upstream_events.load(Ordering::Relaxed),
            rejected_listeners: self.rejected_listeners.load(Ordering::Relaxed),
        }
    }
}

/// Lock-free listener counters
#[derive(Debug, Default)]
pub(crate) struct SourceCounters {
    buffers_received: AtomicU64,
    buffers_dropped: AtomicU64,
    buffers_pulled: AtomicU64,
    events_queued: AtomicU64,
    events_forwarded: AtomicU64,
}

impl SourceCounters {
    pub fn inc_received(&self) {
        self.buffers_received.fetch_add(1, Ordering::Relaxed);
    }

    pub fn inc_dropped(&self) {
        self.buffers_dropped.fetch_add(1, Ordering::Relaxed);
    }

    pub fn inc_pulled(&self) {
        self.buffers_pulled.fetch_add(1, Ordering::Relaxed);
    }

    pub fn inc_queued_events(&self) {
        self.events_queued.fetch_add(1, Ordering::Relaxed);
    }

    pub fn add_forwarded_events(&self, n: u64) {
        self.events_forwarded.fetch_add(n, Ordering::Relaxed);
    }

    pub fn snapshot(&self, queued_buffers: usize, pending_events: usize) -> SourceStats {
        SourceStats {
            buffers_received: self.buffers_received.load(Ordering::Relaxed),
            buffers_dropped: self.buffers_dropped.load(Ordering::Relaxed),
            buffers_pulled: self.buffers_pulled.load(Ordering::Relaxed),
            events_queued: self.events_queued.load(Ordering::Relaxed),
            events_forwarded: self.events_forwarded.load(Ordering::Relaxed),
            queued_buffers,
            pending_events,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_node_counters_snapshot() {
        let counters = NodeCounters::default();
        counters.inc_buffers();
        counters.inc_buffers();
        counters.inc_eos();
        counters.add_rejected(2);

        let stats = counters.snapshot(3);
        assert_eq!(stats.listeners, 3);
        assert_eq!(stats.buffers_forwarded, 2);
        assert_eq!(stats.eos_forwarded, 1);
        assert_eq!(stats.rejected_listeners, 2);
        assert_eq!(stats.events_forwarded, 0);
    }

    #[test]
    fn test_source_counters_snapshot() {
        let counters = SourceCounters::default();
        counters.inc_received();
        counters.inc_dropped();
        counters.add_forwarded_events(4);

        let stats = counters.snapshot(1, 0);
        assert_eq!(stats.buffers_received, 1);
        assert_eq!(stats.buffers_dropped, 1);
        assert_eq!(stats.events_forwarded, 4);
        assert_eq!(stats.queued_buffers, 1);
    }
}
