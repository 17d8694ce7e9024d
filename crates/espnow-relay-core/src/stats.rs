//! Relay counters shared by the receive handler and the delivery task

use core::sync::atomic::{AtomicU32, Ordering};

/// Lock-free counters updated from the receive context and the delivery task.
pub struct RelayStats {
    received: AtomicU32,
    rejected: AtomicU32,
    queued: AtomicU32,
    dropped: AtomicU32,
    delivered: AtomicU32,
    failed: AtomicU32,
}

/// Point-in-time copy of [`RelayStats`]
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct StatsSnapshot {
    /// Frames handed to the receive handler
    pub received: u32,
    /// Frames that failed to decode
    pub rejected: u32,
    /// Messages accepted by the relay queue
    pub queued: u32,
    /// Messages discarded because the queue was full
    pub dropped: u32,
    /// Deliveries that completed with an HTTP response
    pub delivered: u32,
    /// Deliveries that failed before a response was read
    pub failed: u32,
}

impl RelayStats {
    pub const fn new() -> Self {
        Self {
            received: AtomicU32::new(0),
            rejected: AtomicU32::new(0),
            queued: AtomicU32::new(0),
            dropped: AtomicU32::new(0),
            delivered: AtomicU32::new(0),
            failed: AtomicU32::new(0),
        }
    }

    pub fn record_received(&self) {
        self.received.fetch_add(1, Ordering::Relaxed);
    }

    pub fn record_rejected(&self) {
        self.rejected.fetch_add(1, Ordering::Relaxed);
    }

    pub fn record_queued(&self) {
        self.queued.fetch_add(1, Ordering::Relaxed);
    }

    pub fn record_dropped(&self) {
        self.dropped.fetch_add(1, Ordering::Relaxed);
    }

    pub fn record_delivered(&self) {
        self.delivered.fetch_add(1, Ordering::Relaxed);
    }

    pub fn record_failed(&self) {
        self.failed.fetch_add(1, Ordering::Relaxed);
    }

    pub fn snapshot(&self) -> StatsSnapshot {
        StatsSnapshot {
            received: self.received.load(Ordering::Relaxed),
            rejected: self.rejected.load(Ordering::Relaxed),
            queued: self.queued.load(Ordering::Relaxed),
            dropped: self.dropped.load(Ordering::Relaxed),
            delivered: self.delivered.load(Ordering::Relaxed),
            failed: self.failed.load(Ordering::Relaxed),
        }
    }
}

impl Default for RelayStats {
    fn default() -> Self {
        Self::new()
    }
}

impl core::fmt::Display for StatsSnapshot {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        write!(
            f,
            "received={} rejected={} queued={} dropped={} delivered={} failed={}",
            self.received, self.rejected, self.queued, self.dropped, self.delivered, self.failed
        )
    }
}
