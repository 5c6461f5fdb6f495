//! Atomic counters for connection metrics
//!
//! Lock-free counters updated from the listener, keepalive and caller paths.

use std::sync::atomic::{AtomicU64, Ordering};

/// Per-manager counters
#[derive(Debug, Default)]
pub struct ConnectionMetrics {
    // Lifecycle
    pub handles_opened: AtomicU64,
    pub connects: AtomicU64,
    pub disconnects: AtomicU64,
    pub errors: AtomicU64,

    // Inbound
    pub events_dispatched: AtomicU64,
    pub events_unhandled: AtomicU64,

    // Outbound
    pub emitted: AtomicU64,
    pub dropped_not_connected: AtomicU64,
    pub keepalives_sent: AtomicU64,
    pub acks_received: AtomicU64,
}

impl ConnectionMetrics {
    pub fn new() -> Self {
        Self::default()
    }

    #[inline]
    pub fn handle_opened(&self) {
        self.handles_opened.fetch_add(1, Ordering::Relaxed);
    }

    #[inline]
    pub fn connected(&self) {
        self.connects.fetch_add(1, Ordering::Relaxed);
    }

    #[inline]
    pub fn disconnected(&self) {
        self.disconnects.fetch_add(1, Ordering::Relaxed);
    }

    #[inline]
    pub fn error(&self) {
        self.errors.fetch_add(1, Ordering::Relaxed);
    }

    #[inline]
    pub fn event_dispatched(&self) {
        self.events_dispatched.fetch_add(1, Ordering::Relaxed);
    }

    #[inline]
    pub fn event_unhandled(&self) {
        self.events_unhandled.fetch_add(1, Ordering::Relaxed);
    }

    #[inline]
    pub fn emit(&self) {
        self.emitted.fetch_add(1, Ordering::Relaxed);
    }

    #[inline]
    pub fn dropped(&self) {
        self.dropped_not_connected.fetch_add(1, Ordering::Relaxed);
    }

    #[inline]
    pub fn keepalive(&self) {
        self.keepalives_sent.fetch_add(1, Ordering::Relaxed);
    }

    #[inline]
    pub fn ack_received(&self) {
        self.acks_received.fetch_add(1, Ordering::Relaxed);
    }

    /// Get snapshot of all metrics
    pub fn snapshot(&self) -> MetricsSnapshot {
        MetricsSnapshot {
            handles_opened: self.handles_opened.load(Ordering::Relaxed),
            connects: self.connects.load(Ordering::Relaxed),
            disconnects: self.disconnects.load(Ordering::Relaxed),
            errors: self.errors.load(Ordering::Relaxed),
            events_dispatched: self.events_dispatched.load(Ordering::Relaxed),
            events_unhandled: self.events_unhandled.load(Ordering::Relaxed),
            emitted: self.emitted.load(Ordering::Relaxed),
            dropped_not_connected: self.dropped_not_connected.load(Ordering::Relaxed),
            keepalives_sent: self.keepalives_sent.load(Ordering::Relaxed),
            acks_received: self.acks_received.load(Ordering::Relaxed),
        }
    }
}

/// Snapshot of metrics for reporting
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct MetricsSnapshot {
    pub handles_opened: u64,
    pub connects: u64,
    pub disconnects: u64,
    pub errors: u64,
    pub events_dispatched: u64,
    pub events_unhandled: u64,
    pub emitted: u64,
    pub dropped_not_connected: u64,
    pub keepalives_sent: u64,
    pub acks_received: u64,
}
