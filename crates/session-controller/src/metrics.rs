//! Lock-free counters describing live controller state.
//!
//! Shared between the dispatcher/cleanup paths (which update values) and
//! whatever observability layer embeds the controller (which reads
//! snapshots). All fields are atomic for lock-free concurrent access.

use std::sync::atomic::{AtomicU64, AtomicUsize, Ordering};
use std::sync::Arc;

/// Live gauges and counters for one controller instance.
#[derive(Debug, Default)]
pub struct SessionMetrics {
    /// Rooms with at least one participant.
    active_rooms: AtomicUsize,
    /// Registered connections.
    active_connections: AtomicUsize,
    /// Joined peers across all rooms.
    active_peers: AtomicUsize,
    /// Live transports across all rooms.
    active_transports: AtomicUsize,
    /// Live producers across all rooms.
    active_producers: AtomicUsize,
    /// Live consumers across all rooms.
    active_consumers: AtomicUsize,
    /// Engine calls that failed during resource creation.
    engine_create_failures: AtomicU64,
    /// Engine calls that failed during teardown (best-effort closes).
    engine_close_failures: AtomicU64,
}

/// Point-in-time view of [`SessionMetrics`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct MetricsSnapshot {
    pub rooms: usize,
    pub connections: usize,
    pub peers: usize,
    pub transports: usize,
    pub producers: usize,
    pub consumers: usize,
    pub engine_create_failures: u64,
    pub engine_close_failures: u64,
}

impl SessionMetrics {
    /// Create a new shared metrics instance.
    #[must_use]
    pub fn new() -> Arc<Self> {
        Arc::new(Self::default())
    }

    pub fn room_created(&self) {
        self.active_rooms.fetch_add(1, Ordering::Relaxed);
    }

    pub fn room_removed(&self) {
        self.active_rooms.fetch_sub(1, Ordering::Relaxed);
    }

    pub fn connection_registered(&self) {
        self.active_connections.fetch_add(1, Ordering::Relaxed);
    }

    pub fn connection_removed(&self) {
        self.active_connections.fetch_sub(1, Ordering::Relaxed);
    }

    pub fn peer_joined(&self) {
        self.active_peers.fetch_add(1, Ordering::Relaxed);
    }

    pub fn peer_left(&self) {
        self.active_peers.fetch_sub(1, Ordering::Relaxed);
    }

    pub fn transport_created(&self) {
        self.active_transports.fetch_add(1, Ordering::Relaxed);
    }

    pub fn transports_removed(&self, count: usize) {
        self.active_transports.fetch_sub(count, Ordering::Relaxed);
    }

    pub fn producer_created(&self) {
        self.active_producers.fetch_add(1, Ordering::Relaxed);
    }

    pub fn producers_removed(&self, count: usize) {
        self.active_producers.fetch_sub(count, Ordering::Relaxed);
    }

    pub fn consumer_created(&self) {
        self.active_consumers.fetch_add(1, Ordering::Relaxed);
    }

    pub fn consumers_removed(&self, count: usize) {
        self.active_consumers.fetch_sub(count, Ordering::Relaxed);
    }

    pub fn engine_create_failed(&self) {
        self.engine_create_failures.fetch_add(1, Ordering::Relaxed);
    }

    pub fn engine_close_failed(&self) {
        self.engine_close_failures.fetch_add(1, Ordering::Relaxed);
    }

    /// Take a snapshot of current values.
    #[must_use]
    pub fn snapshot(&self) -> MetricsSnapshot {
        MetricsSnapshot {
            rooms: self.active_rooms.load(Ordering::Relaxed),
            connections: self.active_connections.load(Ordering::Relaxed),
            peers: self.active_peers.load(Ordering::Relaxed),
            transports: self.active_transports.load(Ordering::Relaxed),
            producers: self.active_producers.load(Ordering::Relaxed),
            consumers: self.active_consumers.load(Ordering::Relaxed),
            engine_create_failures: self.engine_create_failures.load(Ordering::Relaxed),
            engine_close_failures: self.engine_close_failures.load(Ordering::Relaxed),
        }
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used, clippy::expect_used)]
mod tests {
    use super::*;

    #[test]
    fn test_gauges_track_create_and_remove() {
        let metrics = SessionMetrics::new();

        metrics.room_created();
        metrics.peer_joined();
        metrics.peer_joined();
        metrics.transport_created();
        metrics.producer_created();
        metrics.consumer_created();

        let snapshot = metrics.snapshot();
        assert_eq!(snapshot.rooms, 1);
        assert_eq!(snapshot.peers, 2);
        assert_eq!(snapshot.transports, 1);
        assert_eq!(snapshot.producers, 1);
        assert_eq!(snapshot.consumers, 1);

        metrics.peer_left();
        metrics.producers_removed(1);
        metrics.consumers_removed(1);
        metrics.transports_removed(1);
        metrics.room_removed();

        let snapshot = metrics.snapshot();
        assert_eq!(snapshot.rooms, 0);
        assert_eq!(snapshot.peers, 1);
        assert_eq!(snapshot.transports, 0);
        assert_eq!(snapshot.producers, 0);
        assert_eq!(snapshot.consumers, 0);
    }

    #[test]
    fn test_failure_counters_accumulate() {
        let metrics = SessionMetrics::new();

        metrics.engine_create_failed();
        metrics.engine_close_failed();
        metrics.engine_close_failed();

        let snapshot = metrics.snapshot();
        assert_eq!(snapshot.engine_create_failures, 1);
        assert_eq!(snapshot.engine_close_failures, 2);
    }
}
