//! Metric primitives and the node's own metric set.
//!
//! Three Prometheus-shaped primitives:
//! - [`Counter`]: monotonically increasing (e.g. peers connected).
//! - [`Gauge`]: goes up or down (e.g. validator count).
//! - [`Histogram`]: distribution of observations (e.g. finality latency).
//!
//! ```rust
//! use supernet_monitoring::SupernetMetrics;
//!
//! let metrics = SupernetMetrics::new();
//! metrics.peers_connected.inc();
//! metrics.finality_latency_ms.observe(120.0);
//!
//! let text = supernet_monitoring::prometheus::encode(&metrics.snapshot());
//! ```

pub mod prometheus;

use {
    parking_lot::Mutex,
    std::sync::atomic::{AtomicI64, AtomicU64, Ordering},
};

/// A monotonically increasing counter.
pub struct Counter {
    value: AtomicU64,
    #[allow(dead_code)]
    name: &'static str,
    #[allow(dead_code)]
    help: &'static str,
}

impl Counter {
    pub const fn new(name: &'static str, help: &'static str) -> Self {
        Self { value: AtomicU64::new(0), name, help }
    }

    pub fn inc(&self) {
        self.value.fetch_add(1, Ordering::Relaxed);
    }

    pub fn add(&self, v: u64) {
        self.value.fetch_add(v, Ordering::Relaxed);
    }

    pub fn get(&self) -> u64 {
        self.value.load(Ordering::Relaxed)
    }
}

/// A gauge that can go up or down.
pub struct Gauge {
    value: AtomicI64,
    #[allow(dead_code)]
    name: &'static str,
    #[allow(dead_code)]
    help: &'static str,
}

impl Gauge {
    pub const fn new(name: &'static str, help: &'static str) -> Self {
        Self { value: AtomicI64::new(0), name, help }
    }

    pub fn set(&self, v: i64) {
        self.value.store(v, Ordering::Relaxed);
    }

    pub fn inc(&self) {
        self.value.fetch_add(1, Ordering::Relaxed);
    }

    pub fn dec(&self) {
        self.value.fetch_sub(1, Ordering::Relaxed);
    }

    pub fn add(&self, v: i64) {
        self.value.fetch_add(v, Ordering::Relaxed);
    }

    pub fn get(&self) -> i64 {
        self.value.load(Ordering::Relaxed)
    }
}

/// A histogram that buckets observations.
pub struct Histogram {
    buckets: Vec<f64>,
    counts: Vec<AtomicU64>,
    sum: Mutex<f64>,
    count: AtomicU64,
    #[allow(dead_code)]
    name: &'static str,
    #[allow(dead_code)]
    help: &'static str,
}

impl Histogram {
    pub fn new(name: &'static str, help: &'static str, buckets: Vec<f64>) -> Self {
        let counts = buckets.iter().map(|_| AtomicU64::new(0)).collect();
        Self { buckets, counts, sum: Mutex::new(0.0), count: AtomicU64::new(0), name, help }
    }

    pub fn observe(&self, v: f64) {
        self.count.fetch_add(1, Ordering::Relaxed);
        *self.sum.lock() += v;
        for (i, bound) in self.buckets.iter().enumerate() {
            if v <= *bound {
                self.counts[i].fetch_add(1, Ordering::Relaxed);
            }
        }
    }

    pub fn get_count(&self) -> u64 {
        self.count.load(Ordering::Relaxed)
    }

    pub fn get_sum(&self) -> f64 {
        *self.sum.lock()
    }

    pub fn get_buckets(&self) -> Vec<(f64, u64)> {
        self.buckets.iter().zip(self.counts.iter()).map(|(b, c)| (*b, c.load(Ordering::Relaxed))).collect()
    }
}

/// Default buckets for millisecond-scale timing histograms.
pub fn default_time_buckets() -> Vec<f64> {
    vec![1.0, 5.0, 10.0, 25.0, 50.0, 100.0, 250.0, 500.0, 1000.0, 5000.0]
}

/// Default buckets for small round-count histograms.
pub fn default_round_buckets() -> Vec<f64> {
    vec![1.0, 2.0, 3.0, 4.0, 5.0, 10.0, 20.0]
}

/// The node's complete metric set.
pub struct SupernetMetrics {
    // -- Transport --
    pub peers_connected: Gauge,
    pub handshake_failures: Counter,
    pub bytes_sent: Counter,
    pub bytes_received: Counter,

    // -- Routing --
    pub messages_routed_high: Counter,
    pub messages_routed_low: Counter,
    pub messages_routed_sync: Counter,
    pub messages_dropped: Counter,
    pub query_timeouts: Counter,

    // -- Benchlist --
    pub benched_peers: Gauge,

    // -- Consensus --
    pub consensus_rounds_to_finalize: Histogram,
    pub finality_latency_ms: Histogram,
    pub items_accepted: Counter,
    pub items_rejected: Counter,

    // -- Bootstrap --
    pub bootstrap_progress: Gauge,
    pub chains_bootstrapped: Counter,

    // -- Validators / uptime --
    pub validator_count: Gauge,
    pub total_stake: Gauge,
    pub uptime_tracked_nodes: Gauge,
}

impl SupernetMetrics {
    pub fn new() -> Self {
        Self {
            peers_connected: Gauge::new("supernet_peers_connected", "Currently connected peers"),
            handshake_failures: Counter::new(
                "supernet_handshake_failures_total",
                "Handshakes rejected (bad version, signature, or clock skew)",
            ),
            bytes_sent: Counter::new("supernet_bytes_sent_total", "Bytes written to peer sockets"),
            bytes_received: Counter::new("supernet_bytes_received_total", "Bytes read from peer sockets"),

            messages_routed_high: Counter::new(
                "supernet_messages_routed_high_total",
                "Messages dispatched on the high-priority queue",
            ),
            messages_routed_low: Counter::new(
                "supernet_messages_routed_low_total",
                "Messages dispatched on the low-priority queue",
            ),
            messages_routed_sync: Counter::new(
                "supernet_messages_routed_sync_total",
                "Messages dispatched on the sync-priority queue",
            ),
            messages_dropped: Counter::new(
                "supernet_messages_dropped_total",
                "Messages dropped (queue full, past deadline, unknown chain)",
            ),
            query_timeouts: Counter::new(
                "supernet_query_timeouts_total",
                "Outstanding requests that fired a synthetic failure",
            ),

            benched_peers: Gauge::new("supernet_benched_peers", "Peers currently on the benchlist"),

            consensus_rounds_to_finalize: Histogram::new(
                "supernet_consensus_rounds_to_finalize",
                "Poll rounds needed to finalize one item",
                default_round_buckets(),
            ),
            finality_latency_ms: Histogram::new(
                "supernet_finality_latency_ms",
                "Wall-clock time from item add to acceptance, in milliseconds",
                default_time_buckets(),
            ),
            items_accepted: Counter::new("supernet_items_accepted_total", "Blocks/vertices accepted"),
            items_rejected: Counter::new("supernet_items_rejected_total", "Blocks/vertices rejected"),

            bootstrap_progress: Gauge::new(
                "supernet_bootstrap_progress_permille",
                "Bootstrap progress fraction in permille (1000 = done)",
            ),
            chains_bootstrapped: Counter::new(
                "supernet_chains_bootstrapped_total",
                "Chains that have finished bootstrapping",
            ),

            validator_count: Gauge::new("supernet_validator_count", "Validators in the active set"),
            total_stake: Gauge::new("supernet_total_stake", "Total validator weight"),
            uptime_tracked_nodes: Gauge::new("supernet_uptime_tracked_nodes", "Nodes with an active uptime tracker"),
        }
    }

    /// Take a point-in-time snapshot for export.
    pub fn snapshot(&self) -> MetricsSnapshot {
        MetricsSnapshot {
            peers_connected: self.peers_connected.get(),
            handshake_failures: self.handshake_failures.get(),
            bytes_sent: self.bytes_sent.get(),
            bytes_received: self.bytes_received.get(),

            messages_routed_high: self.messages_routed_high.get(),
            messages_routed_low: self.messages_routed_low.get(),
            messages_routed_sync: self.messages_routed_sync.get(),
            messages_dropped: self.messages_dropped.get(),
            query_timeouts: self.query_timeouts.get(),

            benched_peers: self.benched_peers.get(),

            consensus_rounds_count: self.consensus_rounds_to_finalize.get_count(),
            consensus_rounds_sum: self.consensus_rounds_to_finalize.get_sum(),
            consensus_rounds_buckets: self.consensus_rounds_to_finalize.get_buckets(),
            finality_latency_count: self.finality_latency_ms.get_count(),
            finality_latency_sum: self.finality_latency_ms.get_sum(),
            finality_latency_buckets: self.finality_latency_ms.get_buckets(),
            items_accepted: self.items_accepted.get(),
            items_rejected: self.items_rejected.get(),

            bootstrap_progress: self.bootstrap_progress.get(),
            chains_bootstrapped: self.chains_bootstrapped.get(),

            validator_count: self.validator_count.get(),
            total_stake: self.total_stake.get(),
            uptime_tracked_nodes: self.uptime_tracked_nodes.get(),
        }
    }
}

impl Default for SupernetMetrics {
    fn default() -> Self {
        Self::new()
    }
}

/// A serializable point-in-time snapshot of all node metrics.
#[derive(Debug, Clone)]
pub struct MetricsSnapshot {
    pub peers_connected: i64,
    pub handshake_failures: u64,
    pub bytes_sent: u64,
    pub bytes_received: u64,

    pub messages_routed_high: u64,
    pub messages_routed_low: u64,
    pub messages_routed_sync: u64,
    pub messages_dropped: u64,
    pub query_timeouts: u64,

    pub benched_peers: i64,

    pub consensus_rounds_count: u64,
    pub consensus_rounds_sum: f64,
    pub consensus_rounds_buckets: Vec<(f64, u64)>,
    pub finality_latency_count: u64,
    pub finality_latency_sum: f64,
    pub finality_latency_buckets: Vec<(f64, u64)>,
    pub items_accepted: u64,
    pub items_rejected: u64,

    pub bootstrap_progress: i64,
    pub chains_bootstrapped: u64,

    pub validator_count: i64,
    pub total_stake: i64,
    pub uptime_tracked_nodes: i64,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_counter() {
        let c = Counter::new("test", "test counter");
        c.inc();
        c.add(5);
        assert_eq!(c.get(), 6);
    }

    #[test]
    fn test_gauge() {
        let g = Gauge::new("test", "test gauge");
        g.set(42);
        g.inc();
        g.dec();
        g.add(-10);
        assert_eq!(g.get(), 32);
    }

    #[test]
    fn test_histogram_buckets() {
        let h = Histogram::new("test", "test histogram", vec![10.0, 50.0, 100.0]);
        h.observe(5.0);
        h.observe(25.0);
        h.observe(75.0);
        h.observe(150.0);

        assert_eq!(h.get_count(), 4);
        assert!((h.get_sum() - 255.0).abs() < 1e-6);
        let buckets = h.get_buckets();
        assert_eq!(buckets[0], (10.0, 1));
        assert_eq!(buckets[1], (50.0, 2));
        assert_eq!(buckets[2], (100.0, 3));
    }

    #[test]
    fn test_metrics_snapshot() {
        let m = SupernetMetrics::new();
        m.peers_connected.set(3);
        m.items_accepted.add(7);
        m.validator_count.set(21);

        let snap = m.snapshot();
        assert_eq!(snap.peers_connected, 3);
        assert_eq!(snap.items_accepted, 7);
        assert_eq!(snap.validator_count, 21);
    }
}
