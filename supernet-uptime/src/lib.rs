//! Per-`(node id, supernet id)` uptime accounting.
//!
//! Tracks cumulative connected time per tracked node/supernet pair with
//! crash-safe, monotone bookkeeping: the stored `(up_duration, last_updated)`
//! pair is always a sound lower bound on true uptime, never an overestimate.
//!
//! Every public method takes `now` explicitly rather than reading the system
//! clock internally, so the monotonicity and clock-regression invariants are
//! directly testable.
//!
//! Stored accounting is kept separate from the set of pairs *currently*
//! being tracked: `start_tracking`/`stop_tracking` toggle membership in the
//! tracked set without discarding the stored record, so a
//! pair that was tracked, stopped, and never restarted still answers
//! `calculate_uptime` from its last flush, and a fresh tracker loaded from a
//! [`UptimeTracker::snapshot`] resumes exactly where the old one left off.

use {
    std::{
        collections::{HashMap, HashSet},
        time::{Duration, SystemTime, UNIX_EPOCH},
    },
    supernet_codec::{Id, NodeId},
};

fn secs_since_epoch(now: SystemTime) -> u64 {
    now.duration_since(UNIX_EPOCH).unwrap_or(Duration::ZERO).as_secs()
}

#[derive(Debug, Clone, Copy)]
struct Record {
    up_duration_secs: u64,
    last_updated_secs: u64,
    start_time_secs: u64,
}

/// A stored `(up_duration, last_updated, start_time)` triple for one
/// `(node id, supernet id)` pair, suitable for persistence.
///
/// Replaying a snapshot into a fresh tracker via [`UptimeTracker::from_snapshot`]
/// reproduces the exact state a continuously-running tracker would have
/// reached: restarting never loses credited uptime.
#[derive(Debug, Clone, Copy)]
pub struct UptimeRecord {
    /// Cumulative connected time credited to this pair as of `last_updated`.
    pub up_duration: Duration,
    /// Wall time this record was last flushed, truncated to whole seconds.
    pub last_updated: SystemTime,
    /// When this node began validating this supernet.
    pub start_time: SystemTime,
}

/// Tracks connected-time accounting for every `(node id, supernet id)` pair
/// this node has ever called [`UptimeTracker::start_tracking`] for.
#[derive(Debug, Default)]
pub struct UptimeTracker {
    records: HashMap<(NodeId, Id), Record>,
    tracked: HashSet<(NodeId, Id)>,
    connected_since: HashMap<(NodeId, Id), u64>,
}

impl UptimeTracker {
    /// An empty tracker.
    pub fn new() -> Self {
        Self::default()
    }

    /// Build a tracker preloaded from a previously persisted snapshot, as if
    /// resuming after a restart. None of the restored pairs are actively
    /// tracked or connected until `start_tracking`/`connect` is called
    /// again — matching a real process restart, which loses in-memory
    /// tracking/connection state but not the durable store.
    pub fn from_snapshot(records: impl IntoIterator<Item = (NodeId, Id, UptimeRecord)>) -> Self {
        let mut tracker = Self::default();
        for (node_id, supernet_id, record) in records {
            tracker.records.insert(
                (node_id, supernet_id),
                Record {
                    up_duration_secs: record.up_duration.as_secs(),
                    last_updated_secs: secs_since_epoch(record.last_updated),
                    start_time_secs: secs_since_epoch(record.start_time),
                },
            );
        }
        tracker
    }

    /// Export every stored `(node id, supernet id)` pair's accounting, for
    /// persistence across a restart. Reflects only the last flush
    /// (`start_tracking`, `stop_tracking`, or `disconnect`) for each pair,
    /// never a live in-progress connection — callers that need the current
    /// instant's uptime should call `calculate_uptime` instead.
    pub fn snapshot(&self) -> Vec<(NodeId, Id, UptimeRecord)> {
        self.records
            .iter()
            .map(|(&(node_id, supernet_id), record)| {
                (
                    node_id,
                    supernet_id,
                    UptimeRecord {
                        up_duration: Duration::from_secs(record.up_duration_secs),
                        last_updated: UNIX_EPOCH + Duration::from_secs(record.last_updated_secs),
                        start_time: UNIX_EPOCH + Duration::from_secs(record.start_time_secs),
                    },
                )
            })
            .collect()
    }

    /// Begin (or resume) tracking `node_ids` on `supernet_id`.
    ///
    /// For each node: if a record already exists and `now` is not behind
    /// `last_updated` (a clock regression), the elapsed offline interval
    /// `now - last_updated` is credited to `up_duration` — time we weren't
    /// running is assumed connected, since we have no evidence otherwise.
    /// A clock regression leaves the existing record untouched. A node with
    /// no existing record starts a fresh one with zero accumulated uptime.
    pub fn start_tracking(&mut self, node_ids: &[NodeId], supernet_id: Id, now: SystemTime) {
        let now_secs = secs_since_epoch(now);
        for &node_id in node_ids {
            let key = (node_id, supernet_id);
            self.tracked.insert(key);
            match self.records.get_mut(&key) {
                Some(record) if now_secs >= record.last_updated_secs => {
                    let offline = now_secs - record.last_updated_secs;
                    record.up_duration_secs = record.up_duration_secs.saturating_add(offline);
                    record.last_updated_secs = now_secs;
                }
                Some(_) => {
                    // Clock regression: leave the existing record alone.
                }
                None => {
                    self.records.insert(
                        key,
                        Record {
                            up_duration_secs: 0,
                            last_updated_secs: now_secs,
                            start_time_secs: now_secs,
                        },
                    );
                }
            }
        }
    }

    /// Stop tracking `node_ids` on `supernet_id`: flush the current uptime
    /// (as `calculate_uptime` would report it right now) into the stored
    /// record, then remove the pair from the tracked set. The stored record
    /// is left in place, so a later `start_tracking` (in this process or
    /// after a restart via [`UptimeTracker::from_snapshot`]) resumes from
    /// exactly this point. A no-op for pairs not currently tracked.
    pub fn stop_tracking(&mut self, node_ids: &[NodeId], supernet_id: Id, now: SystemTime) {
        let now_secs = secs_since_epoch(now);
        for &node_id in node_ids {
            let key = (node_id, supernet_id);
            if !self.tracked.remove(&key) {
                continue;
            }
            let (up_duration_secs, _) = self.uptime_secs(node_id, supernet_id, now);
            if let Some(record) = self.records.get_mut(&key) {
                record.up_duration_secs = up_duration_secs;
                record.last_updated_secs = now_secs;
            }
        }
    }

    /// Record that `node_id` connected on `supernet_id` at `now`.
    pub fn connect(&mut self, node_id: NodeId, supernet_id: Id, now: SystemTime) {
        self.connected_since.insert((node_id, supernet_id), secs_since_epoch(now));
    }

    /// Record that `node_id` disconnected at `now`, flushing current uptime
    /// for every supernet it was connected on and currently tracked.
    pub fn disconnect(&mut self, node_id: NodeId, now: SystemTime) {
        let supernets: Vec<Id> = self
            .connected_since
            .keys()
            .filter(|(n, _)| *n == node_id)
            .map(|(_, s)| *s)
            .collect();
        for supernet_id in supernets {
            let key = (node_id, supernet_id);
            if self.tracked.contains(&key) {
                let (up_duration, now_secs) = self.uptime_secs(node_id, supernet_id, now);
                if let Some(record) = self.records.get_mut(&key) {
                    record.up_duration_secs = up_duration;
                    record.last_updated_secs = now_secs;
                }
            }
            self.connected_since.remove(&key);
        }
    }

    /// Cumulative uptime in whole seconds for `(node_id, supernet_id)` as of
    /// `now`. Three cases: not tracking, tracking-but-disconnected,
    /// tracking-and-connected.
    fn uptime_secs(&self, node_id: NodeId, supernet_id: Id, now: SystemTime) -> (u64, u64) {
        let now_secs = secs_since_epoch(now);
        let key = (node_id, supernet_id);
        let Some(record) = self.records.get(&key) else {
            // Never tracked at all: no stored baseline to credit from.
            return (0, now_secs);
        };
        if !self.tracked.contains(&key) {
            // Not tracking this supernet: stored upDuration + (now − lastUpdated).
            if now_secs < record.last_updated_secs {
                return (record.up_duration_secs, now_secs);
            }
            return (record.up_duration_secs.saturating_add(now_secs - record.last_updated_secs), now_secs);
        }
        match self.connected_since.get(&key) {
            // Tracking, not connected: the stored value, unmodified.
            None => (record.up_duration_secs, now_secs),
            Some(&connected_since) => {
                let connected_since_prime = connected_since.max(record.last_updated_secs);
                if now_secs < connected_since_prime {
                    (record.up_duration_secs, now_secs)
                } else {
                    (
                        record.up_duration_secs.saturating_add(now_secs - connected_since_prime),
                        now_secs,
                    )
                }
            }
        }
    }

    /// Cumulative connected duration for `node_id` on `supernet_id` as of
    /// `now`, and the `now` the caller supplied (echoed back so the result
    /// is self-describing).
    pub fn calculate_uptime(
        &self,
        node_id: NodeId,
        supernet_id: Id,
        now: SystemTime,
    ) -> (Duration, SystemTime) {
        let (secs, now_secs) = self.uptime_secs(node_id, supernet_id, now);
        (Duration::from_secs(secs), UNIX_EPOCH + Duration::from_secs(now_secs))
    }

    /// `calculate_uptime` divided by the time since tracking began. Returns
    /// `1.0` if that denominator is zero (tracking just started, or the
    /// pair has never been tracked at all).
    pub fn calculate_uptime_percent(&self, node_id: NodeId, supernet_id: Id, now: SystemTime) -> f64 {
        let (up_duration, _) = self.calculate_uptime(node_id, supernet_id, now);
        let now_secs = secs_since_epoch(now);
        let start_secs = self
            .records
            .get(&(node_id, supernet_id))
            .map(|r| r.start_time_secs)
            .unwrap_or(now_secs);
        let elapsed = now_secs.saturating_sub(start_secs);
        if elapsed == 0 {
            return 1.0;
        }
        up_duration.as_secs_f64() / elapsed as f64
    }

    /// The set of node ids currently marked connected on any supernet.
    pub fn connected_nodes(&self) -> HashSet<NodeId> {
        self.connected_since.keys().map(|(n, _)| *n).collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn node_id(byte: u8) -> NodeId {
        NodeId::from([byte; 20])
    }

    fn at(secs: u64) -> SystemTime {
        UNIX_EPOCH + Duration::from_secs(secs)
    }

    #[test]
    fn test_start_tracking_credits_offline_time() {
        let mut tracker = UptimeTracker::new();
        tracker.start_tracking(&[node_id(1)], Id::zero(), at(0));
        tracker.start_tracking(&[node_id(1)], Id::zero(), at(100));
        let (up, _) = tracker.calculate_uptime(node_id(1), Id::zero(), at(100));
        assert_eq!(up, Duration::from_secs(100));
    }

    #[test]
    fn test_clock_regression_leaves_record_untouched() {
        let mut tracker = UptimeTracker::new();
        tracker.start_tracking(&[node_id(1)], Id::zero(), at(100));
        tracker.start_tracking(&[node_id(1)], Id::zero(), at(50));
        let (up, _) = tracker.calculate_uptime(node_id(1), Id::zero(), at(100));
        assert_eq!(up, Duration::ZERO);
    }

    #[test]
    fn test_not_tracking_returns_zero_baseline() {
        let tracker = UptimeTracker::new();
        let (up, _) = tracker.calculate_uptime(node_id(9), Id::zero(), at(1_000));
        assert_eq!(up, Duration::ZERO);
    }

    #[test]
    fn test_tracking_not_connected_returns_stored_value() {
        let mut tracker = UptimeTracker::new();
        tracker.start_tracking(&[node_id(1)], Id::zero(), at(0));
        tracker.start_tracking(&[node_id(1)], Id::zero(), at(50));
        let (up, _) = tracker.calculate_uptime(node_id(1), Id::zero(), at(500));
        assert_eq!(up, Duration::from_secs(50));
    }

    #[test]
    fn test_connected_accrues_additional_uptime() {
        let mut tracker = UptimeTracker::new();
        tracker.start_tracking(&[node_id(1)], Id::zero(), at(0));
        tracker.connect(node_id(1), Id::zero(), at(10));
        let (up, _) = tracker.calculate_uptime(node_id(1), Id::zero(), at(40));
        assert_eq!(up, Duration::from_secs(40));
    }

    #[test]
    fn test_disconnect_flushes_across_all_tracked_supernets() {
        let mut tracker = UptimeTracker::new();
        let supernet_a = Id::from([1u8; 32]);
        let supernet_b = Id::from([2u8; 32]);
        tracker.start_tracking(&[node_id(1)], supernet_a, at(0));
        tracker.start_tracking(&[node_id(1)], supernet_b, at(0));
        tracker.connect(node_id(1), supernet_a, at(0));
        tracker.connect(node_id(1), supernet_b, at(0));
        tracker.disconnect(node_id(1), at(30));
        assert!(tracker.connected_nodes().is_empty());
        let (a, _) = tracker.calculate_uptime(node_id(1), supernet_a, at(30));
        let (b, _) = tracker.calculate_uptime(node_id(1), supernet_b, at(30));
        assert_eq!(a, Duration::from_secs(30));
        assert_eq!(b, Duration::from_secs(30));
    }

    #[test]
    fn test_uptime_percent_full_when_always_connected() {
        let mut tracker = UptimeTracker::new();
        tracker.start_tracking(&[node_id(1)], Id::zero(), at(0));
        tracker.connect(node_id(1), Id::zero(), at(0));
        let pct = tracker.calculate_uptime_percent(node_id(1), Id::zero(), at(100));
        assert!((pct - 1.0).abs() < f64::EPSILON);
    }

    #[test]
    fn test_uptime_percent_zero_elapsed_returns_one() {
        let tracker = UptimeTracker::new();
        let pct = tracker.calculate_uptime_percent(node_id(1), Id::zero(), at(0));
        assert!((pct - 1.0).abs() < f64::EPSILON);
    }

    #[test]
    fn test_uptime_percent_partial_connection() {
        let mut tracker = UptimeTracker::new();
        tracker.start_tracking(&[node_id(1)], Id::zero(), at(0));
        tracker.connect(node_id(1), Id::zero(), at(0));
        tracker.disconnect(node_id(1), at(50));
        let pct = tracker.calculate_uptime_percent(node_id(1), Id::zero(), at(100));
        assert!((pct - 0.5).abs() < f64::EPSILON);
    }

    #[test]
    fn test_stop_tracking_then_restart_returns_stored_plus_elapsed() {
        // StopTracking deactivates without losing the stored baseline, and
        // a pair we've stopped tracking still answers CalculateUptime from
        // that baseline.
        let mut tracker = UptimeTracker::new();
        tracker.start_tracking(&[node_id(1)], Id::zero(), at(0));
        tracker.connect(node_id(1), Id::zero(), at(0));
        tracker.stop_tracking(&[node_id(1)], Id::zero(), at(10));
        // Not tracking any more: CalculateUptime credits the stored value
        // plus the elapsed time since the flush.
        let (up, _) = tracker.calculate_uptime(node_id(1), Id::zero(), at(25));
        assert_eq!(up, Duration::from_secs(25));
    }

    #[test]
    fn test_uptime_across_restart_scenario() {
        // AddNode/StartTracking/Connect at t=0, advance to t=1s,
        // StopTracking, then a *fresh* tracker built from the same store,
        // StartTracking again at t=1s. CalculateUptime at t=1s must return
        // (1s, t=1s).
        let mut tracker = UptimeTracker::new();
        tracker.start_tracking(&[node_id(1)], Id::zero(), at(0));
        tracker.connect(node_id(1), Id::zero(), at(0));
        tracker.stop_tracking(&[node_id(1)], Id::zero(), at(1));

        let mut fresh = UptimeTracker::from_snapshot(tracker.snapshot());
        fresh.start_tracking(&[node_id(1)], Id::zero(), at(1));

        let (up, now) = fresh.calculate_uptime(node_id(1), Id::zero(), at(1));
        assert_eq!(up, Duration::from_secs(1));
        assert_eq!(now, at(1));
    }

    #[test]
    fn test_restart_idempotence_matches_never_stopping() {
        // Stopping then restarting with the same clock yields the same
        // (up_duration, last_updated) as never stopping at all.
        let mut continuous = UptimeTracker::new();
        continuous.start_tracking(&[node_id(1)], Id::zero(), at(0));
        continuous.connect(node_id(1), Id::zero(), at(0));

        let mut restarted = UptimeTracker::new();
        restarted.start_tracking(&[node_id(1)], Id::zero(), at(0));
        restarted.connect(node_id(1), Id::zero(), at(0));
        restarted.stop_tracking(&[node_id(1)], Id::zero(), at(5));
        let mut restarted = UptimeTracker::from_snapshot(restarted.snapshot());
        restarted.start_tracking(&[node_id(1)], Id::zero(), at(5));
        restarted.connect(node_id(1), Id::zero(), at(5));

        let (continuous_up, _) = continuous.calculate_uptime(node_id(1), Id::zero(), at(20));
        let (restarted_up, _) = restarted.calculate_uptime(node_id(1), Id::zero(), at(20));
        assert_eq!(continuous_up, restarted_up);
    }
}
