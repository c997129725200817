//! Per-chain benchlist: temporarily excludes repeatedly-failing peers from
//! consensus sampling.
//!
//! Grounded on the same detect-and-record-then-drain idiom used for double-
//! sign evidence collection, repurposed from "two conflicting votes" to
//! "too many consecutive request failures in too short a window".

use {
    std::{
        collections::HashMap,
        time::{Duration, Instant},
    },
    supernet_codec::NodeId,
};

/// Tunables for a single chain's [`Benchlist`].
#[derive(Debug, Clone, Copy)]
pub struct BenchlistConfig {
    /// Consecutive failures required before a peer is benched.
    pub threshold: u32,
    /// The `threshold` failures must all land within this window; an older
    /// first failure resets the streak instead of accumulating toward it.
    pub minimum_failing_duration: Duration,
    /// How long a bench lasts once imposed.
    pub duration: Duration,
    /// Maximum fraction of total validator weight that may be benched at
    /// once, computed from the consensus `alpha`/`k` to preserve liveness
    /// (see [`max_benchable_portion`]).
    pub max_portion: f64,
}

impl Default for BenchlistConfig {
    fn default() -> Self {
        Self {
            threshold: 5,
            minimum_failing_duration: Duration::from_secs(120),
            duration: Duration::from_secs(900),
            max_portion: 0.25,
        }
    }
}

/// The largest fraction of validator weight that can be benched without
/// risking that honest polls can no longer reach `alpha_confidence` votes
/// out of `k` samples.
pub fn max_benchable_portion(k: u32, alpha_confidence: u32) -> f64 {
    if k == 0 {
        return 0.0;
    }
    (1.0 - (alpha_confidence as f64 / k as f64)).clamp(0.0, 1.0)
}

#[derive(Debug, Clone, Copy)]
struct FailureStreak {
    first_failure_at: Instant,
    consecutive: u32,
}

/// Tracks failing peers for one chain and decides who is currently benched.
#[derive(Debug)]
pub struct Benchlist {
    config: BenchlistConfig,
    streaks: HashMap<NodeId, FailureStreak>,
    benched: HashMap<NodeId, BenchedEntry>,
}

#[derive(Debug, Clone, Copy)]
struct BenchedEntry {
    until: Instant,
    weight: u64,
}

impl Benchlist {
    /// A benchlist with no tracked failures.
    pub fn new(config: BenchlistConfig) -> Self {
        Self {
            config,
            streaks: HashMap::new(),
            benched: HashMap::new(),
        }
    }

    /// Record a request failure from `node_id`.
    ///
    /// `total_weight` and `node_weight` gate whether benching this peer
    /// would push the benched fraction of the validator set over
    /// `config.max_portion` — if so, the failure is still recorded but the
    /// peer is not benched, preserving liveness.
    ///
    /// Returns `true` iff this call newly benched the peer.
    pub fn record_failure(
        &mut self,
        node_id: NodeId,
        now: Instant,
        node_weight: u64,
        total_weight: u64,
    ) -> bool {
        let streak = self.streaks.entry(node_id).or_insert(FailureStreak {
            first_failure_at: now,
            consecutive: 0,
        });
        if now.saturating_duration_since(streak.first_failure_at) > self.config.minimum_failing_duration {
            streak.first_failure_at = now;
            streak.consecutive = 0;
        }
        streak.consecutive = streak.consecutive.saturating_add(1);

        if streak.consecutive < self.config.threshold {
            return false;
        }
        if self.benched.contains_key(&node_id) {
            return false;
        }
        self.expire(now);
        if self.would_exceed_max_portion(node_weight, total_weight) {
            return false;
        }
        self.benched.insert(
            node_id,
            BenchedEntry {
                until: now + self.config.duration,
                weight: node_weight,
            },
        );
        true
    }

    /// Record a successful response from `node_id`, clearing its failure
    /// streak. Does not lift an active bench early.
    pub fn record_success(&mut self, node_id: NodeId) {
        self.streaks.remove(&node_id);
    }

    /// `true` iff `node_id` is currently benched (and not expired) as of `now`.
    pub fn is_benched(&mut self, node_id: &NodeId, now: Instant) -> bool {
        self.expire(now);
        self.benched.contains_key(node_id)
    }

    /// Currently benched node ids as of `now`, expiring stale entries first.
    pub fn benched_nodes(&mut self, now: Instant) -> Vec<NodeId> {
        self.expire(now);
        self.benched.keys().copied().collect()
    }

    fn expire(&mut self, now: Instant) {
        self.benched.retain(|_, entry| entry.until > now);
    }

    fn would_exceed_max_portion(&self, node_weight: u64, total_weight: u64) -> bool {
        if total_weight == 0 {
            return false;
        }
        let currently_benched_weight: u64 =
            self.benched.values().map(|e| e.weight).fold(0, u64::saturating_add);
        let prospective = currently_benched_weight.saturating_add(node_weight);
        (prospective as f64 / total_weight as f64) > self.config.max_portion
    }
}
