//! The router-global adaptive timeout manager: a single latency estimator
//! (`supernet_timeout::AdaptiveTimeoutManager`) plus a min-heap of pending
//! request deadlines, each carrying the synthetic failure message to
//! deliver if nothing arrives in time.

use {
    std::{
        cmp::Reverse,
        collections::{BinaryHeap, HashMap},
        time::{Duration, Instant},
    },
    supernet_codec::{Id, Message, NodeId},
    supernet_timeout::{AdaptiveTimeoutManager, TimeoutConfig},
};

/// Identifies one outstanding outbound request: destination node id, source
/// chain, destination chain, and request id.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct RequestKey {
    // all fields are `Copy`, so `RequestKey` itself can be, letting the
    // deadline heap store plain `(Instant, RequestKey)` pairs.
    /// Node the request was sent to.
    pub dst_node: NodeId,
    /// Chain the request was sent from.
    pub src_chain: Id,
    /// Chain the request targets on the destination node.
    pub dst_chain: Id,
    /// Correlates the eventual response or synthetic failure.
    pub request_id: u32,
}

struct Pending {
    deadline: Instant,
    failure: Message,
}

/// A min-heap of request deadlines, each resolvable to a synthetic failure
/// message once its deadline passes.
///
/// Cancellation (a real response arrived) just removes the `pending` entry;
/// the heap may still carry a stale handle for it, discarded lazily the next
/// time it's popped.
pub struct DeadlineQueue {
    heap: BinaryHeap<Reverse<(Instant, RequestKey)>>,
    pending: HashMap<RequestKey, Pending>,
    timeouts: AdaptiveTimeoutManager,
}

impl DeadlineQueue {
    /// A queue with no outstanding requests, seeded with `config`.
    pub fn new(config: TimeoutConfig) -> Self {
        Self {
            heap: BinaryHeap::new(),
            pending: HashMap::new(),
            timeouts: AdaptiveTimeoutManager::new(config),
        }
    }

    /// The timeout to apply to a request registered right now.
    pub fn current_timeout(&self) -> Duration {
        self.timeouts.current_timeout()
    }

    /// Fold an observed round-trip latency into the shared estimator.
    pub fn observe(&mut self, latency: Duration, now: Instant) {
        self.timeouts.observe(latency, now);
    }

    /// Register a new deadline. `true` if this is a new key; `false` (no
    /// effect) if `key` is already outstanding.
    pub fn register(&mut self, key: RequestKey, deadline: Instant, failure: Message) -> bool {
        if self.pending.contains_key(&key) {
            return false;
        }
        self.pending.insert(key, Pending { deadline, failure });
        self.heap.push(Reverse((deadline, key)));
        true
    }

    /// Cancel a pending deadline (a matching response arrived). `true` if
    /// `key` was outstanding.
    pub fn cancel(&mut self, key: &RequestKey) -> bool {
        self.pending.remove(key).is_some()
    }

    /// The next deadline still outstanding, if any.
    pub fn next_deadline(&self) -> Option<Instant> {
        self.pending.values().map(|p| p.deadline).min()
    }

    /// Pop and return every request whose deadline has passed as of `now`,
    /// each paired with its synthetic failure message.
    pub fn pop_expired(&mut self, now: Instant) -> Vec<(RequestKey, Message)> {
        let mut fired = Vec::new();
        while let Some(Reverse((deadline, key))) = self.heap.peek().copied() {
            if deadline > now {
                break;
            }
            self.heap.pop();
            if let Some(pending) = self.pending.remove(&key) {
                fired.push((key, pending.failure));
            }
        }
        fired
    }
}
