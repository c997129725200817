//! Sampling and in-flight poll bookkeeping for one repoll round.

use {
    std::collections::{HashMap, HashSet},
    supernet_codec::{Id, NodeId},
    supernet_validators::ValidatorSet,
};

/// Derive a deterministic per-poll sampling seed from the chain id, local
/// height, and a monotonically increasing sequence number.
pub fn poll_seed(chain_id: Id, height: u64, sequence: u64) -> u64 {
    let hash = solana_sha256_hasher::hashv(&[
        chain_id.as_bytes(),
        &height.to_le_bytes(),
        &sequence.to_le_bytes(),
    ]);
    u64::from_le_bytes(hash.as_ref()[0..8].try_into().expect("8 bytes"))
}

/// Weighted sample of `k` validators for one repoll, deterministic given the
/// seed. Ties within the sample aren't meaningful here (the underlying
/// sample already resolves them deterministically); node-id order is
/// applied so repeated polls are easy to diff in logs/tests.
pub fn sample_validators(validators: &ValidatorSet, k: u32, seed: u64) -> Vec<NodeId> {
    let mut sampled = validators.sample(k as usize, seed);
    sampled.sort();
    sampled
}

/// Tracks the responses collected for one in-flight repoll.
#[derive(Debug)]
pub struct PollState {
    request_id: u32,
    expected: HashSet<NodeId>,
    responses: HashMap<NodeId, Option<Id>>,
}

impl PollState {
    /// Start tracking a poll sent to `expected` peers.
    pub fn new(request_id: u32, expected: HashSet<NodeId>) -> Self {
        Self {
            request_id,
            expected,
            responses: HashMap::new(),
        }
    }

    /// The request id correlating this poll's query/response messages.
    pub fn request_id(&self) -> u32 {
        self.request_id
    }

    /// Record a peer's vote. `None` marks a synthetic failure (timeout,
    /// benched, or disconnect) and counts toward completion but not the
    /// tally. A response from a peer outside `expected` is ignored.
    pub fn record_response(&mut self, node_id: NodeId, preferred: Option<Id>) {
        if self.expected.contains(&node_id) {
            self.responses.insert(node_id, preferred);
        }
    }

    /// A poll completes once every expected peer has responded, or once
    /// every peer that hasn't is currently benched — benched peers never
    /// block progress.
    pub fn is_complete(&self, benched: &HashSet<NodeId>) -> bool {
        self.expected
            .iter()
            .all(|node_id| self.responses.contains_key(node_id) || benched.contains(node_id))
    }

    /// The non-failed votes collected so far.
    pub fn votes(&self) -> Vec<Id> {
        self.responses.values().filter_map(|v| *v).collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn node(byte: u8) -> NodeId {
        NodeId::from([byte; 20])
    }

    #[test]
    fn test_poll_seed_is_deterministic() {
        let a = poll_seed(Id::zero(), 10, 1);
        let b = poll_seed(Id::zero(), 10, 1);
        assert_eq!(a, b);
        let c = poll_seed(Id::zero(), 10, 2);
        assert_ne!(a, c);
    }

    #[test]
    fn test_poll_completes_once_all_expected_respond() {
        let mut expected = HashSet::new();
        expected.insert(node(1));
        expected.insert(node(2));
        let mut poll = PollState::new(7, expected);
        assert!(!poll.is_complete(&HashSet::new()));
        poll.record_response(node(1), Some(Id::from([9u8; 32])));
        assert!(!poll.is_complete(&HashSet::new()));
        poll.record_response(node(2), None);
        assert!(poll.is_complete(&HashSet::new()));
        assert_eq!(poll.votes(), vec![Id::from([9u8; 32])]);
    }

    #[test]
    fn test_benched_peers_complete_a_poll_without_responding() {
        let mut expected = HashSet::new();
        expected.insert(node(1));
        expected.insert(node(2));
        let poll = PollState::new(1, expected);
        let mut benched = HashSet::new();
        benched.insert(node(1));
        benched.insert(node(2));
        assert!(poll.is_complete(&benched));
    }

    #[test]
    fn test_response_outside_expected_set_ignored() {
        let mut expected = HashSet::new();
        expected.insert(node(1));
        let mut poll = PollState::new(1, expected);
        poll.record_response(node(9), Some(Id::zero()));
        assert!(poll.votes().is_empty());
    }
}
