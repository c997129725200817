//! Peer-list gossip tracking: which claimed IPs exist, and which peers are
//! eligible to be gossiped to whom.
//!
//! The validator-set sync half is grounded on `supernet_validators`'s
//! [`supernet_validators::ValidatorCallback`] listener idiom: registering an
//! `Arc<GossipTracker>` as a set-callback listener keeps the tracker's
//! eligible set in sync with validator add/remove events, ignoring weight
//! changes (gossip eligibility tracks membership only).

use {
    std::{
        collections::{HashMap, HashSet},
        sync::Mutex,
    },
    supernet_codec::{Id, NodeId, SignedPeerIp},
    supernet_validators::ValidatorCallback,
};

/// A peer's self-claimed network address.
///
/// Never authoritative on its own: callers must verify both signatures
/// (under the claimant's TLS and BLS keys) before trusting it, which is why
/// this type only stores the claim, not a "verified" bit.
#[derive(Debug, Clone)]
pub struct ClaimedIp {
    /// The signed claim as received.
    pub claim: SignedPeerIp,
}

/// A small fixed-size Bloom filter over [`NodeId`]s, used to compress a
/// "peers I already know about" set for gossip requests.
#[derive(Debug, Clone)]
pub struct PeerBloomFilter {
    bits: Vec<bool>,
    hash_count: u32,
}

impl PeerBloomFilter {
    /// Build an empty filter with `bits` slots and `hash_count` hash rounds.
    pub fn new(bits: usize, hash_count: u32) -> Self {
        Self {
            bits: vec![false; bits.max(1)],
            hash_count: hash_count.max(1),
        }
    }

    fn indices(&self, node_id: &NodeId) -> impl Iterator<Item = usize> + '_ {
        let bytes = *node_id.as_bytes();
        (0..self.hash_count).map(move |round| {
            let h = solana_sha256_hasher::hashv(&[&bytes, &round.to_le_bytes()]);
            let raw = u64::from_le_bytes(h.as_ref()[0..8].try_into().expect("8 bytes"));
            (raw as usize) % self.bits.len()
        })
    }

    /// Record `node_id` as present.
    pub fn insert(&mut self, node_id: &NodeId) {
        for idx in self.indices(node_id).collect::<Vec<_>>() {
            self.bits[idx] = true;
        }
    }

    /// `true` if `node_id` may be present (false positives possible, false
    /// negatives never).
    pub fn might_contain(&self, node_id: &NodeId) -> bool {
        self.indices(node_id).all(|idx| self.bits[idx])
    }
}

/// Tracks claimed peer addresses and which peers may be gossiped to whom.
///
/// `eligible` carries its own lock rather than requiring callers to hold one
/// around the whole tracker: [`ValidatorCallback`] only hands out `&self`, so
/// the set it drives has to be able to mutate through a shared reference.
#[derive(Debug, Default)]
pub struct GossipTracker {
    claimed: HashMap<NodeId, ClaimedIp>,
    eligible: Mutex<HashSet<NodeId>>,
}

impl GossipTracker {
    /// An empty tracker.
    pub fn new() -> Self {
        Self::default()
    }

    /// Record or update a peer's claimed address, keeping only the claim
    /// with the greatest timestamp.
    pub fn record_claim(&mut self, claim: SignedPeerIp) {
        match self.claimed.get(&claim.node_id) {
            Some(existing) if existing.claim.timestamp >= claim.timestamp => {}
            _ => {
                self.claimed.insert(claim.node_id, ClaimedIp { claim });
            }
        }
    }

    /// Peers eligible to gossip to `to`, filtered by the requester's bloom
    /// filter of already-known peers.
    pub fn gossip_candidates(&self, to: &NodeId, already_known: &PeerBloomFilter) -> Vec<SignedPeerIp> {
        let eligible = self.eligible.lock().expect("gossip tracker lock poisoned");
        eligible
            .iter()
            .filter(|node_id| *node_id != to)
            .filter_map(|node_id| self.claimed.get(node_id))
            .filter(|entry| !already_known.might_contain(&entry.claim.node_id))
            .map(|entry| entry.claim.clone())
            .collect()
    }

    /// The currently claimed address for `node_id`, if any.
    pub fn claimed_ip(&self, node_id: &NodeId) -> Option<&SignedPeerIp> {
        self.claimed.get(node_id).map(|entry| &entry.claim)
    }

    /// Snapshot of the node ids currently eligible for gossip.
    pub fn eligible_nodes(&self) -> HashSet<NodeId> {
        self.eligible.lock().expect("gossip tracker lock poisoned").clone()
    }
}

impl ValidatorCallback for GossipTracker {
    fn on_validator_added(&self, _supernet_id: Id, node_id: NodeId, _weight: u64) {
        self.eligible.lock().expect("gossip tracker lock poisoned").insert(node_id);
    }

    fn on_validator_removed(&self, _supernet_id: Id, node_id: NodeId) {
        self.eligible.lock().expect("gossip tracker lock poisoned").remove(&node_id);
    }

    // Weight changes are deliberately ignored: gossip eligibility only
    // tracks membership.
}

#[cfg(test)]
mod tests {
    use super::*;

    fn node(byte: u8) -> NodeId {
        NodeId::from([byte; 20])
    }

    fn signed_ip(node_id: NodeId, timestamp: u64) -> SignedPeerIp {
        SignedPeerIp {
            node_id,
            ip: "127.0.0.1".parse().unwrap(),
            port: 9651,
            timestamp,
            tls_signature: vec![],
            bls_signature: vec![],
        }
    }

    #[test]
    fn test_bloom_filter_no_false_negatives() {
        let mut filter = PeerBloomFilter::new(256, 4);
        let a = node(1);
        filter.insert(&a);
        assert!(filter.might_contain(&a));
    }

    #[test]
    fn test_bloom_filter_absent_usually_not_contained() {
        let mut filter = PeerBloomFilter::new(4096, 4);
        filter.insert(&node(1));
        assert!(!filter.might_contain(&node(200)));
    }

    #[test]
    fn test_record_claim_keeps_latest_timestamp() {
        let mut tracker = GossipTracker::new();
        tracker.record_claim(signed_ip(node(1), 5));
        tracker.record_claim(signed_ip(node(1), 3));
        assert_eq!(tracker.claimed_ip(&node(1)).unwrap().timestamp, 5);
        tracker.record_claim(signed_ip(node(1), 9));
        assert_eq!(tracker.claimed_ip(&node(1)).unwrap().timestamp, 9);
    }

    #[test]
    fn test_validator_callback_tracks_add_and_remove() {
        let tracker = GossipTracker::new();
        tracker.on_validator_added(Id::zero(), node(1), 100);
        assert!(tracker.eligible_nodes().contains(&node(1)));
        tracker.on_validator_removed(Id::zero(), node(1));
        assert!(!tracker.eligible_nodes().contains(&node(1)));
    }

    #[test]
    fn test_gossip_candidates_excludes_requester_and_known_peers() {
        let mut tracker = GossipTracker::new();
        tracker.record_claim(signed_ip(node(1), 1));
        tracker.record_claim(signed_ip(node(2), 1));
        tracker.record_claim(signed_ip(node(3), 1));
        tracker.on_validator_added(Id::zero(), node(1), 100);
        tracker.on_validator_added(Id::zero(), node(2), 100);
        tracker.on_validator_added(Id::zero(), node(3), 100);

        // Requester is node(1); it already knows about node(2).
        let mut known = PeerBloomFilter::new(1024, 4);
        known.insert(&node(2));

        let candidates = tracker.gossip_candidates(&node(1), &known);
        assert_eq!(candidates.len(), 1);
        assert_eq!(candidates[0].node_id, node(3));
    }

    #[test]
    fn test_registered_as_shared_listener_drives_real_eligibility() {
        // Proves the callback wiring actually reaches the set
        // `gossip_candidates` reads, not a disconnected copy.
        let mut manager = supernet_validators::ValidatorManager::new();
        let tracker = std::sync::Arc::new(GossipTracker::new());
        manager.register_set_callback_listener(Id::zero(), tracker.clone());

        manager.add_staker(Id::zero(), node(1), None, Id::zero(), 100).unwrap();
        assert!(tracker.eligible_nodes().contains(&node(1)));

        manager.remove_weight(Id::zero(), node(1), 100).unwrap();
        assert!(!tracker.eligible_nodes().contains(&node(1)));
    }
}
