//! The state-syncer: samples beacons for a recent state summary, tallies
//! validator weight behind each candidate, and applies the majority summary
//! to the VM — falling back to full bootstrap if the VM rejects it or no
//! candidate reaches a majority.

use {
    crate::error::{BootstrapError, Result},
    std::collections::{HashMap, HashSet},
    supernet_chain::engine::ChainVm,
    supernet_codec::{Id, Message, NodeId},
    supernet_validators::ValidatorSet,
};

/// A VM shared with the engine stage state-sync hands off to.
pub type SharedVm = std::sync::Arc<parking_lot::Mutex<dyn ChainVm>>;

/// Tuning for one state-syncer instance.
#[derive(Debug, Clone, Copy)]
pub struct StateSyncConfig {
    /// Number of beacons sampled.
    pub sample_k: u32,
    /// Bounded retries per failed request.
    pub max_retries: u32,
}

impl Default for StateSyncConfig {
    fn default() -> Self {
        Self { sample_k: 5, max_retries: 3 }
    }
}

/// Outcome of driving the state-syncer.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum StateSyncOutcome {
    /// Still sampling or tallying.
    InProgress,
    /// A summary reached a majority and the VM accepted it.
    Applied,
    /// No candidate reached a majority, or the VM rejected the winner;
    /// the handler should fall back to a full bootstrap.
    FallBack,
}

/// One message the engine wants sent to a single beacon.
#[derive(Debug, Clone, PartialEq)]
pub struct OutboundRequest {
    /// Recipient beacon.
    pub to: NodeId,
    /// The request itself.
    pub message: Message,
}

/// What driving the state-syncer produced.
#[derive(Debug, Clone, PartialEq)]
pub struct StateSyncOutput {
    /// Requests the router should dispatch.
    pub requests: Vec<OutboundRequest>,
    /// The engine's current outcome.
    pub outcome: StateSyncOutcome,
}

impl StateSyncOutput {
    fn in_progress(requests: Vec<OutboundRequest>) -> Self {
        Self { requests, outcome: StateSyncOutcome::InProgress }
    }
}

struct Candidate {
    bytes: Vec<u8>,
    weight: u64,
}

/// Samples beacons for a state summary and tallies validator weight behind
/// each distinct candidate seen.
pub struct StateSyncer {
    chain_id: Id,
    config: StateSyncConfig,
    vm: SharedVm,
    beacons: HashSet<NodeId>,
    total_sampled_weight: u64,
    pending: HashMap<u32, NodeId>,
    next_request_id: u32,
    responded: HashSet<NodeId>,
    candidates: HashMap<Id, Candidate>,
    decided: bool,
}

impl StateSyncer {
    /// A fresh, unstarted state-syncer for `chain_id`.
    pub fn new(chain_id: Id, config: StateSyncConfig, vm: SharedVm) -> Self {
        Self {
            chain_id,
            config,
            vm,
            beacons: HashSet::new(),
            total_sampled_weight: 0,
            pending: HashMap::new(),
            next_request_id: 0,
            responded: HashSet::new(),
            candidates: HashMap::new(),
            decided: false,
        }
    }

    /// The chain this state-syncer is fetching for.
    pub fn chain_id(&self) -> Id {
        self.chain_id
    }

    fn next_request_id(&mut self) -> u32 {
        let id = self.next_request_id;
        self.next_request_id = self.next_request_id.wrapping_add(1);
        id
    }

    /// Sample `config.sample_k` beacons and request their state summary
    /// frontier.
    pub fn start(&mut self, validators: &ValidatorSet, seed: u64) -> Result<StateSyncOutput> {
        let sampled = validators.sample(self.config.sample_k as usize, seed);
        self.beacons = sampled.into_iter().collect();
        if self.beacons.is_empty() {
            return Err(BootstrapError::NoBeacons);
        }
        self.total_sampled_weight =
            self.beacons.iter().map(|b| validators.weight_of(b)).sum();

        let mut requests = Vec::with_capacity(self.beacons.len());
        for &beacon in &self.beacons {
            let request_id = self.next_request_id();
            self.pending.insert(request_id, beacon);
            requests.push(OutboundRequest {
                to: beacon,
                message: Message::GetStateSummaryFrontier { chain_id: self.chain_id, request_id },
            });
        }
        Ok(StateSyncOutput::in_progress(requests))
    }

    /// A beacon's state summary frontier arrived.
    pub fn on_state_summary_frontier(
        &mut self,
        request_id: u32,
        from: NodeId,
        summary: Vec<u8>,
        validators: &ValidatorSet,
    ) -> StateSyncOutput {
        if self.pending.remove(&request_id) != Some(from) || self.decided {
            return StateSyncOutput::in_progress(Vec::new());
        }
        self.responded.insert(from);

        let hash = solana_sha256_hasher::hashv(&[&summary]);
        let summary_id = Id::from(<[u8; 32]>::try_from(hash.as_ref()).expect("sha256 is 32 bytes"));
        let weight = validators.weight_of(&from);
        let candidate = self.candidates.entry(summary_id).or_insert_with(|| Candidate { bytes: summary, weight: 0 });
        candidate.weight = candidate.weight.saturating_add(weight);

        self.try_decide()
    }

    /// A state-summary-frontier request timed out or the beacon disconnected.
    pub fn on_state_summary_frontier_failed(&mut self, request_id: u32) -> StateSyncOutput {
        if let Some(beacon) = self.pending.remove(&request_id) {
            self.responded.insert(beacon);
        }
        self.try_decide()
    }

    fn try_decide(&mut self) -> StateSyncOutput {
        if self.decided {
            return StateSyncOutput::in_progress(Vec::new());
        }
        let majority_threshold = self.total_sampled_weight / 2;
        let winner = self
            .candidates
            .iter()
            .find(|(_, c)| self.total_sampled_weight > 0 && c.weight > majority_threshold)
            .map(|(id, c)| (*id, c.bytes.clone()));

        if let Some((_, bytes)) = winner {
            self.decided = true;
            let accepted = self.vm.lock().apply_state_summary(&bytes);
            return StateSyncOutput {
                requests: Vec::new(),
                outcome: if accepted { StateSyncOutcome::Applied } else { StateSyncOutcome::FallBack },
            };
        }

        if self.responded.len() >= self.beacons.len() {
            // Every sampled beacon answered (or failed) and no candidate
            // reached a majority: give up and let the handler fall back.
            self.decided = true;
            return StateSyncOutput { requests: Vec::new(), outcome: StateSyncOutcome::FallBack };
        }

        StateSyncOutput::in_progress(Vec::new())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use solana_bls_signatures::Pubkey as BlsPubkey;

    fn id(byte: u8) -> Id {
        Id::from([byte; 32])
    }

    fn node(byte: u8) -> NodeId {
        NodeId::from([byte; 20])
    }

    fn validators_with(nodes: &[u8]) -> ValidatorSet {
        let mut set = ValidatorSet::new();
        for &n in nodes {
            set.add_staker(node(n), None::<BlsPubkey>, id(n), 10).unwrap();
        }
        set
    }

    struct AcceptingVm;
    impl ChainVm for AcceptingVm {
        fn parse(&self, _bytes: &[u8]) -> Option<(Id, Id)> {
            None
        }
        fn bytes_of(&self, _id: Id) -> Option<Vec<u8>> {
            None
        }
        fn accept(&mut self, _id: Id) {}
        fn reject(&mut self, _id: Id) {}
        fn last_accepted(&self) -> Id {
            Id::zero()
        }
        fn apply_state_summary(&mut self, _bytes: &[u8]) -> bool {
            true
        }
    }

    struct RejectingVm;
    impl ChainVm for RejectingVm {
        fn parse(&self, _bytes: &[u8]) -> Option<(Id, Id)> {
            None
        }
        fn bytes_of(&self, _id: Id) -> Option<Vec<u8>> {
            None
        }
        fn accept(&mut self, _id: Id) {}
        fn reject(&mut self, _id: Id) {}
        fn last_accepted(&self) -> Id {
            Id::zero()
        }
        fn apply_state_summary(&mut self, _bytes: &[u8]) -> bool {
            false
        }
    }

    #[test]
    fn test_majority_summary_is_applied() {
        let vm: SharedVm = std::sync::Arc::new(parking_lot::Mutex::new(AcceptingVm));
        let mut syncer = StateSyncer::new(id(1), StateSyncConfig::default(), vm);
        let validators = validators_with(&[1, 2, 3]);
        let output = syncer.start(&validators, 5).unwrap();
        assert_eq!(output.outcome, StateSyncOutcome::InProgress);

        let summary = vec![9u8; 8];
        let mut outcome = StateSyncOutcome::InProgress;
        for req in output.requests {
            let request_id = match req.message {
                Message::GetStateSummaryFrontier { request_id, .. } => request_id,
                _ => panic!("expected frontier request"),
            };
            let result = syncer.on_state_summary_frontier(request_id, req.to, summary.clone(), &validators);
            outcome = result.outcome;
            if outcome != StateSyncOutcome::InProgress {
                break;
            }
        }
        assert_eq!(outcome, StateSyncOutcome::Applied);
    }

    #[test]
    fn test_rejected_summary_falls_back() {
        let vm: SharedVm = std::sync::Arc::new(parking_lot::Mutex::new(RejectingVm));
        let mut syncer = StateSyncer::new(id(1), StateSyncConfig::default(), vm);
        let validators = validators_with(&[1, 2, 3]);
        let output = syncer.start(&validators, 5).unwrap();

        let summary = vec![9u8; 8];
        let mut outcome = StateSyncOutcome::InProgress;
        for req in output.requests {
            let request_id = match req.message {
                Message::GetStateSummaryFrontier { request_id, .. } => request_id,
                _ => panic!("expected frontier request"),
            };
            let result = syncer.on_state_summary_frontier(request_id, req.to, summary.clone(), &validators);
            outcome = result.outcome;
            if outcome != StateSyncOutcome::InProgress {
                break;
            }
        }
        assert_eq!(outcome, StateSyncOutcome::FallBack);
    }

    #[test]
    fn test_split_summaries_fall_back_once_all_respond() {
        let vm: SharedVm = std::sync::Arc::new(parking_lot::Mutex::new(AcceptingVm));
        let mut syncer = StateSyncer::new(id(1), StateSyncConfig::default(), vm);
        let validators = validators_with(&[1, 2]);
        let output = syncer.start(&validators, 1).unwrap();
        assert_eq!(output.requests.len(), 2);

        let mut outcome = StateSyncOutcome::InProgress;
        for (i, req) in output.requests.into_iter().enumerate() {
            let request_id = match req.message {
                Message::GetStateSummaryFrontier { request_id, .. } => request_id,
                _ => panic!("expected frontier request"),
            };
            let summary = vec![i as u8; 8];
            let result = syncer.on_state_summary_frontier(request_id, req.to, summary, &validators);
            outcome = result.outcome;
        }
        assert_eq!(outcome, StateSyncOutcome::FallBack);
    }
}
