//! Block-chain consensus engine (Snowman): one [`SnowballTree`] rooted at the
//! chain's last accepted block, driven by repeated weighted sampling of the
//! supernet's validator set.

use {
    crate::{
        error::{ConsensusError, Result},
        poll::{poll_seed, sample_validators, PollState},
        snowball::{PollOutcome, SnowballTree},
    },
    log::warn,
    std::{
        collections::{HashMap, HashSet},
        time::{Duration, Instant},
    },
    supernet_codec::{Id, Message, NodeId},
    supernet_supernet::ConsensusParameters,
    supernet_timeout::Benchlist,
    supernet_validators::ValidatorSet,
};

/// A query this engine wants delivered to a set of peers.
#[derive(Debug, Clone, PartialEq)]
pub struct OutboundQuery {
    /// Peers the message should be sent to.
    pub targets: Vec<NodeId>,
    /// The message itself (always a [`Message::PullQuery`] for this engine).
    pub message: Message,
}

/// What driving the engine produced: zero or more outbound queries, plus any
/// items that newly transitioned to accepted or rejected this call.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct EngineOutput {
    /// Queries the router should dispatch.
    pub messages: Vec<OutboundQuery>,
    /// Items accepted this call, root-ward first.
    pub accepted: Vec<Id>,
    /// Items rejected this call (siblings of the accepted path, or items
    /// dropped by the liveness safety valve).
    pub rejected: Vec<Id>,
}

impl EngineOutput {
    fn empty() -> Self {
        Self::default()
    }

    fn from_poll_outcome(outcome: PollOutcome) -> Self {
        Self {
            messages: Vec::new(),
            accepted: outcome.accepted,
            rejected: outcome.rejected,
        }
    }
}

/// Drives Snowman consensus for a single chain.
pub struct SnowmanEngine {
    chain_id: Id,
    params: ConsensusParameters,
    tree: SnowballTree,
    validators: ValidatorSet,
    benchlist: Benchlist,
    polls: HashMap<u32, PollState>,
    processing: HashSet<Id>,
    item_added_at: HashMap<Id, Instant>,
    next_request_id: u32,
    next_sequence: u64,
}

impl SnowmanEngine {
    /// A fresh engine with nothing pending beyond `last_accepted`.
    pub fn new(
        chain_id: Id,
        last_accepted: Id,
        params: ConsensusParameters,
        validators: ValidatorSet,
        benchlist: Benchlist,
    ) -> Self {
        Self {
            chain_id,
            params,
            tree: SnowballTree::new(last_accepted),
            validators,
            benchlist,
            polls: HashMap::new(),
            processing: HashSet::new(),
            item_added_at: HashMap::new(),
            next_request_id: 0,
            next_sequence: 0,
        }
    }

    /// The chain this engine drives.
    pub fn chain_id(&self) -> Id {
        self.chain_id
    }

    /// The chain's current last-accepted block.
    pub fn last_accepted(&self) -> Id {
        self.tree.last_accepted()
    }

    /// The engine's current preferred block.
    pub fn preference(&self) -> Id {
        self.tree.preference()
    }

    /// `true` iff `id` is the chain's last accepted block.
    pub fn is_accepted(&self, id: &Id) -> bool {
        *id == self.tree.last_accepted()
    }

    /// Replace the validator set backing future polls (e.g. after a staking
    /// event changes the supernet's weights).
    pub fn update_validator_set(&mut self, validators: ValidatorSet) {
        self.validators = validators;
    }

    /// Hand the engine a newly observed block. Fails if the backlog already
    /// exceeds `max_outstanding_items` (the VM must stop producing until it
    /// drains) or if `parent` isn't known.
    pub fn add_item(&mut self, id: Id, parent: Id, now: Instant) -> Result<()> {
        if self.processing.len() as u32 >= self.params.max_outstanding_items {
            return Err(ConsensusError::Backpressured);
        }
        if !self.tree.add(id, parent) {
            return Err(ConsensusError::UnknownParent);
        }
        self.processing.insert(id);
        self.item_added_at.insert(id, now);
        Ok(())
    }

    /// Number of items currently pending a decision.
    pub fn processing_len(&self) -> usize {
        self.processing.len()
    }

    /// Start a new repoll: sample `k` validators, query each for its current
    /// preference. Returns `None` if the validator set is empty.
    pub fn start_repoll(&mut self) -> Option<EngineOutput> {
        if self.validators.is_empty() {
            return None;
        }
        let seed = poll_seed(self.chain_id, self.next_height_hint(), self.next_sequence);
        self.next_sequence = self.next_sequence.saturating_add(1);
        let targets = sample_validators(&self.validators, self.params.k, seed);
        if targets.is_empty() {
            return None;
        }

        let request_id = self.next_request_id;
        self.next_request_id = self.next_request_id.wrapping_add(1);
        self.polls.insert(
            request_id,
            PollState::new(request_id, targets.iter().copied().collect()),
        );

        let message = Message::PullQuery {
            chain_id: self.chain_id,
            request_id,
            container_id: self.preference(),
        };
        Some(EngineOutput {
            messages: vec![OutboundQuery { targets, message }],
            accepted: Vec::new(),
            rejected: Vec::new(),
        })
    }

    /// A peer's vote landed (`Chits`). Folds the vote in; if the poll has
    /// now collected every expected reply (accounting for benched peers)
    /// the tally is run against the confidence tree.
    pub fn on_chits(&mut self, request_id: u32, from: NodeId, preferred: Id, now: Instant) -> Result<EngineOutput> {
        self.benchlist.record_success(from);
        self.record_vote(request_id, from, Some(preferred), now)
    }

    /// The router synthesized a failure for this query (timeout, bench, or
    /// disconnect). Counts toward poll completion but not the tally, and is
    /// reported to the benchlist.
    pub fn on_query_failed(&mut self, request_id: u32, from: NodeId, now: Instant) -> Result<EngineOutput> {
        let node_weight = self.validators.weight_of(&from);
        // `MaxPortion` benching only needs an upper bound on the set's
        // liveness budget; an overflowing set is treated as unbounded
        // rather than threading the query's error here.
        let total_weight = self.validators.total_weight().unwrap_or(u64::MAX);
        self.benchlist.record_failure(from, now, node_weight, total_weight);
        self.record_vote(request_id, from, None, now)
    }

    fn record_vote(&mut self, request_id: u32, from: NodeId, vote: Option<Id>, now: Instant) -> Result<EngineOutput> {
        let poll = self
            .polls
            .get_mut(&request_id)
            .ok_or(ConsensusError::UnknownItem)?;
        poll.record_response(from, vote);

        let benched: HashSet<NodeId> = self.benchlist.benched_nodes(now).into_iter().collect();
        if !poll.is_complete(&benched) {
            return Ok(EngineOutput::empty());
        }

        let votes = poll.votes();
        self.polls.remove(&request_id);
        let outcome = self.tree.record_poll(
            &votes,
            self.params.alpha_preference,
            self.params.alpha_confidence,
            self.params.beta,
        );
        for id in outcome.accepted.iter().chain(outcome.rejected.iter()) {
            self.processing.remove(id);
            self.item_added_at.remove(id);
        }
        Ok(EngineOutput::from_poll_outcome(outcome))
    }

    /// Liveness safety valve: drop any pending item that has sat longer than
    /// `max_item_processing_time_ms`, rejecting it and every descendant.
    /// Best-effort — correctness doesn't depend on this ever firing.
    pub fn check_liveness(&mut self, now: Instant) -> EngineOutput {
        let max_age = Duration::from_millis(self.params.max_item_processing_time_ms);
        let stale: Vec<Id> = self
            .item_added_at
            .iter()
            .filter(|(_, added_at)| now.saturating_duration_since(**added_at) > max_age)
            .map(|(id, _)| *id)
            .collect();

        let mut rejected = Vec::new();
        for id in stale {
            if !self.item_added_at.contains_key(&id) {
                continue;
            }
            warn!(
                "chain {:?}: item {:?} exceeded max processing time, dropping",
                self.chain_id, id
            );
            let dropped = self.tree.drop_subtree(id);
            for dropped_id in &dropped {
                self.processing.remove(dropped_id);
                self.item_added_at.remove(dropped_id);
            }
            rejected.extend(dropped);
        }

        EngineOutput {
            messages: Vec::new(),
            accepted: Vec::new(),
            rejected,
        }
    }

    /// In-flight polls this chain currently has outstanding.
    pub fn outstanding_polls(&self) -> usize {
        self.polls.len()
    }

    fn next_height_hint(&self) -> u64 {
        // The poll seed only needs to change across repolls, not track a
        // real height; the sequence counter already guarantees that, so a
        // constant here keeps the seed derivation one hash call.
        0
    }
}

#[cfg(test)]
mod tests {
    use {
        super::*,
        std::time::Duration,
        supernet_timeout::BenchlistConfig,
        supernet_validators::ValidatorSet,
    };

    fn id(byte: u8) -> Id {
        Id::from([byte; 32])
    }

    fn node(byte: u8) -> NodeId {
        NodeId::from([byte; 20])
    }

    fn params() -> ConsensusParameters {
        ConsensusParameters {
            k: 3,
            alpha_preference: 2,
            alpha_confidence: 2,
            beta: 2,
            ..ConsensusParameters::default()
        }
    }

    fn validators(n: u8) -> ValidatorSet {
        let mut set = ValidatorSet::new();
        for i in 1..=n {
            set.add_staker(node(i), None, Id::zero(), 1).unwrap();
        }
        set
    }

    fn engine(n: u8) -> SnowmanEngine {
        SnowmanEngine::new(
            id(0),
            id(0),
            params(),
            validators(n),
            Benchlist::new(BenchlistConfig::default()),
        )
    }

    #[test]
    fn test_add_item_requires_known_parent() {
        let mut engine = engine(3);
        assert!(engine.add_item(id(1), id(0), Instant::now()).is_ok());
        assert_eq!(
            engine.add_item(id(2), id(99), Instant::now()),
            Err(ConsensusError::UnknownParent)
        );
    }

    #[test]
    fn test_add_item_backpressures_over_max_outstanding() {
        let mut p = params();
        p.max_outstanding_items = 1;
        let mut engine = SnowmanEngine::new(id(0), id(0), p, validators(3), Benchlist::new(BenchlistConfig::default()));
        engine.add_item(id(1), id(0), Instant::now()).unwrap();
        assert_eq!(
            engine.add_item(id(2), id(1), Instant::now()),
            Err(ConsensusError::Backpressured)
        );
    }

    #[test]
    fn test_repoll_round_trip_accepts_after_beta_confident_polls() {
        let mut engine = engine(3);
        engine.add_item(id(1), id(0), Instant::now()).unwrap();

        let mut accepted = Vec::new();
        for _ in 0..2 {
            let out = engine.start_repoll().unwrap();
            let query = &out.messages[0];
            let request_id = match query.message {
                Message::PullQuery { request_id, .. } => request_id,
                _ => panic!("expected PullQuery"),
            };
            let mut last = EngineOutput::empty();
            for target in &query.targets {
                last = engine
                    .on_chits(request_id, *target, id(1), Instant::now())
                    .unwrap();
            }
            accepted.extend(last.accepted);
        }

        assert_eq!(accepted, vec![id(1)]);
        assert_eq!(engine.last_accepted(), id(1));
        assert_eq!(engine.processing_len(), 0);
    }

    #[test]
    fn test_query_failed_counts_toward_completion_not_tally() {
        let mut engine = engine(3);
        engine.add_item(id(1), id(0), Instant::now()).unwrap();
        let out = engine.start_repoll().unwrap();
        let request_id = match out.messages[0].message {
            Message::PullQuery { request_id, .. } => request_id,
            _ => panic!(),
        };
        let targets = out.messages[0].targets.clone();
        let now = Instant::now();
        let result = engine
            .on_query_failed(request_id, targets[0], now)
            .unwrap();
        assert!(result.accepted.is_empty());
        // Poll not complete yet: two more votes outstanding.
        assert_eq!(engine.outstanding_polls(), 1);
        engine.on_chits(request_id, targets[1], id(1), now).unwrap();
        engine.on_chits(request_id, targets[2], id(1), now).unwrap();
        assert_eq!(engine.outstanding_polls(), 0);
    }

    #[test]
    fn test_check_liveness_drops_stale_item() {
        let mut p = params();
        p.max_item_processing_time_ms = 10;
        let mut engine = SnowmanEngine::new(id(0), id(0), p, validators(3), Benchlist::new(BenchlistConfig::default()));
        let added_at = Instant::now() - Duration::from_millis(50);
        engine.add_item(id(1), id(0), added_at).unwrap();
        let out = engine.check_liveness(Instant::now());
        assert_eq!(out.rejected, vec![id(1)]);
        assert_eq!(engine.processing_len(), 0);
    }

    #[test]
    fn test_check_liveness_leaves_fresh_item_alone() {
        let mut engine = engine(3);
        engine.add_item(id(1), id(0), Instant::now()).unwrap();
        let out = engine.check_liveness(Instant::now());
        assert!(out.rejected.is_empty());
        assert_eq!(engine.processing_len(), 1);
    }
}
