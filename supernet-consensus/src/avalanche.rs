//! DAG consensus engine (Avalanche): preference lives per transaction inside
//! a conflict set, not per vertex. Every conflict set reuses a
//! [`SnowballTree`] rooted at "no transaction chosen yet" — a transaction
//! candidate is structurally a sibling competing for the same parent slot,
//! so the block-chain engine's confidence counter applies unmodified.
//!
//! A distinguished stop vertex (codec version 1) marks the point a DAG is
//! linearized into a single accepted order; once it is accepted, the chain
//! is handed off to a Snowman engine for the remainder of its life.

use {
    crate::{
        error::{ConsensusError, Result},
        poll::{poll_seed, sample_validators, PollState},
        snowball::SnowballTree,
    },
    std::collections::{HashMap, HashSet},
    supernet_codec::{Id, Message, NodeId},
    supernet_supernet::ConsensusParameters,
    supernet_timeout::Benchlist,
    supernet_validators::ValidatorSet,
};

/// The "no candidate chosen yet" root every conflict set's tree is anchored
/// to. Never a valid transaction id.
const UNRESOLVED: Id = Id::zero();

/// A vertex: a DAG node referencing a set of parent vertices and carrying a
/// batch of transactions.
#[derive(Debug, Clone)]
pub struct Vertex {
    /// Parent vertex ids.
    pub parents: Vec<Id>,
    /// Transactions this vertex introduces.
    pub transactions: Vec<Id>,
    /// `1 + max(parent heights)`, or `0` for a genesis vertex.
    pub height: u64,
    /// Whether this is the distinguished stop vertex ending DAG consensus.
    pub is_stop_vertex: bool,
}

/// Drives Avalanche consensus for a single DAG chain.
pub struct AvalancheEngine {
    chain_id: Id,
    params: ConsensusParameters,
    validators: ValidatorSet,
    benchlist: Benchlist,
    vertices: HashMap<Id, Vertex>,
    /// One confidence tree per conflict set, keyed by an arbitrary but
    /// stable conflict-set id (the id of the first transaction observed in it).
    conflict_sets: HashMap<Id, SnowballTree>,
    /// Maps a transaction id to the conflict set it belongs to.
    tx_conflict_set: HashMap<Id, Id>,
    accepted_txs: HashSet<Id>,
    rejected_txs: HashSet<Id>,
    stop_vertex: Option<Id>,
    polls: HashMap<u32, PollState>,
    next_request_id: u32,
    next_sequence: u64,
}

/// What driving the engine produced.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct EngineOutput {
    /// Queries the router should dispatch.
    pub messages: Vec<crate::snowman::OutboundQuery>,
    /// Transactions accepted this call.
    pub accepted: Vec<Id>,
    /// Transactions rejected this call.
    pub rejected: Vec<Id>,
    /// `true` once the stop vertex has been accepted; the chain should be
    /// handed off to a Snowman engine after this fires.
    pub linearized: bool,
}

impl AvalancheEngine {
    /// A fresh engine with no vertices or conflict sets.
    pub fn new(chain_id: Id, params: ConsensusParameters, validators: ValidatorSet, benchlist: Benchlist) -> Self {
        Self {
            chain_id,
            params,
            validators,
            benchlist,
            vertices: HashMap::new(),
            conflict_sets: HashMap::new(),
            tx_conflict_set: HashMap::new(),
            accepted_txs: HashSet::new(),
            rejected_txs: HashSet::new(),
            stop_vertex: None,
            polls: HashMap::new(),
            next_request_id: 0,
            next_sequence: 0,
        }
    }

    /// `true` once the stop vertex has been accepted and the DAG is fully
    /// linearized.
    pub fn is_linearized(&self) -> bool {
        self.stop_vertex.is_some_and(|id| self.accepted_txs.contains(&id) || self.vertices.get(&id).is_none())
    }

    /// Register a new vertex. `conflict_set` groups each of its transactions
    /// with whichever other candidates double-spend the same resource; pass
    /// the transaction's own id as its conflict set's key for a
    /// single-candidate (uncontested) transaction.
    pub fn add_vertex(&mut self, id: Id, vertex: Vertex, conflict_set_of: impl Fn(Id) -> Id) {
        for &tx in &vertex.transactions {
            let set_key = conflict_set_of(tx);
            self.tx_conflict_set.insert(tx, set_key);
            let tree = self
                .conflict_sets
                .entry(set_key)
                .or_insert_with(|| SnowballTree::new(UNRESOLVED));
            tree.add(tx, UNRESOLVED);
        }
        if vertex.is_stop_vertex {
            self.stop_vertex = Some(id);
        }
        self.vertices.insert(id, vertex);
    }

    /// The vertex ids this engine currently knows about.
    pub fn known_vertices(&self) -> usize {
        self.vertices.len()
    }

    /// `true` iff `tx` has been decided accepted.
    pub fn is_tx_accepted(&self, tx: &Id) -> bool {
        self.accepted_txs.contains(tx)
    }

    /// `true` iff `tx` has been decided rejected.
    pub fn is_tx_rejected(&self, tx: &Id) -> bool {
        self.rejected_txs.contains(tx)
    }

    /// Start a repoll over the whole chain's pending vertex set.
    pub fn start_repoll(&mut self, container_id: Id) -> Option<EngineOutput> {
        if self.validators.is_empty() {
            return None;
        }
        let seed = poll_seed(self.chain_id, 0, self.next_sequence);
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
            container_id,
        };
        Some(EngineOutput {
            messages: vec![crate::snowman::OutboundQuery { targets, message }],
            ..Default::default()
        })
    }

    /// A peer voted its preferred transaction within `conflict_set`.
    pub fn on_chits(
        &mut self,
        request_id: u32,
        from: NodeId,
        conflict_set: Id,
        preferred_tx: Id,
        now: std::time::Instant,
    ) -> Result<EngineOutput> {
        self.benchlist.record_success(from);
        self.record_vote(request_id, from, Some((conflict_set, preferred_tx)), now)
    }

    /// The router synthesized a failure for this query.
    pub fn on_query_failed(&mut self, request_id: u32, from: NodeId, now: std::time::Instant) -> Result<EngineOutput> {
        let node_weight = self.validators.weight_of(&from);
        // `MaxPortion` benching only needs an upper bound on the set's
        // liveness budget; an overflowing set is treated as unbounded
        // rather than threading the query's error here.
        let total_weight = self.validators.total_weight().unwrap_or(u64::MAX);
        self.benchlist.record_failure(from, now, node_weight, total_weight);
        self.record_vote(request_id, from, None, now)
    }

    fn record_vote(
        &mut self,
        request_id: u32,
        from: NodeId,
        vote: Option<(Id, Id)>,
        now: std::time::Instant,
    ) -> Result<EngineOutput> {
        let poll = self
            .polls
            .get_mut(&request_id)
            .ok_or(ConsensusError::UnknownItem)?;
        poll.record_response(from, vote.map(|(_, tx)| tx));

        let benched: HashSet<NodeId> = self.benchlist.benched_nodes(now).into_iter().collect();
        if !poll.is_complete(&benched) {
            return Ok(EngineOutput::default());
        }
        self.polls.remove(&request_id);

        let votes = poll.votes();
        let mut accepted = Vec::new();
        let mut rejected = Vec::new();

        // Fold the poll's votes into each conflict set whose candidate was
        // among the votes; a conflict set not represented in this poll's
        // votes is simply not advanced this round.
        let mut by_set: HashMap<Id, Vec<Id>> = HashMap::new();
        for tx in votes {
            if let Some(&set_key) = self.tx_conflict_set.get(&tx) {
                by_set.entry(set_key).or_default().push(tx);
            }
        }

        for (set_key, set_votes) in by_set {
            if let Some(tree) = self.conflict_sets.get_mut(&set_key) {
                let outcome = tree.record_poll(
                    &set_votes,
                    self.params.alpha_preference,
                    self.params.alpha_confidence,
                    self.params.beta,
                );
                for tx in outcome.accepted {
                    self.accepted_txs.insert(tx);
                    accepted.push(tx);
                }
                for tx in outcome.rejected {
                    self.rejected_txs.insert(tx);
                    rejected.push(tx);
                }
            }
        }

        let linearized = self
            .stop_vertex
            .is_some_and(|stop_id| self.vertices.get(&stop_id).is_some_and(|v| {
                v.transactions.iter().all(|tx| self.accepted_txs.contains(tx))
            }));

        Ok(EngineOutput {
            messages: Vec::new(),
            accepted,
            rejected,
            linearized,
        })
    }
}

#[cfg(test)]
mod tests {
    use {
        super::*,
        supernet_timeout::BenchlistConfig,
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

    fn engine(n: u8) -> AvalancheEngine {
        AvalancheEngine::new(id(0), params(), validators(n), Benchlist::new(BenchlistConfig::default()))
    }

    #[test]
    fn test_single_candidate_conflict_set_accepts_after_beta_polls() {
        let mut engine = engine(3);
        engine.add_vertex(
            id(10),
            Vertex { parents: vec![], transactions: vec![id(1)], height: 0, is_stop_vertex: false },
            |_| id(1),
        );

        let mut accepted = Vec::new();
        for _ in 0..2 {
            let out = engine.start_repoll(id(10)).unwrap();
            let request_id = match out.messages[0].message {
                Message::PullQuery { request_id, .. } => request_id,
                _ => panic!(),
            };
            let targets = out.messages[0].targets.clone();
            let mut last = EngineOutput::default();
            for t in targets {
                last = engine.on_chits(request_id, t, id(1), id(1), std::time::Instant::now()).unwrap();
            }
            accepted.extend(last.accepted);
        }
        assert_eq!(accepted, vec![id(1)]);
        assert!(engine.is_tx_accepted(&id(1)));
    }

    #[test]
    fn test_conflicting_transactions_one_rejects_the_other() {
        let mut engine = engine(3);
        engine.add_vertex(
            id(10),
            Vertex { parents: vec![], transactions: vec![id(1)], height: 0, is_stop_vertex: false },
            |_| id(1),
        );
        engine.add_vertex(
            id(11),
            Vertex { parents: vec![], transactions: vec![id(2)], height: 0, is_stop_vertex: false },
            |_| id(1),
        );

        for _ in 0..2 {
            let out = engine.start_repoll(id(10)).unwrap();
            let request_id = match out.messages[0].message {
                Message::PullQuery { request_id, .. } => request_id,
                _ => panic!(),
            };
            let targets = out.messages[0].targets.clone();
            for t in targets {
                engine.on_chits(request_id, t, id(1), id(1), std::time::Instant::now()).unwrap();
            }
        }
        assert!(engine.is_tx_accepted(&id(1)));
        assert!(engine.is_tx_rejected(&id(2)));
    }

    #[test]
    fn test_stop_vertex_linearizes_once_its_transactions_accept() {
        let mut engine = engine(3);
        engine.add_vertex(
            id(20),
            Vertex { parents: vec![], transactions: vec![id(5)], height: 0, is_stop_vertex: true },
            |_| id(5),
        );

        let mut last = EngineOutput::default();
        for _ in 0..2 {
            let out = engine.start_repoll(id(20)).unwrap();
            let request_id = match out.messages[0].message {
                Message::PullQuery { request_id, .. } => request_id,
                _ => panic!(),
            };
            let targets = out.messages[0].targets.clone();
            for t in targets {
                last = engine.on_chits(request_id, t, id(5), id(5), std::time::Instant::now()).unwrap();
            }
        }
        assert!(last.linearized);
    }
}
