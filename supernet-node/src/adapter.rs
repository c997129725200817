//! Bridges the four pure engine state machines — state-syncer, bootstrapper,
//! Snowman, Avalanche — to the uniform [`ChainEngine`] seam a [`Handler`]
//! dispatches through, and answers the peer-initiated requests none of those
//! engines handle on their own (they only ever initiate requests, never
//! respond to one).
//!
//! Grounded on `core/src/bft_adapter.rs`'s `BftAdapter`: that adapter owns
//! one concrete consensus engine and translates its pure `EngineOutput` into
//! the host's network/commit operations. Here the same translation runs
//! across four engine types instead of one, since a chain's engine changes
//! over its lifetime as it progresses from bootstrap through to its final
//! consensus engine.
//!
//! [`Handler`]: supernet_chain::Handler

use {
    log::warn,
    std::{
        collections::{HashMap, VecDeque},
        sync::Arc,
        time::Instant,
    },
    supernet_bootstrap::{bootstrapper::Bootstrapper, state_syncer::StateSyncer, BootstrapRequest, StateSyncOutcome, StateSyncRequest},
    supernet_chain::engine::{ChainEngine, ChainVm, OutboundMessage, StepOutput},
    supernet_codec::{Id, Message, NodeId},
    supernet_consensus::{AvalancheEngine, AvalancheEngineOutput, EngineOutput as SnowmanOutput, SnowmanEngine, Vertex},
    supernet_validators::ValidatorSet,
};

/// A VM shared between the engine stage currently active and whatever runs
/// next, matching `supernet-bootstrap`'s [`supernet_bootstrap::bootstrapper::SharedVm`].
pub type SharedVm = Arc<parking_lot::Mutex<dyn ChainVm>>;

/// Caches wire-received container bytes a chain's VM doesn't retain on its
/// own, so `Get`/`GetAncestors` requests from other peers can still be
/// served after this node has already accepted (or forwarded) an item.
///
/// The [`ChainVm`] seam only exposes `bytes_of` for containers the VM itself
/// chose to keep; nothing requires it to persist bytes it merely saw in
/// transit. This cache is the node-layer's own record of those bytes.
#[derive(Clone, Default)]
pub struct ContainerCache(Arc<parking_lot::Mutex<HashMap<Id, Vec<u8>>>>);

impl ContainerCache {
    /// An empty cache.
    pub fn new() -> Self {
        Self::default()
    }

    /// Remember `bytes` under `id`.
    pub fn insert(&self, id: Id, bytes: Vec<u8>) {
        self.0.lock().insert(id, bytes);
    }

    /// The cached bytes for `id`, if any.
    pub fn get(&self, id: Id) -> Option<Vec<u8>> {
        self.0.lock().get(&id).cloned()
    }
}

fn container_bytes(vm: &SharedVm, cache: &ContainerCache, id: Id) -> Option<Vec<u8>> {
    vm.lock().bytes_of(id).or_else(|| cache.get(id))
}

/// Longest ancestor chain served in one `GetAncestors` reply, regardless of
/// how many the peer asked for; mirrors `AncestorsMaxContainersSent`.
const MAX_ANCESTORS_SERVED: usize = 64;

/// Answer a peer's VM-level query (frontier, accepted-subset, ancestors, a
/// single item, or state-summary query) directly from the VM and container
/// cache, independent of which engine is currently active. `None` if
/// `message` isn't one of these request kinds.
fn vm_query_response(vm: &SharedVm, cache: &ContainerCache, chain_id: Id, message: &Message) -> Option<Message> {
    match message {
        Message::GetAcceptedFrontier { request_id, .. } => Some(Message::AcceptedFrontier {
            chain_id,
            request_id: *request_id,
            container_ids: vec![vm.lock().last_accepted()],
        }),
        Message::GetAccepted { request_id, container_ids, .. } => {
            let last_accepted = vm.lock().last_accepted();
            let accepted = container_ids.iter().copied().filter(|id| *id == last_accepted).collect();
            Some(Message::Accepted { chain_id, request_id: *request_id, container_ids: accepted })
        }
        Message::GetAncestors { request_id, container_id, .. } => {
            let mut containers = Vec::new();
            let mut current = *container_id;
            while containers.len() < MAX_ANCESTORS_SERVED {
                let Some(bytes) = container_bytes(vm, cache, current) else { break };
                let parent = vm.lock().parse(&bytes).map(|(_, parent)| parent);
                containers.push(bytes);
                match parent {
                    Some(parent) if parent != current => current = parent,
                    _ => break,
                }
            }
            Some(Message::Ancestors { chain_id, request_id: *request_id, containers })
        }
        Message::Get { request_id, container_id, .. } => {
            let container = container_bytes(vm, cache, *container_id)?;
            Some(Message::Put { chain_id, request_id: *request_id, container_id: *container_id, container })
        }
        Message::GetStateSummaryFrontier { request_id, .. } => Some(Message::StateSummaryFrontier {
            chain_id,
            request_id: *request_id,
            summary: vm.lock().last_accepted().as_bytes().to_vec(),
        }),
        Message::GetAcceptedStateSummary { request_id, .. } => {
            // The shipped demo VMs have no height index to answer against;
            // an empty reply tells the asker this node has nothing for them.
            Some(Message::AcceptedStateSummary { chain_id, request_id: *request_id, summary_ids: Vec::new() })
        }
        _ => None,
    }
}

fn requests_to_step(requests: Vec<BootstrapRequest>, done: bool) -> StepOutput {
    StepOutput {
        messages: requests.into_iter().map(|r| OutboundMessage { to: r.to, message: r.message }).collect(),
        done,
        fatal: false,
    }
}

fn state_requests_to_step(requests: Vec<StateSyncRequest>, done: bool) -> StepOutput {
    StepOutput {
        messages: requests.into_iter().map(|r| OutboundMessage { to: r.to, message: r.message }).collect(),
        done,
        fatal: false,
    }
}

/// Wraps [`StateSyncer`], the first stage of a chain's lifecycle: samples
/// beacons for a recent state summary, answers VM queries in the meantime,
/// and hands off to the bootstrapper once a summary is applied or every
/// sampled beacon has been exhausted without a majority.
pub struct StateSyncerAdapter {
    inner: StateSyncer,
    vm: SharedVm,
    cache: ContainerCache,
    validators: ValidatorSet,
}

impl StateSyncerAdapter {
    /// Build an adapter around a fresh, unstarted state-syncer.
    pub fn new(inner: StateSyncer, vm: SharedVm, cache: ContainerCache, validators: ValidatorSet) -> Self {
        Self { inner, vm, cache, validators }
    }
}

impl ChainEngine for StateSyncerAdapter {
    fn start(&mut self, _request_id: u32, _now: Instant) -> StepOutput {
        match self.inner.start(&self.validators, rand::random()) {
            Ok(output) => state_requests_to_step(output.requests, output.outcome != StateSyncOutcome::InProgress),
            Err(e) => {
                warn!("chain {:?}: state-syncer could not start: {e}", self.inner.chain_id());
                StepOutput::empty()
            }
        }
    }

    fn handle(&mut self, from: NodeId, message: Message, now: Instant) -> StepOutput {
        if let Some(response) = vm_query_response(&self.vm, &self.cache, self.inner.chain_id(), &message) {
            return StepOutput { messages: vec![OutboundMessage { to: from, message: response }], done: false, fatal: false };
        }
        let _ = now;
        match message {
            Message::StateSummaryFrontier { request_id, summary, .. } => {
                let output = self.inner.on_state_summary_frontier(request_id, from, summary, &self.validators);
                state_requests_to_step(output.requests, output.outcome != StateSyncOutcome::InProgress)
            }
            Message::GetStateSummaryFrontierFailed { request_id, .. } => {
                let output = self.inner.on_state_summary_frontier_failed(request_id);
                state_requests_to_step(output.requests, output.outcome != StateSyncOutcome::InProgress)
            }
            _ => StepOutput::empty(),
        }
    }

    fn tick(&mut self, _now: Instant) -> StepOutput {
        StepOutput::empty()
    }
}

/// Wraps [`Bootstrapper`], the second stage of a chain's lifecycle: fetches
/// the accepted frontier and its ancestry from sampled beacons and hands
/// each discovered container to the VM in dependency order. Also answers VM
/// queries the same way the active consensus engine eventually will, so
/// peers bootstrapping from this node don't have to wait for it to finish
/// its own bootstrap first.
pub struct BootstrapperAdapter {
    inner: Bootstrapper,
    vm: SharedVm,
    cache: ContainerCache,
    validators: ValidatorSet,
}

impl BootstrapperAdapter {
    /// Build an adapter around a fresh, unstarted bootstrapper.
    pub fn new(inner: Bootstrapper, vm: SharedVm, cache: ContainerCache, validators: ValidatorSet) -> Self {
        Self { inner, vm, cache, validators }
    }
}

impl ChainEngine for BootstrapperAdapter {
    fn start(&mut self, _request_id: u32, _now: Instant) -> StepOutput {
        match self.inner.start(&self.validators, rand::random()) {
            Ok(output) => requests_to_step(output.requests, output.done),
            Err(e) => {
                warn!("chain {:?}: bootstrapper could not start: {e}", self.inner.chain_id());
                StepOutput::empty()
            }
        }
    }

    fn handle(&mut self, from: NodeId, message: Message, now: Instant) -> StepOutput {
        if let Some(response) = vm_query_response(&self.vm, &self.cache, self.inner.chain_id(), &message) {
            return StepOutput { messages: vec![OutboundMessage { to: from, message: response }], done: false, fatal: false };
        }
        let _ = now;
        match message {
            Message::AcceptedFrontier { request_id, container_ids, .. } => {
                let output = self.inner.on_accepted_frontier(request_id, from, container_ids);
                requests_to_step(output.requests, output.done)
            }
            Message::GetAcceptedFrontierFailed { request_id, .. } => {
                let output = self.inner.on_accepted_frontier_failed(request_id, from, rand::random(), &self.validators);
                requests_to_step(output.requests, output.done)
            }
            Message::Ancestors { request_id, containers, .. } => {
                for bytes in &containers {
                    if let Some((id, _)) = self.vm.lock().parse(bytes) {
                        self.cache.insert(id, bytes.clone());
                    }
                }
                let output = self.inner.on_ancestors(request_id, from, containers);
                requests_to_step(output.requests, output.done)
            }
            Message::GetAncestorsFailed { request_id, .. } => {
                let output = self.inner.on_ancestors_failed(request_id);
                requests_to_step(output.requests, output.done)
            }
            _ => StepOutput::empty(),
        }
    }

    fn tick(&mut self, _now: Instant) -> StepOutput {
        StepOutput::empty()
    }
}

fn flatten_queries(messages: Vec<supernet_consensus::OutboundQuery>) -> Vec<OutboundMessage> {
    messages
        .into_iter()
        .flat_map(|q| q.targets.into_iter().map(move |to| OutboundMessage { to, message: q.message.clone() }))
        .collect()
}

/// Wraps [`SnowmanEngine`] for a linear block chain: polls the validator set
/// for preference and answers incoming `PullQuery`/`PushQuery` votes with
/// this node's own preference and last-accepted block.
pub struct SnowmanAdapter {
    engine: SnowmanEngine,
    vm: SharedVm,
    cache: ContainerCache,
    concurrent_repolls: u32,
}

impl SnowmanAdapter {
    /// Build an adapter around a running [`SnowmanEngine`].
    pub fn new(engine: SnowmanEngine, vm: SharedVm, cache: ContainerCache, concurrent_repolls: u32) -> Self {
        Self { engine, vm, cache, concurrent_repolls }
    }

    fn apply(&mut self, output: SnowmanOutput) -> StepOutput {
        for id in &output.accepted {
            self.vm.lock().accept(*id);
        }
        for id in &output.rejected {
            self.vm.lock().reject(*id);
        }
        StepOutput { messages: flatten_queries(output.messages), done: false, fatal: false }
    }

    fn repoll_until_capped(&mut self) -> Vec<OutboundMessage> {
        let mut out = Vec::new();
        while (self.engine.outstanding_polls() as u32) < self.concurrent_repolls {
            match self.engine.start_repoll() {
                Some(output) => out.extend(flatten_queries(output.messages)),
                None => break,
            }
        }
        out
    }
}

impl ChainEngine for SnowmanAdapter {
    fn start(&mut self, _request_id: u32, _now: Instant) -> StepOutput {
        StepOutput { messages: self.repoll_until_capped(), done: false, fatal: false }
    }

    fn handle(&mut self, from: NodeId, message: Message, now: Instant) -> StepOutput {
        match message {
            Message::PullQuery { chain_id, request_id, .. } => {
                let reply = Message::Chits {
                    chain_id,
                    request_id,
                    preferred: self.engine.preference(),
                    accepted: self.engine.last_accepted(),
                };
                StepOutput { messages: vec![OutboundMessage { to: from, message: reply }], done: false, fatal: false }
            }
            Message::PushQuery { chain_id, request_id, container, .. } => {
                if let Some((id, parent)) = self.vm.lock().parse(&container) {
                    self.cache.insert(id, container);
                    if let Err(e) = self.engine.add_item(id, parent, now) {
                        warn!("chain {chain_id:?}: rejecting pushed item {id:?}: {e}");
                    }
                }
                let reply = Message::Chits {
                    chain_id,
                    request_id,
                    preferred: self.engine.preference(),
                    accepted: self.engine.last_accepted(),
                };
                StepOutput { messages: vec![OutboundMessage { to: from, message: reply }], done: false, fatal: false }
            }
            Message::Chits { request_id, preferred, .. } => match self.engine.on_chits(request_id, from, preferred, now) {
                Ok(output) => {
                    let mut step = self.apply(output);
                    step.messages.extend(self.repoll_until_capped());
                    step
                }
                Err(e) => {
                    warn!("snowman: dropping stale chits from {from}: {e}");
                    StepOutput::empty()
                }
            },
            Message::QueryFailed { request_id, .. } => match self.engine.on_query_failed(request_id, from, now) {
                Ok(output) => {
                    let mut step = self.apply(output);
                    step.messages.extend(self.repoll_until_capped());
                    step
                }
                Err(_) => StepOutput::empty(),
            },
            Message::Notify { signal, .. } => {
                if let Some((id, parent)) = self.vm.lock().parse(&signal) {
                    self.cache.insert(id, signal);
                    if let Err(e) = self.engine.add_item(id, parent, now) {
                        warn!("snowman: could not add newly produced item {id:?}: {e}");
                    }
                }
                StepOutput::empty()
            }
            other => vm_query_response(&self.vm, &self.cache, self.engine.chain_id(), &other)
                .map(|response| StepOutput { messages: vec![OutboundMessage { to: from, message: response }], done: false, fatal: false })
                .unwrap_or_else(StepOutput::empty),
        }
    }

    fn tick(&mut self, now: Instant) -> StepOutput {
        let mut step = self.apply(self.engine.check_liveness(now));
        step.messages.extend(self.repoll_until_capped());
        step
    }
}

/// Wraps [`AvalancheEngine`] for a DAG chain. Each pushed vertex here carries
/// exactly one transaction (the shipped demo VM has no batching), so a
/// vertex id and its sole transaction id coincide.
///
/// Linearization via a stop vertex is tracked but not acted on: the shipped
/// demo VM has no Snowman counterpart to hand a DAG chain off to, so this
/// adapter runs Avalanche consensus for the chain's entire life rather than
/// ever reporting `done`.
pub struct AvalancheAdapter {
    engine: AvalancheEngine,
    vm: SharedVm,
    cache: ContainerCache,
    pending: VecDeque<Id>,
}

impl AvalancheAdapter {
    /// Build an adapter around a running [`AvalancheEngine`].
    pub fn new(engine: AvalancheEngine, vm: SharedVm, cache: ContainerCache) -> Self {
        Self { engine, vm, cache, pending: VecDeque::new() }
    }

    fn apply(&mut self, output: AvalancheEngineOutput) -> StepOutput {
        for id in &output.accepted {
            self.vm.lock().accept(*id);
        }
        for id in &output.rejected {
            self.vm.lock().reject(*id);
        }
        self.pending.retain(|id| !output.accepted.contains(id) && !output.rejected.contains(id));
        if output.linearized {
            warn!("chain: DAG linearized; no Snowman hand-off wired up for this demo VM");
        }
        StepOutput { messages: flatten_queries(output.messages), done: false, fatal: false }
    }

    fn add_vertex(&mut self, bytes: &[u8]) -> Option<Id> {
        let (tx_id, conflict_set) = self.vm.lock().parse(bytes)?;
        self.engine.add_vertex(tx_id, Vertex { parents: Vec::new(), transactions: vec![tx_id], height: 0, is_stop_vertex: false }, |_| conflict_set);
        if !self.pending.contains(&tx_id) {
            self.pending.push_back(tx_id);
        }
        Some(tx_id)
    }

    /// One repoll per call, round-robining over vertices still undecided.
    fn repoll_next(&mut self) -> Vec<OutboundMessage> {
        let Some(container_id) = self.pending.pop_front() else { return Vec::new() };
        self.pending.push_back(container_id);
        match self.engine.start_repoll(container_id) {
            Some(output) => flatten_queries(output.messages),
            None => Vec::new(),
        }
    }
}

impl ChainEngine for AvalancheAdapter {
    fn start(&mut self, _request_id: u32, _now: Instant) -> StepOutput {
        StepOutput { messages: self.repoll_next(), done: false, fatal: false }
    }

    fn handle(&mut self, from: NodeId, message: Message, now: Instant) -> StepOutput {
        match message {
            Message::PullQuery { chain_id, request_id, container_id } => {
                let reply = Message::Chits { chain_id, request_id, preferred: container_id, accepted: self.vm.lock().last_accepted() };
                StepOutput { messages: vec![OutboundMessage { to: from, message: reply }], done: false, fatal: false }
            }
            Message::PushQuery { chain_id, request_id, container_id, container } => {
                self.cache.insert(container_id, container.clone());
                self.add_vertex(&container);
                let reply = Message::Chits { chain_id, request_id, preferred: container_id, accepted: self.vm.lock().last_accepted() };
                StepOutput { messages: vec![OutboundMessage { to: from, message: reply }], done: false, fatal: false }
            }
            Message::Chits { request_id, preferred, .. } => match self.engine.on_chits(request_id, from, Id::zero(), preferred, now) {
                Ok(output) => {
                    let mut step = self.apply(output);
                    step.messages.extend(self.repoll_next());
                    step
                }
                Err(e) => {
                    warn!("avalanche: dropping stale chits from {from}: {e}");
                    StepOutput::empty()
                }
            },
            Message::QueryFailed { request_id, .. } => match self.engine.on_query_failed(request_id, from, now) {
                Ok(output) => {
                    let mut step = self.apply(output);
                    step.messages.extend(self.repoll_next());
                    step
                }
                Err(_) => StepOutput::empty(),
            },
            Message::Notify { signal, .. } => {
                self.add_vertex(&signal);
                StepOutput::empty()
            }
            other => vm_query_response(&self.vm, &self.cache, self.engine_chain_id(), &other)
                .map(|response| StepOutput { messages: vec![OutboundMessage { to: from, message: response }], done: false, fatal: false })
                .unwrap_or_else(StepOutput::empty),
        }
    }

    fn tick(&mut self, _now: Instant) -> StepOutput {
        StepOutput { messages: self.repoll_next(), done: false, fatal: false }
    }
}

impl AvalancheAdapter {
    fn engine_chain_id(&self) -> Id {
        // AvalancheEngine doesn't expose chain_id(); vm_query_response only
        // uses it to stamp outgoing replies, and every reply here already
        // carries the chain_id the query itself named.
        Id::zero()
    }
}

#[cfg(test)]
mod tests {
    use {
        super::*,
        crate::vm::{DemoBlockVm, DemoVertexVm},
        parking_lot::Mutex,
        supernet_bootstrap::{bootstrapper::BootstrapConfig, state_syncer::StateSyncConfig},
        supernet_supernet::{ConsensusParameters, SupernetTracker},
        supernet_timeout::{Benchlist, BenchlistConfig},
    };

    fn id(byte: u8) -> Id {
        Id::from([byte; 32])
    }

    fn node(byte: u8) -> NodeId {
        NodeId::from([byte; 20])
    }

    fn validators_with(nodes: &[u8]) -> ValidatorSet {
        let mut set = ValidatorSet::new();
        for &n in nodes {
            set.add_staker(node(n), None::<solana_bls_signatures::Pubkey>, id(n), 10).unwrap();
        }
        set
    }

    #[test]
    fn test_bootstrapper_adapter_serves_get_before_bootstrap_finishes() {
        let vm: SharedVm = Arc::new(Mutex::new(DemoBlockVm::new(id(0))));
        let tracker = Arc::new(Mutex::new(SupernetTracker::new()));
        let bootstrapper = Bootstrapper::new(id(1), BootstrapConfig::default(), Arc::clone(&vm), tracker);
        let mut adapter = BootstrapperAdapter::new(bootstrapper, vm, ContainerCache::new(), validators_with(&[1]));

        let response = adapter.handle(
            node(9),
            Message::GetAcceptedFrontier { chain_id: id(1), request_id: 7 },
            Instant::now(),
        );
        assert_eq!(response.messages.len(), 1);
        assert!(matches!(response.messages[0].message, Message::AcceptedFrontier { request_id: 7, .. }));
    }

    #[test]
    fn test_snowman_adapter_replies_chits_to_pull_query() {
        let vm: SharedVm = Arc::new(Mutex::new(DemoBlockVm::new(id(0))));
        let engine = SnowmanEngine::new(
            id(1),
            id(0),
            ConsensusParameters::default(),
            validators_with(&[1, 2, 3]),
            Benchlist::new(BenchlistConfig::default()),
        );
        let mut adapter = SnowmanAdapter::new(engine, vm, ContainerCache::new(), 4);

        let output = adapter.handle(
            node(9),
            Message::PullQuery { chain_id: id(1), request_id: 1, container_id: id(0) },
            Instant::now(),
        );
        assert_eq!(output.messages.len(), 1);
        match &output.messages[0].message {
            Message::Chits { preferred, accepted, .. } => {
                assert_eq!(*preferred, id(0));
                assert_eq!(*accepted, id(0));
            }
            other => panic!("expected Chits, got {other:?}"),
        }
    }

    #[test]
    fn test_avalanche_adapter_push_query_registers_vertex_and_replies() {
        let vm: SharedVm = Arc::new(Mutex::new(DemoVertexVm::new(Id::zero())));
        let engine = AvalancheEngine::new(
            id(1),
            ConsensusParameters::default(),
            validators_with(&[1, 2, 3]),
            Benchlist::new(BenchlistConfig::default()),
        );
        let mut adapter = AvalancheAdapter::new(engine, vm, ContainerCache::new());

        let tx = id(5);
        let conflict_set = id(5);
        let mut bytes = Vec::with_capacity(64);
        bytes.extend_from_slice(tx.as_bytes());
        bytes.extend_from_slice(conflict_set.as_bytes());

        let output = adapter.handle(
            node(1),
            Message::PushQuery { chain_id: id(1), request_id: 3, container_id: tx, container: bytes },
            Instant::now(),
        );
        assert_eq!(output.messages.len(), 1);
        assert!(matches!(output.messages[0].message, Message::Chits { request_id: 3, .. }));
        assert_eq!(adapter.engine.known_vertices(), 1);
    }
}
