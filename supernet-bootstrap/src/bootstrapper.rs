//! The bootstrapper: fetches a chain's accepted frontier and its ancestor
//! chain from a sample of beacons, then hands each discovered container to
//! the VM in dependency order.
//!
//! Grounded on `consensus-net/src/sync.rs`'s `BlockSyncer`: a sampled set of
//! peers, a frontier request round, then batched ancestor fetches driving a
//! "jobs with missing" queue — generalized here to the opaque
//! [`supernet_chain::engine::ChainVm`] seam instead of a concrete VM type.

use {
    crate::error::{BootstrapError, Result},
    std::{
        collections::{HashMap, HashSet},
        sync::Arc,
    },
    supernet_chain::engine::ChainVm,
    supernet_codec::{Id, Message, NodeId},
    supernet_supernet::SupernetTracker,
    supernet_validators::ValidatorSet,
};

/// A VM shared between the bootstrapper and whichever engine runs after it;
/// ownership moves through the engine stack via this handle rather than the
/// VM being cloned or rebuilt.
pub type SharedVm = Arc<parking_lot::Mutex<dyn ChainVm>>;

/// Tuning for one bootstrapper instance.
#[derive(Debug, Clone, Copy)]
pub struct BootstrapConfig {
    /// Number of beacons sampled for the frontier round.
    pub sample_k: u32,
    /// Containers requested per `GetAncestors` round-trip
    /// (`AncestorsMaxContainersReceived`).
    pub ancestors_batch_size: u32,
    /// Bounded retries per failed request before giving up on a beacon.
    pub max_retries: u32,
}

impl Default for BootstrapConfig {
    fn default() -> Self {
        Self { sample_k: 5, ancestors_batch_size: 64, max_retries: 3 }
    }
}

/// The bootstrapper's current stage: idle, fetching frontiers, fetching
/// ancestors, executing, then done.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BootstrapStage {
    /// Not yet started.
    Idle,
    /// Frontier requests outstanding.
    FetchingFrontiers,
    /// Ancestor requests outstanding for discovered frontier items.
    FetchingAncestors,
    /// Every discovered container has been handed to the VM.
    Executing,
    /// Finished; the supernet tracker has been notified.
    Done,
}

/// One message the engine wants sent to a single beacon.
#[derive(Debug, Clone, PartialEq)]
pub struct OutboundRequest {
    /// Recipient beacon.
    pub to: NodeId,
    /// The request itself.
    pub message: Message,
}

/// What driving the bootstrapper produced.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct BootstrapOutput {
    /// Requests the router should dispatch.
    pub requests: Vec<OutboundRequest>,
    /// Fraction of discovered containers executed so far, in `[0.0, 1.0]`.
    pub progress: f64,
    /// `true` once the bootstrapper has reached [`BootstrapStage::Done`].
    pub done: bool,
}

impl BootstrapOutput {
    fn empty(progress: f64) -> Self {
        Self { requests: Vec::new(), progress, done: false }
    }
}

enum Pending {
    Frontier { beacon: NodeId },
    Ancestors { beacon: NodeId, container_id: Id },
}

/// Drives frontier/ancestor fetching for one chain.
pub struct Bootstrapper {
    chain_id: Id,
    config: BootstrapConfig,
    vm: SharedVm,
    tracker: Arc<parking_lot::Mutex<SupernetTracker>>,
    stage: BootstrapStage,
    beacons: Vec<NodeId>,
    pending: HashMap<u32, Pending>,
    next_request_id: u32,
    frontier_responses: HashSet<NodeId>,
    frontier_ids: HashSet<Id>,
    frontier_retries: u32,
    jobs: HashMap<Id, Id>,
    executed: HashSet<Id>,
    ancestor_retries: HashMap<Id, u32>,
    round_robin: usize,
}

impl Bootstrapper {
    /// A fresh, unstarted bootstrapper for `chain_id`.
    pub fn new(chain_id: Id, config: BootstrapConfig, vm: SharedVm, tracker: Arc<parking_lot::Mutex<SupernetTracker>>) -> Self {
        Self {
            chain_id,
            config,
            vm,
            tracker,
            stage: BootstrapStage::Idle,
            beacons: Vec::new(),
            pending: HashMap::new(),
            next_request_id: 0,
            frontier_responses: HashSet::new(),
            frontier_ids: HashSet::new(),
            frontier_retries: 0,
            jobs: HashMap::new(),
            executed: HashSet::new(),
            ancestor_retries: HashMap::new(),
            round_robin: 0,
        }
    }

    /// The chain this bootstrapper is fetching.
    pub fn chain_id(&self) -> Id {
        self.chain_id
    }

    /// The current stage.
    pub fn stage(&self) -> BootstrapStage {
        self.stage
    }

    fn next_request_id(&mut self) -> u32 {
        let id = self.next_request_id;
        self.next_request_id = self.next_request_id.wrapping_add(1);
        id
    }

    fn pick_beacon(&mut self) -> Option<NodeId> {
        if self.beacons.is_empty() {
            return None;
        }
        let beacon = self.beacons[self.round_robin % self.beacons.len()];
        self.round_robin = self.round_robin.wrapping_add(1);
        Some(beacon)
    }

    /// Sample `config.sample_k` beacons from `validators` and send the
    /// frontier request round.
    pub fn start(&mut self, validators: &ValidatorSet, seed: u64) -> Result<BootstrapOutput> {
        let sampled = validators.sample(self.config.sample_k as usize, seed);
        let unique: HashSet<NodeId> = sampled.into_iter().collect();
        if unique.is_empty() {
            return Err(BootstrapError::NoBeacons);
        }
        self.beacons = unique.into_iter().collect();
        self.beacons.sort();
        self.stage = BootstrapStage::FetchingFrontiers;

        let mut requests = Vec::with_capacity(self.beacons.len());
        for beacon in self.beacons.clone() {
            let request_id = self.next_request_id();
            self.pending.insert(request_id, Pending::Frontier { beacon });
            requests.push(OutboundRequest {
                to: beacon,
                message: Message::GetAcceptedFrontier { chain_id: self.chain_id, request_id },
            });
        }
        Ok(BootstrapOutput { requests, progress: 0.0, done: false })
    }

    /// A beacon's accepted frontier arrived.
    pub fn on_accepted_frontier(&mut self, request_id: u32, from: NodeId, container_ids: Vec<Id>) -> BootstrapOutput {
        match self.pending.get(&request_id) {
            Some(Pending::Frontier { beacon }) if *beacon == from => {
                self.pending.remove(&request_id);
            }
            _ => return BootstrapOutput::empty(self.progress()),
        }
        self.frontier_responses.insert(from);
        self.frontier_ids.extend(container_ids);
        self.maybe_advance_past_frontiers()
    }

    /// A frontier request timed out or the beacon disconnected.
    pub fn on_accepted_frontier_failed(&mut self, request_id: u32, from: NodeId, seed: u64, validators: &ValidatorSet) -> BootstrapOutput {
        let matched = matches!(self.pending.get(&request_id), Some(Pending::Frontier { beacon }) if *beacon == from);
        if !matched {
            return BootstrapOutput::empty(self.progress());
        }
        self.pending.remove(&request_id);
        self.frontier_retries = self.frontier_retries.saturating_add(1);

        if self.frontier_retries > self.config.max_retries {
            // Give up on this beacon; count it as responded so the round
            // can still close.
            self.frontier_responses.insert(from);
            return self.maybe_advance_past_frontiers();
        }

        // Re-sample a single replacement beacon and retry against it.
        let replacement = validators.sample(1, seed).into_iter().next();
        let Some(replacement) = replacement else {
            self.frontier_responses.insert(from);
            return self.maybe_advance_past_frontiers();
        };
        if !self.beacons.contains(&replacement) {
            self.beacons.push(replacement);
        }
        let request_id = self.next_request_id();
        self.pending.insert(request_id, Pending::Frontier { beacon: replacement });
        BootstrapOutput {
            requests: vec![OutboundRequest {
                to: replacement,
                message: Message::GetAcceptedFrontier { chain_id: self.chain_id, request_id },
            }],
            progress: self.progress(),
            done: false,
        }
    }

    fn maybe_advance_past_frontiers(&mut self) -> BootstrapOutput {
        if self.frontier_responses.len() < self.beacons.len() {
            return BootstrapOutput::empty(self.progress());
        }
        self.stage = BootstrapStage::FetchingAncestors;

        let to_fetch: Vec<Id> = self
            .frontier_ids
            .iter()
            .copied()
            .filter(|id| !self.executed.contains(id) && !self.jobs.contains_key(id))
            .filter(|id| self.vm.lock().bytes_of(*id).is_none())
            .collect();

        if to_fetch.is_empty() {
            return self.finish_if_ready();
        }

        let mut requests = Vec::with_capacity(to_fetch.len());
        for container_id in to_fetch {
            if let Some(beacon) = self.pick_beacon() {
                let request_id = self.next_request_id();
                self.pending.insert(request_id, Pending::Ancestors { beacon, container_id });
                requests.push(OutboundRequest {
                    to: beacon,
                    message: Message::GetAncestors { chain_id: self.chain_id, request_id, container_id },
                });
            }
        }
        BootstrapOutput { requests, progress: self.progress(), done: false }
    }

    /// A batch of serialized ancestors arrived, nearest-first.
    pub fn on_ancestors(&mut self, request_id: u32, from: NodeId, containers: Vec<Vec<u8>>) -> BootstrapOutput {
        let matched = matches!(self.pending.get(&request_id), Some(Pending::Ancestors { beacon, .. }) if *beacon == from);
        if !matched {
            return BootstrapOutput::empty(self.progress());
        }
        self.pending.remove(&request_id);

        let mut missing_parents = Vec::new();
        {
            let mut vm = self.vm.lock();
            for bytes in containers.into_iter().take(self.config.ancestors_batch_size as usize) {
                let Some((id, parent)) = vm.parse(&bytes) else {
                    continue;
                };
                if self.executed.contains(&id) || vm.bytes_of(id).is_some() {
                    continue;
                }
                self.jobs.insert(id, parent);
                if vm.bytes_of(parent).is_none() && parent != vm.last_accepted() && !self.jobs.contains_key(&parent) {
                    missing_parents.push(parent);
                }
            }
        }
        self.execute_ready();

        let mut requests = Vec::new();
        for parent in missing_parents {
            let retries = self.ancestor_retries.entry(parent).or_insert(0);
            if *retries > self.config.max_retries {
                continue;
            }
            *retries += 1;
            if let Some(beacon) = self.pick_beacon() {
                let request_id = self.next_request_id();
                self.pending.insert(request_id, Pending::Ancestors { beacon, container_id: parent });
                requests.push(OutboundRequest {
                    to: beacon,
                    message: Message::GetAncestors { chain_id: self.chain_id, request_id, container_id: parent },
                });
            }
        }

        if requests.is_empty() && self.jobs.is_empty() {
            return self.finish_if_ready();
        }
        BootstrapOutput { requests, progress: self.progress(), done: false }
    }

    /// An ancestors request timed out or the beacon disconnected.
    pub fn on_ancestors_failed(&mut self, request_id: u32) -> BootstrapOutput {
        let Some(Pending::Ancestors { container_id, .. }) = self.pending.remove(&request_id) else {
            return BootstrapOutput::empty(self.progress());
        };
        let retries = self.ancestor_retries.entry(container_id).or_insert(0);
        *retries += 1;
        if *retries > self.config.max_retries {
            return BootstrapOutput::empty(self.progress());
        }
        let Some(beacon) = self.pick_beacon() else {
            return BootstrapOutput::empty(self.progress());
        };
        let request_id = self.next_request_id();
        self.pending.insert(request_id, Pending::Ancestors { beacon, container_id });
        BootstrapOutput {
            requests: vec![OutboundRequest {
                to: beacon,
                message: Message::GetAncestors { chain_id: self.chain_id, request_id, container_id },
            }],
            progress: self.progress(),
            done: false,
        }
    }

    /// Repeatedly accept any job whose parent is already known to the VM,
    /// until no more become resolvable.
    fn execute_ready(&mut self) {
        let mut vm = self.vm.lock();
        loop {
            let ready: Vec<Id> = self
                .jobs
                .iter()
                .filter(|(_, parent)| **parent == vm.last_accepted() || vm.bytes_of(**parent).is_some())
                .map(|(id, _)| *id)
                .collect();
            if ready.is_empty() {
                break;
            }
            for id in ready {
                vm.accept(id);
                self.jobs.remove(&id);
                self.executed.insert(id);
            }
        }
    }

    fn finish_if_ready(&mut self) -> BootstrapOutput {
        if !self.jobs.is_empty() || self.pending.values().any(|p| matches!(p, Pending::Ancestors { .. })) {
            return BootstrapOutput::empty(self.progress());
        }
        self.stage = BootstrapStage::Done;
        self.tracker.lock().bootstrapped(self.chain_id);
        BootstrapOutput { requests: Vec::new(), progress: 1.0, done: true }
    }

    fn progress(&self) -> f64 {
        let total = self.executed.len() + self.jobs.len();
        if total == 0 {
            return if self.stage == BootstrapStage::Done { 1.0 } else { 0.0 };
        }
        self.executed.len() as f64 / total as f64
    }
}
