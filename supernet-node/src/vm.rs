//! An in-memory demo virtual machine: a linear block store for Snowman
//! chains or a vertex/transaction store for Avalanche chains, wired through
//! [`ChainVm`] the same way a real execution engine would be.
//!
//! Grounded on the `FakeVm`/`AcceptingVm` test fixtures in
//! `supernet-bootstrap` (64-byte `id || parent` container encoding); this is
//! that fixture generalized into something the node binary can actually run
//! against when no external VM is configured.

use {
    std::collections::HashMap,
    supernet_chain::engine::ChainVm,
    supernet_codec::Id,
};

/// A single block: 32 bytes of id, 32 of parent, back to back.
fn encode_block(id: Id, parent: Id) -> Vec<u8> {
    let mut bytes = Vec::with_capacity(64);
    bytes.extend_from_slice(id.as_bytes());
    bytes.extend_from_slice(parent.as_bytes());
    bytes
}

fn decode_block(bytes: &[u8]) -> Option<(Id, Id)> {
    if bytes.len() != 64 {
        return None;
    }
    let id = Id::from(<[u8; 32]>::try_from(&bytes[0..32]).ok()?);
    let parent = Id::from(<[u8; 32]>::try_from(&bytes[32..64]).ok()?);
    Some((id, parent))
}

/// A trivial linear-chain VM: every block has exactly one parent, and
/// `accept` just advances the tip. State summaries are the tip id itself.
pub struct DemoBlockVm {
    blocks: HashMap<Id, Vec<u8>>,
    last_accepted: Id,
    next_seq: u64,
}

impl DemoBlockVm {
    /// A fresh VM rooted at `genesis`, with no blocks beyond it.
    pub fn new(genesis: Id) -> Self {
        Self { blocks: HashMap::new(), last_accepted: genesis, next_seq: 0 }
    }

    /// Produce and register a new block building on the current tip,
    /// returning its id and encoded bytes. Does not accept it — a
    /// consensus engine must decide that.
    pub fn produce(&mut self) -> (Id, Vec<u8>) {
        self.next_seq += 1;
        let mut seed = [0u8; 32];
        seed[0..8].copy_from_slice(&self.next_seq.to_be_bytes());
        seed[8..16].copy_from_slice(self.last_accepted.as_bytes()[0..8].try_into().unwrap());
        let id = Id::from(seed);
        let bytes = encode_block(id, self.last_accepted);
        self.blocks.insert(id, bytes.clone());
        (id, bytes)
    }
}

impl ChainVm for DemoBlockVm {
    fn parse(&self, bytes: &[u8]) -> Option<(Id, Id)> {
        decode_block(bytes)
    }

    fn bytes_of(&self, id: Id) -> Option<Vec<u8>> {
        self.blocks.get(&id).cloned()
    }

    fn accept(&mut self, id: Id) {
        self.last_accepted = id;
    }

    fn reject(&mut self, _id: Id) {}

    fn last_accepted(&self) -> Id {
        self.last_accepted
    }

    fn apply_state_summary(&mut self, bytes: &[u8]) -> bool {
        let Some(id) = Id::from_slice(bytes).ok() else {
            return false;
        };
        self.blocks.entry(id).or_insert_with(|| encode_block(id, self.last_accepted));
        self.last_accepted = id;
        true
    }
}

/// A demo DAG VM: transactions carry no dependency graph of their own, just
/// a conflict-set key, so the same 32-byte encoding works for both the
/// vertex id and its (only) field of interest.
pub struct DemoVertexVm {
    known: HashMap<Id, Vec<u8>>,
    last_accepted: Id,
}

impl DemoVertexVm {
    /// A fresh VM with nothing accepted beyond `genesis`.
    pub fn new(genesis: Id) -> Self {
        Self { known: HashMap::new(), last_accepted: genesis }
    }

    /// Register a transaction's bytes so it can later be looked up by id.
    pub fn register(&mut self, id: Id, bytes: Vec<u8>) {
        self.known.insert(id, bytes);
    }
}

impl ChainVm for DemoVertexVm {
    fn parse(&self, bytes: &[u8]) -> Option<(Id, Id)> {
        decode_block(bytes)
    }

    fn bytes_of(&self, id: Id) -> Option<Vec<u8>> {
        self.known.get(&id).cloned()
    }

    fn accept(&mut self, id: Id) {
        self.last_accepted = id;
    }

    fn reject(&mut self, _id: Id) {}

    fn last_accepted(&self) -> Id {
        self.last_accepted
    }

    fn apply_state_summary(&mut self, bytes: &[u8]) -> bool {
        let Some(id) = Id::from_slice(bytes).ok() else {
            return false;
        };
        self.last_accepted = id;
        true
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_produce_then_accept_advances_tip() {
        let mut vm = DemoBlockVm::new(Id::zero());
        let (id, bytes) = vm.produce();
        assert_eq!(vm.parse(&bytes), Some((id, Id::zero())));
        vm.accept(id);
        assert_eq!(vm.last_accepted(), id);
    }

    #[test]
    fn test_apply_state_summary_sets_tip() {
        let mut vm = DemoBlockVm::new(Id::zero());
        let summary_id = Id::from([7u8; 32]);
        assert!(vm.apply_state_summary(summary_id.as_bytes()));
        assert_eq!(vm.last_accepted(), summary_id);
    }

    #[test]
    fn test_vertex_vm_round_trips_registered_bytes() {
        let mut vm = DemoVertexVm::new(Id::zero());
        let id = Id::from([3u8; 32]);
        let bytes = encode_block(id, Id::zero());
        vm.register(id, bytes.clone());
        assert_eq!(vm.bytes_of(id), Some(bytes));
    }
}
