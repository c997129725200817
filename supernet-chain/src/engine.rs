//! The narrow seam a handler dispatches through, independent of which
//! concrete engine (bootstrapper, state-syncer, Snowman, Avalanche) is
//! currently active on a chain.
//!
//! Grounded on `core/src/bft_adapter.rs`'s `AdapterOutput`
//! translation: the adapter there bridges one concrete BFT engine to the
//! service loop; here the same seam is widened into a trait so the handler
//! can swap engines without caring which one is live.

use {std::time::Instant, supernet_codec::{Id, Message, NodeId}};

/// A message to send to one peer, produced by stepping an engine.
#[derive(Debug, Clone)]
pub struct OutboundMessage {
    /// Recipient.
    pub to: NodeId,
    /// The message to send.
    pub message: Message,
}

/// What a chain's current engine did with one dispatched message or tick.
#[derive(Debug, Clone, Default)]
pub struct StepOutput {
    /// Messages the engine wants sent.
    pub messages: Vec<OutboundMessage>,
    /// Set once the engine has finished its job (frontier reached, summary
    /// applied, DAG linearized) and the handler should advance state.
    pub done: bool,
    /// Set if the engine hit an unrecoverable error; the handler shuts down.
    pub fatal: bool,
}

impl StepOutput {
    /// No messages, not done, not fatal.
    pub fn empty() -> Self {
        Self::default()
    }
}

/// One of the four engines a chain runs over its lifetime, uniformly
/// steppable by the handler.
pub trait ChainEngine: Send {
    /// Begin this engine's work for the given request id.
    fn start(&mut self, request_id: u32, now: Instant) -> StepOutput;

    /// Handle one dispatched message.
    fn handle(&mut self, from: NodeId, message: Message, now: Instant) -> StepOutput;

    /// Handle a time-driven tick (repoll, retry sweep, liveness check).
    fn tick(&mut self, now: Instant) -> StepOutput;
}

/// The narrow interface the core uses from a chain's virtual machine,
/// treating per-chain VMs as opaque block/vertex producers. The VM itself —
/// parsing rules, execution, state trie — is entirely out of scope; this is
/// just enough surface for the bootstrapper and consensus adapters to
/// identify containers and ask the VM to commit a decision.
pub trait ChainVm: Send + Sync {
    /// Parse a wire-format container into its id and parent id, or `None`
    /// if malformed. The VM is the only thing that understands container
    /// bytes; the engines never interpret them directly.
    fn parse(&self, bytes: &[u8]) -> Option<(Id, Id)>;

    /// The serialized bytes of a container this node has, if any.
    fn bytes_of(&self, id: Id) -> Option<Vec<u8>>;

    /// Commit `id` as accepted. Never called for an id the VM hasn't seen
    /// via [`Self::parse`] or [`Self::bytes_of`].
    fn accept(&mut self, id: Id);

    /// Commit `id` as rejected (a losing sibling, or dropped by a liveness
    /// safety valve).
    fn reject(&mut self, id: Id);

    /// The VM's current last-accepted container.
    fn last_accepted(&self) -> Id;

    /// Apply a state summary fetched during state-sync. `true` if the VM
    /// accepted it; `false` triggers fallback to full bootstrap.
    fn apply_state_summary(&mut self, bytes: &[u8]) -> bool;
}
