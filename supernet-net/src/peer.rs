//! Per-peer connection state machine and the node-wide peer table.
//!
//! Grounded on a `PeerConnection`/`PeerManager` pair: per-peer latency EWMA
//! and message counters, generalized with a `Dialing → ... → Closed` state
//! machine.

use {
    crate::outbound_queue::QueueHandle,
    std::{
        collections::HashMap,
        net::SocketAddr,
        time::Instant,
    },
    supernet_codec::NodeId,
};

/// Connection lifecycle state for one peer. Only `Connected` peers are
/// visible to the chain router.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PeerState {
    /// Outbound dial in progress.
    Dialing,
    /// TLS upgrade in progress.
    HandshakingTls,
    /// Post-TLS protocol (`Version`) handshake in progress.
    HandshakingProto,
    /// Handshake complete; visible to the router.
    Connected,
    /// Shutdown initiated; draining outbound queue.
    Closing,
    /// Fully torn down.
    Closed,
}

impl PeerState {
    /// `true` for `Connected`, the only state the router sees.
    pub fn is_connected(self) -> bool {
        matches!(self, PeerState::Connected)
    }
}

/// Per-peer bookkeeping: identity, address, state, and liveness metadata.
#[derive(Debug)]
pub struct PeerConnection {
    /// The peer's node id, known once the handshake completes.
    pub node_id: NodeId,
    /// The peer's observed network address.
    pub addr: SocketAddr,
    /// Current lifecycle state.
    pub state: PeerState,
    /// Wall-clock time of the last message received from this peer.
    pub last_seen: Instant,
    /// Messages sent to this peer.
    pub messages_sent: u64,
    /// Messages received from this peer.
    pub messages_received: u64,
    /// Exponentially-weighted moving average of round-trip latency (ms),
    /// fed by ping/pong round trips.
    pub latency_ms: f64,
    /// Whether this node is a validator (used by admission throttles and
    /// gossip eligibility).
    pub is_validator: bool,
    /// Handle to push outbound messages to this peer's send queue.
    pub queue: QueueHandle,
}

impl PeerConnection {
    /// A freshly dialed or accepted connection, not yet handshaked.
    pub fn new(node_id: NodeId, addr: SocketAddr, is_validator: bool, queue: QueueHandle, now: Instant) -> Self {
        Self {
            node_id,
            addr,
            state: PeerState::Dialing,
            last_seen: now,
            messages_sent: 0,
            messages_received: 0,
            latency_ms: 0.0,
            is_validator,
            queue,
        }
    }

    /// Record a received message, bumping `last_seen`.
    pub fn record_received(&mut self, now: Instant) {
        self.messages_received = self.messages_received.saturating_add(1);
        self.last_seen = now;
    }

    /// Record a sent message.
    pub fn record_sent(&mut self) {
        self.messages_sent = self.messages_sent.saturating_add(1);
    }

    /// Fold a ping/pong round-trip sample into the latency EWMA.
    pub fn observe_latency(&mut self, sample_ms: f64) {
        const ALPHA: f64 = 0.3;
        if self.latency_ms == 0.0 {
            self.latency_ms = sample_ms;
        } else {
            self.latency_ms = ALPHA * sample_ms + (1.0 - ALPHA) * self.latency_ms;
        }
    }

    /// Seconds since the last message was received from this peer.
    pub fn silence_secs(&self, now: Instant) -> u64 {
        now.saturating_duration_since(self.last_seen).as_secs()
    }
}

/// Node-wide table of peer connections, the transport layer's equivalent of
/// a validator set index: one entry per known peer, keyed by node id.
#[derive(Debug, Default)]
pub struct PeerTable {
    peers: HashMap<NodeId, PeerConnection>,
}

impl PeerTable {
    /// An empty table.
    pub fn new() -> Self {
        Self::default()
    }

    /// Insert or replace a peer's entry.
    pub fn insert(&mut self, peer: PeerConnection) {
        self.peers.insert(peer.node_id, peer);
    }

    /// Remove a peer entirely.
    pub fn remove(&mut self, node_id: &NodeId) -> Option<PeerConnection> {
        self.peers.remove(node_id)
    }

    /// Borrow a peer's state.
    pub fn get(&self, node_id: &NodeId) -> Option<&PeerConnection> {
        self.peers.get(node_id)
    }

    /// Mutably borrow a peer's state.
    pub fn get_mut(&mut self, node_id: &NodeId) -> Option<&mut PeerConnection> {
        self.peers.get_mut(node_id)
    }

    /// Node ids of every peer currently in the `Connected` state.
    pub fn connected_node_ids(&self) -> Vec<NodeId> {
        self.peers
            .values()
            .filter(|p| p.state.is_connected())
            .map(|p| p.node_id)
            .collect()
    }

    /// Total tracked peers, regardless of state.
    pub fn len(&self) -> usize {
        self.peers.len()
    }

    /// `true` iff no peers are tracked.
    pub fn is_empty(&self) -> bool {
        self.peers.is_empty()
    }

    /// Transition every stale connected peer (silent longer than `timeout`)
    /// to `Closing`, returning their node ids.
    pub fn evict_stale(&mut self, timeout: std::time::Duration, now: Instant) -> Vec<NodeId> {
        let stale: Vec<NodeId> = self
            .peers
            .values()
            .filter(|p| p.state.is_connected() && p.silence_secs(now) > timeout.as_secs())
            .map(|p| p.node_id)
            .collect();
        for node_id in &stale {
            if let Some(peer) = self.peers.get_mut(node_id) {
                peer.state = PeerState::Closing;
            }
        }
        stale
    }
}
