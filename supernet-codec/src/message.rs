//! The top-level wire message enum and its request/response bodies.
//!
//! Every frame on the network carries exactly one [`Message`], bincode
//! encoded. Message groups follow the external-interface contract: handshake,
//! consensus queries, bootstrap, state sync, and application messages all
//! travel on the wire; the `*_Failed` variants and the two VM/engine signals
//! are synthesized locally by the router for uniform handling and never
//! appear on the wire.

use {
    crate::ids::{Id, NodeId},
    serde::{Deserialize, Serialize},
    std::net::IpAddr,
};

/// A peer's self-reported, doubly-signed network location.
///
/// Signed once under the peer's TLS key and once under its BLS key; both
/// signatures cover exactly `(ip, port, timestamp)`.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct SignedPeerIp {
    /// The node advertising this address.
    pub node_id: NodeId,
    /// Claimed IP address.
    pub ip: IpAddr,
    /// Claimed port.
    pub port: u16,
    /// Monotonic timestamp for this claim: bumping the IP bumps the
    /// timestamp to `max(prev + 1, now)`.
    pub timestamp: u64,
    /// Signature under the node's TLS identity key.
    pub tls_signature: Vec<u8>,
    /// Signature under the node's BLS identity key.
    pub bls_signature: Vec<u8>,
}

/// Reason an internally synthesized `*_Failed` message was generated.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
pub enum AppError {
    /// No response arrived before the adaptive timeout elapsed.
    Timeout,
    /// The local node is benched against, or by, the peer.
    Benched,
    /// The peer disconnected before responding.
    PeerDisconnected,
    /// The chain this request targeted is not registered locally.
    UnknownChain,
}

/// Reason a bootstrap request could not be satisfied, carried on the
/// internally synthesized bootstrap failure variants.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
pub enum BootstrapFailure {
    /// No peer responded before the timeout.
    Timeout,
    /// Every sampled peer returned an empty or invalid response.
    NoUsablePeers,
}

/// Human-readable tag for a message, used in logs and metrics labels.
pub type MessageKind = &'static str;

/// Top-level wire message.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub enum Message {
    // ---- Handshake ----------------------------------------------------
    /// First message on a new connection: identity, network id, and the
    /// doubly-signed IP claim.
    Version {
        /// Identifier of the network (primary supernet) this node belongs to.
        network_id: u32,
        /// Semantic node software version, e.g. `(major, minor, patch)`.
        node_version: (u16, u16, u16),
        /// Current wall-clock time, milliseconds since epoch.
        timestamp: u64,
        /// This node's own signed address claim.
        my_ip: SignedPeerIp,
        /// Observed uptime percentage on the primary supernet, if tracked.
        uptime_pct: Option<u8>,
    },
    /// A batch of signed peer addresses, gossiped periodically.
    PeerList {
        /// The gossiped peers.
        peers: Vec<SignedPeerIp>,
    },
    /// Acknowledges receipt of a `PeerList`.
    PeerListAck,
    /// Liveness probe.
    Ping {
        /// Observed uptime percentage on the primary supernet.
        uptime_pct: u8,
    },
    /// Response to `Ping`.
    Pong {
        /// Observed uptime percentage on the primary supernet.
        uptime_pct: u8,
    },

    // ---- Consensus queries ---------------------------------------------
    /// Ask the peer to vote its preference among a set rooted at `container_id`,
    /// without attaching the container bytes (peer is assumed to already have it).
    PullQuery {
        /// Target chain.
        chain_id: Id,
        /// Correlates the eventual `Chits`/`QueryFailed` reply.
        request_id: u32,
        /// The item being queried.
        container_id: Id,
    },
    /// Same as `PullQuery` but attaches the container bytes, for items the
    /// peer may not have seen yet.
    PushQuery {
        /// Target chain.
        chain_id: Id,
        /// Correlates the eventual `Chits`/`QueryFailed` reply.
        request_id: u32,
        /// The item being queried.
        container_id: Id,
        /// Serialized container bytes.
        container: Vec<u8>,
    },
    /// A peer's consensus vote in response to a query.
    Chits {
        /// Target chain.
        chain_id: Id,
        /// Echoes the query's `request_id`.
        request_id: u32,
        /// The peer's current preferred item.
        preferred: Id,
        /// The peer's current accepted item, if finalized.
        accepted: Id,
    },
    /// Internal: synthesized when a query times out or cannot be delivered.
    QueryFailed {
        /// Target chain.
        chain_id: Id,
        /// Echoes the query's `request_id`.
        request_id: u32,
        /// Why the query failed.
        reason: AppError,
    },

    // ---- Bootstrap -------------------------------------------------------
    /// Ask for the peer's current frontier (accepted tips) on a chain.
    GetAcceptedFrontier {
        /// Target chain.
        chain_id: Id,
        /// Correlates the reply.
        request_id: u32,
    },
    /// Reply carrying the peer's frontier.
    AcceptedFrontier {
        /// Target chain.
        chain_id: Id,
        /// Echoes the request.
        request_id: u32,
        /// Frontier items.
        container_ids: Vec<Id>,
    },
    /// Internal: synthesized on `GetAcceptedFrontier` timeout.
    GetAcceptedFrontierFailed {
        /// Target chain.
        chain_id: Id,
        /// Echoes the request.
        request_id: u32,
    },
    /// Ask the peer which of a candidate set it has accepted.
    GetAccepted {
        /// Target chain.
        chain_id: Id,
        /// Correlates the reply.
        request_id: u32,
        /// Candidate items.
        container_ids: Vec<Id>,
    },
    /// Reply: the subset of the candidate set the peer has accepted.
    Accepted {
        /// Target chain.
        chain_id: Id,
        /// Echoes the request.
        request_id: u32,
        /// Accepted subset.
        container_ids: Vec<Id>,
    },
    /// Internal: synthesized on `GetAccepted` timeout.
    GetAcceptedFailed {
        /// Target chain.
        chain_id: Id,
        /// Echoes the request.
        request_id: u32,
    },
    /// Ask for the ancestry chain of a given item.
    GetAncestors {
        /// Target chain.
        chain_id: Id,
        /// Correlates the reply.
        request_id: u32,
        /// The item whose ancestors are requested.
        container_id: Id,
    },
    /// Reply: serialized ancestors, nearest first.
    Ancestors {
        /// Target chain.
        chain_id: Id,
        /// Echoes the request.
        request_id: u32,
        /// Serialized ancestor containers, nearest first.
        containers: Vec<Vec<u8>>,
    },
    /// Internal: synthesized on `GetAncestors` timeout.
    GetAncestorsFailed {
        /// Target chain.
        chain_id: Id,
        /// Echoes the request.
        request_id: u32,
    },
    /// Ask for a single item by id.
    Get {
        /// Target chain.
        chain_id: Id,
        /// Correlates the reply.
        request_id: u32,
        /// The item requested.
        container_id: Id,
    },
    /// Reply carrying a single requested item.
    Put {
        /// Target chain.
        chain_id: Id,
        /// Echoes the request, or `0` when unsolicited (gossip).
        request_id: u32,
        /// The item requested.
        container_id: Id,
        /// Serialized container bytes.
        container: Vec<u8>,
    },
    /// Internal: synthesized on `Get` timeout.
    GetFailed {
        /// Target chain.
        chain_id: Id,
        /// Echoes the request.
        request_id: u32,
    },

    // ---- State sync --------------------------------------------------
    /// Ask for the peer's current state-summary frontier.
    GetStateSummaryFrontier {
        /// Target chain.
        chain_id: Id,
        /// Correlates the reply.
        request_id: u32,
    },
    /// Reply carrying a serialized state summary.
    StateSummaryFrontier {
        /// Target chain.
        chain_id: Id,
        /// Echoes the request.
        request_id: u32,
        /// Serialized summary bytes.
        summary: Vec<u8>,
    },
    /// Internal: synthesized on `GetStateSummaryFrontier` timeout.
    GetStateSummaryFrontierFailed {
        /// Target chain.
        chain_id: Id,
        /// Echoes the request.
        request_id: u32,
    },
    /// Ask whether the peer has accepted a candidate set of state summaries.
    GetAcceptedStateSummary {
        /// Target chain.
        chain_id: Id,
        /// Correlates the reply.
        request_id: u32,
        /// Candidate summary heights.
        heights: Vec<u64>,
    },
    /// Reply: summary ids accepted at the requested heights.
    AcceptedStateSummary {
        /// Target chain.
        chain_id: Id,
        /// Echoes the request.
        request_id: u32,
        /// Accepted summary ids, one per requested height that was known.
        summary_ids: Vec<Id>,
    },
    /// Internal: synthesized on `GetAcceptedStateSummary` timeout.
    GetAcceptedStateSummaryFailed {
        /// Target chain.
        chain_id: Id,
        /// Echoes the request.
        request_id: u32,
    },

    // ---- Application -------------------------------------------------
    /// Opaque request routed to a chain's VM.
    AppRequest {
        /// Target chain.
        chain_id: Id,
        /// Correlates the reply.
        request_id: u32,
        /// Opaque application payload.
        payload: Vec<u8>,
    },
    /// Opaque reply from a chain's VM.
    AppResponse {
        /// Target chain.
        chain_id: Id,
        /// Echoes the request.
        request_id: u32,
        /// Opaque application payload.
        payload: Vec<u8>,
    },
    /// Internal: synthesized on `AppRequest` timeout.
    AppRequestFailed {
        /// Target chain.
        chain_id: Id,
        /// Echoes the request.
        request_id: u32,
    },
    /// Unsolicited opaque gossip routed to a chain's VM.
    AppGossip {
        /// Target chain.
        chain_id: Id,
        /// Opaque application payload.
        payload: Vec<u8>,
    },
    /// Opaque request from one local chain's VM to a peer's different chain.
    CrossChainAppRequest {
        /// Chain the request originates from, on the sending node.
        source_chain_id: Id,
        /// Chain the request targets, on the receiving node.
        dest_chain_id: Id,
        /// Correlates the reply.
        request_id: u32,
        /// Opaque application payload.
        payload: Vec<u8>,
    },
    /// Reply to a `CrossChainAppRequest`.
    CrossChainAppResponse {
        /// Chain the response targets, on the original sender.
        source_chain_id: Id,
        /// Chain the response originates from.
        dest_chain_id: Id,
        /// Echoes the request.
        request_id: u32,
        /// Opaque application payload.
        payload: Vec<u8>,
    },
    /// Internal: synthesized on `CrossChainAppRequest` timeout.
    CrossChainAppRequestFailed {
        /// Chain the request originated from.
        source_chain_id: Id,
        /// Chain the request targeted.
        dest_chain_id: Id,
        /// Echoes the request.
        request_id: u32,
    },

    // ---- Internal only (never on the wire) ---------------------------
    /// Synthesized locally once a supernet finishes bootstrapping and a peer
    /// is already connected on it, so chain handlers can start without
    /// re-handshaking.
    ConnectedSupernet {
        /// The supernet that finished bootstrapping.
        supernet_id: Id,
        /// The already-connected peer.
        node_id: NodeId,
    },
    /// Synthesized locally when a peer disconnects, so every handler whose
    /// chain belongs to a supernet that peer was tracked on can drop its
    /// per-peer state uniformly, the same way it learned of the connection.
    DisconnectedSupernet {
        /// The supernet being notified.
        supernet_id: Id,
        /// The peer that disconnected.
        node_id: NodeId,
    },
    /// A signal delivered from a chain's VM to its engine (e.g. "a new item
    /// is ready to be queried"), routed through the same dispatch path as
    /// wire messages for uniform handling.
    Notify {
        /// Target chain.
        chain_id: Id,
        /// Opaque signal payload, interpreted by the engine.
        signal: Vec<u8>,
    },
}

impl Message {
    /// Serialize this message to bytes using bincode.
    pub fn serialize(&self) -> crate::Result<Vec<u8>> {
        bincode::serialize(self).map_err(crate::CodecError::Serialization)
    }

    /// Deserialize a message from bytes.
    pub fn deserialize(data: &[u8]) -> crate::Result<Self> {
        bincode::deserialize(data).map_err(crate::CodecError::Serialization)
    }

    /// Human-readable tag for logging and metrics labels.
    pub fn kind(&self) -> MessageKind {
        match self {
            Self::Version { .. } => "version",
            Self::PeerList { .. } => "peer_list",
            Self::PeerListAck => "peer_list_ack",
            Self::Ping { .. } => "ping",
            Self::Pong { .. } => "pong",
            Self::PullQuery { .. } => "pull_query",
            Self::PushQuery { .. } => "push_query",
            Self::Chits { .. } => "chits",
            Self::QueryFailed { .. } => "query_failed",
            Self::GetAcceptedFrontier { .. } => "get_accepted_frontier",
            Self::AcceptedFrontier { .. } => "accepted_frontier",
            Self::GetAcceptedFrontierFailed { .. } => "get_accepted_frontier_failed",
            Self::GetAccepted { .. } => "get_accepted",
            Self::Accepted { .. } => "accepted",
            Self::GetAcceptedFailed { .. } => "get_accepted_failed",
            Self::GetAncestors { .. } => "get_ancestors",
            Self::Ancestors { .. } => "ancestors",
            Self::GetAncestorsFailed { .. } => "get_ancestors_failed",
            Self::Get { .. } => "get",
            Self::Put { .. } => "put",
            Self::GetFailed { .. } => "get_failed",
            Self::GetStateSummaryFrontier { .. } => "get_state_summary_frontier",
            Self::StateSummaryFrontier { .. } => "state_summary_frontier",
            Self::GetStateSummaryFrontierFailed { .. } => "get_state_summary_frontier_failed",
            Self::GetAcceptedStateSummary { .. } => "get_accepted_state_summary",
            Self::AcceptedStateSummary { .. } => "accepted_state_summary",
            Self::GetAcceptedStateSummaryFailed { .. } => "get_accepted_state_summary_failed",
            Self::AppRequest { .. } => "app_request",
            Self::AppResponse { .. } => "app_response",
            Self::AppRequestFailed { .. } => "app_request_failed",
            Self::AppGossip { .. } => "app_gossip",
            Self::CrossChainAppRequest { .. } => "cross_chain_app_request",
            Self::CrossChainAppResponse { .. } => "cross_chain_app_response",
            Self::CrossChainAppRequestFailed { .. } => "cross_chain_app_request_failed",
            Self::ConnectedSupernet { .. } => "connected_supernet",
            Self::DisconnectedSupernet { .. } => "disconnected_supernet",
            Self::Notify { .. } => "notify",
        }
    }

    /// `true` for messages synthesized locally by the router that must never
    /// be sent on the wire.
    pub fn is_internal_only(&self) -> bool {
        matches!(
            self,
            Self::QueryFailed { .. }
                | Self::GetAcceptedFrontierFailed { .. }
                | Self::GetAcceptedFailed { .. }
                | Self::GetAncestorsFailed { .. }
                | Self::GetFailed { .. }
                | Self::GetStateSummaryFrontierFailed { .. }
                | Self::GetAcceptedStateSummaryFailed { .. }
                | Self::AppRequestFailed { .. }
                | Self::CrossChainAppRequestFailed { .. }
                | Self::ConnectedSupernet { .. }
                | Self::DisconnectedSupernet { .. }
                | Self::Notify { .. }
        )
    }

    /// The correlating `request_id`, for messages that carry one.
    pub fn request_id(&self) -> Option<u32> {
        match self {
            Self::PullQuery { request_id, .. }
            | Self::PushQuery { request_id, .. }
            | Self::Chits { request_id, .. }
            | Self::QueryFailed { request_id, .. }
            | Self::GetAcceptedFrontier { request_id, .. }
            | Self::AcceptedFrontier { request_id, .. }
            | Self::GetAcceptedFrontierFailed { request_id, .. }
            | Self::GetAccepted { request_id, .. }
            | Self::Accepted { request_id, .. }
            | Self::GetAcceptedFailed { request_id, .. }
            | Self::GetAncestors { request_id, .. }
            | Self::Ancestors { request_id, .. }
            | Self::GetAncestorsFailed { request_id, .. }
            | Self::Get { request_id, .. }
            | Self::Put { request_id, .. }
            | Self::GetFailed { request_id, .. }
            | Self::GetStateSummaryFrontier { request_id, .. }
            | Self::StateSummaryFrontier { request_id, .. }
            | Self::GetStateSummaryFrontierFailed { request_id, .. }
            | Self::GetAcceptedStateSummary { request_id, .. }
            | Self::AcceptedStateSummary { request_id, .. }
            | Self::GetAcceptedStateSummaryFailed { request_id, .. }
            | Self::AppRequest { request_id, .. }
            | Self::AppResponse { request_id, .. }
            | Self::AppRequestFailed { request_id, .. }
            | Self::CrossChainAppRequest { request_id, .. }
            | Self::CrossChainAppResponse { request_id, .. }
            | Self::CrossChainAppRequestFailed { request_id, .. } => Some(*request_id),
            _ => None,
        }
    }

    /// The internal `*_Failed` message a router should synthesize and
    /// deliver locally if this request never gets a reply in time, or
    /// `None` if this variant isn't a request (replies, gossip, and the
    /// internal-only signals never time out on their own).
    pub fn synthetic_failure(&self) -> Option<Message> {
        match *self {
            Self::PullQuery { chain_id, request_id, .. } | Self::PushQuery { chain_id, request_id, .. } => {
                Some(Self::QueryFailed { chain_id, request_id, reason: AppError::Timeout })
            }
            Self::GetAcceptedFrontier { chain_id, request_id } => {
                Some(Self::GetAcceptedFrontierFailed { chain_id, request_id })
            }
            Self::GetAccepted { chain_id, request_id, .. } => Some(Self::GetAcceptedFailed { chain_id, request_id }),
            Self::GetAncestors { chain_id, request_id, .. } => Some(Self::GetAncestorsFailed { chain_id, request_id }),
            Self::Get { chain_id, request_id, .. } => Some(Self::GetFailed { chain_id, request_id }),
            Self::GetStateSummaryFrontier { chain_id, request_id } => {
                Some(Self::GetStateSummaryFrontierFailed { chain_id, request_id })
            }
            Self::GetAcceptedStateSummary { chain_id, request_id, .. } => {
                Some(Self::GetAcceptedStateSummaryFailed { chain_id, request_id })
            }
            Self::AppRequest { chain_id, request_id, .. } => Some(Self::AppRequestFailed { chain_id, request_id }),
            Self::CrossChainAppRequest { source_chain_id, dest_chain_id, request_id, .. } => {
                Some(Self::CrossChainAppRequestFailed { source_chain_id, dest_chain_id, request_id })
            }
            _ => None,
        }
    }
}
