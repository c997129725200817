//! Message classification shared by the router and the per-chain handler:
//! which chain a message targets, which priority queue it belongs in, and
//! which engine type it declares.

use supernet_codec::{Id, Message};

/// The priority class a handler's bounded inbound queue partitions messages
/// into. Dequeue order always drains `High` before `Low` before `Sync`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Priority {
    /// Consensus traffic: query responses, acceptance notifications, and the
    /// synthetic failures the router fabricates for them.
    High,
    /// Gossip and application-layer traffic.
    Low,
    /// Internally generated, time-driven notifications (e.g. repoll ticks).
    Sync,
}

/// Which consensus engine family a message is declared for.
///
/// `Unspecified` defers to whatever engine the target chain currently runs.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EngineType {
    /// Block-chain (Snowman) consensus.
    Snowman,
    /// DAG (Avalanche) consensus.
    Avalanche,
    /// Not declared by the message; use the chain's current engine.
    Unspecified,
}

/// The chain a message targets, if any.
///
/// `ConnectedSupernet`/`DisconnectedSupernet` fan out to every chain in a
/// supernet rather than naming one, so they have no single target and return
/// `None` here; the router handles them separately.
pub fn target_chain(msg: &Message) -> Option<Id> {
    match msg {
        Message::PullQuery { chain_id, .. }
        | Message::PushQuery { chain_id, .. }
        | Message::Chits { chain_id, .. }
        | Message::QueryFailed { chain_id, .. }
        | Message::GetAcceptedFrontier { chain_id, .. }
        | Message::AcceptedFrontier { chain_id, .. }
        | Message::GetAcceptedFrontierFailed { chain_id, .. }
        | Message::GetAccepted { chain_id, .. }
        | Message::Accepted { chain_id, .. }
        | Message::GetAcceptedFailed { chain_id, .. }
        | Message::GetAncestors { chain_id, .. }
        | Message::Ancestors { chain_id, .. }
        | Message::GetAncestorsFailed { chain_id, .. }
        | Message::Get { chain_id, .. }
        | Message::Put { chain_id, .. }
        | Message::GetFailed { chain_id, .. }
        | Message::GetStateSummaryFrontier { chain_id, .. }
        | Message::StateSummaryFrontier { chain_id, .. }
        | Message::GetStateSummaryFrontierFailed { chain_id, .. }
        | Message::GetAcceptedStateSummary { chain_id, .. }
        | Message::AcceptedStateSummary { chain_id, .. }
        | Message::GetAcceptedStateSummaryFailed { chain_id, .. }
        | Message::AppRequest { chain_id, .. }
        | Message::AppResponse { chain_id, .. }
        | Message::AppRequestFailed { chain_id, .. }
        | Message::AppGossip { chain_id, .. }
        | Message::Notify { chain_id, .. } => Some(*chain_id),
        Message::CrossChainAppRequest { dest_chain_id, .. }
        | Message::CrossChainAppRequestFailed { dest_chain_id, .. } => Some(*dest_chain_id),
        Message::CrossChainAppResponse { source_chain_id, .. } => Some(*source_chain_id),
        _ => None,
    }
}

/// The priority class this message dispatches into.
pub fn priority_of(msg: &Message) -> Priority {
    match msg {
        Message::PullQuery { .. }
        | Message::PushQuery { .. }
        | Message::Chits { .. }
        | Message::QueryFailed { .. }
        | Message::GetAcceptedFrontier { .. }
        | Message::AcceptedFrontier { .. }
        | Message::GetAcceptedFrontierFailed { .. }
        | Message::GetAccepted { .. }
        | Message::Accepted { .. }
        | Message::GetAcceptedFailed { .. }
        | Message::GetAncestors { .. }
        | Message::Ancestors { .. }
        | Message::GetAncestorsFailed { .. }
        | Message::Get { .. }
        | Message::Put { .. }
        | Message::GetFailed { .. }
        | Message::GetStateSummaryFrontier { .. }
        | Message::StateSummaryFrontier { .. }
        | Message::GetStateSummaryFrontierFailed { .. }
        | Message::GetAcceptedStateSummary { .. }
        | Message::AcceptedStateSummary { .. }
        | Message::GetAcceptedStateSummaryFailed { .. } => Priority::High,
        Message::Notify { .. }
        | Message::ConnectedSupernet { .. }
        | Message::DisconnectedSupernet { .. } => Priority::Sync,
        _ => Priority::Low,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use supernet_codec::NodeId;

    fn id(byte: u8) -> Id {
        Id::from([byte; 32])
    }

    #[test]
    fn test_target_chain_simple_variant() {
        let msg = Message::Chits {
            chain_id: id(1),
            request_id: 0,
            preferred: id(2),
            accepted: id(3),
        };
        assert_eq!(target_chain(&msg), Some(id(1)));
    }

    #[test]
    fn test_target_chain_cross_chain_request_uses_dest() {
        let msg = Message::CrossChainAppRequest {
            source_chain_id: id(1),
            dest_chain_id: id(2),
            request_id: 0,
            payload: vec![],
        };
        assert_eq!(target_chain(&msg), Some(id(2)));
    }

    #[test]
    fn test_target_chain_cross_chain_response_uses_source() {
        let msg = Message::CrossChainAppResponse {
            source_chain_id: id(1),
            dest_chain_id: id(2),
            request_id: 0,
            payload: vec![],
        };
        assert_eq!(target_chain(&msg), Some(id(1)));
    }

    #[test]
    fn test_target_chain_none_for_untargeted_variant() {
        assert_eq!(target_chain(&Message::PeerListAck), None);
        assert_eq!(
            target_chain(&Message::ConnectedSupernet {
                supernet_id: id(1),
                node_id: NodeId::zero(),
            }),
            None
        );
    }

    #[test]
    fn test_priority_classification() {
        assert_eq!(priority_of(&Message::Ping { uptime_pct: 1 }), Priority::Low);
        assert_eq!(
            priority_of(&Message::Chits {
                chain_id: id(1),
                request_id: 0,
                preferred: id(1),
                accepted: id(1),
            }),
            Priority::High
        );
        assert_eq!(
            priority_of(&Message::Notify { chain_id: id(1), signal: vec![] }),
            Priority::Sync
        );
    }
}
