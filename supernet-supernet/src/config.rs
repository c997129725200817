//! Per-supernet configuration: consensus parameters, validator-only privacy,
//! and the proposer-VM's minimum block delay.

use {std::collections::HashSet, supernet_codec::NodeId};

/// Repeated-sampling consensus parameters shared by every chain in a
/// supernet (see `supernet-consensus` for the engine that consumes these).
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ConsensusParameters {
    /// Sample size per poll.
    pub k: u32,
    /// Minimum votes to update preference.
    pub alpha_preference: u32,
    /// Minimum votes to accrue confidence.
    pub alpha_confidence: u32,
    /// Consecutive confident polls required to finalize.
    pub beta: u32,
    /// In-flight polls per chain.
    pub concurrent_repolls: u32,
    /// Soft target for the number of processing items.
    pub optimal_processing: u32,
    /// Hard cap on processing items before backpressuring the VM.
    pub max_outstanding_items: u32,
    /// Age at which a processing item triggers a liveness warning.
    pub max_item_processing_time_ms: u64,
}

impl ConsensusParameters {
    /// `true` iff `0 < alpha_preference <= alpha_confidence <= k` and `beta >= 1`.
    pub fn is_valid(&self) -> bool {
        self.alpha_preference > 0
            && self.alpha_preference <= self.alpha_confidence
            && self.alpha_confidence <= self.k
            && self.beta >= 1
    }
}

impl Default for ConsensusParameters {
    fn default() -> Self {
        Self {
            k: 20,
            alpha_preference: 15,
            alpha_confidence: 15,
            beta: 20,
            concurrent_repolls: 4,
            optimal_processing: 50,
            max_outstanding_items: 1_024,
            max_item_processing_time_ms: 30_000,
        }
    }
}

/// Per-supernet configuration: consensus parameters plus the validator-only
/// privacy policy.
#[derive(Debug, Clone, Default)]
pub struct SupernetConfig {
    /// Consensus parameters for every chain in this supernet.
    pub consensus_parameters: ConsensusParameters,
    /// When `true`, only validators of this supernet (plus `allowed`) may
    /// connect to chains belonging to it.
    pub validator_only: bool,
    /// Node ids allowed to connect despite `validator_only`.
    pub allowed: HashSet<NodeId>,
    /// Minimum delay (milliseconds) the proposer-VM must impose between a
    /// block's parent timestamp and its own, per validator rank.
    pub proposer_min_block_delay_ms: u64,
}

impl SupernetConfig {
    /// Returns `true` iff `node_id` may connect to a chain in this supernet,
    /// given whether it is a validator of the supernet.
    ///
    /// Always `true` for the local node, for non-privacy-restricted
    /// supernets, for validators, and for explicitly allow-listed node ids.
    pub fn is_allowed(&self, node_id: &NodeId, local_node_id: &NodeId, is_validator: bool) -> bool {
        node_id == local_node_id
            || !self.validator_only
            || is_validator
            || self.allowed.contains(node_id)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn node_id(byte: u8) -> NodeId {
        NodeId::from([byte; 20])
    }

    #[test]
    fn test_consensus_parameters_valid() {
        let params = ConsensusParameters::default();
        assert!(params.is_valid());
    }

    #[test]
    fn test_consensus_parameters_rejects_alpha_preference_above_confidence() {
        let mut params = ConsensusParameters::default();
        params.alpha_preference = params.alpha_confidence + 1;
        assert!(!params.is_valid());
    }

    #[test]
    fn test_consensus_parameters_rejects_zero_alpha_preference() {
        let mut params = ConsensusParameters::default();
        params.alpha_preference = 0;
        assert!(!params.is_valid());
    }

    #[test]
    fn test_is_allowed_local_node_always_true() {
        let cfg = SupernetConfig {
            validator_only: true,
            ..Default::default()
        };
        assert!(cfg.is_allowed(&node_id(1), &node_id(1), false));
    }

    #[test]
    fn test_is_allowed_non_private_supernet() {
        let cfg = SupernetConfig::default();
        assert!(cfg.is_allowed(&node_id(1), &node_id(2), false));
    }

    #[test]
    fn test_is_allowed_validator_bypasses_privacy() {
        let cfg = SupernetConfig {
            validator_only: true,
            ..Default::default()
        };
        assert!(cfg.is_allowed(&node_id(1), &node_id(2), true));
    }

    #[test]
    fn test_is_allowed_explicit_allow_list() {
        let mut allowed = HashSet::new();
        allowed.insert(node_id(9));
        let cfg = SupernetConfig {
            validator_only: true,
            allowed,
            ..Default::default()
        };
        assert!(cfg.is_allowed(&node_id(9), &node_id(2), false));
        assert!(!cfg.is_allowed(&node_id(8), &node_id(2), false));
    }
}
