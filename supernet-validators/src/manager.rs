//! Process-wide validator manager: a supernet id → [`ValidatorSet`] map with
//! callback notification.

use {
    crate::{
        error::Result,
        set::{CanonicalEntry, ValidatorEntry, ValidatorSet},
    },
    solana_bls_signatures::Pubkey as BlsPubkey,
    std::{collections::HashMap, sync::Arc},
    supernet_codec::{Id, NodeId},
};

/// Receives notifications about validator membership and weight changes.
///
/// Implementations must not block: they run synchronously inside the
/// mutating call (`AddStaker`/`AddWeight`/`RemoveWeight`) before it returns.
pub trait ValidatorCallback: Send + Sync {
    /// A new validator was added to `supernet_id`.
    fn on_validator_added(&self, _supernet_id: Id, _node_id: NodeId, _weight: u64) {}
    /// A validator's weight reached zero and it was removed from `supernet_id`.
    fn on_validator_removed(&self, _supernet_id: Id, _node_id: NodeId) {}
    /// A validator's weight changed within `supernet_id` without being removed.
    fn on_validator_weight_changed(
        &self,
        _supernet_id: Id,
        _node_id: NodeId,
        _old_weight: u64,
        _new_weight: u64,
    ) {
    }
}

/// Process-wide mapping from supernet id to weighted validator set.
#[derive(Default)]
pub struct ValidatorManager {
    sets: HashMap<Id, ValidatorSet>,
    global_listeners: Vec<Arc<dyn ValidatorCallback>>,
    set_listeners: HashMap<Id, Vec<Arc<dyn ValidatorCallback>>>,
}

impl ValidatorManager {
    /// An empty manager tracking no supernets.
    pub fn new() -> Self {
        Self::default()
    }

    fn listeners_for(&self, supernet_id: Id) -> impl Iterator<Item = &Arc<dyn ValidatorCallback>> {
        self.global_listeners
            .iter()
            .chain(self.set_listeners.get(&supernet_id).into_iter().flatten())
    }

    /// Register a listener notified of changes across every supernet.
    pub fn register_callback_listener(&mut self, listener: Arc<dyn ValidatorCallback>) {
        self.global_listeners.push(listener);
    }

    /// Register a listener notified only of changes within `supernet_id`.
    pub fn register_set_callback_listener(
        &mut self,
        supernet_id: Id,
        listener: Arc<dyn ValidatorCallback>,
    ) {
        self.set_listeners.entry(supernet_id).or_default().push(listener);
    }

    /// Add a new validator to `supernet_id`.
    pub fn add_staker(
        &mut self,
        supernet_id: Id,
        node_id: NodeId,
        bls_pubkey: Option<BlsPubkey>,
        tx_id: Id,
        weight: u64,
    ) -> Result<()> {
        let set = self.sets.entry(supernet_id).or_default();
        set.add_staker(node_id, bls_pubkey, tx_id, weight)?;
        for listener in self.listeners_for(supernet_id) {
            listener.on_validator_added(supernet_id, node_id, weight);
        }
        Ok(())
    }

    /// Increase a validator's weight within `supernet_id`.
    pub fn add_weight(&mut self, supernet_id: Id, node_id: NodeId, delta: u64) -> Result<()> {
        let set = self
            .sets
            .get_mut(&supernet_id)
            .ok_or(crate::error::ValidatorManagerError::MissingValidator(node_id))?;
        let (old_weight, new_weight) = set.add_weight(node_id, delta)?;
        for listener in self.listeners_for(supernet_id) {
            listener.on_validator_weight_changed(supernet_id, node_id, old_weight, new_weight);
        }
        Ok(())
    }

    /// Decrease a validator's weight within `supernet_id`, removing it if it
    /// reaches zero.
    pub fn remove_weight(&mut self, supernet_id: Id, node_id: NodeId, delta: u64) -> Result<()> {
        let set = self
            .sets
            .get_mut(&supernet_id)
            .ok_or(crate::error::ValidatorManagerError::MissingValidator(node_id))?;
        let (old_weight, new_weight) = set.remove_weight(node_id, delta)?;
        if new_weight == 0 {
            for listener in self.listeners_for(supernet_id) {
                listener.on_validator_removed(supernet_id, node_id);
            }
        } else {
            for listener in self.listeners_for(supernet_id) {
                listener.on_validator_weight_changed(supernet_id, node_id, old_weight, new_weight);
            }
        }
        Ok(())
    }

    /// Look up a validator's entry within `supernet_id`.
    pub fn get_validator(&self, supernet_id: Id, node_id: &NodeId) -> Option<&ValidatorEntry> {
        self.sets.get(&supernet_id)?.get(node_id)
    }

    /// A validator's weight within `supernet_id`, or 0 if absent.
    pub fn get_weight(&self, supernet_id: Id, node_id: &NodeId) -> u64 {
        self.sets
            .get(&supernet_id)
            .map(|s| s.weight_of(node_id))
            .unwrap_or(0)
    }

    /// Total weight of `supernet_id`'s validator set. An unknown supernet
    /// has no validators and so sums to zero.
    pub fn total_weight(&self, supernet_id: Id) -> Result<u64> {
        self.sets.get(&supernet_id).map(|s| s.total_weight()).unwrap_or(Ok(0))
    }

    /// Sum of weights for `subset` within `supernet_id`. An unknown supernet
    /// has no validators and so sums to zero.
    pub fn subset_weight(&self, supernet_id: Id, subset: &[NodeId]) -> Result<u64> {
        self.sets
            .get(&supernet_id)
            .map(|s| s.subset_weight(subset))
            .unwrap_or(Ok(0))
    }

    /// Number of validators in `supernet_id`.
    pub fn count(&self, supernet_id: Id) -> usize {
        self.sets.get(&supernet_id).map(|s| s.len()).unwrap_or(0)
    }

    /// Weighted sample of `size` node ids from `supernet_id`, with
    /// replacement, deterministic for a given `seed`.
    pub fn sample(&self, supernet_id: Id, size: usize, seed: u64) -> Vec<NodeId> {
        self.sets
            .get(&supernet_id)
            .map(|s| s.sample(size, seed))
            .unwrap_or_default()
    }

    /// The canonical, BLS-key-ordered, coalesced validator list for warp or
    /// attestation verification.
    pub fn canonical_list(&self, supernet_id: Id) -> Vec<CanonicalEntry> {
        self.sets
            .get(&supernet_id)
            .map(|s| s.canonical_list())
            .unwrap_or_default()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicUsize, Ordering};

    fn node_id(byte: u8) -> NodeId {
        NodeId::from([byte; 20])
    }

    #[derive(Default)]
    struct CountingListener {
        added: AtomicUsize,
        removed: AtomicUsize,
        changed: AtomicUsize,
    }

    impl ValidatorCallback for CountingListener {
        fn on_validator_added(&self, _supernet_id: Id, _node_id: NodeId, _weight: u64) {
            self.added.fetch_add(1, Ordering::SeqCst);
        }
        fn on_validator_removed(&self, _supernet_id: Id, _node_id: NodeId) {
            self.removed.fetch_add(1, Ordering::SeqCst);
        }
        fn on_validator_weight_changed(
            &self,
            _supernet_id: Id,
            _node_id: NodeId,
            _old_weight: u64,
            _new_weight: u64,
        ) {
            self.changed.fetch_add(1, Ordering::SeqCst);
        }
    }

    #[test]
    fn test_add_staker_fires_exactly_one_callback() {
        let mut mgr = ValidatorManager::new();
        let listener = Arc::new(CountingListener::default());
        mgr.register_callback_listener(listener.clone());
        mgr.add_staker(Id::zero(), node_id(1), None, Id::zero(), 100).unwrap();
        assert_eq!(listener.added.load(Ordering::SeqCst), 1);
    }

    #[test]
    fn test_per_supernet_listener_only_sees_its_supernet() {
        let mut mgr = ValidatorManager::new();
        let supernet_a = Id::from([1u8; 32]);
        let supernet_b = Id::from([2u8; 32]);
        let listener = Arc::new(CountingListener::default());
        mgr.register_set_callback_listener(supernet_a, listener.clone());
        mgr.add_staker(supernet_a, node_id(1), None, Id::zero(), 100).unwrap();
        mgr.add_staker(supernet_b, node_id(2), None, Id::zero(), 100).unwrap();
        assert_eq!(listener.added.load(Ordering::SeqCst), 1);
    }

    #[test]
    fn test_remove_weight_to_zero_fires_removed_not_changed() {
        let mut mgr = ValidatorManager::new();
        let listener = Arc::new(CountingListener::default());
        mgr.register_callback_listener(listener.clone());
        mgr.add_staker(Id::zero(), node_id(1), None, Id::zero(), 100).unwrap();
        mgr.remove_weight(Id::zero(), node_id(1), 100).unwrap();
        assert_eq!(listener.removed.load(Ordering::SeqCst), 1);
        assert_eq!(listener.changed.load(Ordering::SeqCst), 0);
    }

    #[test]
    fn test_total_weight_tracks_sum_of_validators() {
        let mut mgr = ValidatorManager::new();
        mgr.add_staker(Id::zero(), node_id(1), None, Id::zero(), 100).unwrap();
        mgr.add_staker(Id::zero(), node_id(2), None, Id::zero(), 200).unwrap();
        assert_eq!(mgr.total_weight(Id::zero()).unwrap(), 300);
        mgr.add_weight(Id::zero(), node_id(1), 50).unwrap();
        assert_eq!(mgr.total_weight(Id::zero()).unwrap(), 350);
    }

    #[test]
    fn test_unknown_supernet_returns_empty_defaults() {
        let mgr = ValidatorManager::new();
        assert_eq!(mgr.total_weight(Id::zero()).unwrap(), 0);
        assert_eq!(mgr.count(Id::zero()), 0);
        assert!(mgr.sample(Id::zero(), 3, 0).is_empty());
    }

    #[test]
    fn test_total_weight_and_subset_weight_overflow_distinctly() {
        // Overflow distinctness holds through the manager layer too.
        let mut mgr = ValidatorManager::new();
        mgr.add_staker(Id::zero(), node_id(1), None, Id::zero(), 1).unwrap();
        mgr.add_staker(Id::zero(), node_id(2), None, Id::zero(), u64::MAX).unwrap();
        assert_eq!(
            mgr.total_weight(Id::zero()).unwrap_err(),
            crate::error::ValidatorManagerError::TotalWeightNotUint64
        );
        assert_eq!(
            mgr.subset_weight(Id::zero(), &[node_id(1), node_id(2)]).unwrap_err(),
            crate::error::ValidatorManagerError::Overflow
        );
    }
}
