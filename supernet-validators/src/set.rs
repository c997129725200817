//! The ordered, weighted validator set backing a single supernet.

use {
    crate::error::{Result, ValidatorManagerError},
    solana_bls_signatures::Pubkey as BlsPubkey,
    std::collections::HashMap,
    supernet_codec::{Id, NodeId},
};

/// A single validator's entry within one supernet.
#[derive(Debug, Clone, PartialEq)]
pub struct ValidatorEntry {
    /// The validator's node identity.
    pub node_id: NodeId,
    /// BLS public key used for warp/attestation signatures, if registered.
    pub bls_pubkey: Option<BlsPubkey>,
    /// Staking transaction id that created this entry.
    pub tx_id: Id,
    /// Current stake weight.
    pub weight: u64,
}

/// An ordered, weighted set of validators for one supernet.
///
/// Validators are sorted by (weight descending, node id ascending) to give
/// every node in the network the same deterministic iteration order.
#[derive(Debug, Clone, Default)]
pub struct ValidatorSet {
    validators: Vec<ValidatorEntry>,
    index: HashMap<NodeId, usize>,
    total_weight: u64,
}

impl ValidatorSet {
    /// An empty validator set.
    pub fn new() -> Self {
        Self::default()
    }

    fn resort(&mut self) {
        self.validators
            .sort_by(|a, b| b.weight.cmp(&a.weight).then_with(|| a.node_id.cmp(&b.node_id)));
        self.index = self
            .validators
            .iter()
            .enumerate()
            .map(|(i, v)| (v.node_id, i))
            .collect();
    }

    /// Insert a brand-new validator. Fails if already present or weight is zero.
    pub fn add_staker(
        &mut self,
        node_id: NodeId,
        bls_pubkey: Option<BlsPubkey>,
        tx_id: Id,
        weight: u64,
    ) -> Result<()> {
        if weight == 0 {
            return Err(ValidatorManagerError::ZeroWeight);
        }
        if self.index.contains_key(&node_id) {
            return Err(ValidatorManagerError::DuplicateValidator(node_id));
        }
        // Unlike `add_weight`, `AddStaker` never fails on overflow: the
        // mathematical sum may exceed `u64::MAX`, and only surfaces as an
        // error later, from `total_weight`/`subset_weight` queries. This
        // cached field backs `sample`'s denominator only, so a wrapped
        // value here is harmless.
        self.validators.push(ValidatorEntry {
            node_id,
            bls_pubkey,
            tx_id,
            weight,
        });
        self.resort();
        self.total_weight = self.total_weight.wrapping_add(weight);
        Ok(())
    }

    /// Increase an existing validator's weight by `delta`.
    ///
    /// Returns the (old, new) weight on success.
    pub fn add_weight(&mut self, node_id: NodeId, delta: u64) -> Result<(u64, u64)> {
        if delta == 0 {
            return Err(ValidatorManagerError::ZeroWeight);
        }
        let idx = *self
            .index
            .get(&node_id)
            .ok_or(ValidatorManagerError::MissingValidator(node_id))?;
        let old_weight = self.validators[idx].weight;
        let new_weight = old_weight
            .checked_add(delta)
            .ok_or(ValidatorManagerError::TotalWeightNotUint64)?;
        let total_weight = self
            .total_weight
            .checked_add(delta)
            .ok_or(ValidatorManagerError::TotalWeightNotUint64)?;
        self.validators[idx].weight = new_weight;
        self.resort();
        self.total_weight = total_weight;
        Ok((old_weight, new_weight))
    }

    /// Decrease an existing validator's weight by `delta`, removing the entry
    /// entirely if it reaches zero.
    ///
    /// Returns `(old_weight, new_weight)`, where `new_weight == 0` indicates
    /// the validator was removed.
    pub fn remove_weight(&mut self, node_id: NodeId, delta: u64) -> Result<(u64, u64)> {
        if delta == 0 {
            return Err(ValidatorManagerError::ZeroWeight);
        }
        let idx = *self
            .index
            .get(&node_id)
            .ok_or(ValidatorManagerError::MissingValidator(node_id))?;
        let old_weight = self.validators[idx].weight;
        let new_weight = old_weight
            .checked_sub(delta)
            .ok_or(ValidatorManagerError::Underflow(node_id))?;
        if new_weight == 0 {
            self.validators.remove(idx);
        } else {
            self.validators[idx].weight = new_weight;
        }
        self.resort();
        self.total_weight = self.total_weight.saturating_sub(delta);
        Ok((old_weight, new_weight))
    }

    /// Number of validators currently in the set.
    pub fn len(&self) -> usize {
        self.validators.len()
    }

    /// `true` if the set has no validators.
    pub fn is_empty(&self) -> bool {
        self.validators.is_empty()
    }

    /// Sum of all validators' weights.
    ///
    /// Recomputed by checked summation on every call rather than read from a
    /// cache, so a set whose per-validator weights mathematically sum past
    /// `u64::MAX` surfaces that here as `TotalWeightNotUint64`, even though
    /// `AddStaker` let such a set be built.
    pub fn total_weight(&self) -> Result<u64> {
        self.validators
            .iter()
            .try_fold(0u64, |acc, v| acc.checked_add(v.weight))
            .ok_or(ValidatorManagerError::TotalWeightNotUint64)
    }

    /// Sum of weights for every node id in `subset` that is present.
    pub fn subset_weight(&self, subset: &[NodeId]) -> Result<u64> {
        subset
            .iter()
            .filter_map(|id| self.get(id))
            .try_fold(0u64, |acc, v| acc.checked_add(v.weight))
            .ok_or(ValidatorManagerError::Overflow)
    }

    /// Look up a validator entry by node id.
    pub fn get(&self, node_id: &NodeId) -> Option<&ValidatorEntry> {
        self.index.get(node_id).map(|&i| &self.validators[i])
    }

    /// The weight of a validator, or 0 if not present.
    pub fn weight_of(&self, node_id: &NodeId) -> u64 {
        self.get(node_id).map(|v| v.weight).unwrap_or(0)
    }

    /// `true` if `node_id` is a member of this set.
    pub fn contains(&self, node_id: &NodeId) -> bool {
        self.index.contains_key(node_id)
    }

    /// Iterate over all validators in deterministic (weight desc, node id
    /// asc) order.
    pub fn iter(&self) -> impl Iterator<Item = &ValidatorEntry> {
        self.validators.iter()
    }

    /// Weighted sample of `size` node ids, with replacement, deterministic
    /// given `seed`. Matches every other node's sample for the same
    /// `(seed, set contents)` — required for consensus sampling to be
    /// reproducible in tests and safe to repeat under packet loss.
    pub fn sample(&self, size: usize, seed: u64) -> Vec<NodeId> {
        if self.validators.is_empty() || self.total_weight == 0 {
            return Vec::new();
        }
        (0..size)
            .map(|i| {
                let draw_seed = seed.wrapping_add(i as u64).wrapping_mul(0x9E37_79B9_7F4A_7C15);
                let target = draw_seed % self.total_weight;
                let mut accumulated = 0u64;
                for validator in &self.validators {
                    accumulated = accumulated.saturating_add(validator.weight);
                    if accumulated > target {
                        return validator.node_id;
                    }
                }
                self.validators[0].node_id
            })
            .collect()
    }

    /// Canonical ordering for warp/attestation verification: sorted by BLS
    /// public-key bytes, with same-key entries coalesced (weights summed,
    /// node ids appended). Entries without a registered BLS key are appended
    /// afterward, in node-id order.
    pub fn canonical_list(&self) -> Vec<CanonicalEntry> {
        let mut keyed: Vec<&ValidatorEntry> =
            self.validators.iter().filter(|v| v.bls_pubkey.is_some()).collect();
        keyed.sort_by(|a, b| {
            a.bls_pubkey
                .as_ref()
                .unwrap()
                .to_bytes()
                .cmp(&b.bls_pubkey.as_ref().unwrap().to_bytes())
        });

        let mut canonical: Vec<CanonicalEntry> = Vec::new();
        for entry in keyed {
            let key = entry.bls_pubkey.unwrap();
            if let Some(last) = canonical.last_mut() {
                if last.bls_pubkey == key {
                    last.weight = last.weight.saturating_add(entry.weight);
                    last.node_ids.push(entry.node_id);
                    continue;
                }
            }
            canonical.push(CanonicalEntry {
                bls_pubkey: key,
                weight: entry.weight,
                node_ids: vec![entry.node_id],
            });
        }

        let mut unkeyed: Vec<NodeId> = self
            .validators
            .iter()
            .filter(|v| v.bls_pubkey.is_none())
            .map(|v| v.node_id)
            .collect();
        unkeyed.sort();
        for node_id in unkeyed {
            canonical.push(CanonicalEntry {
                bls_pubkey: BlsPubkey::default(),
                weight: self.weight_of(&node_id),
                node_ids: vec![node_id],
            });
        }
        canonical
    }
}

/// One coalesced row of the canonical validator list.
#[derive(Debug, Clone)]
pub struct CanonicalEntry {
    /// Shared BLS public key for this row (meaningless for unkeyed rows).
    pub bls_pubkey: BlsPubkey,
    /// Combined weight of every node id in this row.
    pub weight: u64,
    /// Node ids sharing `bls_pubkey`, in the order they were coalesced.
    pub node_ids: Vec<NodeId>,
}

#[cfg(test)]
mod tests {
    use super::*;

    fn node_id(byte: u8) -> NodeId {
        NodeId::from([byte; 20])
    }

    #[test]
    fn test_add_staker_rejects_zero_weight() {
        let mut vs = ValidatorSet::new();
        let err = vs.add_staker(node_id(1), None, Id::zero(), 0).unwrap_err();
        assert_eq!(err, ValidatorManagerError::ZeroWeight);
    }

    #[test]
    fn test_add_staker_rejects_duplicate() {
        let mut vs = ValidatorSet::new();
        vs.add_staker(node_id(1), None, Id::zero(), 100).unwrap();
        let err = vs.add_staker(node_id(1), None, Id::zero(), 50).unwrap_err();
        assert_eq!(err, ValidatorManagerError::DuplicateValidator(node_id(1)));
    }

    #[test]
    fn test_sorted_by_weight_desc_then_node_id_asc() {
        let mut vs = ValidatorSet::new();
        vs.add_staker(node_id(3), None, Id::zero(), 100).unwrap();
        vs.add_staker(node_id(1), None, Id::zero(), 300).unwrap();
        vs.add_staker(node_id(2), None, Id::zero(), 200).unwrap();
        let order: Vec<NodeId> = vs.iter().map(|v| v.node_id).collect();
        assert_eq!(order, vec![node_id(1), node_id(2), node_id(3)]);
    }

    #[test]
    fn test_add_weight_missing_validator() {
        let mut vs = ValidatorSet::new();
        let err = vs.add_weight(node_id(9), 10).unwrap_err();
        assert_eq!(err, ValidatorManagerError::MissingValidator(node_id(9)));
    }

    #[test]
    fn test_add_weight_overflow() {
        let mut vs = ValidatorSet::new();
        vs.add_staker(node_id(1), None, Id::zero(), u64::MAX).unwrap();
        let err = vs.add_weight(node_id(1), 1).unwrap_err();
        assert_eq!(err, ValidatorManagerError::TotalWeightNotUint64);
    }

    #[test]
    fn test_remove_weight_to_zero_removes_entry() {
        let mut vs = ValidatorSet::new();
        vs.add_staker(node_id(1), None, Id::zero(), 100).unwrap();
        let (old, new) = vs.remove_weight(node_id(1), 100).unwrap();
        assert_eq!((old, new), (100, 0));
        assert!(!vs.contains(&node_id(1)));
        assert_eq!(vs.total_weight().unwrap(), 0);
    }

    #[test]
    fn test_remove_weight_underflow() {
        let mut vs = ValidatorSet::new();
        vs.add_staker(node_id(1), None, Id::zero(), 50).unwrap();
        let err = vs.remove_weight(node_id(1), 100).unwrap_err();
        assert_eq!(err, ValidatorManagerError::Underflow(node_id(1)));
    }

    #[test]
    fn test_subset_weight() {
        let mut vs = ValidatorSet::new();
        vs.add_staker(node_id(1), None, Id::zero(), 100).unwrap();
        vs.add_staker(node_id(2), None, Id::zero(), 200).unwrap();
        vs.add_staker(node_id(3), None, Id::zero(), 300).unwrap();
        assert_eq!(vs.subset_weight(&[node_id(1), node_id(3)]).unwrap(), 400);
        assert_eq!(vs.subset_weight(&[node_id(9)]).unwrap(), 0);
    }

    #[test]
    fn test_add_staker_allows_total_weight_overflow_until_queried() {
        // Adding weights `1` and `MaxU64` must both succeed; the overflow
        // only surfaces from the query methods.
        let mut vs = ValidatorSet::new();
        vs.add_staker(node_id(1), None, Id::zero(), 1).unwrap();
        vs.add_staker(node_id(2), None, Id::zero(), u64::MAX).unwrap();
        assert_eq!(vs.total_weight().unwrap_err(), ValidatorManagerError::TotalWeightNotUint64);
        assert_eq!(
            vs.subset_weight(&[node_id(1), node_id(2)]).unwrap_err(),
            ValidatorManagerError::Overflow
        );
    }

    #[test]
    fn test_sample_deterministic_for_same_seed() {
        let mut vs = ValidatorSet::new();
        for i in 1..=5u8 {
            vs.add_staker(node_id(i), None, Id::zero(), i as u64 * 100).unwrap();
        }
        let a = vs.sample(10, 42);
        let b = vs.sample(10, 42);
        assert_eq!(a, b);
    }

    #[test]
    fn test_sample_with_replacement_allows_repeats_when_oversized() {
        let mut vs = ValidatorSet::new();
        vs.add_staker(node_id(1), None, Id::zero(), 100).unwrap();
        let sampled = vs.sample(5, 7);
        assert_eq!(sampled.len(), 5);
        assert!(sampled.iter().all(|id| *id == node_id(1)));
    }

    #[test]
    fn test_canonical_list_coalesces_shared_bls_key() {
        let mut vs = ValidatorSet::new();
        let key = BlsPubkey::default();
        vs.add_staker(node_id(1), Some(key), Id::zero(), 100).unwrap();
        vs.add_staker(node_id(2), Some(key), Id::zero(), 200).unwrap();
        vs.add_staker(node_id(3), None, Id::zero(), 50).unwrap();
        let canonical = vs.canonical_list();
        assert_eq!(canonical.len(), 2);
        assert_eq!(canonical[0].weight, 300);
        assert_eq!(canonical[0].node_ids.len(), 2);
        assert_eq!(canonical[1].node_ids, vec![node_id(3)]);
    }

    #[test]
    fn test_empty_set() {
        let vs = ValidatorSet::new();
        assert!(vs.is_empty());
        assert_eq!(vs.total_weight().unwrap(), 0);
        assert!(vs.sample(3, 1).is_empty());
    }
}
