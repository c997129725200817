//! Typed errors for validator-set mutations.

use {supernet_codec::NodeId, thiserror::Error};

/// Errors returned by [`crate::ValidatorManager`] operations.
#[derive(Error, Debug, PartialEq, Eq)]
pub enum ValidatorManagerError {
    /// `AddStaker`/`AddWeight`/`RemoveWeight` was called with a zero weight delta.
    #[error("zero weight")]
    ZeroWeight,

    /// `AddStaker` was called for a node already present in the supernet.
    #[error("validator already present: {0}")]
    DuplicateValidator(NodeId),

    /// `AddWeight`/`RemoveWeight` was called for a node not present in the supernet.
    #[error("validator not present: {0}")]
    MissingValidator(NodeId),

    /// `AddWeight` would push the supernet's total weight past `u64::MAX`.
    #[error("total weight would overflow u64")]
    TotalWeightNotUint64,

    /// `RemoveWeight` would take a validator's weight below zero.
    #[error("weight underflow for validator: {0}")]
    Underflow(NodeId),

    /// `SubsetWeight` summed past `u64::MAX`. Distinct from
    /// `TotalWeightNotUint64` so the two queries report different error
    /// kinds for the same overflowing set.
    #[error("subset weight would overflow u64")]
    Overflow,
}

/// Convenience result type for validator-manager operations.
pub type Result<T> = std::result::Result<T, ValidatorManagerError>;
