//! Error types for timeout, benchlist, and resource-targeter configuration.

use thiserror::Error;

/// Errors constructing a [`crate::Targeter`].
#[derive(Error, Debug, PartialEq, Eq)]
pub enum TargeterError {
    /// One of `VdrAlloc`/`MaxNonVdrUsage`/`MaxNonVdrNodeUsage` was negative.
    #[error("targeter allocations must be non-negative, got {0}")]
    NegativeAllocation(String),
}

/// Convenience result type for targeter construction.
pub type Result<T> = std::result::Result<T, TargeterError>;
