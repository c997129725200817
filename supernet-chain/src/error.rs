//! Typed errors for chain registration and routing.

use {supernet_codec::Id, thiserror::Error};

/// Errors returned by [`crate::ChainRouter`] operations.
#[derive(Error, Debug, PartialEq, Eq)]
pub enum ChainRouterError {
    /// `RegisterChain` was called for a chain id already registered.
    #[error("chain already registered: {0}")]
    DuplicateChain(Id),

    /// An operation named a chain id with no registered handler.
    #[error("unknown chain: {0}")]
    UnknownChain(Id),

    /// `RegisterRequest` was called with a `request_id` already outstanding
    /// for the same (destination node, source chain, destination chain).
    #[error("duplicate in-flight request")]
    DuplicateRequest,
}

/// Convenience result type for chain-router operations.
pub type Result<T> = std::result::Result<T, ChainRouterError>;
