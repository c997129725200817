//! Error types for the consensus engine.

use thiserror::Error;

/// Errors raised while driving a [`crate::SnowmanEngine`].
#[derive(Error, Debug, PartialEq, Eq)]
pub enum ConsensusError {
    /// An item was added whose parent is not already known.
    #[error("unknown parent for new item")]
    UnknownParent,
    /// A poll response named an item this engine never added.
    #[error("unknown item in poll response")]
    UnknownItem,
    /// The processing backlog exceeds `max_outstanding_items`; the VM must
    /// stop producing new items until it drains.
    #[error("processing backlog exceeds max outstanding items")]
    Backpressured,
}

/// Convenience result type for consensus operations.
pub type Result<T> = std::result::Result<T, ConsensusError>;
