//! Typed errors for the bootstrap and state-sync engines.

use thiserror::Error;

/// Errors a bootstrap or state-sync engine can report.
#[derive(Error, Debug, PartialEq, Eq)]
pub enum BootstrapError {
    /// A reply's `request_id` doesn't match any outstanding request.
    #[error("unknown request id")]
    UnknownRequest,

    /// The validator set had no eligible beacons to sample.
    #[error("no beacons available")]
    NoBeacons,
}

/// Convenience result type for bootstrap-crate operations.
pub type Result<T> = std::result::Result<T, BootstrapError>;
