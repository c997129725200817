//! Per-supernet bootstrap-barrier tracking and the validator-only privacy
//! policy.
//!
//! A supernet groups one or more chains under a shared validator set and
//! consensus parameters. This crate owns the bookkeeping that answers "has
//! this supernet finished bootstrapping?" and "may this node connect to a
//! chain in this supernet?" — independent of how the chains themselves are
//! routed or run.

mod config;
mod tracker;

pub use config::{ConsensusParameters, SupernetConfig};
pub use tracker::{BootstrapHandle, SupernetTracker};
