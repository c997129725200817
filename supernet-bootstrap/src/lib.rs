//! Bootstrapper and state-syncer finite state machines.

pub mod bootstrapper;
pub mod error;
pub mod state_syncer;

pub use bootstrapper::{
    BootstrapConfig, BootstrapOutput, BootstrapStage, Bootstrapper, OutboundRequest as BootstrapRequest, SharedVm,
};
pub use error::{BootstrapError, Result};
pub use state_syncer::{
    OutboundRequest as StateSyncRequest, StateSyncConfig, StateSyncOutcome, StateSyncOutput, StateSyncer,
};
