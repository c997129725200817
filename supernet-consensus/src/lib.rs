//! Repeated-sampling consensus: the Snowman block-chain engine and the
//! Avalanche DAG engine, sharing a single snowball/snowflake confidence
//! primitive and per-poll sampling/bookkeeping.

mod avalanche;
mod error;
mod poll;
mod snowball;
mod snowman;

pub use avalanche::{AvalancheEngine, EngineOutput as AvalancheEngineOutput, Vertex};
pub use error::{ConsensusError, Result};
pub use poll::{poll_seed, sample_validators, PollState};
pub use snowball::{PollOutcome, SnowballTree};
pub use snowman::{EngineOutput, OutboundQuery, SnowmanEngine};
