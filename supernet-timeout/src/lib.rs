//! Adaptive request timeouts, the per-chain benchlist, and resource targeters.

mod adaptive;
mod benchlist;
mod error;
mod targeter;

pub use adaptive::{AdaptiveTimeoutManager, TimeoutConfig};
pub use benchlist::{max_benchable_portion, Benchlist, BenchlistConfig};
pub use error::{Result, TargeterError};
pub use targeter::{Targeter, TargeterConfig};
