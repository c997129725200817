//! Typed errors for the node binary: configuration loading/validation and
//! the top-level wiring that assembles every other crate.

use thiserror::Error;

/// Errors surfaced while loading configuration or starting the node.
///
/// A `Config` error is fatal at startup (exit code 2); every other variant
/// here maps to exit code 1.
#[derive(Error, Debug)]
pub enum NodeError {
    /// The assembled configuration failed `NodeConfig::validate`.
    #[error("configuration error: {0}")]
    Config(String),

    /// The config file at the given path could not be read or parsed.
    #[error("could not read config file {path}: {source}")]
    ConfigFile {
        /// The path that failed to load.
        path: String,
        /// The underlying I/O error.
        #[source]
        source: std::io::Error,
    },

    /// The config file's JSON did not match the expected shape.
    #[error("could not parse config file: {0}")]
    ConfigParse(#[from] serde_json::Error),

    /// A chain or supernet id failed to register (duplicate, unknown
    /// supernet, etc.) while wiring the router at startup.
    #[error("chain router setup failed: {0}")]
    Router(#[from] supernet_chain::error::ChainRouterError),

    /// Binding the peer listener's socket failed.
    #[error("network setup failed: {0}")]
    Net(#[from] supernet_net::NetError),

    /// A validator genesis entry was rejected by the validator set (zero
    /// weight, duplicate node id, overflow).
    #[error("validator genesis rejected: {0}")]
    Validators(#[from] supernet_validators::ValidatorManagerError),
}

/// Convenience result type for node-binary operations.
pub type Result<T> = std::result::Result<T, NodeError>;
