//! Node-wide configuration: command-line flags, an optional JSON file, and
//! `Default`-seeded fallbacks, assembled into a single configuration object
//! in that increasing order of precedence. Validation errors are fatal at
//! startup.
//!
//! Mirrors a familiar `ConsensusNetConfig`/`BftConfig` idiom: a plain struct
//! with a `Default` impl for sane out-of-the-box values and a `validate()`
//! method returning a typed error.

use {
    crate::error::{NodeError, Result},
    serde::Deserialize,
    std::{net::SocketAddr, path::PathBuf, time::Duration},
    supernet_codec::{Id, NodeId},
    supernet_supernet::ConsensusParameters,
    supernet_timeout::{BenchlistConfig, TimeoutConfig},
};

/// Which VM a chain runs: a linear block chain (Snowman) or a DAG
/// (Avalanche).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum VmKind {
    /// Snowman: linear block chain.
    Block,
    /// Avalanche: DAG of vertices.
    Dag,
}

/// One chain this node runs, belonging to exactly one supernet for its
/// entire lifetime.
#[derive(Debug, Clone)]
pub struct ChainEntry {
    /// The chain's id.
    pub chain_id: Id,
    /// The supernet it belongs to.
    pub supernet_id: Id,
    /// Which engine family it runs.
    pub vm_kind: VmKind,
}

/// A validator genesis entry: the node-id/weight pairs a supernet's
/// `ValidatorSet` is seeded with at startup, from the current chain-state
/// snapshot. BLS public keys are left unset here; this node's demo identity
/// layer has no real warp-signing wiring, treating BLS cryptography as a
/// black-box external collaborator.
#[derive(Debug, Clone)]
pub struct ValidatorGenesisEntry {
    /// The validator's node id.
    pub node_id: NodeId,
    /// Its initial stake weight. Must be non-zero.
    pub weight: u64,
}

/// Per-supernet configuration this node participates in.
#[derive(Debug, Clone)]
pub struct SupernetEntry {
    /// The supernet's id.
    pub supernet_id: Id,
    /// Consensus parameters shared by every chain in this supernet.
    pub consensus: ConsensusParameters,
    /// Genesis validator set for this supernet.
    pub validators: Vec<ValidatorGenesisEntry>,
}

/// A peer to dial at startup, used as both a transport bootstrap contact
/// and a consensus/bootstrap beacon candidate.
#[derive(Debug, Clone)]
pub struct BootstrapPeer {
    /// The peer's expected node id (verified by the handshake).
    pub node_id: NodeId,
    /// Where to dial it.
    pub addr: SocketAddr,
}

/// Top-level node configuration, assembled from defaults, an optional JSON
/// file, and CLI flags (in that increasing order of precedence).
#[derive(Debug, Clone)]
pub struct NodeConfig {
    /// Root directory for this node's persistent state (TLS/BLS key
    /// material, plugin binaries, the database). The demo identity/VM
    /// layers in this binary don't yet read or write under it, but config
    /// validation and logging treat it as the node's home directory.
    pub node_root: PathBuf,
    /// Seed for this node's in-memory TLS/BLS signer
    /// (`supernet_net::InMemorySigner`); the node id is derived from it.
    pub signer_secret: Vec<u8>,
    /// Address to bind the peer listener on.
    pub bind_addr: SocketAddr,
    /// Network id peers must match to be accepted.
    pub network_id: u32,
    /// Maximum time allowed for the post-TLS handshake.
    pub handshake_timeout: Duration,
    /// Maximum allowed difference between a peer's claimed clock and ours.
    pub max_clock_difference: Duration,
    /// Maximum frame size, post-decompression.
    pub max_frame_size: usize,
    /// Interval between liveness pings.
    pub ping_frequency: Duration,
    /// How long to wait for a pong before disconnecting.
    pub pong_timeout: Duration,
    /// Capacity of each chain handler's per-priority inbound queue.
    pub handler_queue_capacity: usize,
    /// Worker pool size per chain handler.
    pub handler_worker_pool_size: usize,
    /// The shared adaptive-timeout estimator's tuning.
    pub timeout: TimeoutConfig,
    /// The per-chain benchlist's tuning.
    pub benchlist: BenchlistConfig,
    /// Chains this node runs.
    pub chains: Vec<ChainEntry>,
    /// Supernets this node participates in (must cover every chain's
    /// `supernet_id` in `chains`).
    pub supernets: Vec<SupernetEntry>,
    /// Peers dialed at startup.
    pub bootstrap_peers: Vec<BootstrapPeer>,
}

impl Default for NodeConfig {
    fn default() -> Self {
        let net = supernet_net::NetConfig::default();
        let genesis_supernet = Id::zero();
        let genesis_chain = Id::from([1u8; 32]);
        Self {
            node_root: PathBuf::from("./supernet-data"),
            signer_secret: b"insecure-default-dev-secret".to_vec(),
            bind_addr: net.bind_addr,
            network_id: net.network_id,
            handshake_timeout: net.handshake_timeout,
            max_clock_difference: net.max_clock_difference,
            max_frame_size: net.max_frame_size,
            ping_frequency: net.ping_frequency,
            pong_timeout: net.pong_timeout,
            handler_queue_capacity: 1_024,
            handler_worker_pool_size: 2,
            timeout: TimeoutConfig::default(),
            benchlist: BenchlistConfig::default(),
            chains: vec![ChainEntry { chain_id: genesis_chain, supernet_id: genesis_supernet, vm_kind: VmKind::Block }],
            supernets: vec![SupernetEntry {
                supernet_id: genesis_supernet,
                consensus: ConsensusParameters::default(),
                validators: Vec::new(),
            }],
            bootstrap_peers: Vec::new(),
        }
    }
}

/// JSON-file shape for [`NodeConfig`]; every field optional so a file only
/// needs to override what it cares about. Hex strings decode to `Id`/
/// `NodeId`; everything else is a plain JSON scalar.
#[derive(Debug, Default, Deserialize)]
#[serde(rename_all = "snake_case")]
struct ConfigFile {
    node_root: Option<PathBuf>,
    signer_secret: Option<String>,
    bind_addr: Option<SocketAddr>,
    network_id: Option<u32>,
    handshake_timeout_ms: Option<u64>,
    max_clock_difference_ms: Option<u64>,
    max_frame_size: Option<usize>,
    ping_frequency_ms: Option<u64>,
    pong_timeout_ms: Option<u64>,
    handler_queue_capacity: Option<usize>,
    handler_worker_pool_size: Option<usize>,
    chains: Option<Vec<ChainEntryFile>>,
    supernets: Option<Vec<SupernetEntryFile>>,
    bootstrap_peers: Option<Vec<BootstrapPeerFile>>,
}

#[derive(Debug, Deserialize)]
struct ChainEntryFile {
    chain_id: String,
    supernet_id: String,
    vm_kind: VmKind,
}

#[derive(Debug, Deserialize)]
struct ValidatorGenesisFile {
    node_id: String,
    weight: u64,
}

#[derive(Debug, Deserialize)]
struct SupernetEntryFile {
    supernet_id: String,
    #[serde(default)]
    k: Option<u32>,
    #[serde(default)]
    alpha_preference: Option<u32>,
    #[serde(default)]
    alpha_confidence: Option<u32>,
    #[serde(default)]
    beta: Option<u32>,
    #[serde(default)]
    validators: Vec<ValidatorGenesisFile>,
}

#[derive(Debug, Deserialize)]
struct BootstrapPeerFile {
    node_id: String,
    addr: SocketAddr,
}

fn parse_id(hex: &str) -> Result<Id> {
    decode_hex(hex).and_then(|bytes| Id::from_slice(&bytes).map_err(|e| NodeError::Config(e.to_string())))
}

fn parse_node_id(hex: &str) -> Result<NodeId> {
    decode_hex(hex).and_then(|bytes| NodeId::from_slice(&bytes).map_err(|e| NodeError::Config(e.to_string())))
}

fn decode_hex(hex: &str) -> Result<Vec<u8>> {
    if hex.len() % 2 != 0 {
        return Err(NodeError::Config(format!("odd-length hex string: {hex}")));
    }
    (0..hex.len())
        .step_by(2)
        .map(|i| u8::from_str_radix(&hex[i..i + 2], 16).map_err(|_| NodeError::Config(format!("invalid hex byte in {hex}"))))
        .collect()
}

impl NodeConfig {
    /// Load a `NodeConfig` by merging the built-in defaults, an optional
    /// JSON file, and command-line flags, in that precedence order.
    pub fn load(file_path: Option<&std::path::Path>, matches: &clap::ArgMatches) -> Result<Self> {
        let mut config = Self::default();
        if let Some(path) = file_path {
            config.apply_file(path)?;
        }
        config.apply_cli(matches);
        Ok(config)
    }

    fn apply_file(&mut self, path: &std::path::Path) -> Result<()> {
        let text = std::fs::read_to_string(path).map_err(|source| NodeError::ConfigFile { path: path.display().to_string(), source })?;
        let file: ConfigFile = serde_json::from_str(&text)?;

        if let Some(v) = file.node_root {
            self.node_root = v;
        }
        if let Some(v) = file.signer_secret {
            self.signer_secret = v.into_bytes();
        }
        if let Some(v) = file.bind_addr {
            self.bind_addr = v;
        }
        if let Some(v) = file.network_id {
            self.network_id = v;
        }
        if let Some(v) = file.handshake_timeout_ms {
            self.handshake_timeout = Duration::from_millis(v);
        }
        if let Some(v) = file.max_clock_difference_ms {
            self.max_clock_difference = Duration::from_millis(v);
        }
        if let Some(v) = file.max_frame_size {
            self.max_frame_size = v;
        }
        if let Some(v) = file.ping_frequency_ms {
            self.ping_frequency = Duration::from_millis(v);
        }
        if let Some(v) = file.pong_timeout_ms {
            self.pong_timeout = Duration::from_millis(v);
        }
        if let Some(v) = file.handler_queue_capacity {
            self.handler_queue_capacity = v;
        }
        if let Some(v) = file.handler_worker_pool_size {
            self.handler_worker_pool_size = v;
        }
        if let Some(chains) = file.chains {
            let mut entries = Vec::with_capacity(chains.len());
            for c in chains {
                entries.push(ChainEntry {
                    chain_id: parse_id(&c.chain_id)?,
                    supernet_id: parse_id(&c.supernet_id)?,
                    vm_kind: c.vm_kind,
                });
            }
            self.chains = entries;
        }
        if let Some(supernets) = file.supernets {
            let mut entries = Vec::with_capacity(supernets.len());
            for s in supernets {
                let mut consensus = ConsensusParameters::default();
                if let Some(k) = s.k {
                    consensus.k = k;
                }
                if let Some(v) = s.alpha_preference {
                    consensus.alpha_preference = v;
                }
                if let Some(v) = s.alpha_confidence {
                    consensus.alpha_confidence = v;
                }
                if let Some(v) = s.beta {
                    consensus.beta = v;
                }
                let mut validators = Vec::with_capacity(s.validators.len());
                for v in s.validators {
                    validators.push(ValidatorGenesisEntry { node_id: parse_node_id(&v.node_id)?, weight: v.weight });
                }
                entries.push(SupernetEntry { supernet_id: parse_id(&s.supernet_id)?, consensus, validators });
            }
            self.supernets = entries;
        }
        if let Some(peers) = file.bootstrap_peers {
            let mut entries = Vec::with_capacity(peers.len());
            for p in peers {
                entries.push(BootstrapPeer { node_id: parse_node_id(&p.node_id)?, addr: p.addr });
            }
            self.bootstrap_peers = entries;
        }
        Ok(())
    }

    fn apply_cli(&mut self, matches: &clap::ArgMatches) {
        if let Some(v) = matches.value_of("bind-addr") {
            if let Ok(addr) = v.parse() {
                self.bind_addr = addr;
            }
        }
        if let Some(v) = matches.value_of("network-id") {
            if let Ok(id) = v.parse() {
                self.network_id = id;
            }
        }
        if let Some(v) = matches.value_of("node-root") {
            self.node_root = PathBuf::from(v);
        }
        if let Some(v) = matches.value_of("signer-secret") {
            self.signer_secret = v.as_bytes().to_vec();
        }
    }

    /// The local node's id, a hash of the cert leaf — this demo identity
    /// layer hashes the dev signer's secret in its place.
    pub fn local_node_id(&self) -> NodeId {
        let digest = solana_sha256_hasher::hashv(&[b"node-id", &self.signer_secret]);
        NodeId::from_slice(&digest.as_ref()[0..NodeId::LEN]).expect("hash truncates to exactly NodeId::LEN bytes")
    }

    /// `true` iff every chain's `supernet_id` has a matching entry in
    /// `supernets`, every supernet's consensus parameters are internally
    /// consistent, every genesis validator has non-zero weight, and
    /// `pong_timeout` exceeds `ping_frequency`.
    pub fn validate(&self) -> Result<()> {
        if self.pong_timeout <= self.ping_frequency {
            return Err(NodeError::Config("pong_timeout must exceed ping_frequency".into()));
        }
        if self.chains.is_empty() {
            return Err(NodeError::Config("node must run at least one chain".into()));
        }
        for chain in &self.chains {
            if !self.supernets.iter().any(|s| s.supernet_id == chain.supernet_id) {
                return Err(NodeError::Config(format!("chain {} names unconfigured supernet {}", chain.chain_id, chain.supernet_id)));
            }
        }
        let mut seen_chains = std::collections::HashSet::new();
        for chain in &self.chains {
            if !seen_chains.insert(chain.chain_id) {
                return Err(NodeError::Config(format!("duplicate chain id {}", chain.chain_id)));
            }
        }
        for supernet in &self.supernets {
            if !supernet.consensus.is_valid() {
                return Err(NodeError::Config(format!("supernet {} has invalid consensus parameters", supernet.supernet_id)));
            }
            for validator in &supernet.validators {
                if validator.weight == 0 {
                    return Err(NodeError::Config(format!("supernet {} genesis validator {} has zero weight", supernet.supernet_id, validator.node_id)));
                }
            }
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_config_validates() {
        assert!(NodeConfig::default().validate().is_ok());
    }

    #[test]
    fn test_pong_timeout_must_exceed_ping_frequency() {
        let mut config = NodeConfig::default();
        config.pong_timeout = config.ping_frequency;
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_chain_naming_unconfigured_supernet_rejected() {
        let mut config = NodeConfig::default();
        config.chains.push(ChainEntry { chain_id: Id::from([9u8; 32]), supernet_id: Id::from([8u8; 32]), vm_kind: VmKind::Dag });
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_duplicate_chain_id_rejected() {
        let mut config = NodeConfig::default();
        let duplicate = config.chains[0].clone();
        config.chains.push(duplicate);
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_zero_weight_genesis_validator_rejected() {
        let mut config = NodeConfig::default();
        config.supernets[0].validators.push(ValidatorGenesisEntry { node_id: NodeId::zero(), weight: 0 });
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_local_node_id_is_deterministic() {
        let a = NodeConfig { signer_secret: b"alice".to_vec(), ..NodeConfig::default() };
        let b = NodeConfig { signer_secret: b"alice".to_vec(), ..NodeConfig::default() };
        let c = NodeConfig { signer_secret: b"bob".to_vec(), ..NodeConfig::default() };
        assert_eq!(a.local_node_id(), b.local_node_id());
        assert_ne!(a.local_node_id(), c.local_node_id());
    }

    #[test]
    fn test_config_file_overrides_defaults() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("node.json");
        std::fs::write(
            &path,
            r#"{
                "network_id": 7,
                "bootstrap_peers": [
                    {"node_id": "0102030405060708090a0b0c0d0e0f1011121314", "addr": "127.0.0.1:9000"}
                ]
            }"#,
        )
        .unwrap();

        let mut config = NodeConfig::default();
        config.apply_file(&path).unwrap();
        assert_eq!(config.network_id, 7);
        assert_eq!(config.bootstrap_peers.len(), 1);
        assert_eq!(config.bootstrap_peers[0].addr.to_string(), "127.0.0.1:9000");
    }
}
