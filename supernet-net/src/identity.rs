//! Narrow signing interfaces standing in for TLS certificates and BLS keys.
//!
//! Concrete cryptography is treated as a black-box external collaborator.
//! These traits are the seam: production wiring would plug in
//! real X.509 and BLST, but the shipped implementation here is a
//! deterministic in-memory signer (hash-based, not a real signature scheme)
//! sufficient for tests and single-process multi-node simulation.

use {
    serde::{Deserialize, Serialize},
    solana_sha256_hasher::hashv,
    std::{collections::HashMap, sync::{Arc, RwLock}},
    supernet_codec::NodeId,
};

/// Signs and verifies the `(ip, port, timestamp)` triple under a node's
/// TLS identity key.
pub trait TlsIdentity: Send + Sync {
    /// Sign the given message bytes.
    fn sign(&self, message: &[u8]) -> Vec<u8>;
    /// Verify `signature` over `message` under this identity's public key.
    fn verify(&self, message: &[u8], signature: &[u8]) -> bool;
}

/// Signs and verifies the `(ip, port, timestamp)` triple under a node's BLS
/// key, the same key used for warp/attestation signing.
pub trait BlsIdentity: Send + Sync {
    /// Sign the given message bytes.
    fn sign(&self, message: &[u8]) -> Vec<u8>;
    /// Verify `signature` over `message` under this identity's public key.
    fn verify(&self, message: &[u8], signature: &[u8]) -> bool;
}

/// A deterministic, hash-based stand-in for a real signing key.
///
/// `sign(msg) = sha256(secret || msg)`; `verify` recomputes and compares.
/// Not a real signature scheme (it leaks nothing resembling unforgeability
/// under key compromise), but it is deterministic and exercises every
/// validation code path the handshake needs.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct InMemorySigner {
    secret: Vec<u8>,
}

impl InMemorySigner {
    /// Build a signer from an arbitrary secret seed.
    pub fn new(secret: impl Into<Vec<u8>>) -> Self {
        Self { secret: secret.into() }
    }

    fn digest(&self, message: &[u8]) -> Vec<u8> {
        hashv(&[&self.secret, message]).as_ref().to_vec()
    }
}

impl TlsIdentity for InMemorySigner {
    fn sign(&self, message: &[u8]) -> Vec<u8> {
        self.digest(message)
    }

    fn verify(&self, message: &[u8], signature: &[u8]) -> bool {
        self.digest(message) == signature
    }
}

impl BlsIdentity for InMemorySigner {
    fn sign(&self, message: &[u8]) -> Vec<u8> {
        self.digest(message)
    }

    fn verify(&self, message: &[u8], signature: &[u8]) -> bool {
        self.digest(message) == signature
    }
}

/// Resolves a peer's public TLS/BLS identity so an inbound handshake's
/// signatures can be checked against the node id the peer claims.
///
/// A real deployment would resolve these from the peer's TLS certificate
/// and its validator-set BLS public key; this in-memory registry stands in
/// for that lookup in the same spirit as [`InMemorySigner`] stands in for
/// the keys themselves.
#[derive(Clone, Default)]
pub struct IdentityRegistry {
    entries: Arc<RwLock<HashMap<NodeId, (Arc<dyn TlsIdentity>, Arc<dyn BlsIdentity>)>>>,
}

impl IdentityRegistry {
    /// An empty registry.
    pub fn new() -> Self {
        Self::default()
    }

    /// Register (or replace) the public identity keys for `node_id`.
    pub fn register(&self, node_id: NodeId, tls: Arc<dyn TlsIdentity>, bls: Arc<dyn BlsIdentity>) {
        if let Ok(mut entries) = self.entries.write() {
            entries.insert(node_id, (tls, bls));
        }
    }

    /// Look up the identity keys claimed for `node_id`, if known.
    pub fn resolve(&self, node_id: &NodeId) -> Option<(Arc<dyn TlsIdentity>, Arc<dyn BlsIdentity>)> {
        self.entries.read().ok().and_then(|entries| entries.get(node_id).cloned())
    }
}
