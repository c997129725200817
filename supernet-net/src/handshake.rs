//! `Version` message construction and validation for the post-TLS handshake.

use {
    crate::{
        config::NetConfig,
        error::{NetError, Result},
        identity::{BlsIdentity, IdentityRegistry, TlsIdentity},
        io::{read_message, write_message},
    },
    supernet_codec::{Compression, Message, NodeId, SignedPeerIp},
    tokio::io::{AsyncRead, AsyncWrite},
};

/// Build the bytes covered by both the TLS and BLS signatures over a
/// claimed address: `ip || port (be) || timestamp (be)`.
fn signed_payload(ip: std::net::IpAddr, port: u16, timestamp: u64) -> Vec<u8> {
    let mut buf = Vec::with_capacity(19);
    match ip {
        std::net::IpAddr::V4(v4) => buf.extend_from_slice(&v4.octets()),
        std::net::IpAddr::V6(v6) => buf.extend_from_slice(&v6.octets()),
    }
    buf.extend_from_slice(&port.to_be_bytes());
    buf.extend_from_slice(&timestamp.to_be_bytes());
    buf
}

/// Sign a fresh `SignedPeerIp` claim for the local node.
pub fn sign_claim(
    node_id: supernet_codec::NodeId,
    ip: std::net::IpAddr,
    port: u16,
    timestamp: u64,
    tls: &dyn TlsIdentity,
    bls: &dyn BlsIdentity,
) -> SignedPeerIp {
    let payload = signed_payload(ip, port, timestamp);
    SignedPeerIp {
        node_id,
        ip,
        port,
        timestamp,
        tls_signature: tls.sign(&payload),
        bls_signature: bls.sign(&payload),
    }
}

/// Verify both signatures on a claimed address.
fn verify_claim(claim: &SignedPeerIp, tls: &dyn TlsIdentity, bls: &dyn BlsIdentity) -> Result<()> {
    let payload = signed_payload(claim.ip, claim.port, claim.timestamp);
    if !tls.verify(&payload, &claim.tls_signature) {
        return Err(NetError::BadSignature("tls"));
    }
    if !bls.verify(&payload, &claim.bls_signature) {
        return Err(NetError::BadSignature("bls"));
    }
    Ok(())
}

/// Validate an inbound `Version` message against local configuration and
/// the peer's claimed identity keys.
///
/// Checks, in order: network id, version compatibility, clock skew, then
/// both signatures.
pub fn validate_version(
    config: &NetConfig,
    local_now_ms: u64,
    peer_tls: &dyn TlsIdentity,
    peer_bls: &dyn BlsIdentity,
    msg: &Message,
) -> Result<()> {
    let Message::Version {
        network_id,
        node_version,
        timestamp,
        my_ip,
        ..
    } = msg
    else {
        return Err(NetError::BadSignature("not a version message"));
    };

    if *network_id != config.network_id {
        return Err(NetError::NetworkIdMismatch {
            expected: config.network_id,
            got: *network_id,
        });
    }
    if *node_version < config.minimum_compatible_version {
        return Err(NetError::IncompatibleVersion(*node_version));
    }

    let diff_ms = local_now_ms.abs_diff(*timestamp);
    if diff_ms > config.max_clock_difference.as_millis() as u64 {
        return Err(NetError::ClockSkew {
            claimed: *timestamp,
            local: local_now_ms,
            max_diff_ms: config.max_clock_difference.as_millis() as u64,
        });
    }

    verify_claim(my_ip, peer_tls, peer_bls)
}

/// Run the symmetric post-TLS handshake over an already-connected duplex
/// stream: send our own `Version`, read the peer's, and validate it. Both
/// sides run this function the same way — the direction of the underlying
/// TCP connect/accept doesn't change the protocol.
///
/// Bounded by `config.handshake_timeout`; returns the peer's node id (read
/// out of its signed IP claim) and its full `Version` message on success.
pub async fn run_handshake<S>(
    stream: &mut S,
    config: &NetConfig,
    local_version: Message,
    identities: &IdentityRegistry,
    local_now_ms: u64,
) -> Result<(NodeId, Message)>
where
    S: AsyncRead + AsyncWrite + Unpin,
{
    let outcome = tokio::time::timeout(config.handshake_timeout, async {
        write_message(stream, &local_version, Compression::None, config.max_frame_size).await?;
        let peer_version = read_message(stream, config.max_frame_size).await?;

        let node_id = match &peer_version {
            Message::Version { my_ip, .. } => my_ip.node_id,
            _ => return Err(NetError::BadSignature("first message was not Version")),
        };
        let (tls, bls) = identities
            .resolve(&node_id)
            .ok_or(NetError::BadSignature("unknown peer identity"))?;
        validate_version(config, local_now_ms, tls.as_ref(), bls.as_ref(), &peer_version)?;
        Ok((node_id, peer_version))
    })
    .await;

    match outcome {
        Ok(result) => result,
        Err(_) => Err(NetError::HandshakeTimeout),
    }
}

#[cfg(test)]
mod tests {
    use {super::*, crate::identity::InMemorySigner, supernet_codec::NodeId};

    fn version_msg(network_id: u32, node_version: (u16, u16, u16), timestamp: u64, claim: SignedPeerIp) -> Message {
        Message::Version {
            network_id,
            node_version,
            timestamp,
            my_ip: claim,
            uptime_pct: Some(100),
        }
    }

    #[test]
    fn test_valid_handshake_accepted() {
        let config = NetConfig::dev_default();
        let tls = InMemorySigner::new(b"tls-secret".to_vec());
        let bls = InMemorySigner::new(b"bls-secret".to_vec());
        let claim = sign_claim(
            NodeId::zero(),
            "127.0.0.1".parse().unwrap(),
            9651,
            1_000,
            &tls,
            &bls,
        );
        let msg = version_msg(config.network_id, config.node_version, 1_000, claim);
        assert!(validate_version(&config, 1_000, &tls, &bls, &msg).is_ok());
    }

    #[test]
    fn test_network_id_mismatch_rejected() {
        let config = NetConfig::dev_default();
        let tls = InMemorySigner::new(b"tls-secret".to_vec());
        let bls = InMemorySigner::new(b"bls-secret".to_vec());
        let claim = sign_claim(NodeId::zero(), "127.0.0.1".parse().unwrap(), 9651, 1_000, &tls, &bls);
        let msg = version_msg(config.network_id + 1, config.node_version, 1_000, claim);
        assert!(matches!(
            validate_version(&config, 1_000, &tls, &bls, &msg),
            Err(NetError::NetworkIdMismatch { .. })
        ));
    }

    #[test]
    fn test_clock_skew_rejected() {
        let config = NetConfig::dev_default();
        let tls = InMemorySigner::new(b"tls-secret".to_vec());
        let bls = InMemorySigner::new(b"bls-secret".to_vec());
        let claim = sign_claim(NodeId::zero(), "127.0.0.1".parse().unwrap(), 9651, 1_000, &tls, &bls);
        let msg = version_msg(config.network_id, config.node_version, 1_000, claim);
        let far_future = 1_000 + config.max_clock_difference.as_millis() as u64 + 1;
        assert!(matches!(
            validate_version(&config, far_future, &tls, &bls, &msg),
            Err(NetError::ClockSkew { .. })
        ));
    }

    #[test]
    fn test_bad_signature_rejected() {
        let config = NetConfig::dev_default();
        let tls = InMemorySigner::new(b"tls-secret".to_vec());
        let bls = InMemorySigner::new(b"bls-secret".to_vec());
        let other_tls = InMemorySigner::new(b"different-secret".to_vec());
        let claim = sign_claim(NodeId::zero(), "127.0.0.1".parse().unwrap(), 9651, 1_000, &other_tls, &bls);
        let msg = version_msg(config.network_id, config.node_version, 1_000, claim);
        assert!(matches!(
            validate_version(&config, 1_000, &tls, &bls, &msg),
            Err(NetError::BadSignature(_))
        ));
    }

    fn node_version(config: &NetConfig, node_id: NodeId, tls: &InMemorySigner, bls: &InMemorySigner) -> Message {
        let claim = sign_claim(node_id, "127.0.0.1".parse().unwrap(), 9651, 1_000, tls, bls);
        version_msg(config.network_id, config.node_version, 1_000, claim)
    }

    #[tokio::test]
    async fn test_run_handshake_succeeds_both_directions() {
        let config = NetConfig::dev_default();
        let (mut a_stream, mut b_stream) = tokio::io::duplex(4096);

        let a_id = NodeId::from([1u8; 20]);
        let b_id = NodeId::from([2u8; 20]);
        let a_tls = InMemorySigner::new(b"a-tls".to_vec());
        let a_bls = InMemorySigner::new(b"a-bls".to_vec());
        let b_tls = InMemorySigner::new(b"b-tls".to_vec());
        let b_bls = InMemorySigner::new(b"b-bls".to_vec());

        let registry_a = IdentityRegistry::new();
        registry_a.register(b_id, std::sync::Arc::new(b_tls.clone()), std::sync::Arc::new(b_bls.clone()));
        let registry_b = IdentityRegistry::new();
        registry_b.register(a_id, std::sync::Arc::new(a_tls.clone()), std::sync::Arc::new(a_bls.clone()));

        let a_version = node_version(&config, a_id, &a_tls, &a_bls);
        let b_version = node_version(&config, b_id, &b_tls, &b_bls);

        let config_a = config.clone();
        let side_a = tokio::spawn(async move {
            run_handshake(&mut a_stream, &config_a, a_version, &registry_a, 1_000).await
        });
        let side_b = tokio::spawn(async move {
            run_handshake(&mut b_stream, &config, b_version, &registry_b, 1_000).await
        });

        let (result_a, result_b) = tokio::join!(side_a, side_b);
        let (node_id_from_a, _) = result_a.unwrap().unwrap();
        let (node_id_from_b, _) = result_b.unwrap().unwrap();
        assert_eq!(node_id_from_a, b_id);
        assert_eq!(node_id_from_b, a_id);
    }

    #[tokio::test]
    async fn test_run_handshake_rejects_unknown_peer_identity() {
        let config = NetConfig::dev_default();
        let (mut a_stream, mut b_stream) = tokio::io::duplex(4096);

        let a_id = NodeId::from([1u8; 20]);
        let b_id = NodeId::from([2u8; 20]);
        let a_tls = InMemorySigner::new(b"a-tls".to_vec());
        let a_bls = InMemorySigner::new(b"a-bls".to_vec());
        let b_tls = InMemorySigner::new(b"b-tls".to_vec());
        let b_bls = InMemorySigner::new(b"b-bls".to_vec());

        // `a` never registers `b`'s identity, so it can't validate `b`'s claim.
        let registry_a = IdentityRegistry::new();
        let registry_b = IdentityRegistry::new();
        registry_b.register(a_id, std::sync::Arc::new(a_tls.clone()), std::sync::Arc::new(a_bls.clone()));

        let a_version = node_version(&config, a_id, &a_tls, &a_bls);
        let b_version = node_version(&config, b_id, &b_tls, &b_bls);

        let config_a = config.clone();
        let side_a = tokio::spawn(async move {
            run_handshake(&mut a_stream, &config_a, a_version, &registry_a, 1_000).await
        });
        let side_b = tokio::spawn(async move {
            run_handshake(&mut b_stream, &config, b_version, &registry_b, 1_000).await
        });

        let (result_a, _result_b) = tokio::join!(side_a, side_b);
        assert!(result_a.unwrap().is_err());
    }
}
