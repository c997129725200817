//! Inbound connection acceptance: per-second and per-IP admission, then the
//! post-TLS handshake. There's no real TLS handshake to
//! run here — cryptography is externalized behind the `TlsIdentity`/
//! `BlsIdentity` traits (see `identity.rs`) — so the accept path goes
//! straight from "socket accepted" to the protocol handshake.

use {
    crate::{
        admission::AcceptThrottle,
        config::NetConfig,
        error::Result,
        handshake::run_handshake,
        identity::IdentityRegistry,
    },
    log::{debug, error, warn},
    std::{net::SocketAddr, time::Instant},
    supernet_codec::{Message, NodeId},
    tokio::{net::{TcpListener, TcpStream}, sync::mpsc},
};

/// A socket that completed the post-accept handshake successfully.
pub struct AcceptedPeer {
    /// The peer's node id, taken from its signed IP claim.
    pub node_id: NodeId,
    /// The peer's observed socket address.
    pub addr: SocketAddr,
    /// The live, handshaked TCP stream, ready for reader/writer tasks.
    pub stream: TcpStream,
}

/// Accepts inbound peer connections on a bound socket.
pub struct PeerListener {
    config: NetConfig,
}

impl PeerListener {
    /// Build a listener from the given config; nothing is bound yet.
    pub fn new(config: NetConfig) -> Self {
        Self { config }
    }

    /// Bind and start accepting connections in a background task.
    ///
    /// `local_version` is called once per accepted socket to build the
    /// `Version` reply this node sends (so the timestamp it carries stays
    /// fresh); `now_ms` likewise supplies the clock-skew check's reference
    /// time. Successfully handshaked peers are delivered on the returned
    /// channel; throttled or failed handshakes are dropped and logged.
    pub async fn start(
        self,
        local_version: impl Fn() -> Message + Send + Sync + 'static,
        now_ms: impl Fn() -> u64 + Send + Sync + 'static,
        identities: IdentityRegistry,
    ) -> Result<(SocketAddr, mpsc::Receiver<AcceptedPeer>)> {
        let listener = TcpListener::bind(self.config.bind_addr).await?;
        let local_addr = listener.local_addr()?;
        let (tx, rx) = mpsc::channel(64);
        let config = self.config;

        tokio::spawn(async move {
            let mut throttle = AcceptThrottle::new(
                config.max_accepts_per_second,
                config.recently_upgraded_cooldown,
                Instant::now(),
            );
            loop {
                let (mut stream, addr) = match listener.accept().await {
                    Ok(pair) => pair,
                    Err(e) => {
                        error!("accept error: {e}");
                        continue;
                    }
                };

                let now = Instant::now();
                if !throttle.try_admit(addr.ip(), now) {
                    debug!("rejecting accept from {addr}: throttled");
                    continue;
                }
                throttle.record_upgraded(addr.ip(), now);

                let tx = tx.clone();
                let config = config.clone();
                let identities = identities.clone();
                let version = local_version();
                let now_ms_value = now_ms();

                tokio::spawn(async move {
                    match run_handshake(&mut stream, &config, version, &identities, now_ms_value).await {
                        Ok((node_id, _)) => {
                            if tx.send(AcceptedPeer { node_id, addr, stream }).await.is_err() {
                                debug!("accepted peer {node_id} dropped: receiver gone");
                            }
                        }
                        Err(e) => {
                            warn!("inbound handshake with {addr} failed: {e}");
                        }
                    }
                });
            }
        });

        Ok((local_addr, rx))
    }
}

#[cfg(test)]
mod tests {
    use {
        super::*,
        crate::{handshake::sign_claim, identity::InMemorySigner},
        std::sync::Arc,
    };

    fn version_for(node_id: NodeId, signer: &InMemorySigner, network_id: u32) -> Message {
        let claim = sign_claim(node_id, "127.0.0.1".parse().unwrap(), 9651, 1_000, signer, signer);
        Message::Version {
            network_id,
            node_version: (1, 0, 0),
            timestamp: 1_000,
            my_ip: claim,
            uptime_pct: None,
        }
    }

    #[tokio::test]
    async fn test_accept_and_handshake_end_to_end() {
        let config = NetConfig::dev_default();
        let server_id = NodeId::from([9u8; 20]);
        let client_id = NodeId::from([8u8; 20]);
        let server_signer = InMemorySigner::new(b"server-secret".to_vec());
        let client_signer = InMemorySigner::new(b"client-secret".to_vec());

        let server_identities = IdentityRegistry::new();
        server_identities.register(client_id, Arc::new(client_signer.clone()), Arc::new(client_signer.clone()));

        let network_id = config.network_id;
        let listener = PeerListener::new(config.clone());
        let (local_addr, mut rx) = listener
            .start(
                move || version_for(server_id, &server_signer, network_id),
                || 1_000,
                server_identities,
            )
            .await
            .unwrap();

        let client_identities = IdentityRegistry::new();
        client_identities.register(server_id, Arc::new(InMemorySigner::new(b"server-secret".to_vec())), Arc::new(InMemorySigner::new(b"server-secret".to_vec())));
        let mut client_stream = TcpStream::connect(local_addr).await.unwrap();
        let client_version = version_for(client_id, &client_signer, config.network_id);

        let (accepted, client_result) = tokio::join!(
            rx.recv(),
            run_handshake(&mut client_stream, &config, client_version, &client_identities, 1_000),
        );

        let accepted = accepted.expect("expected a handshaked peer");
        assert_eq!(accepted.node_id, client_id);
        let (server_node_id, _) = client_result.unwrap();
        assert_eq!(server_node_id, server_id);
    }
}
