//! Bounded-rate outbound dialer: opens a TCP connection with a timeout,
//! optionally writes a proxy-protocol header, then runs the same handshake
//! path the accept loop uses.

use {
    crate::{config::NetConfig, error::{NetError, Result}, handshake::run_handshake, identity::IdentityRegistry},
    std::net::SocketAddr,
    supernet_codec::{Message, NodeId},
    tokio::{io::AsyncWriteExt, net::TcpStream},
};

/// Dials peers on behalf of the local node.
pub struct Dialer {
    config: NetConfig,
}

impl Dialer {
    /// Build a dialer from the given config.
    pub fn new(config: NetConfig) -> Self {
        Self { config }
    }

    /// Connect to `addr`, optionally sending `proxy_header` immediately
    /// after the TCP handshake, then run the protocol handshake.
    ///
    /// Bounded by `config.dial_timeout` for the TCP connect itself; the
    /// handshake afterward has its own `config.handshake_timeout`.
    pub async fn dial(
        &self,
        addr: SocketAddr,
        local_version: Message,
        identities: &IdentityRegistry,
        now_ms: u64,
        proxy_header: Option<&[u8]>,
    ) -> Result<(NodeId, TcpStream)> {
        let mut stream = tokio::time::timeout(self.config.dial_timeout, TcpStream::connect(addr))
            .await
            .map_err(|_| NetError::HandshakeTimeout)??;

        if let Some(header) = proxy_header {
            stream.write_all(header).await?;
        }

        let (node_id, _) = run_handshake(&mut stream, &self.config, local_version, identities, now_ms).await?;
        Ok((node_id, stream))
    }
}

#[cfg(test)]
mod tests {
    use {
        super::*,
        crate::{handshake::sign_claim, identity::InMemorySigner, listener::PeerListener},
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
    async fn test_dial_completes_handshake_with_listener() {
        let config = NetConfig::dev_default();
        let server_id = NodeId::from([3u8; 20]);
        let client_id = NodeId::from([4u8; 20]);
        let server_signer = InMemorySigner::new(b"server".to_vec());
        let client_signer = InMemorySigner::new(b"client".to_vec());

        let server_identities = IdentityRegistry::new();
        server_identities.register(client_id, Arc::new(client_signer.clone()), Arc::new(client_signer.clone()));

        let network_id = config.network_id;
        let listener = PeerListener::new(config.clone());
        let (local_addr, mut rx) = listener
            .start(move || version_for(server_id, &server_signer, network_id), || 1_000, server_identities)
            .await
            .unwrap();

        let client_identities = IdentityRegistry::new();
        client_identities.register(server_id, Arc::new(InMemorySigner::new(b"server".to_vec())), Arc::new(InMemorySigner::new(b"server".to_vec())));

        let dialer = Dialer::new(config.clone());
        let client_version = version_for(client_id, &client_signer, config.network_id);

        let (dial_result, accepted) = tokio::join!(
            dialer.dial(local_addr, client_version, &client_identities, 1_000, None),
            rx.recv(),
        );

        let (server_node_id, _stream) = dial_result.unwrap();
        assert_eq!(server_node_id, server_id);
        assert_eq!(accepted.unwrap().node_id, client_id);
    }

    #[tokio::test]
    async fn test_dial_to_closed_port_fails() {
        let config = NetConfig::dev_default();
        let dialer = Dialer::new(config.clone());
        let identities = IdentityRegistry::new();
        let version = version_for(NodeId::zero(), &InMemorySigner::new(b"x".to_vec()), config.network_id);
        let unreachable: SocketAddr = "127.0.0.1:1".parse().unwrap();
        let result = dialer.dial(unreachable, version, &identities, 1_000, None).await;
        assert!(result.is_err());
    }
}
