//! Wires every subsystem crate into one running node: transport, chain
//! router/handlers, consensus/bootstrap engine stacks, validators, uptime,
//! and supernet bootstrap tracking.
//!
//! Grounded on `core/src/validator.rs`'s top-level `Validator` struct: one
//! object owning every subsystem's `Arc`, a `new()` that wires them together
//! from config, and a `run()` that drives the node's background tasks until
//! shutdown.

pub mod adapter;
pub mod config;
pub mod error;
pub mod vm;

use {
    adapter::{AvalancheAdapter, BootstrapperAdapter, ContainerCache, SharedVm, SnowmanAdapter, StateSyncerAdapter},
    config::{NodeConfig, VmKind},
    error::{NodeError, Result},
    log::{debug, info, warn},
    std::{
        collections::HashMap,
        net::SocketAddr,
        sync::Arc,
        time::{Duration, Instant, SystemTime},
    },
    supernet_bootstrap::{Bootstrapper, BootstrapConfig, StateSyncConfig, StateSyncer},
    supernet_chain::{ChainRouter, ChainState, EngineSlot, Handler, OutboundSink},
    supernet_codec::{Message, NodeId},
    supernet_consensus::{AvalancheEngine, SnowmanEngine},
    supernet_monitoring::SupernetMetrics,
    supernet_net::{
        spawn_peer_io, CancelToken, Dialer, IdentityRegistry, InMemorySigner, InboundEnvelope, OutboundQueue,
        PeerConnection, PeerListener, PeerState, PeerTable,
    },
    supernet_supernet::SupernetTracker,
    supernet_timeout::Benchlist,
    supernet_uptime::UptimeTracker,
    supernet_validators::{ValidatorManager, ValidatorSet},
    tokio::sync::Mutex as AsyncMutex,
    vm::{DemoBlockVm, DemoVertexVm},
};

/// Bridges a [`ChainRouter`]'s handler output into peer send queues, so
/// `supernet-chain` never has to depend on `supernet-net` directly, keeping
/// the crate graph acyclic.
struct PeerSink {
    peers: Arc<parking_lot::Mutex<PeerTable>>,
}

impl OutboundSink for PeerSink {
    fn send(&self, to: NodeId, message: Message) {
        let queue = {
            let peers = self.peers.lock();
            peers.get(&to).map(|p| p.queue.clone())
        };
        if let Some(queue) = queue {
            tokio::spawn(async move {
                queue.push(message, CancelToken::never()).await;
            });
        }
    }
}

/// One running node: the peer table, every chain's handler, and the shared
/// validator/uptime/supernet/metrics state they all read from.
pub struct Node {
    config: NodeConfig,
    local_node_id: NodeId,
    identities: IdentityRegistry,
    peers: Arc<parking_lot::Mutex<PeerTable>>,
    router: Arc<ChainRouter>,
    validator_manager: Arc<parking_lot::Mutex<ValidatorManager>>,
    uptime: Arc<parking_lot::Mutex<UptimeTracker>>,
    supernet_trackers: HashMap<supernet_codec::Id, Arc<parking_lot::Mutex<SupernetTracker>>>,
    metrics: Arc<SupernetMetrics>,
}

fn build_stack(
    chain_id: supernet_codec::Id,
    supernet_id: supernet_codec::Id,
    vm_kind: VmKind,
    config: &NodeConfig,
    validators: ValidatorSet,
    tracker: Arc<parking_lot::Mutex<SupernetTracker>>,
) -> Vec<EngineSlot> {
    let consensus_params = config
        .supernets
        .iter()
        .find(|s| s.supernet_id == supernet_id)
        .map(|s| s.consensus)
        .unwrap_or_default();

    let genesis = supernet_codec::Id::from([0u8; 32]);
    let vm: SharedVm = match vm_kind {
        VmKind::Block => Arc::new(parking_lot::Mutex::new(DemoBlockVm::new(genesis))),
        VmKind::Dag => Arc::new(parking_lot::Mutex::new(DemoVertexVm::new(genesis))),
    };
    let cache = ContainerCache::new();

    let state_syncer = StateSyncer::new(chain_id, StateSyncConfig::default(), Arc::clone(&vm));
    let state_sync_slot = EngineSlot::new(
        ChainState::StateSyncing,
        Box::new(StateSyncerAdapter::new(state_syncer, Arc::clone(&vm), cache.clone(), validators.clone())),
    );

    let bootstrapper = Bootstrapper::new(chain_id, BootstrapConfig::default(), Arc::clone(&vm), tracker);
    let bootstrap_slot = EngineSlot::new(
        ChainState::Bootstrapping,
        Box::new(BootstrapperAdapter::new(bootstrapper, Arc::clone(&vm), cache.clone(), validators.clone())),
    );

    let consensus_slot = match vm_kind {
        VmKind::Block => {
            let benchlist = Benchlist::new(config.benchlist);
            let engine = SnowmanEngine::new(chain_id, genesis, consensus_params, validators, benchlist);
            EngineSlot::new(
                ChainState::NormalOp,
                Box::new(SnowmanAdapter::new(engine, Arc::clone(&vm), cache, consensus_params.concurrent_repolls)),
            )
        }
        VmKind::Dag => {
            let benchlist = Benchlist::new(config.benchlist);
            let engine = AvalancheEngine::new(chain_id, consensus_params, validators, benchlist);
            EngineSlot::new(ChainState::NormalOp, Box::new(AvalancheAdapter::new(engine, Arc::clone(&vm), cache)))
        }
    };

    vec![state_sync_slot, bootstrap_slot, consensus_slot]
}

impl Node {
    /// Build a node from `config`: validator sets, supernet trackers, and
    /// every configured chain's handler (started, but not yet reachable
    /// from the network until [`Node::run`] binds the listener).
    pub fn new(config: NodeConfig) -> Result<Arc<Self>> {
        let local_node_id = config.local_node_id();
        let signer = Arc::new(InMemorySigner::new(config.signer_secret.clone()));
        let identities = IdentityRegistry::new();
        identities.register(local_node_id, signer.clone(), signer.clone());

        let mut validator_manager = ValidatorManager::new();
        let mut supernet_trackers = HashMap::new();
        let mut chain_validator_sets = HashMap::new();

        for supernet in &config.supernets {
            for validator in &supernet.validators {
                validator_manager.add_staker(
                    supernet.supernet_id,
                    validator.node_id,
                    None,
                    supernet_codec::Id::zero(),
                    validator.weight,
                )?;
            }
            let mut set = ValidatorSet::new();
            for validator in &supernet.validators {
                set.add_staker(validator.node_id, None, supernet_codec::Id::zero(), validator.weight)?;
            }
            chain_validator_sets.insert(supernet.supernet_id, set);
            supernet_trackers.insert(supernet.supernet_id, Arc::new(parking_lot::Mutex::new(SupernetTracker::new())));
        }

        let router = Arc::new(ChainRouter::new(config.timeout));
        let peers = Arc::new(parking_lot::Mutex::new(PeerTable::new()));
        let outbound: Arc<dyn OutboundSink> = Arc::new(PeerSink { peers: Arc::clone(&peers) });

        for chain in &config.chains {
            let tracker = supernet_trackers
                .entry(chain.supernet_id)
                .or_insert_with(|| Arc::new(parking_lot::Mutex::new(SupernetTracker::new())))
                .clone();
            tracker.lock().add_chain(chain.chain_id);

            let validators = chain_validator_sets.get(&chain.supernet_id).cloned().unwrap_or_default();
            let stack = build_stack(chain.chain_id, chain.supernet_id, chain.vm_kind, &config, validators, Arc::clone(&tracker));
            let handler = Handler::new(chain.chain_id, chain.supernet_id, stack, config.handler_queue_capacity, Arc::clone(&outbound), None);
            handler.start(Instant::now());
            handler.spawn_workers(config.handler_worker_pool_size);
            router.register_chain(chain.chain_id, chain.supernet_id, handler)?;
        }

        Ok(Arc::new(Self {
            config,
            local_node_id,
            identities,
            peers,
            router,
            validator_manager: Arc::new(parking_lot::Mutex::new(validator_manager)),
            uptime: Arc::new(parking_lot::Mutex::new(UptimeTracker::new())),
            supernet_trackers,
            metrics: Arc::new(SupernetMetrics::new()),
        }))
    }

    /// This node's own identity, derived from its signer secret.
    pub fn local_node_id(&self) -> NodeId {
        self.local_node_id
    }

    /// The node's metric set, for an HTTP scrape endpoint to expose. The
    /// HTTP surface itself is out of scope for this crate.
    pub fn metrics(&self) -> Arc<SupernetMetrics> {
        Arc::clone(&self.metrics)
    }

    fn local_version(&self, now_ms: u64) -> Message {
        let (tls, bls) = self
            .identities
            .resolve(&self.local_node_id)
            .expect("local identity was registered in Node::new");
        let claim = supernet_net::sign_claim(
            self.local_node_id,
            self.config.bind_addr.ip(),
            self.config.bind_addr.port(),
            now_ms,
            tls.as_ref(),
            bls.as_ref(),
        );
        Message::Version {
            network_id: self.config.network_id,
            node_version: (1, 0, 0),
            timestamp: now_ms,
            my_ip: claim,
            uptime_pct: None,
        }
    }

    fn net_config(&self) -> supernet_net::NetConfig {
        supernet_net::NetConfig {
            bind_addr: self.config.bind_addr,
            network_id: self.config.network_id,
            handshake_timeout: self.config.handshake_timeout,
            max_clock_difference: self.config.max_clock_difference,
            max_frame_size: self.config.max_frame_size,
            ping_frequency: self.config.ping_frequency,
            pong_timeout: self.config.pong_timeout,
            ..supernet_net::NetConfig::default()
        }
    }

    fn accept_peer(self: &Arc<Self>, node_id: NodeId, addr: SocketAddr, stream: tokio::net::TcpStream, inbound_tx: tokio::sync::mpsc::Sender<InboundEnvelope>) {
        let queue = OutboundQueue::new(self.net_config().send_queue_capacity, None);
        let handle = queue.handle();
        let now = Instant::now();
        let is_validator = self.config.supernets.iter().any(|s| s.validators.iter().any(|v| v.node_id == node_id));

        self.peers.lock().insert(PeerConnection::new(node_id, addr, is_validator, handle, now));
        if let Some(peer) = self.peers.lock().get_mut(&node_id) {
            peer.state = PeerState::Connected;
        }

        self.uptime.lock().connect(node_id, supernet_codec::Id::zero(), SystemTime::now());
        self.metrics.peers_connected.inc();

        for supernet_id in self.supernet_trackers.keys() {
            self.router.connected(node_id, *supernet_id, now);
        }

        spawn_peer_io(stream, node_id, self.config.max_frame_size, supernet_codec::Compression::None, inbound_tx, queue);
    }

    fn drop_peer(self: &Arc<Self>, node_id: NodeId) {
        let had = self.peers.lock().remove(&node_id).is_some();
        if !had {
            return;
        }
        self.metrics.peers_connected.dec();
        self.uptime.lock().disconnect(node_id, SystemTime::now());
        let now = Instant::now();
        for supernet_id in self.supernet_trackers.keys() {
            self.router.disconnected(node_id, *supernet_id, now);
        }
    }

    /// Drive the node until `tokio::signal::ctrl_c()` resolves: accepts
    /// inbound peers, dials configured bootstrap peers, pumps inbound
    /// messages to the router, pings connected peers, and sweeps expired
    /// request deadlines.
    pub async fn run(self: Arc<Self>) -> Result<()> {
        let net_config = self.net_config();
        let listener = PeerListener::new(net_config.clone());
        let this = Arc::clone(&self);
        let (local_addr, mut accepted_rx) = listener
            .start(move || this.local_version(now_millis()), now_millis, self.identities.clone())
            .await?;
        info!("listening on {local_addr}");

        let (inbound_tx, mut inbound_rx) = tokio::sync::mpsc::channel::<InboundEnvelope>(1_024);

        {
            let this = Arc::clone(&self);
            let inbound_tx = inbound_tx.clone();
            tokio::spawn(async move {
                while let Some(accepted) = accepted_rx.recv().await {
                    this.accept_peer(accepted.node_id, accepted.addr, accepted.stream, inbound_tx.clone());
                }
            });
        }

        {
            let this = Arc::clone(&self);
            let bootstrap_peers = self.config.bootstrap_peers.clone();
            let inbound_tx = inbound_tx.clone();
            tokio::spawn(async move {
                let dialer = Dialer::new(this.net_config());
                for peer in bootstrap_peers {
                    let version = this.local_version(now_millis());
                    match dialer.dial(peer.addr, version, &this.identities, now_millis(), None).await {
                        Ok((node_id, stream)) => {
                            this.accept_peer(node_id, peer.addr, stream, inbound_tx.clone());
                        }
                        Err(e) => warn!("failed to dial bootstrap peer {}: {e}", peer.addr),
                    }
                }
            });
        }

        {
            let this = Arc::clone(&self);
            tokio::spawn(async move {
                while let Some(envelope) = inbound_rx.recv().await {
                    if let Some(peer) = this.peers.lock().get_mut(&envelope.node_id) {
                        peer.record_received(Instant::now());
                    }
                    match &envelope.message {
                        Message::Pong { .. } => {}
                        Message::Ping { uptime_pct } => {
                            let reply = Message::Pong { uptime_pct: *uptime_pct };
                            if let Some(peer) = this.peers.lock().get(&envelope.node_id) {
                                let queue = peer.queue.clone();
                                tokio::spawn(async move {
                                    queue.push(reply, CancelToken::never()).await;
                                });
                            }
                            continue;
                        }
                        _ => {}
                    }
                    this.router.handle_inbound(envelope.node_id, envelope.message, Instant::now());
                }
            });
        }

        let ping_task = {
            let this = Arc::clone(&self);
            let ping_frequency = self.config.ping_frequency;
            tokio::spawn(async move {
                loop {
                    tokio::time::sleep(ping_frequency).await;
                    let node_ids = this.peers.lock().connected_node_ids();
                    for node_id in node_ids {
                        let queue = this.peers.lock().get(&node_id).map(|p| p.queue.clone());
                        if let Some(queue) = queue {
                            queue.push(Message::Ping { uptime_pct: 100 }, CancelToken::never()).await;
                        }
                    }
                }
            })
        };

        let timeout_task = {
            let this = Arc::clone(&self);
            tokio::spawn(async move {
                loop {
                    let sleep_for = this.router.next_deadline().map(|d| d.saturating_duration_since(Instant::now())).unwrap_or(Duration::from_millis(250));
                    tokio::time::sleep(sleep_for.min(Duration::from_secs(1))).await;
                    this.router.check_timeouts(Instant::now());
                }
            })
        };

        tokio::signal::ctrl_c().await.map_err(|e| NodeError::Config(format!("failed to listen for ctrl-c: {e}")))?;
        info!("shutdown signal received, closing peer queues");
        ping_task.abort();
        timeout_task.abort();
        for node_id in self.peers.lock().connected_node_ids() {
            if let Some(peer) = self.peers.lock().get(&node_id) {
                peer.queue.clone();
            }
        }
        self.peers.lock().clear();
        Ok(())
    }
}

fn now_millis() -> u64 {
    SystemTime::now()
        .duration_since(std::time::UNIX_EPOCH)
        .map(|d| d.as_millis() as u64)
        .unwrap_or(0)
}

impl PeerTable {
    fn clear(&mut self) {
        for node_id in self.connected_node_ids() {
            self.remove(&node_id);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn dev_config() -> NodeConfig {
        let mut config = NodeConfig::default();
        config.bind_addr = "127.0.0.1:0".parse().unwrap();
        config
    }

    #[test]
    fn test_node_new_wires_configured_chains() {
        let node = Node::new(dev_config()).unwrap();
        assert_eq!(node.router.chain_ids().len(), 1);
    }

    #[test]
    fn test_node_local_node_id_is_registered_identity() {
        let node = Node::new(dev_config()).unwrap();
        assert!(node.identities.resolve(&node.local_node_id()).is_some());
    }
}
