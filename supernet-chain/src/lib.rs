//! Chain router and per-chain handler.
//!
//! The router owns the chain-id → handler map and the single adaptive
//! timeout firing loop shared by every chain. Each handler owns one chain's
//! bounded, priority-partitioned inbound queue and the stack of engines
//! (state-syncer, bootstrapper, consensus) it runs through over its
//! lifetime, swapping the active one as each finishes.
//!
//! Grounded on `core/src/consensus_service.rs`'s event-loop shape: a small
//! worker pool pulling off partitioned queues and a ticking timeout sweep,
//! generalized here from one hardcoded engine to a per-chain engine stack.
//! Outbound delivery is injected through [`OutboundSink`] rather than a
//! direct dependency on `supernet-net`, so the dependency graph stays
//! acyclic.

pub mod dispatch;
pub mod engine;
pub mod error;
pub mod timeout_manager;

use {
    dispatch::{priority_of, target_chain, Priority},
    engine::{ChainEngine, StepOutput},
    error::{ChainRouterError, Result},
    std::{
        collections::HashMap,
        sync::{
            atomic::{AtomicBool, AtomicU32, AtomicU64, AtomicU8, Ordering},
            Arc,
        },
        time::{Duration, Instant},
    },
    supernet_codec::{Id, Message, NodeId},
    supernet_timeout::TimeoutConfig,
    timeout_manager::{DeadlineQueue, RequestKey},
    tokio::sync::{mpsc, Mutex as AsyncMutex},
};

/// Delivers a message the handler produced to its destination peer.
///
/// Implemented by the node binary, bridging into `supernet-net`'s per-peer
/// send queues; kept a trait here so `supernet-chain` never depends on
/// `supernet-net` directly.
pub trait OutboundSink: Send + Sync {
    /// Send `message` to `to`. Best-effort: a full or closed peer queue
    /// drops the message, the same as any other backpressure in this
    /// system.
    fn send(&self, to: NodeId, message: Message);
}

/// An engine together with the lifecycle stage it represents, in the order
/// a chain runs through them.
pub struct EngineSlot {
    /// Which stage of the chain's life this engine implements.
    pub state: ChainState,
    /// The engine itself.
    pub engine: Box<dyn ChainEngine>,
}

impl EngineSlot {
    /// Convenience constructor.
    pub fn new(state: ChainState, engine: Box<dyn ChainEngine>) -> Self {
        Self { state, engine }
    }
}

/// A chain's current lifecycle stage, tracked so metrics and the node
/// binary can observe handler progress without locking the engine stack.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ChainState {
    /// No engine has been started yet.
    Initializing,
    /// The state-syncer is sampling for a state summary to apply.
    StateSyncing,
    /// The bootstrapper is fetching frontiers and ancestors.
    Bootstrapping,
    /// The consensus engine (Snowman or Avalanche) is live.
    NormalOp,
}

impl ChainState {
    fn from_tag(tag: u8) -> Self {
        match tag {
            1 => Self::StateSyncing,
            2 => Self::Bootstrapping,
            3 => Self::NormalOp,
            _ => Self::Initializing,
        }
    }

    fn tag(self) -> u8 {
        match self {
            Self::Initializing => 0,
            Self::StateSyncing => 1,
            Self::Bootstrapping => 2,
            Self::NormalOp => 3,
        }
    }
}

/// One message waiting in a handler's inbound queue.
struct QueuedMessage {
    from: NodeId,
    message: Message,
    enqueued_at: Instant,
    deadline: Option<Instant>,
}

struct HandlerQueues {
    high_rx: mpsc::Receiver<QueuedMessage>,
    low_rx: mpsc::Receiver<QueuedMessage>,
    sync_rx: mpsc::Receiver<QueuedMessage>,
}

/// Per-chain counters, exposed for `supernet-monitoring` to scrape.
#[derive(Debug, Default)]
pub struct HandlerMetrics {
    /// Inbound messages dropped because the target priority queue was full.
    pub dropped_queue_full: u64,
    /// Inbound messages dropped because their deadline had already passed.
    pub dropped_deadline: u64,
    /// Inbound messages dropped because no engine was active to receive
    /// them (the handler had already stopped).
    pub dropped_inapplicable: u64,
}

/// The bounded, priority-partitioned inbound queue and engine stack for one
/// chain.
pub struct Handler {
    chain_id: Id,
    supernet_id: Id,
    high_tx: mpsc::Sender<QueuedMessage>,
    low_tx: mpsc::Sender<QueuedMessage>,
    sync_tx: mpsc::Sender<QueuedMessage>,
    queues: AsyncMutex<HandlerQueues>,
    stack: parking_lot::Mutex<Vec<EngineSlot>>,
    state: AtomicU8,
    stopped: AtomicBool,
    request_ids: AtomicU32,
    dropped_queue_full: AtomicU64,
    dropped_deadline: AtomicU64,
    dropped_inapplicable: AtomicU64,
    outbound: Arc<dyn OutboundSink>,
    on_stopped: Option<Arc<dyn Fn(Id) + Send + Sync>>,
}

impl Handler {
    /// Build a handler for `chain_id` in `supernet_id`, running through
    /// `stack` in order (index 0 active first), with `queue_capacity` slots
    /// per priority lane.
    pub fn new(
        chain_id: Id,
        supernet_id: Id,
        stack: Vec<EngineSlot>,
        queue_capacity: usize,
        outbound: Arc<dyn OutboundSink>,
        on_stopped: Option<Arc<dyn Fn(Id) + Send + Sync>>,
    ) -> Arc<Self> {
        let (high_tx, high_rx) = mpsc::channel(queue_capacity.max(1));
        let (low_tx, low_rx) = mpsc::channel(queue_capacity.max(1));
        let (sync_tx, sync_rx) = mpsc::channel(queue_capacity.max(1));
        let initial_state = stack.first().map(|s| s.state).unwrap_or(ChainState::Initializing);
        Arc::new(Self {
            chain_id,
            supernet_id,
            high_tx,
            low_tx,
            sync_tx,
            queues: AsyncMutex::new(HandlerQueues { high_rx, low_rx, sync_rx }),
            stack: parking_lot::Mutex::new(stack),
            state: AtomicU8::new(initial_state.tag()),
            stopped: AtomicBool::new(false),
            request_ids: AtomicU32::new(0),
            dropped_queue_full: AtomicU64::new(0),
            dropped_deadline: AtomicU64::new(0),
            dropped_inapplicable: AtomicU64::new(0),
            outbound,
            on_stopped,
        })
    }

    /// The chain this handler serves.
    pub fn chain_id(&self) -> Id {
        self.chain_id
    }

    /// The supernet this chain belongs to.
    pub fn supernet_id(&self) -> Id {
        self.supernet_id
    }

    /// The chain's current lifecycle stage.
    pub fn state(&self) -> ChainState {
        ChainState::from_tag(self.state.load(Ordering::Acquire))
    }

    /// `true` once a fatal engine error has shut this handler down.
    pub fn is_stopped(&self) -> bool {
        self.stopped.load(Ordering::Acquire)
    }

    /// A snapshot of this handler's drop counters.
    pub fn metrics(&self) -> HandlerMetrics {
        HandlerMetrics {
            dropped_queue_full: self.dropped_queue_full.load(Ordering::Relaxed),
            dropped_deadline: self.dropped_deadline.load(Ordering::Relaxed),
            dropped_inapplicable: self.dropped_inapplicable.load(Ordering::Relaxed),
        }
    }

    /// Start the first engine in the stack. Must be called once before the
    /// handler is given to the router; safe to call from sync context since
    /// no engine step is ever `async`.
    pub fn start(&self, now: Instant) {
        let mut stack = self.stack.lock();
        if let Some(slot) = stack.first_mut() {
            let request_id = self.next_request_id();
            let output = slot.engine.start(request_id, now);
            self.apply_output(&mut stack, output, now);
        }
    }

    fn next_request_id(&self) -> u32 {
        self.request_ids.fetch_add(1, Ordering::Relaxed)
    }

    /// Enqueue an inbound message, classifying its priority automatically.
    /// Returns `false` if the handler is stopped or its target lane is
    /// full (the message is dropped and counted in either case).
    pub fn enqueue(&self, from: NodeId, message: Message, now: Instant, deadline: Option<Instant>) -> bool {
        if self.stopped.load(Ordering::Acquire) {
            self.dropped_inapplicable.fetch_add(1, Ordering::Relaxed);
            return false;
        }
        let item = QueuedMessage { from, enqueued_at: now, deadline, message };
        let tx = match priority_of(&item.message) {
            Priority::High => &self.high_tx,
            Priority::Low => &self.low_tx,
            Priority::Sync => &self.sync_tx,
        };
        match tx.try_send(item) {
            Ok(()) => true,
            Err(_) => {
                self.dropped_queue_full.fetch_add(1, Ordering::Relaxed);
                false
            }
        }
    }

    /// Spawn `pool_size` worker tasks draining this handler's queues.
    /// Returns their join handles so the caller can await clean shutdown.
    pub fn spawn_workers(self: &Arc<Self>, pool_size: usize) -> Vec<tokio::task::JoinHandle<()>> {
        (0..pool_size.max(1))
            .map(|_| {
                let this = Arc::clone(self);
                tokio::spawn(async move { this.worker_loop().await })
            })
            .collect()
    }

    async fn worker_loop(self: Arc<Self>) {
        loop {
            if self.stopped.load(Ordering::Acquire) {
                return;
            }
            match self.next_message().await {
                Some(item) => self.dispatch(item, Instant::now()),
                None => return,
            }
        }
    }

    /// Drains one message honoring priority order (high before low before
    /// sync), blocking until one is available or every lane has closed.
    async fn next_message(&self) -> Option<QueuedMessage> {
        let mut queues = self.queues.lock().await;
        tokio::select! {
            biased;
            item = queues.high_rx.recv() => item,
            item = queues.low_rx.recv() => item,
            item = queues.sync_rx.recv() => item,
        }
    }

    /// Test/administrative hook: pop one message without blocking,
    /// honoring priority order.
    pub async fn try_next_message_for_test(&self) -> Option<(NodeId, Message)> {
        let mut queues = self.queues.lock().await;
        if let Ok(item) = queues.high_rx.try_recv() {
            return Some((item.from, item.message));
        }
        if let Ok(item) = queues.low_rx.try_recv() {
            return Some((item.from, item.message));
        }
        if let Ok(item) = queues.sync_rx.try_recv() {
            return Some((item.from, item.message));
        }
        None
    }

    fn dispatch(&self, item: QueuedMessage, now: Instant) {
        if let Some(deadline) = item.deadline {
            if now > deadline {
                self.dropped_deadline.fetch_add(1, Ordering::Relaxed);
                return;
            }
        }
        let mut stack = self.stack.lock();
        if stack.is_empty() {
            self.dropped_inapplicable.fetch_add(1, Ordering::Relaxed);
            return;
        }
        let output = stack[0].engine.handle(item.from, item.message, now);
        self.apply_output(&mut stack, output, now);
    }

    /// Runs a time-driven tick through the active engine; used by the node
    /// binary's periodic repoll/liveness sweep.
    pub fn tick(&self, now: Instant) {
        let mut stack = self.stack.lock();
        if stack.is_empty() {
            return;
        }
        let output = stack[0].engine.tick(now);
        self.apply_output(&mut stack, output, now);
    }

    fn apply_output(&self, stack: &mut Vec<EngineSlot>, output: StepOutput, now: Instant) {
        for out in output.messages {
            self.outbound.send(out.to, out.message);
        }
        if output.fatal {
            self.shut_down();
            return;
        }
        if output.done && !stack.is_empty() {
            stack.remove(0);
            if let Some(next) = stack.first() {
                self.state.store(next.state.tag(), Ordering::Release);
            }
            if let Some(next) = stack.first_mut() {
                let request_id = self.request_ids.fetch_add(1, Ordering::Relaxed);
                let start_output = next.engine.start(request_id, now);
                for out in start_output.messages.clone() {
                    self.outbound.send(out.to, out.message);
                }
                if start_output.fatal {
                    self.shut_down();
                }
            }
        }
    }

    fn shut_down(&self) {
        self.stopped.store(true, Ordering::Release);
        if let Some(cb) = &self.on_stopped {
            cb(self.chain_id);
        }
    }
}

struct RegisteredChain {
    supernet_id: Id,
    handler: Arc<Handler>,
}

/// Router-wide counters, exposed for `supernet-monitoring`.
#[derive(Debug, Default)]
pub struct RouterMetrics {
    /// Inbound messages naming a chain id with no registered handler.
    pub dropped_unknown_chain: u64,
    /// Requests that timed out and had their synthetic failure delivered.
    pub timeouts_fired: u64,
}

/// Owns every chain's handler plus the one shared adaptive timeout queue.
pub struct ChainRouter {
    handlers: parking_lot::RwLock<HashMap<Id, RegisteredChain>>,
    deadlines: parking_lot::Mutex<DeadlineQueue>,
    dropped_unknown_chain: AtomicU64,
    timeouts_fired: AtomicU64,
}

impl ChainRouter {
    /// An empty router, with its shared timeout estimator seeded from
    /// `config`.
    pub fn new(config: TimeoutConfig) -> Self {
        Self {
            handlers: parking_lot::RwLock::new(HashMap::new()),
            deadlines: parking_lot::Mutex::new(DeadlineQueue::new(config)),
            dropped_unknown_chain: AtomicU64::new(0),
            timeouts_fired: AtomicU64::new(0),
        }
    }

    /// Register a chain's handler. Errors if `chain_id` is already
    /// registered.
    pub fn register_chain(&self, chain_id: Id, supernet_id: Id, handler: Arc<Handler>) -> Result<()> {
        let mut handlers = self.handlers.write();
        if handlers.contains_key(&chain_id) {
            return Err(ChainRouterError::DuplicateChain(chain_id));
        }
        handlers.insert(chain_id, RegisteredChain { supernet_id, handler });
        Ok(())
    }

    /// Remove and return a chain's handler, if registered.
    pub fn remove_chain(&self, chain_id: Id) -> Option<Arc<Handler>> {
        self.handlers.write().remove(&chain_id).map(|r| r.handler)
    }

    /// The handler registered for `chain_id`, if any.
    pub fn handler_for(&self, chain_id: Id) -> Option<Arc<Handler>> {
        self.handlers.read().get(&chain_id).map(|r| Arc::clone(&r.handler))
    }

    /// Look up a chain's handler, erroring rather than returning `None`.
    pub fn require_handler(&self, chain_id: Id) -> Result<Arc<Handler>> {
        self.handler_for(chain_id).ok_or(ChainRouterError::UnknownChain(chain_id))
    }

    /// Route one inbound message to its target chain's handler, canceling
    /// any outstanding request it answers along the way. Returns `true` if
    /// the message was enqueued.
    pub fn handle_inbound(&self, from: NodeId, message: Message, now: Instant) -> bool {
        if let (Some(request_id), Some(chain_id)) = (message.request_id(), target_chain(&message)) {
            let key = RequestKey { dst_node: from, src_chain: chain_id, dst_chain: chain_id, request_id };
            self.deadlines.lock().cancel(&key);
        }
        let Some(chain_id) = target_chain(&message) else {
            return false;
        };
        match self.handler_for(chain_id) {
            Some(handler) => handler.enqueue(from, message, now, None),
            None => {
                self.dropped_unknown_chain.fetch_add(1, Ordering::Relaxed);
                false
            }
        }
    }

    /// Register an outstanding request, returning the deadline it was given
    /// from the shared adaptive estimator.
    pub fn register_request(
        &self,
        dst_node: NodeId,
        src_chain: Id,
        dst_chain: Id,
        request_id: u32,
        failure: Message,
        now: Instant,
    ) -> Result<Instant> {
        let mut deadlines = self.deadlines.lock();
        let deadline = now + deadlines.current_timeout();
        let key = RequestKey { dst_node, src_chain, dst_chain, request_id };
        if !deadlines.register(key, deadline, failure) {
            return Err(ChainRouterError::DuplicateRequest);
        }
        Ok(deadline)
    }

    /// Fold an observed round-trip latency into the shared timeout
    /// estimator.
    pub fn observe_latency(&self, latency: Duration, now: Instant) {
        self.deadlines.lock().observe(latency, now);
    }

    /// The next deadline due to fire, if any; used to size the node
    /// binary's sleep between timeout sweeps.
    pub fn next_deadline(&self) -> Option<Instant> {
        self.deadlines.lock().next_deadline()
    }

    /// Deliver every expired request's synthetic failure message to its
    /// owning handler. Call periodically (driven by [`Self::next_deadline`]).
    pub fn check_timeouts(&self, now: Instant) {
        let fired = self.deadlines.lock().pop_expired(now);
        if fired.is_empty() {
            return;
        }
        self.timeouts_fired.fetch_add(fired.len() as u64, Ordering::Relaxed);
        for (key, failure) in fired {
            if let Some(handler) = self.handler_for(key.dst_chain) {
                handler.enqueue(key.dst_node, failure, now, None);
            }
        }
    }

    /// Fan a peer connection out to every handler in `supernet_id`.
    pub fn connected(&self, node_id: NodeId, supernet_id: Id, now: Instant) {
        for reg in self.handlers.read().values() {
            if reg.supernet_id == supernet_id {
                reg.handler.enqueue(
                    node_id,
                    Message::ConnectedSupernet { supernet_id, node_id },
                    now,
                    None,
                );
            }
        }
    }

    /// Fan a peer disconnection out to every handler in `supernet_id`.
    pub fn disconnected(&self, node_id: NodeId, supernet_id: Id, now: Instant) {
        for reg in self.handlers.read().values() {
            if reg.supernet_id == supernet_id {
                reg.handler.enqueue(
                    node_id,
                    Message::DisconnectedSupernet { supernet_id, node_id },
                    now,
                    None,
                );
            }
        }
    }

    /// A snapshot of router-wide counters.
    pub fn metrics(&self) -> RouterMetrics {
        RouterMetrics {
            dropped_unknown_chain: self.dropped_unknown_chain.load(Ordering::Relaxed),
            timeouts_fired: self.timeouts_fired.load(Ordering::Relaxed),
        }
    }

    /// Every currently registered chain id.
    pub fn chain_ids(&self) -> Vec<Id> {
        self.handlers.read().keys().copied().collect()
    }
}
