//! Peer transport: TLS+BLS handshake, per-peer framing and send queues,
//! liveness, signed-IP gossip, and inbound admission throttles.

mod admission;
mod config;
mod dialer;
mod error;
mod gossip;
mod handshake;
mod identity;
mod io;
mod listener;
mod outbound_queue;
mod peer;
mod throttle;

pub use admission::AcceptThrottle;
pub use config::NetConfig;
pub use dialer::Dialer;
pub use error::{NetError, Result};
pub use gossip::{ClaimedIp, GossipTracker, PeerBloomFilter};
pub use handshake::{run_handshake, sign_claim, validate_version};
pub use identity::{BlsIdentity, IdentityRegistry, InMemorySigner, TlsIdentity};
pub use io::{read_message, write_message, spawn_peer_io, InboundEnvelope};
pub use listener::{AcceptedPeer, PeerListener};
pub use outbound_queue::{cancel_pair, CancelSource, CancelToken, OutboundQueue, QueueHandle, SendFailedCallback};
pub use peer::{PeerConnection, PeerState, PeerTable};
pub use throttle::{BytePool, InFlightLimiter, ResourceThrottle, TokenBucket};
