//! Configuration for the peer-transport layer.

use std::time::Duration;

/// Tunables for accepting, dialing, handshaking, and servicing peers.
///
/// Mirrors a familiar networking config in shape (bind address, message
/// size caps, timeouts, channel buffer sizes) generalized to the full
/// admission/throttle chain this protocol requires.
#[derive(Debug, Clone)]
pub struct NetConfig {
    /// Local address to bind the peer listener on.
    pub bind_addr: std::net::SocketAddr,
    /// Network id this node belongs to; peers with a different id are rejected.
    pub network_id: u32,
    /// This node's software version, used for the handshake compatibility check.
    pub node_version: (u16, u16, u16),
    /// Oldest peer version this node will still accept a handshake from.
    pub minimum_compatible_version: (u16, u16, u16),
    /// Maximum allowed difference between a peer's claimed clock and ours.
    pub max_clock_difference: Duration,
    /// Maximum time allowed for the handshake to complete.
    pub handshake_timeout: Duration,
    /// Maximum accepted connections per second.
    pub max_accepts_per_second: u32,
    /// Cooldown before the same IP can be accepted again after an upgrade.
    pub recently_upgraded_cooldown: Duration,
    /// Timeout for outbound TCP dials.
    pub dial_timeout: Duration,
    /// Initial delay between reconnect attempts to a peer.
    pub initial_reconnect_delay: Duration,
    /// Maximum delay between reconnect attempts (exponential backoff cap).
    pub max_reconnect_delay: Duration,
    /// Maximum frame size, post-decompression, in bytes.
    pub max_frame_size: usize,
    /// Capacity of each peer's outbound send queue.
    pub send_queue_capacity: usize,
    /// Interval between liveness pings.
    pub ping_frequency: Duration,
    /// How long to wait for a pong before disconnecting. Must exceed `ping_frequency`.
    pub pong_timeout: Duration,
    /// Per-node at-large inbound byte pool size.
    pub at_large_byte_pool: u64,
    /// Reserved inbound byte pool for validators.
    pub validator_byte_pool: u64,
    /// Bandwidth token-bucket refill rate, bytes/sec.
    pub bandwidth_refill_per_sec: u64,
    /// Bandwidth token-bucket maximum burst size, bytes.
    pub bandwidth_max_burst: u64,
    /// Maximum in-flight inbound messages per peer.
    pub max_in_flight_per_peer: u32,
    /// Maximum delay between resource-throttle rechecks.
    pub resource_recheck_max_delay: Duration,
}

impl Default for NetConfig {
    fn default() -> Self {
        Self {
            bind_addr: "0.0.0.0:9651".parse().expect("valid default bind addr"),
            network_id: 1,
            node_version: (1, 0, 0),
            minimum_compatible_version: (1, 0, 0),
            max_clock_difference: Duration::from_secs(60),
            handshake_timeout: Duration::from_secs(15),
            max_accepts_per_second: 100,
            recently_upgraded_cooldown: Duration::from_secs(10),
            dial_timeout: Duration::from_secs(10),
            initial_reconnect_delay: Duration::from_secs(1),
            max_reconnect_delay: Duration::from_secs(60),
            max_frame_size: 2 * 1024 * 1024,
            send_queue_capacity: 1_024,
            ping_frequency: Duration::from_secs(10),
            pong_timeout: Duration::from_secs(30),
            at_large_byte_pool: 4 * 1024 * 1024,
            validator_byte_pool: 32 * 1024 * 1024,
            bandwidth_refill_per_sec: 8 * 1024 * 1024,
            bandwidth_max_burst: 16 * 1024 * 1024,
            max_in_flight_per_peer: 256,
            resource_recheck_max_delay: Duration::from_millis(500),
        }
    }
}

impl NetConfig {
    /// A config suitable for local testing: short timeouts, small pools.
    #[cfg(any(test, feature = "dev-context-only-utils"))]
    pub fn dev_default() -> Self {
        Self {
            bind_addr: "127.0.0.1:0".parse().expect("valid dev bind addr"),
            handshake_timeout: Duration::from_secs(2),
            dial_timeout: Duration::from_secs(2),
            ping_frequency: Duration::from_millis(200),
            pong_timeout: Duration::from_millis(600),
            send_queue_capacity: 64,
            at_large_byte_pool: 64 * 1024,
            validator_byte_pool: 256 * 1024,
            bandwidth_refill_per_sec: 1024 * 1024,
            bandwidth_max_burst: 1024 * 1024,
            max_in_flight_per_peer: 32,
            ..Self::default()
        }
    }

    /// `true` iff `pong_timeout` exceeds `ping_frequency`.
    pub fn is_valid(&self) -> bool {
        self.pong_timeout > self.ping_frequency
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_is_valid() {
        assert!(NetConfig::default().is_valid());
    }

    #[test]
    fn test_pong_timeout_must_exceed_ping_frequency() {
        let mut cfg = NetConfig::default();
        cfg.pong_timeout = cfg.ping_frequency;
        assert!(!cfg.is_valid());
    }
}
