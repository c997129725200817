//! Inbound connection admission: a per-second accept throttle plus a
//! per-IP "recently upgraded" cooldown, applied before a socket is ever
//! handed to the TLS/handshake path.

use std::{
    collections::HashMap,
    net::IpAddr,
    time::{Duration, Instant},
};

/// Gates acceptance of inbound sockets.
#[derive(Debug)]
pub struct AcceptThrottle {
    max_per_sec: u32,
    cooldown: Duration,
    window_start: Instant,
    window_count: u32,
    recently_upgraded: HashMap<IpAddr, Instant>,
}

impl AcceptThrottle {
    /// A throttle with an empty one-second window and no IPs in cooldown.
    pub fn new(max_per_sec: u32, cooldown: Duration, now: Instant) -> Self {
        Self {
            max_per_sec,
            cooldown,
            window_start: now,
            window_count: 0,
            recently_upgraded: HashMap::new(),
        }
    }

    /// Whether a freshly accepted socket from `ip` may proceed to TLS
    /// upgrade. Rolls the one-second window forward as needed and checks
    /// the per-IP cooldown; does not itself record an upgrade.
    pub fn try_admit(&mut self, ip: IpAddr, now: Instant) -> bool {
        if now.saturating_duration_since(self.window_start) >= Duration::from_secs(1) {
            self.window_start = now;
            self.window_count = 0;
        }
        if self.window_count >= self.max_per_sec {
            return false;
        }
        if let Some(&upgraded_at) = self.recently_upgraded.get(&ip) {
            if now.saturating_duration_since(upgraded_at) < self.cooldown {
                return false;
            }
        }
        self.window_count = self.window_count.saturating_add(1);
        true
    }

    /// Record that `ip` just completed a TLS upgrade, starting its cooldown.
    pub fn record_upgraded(&mut self, ip: IpAddr, now: Instant) {
        self.recently_upgraded.insert(ip, now);
    }
}
