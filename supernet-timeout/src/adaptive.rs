//! The adaptive-timeout estimator for network round trips.
//!
//! Grounded on the same "scheduler owns a started_at + active marker, the
//! caller asks whether it expired" shape as a fixed-duration BFT step
//! timeout, generalized here to a timeout whose *duration* itself adapts to
//! an exponential moving average of observed round-trip latencies rather
//! than being a function of a fixed per-step table.

use std::time::{Duration, Instant};

/// Tunables for [`AdaptiveTimeoutManager`].
#[derive(Debug, Clone, Copy)]
pub struct TimeoutConfig {
    /// Timeout used before any latency sample has been observed.
    pub initial: Duration,
    /// Lower clamp on the computed timeout.
    pub minimum: Duration,
    /// Upper clamp on the computed timeout.
    pub maximum: Duration,
    /// Half-life of the latency EMA: a sample this long ago carries half the
    /// weight of a sample observed just now.
    pub halflife: Duration,
    /// Multiplier applied to the latency EMA before clamping.
    pub coefficient: f64,
}

impl Default for TimeoutConfig {
    fn default() -> Self {
        Self {
            initial: Duration::from_millis(500),
            minimum: Duration::from_millis(10),
            maximum: Duration::from_secs(10),
            halflife: Duration::from_secs(5),
            coefficient: 2.0,
        }
    }
}

/// Tracks a single exponential moving average of round-trip latency and
/// derives the next timeout from it.
///
/// One instance is shared across every in-flight request in the node (the
/// estimate isn't per-peer); the router asks it for `current_timeout()` each
/// time it registers a new request.
#[derive(Debug)]
pub struct AdaptiveTimeoutManager {
    config: TimeoutConfig,
    ema_millis: f64,
    last_observed: Option<Instant>,
}

impl AdaptiveTimeoutManager {
    /// A manager with the EMA seeded at `config.initial`.
    pub fn new(config: TimeoutConfig) -> Self {
        let ema_millis = config.initial.as_secs_f64() * 1000.0;
        Self {
            config,
            ema_millis,
            last_observed: None,
        }
    }

    /// The timeout to use for a request registered right now.
    pub fn current_timeout(&self) -> Duration {
        let target_ms = self.ema_millis * self.config.coefficient;
        let min_ms = self.config.minimum.as_secs_f64() * 1000.0;
        let max_ms = self.config.maximum.as_secs_f64() * 1000.0;
        Duration::from_secs_f64(target_ms.clamp(min_ms, max_ms) / 1000.0)
    }

    /// Fold a single observed round-trip latency into the EMA.
    ///
    /// The weight given to the new sample grows with the time elapsed since
    /// the last observation, per `config.halflife`, so a burst of closely
    /// spaced samples doesn't dominate a single stale one.
    pub fn observe(&mut self, latency: Duration, now: Instant) {
        let sample_ms = latency.as_secs_f64() * 1000.0;
        let alpha = match self.last_observed {
            None => 1.0,
            Some(prev) => {
                let elapsed = now.saturating_duration_since(prev);
                let halflife = self.config.halflife.as_secs_f64().max(f64::EPSILON);
                1.0 - 0.5f64.powf(elapsed.as_secs_f64() / halflife)
            }
        };
        self.ema_millis = alpha * sample_ms + (1.0 - alpha) * self.ema_millis;
        self.last_observed = Some(now);
    }

    /// The current latency EMA, in milliseconds, for inspection/metrics.
    pub fn ema_millis(&self) -> f64 {
        self.ema_millis
    }
}
