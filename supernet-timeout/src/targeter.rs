//! Adaptive CPU/disk resource targeters.
//!
//! A targeter turns a resource tracker's current per-node usage into a
//! per-peer usage target the inbound throttler enforces. Validators share a
//! pool proportional to stake; non-validators are capped both in aggregate
//! and individually, so a handful of unstaked peers can't starve validators.

use crate::error::{Result, TargeterError};

/// Configuration for one resource's targeter (CPU or disk).
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct TargeterConfig {
    /// Total resource share reserved for the weighted validator pool.
    pub vdr_alloc: f64,
    /// Cap on combined usage by all non-validator peers.
    pub max_non_vdr_usage: f64,
    /// Cap on usage by any single non-validator peer.
    pub max_non_vdr_node_usage: f64,
}

impl TargeterConfig {
    fn validate(self) -> Result<()> {
        if self.vdr_alloc < 0.0 {
            return Err(TargeterError::NegativeAllocation("vdr_alloc".into()));
        }
        if self.max_non_vdr_usage < 0.0 {
            return Err(TargeterError::NegativeAllocation("max_non_vdr_usage".into()));
        }
        if self.max_non_vdr_node_usage < 0.0 {
            return Err(TargeterError::NegativeAllocation("max_non_vdr_node_usage".into()));
        }
        Ok(())
    }
}

/// Computes per-peer resource-usage targets for the inbound throttler.
#[derive(Debug, Clone, Copy)]
pub struct Targeter {
    config: TargeterConfig,
}

impl Targeter {
    /// Build a targeter, rejecting a config with any negative allocation.
    pub fn new(config: TargeterConfig) -> Result<Self> {
        config.validate()?;
        Ok(Self { config })
    }

    /// The usage target for one peer.
    ///
    /// A validator gets a share of `vdr_alloc` proportional to its stake
    /// weight within the total validator weight. A non-validator gets the
    /// smaller of the per-node cap and whatever headroom remains in the
    /// aggregate non-validator cap.
    pub fn target_for(
        &self,
        is_validator: bool,
        node_weight: u64,
        total_validator_weight: u64,
        non_validator_usage_excluding_self: f64,
    ) -> f64 {
        if is_validator && total_validator_weight > 0 {
            self.config.vdr_alloc * (node_weight as f64 / total_validator_weight as f64)
        } else {
            let remaining_pool =
                (self.config.max_non_vdr_usage - non_validator_usage_excluding_self).max(0.0);
            self.config.max_non_vdr_node_usage.min(remaining_pool)
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn config() -> TargeterConfig {
        TargeterConfig {
            vdr_alloc: 80.0,
            max_non_vdr_usage: 20.0,
            max_non_vdr_node_usage: 5.0,
        }
    }

    #[test]
    fn test_rejects_negative_allocation() {
        let err = Targeter::new(TargeterConfig {
            vdr_alloc: -1.0,
            ..config()
        })
        .unwrap_err();
        assert!(matches!(err, TargeterError::NegativeAllocation(_)));
    }

    #[test]
    fn test_validator_target_proportional_to_weight() {
        let targeter = Targeter::new(config()).unwrap();
        assert!((targeter.target_for(true, 25, 100, 0.0) - 20.0).abs() < 1e-9);
    }

    #[test]
    fn test_non_validator_capped_by_per_node_cap() {
        let targeter = Targeter::new(config()).unwrap();
        assert!((targeter.target_for(false, 0, 0, 0.0) - 5.0).abs() < 1e-9);
    }

    #[test]
    fn test_non_validator_capped_by_remaining_pool() {
        let targeter = Targeter::new(config()).unwrap();
        // Pool nearly exhausted by other non-validators.
        assert!((targeter.target_for(false, 0, 0, 18.0) - 2.0).abs() < 1e-9);
    }

    #[test]
    fn test_non_validator_pool_exhausted_yields_zero() {
        let targeter = Targeter::new(config()).unwrap();
        assert_eq!(targeter.target_for(false, 0, 0, 30.0), 0.0);
    }
}
