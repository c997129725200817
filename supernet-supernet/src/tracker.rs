//! The per-supernet "bootstrapping-of-N-chains" barrier.
//!
//! Tracks which chains in a supernet are still bootstrapping versus already
//! bootstrapped, and fires a one-shot, edge-triggered signal the moment the
//! last chain finishes.

use {
    std::collections::HashSet,
    supernet_codec::Id,
    tokio::sync::watch,
};

/// Tracks bootstrap progress for every chain belonging to one supernet.
pub struct SupernetTracker {
    bootstrapping: HashSet<Id>,
    bootstrapped: HashSet<Id>,
    fired: bool,
    tx: watch::Sender<bool>,
    rx: watch::Receiver<bool>,
}

impl SupernetTracker {
    /// A tracker for a supernet with no chains registered yet.
    pub fn new() -> Self {
        let (tx, rx) = watch::channel(false);
        Self {
            bootstrapping: HashSet::new(),
            bootstrapped: HashSet::new(),
            fired: false,
            tx,
            rx,
        }
    }

    /// Register a chain as needing to bootstrap.
    ///
    /// Returns `false` without effect if `chain_id` is already tracked
    /// (bootstrapping or bootstrapped); `true` if it was newly added.
    pub fn add_chain(&mut self, chain_id: Id) -> bool {
        if self.bootstrapping.contains(&chain_id) || self.bootstrapped.contains(&chain_id) {
            return false;
        }
        self.bootstrapping.insert(chain_id);
        true
    }

    /// Mark `chain_id` as having finished bootstrapping.
    ///
    /// If this empties the bootstrapping set, the barrier fires — exactly
    /// once per tracker instance, even if `Bootstrapped` is called again
    /// afterward for a chain that was somehow re-added.
    pub fn bootstrapped(&mut self, chain_id: Id) {
        if self.bootstrapping.remove(&chain_id) {
            self.bootstrapped.insert(chain_id);
        }
        if self.bootstrapping.is_empty() && !self.fired {
            self.fired = true;
            // A closed receiver (no observers ever subscribed) is fine to ignore.
            let _ = self.tx.send(true);
        }
    }

    /// `true` iff there are no chains currently bootstrapping.
    ///
    /// Note this is also `true` before any chain is ever added — an empty
    /// supernet is vacuously bootstrapped.
    pub fn is_bootstrapped(&self) -> bool {
        self.bootstrapping.is_empty()
    }

    /// A handle observers can await until the barrier fires. Multiple
    /// independent observers may each clone and await their own handle.
    pub fn on_bootstrap_completed(&self) -> BootstrapHandle {
        BootstrapHandle {
            rx: self.rx.clone(),
            already_fired: self.fired,
        }
    }

    /// Chain ids still bootstrapping.
    pub fn bootstrapping_chains(&self) -> impl Iterator<Item = &Id> {
        self.bootstrapping.iter()
    }

    /// Chain ids that have finished bootstrapping.
    pub fn bootstrapped_chains(&self) -> impl Iterator<Item = &Id> {
        self.bootstrapped.iter()
    }
}

impl Default for SupernetTracker {
    fn default() -> Self {
        Self::new()
    }
}

/// A wait-once handle on a [`SupernetTracker`]'s bootstrap barrier.
pub struct BootstrapHandle {
    rx: watch::Receiver<bool>,
    already_fired: bool,
}

impl BootstrapHandle {
    /// Resolves once the barrier has fired. Resolves immediately if it
    /// already had, at the time this handle was created.
    pub async fn wait(mut self) {
        if self.already_fired {
            return;
        }
        // `changed()` only errs if the sender was dropped without ever
        // firing, which would mean the tracker itself was dropped early.
        while self.rx.changed().await.is_ok() {
            if *self.rx.borrow() {
                return;
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn chain_id(byte: u8) -> Id {
        Id::from([byte; 32])
    }

    #[test]
    fn test_add_chain_rejects_duplicate() {
        let mut tracker = SupernetTracker::new();
        assert!(tracker.add_chain(chain_id(1)));
        assert!(!tracker.add_chain(chain_id(1)));
    }

    #[test]
    fn test_empty_supernet_is_bootstrapped() {
        let tracker = SupernetTracker::new();
        assert!(tracker.is_bootstrapped());
    }

    #[test]
    fn test_not_bootstrapped_while_chains_pending() {
        let mut tracker = SupernetTracker::new();
        tracker.add_chain(chain_id(1));
        assert!(!tracker.is_bootstrapped());
    }

    #[test]
    fn test_bootstrapped_moves_chain_between_sets() {
        let mut tracker = SupernetTracker::new();
        tracker.add_chain(chain_id(1));
        tracker.bootstrapped(chain_id(1));
        assert!(tracker.is_bootstrapped());
        assert_eq!(tracker.bootstrapped_chains().collect::<Vec<_>>(), vec![&chain_id(1)]);
    }

    #[tokio::test]
    async fn test_barrier_fires_once_after_last_chain() {
        let mut tracker = SupernetTracker::new();
        tracker.add_chain(chain_id(1));
        tracker.add_chain(chain_id(2));

        let observer_a = tracker.on_bootstrap_completed();
        let observer_b = tracker.on_bootstrap_completed();

        tracker.bootstrapped(chain_id(1));
        assert!(!tracker.is_bootstrapped());

        tracker.bootstrapped(chain_id(2));
        assert!(tracker.is_bootstrapped());

        tokio::time::timeout(std::time::Duration::from_secs(1), observer_a.wait())
            .await
            .expect("observer A should resume");
        tokio::time::timeout(std::time::Duration::from_secs(1), observer_b.wait())
            .await
            .expect("observer B should resume");
    }

    #[tokio::test]
    async fn test_handle_obtained_after_fire_resolves_immediately() {
        let mut tracker = SupernetTracker::new();
        tracker.add_chain(chain_id(1));
        tracker.bootstrapped(chain_id(1));

        let observer = tracker.on_bootstrap_completed();
        tokio::time::timeout(std::time::Duration::from_millis(50), observer.wait())
            .await
            .expect("already-fired barrier resolves immediately");
    }
}
