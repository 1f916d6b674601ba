//! Leaf-chain iteration for diagnostics and validation.
//!
//! The iterator walks the leaf chain head to tail and reports one
//! summary per leaf. It is meant for quiescent trees only (test
//! teardown, invariant checks); on an actively mutated tree the
//! summaries are individually consistent but collectively racy.

use seize::LocalGuard;

use crate::key::KeyComparator;
use crate::node::materialize_leaf;
use crate::pid::Pid;

use super::BwTree;

/// Snapshot of one leaf's logical state.
#[derive(Clone, Debug)]
pub struct LeafSummary<K> {
    /// The leaf's PID.
    pub pid: Pid,

    /// Logical slot count (distinct keys).
    pub slots: usize,

    /// Entry count (pairs, duplicates included).
    pub entries: usize,

    /// Delta-chain length at the observed head.
    pub chain_length: u32,

    /// Low fence key; `None` is -∞.
    pub low_key: Option<K>,

    /// High fence key; `None` is +∞.
    pub high_key: Option<K>,
}

/// Iterator over every leaf, in key order.
pub struct LeafChainIter<'t, K, V, C> {
    tree: &'t BwTree<K, V, C>,
    guard: LocalGuard<'t>,
    next: Pid,
}

impl<'t, K, V, C> LeafChainIter<'t, K, V, C>
where
    K: Clone,
    V: Clone + PartialEq,
    C: KeyComparator<K>,
{
    pub(super) fn new(tree: &'t BwTree<K, V, C>) -> Self {
        let guard = tree.guard();
        let next = tree.head_leaf_pid(&guard);

        Self { tree, guard, next }
    }
}

impl<K, V, C> Iterator for LeafChainIter<'_, K, V, C>
where
    K: Clone,
    V: Clone + PartialEq,
    C: KeyComparator<K>,
{
    type Item = LeafSummary<K>;

    fn next(&mut self) -> Option<Self::Item> {
        if self.next.is_null() {
            return None;
        }

        let pid = self.next;
        let head = self.tree.mapping.get(pid, &self.guard);

        // SAFETY: protected chain head.
        let view = unsafe { materialize_leaf(head, self.tree.comparator()) };
        // SAFETY: same chain.
        self.next = unsafe { self.tree.leaf_successor(head) };

        // SAFETY: same chain.
        let chain_length = unsafe { (*head).chain_length() };

        Some(LeafSummary {
            pid,
            slots: view.slots.len(),
            entries: view.slots.iter().map(|slot| slot.values.len()).sum(),
            chain_length,
            low_key: view.low_key,
            high_key: view.high_key,
        })
    }
}

#[cfg(test)]
mod tests {
    use crate::config::TreeConfig;
    use crate::tree::BwTree;

    #[test]
    fn test_empty_tree_has_no_leaves() {
        let tree: BwTree<i64, u64> = BwTree::new();
        assert_eq!(tree.leaves().count(), 0);
    }

    #[test]
    fn test_fences_tile_the_key_space() {
        let tree: BwTree<i64, u64> = BwTree::with_config(
            TreeConfig::default()
                .leaf_size_threshold(4)
                .inner_size_threshold(4)
                .delta_chain_threshold(2),
        );
        for i in 0..256 {
            tree.insert(i, 1).unwrap();
        }

        let summaries: Vec<_> = tree.leaves().collect();
        assert!(summaries.len() > 1, "expected splits to have happened");

        assert!(summaries.first().unwrap().low_key.is_none());
        assert!(summaries.last().unwrap().high_key.is_none());

        for pair in summaries.windows(2) {
            assert_eq!(
                pair[0].high_key, pair[1].low_key,
                "adjacent fences must line up"
            );
        }
    }
}
