//! Query surface: point reads, key-equality scans, ordered scans and
//! predicate scans.
//!
//! Scans offer no cross-key snapshot: each leaf is read at one
//! linearization point (its chain head), and the walk follows the
//! doubly-linked leaf chain. A leaf mid-split contributes its truncated
//! lower half, and the walk continues at the split sibling, so no entry
//! is skipped or doubled.

use seize::LocalGuard;

use crate::key::KeyComparator;
use crate::node::{chain_base, collect_key, materialize_leaf};
use crate::predicate::{KeyAttributes, Predicate, PredicateOp, ScanDirection};
use crate::tracing_helpers::trace_log;

use super::BwTree;

impl<K, V, C> BwTree<K, V, C>
where
    K: Clone,
    V: Clone + PartialEq,
    C: KeyComparator<K>,
{
    /// All values stored under `key`, duplicates included.
    #[must_use]
    #[inline]
    pub fn scan_key(&self, key: &K) -> Vec<V> {
        let guard = self.guard();
        self.scan_key_with_guard(key, &guard)
    }

    /// [`scan_key`](Self::scan_key) against a caller-held epoch guard.
    #[must_use]
    pub fn scan_key_with_guard(&self, key: &K, guard: &LocalGuard<'_>) -> Vec<V> {
        if self.root.load().is_null() {
            return Vec::new();
        }

        let (_pid, head) = self.find_leaf(key, guard);
        // SAFETY: head is the protected chain head of the target leaf.
        unsafe { collect_key(head, key, &self.comparator) }
    }

    /// Whether at least one pair is stored under `key`.
    #[must_use]
    pub fn exists(&self, key: &K) -> bool {
        let guard = self.guard();
        !self.scan_key_with_guard(key, &guard).is_empty()
    }

    /// Every value in ascending key order.
    #[must_use]
    #[inline]
    pub fn scan_all(&self) -> Vec<V> {
        let guard = self.guard();
        self.scan_all_with_guard(&guard)
    }

    /// [`scan_all`](Self::scan_all) against a caller-held epoch guard.
    #[must_use]
    pub fn scan_all_with_guard(&self, guard: &LocalGuard<'_>) -> Vec<V> {
        let mut out = Vec::new();
        if self.root.load().is_null() {
            return out;
        }

        let mut pid = self.head_leaf_pid(guard);
        while !pid.is_null() {
            let head = self.mapping.get(pid, guard);
            // SAFETY: protected chain head.
            let view = unsafe { materialize_leaf(head, &self.comparator) };

            for slot in view.slots {
                out.extend(slot.values);
            }

            // SAFETY: same chain.
            pid = unsafe { self.leaf_successor(head) };
        }

        trace_log!(returned = out.len(), "full ordered scan");
        out
    }

    /// Predicate scan: filter the ordered entry stream with per-column
    /// comparisons, walking in the requested direction.
    ///
    /// Forward scans yield ascending key order, backward scans
    /// descending.
    ///
    /// # Panics
    ///
    /// Panics when the three predicate slices disagree on length.
    #[must_use]
    pub fn scan(
        &self,
        values: &[K::Column],
        column_ids: &[usize],
        ops: &[PredicateOp],
        direction: ScanDirection,
    ) -> Vec<V>
    where
        K: KeyAttributes,
    {
        let guard = self.guard();
        self.scan_with_guard(values, column_ids, ops, direction, &guard)
    }

    /// [`scan`](Self::scan) against a caller-held epoch guard.
    #[must_use]
    pub fn scan_with_guard(
        &self,
        values: &[K::Column],
        column_ids: &[usize],
        ops: &[PredicateOp],
        direction: ScanDirection,
        guard: &LocalGuard<'_>,
    ) -> Vec<V>
    where
        K: KeyAttributes,
    {
        let predicate = Predicate::new(values, column_ids, ops);

        let mut out = Vec::new();
        if self.root.load().is_null() {
            return out;
        }

        match direction {
            ScanDirection::Forward => {
                let mut pid = self.head_leaf_pid(guard);
                while !pid.is_null() {
                    let head = self.mapping.get(pid, guard);
                    // SAFETY: protected chain head.
                    let view = unsafe { materialize_leaf(head, &self.comparator) };

                    for slot in view.slots {
                        if predicate.matches(&slot.key) {
                            out.extend(slot.values);
                        }
                    }

                    // SAFETY: same chain.
                    pid = unsafe { self.leaf_successor(head) };
                }
            }

            ScanDirection::Backward => {
                let mut pid = self.tail_leaf_pid(guard);
                while !pid.is_null() {
                    let head = self.mapping.get(pid, guard);
                    // SAFETY: protected chain head.
                    let view = unsafe { materialize_leaf(head, &self.comparator) };

                    for slot in view.slots.into_iter().rev() {
                        if predicate.matches(&slot.key) {
                            out.extend(slot.values);
                        }
                    }

                    // SAFETY: same chain; prev links are only walked on
                    // the quiesced backward path.
                    let base = unsafe { chain_base(head) };
                    pid = base
                        .as_leaf_base()
                        .expect("leaf chain must end in a leaf base")
                        .prev_leaf
                        .load();
                }
            }
        }

        trace_log!(returned = out.len(), "predicate scan");
        out
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::TreeConfig;

    /// Two-column key mirroring the storage engine's composite index
    /// keys: an integer attribute and a short string attribute.
    #[derive(Clone, Debug, PartialEq, Eq, PartialOrd, Ord)]
    struct CompositeKey {
        attr: i32,
        name: &'static str,
    }

    #[derive(Clone, Debug, PartialEq, PartialOrd)]
    enum Column {
        Int(i32),
        Str(&'static str),
    }

    impl KeyAttributes for CompositeKey {
        type Column = Column;

        fn column(&self, column_id: usize) -> Column {
            match column_id {
                0 => Column::Int(self.attr),
                1 => Column::Str(self.name),
                _ => panic!("unknown column {column_id}"),
            }
        }
    }

    fn ck(attr: i32, name: &'static str) -> CompositeKey {
        CompositeKey { attr, name }
    }

    #[test]
    fn test_scan_all_is_key_ordered() {
        let tree: BwTree<i64, u64> = BwTree::new();
        for i in [5, 1, 4, 2, 3] {
            tree.insert(i, i as u64).unwrap();
        }

        assert_eq!(tree.scan_all(), vec![1, 2, 3, 4, 5]);
    }

    #[test]
    fn test_range_predicates() {
        let tree: BwTree<CompositeKey, u64> = BwTree::new();
        for i in 1..=10 {
            tree.insert(ck(i, "x"), i as u64).unwrap();
        }

        // attr > 3
        let gt = tree.scan(
            &[Column::Int(3)],
            &[0],
            &[PredicateOp::GreaterThan],
            ScanDirection::Forward,
        );
        assert_eq!(gt.len(), 7);

        // attr <= 7
        let le = tree.scan(
            &[Column::Int(7)],
            &[0],
            &[PredicateOp::LessThanOrEqual],
            ScanDirection::Forward,
        );
        assert_eq!(le.len(), 7);

        // 3 < attr <= 7
        let band = tree.scan(
            &[Column::Int(3), Column::Int(7)],
            &[0, 0],
            &[PredicateOp::GreaterThan, PredicateOp::LessThanOrEqual],
            ScanDirection::Forward,
        );
        assert_eq!(band, vec![4, 5, 6, 7]);
    }

    #[test]
    fn test_backward_scan_is_descending() {
        let tree: BwTree<CompositeKey, u64> = BwTree::with_config(
            TreeConfig::default()
                .leaf_size_threshold(4)
                .delta_chain_threshold(2),
        );
        for i in 1..=32 {
            tree.insert(ck(i, "x"), i as u64).unwrap();
        }

        let backward = tree.scan(
            &[Column::Int(0)],
            &[0],
            &[PredicateOp::GreaterThan],
            ScanDirection::Backward,
        );
        let expected: Vec<u64> = (1..=32).rev().collect();
        assert_eq!(backward, expected);
    }

    #[test]
    fn test_second_column_predicate() {
        let tree: BwTree<CompositeKey, u64> = BwTree::new();
        tree.insert(ck(1, "a"), 1).unwrap();
        tree.insert(ck(1, "b"), 2).unwrap();
        tree.insert(ck(2, "a"), 3).unwrap();

        let only_a = tree.scan(
            &[Column::Str("a")],
            &[1],
            &[PredicateOp::Equal],
            ScanDirection::Forward,
        );
        assert_eq!(only_a, vec![1, 3]);
    }
}
