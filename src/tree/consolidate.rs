//! Consolidation: collapsing a delta chain into a fresh base.
//!
//! Consolidation is optimistic and idempotent. One attempt materializes
//! the logical content, builds a new base, and tries a single CAS; on
//! loss the candidate is freed and the attempt aborts, because whichever
//! mutation won the slot will re-cross the threshold and retry. It never
//! blocks mutations and is a no-op for observers.
//!
//! Both leaves and inner nodes consolidate; a folded split delta leaves
//! its mark as the new base's high fence and `next` link.

use seize::{Guard, LocalGuard};

use crate::key::KeyComparator;
use crate::node::{InnerBase, LeafBase, Node, NodeKind, chain_base, materialize_inner, materialize_leaf};
use crate::pid::{AtomicPid, Pid};
use crate::reclaim::{self, reclaim_chain_boxed};
use crate::tracing_helpers::debug_log;

use super::BwTree;

impl<K, V, C> BwTree<K, V, C>
where
    K: Clone,
    V: Clone + PartialEq,
    C: KeyComparator<K>,
{
    /// Collapse the leaf chain at `pid` into a single base node.
    pub(super) fn consolidate_leaf(&self, pid: Pid, guard: &LocalGuard<'_>) {
        let head = self.mapping.get(pid, guard);
        // SAFETY: protected chain head.
        let head_ref = unsafe { &*head };

        if head_ref.chain_length() == 0 {
            return;
        }

        debug_log!(
            pid = pid.index(),
            chain = head_ref.chain_length(),
            "consolidating leaf"
        );

        // SAFETY: same chain.
        let view = unsafe { materialize_leaf(head, &self.comparator) };
        // SAFETY: same chain.
        let base = unsafe { chain_base(head) };
        let leaf_base = base
            .as_leaf_base()
            .expect("leaf chain must end in a leaf base");

        // A split delta folded here supplies the successor; the base's
        // own link may predate the split fix-up.
        // SAFETY: same chain.
        let next = unsafe { self.leaf_successor(head) };

        let fresh = LeafBase {
            slots: view.slots,
            low_key: view.low_key,
            high_key: view.high_key,
            prev_leaf: AtomicPid::new(leaf_base.prev_leaf.load()),
            next_leaf: AtomicPid::new(next),
            parent: AtomicPid::new(leaf_base.parent.load()),
        };
        let candidate = Box::into_raw(Box::new(Node::new_leaf_base(fresh)));

        match self.mapping.cas(pid, head, candidate) {
            Ok(()) => {
                // SAFETY: the old chain is unlinked; the collector frees
                // it once every concurrent guard has exited.
                unsafe { guard.defer_retire(head, reclaim_chain_boxed::<K, V>) };
            }

            Err(_) => {
                // SAFETY: the candidate was never published.
                unsafe { reclaim::free_node(candidate) };
            }
        }
    }

    /// Collapse the inner chain at `pid` into a single base node.
    pub(super) fn consolidate_inner(&self, pid: Pid, guard: &LocalGuard<'_>) {
        let head = self.mapping.get(pid, guard);
        // SAFETY: protected chain head.
        let head_ref = unsafe { &*head };

        if head_ref.chain_length() == 0 {
            return;
        }

        debug_log!(
            pid = pid.index(),
            chain = head_ref.chain_length(),
            "consolidating inner"
        );

        // SAFETY: same chain.
        let view = unsafe { materialize_inner(head, &self.comparator) };
        // SAFETY: same chain.
        let base = unsafe { chain_base(head) };
        let inner_base = base
            .as_inner_base()
            .expect("inner chain must end in an inner base");

        let next = unsafe { self.inner_successor(head) };

        let fresh = InnerBase {
            keys: view.keys,
            children: view.children,
            low_key: view.low_key,
            high_key: view.high_key,
            next: AtomicPid::new(next),
            parent: AtomicPid::new(inner_base.parent.load()),
        };
        let candidate = Box::into_raw(Box::new(Node::new_inner_base(fresh, head_ref.level())));

        match self.mapping.cas(pid, head, candidate) {
            Ok(()) => {
                // SAFETY: see consolidate_leaf.
                unsafe { guard.defer_retire(head, reclaim_chain_boxed::<K, V>) };
            }

            Err(_) => {
                // SAFETY: the candidate was never published.
                unsafe { reclaim::free_node(candidate) };
            }
        }
    }

    /// Right neighbor of an inner chain (split sibling before the base's
    /// own link, mirroring `leaf_successor`).
    ///
    /// # Safety
    ///
    /// `head` must be a chain head kept live by the caller's guard.
    unsafe fn inner_successor(&self, head: *mut Node<K, V>) -> Pid {
        let mut cursor = head;

        loop {
            // SAFETY: forwarded caller contract; interiors are immutable.
            let record = unsafe { &*cursor };

            match &record.kind {
                NodeKind::Split(d) => return d.sibling,
                NodeKind::InnerBase(inner) => return inner.next.load(),
                _ => cursor = record.base_ptr(),
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use crate::config::TreeConfig;
    use crate::tree::BwTree;

    #[test]
    fn test_consolidation_is_invisible_to_readers() {
        // Chain threshold of 1 forces a consolidation after nearly every
        // publish.
        let tree: BwTree<i64, u64> =
            BwTree::with_config(TreeConfig::default().delta_chain_threshold(1));

        for i in 0..64 {
            tree.insert(i, (i * 10) as u64).unwrap();
            tree.insert(i, (i * 10 + 1) as u64).unwrap();
        }
        for i in (0..64).step_by(2) {
            tree.delete_pair(i, (i * 10) as u64);
        }

        for i in 0..64 {
            let mut values = tree.scan_key(&i);
            values.sort_unstable();
            if i % 2 == 0 {
                assert_eq!(values, vec![(i * 10 + 1) as u64], "key {i}");
            } else {
                assert_eq!(values, vec![(i * 10) as u64, (i * 10 + 1) as u64], "key {i}");
            }
        }
    }

    #[test]
    fn test_consolidated_chain_has_unit_length() {
        let tree: BwTree<i64, u64> =
            BwTree::with_config(TreeConfig::default().delta_chain_threshold(3));

        for i in 0..32 {
            tree.insert(1000, i).unwrap();
        }

        // Quiesced: every chain must be at or under the threshold + 1
        // (the publish that crossed it collapses the chain right after).
        for leaf in tree.leaves() {
            assert!(leaf.chain_length <= 4, "chain left at {}", leaf.chain_length);
        }
        assert_eq!(tree.scan_key(&1000).len(), 32);
    }
}
