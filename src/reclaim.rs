//! Reclaim helpers for seize-based memory reclamation.
//!
//! Chains replaced by a consolidation are handed to the collector via
//! `guard.defer_retire(head, reclaim_chain_boxed)` and freed once every
//! thread that entered before the retire has exited its guard; this is
//! the epoch contract of the reclaimer interface (`enter` = guard
//! construction, `exit` = guard drop, `retire` = defer_retire).
//!
//! Orphans that lost their publication CAS were never visible to another
//! thread and are freed immediately by the losing thread with
//! [`free_node`].

use seize::Collector;

use crate::node::Node;

/// Free an entire chain, walking base pointers down to and including the
/// base node.
///
/// # Safety
///
/// - `head` must point to a chain allocated via `Box::into_raw` per node.
/// - The chain must be unreachable: either retired and past its grace
///   period, or exclusively owned (teardown, CAS losers).
pub(crate) unsafe fn free_chain<K, V>(head: *mut Node<K, V>) {
    let mut cursor = head;

    while !cursor.is_null() {
        // SAFETY: every chain record came from Box::into_raw and the
        // caller guarantees exclusive ownership of the whole chain.
        let record = unsafe { Box::from_raw(cursor) };
        cursor = record.base_ptr();
    }
}

/// Free a single record without touching the chain below it.
///
/// # Safety
///
/// - `node` must have been allocated via `Box::into_raw`.
/// - No other thread may have observed the pointer (unpublished orphan).
pub(crate) unsafe fn free_node<K, V>(node: *mut Node<K, V>) {
    // SAFETY: caller guarantees exclusive ownership; Node has no Drop of
    // its own, so only this record's payload is released.
    drop(unsafe { Box::from_raw(node) });
}

/// Reclaim a replaced chain (seize callback).
///
/// # Safety
///
/// - `head` must be the head of a chain that was unlinked from its
///   mapping-table slot before retirement.
/// - Must only be called by the collector once no guard can still
///   reference the chain.
pub(crate) unsafe fn reclaim_chain_boxed<K, V>(head: *mut Node<K, V>, _collector: &Collector) {
    // SAFETY: seize guarantees the grace period has elapsed; the chain
    // was exclusively handed over at retire time.
    unsafe { free_chain(head) };
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::key::DefaultComparator;
    use crate::node::{LeafBase, materialize_leaf};
    use crate::pid::Pid;

    #[test]
    fn test_free_chain_walks_to_base() {
        let base: *mut Node<i64, u64> =
            Box::into_raw(Box::new(Node::new_leaf_base(LeafBase::empty())));
        let d1 = Box::into_raw(Box::new(unsafe { Node::new_insert(1, 10, base, 1) }));
        let d2 = Box::into_raw(Box::new(unsafe { Node::new_insert(2, 20, d1, 2) }));

        // Sanity: the chain is well formed before being torn down.
        let view = unsafe { materialize_leaf(d2, &DefaultComparator) };
        assert_eq!(view.slots.len(), 2);

        // Frees d2, d1 and the base; Miri would flag any double free.
        unsafe { free_chain(d2) };
    }

    #[test]
    fn test_free_node_leaves_chain_intact() {
        let base: *mut Node<i64, u64> =
            Box::into_raw(Box::new(Node::new_leaf_base(LeafBase::empty())));
        let orphan = Box::into_raw(Box::new(unsafe {
            Node::new_split(5, Pid::from_index(3), base, 0)
        }));

        // The orphan lost its CAS; the base below stays published.
        unsafe { free_node(orphan) };

        let view = unsafe { materialize_leaf(base, &DefaultComparator) };
        assert!(view.slots.is_empty());

        unsafe { free_chain(base) };
    }

    #[test]
    fn test_reclaim_callback_signature() {
        let collector = Collector::new();
        let base: *mut Node<i64, u64> =
            Box::into_raw(Box::new(Node::new_leaf_base(LeafBase::empty())));

        // SAFETY: base is exclusively owned by the test.
        unsafe { reclaim_chain_boxed(base, &collector) };
    }
}
