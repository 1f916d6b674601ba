//! Tree traversal: key-directed descent and the leaf sibling walk.
//!
//! Routing must stay correct while splits are mid-flight: a child's own
//! split delta is authoritative and is honored before the parent has
//! observed the corresponding separator. Three mechanisms cooperate:
//!
//! 1. Split deltas on the walked chain redirect keys at or above the
//!    split key to the sibling PID.
//! 2. Separator deltas short-circuit descent for their `[left, right)`
//!    range before the inner base is consulted.
//! 3. Base fence keys catch the consolidated-but-unseparated window: a
//!    key at or above the base's high fence follows the base's `next`
//!    link sideways.

use std::cmp::Ordering as CmpOrdering;

use seize::LocalGuard;

use crate::key::KeyComparator;
use crate::node::{Node, NodeKind, chain_base, leaf_in_range, route_index};
use crate::pid::Pid;

use super::BwTree;

impl<K, V, C> BwTree<K, V, C>
where
    K: Clone,
    V: Clone + PartialEq,
    C: KeyComparator<K>,
{
    #[inline]
    fn key_less(&self, a: &K, b: &K) -> bool {
        matches!(self.comparator.compare(a, b), CmpOrdering::Less)
    }

    /// Descend from the root to the leaf chain responsible for `key`.
    ///
    /// Returns the leaf's PID and the chain head that was observed; the
    /// head is the CAS expectation for any delta built against it.
    ///
    /// Must not be called before the root is bootstrapped.
    pub(super) fn find_leaf(&self, key: &K, guard: &LocalGuard<'_>) -> (Pid, *mut Node<K, V>) {
        let mut pid = self.root.load();
        debug_assert!(!pid.is_null(), "find_leaf on an unbootstrapped tree");

        let mut node = self.mapping.get(pid, guard);

        // Inner descent.
        // SAFETY: chain heads stay valid for the guard's lifetime.
        while unsafe { (*node).level() } > 0 {
            pid = self.find_child(pid, key, guard);
            node = self.mapping.get(pid, guard);
        }

        // Leaf sibling walk: an in-progress split may have moved the key
        // to a right sibling only reachable through `next`.
        loop {
            // SAFETY: node is the protected head of a live leaf chain.
            if unsafe { leaf_in_range(node, key, &self.comparator) } {
                break;
            }

            // SAFETY: same chain as above.
            let base = unsafe { chain_base(node) };
            let next = base
                .as_leaf_base()
                .expect("leaf chain must end in a leaf base")
                .next_leaf
                .load();

            if next.is_null() {
                // Fell off the chain; retain the last non-null leaf.
                break;
            }

            pid = next;
            node = self.mapping.get(pid, guard);
        }

        (pid, node)
    }

    /// Route one level down from the inner node `pid`.
    ///
    /// Walks the chain top-down honoring split and separator deltas, then
    /// binary-searches the base's routing table.
    fn find_child(&self, pid: Pid, key: &K, guard: &LocalGuard<'_>) -> Pid {
        let mut pid = pid;

        'node: loop {
            let head = self.mapping.get(pid, guard);
            let mut cursor = head;

            loop {
                // SAFETY: cursor starts at a protected head and only
                // follows immutable base pointers.
                let record = unsafe { &*cursor };

                match &record.kind {
                    NodeKind::Split(d) => {
                        if !self.key_less(key, &d.split_key) {
                            pid = d.sibling;
                            continue 'node;
                        }
                        cursor = d.base;
                    }

                    NodeKind::Separator(d) => {
                        let at_or_above_left = !self.key_less(key, &d.left_key);
                        let below_right = d
                            .right_key
                            .as_ref()
                            .is_none_or(|right| self.key_less(key, right));

                        if at_or_above_left && below_right {
                            return d.child;
                        }
                        cursor = d.base;
                    }

                    NodeKind::InnerBase(inner) => {
                        if let Some(high) = &inner.high_key {
                            if !self.key_less(key, high) {
                                // Consolidated split whose separator is
                                // not installed yet; go sideways.
                                let next = inner.next.load();
                                debug_assert!(!next.is_null(), "fenced inner node without next");
                                if !next.is_null() {
                                    pid = next;
                                    continue 'node;
                                }
                            }
                        }

                        return inner.children[route_index(&inner.keys, key, &self.comparator)];
                    }

                    NodeKind::LeafBase(_)
                    | NodeKind::Insert(_)
                    | NodeKind::Update(_)
                    | NodeKind::Delete(_) => {
                        unreachable!("leaf record on an inner chain");
                    }
                }
            }
        }
    }

    /// Locate the inner node currently authoritative for `key`, starting
    /// from `start` and moving only sideways (split siblings, `next`
    /// links). Returns the PID and its observed chain head.
    ///
    /// Used to place separator deltas on the right parent even when the
    /// parent itself split since the child last read its back-pointer.
    pub(super) fn routing_target(
        &self,
        start: Pid,
        key: &K,
        guard: &LocalGuard<'_>,
    ) -> (Pid, *mut Node<K, V>) {
        let mut pid = start;

        'node: loop {
            let head = self.mapping.get(pid, guard);
            let mut cursor = head;

            loop {
                // SAFETY: see find_child.
                let record = unsafe { &*cursor };

                match &record.kind {
                    NodeKind::Split(d) => {
                        if !self.key_less(key, &d.split_key) {
                            pid = d.sibling;
                            continue 'node;
                        }
                        cursor = d.base;
                    }

                    NodeKind::Separator(d) => cursor = d.base,

                    NodeKind::InnerBase(inner) => {
                        if let Some(high) = &inner.high_key {
                            if !self.key_less(key, high) {
                                let next = inner.next.load();
                                debug_assert!(!next.is_null(), "fenced inner node without next");
                                if !next.is_null() {
                                    pid = next;
                                    continue 'node;
                                }
                            }
                        }

                        return (pid, head);
                    }

                    NodeKind::LeafBase(_)
                    | NodeKind::Insert(_)
                    | NodeKind::Update(_)
                    | NodeKind::Delete(_) => {
                        unreachable!("leaf record on an inner chain");
                    }
                }
            }
        }
    }

    /// PID of the leftmost leaf, by repeated descent through `children[0]`.
    ///
    /// Deltas never displace a base's leftmost child (separators insert to
    /// the right, splits truncate the right), so the base table suffices.
    pub(super) fn leftmost_leaf(&self, guard: &LocalGuard<'_>) -> Pid {
        let mut pid = self.root.load();
        if pid.is_null() {
            return Pid::NULL;
        }

        loop {
            let head = self.mapping.get(pid, guard);

            // SAFETY: protected chain head.
            if unsafe { (*head).level() } == 0 {
                return pid;
            }

            // SAFETY: same chain.
            let base = unsafe { chain_base(head) };
            pid = base
                .as_inner_base()
                .expect("inner chain must end in an inner base")
                .children[0];
        }
    }

    /// PID of the rightmost leaf: descent with +∞ routing semantics, then
    /// a `next` walk to the end of the leaf chain.
    pub(super) fn rightmost_leaf(&self, guard: &LocalGuard<'_>) -> Pid {
        let mut pid = self.root.load();
        if pid.is_null() {
            return Pid::NULL;
        }

        'node: loop {
            let head = self.mapping.get(pid, guard);

            // SAFETY: protected chain head.
            if unsafe { (*head).level() } == 0 {
                break;
            }

            let mut cursor = head;
            loop {
                // SAFETY: see find_child.
                let record = unsafe { &*cursor };

                match &record.kind {
                    // +∞ is at or above every split key.
                    NodeKind::Split(d) => {
                        pid = d.sibling;
                        continue 'node;
                    }

                    NodeKind::Separator(d) => {
                        if d.right_key.is_none() {
                            pid = d.child;
                            continue 'node;
                        }
                        cursor = d.base;
                    }

                    NodeKind::InnerBase(inner) => {
                        if inner.high_key.is_some() {
                            let next = inner.next.load();
                            debug_assert!(!next.is_null(), "fenced inner node without next");
                            if !next.is_null() {
                                pid = next;
                                continue 'node;
                            }
                        }

                        pid = *inner.children.last().expect("inner base without children");
                        continue 'node;
                    }

                    _ => unreachable!("leaf record on an inner chain"),
                }
            }
        }

        // Leaf level: run out the chain.
        loop {
            let head = self.mapping.get(pid, guard);
            // SAFETY: protected chain head.
            let next = unsafe { self.leaf_successor(head) };
            if next.is_null() {
                return pid;
            }
            pid = next;
        }
    }

    /// Right neighbor of a leaf chain.
    ///
    /// A split delta's sibling takes precedence over the base's `next`
    /// link, which may not have been fixed up yet.
    ///
    /// # Safety
    ///
    /// `head` must be a chain head kept live by the caller's guard.
    pub(super) unsafe fn leaf_successor(&self, head: *mut Node<K, V>) -> Pid {
        let mut cursor = head;

        loop {
            // SAFETY: forwarded caller contract; interiors are immutable.
            let record = unsafe { &*cursor };

            match &record.kind {
                NodeKind::Split(d) => return d.sibling,
                NodeKind::LeafBase(base) => return base.next_leaf.load(),
                _ => cursor = record.base_ptr(),
            }
        }
    }

    /// Entry point for forward scans; falls back to descent while the
    /// bootstrap winner has not yet published the head-leaf PID.
    pub(super) fn head_leaf_pid(&self, guard: &LocalGuard<'_>) -> Pid {
        let head = self.head_leaf.load();
        if !head.is_null() {
            return head;
        }
        self.leftmost_leaf(guard)
    }

    /// Entry point for backward scans; see [`head_leaf_pid`].
    ///
    /// [`head_leaf_pid`]: Self::head_leaf_pid
    pub(super) fn tail_leaf_pid(&self, guard: &LocalGuard<'_>) -> Pid {
        let tail = self.tail_leaf.load();
        if !tail.is_null() {
            return tail;
        }
        self.rightmost_leaf(guard)
    }
}
