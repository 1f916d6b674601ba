//! Structural modification: leaf and inner splits.
//!
//! A split is decomposed into two independently CAS-published steps so
//! that concurrent threads can make progress whether they observe zero,
//! one, or both:
//!
//! 1. The sibling's base is published on a fresh PID, then a split delta
//!    is CAS'd onto the overfull node. From this instant, readers route
//!    keys at or above the split key to the sibling even though the
//!    parent knows nothing yet.
//! 2. A separator delta is CAS'd onto the parent, making the sibling
//!    directly routable. When the parent itself crosses a threshold the
//!    cascade continues one level up; it terminates because each level
//!    gains at most one node per cascade.
//!
//! When the splitting node is the root, a fresh inner node pointing at it
//! is CAS'd into `m_root` first, so a parent always exists for step 2.

use seize::LocalGuard;

use crate::key::KeyComparator;
use crate::node::{
    InnerBase, LeafBase, Node, NodeKind, chain_base, materialize_inner, materialize_leaf,
    separator_position,
};
use crate::pid::{AtomicPid, Pid};
use crate::reclaim;
use crate::tracing_helpers::debug_log;

use super::BwTree;

impl<K, V, C> BwTree<K, V, C>
where
    K: Clone,
    V: Clone + PartialEq,
    C: KeyComparator<K>,
{
    /// Split the overfull leaf at `pid`, then install its separator.
    pub(super) fn split_leaf(&self, pid: Pid, guard: &LocalGuard<'_>) {
        if self.root.load() == pid {
            self.grow_root(pid, guard);
        }

        let split_key;
        let sibling_pid;
        let parent_hint;

        loop {
            let head = self.mapping.get(pid, guard);
            // SAFETY: protected chain head.
            let head_ref = unsafe { &*head };

            if head_ref.size() <= self.config.leaf_size_threshold {
                // Another thread already relieved the pressure.
                return;
            }

            // SAFETY: same chain.
            let view = unsafe { materialize_leaf(head, &self.comparator) };
            if view.slots.len() < 2 {
                return;
            }

            // SAFETY: same chain.
            let base = unsafe { chain_base(head) };
            let leaf_base = base
                .as_leaf_base()
                .expect("leaf chain must end in a leaf base");
            let parent = self.split_parent(base);
            let former_next = leaf_base.next_leaf.load();

            let mid = view.slots.len() / 2;
            let median = view.slots[mid].key.clone();

            let sibling = LeafBase {
                slots: view.slots[mid..].to_vec(),
                low_key: Some(median.clone()),
                high_key: view.high_key.clone(),
                prev_leaf: AtomicPid::new(pid),
                next_leaf: AtomicPid::new(former_next),
                parent: AtomicPid::new(parent),
            };
            let sibling_node = Box::into_raw(Box::new(Node::new_leaf_base(sibling)));
            let new_pid = self.mapping.allocate_pid();
            self.mapping.store(new_pid, sibling_node);

            // SAFETY: head is the observed chain head for pid.
            let delta = Box::into_raw(Box::new(unsafe {
                Node::new_split(median.clone(), new_pid, head, mid)
            }));

            match self.mapping.cas(pid, head, delta) {
                Ok(()) => {
                    debug_log!(
                        pid = pid.index(),
                        sibling = new_pid.index(),
                        "leaf split published"
                    );

                    // Fix the sideways pointers of the leaf chain.
                    leaf_base.next_leaf.store(new_pid);
                    if former_next.is_null() {
                        self.tail_leaf.store(new_pid);
                    } else {
                        let next_head = self.mapping.get(former_next, guard);
                        // SAFETY: protected chain head of the former next.
                        unsafe { chain_base(next_head) }
                            .as_leaf_base()
                            .expect("leaf chain must end in a leaf base")
                            .prev_leaf
                            .store(new_pid);
                    }

                    split_key = median;
                    sibling_pid = new_pid;
                    parent_hint = parent;
                    break;
                }

                Err(_) => {
                    // SAFETY: the delta was never published.
                    unsafe { reclaim::free_node(delta) };
                    // Nothing routes to the sibling PID yet; unpublish
                    // and free it directly. The PID itself is leaked by
                    // design (identifiers are never reused).
                    self.mapping.store(new_pid, std::ptr::null_mut());
                    // SAFETY: sibling was only reachable through new_pid.
                    unsafe { reclaim::free_node(sibling_node) };
                }
            }
        }

        self.install_separator(parent_hint, split_key, sibling_pid, guard);
    }

    /// Split the overfull inner node at `pid`, then install its separator.
    ///
    /// The median separator is promoted (it appears in the parent, not in
    /// either half), and every child moved to the sibling gets its parent
    /// back-pointer reset.
    pub(super) fn split_inner(&self, pid: Pid, guard: &LocalGuard<'_>) {
        if self.root.load() == pid {
            self.grow_root(pid, guard);
        }

        let split_key;
        let sibling_pid;
        let parent_hint;

        loop {
            let head = self.mapping.get(pid, guard);
            // SAFETY: protected chain head.
            let head_ref = unsafe { &*head };

            if head_ref.size() <= self.config.inner_size_threshold {
                return;
            }

            // SAFETY: same chain.
            let view = unsafe { materialize_inner(head, &self.comparator) };
            if view.keys.len() < 2 {
                return;
            }

            // SAFETY: same chain.
            let base = unsafe { chain_base(head) };
            let inner_base = base
                .as_inner_base()
                .expect("inner chain must end in an inner base");
            let parent = self.split_parent(base);
            let former_next = inner_base.next.load();

            let mid = view.keys.len() / 2;
            let promoted = view.keys[mid].clone();

            let moved_children = view.children[mid + 1..].to_vec();
            let sibling = InnerBase {
                keys: view.keys[mid + 1..].to_vec(),
                children: moved_children.clone(),
                low_key: Some(promoted.clone()),
                high_key: view.high_key.clone(),
                next: AtomicPid::new(former_next),
                parent: AtomicPid::new(parent),
            };
            let sibling_node =
                Box::into_raw(Box::new(Node::new_inner_base(sibling, head_ref.level())));
            let new_pid = self.mapping.allocate_pid();
            self.mapping.store(new_pid, sibling_node);

            // SAFETY: head is the observed chain head for pid.
            let delta = Box::into_raw(Box::new(unsafe {
                Node::new_split(promoted.clone(), new_pid, head, mid)
            }));

            match self.mapping.cas(pid, head, delta) {
                Ok(()) => {
                    debug_log!(
                        pid = pid.index(),
                        sibling = new_pid.index(),
                        "inner split published"
                    );

                    inner_base.next.store(new_pid);

                    // Re-home the moved subtrees. Back-pointers are
                    // advisory during the move; routing never depends on
                    // them.
                    for child in moved_children {
                        let child_head = self.mapping.get(child, guard);
                        // SAFETY: protected chain head of a live child.
                        unsafe { chain_base(child_head) }.parent_cell().store(new_pid);
                    }

                    split_key = promoted;
                    sibling_pid = new_pid;
                    parent_hint = parent;
                    break;
                }

                Err(_) => {
                    // SAFETY: the delta was never published.
                    unsafe { reclaim::free_node(delta) };
                    self.mapping.store(new_pid, std::ptr::null_mut());
                    // SAFETY: sibling was only reachable through new_pid.
                    unsafe { reclaim::free_node(sibling_node) };
                }
            }
        }

        self.install_separator(parent_hint, split_key, sibling_pid, guard);
    }

    /// Parent PID for a node about to split.
    ///
    /// Root growth precedes every root split, so a parent always exists;
    /// the winner of a racing growth may not have stored the back-pointer
    /// yet, hence the bounded wait.
    fn split_parent(&self, base: &Node<K, V>) -> Pid {
        let cell = base.parent_cell();

        loop {
            let parent = cell.load();
            if !parent.is_null() {
                return parent;
            }

            // Only reachable when pid was the root: growth has already
            // been requested and the winner's store is imminent.
            std::hint::spin_loop();
        }
    }

    /// Create a new root inner node above the splitting root `pid`.
    ///
    /// Lost races free the orphan; the winner re-homes the old root.
    fn grow_root(&self, pid: Pid, guard: &LocalGuard<'_>) {
        let head = self.mapping.get(pid, guard);
        // SAFETY: protected chain head.
        let level = unsafe { (*head).level() };

        let new_root = InnerBase {
            keys: Vec::new(),
            children: vec![pid],
            low_key: None,
            high_key: None,
            next: AtomicPid::null(),
            parent: AtomicPid::null(),
        };
        let new_root_node = Box::into_raw(Box::new(Node::new_inner_base(new_root, level + 1)));
        let new_pid = self.mapping.allocate_pid();
        self.mapping.store(new_pid, new_root_node);

        match self.root.compare_exchange(pid, new_pid) {
            Ok(_) => {
                debug_log!(root = new_pid.index(), level = level + 1, "root grew");
                // SAFETY: protected chain head; the old root's base
                // gains its first parent.
                unsafe { chain_base(head) }.parent_cell().store(new_pid);
            }

            Err(_) => {
                // Another split grew the root first.
                self.mapping.store(new_pid, std::ptr::null_mut());
                // SAFETY: the orphan was only reachable through new_pid.
                unsafe { reclaim::free_node(new_root_node) };
            }
        }
    }

    /// Publish a separator delta for a freshly split child.
    ///
    /// `routing_target` re-routes through the parent's own split deltas
    /// first, so the separator always lands on the inner node currently
    /// authoritative for the split key; a CAS loss re-resolves and
    /// retries there.
    fn install_separator(
        &self,
        parent_hint: Pid,
        split_key: K,
        child: Pid,
        guard: &LocalGuard<'_>,
    ) {
        let mut split_key = split_key;
        let mut parent_pid = parent_hint;

        loop {
            let (target_pid, head) = self.routing_target(parent_pid, &split_key, guard);

            // SAFETY: head is the protected chain head of the target.
            let view = unsafe { materialize_inner(head, &self.comparator) };

            // The authoritative right bound: the separator immediately
            // greater than the split key, or the node's own fence.
            let pos = separator_position(&view.keys, &split_key, &self.comparator);
            debug_assert!(
                pos >= view.keys.len() || !self.comparator.equal(&view.keys[pos], &split_key),
                "separator already installed"
            );
            let right_key = if pos < view.keys.len() {
                Some(view.keys[pos].clone())
            } else {
                view.high_key.clone()
            };

            // SAFETY: head stays valid for the guard's lifetime.
            let head_ref = unsafe { &*head };
            let new_size = head_ref.size() + 1;
            let chain_length = head_ref.chain_length() + 1;

            // SAFETY: head is the observed chain head for target_pid.
            let delta = Box::into_raw(Box::new(unsafe {
                Node::new_separator(split_key, right_key, child, head, new_size)
            }));

            match self.mapping.cas(target_pid, head, delta) {
                Ok(()) => {
                    debug_log!(
                        parent = target_pid.index(),
                        child = child.index(),
                        "separator published"
                    );

                    if new_size > self.config.inner_size_threshold {
                        self.split_inner(target_pid, guard);
                    } else if chain_length > self.config.delta_chain_threshold {
                        self.consolidate_inner(target_pid, guard);
                    }

                    return;
                }

                Err(_) => {
                    // SAFETY: unpublished orphan, exclusively owned.
                    let orphan = unsafe { Box::from_raw(delta) };
                    match orphan.kind {
                        NodeKind::Separator(d) => split_key = d.left_key,
                        _ => unreachable!("separator loop built a non-separator delta"),
                    }
                    parent_pid = target_pid;
                }
            }
        }
    }
}
