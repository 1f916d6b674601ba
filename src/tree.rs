//! Filepath: src/tree.rs
//!
//! `BwTree` - a concurrent, latch-free ordered index.
//!
//! This module provides the main `BwTree<K, V, C>` engine and the
//! `BwTreeIndex<K, V, C>` storage-engine facade.
//!
//! # Design
//!
//! Logical node identity is separated from physical representation: the
//! mapping table translates stable PIDs to chain heads, mutations prepend
//! delta records, and every commit is a single CAS on one mapping-table
//! slot. There are no locks anywhere; contention surfaces as CAS failure
//! and is retried from a well-defined point.
//!
//! The only other shared cells are `m_root` and the head/tail leaf PIDs.
//! Splits are two independently published steps (split delta on the
//! child, separator delta on the parent) that concurrent operations can
//! observe mid-flight and route around.

use std::marker::PhantomData;
use std::sync::atomic::AtomicUsize;

use seize::{Collector, LocalGuard};

use crate::config::TreeConfig;
use crate::key::{DefaultComparator, KeyComparator};
use crate::mapping::MappingTable;
use crate::node::{LeafBase, Node};
use crate::ordering::RELAXED;
use crate::pid::{AtomicPid, Pid};
use crate::reclaim;
use crate::tracing_helpers::debug_log;

mod consolidate;
mod index;
mod leaf_iterator;
mod ops;
mod scan;
mod split;
mod traverse;

pub use index::BwTreeIndex;
pub use leaf_iterator::{LeafChainIter, LeafSummary};

/// A concurrent, latch-free ordered index of the Bw-tree family.
///
/// Keys need not be unique unless configured so; duplicate (key, value)
/// pairs are distinct entries. All operations take `&self` and are safe
/// to call from any number of threads.
///
/// # Type Parameters
///
/// * `K` - Key type, ordered by the comparator `C`
/// * `V` - Value type (typically a small tuple pointer)
/// * `C` - Key comparator (default: the key's own `Ord`)
///
/// # Example
///
/// ```
/// use bwtree::BwTree;
///
/// let tree: BwTree<i64, u64> = BwTree::new();
/// tree.insert(100, 5).unwrap();
/// tree.insert(100, 7).unwrap();
///
/// assert_eq!(tree.scan_key(&100).len(), 2);
/// ```
pub struct BwTree<K, V, C = DefaultComparator> {
    /// PID to chain-head indirection; the sole synchronization point.
    mapping: MappingTable<K, V>,

    /// Root PID; null until the first mutation bootstraps the tree.
    root: AtomicPid,

    /// Leftmost leaf, the entry point of full scans.
    head_leaf: AtomicPid,

    /// Rightmost leaf, the entry point of backward scans.
    tail_leaf: AtomicPid,

    config: TreeConfig,
    comparator: C,

    /// Epoch reclaimer; replaced chains are retired here.
    collector: Collector,

    /// Live (key, value) pair count, maintained incrementally.
    count: AtomicUsize,

    _marker: PhantomData<*mut Node<K, V>>,
}

// SAFETY: all shared state is behind atomics; nodes cross threads only
// through the mapping table, so the usual container bounds apply.
unsafe impl<K: Send + Sync, V: Send + Sync, C: Send + Sync> Send for BwTree<K, V, C> {}

// SAFETY: see the Send impl; `&BwTree` hands out clones of K/V and all
// interior mutation goes through CAS.
unsafe impl<K: Send + Sync, V: Send + Sync, C: Send + Sync> Sync for BwTree<K, V, C> {}

impl<K, V> BwTree<K, V, DefaultComparator>
where
    K: Clone + Ord,
    V: Clone + PartialEq,
{
    /// Create an empty tree ordered by the key's `Ord` instance.
    #[must_use]
    pub fn new() -> Self {
        Self::with_config(TreeConfig::default())
    }

    /// Create an empty tree with custom thresholds.
    #[must_use]
    pub fn with_config(config: TreeConfig) -> Self {
        Self::with_comparator(DefaultComparator, config)
    }
}

impl<K, V> Default for BwTree<K, V, DefaultComparator>
where
    K: Clone + Ord,
    V: Clone + PartialEq,
{
    #[inline]
    fn default() -> Self {
        Self::new()
    }
}

impl<K, V, C> BwTree<K, V, C>
where
    K: Clone,
    V: Clone + PartialEq,
    C: KeyComparator<K>,
{
    /// Create an empty tree with a caller-supplied comparator.
    #[must_use]
    pub fn with_comparator(comparator: C, config: TreeConfig) -> Self {
        Self {
            mapping: MappingTable::new(),
            root: AtomicPid::null(),
            head_leaf: AtomicPid::null(),
            tail_leaf: AtomicPid::null(),
            config,
            comparator,
            collector: Collector::new(),
            count: AtomicUsize::new(0),
            _marker: PhantomData,
        }
    }

    /// Enter a protected region and return a guard.
    ///
    /// Chain heads loaded while the guard is live cannot be reclaimed.
    /// The `*_with_guard` operation variants let a caller amortize one
    /// guard over many operations.
    #[must_use]
    #[inline]
    pub fn guard(&self) -> LocalGuard<'_> {
        self.collector.enter()
    }

    /// Number of live (key, value) pairs.
    ///
    /// Exact when quiesced; a racing snapshot otherwise.
    #[must_use]
    #[inline]
    pub fn len(&self) -> usize {
        self.count.load(RELAXED)
    }

    /// Check if the tree holds no pairs.
    #[must_use]
    #[inline]
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// The active configuration.
    #[must_use]
    #[inline]
    pub fn config(&self) -> &TreeConfig {
        &self.config
    }

    #[inline]
    pub(crate) fn comparator(&self) -> &C {
        &self.comparator
    }

    /// Lazily install an empty leaf as the root.
    ///
    /// Every modification operator calls this first; losers of the root
    /// CAS free their orphan and proceed against the winner's root.
    pub(crate) fn ensure_root(&self, _guard: &LocalGuard<'_>) {
        if !self.root.load().is_null() {
            return;
        }

        let leaf = Box::into_raw(Box::new(Node::new_leaf_base(LeafBase::empty())));
        let pid = self.mapping.allocate_pid();
        self.mapping.store(pid, leaf);

        match self.root.compare_exchange(Pid::NULL, pid) {
            Ok(_) => {
                debug_log!(root = pid.index(), "bootstrapped root leaf");
                let _ = self.head_leaf.compare_exchange(Pid::NULL, pid);
                let _ = self.tail_leaf.compare_exchange(Pid::NULL, pid);
            }

            Err(_) => {
                // Lost the bootstrap race; nobody has seen our PID.
                self.mapping.store(pid, std::ptr::null_mut());
                // SAFETY: leaf was never reachable through a published PID.
                unsafe { reclaim::free_node(leaf) };
            }
        }
    }

    /// Quiescent iterator over the leaf chain, head to tail.
    ///
    /// Diagnostic tool: only meaningful when no concurrent mutations are
    /// in flight.
    #[must_use]
    pub fn leaves(&self) -> LeafChainIter<'_, K, V, C> {
        LeafChainIter::new(self)
    }
}

impl<K, V, C> Drop for BwTree<K, V, C> {
    fn drop(&mut self) {
        // Every live PID owns its chain exclusively at this point;
        // chains retired earlier are released by the collector's drop.
        for index in 0..self.mapping.allocated() {
            let head = self.mapping.load_exclusive(Pid::from_index(index));
            if !head.is_null() {
                // SAFETY: `&mut self` guarantees no concurrent readers,
                // and distinct PIDs never share chain records.
                unsafe { reclaim::free_chain(head) };
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_bootstrap_is_idempotent() {
        let tree: BwTree<i64, u64> = BwTree::new();
        let guard = tree.guard();

        tree.ensure_root(&guard);
        let root = tree.root.load();
        assert!(!root.is_null());

        tree.ensure_root(&guard);
        assert_eq!(tree.root.load(), root);
        assert_eq!(tree.head_leaf.load(), root);
        assert_eq!(tree.tail_leaf.load(), root);
    }

    #[test]
    fn test_empty_tree_teardown() {
        // Drop with no operations must not touch any chain.
        let tree: BwTree<i64, u64> = BwTree::new();
        drop(tree);
    }

    #[test]
    fn test_len_tracks_pairs() {
        let tree: BwTree<i64, u64> = BwTree::new();
        assert!(tree.is_empty());

        tree.insert(1, 10).unwrap();
        tree.insert(1, 11).unwrap();
        tree.insert(2, 20).unwrap();
        assert_eq!(tree.len(), 3);

        tree.delete_key(1);
        assert_eq!(tree.len(), 1);

        tree.delete_pair(2, 20);
        assert!(tree.is_empty());
    }
}
