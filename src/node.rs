//! Filepath: src/node.rs
//!
//! Node representation for the Bw-tree.
//!
//! A logical node is a *chain*: zero or more delta records prepended in
//! front of a base node, interpreted LIFO by readers. Delta records are
//! immutable once published; the only fields ever written after
//! publication are the sibling/parent back-pointers on base nodes, which
//! live in atomic cells.
//!
//! The variants are a tagged enum rather than a trait hierarchy: readers
//! dispatch with a single discriminator match while walking a chain.
//!
//! # Chain layout
//!
//! ```text
//! mapping_table[pid] ──▶ InsertDelta ──▶ DeleteDelta ──▶ LeafBase
//!                        (newest)                        (oldest)
//! ```
//!
//! Every record carries `{level, size, chain_length}` so split and
//! consolidation thresholds are observable from the head without walking
//! the chain. `size` counts logical (key, value-list) slots for leaves
//! and routing entries for inner nodes.

use std::cmp::Ordering as CmpOrdering;

use crate::key::KeyComparator;
use crate::pid::{AtomicPid, Pid};

// ============================================================================
//  Leaf slots
// ============================================================================

/// One logical leaf slot: a key and its value list.
///
/// Duplicate keys share a slot; duplicate (key, value) pairs are distinct
/// entries within the list.
#[derive(Clone, Debug)]
pub(crate) struct LeafSlot<K, V> {
    pub key: K,
    pub values: Vec<V>,
}

impl<K, V> LeafSlot<K, V> {
    #[inline]
    pub(crate) fn new(key: K, value: V) -> Self {
        Self {
            key,
            values: vec![value],
        }
    }
}

// ============================================================================
//  Base nodes
// ============================================================================

/// Leaf base: sorted slots plus doubly-linked sibling PIDs.
///
/// `low_key`/`high_key` are the fence keys of the node's responsible
/// range `[low, high)`; `None` means ±∞. A split delta on the chain
/// overrides `high_key` until the next consolidation folds it in.
pub(crate) struct LeafBase<K, V> {
    pub slots: Vec<LeafSlot<K, V>>,
    pub low_key: Option<K>,
    pub high_key: Option<K>,
    pub prev_leaf: AtomicPid,
    pub next_leaf: AtomicPid,
    pub parent: AtomicPid,
}

impl<K, V> LeafBase<K, V> {
    /// Empty leaf covering the whole key space (the bootstrap root).
    pub(crate) fn empty() -> Self {
        Self {
            slots: Vec::new(),
            low_key: None,
            high_key: None,
            prev_leaf: AtomicPid::null(),
            next_leaf: AtomicPid::null(),
            parent: AtomicPid::null(),
        }
    }
}

/// Inner base: sorted separators and child PIDs.
///
/// Invariant: `children.len() == keys.len() + 1` and every key reachable
/// through `children[i]` is `< keys[i]` and `>= keys[i - 1]`.
pub(crate) struct InnerBase<K> {
    pub keys: Vec<K>,
    pub children: Vec<Pid>,
    pub low_key: Option<K>,
    pub high_key: Option<K>,
    pub next: AtomicPid,
    pub parent: AtomicPid,
}

// ============================================================================
//  Delta records
// ============================================================================

/// Logical insertion of one (key, value) pair.
pub(crate) struct InsertDelta<K, V> {
    pub key: K,
    pub value: V,
    pub base: *mut Node<K, V>,
}

/// Rewrite of the value list for an existing key.
pub(crate) struct UpdateDelta<K, V> {
    pub key: K,
    pub value: V,
    pub base: *mut Node<K, V>,
}

/// Removal of every pair matching (key, value) when `value` is `Some`,
/// or of every pair for the key when `value` is `None`.
pub(crate) struct DeleteDelta<K, V> {
    pub key: K,
    pub value: Option<V>,
    pub base: *mut Node<K, V>,
}

/// Logical truncation at `split_key`; keys `>= split_key` now live at
/// `sibling`. The sibling's base is published in the mapping table before
/// this record becomes visible.
pub(crate) struct SplitDelta<K, V> {
    pub split_key: K,
    pub sibling: Pid,
    pub base: *mut Node<K, V>,
}

/// Routing entry for a freshly split child, prepended to the parent.
///
/// Authoritative for keys in `[left_key, right_key)`; `right_key: None`
/// means +∞.
pub(crate) struct SeparatorDelta<K, V> {
    pub left_key: K,
    pub right_key: Option<K>,
    pub child: Pid,
    pub base: *mut Node<K, V>,
}

// ============================================================================
//  Node
// ============================================================================

/// Discriminated node record.
pub(crate) enum NodeKind<K, V> {
    LeafBase(LeafBase<K, V>),

    InnerBase(InnerBase<K>),

    Insert(InsertDelta<K, V>),

    Update(UpdateDelta<K, V>),

    Delete(DeleteDelta<K, V>),

    Split(SplitDelta<K, V>),

    Separator(SeparatorDelta<K, V>),
}

/// A chain record with its bookkeeping header.
pub(crate) struct Node<K, V> {
    level: u16,
    size: usize,
    chain_length: u32,
    pub(crate) kind: NodeKind<K, V>,
}

impl<K, V> Node<K, V> {
    /// Wrap a leaf base; `size` is the slot count.
    pub(crate) fn new_leaf_base(leaf: LeafBase<K, V>) -> Self {
        Self {
            level: 0,
            size: leaf.slots.len(),
            chain_length: 0,
            kind: NodeKind::LeafBase(leaf),
        }
    }

    /// Wrap an inner base at `level`; `size` is the separator count.
    pub(crate) fn new_inner_base(inner: InnerBase<K>, level: u16) -> Self {
        debug_assert!(level > 0, "inner nodes live above the leaf level");
        debug_assert_eq!(inner.children.len(), inner.keys.len() + 1);

        Self {
            level,
            size: inner.keys.len(),
            chain_length: 0,
            kind: NodeKind::InnerBase(inner),
        }
    }

    /// Prepend an insert delta to the chain headed by `base`.
    ///
    /// # Safety
    ///
    /// `base` must point at the live chain head observed by the caller.
    pub(crate) unsafe fn new_insert(key: K, value: V, base: *mut Self, size: usize) -> Self {
        // SAFETY: base is the protected chain head per the contract.
        let head = unsafe { &*base };

        Self {
            level: head.level,
            size,
            chain_length: head.chain_length + 1,
            kind: NodeKind::Insert(InsertDelta { key, value, base }),
        }
    }

    /// Prepend an update delta.
    ///
    /// # Safety
    ///
    /// `base` must point at the live chain head observed by the caller.
    pub(crate) unsafe fn new_update(key: K, value: V, base: *mut Self, size: usize) -> Self {
        // SAFETY: base is the protected chain head per the contract.
        let head = unsafe { &*base };

        Self {
            level: head.level,
            size,
            chain_length: head.chain_length + 1,
            kind: NodeKind::Update(UpdateDelta { key, value, base }),
        }
    }

    /// Prepend a delete delta (whole key when `value` is `None`).
    ///
    /// # Safety
    ///
    /// `base` must point at the live chain head observed by the caller.
    pub(crate) unsafe fn new_delete(
        key: K,
        value: Option<V>,
        base: *mut Self,
        size: usize,
    ) -> Self {
        // SAFETY: base is the protected chain head per the contract.
        let head = unsafe { &*base };

        Self {
            level: head.level,
            size,
            chain_length: head.chain_length + 1,
            kind: NodeKind::Delete(DeleteDelta { key, value, base }),
        }
    }

    /// Prepend a split delta; `size` is the retained (lower-half) slot
    /// count.
    ///
    /// # Safety
    ///
    /// `base` must point at the live chain head observed by the caller.
    pub(crate) unsafe fn new_split(split_key: K, sibling: Pid, base: *mut Self, size: usize) -> Self {
        // SAFETY: base is the protected chain head per the contract.
        let head = unsafe { &*base };

        Self {
            level: head.level,
            size,
            chain_length: head.chain_length + 1,
            kind: NodeKind::Split(SplitDelta {
                split_key,
                sibling,
                base,
            }),
        }
    }

    /// Prepend a separator delta to a parent chain.
    ///
    /// # Safety
    ///
    /// `base` must point at the live chain head observed by the caller.
    pub(crate) unsafe fn new_separator(
        left_key: K,
        right_key: Option<K>,
        child: Pid,
        base: *mut Self,
        size: usize,
    ) -> Self {
        // SAFETY: base is the protected chain head per the contract.
        let head = unsafe { &*base };
        debug_assert!(head.level > 0, "separator deltas only target inner chains");

        Self {
            level: head.level,
            size,
            chain_length: head.chain_length + 1,
            kind: NodeKind::Separator(SeparatorDelta {
                left_key,
                right_key,
                child,
                base,
            }),
        }
    }

    /// 0 for leaves, positive for inner nodes.
    #[inline]
    pub(crate) fn level(&self) -> u16 {
        self.level
    }

    /// Logical slot (leaf) or routing-entry (inner) count after
    /// consolidation.
    #[inline]
    pub(crate) fn size(&self) -> usize {
        self.size
    }

    /// 0 for bases, base length + 1 for deltas.
    #[inline]
    pub(crate) fn chain_length(&self) -> u32 {
        self.chain_length
    }

    /// The record this delta was prepended to; null for bases.
    #[inline]
    pub(crate) fn base_ptr(&self) -> *mut Self {
        match &self.kind {
            NodeKind::LeafBase(_) | NodeKind::InnerBase(_) => std::ptr::null_mut(),
            NodeKind::Insert(d) => d.base,
            NodeKind::Update(d) => d.base,
            NodeKind::Delete(d) => d.base,
            NodeKind::Split(d) => d.base,
            NodeKind::Separator(d) => d.base,
        }
    }

    #[inline]
    pub(crate) fn is_base(&self) -> bool {
        matches!(self.kind, NodeKind::LeafBase(_) | NodeKind::InnerBase(_))
    }

    #[inline]
    pub(crate) fn as_leaf_base(&self) -> Option<&LeafBase<K, V>> {
        match &self.kind {
            NodeKind::LeafBase(leaf) => Some(leaf),

            _ => None,
        }
    }

    #[inline]
    pub(crate) fn as_inner_base(&self) -> Option<&InnerBase<K>> {
        match &self.kind {
            NodeKind::InnerBase(inner) => Some(inner),

            _ => None,
        }
    }

    /// Parent back-pointer cell of a base node.
    ///
    /// # Panics
    ///
    /// Panics when called on a delta record; back-pointers live only on
    /// bases.
    pub(crate) fn parent_cell(&self) -> &AtomicPid {
        match &self.kind {
            NodeKind::LeafBase(leaf) => &leaf.parent,
            NodeKind::InnerBase(inner) => &inner.parent,
            _ => panic!("parent cell requested on a delta record"),
        }
    }
}

// ============================================================================
//  Chain walking
// ============================================================================

/// Walk a chain head-to-base, collecting every record.
///
/// # Safety
///
/// `head` must be a published chain head kept live by the caller's epoch
/// guard (or exclusive ownership during teardown).
pub(crate) unsafe fn collect_chain<'g, K, V>(head: *mut Node<K, V>) -> Vec<&'g Node<K, V>> {
    let mut chain: Vec<&Node<K, V>> = Vec::with_capacity(8);
    let mut cursor = head;

    while !cursor.is_null() {
        // SAFETY: cursor is either the protected head or a base pointer
        // of a record already on the chain; chain interiors are immutable.
        let record = unsafe { &*cursor };
        chain.push(record);
        cursor = record.base_ptr();
    }

    debug_assert!(
        chain.last().is_some_and(|record| record.is_base()),
        "chain must terminate at a base node"
    );

    chain
}

/// Resolve the base node at the tail of a chain.
///
/// # Safety
///
/// Same contract as [`collect_chain`].
pub(crate) unsafe fn chain_base<'g, K, V>(head: *mut Node<K, V>) -> &'g Node<K, V> {
    let mut cursor = head;

    loop {
        // SAFETY: see collect_chain.
        let record = unsafe { &*cursor };
        let below = record.base_ptr();

        if below.is_null() {
            return record;
        }

        cursor = below;
    }
}

// ============================================================================
//  Binary search helpers
// ============================================================================

/// Locate `key` among leaf slots: `Ok(i)` when slot `i` holds it,
/// `Err(i)` for its insertion point.
pub(crate) fn slot_position<K, V, C>(
    slots: &[LeafSlot<K, V>],
    key: &K,
    comparator: &C,
) -> Result<usize, usize>
where
    C: KeyComparator<K>,
{
    let idx = slots
        .partition_point(|slot| matches!(comparator.compare(&slot.key, key), CmpOrdering::Less));

    if idx < slots.len() && comparator.equal(&slots[idx].key, key) {
        Ok(idx)
    } else {
        Err(idx)
    }
}

/// Child index for `key` in a routing table: the number of separators
/// `<= key`, so an exact separator hit routes right.
pub(crate) fn route_index<K, C>(keys: &[K], key: &K, comparator: &C) -> usize
where
    C: KeyComparator<K>,
{
    keys.partition_point(|sep| !matches!(comparator.compare(sep, key), CmpOrdering::Greater))
}

/// Lower bound of `key` among separators (first index `>= key`).
pub(crate) fn separator_position<K, C>(keys: &[K], key: &K, comparator: &C) -> usize
where
    C: KeyComparator<K>,
{
    keys.partition_point(|sep| matches!(comparator.compare(sep, key), CmpOrdering::Less))
}

// ============================================================================
//  Materialized views
// ============================================================================

/// Logical content of a leaf chain.
pub(crate) struct LeafView<K, V> {
    pub slots: Vec<LeafSlot<K, V>>,
    pub low_key: Option<K>,
    pub high_key: Option<K>,
}

/// Logical routing table of an inner chain.
pub(crate) struct InnerView<K> {
    pub keys: Vec<K>,
    pub children: Vec<Pid>,
    pub low_key: Option<K>,
    pub high_key: Option<K>,
}

/// Materialize the logical slots of a leaf chain.
///
/// Deltas are interpreted LIFO: the walk collects head-to-base and
/// applies base-to-head, so newer records win. A split delta truncates
/// everything at or above its split key and tightens the high fence.
///
/// # Safety
///
/// Same contract as [`collect_chain`].
pub(crate) unsafe fn materialize_leaf<K, V, C>(head: *mut Node<K, V>, comparator: &C) -> LeafView<K, V>
where
    K: Clone,
    V: Clone + PartialEq,
    C: KeyComparator<K>,
{
    // SAFETY: forwarded caller contract.
    let chain = unsafe { collect_chain(head) };

    let base = chain
        .last()
        .and_then(|record| record.as_leaf_base())
        .expect("leaf chain must end in a leaf base");

    let mut view = LeafView {
        slots: base.slots.clone(),
        low_key: base.low_key.clone(),
        high_key: base.high_key.clone(),
    };

    for record in chain.iter().rev().skip(1) {
        match &record.kind {
            NodeKind::Insert(d) => match slot_position(&view.slots, &d.key, comparator) {
                Ok(i) => view.slots[i].values.push(d.value.clone()),
                Err(i) => view
                    .slots
                    .insert(i, LeafSlot::new(d.key.clone(), d.value.clone())),
            },

            NodeKind::Update(d) => {
                if let Ok(i) = slot_position(&view.slots, &d.key, comparator) {
                    view.slots[i].values = vec![d.value.clone()];
                }
            }

            NodeKind::Delete(d) => {
                if let Ok(i) = slot_position(&view.slots, &d.key, comparator) {
                    match &d.value {
                        None => {
                            view.slots.remove(i);
                        }

                        Some(value) => {
                            let slot = &mut view.slots[i];
                            slot.values.retain(|v| v != value);
                            if slot.values.is_empty() {
                                view.slots.remove(i);
                            }
                        }
                    }
                }
            }

            NodeKind::Split(d) => {
                let cut = view.slots.partition_point(|slot| {
                    matches!(comparator.compare(&slot.key, &d.split_key), CmpOrdering::Less)
                });
                view.slots.truncate(cut);
                view.high_key = Some(d.split_key.clone());
            }

            NodeKind::Separator(_) | NodeKind::InnerBase(_) | NodeKind::LeafBase(_) => {
                debug_assert!(false, "inner record on a leaf chain");
            }
        }
    }

    view
}

/// Materialize the routing table of an inner chain.
///
/// # Safety
///
/// Same contract as [`collect_chain`].
pub(crate) unsafe fn materialize_inner<K, V, C>(head: *mut Node<K, V>, comparator: &C) -> InnerView<K>
where
    K: Clone,
    C: KeyComparator<K>,
{
    // SAFETY: forwarded caller contract.
    let chain = unsafe { collect_chain(head) };

    let base = chain
        .last()
        .and_then(|record| record.as_inner_base())
        .expect("inner chain must end in an inner base");

    let mut view = InnerView {
        keys: base.keys.clone(),
        children: base.children.clone(),
        low_key: base.low_key.clone(),
        high_key: base.high_key.clone(),
    };

    for record in chain.iter().rev().skip(1) {
        match &record.kind {
            NodeKind::Separator(d) => {
                let i = separator_position(&view.keys, &d.left_key, comparator);
                if i < view.keys.len() && comparator.equal(&view.keys[i], &d.left_key) {
                    debug_assert!(false, "duplicate separator key");
                } else {
                    view.keys.insert(i, d.left_key.clone());
                    view.children.insert(i + 1, d.child);
                }
            }

            NodeKind::Split(d) => {
                let cut = separator_position(&view.keys, &d.split_key, comparator);
                view.keys.truncate(cut);
                view.children.truncate(cut + 1);
                view.high_key = Some(d.split_key.clone());
            }

            NodeKind::Insert(_)
            | NodeKind::Update(_)
            | NodeKind::Delete(_)
            | NodeKind::LeafBase(_)
            | NodeKind::InnerBase(_) => {
                debug_assert!(false, "leaf record on an inner chain");
            }
        }
    }

    debug_assert_eq!(view.children.len(), view.keys.len() + 1);
    view
}

/// Materialize the value list for a single key on a leaf chain.
///
/// Cheaper than [`materialize_leaf`] for point operations: only records
/// touching `key` are applied.
///
/// # Safety
///
/// Same contract as [`collect_chain`].
pub(crate) unsafe fn collect_key<K, V, C>(head: *mut Node<K, V>, key: &K, comparator: &C) -> Vec<V>
where
    V: Clone + PartialEq,
    C: KeyComparator<K>,
{
    // SAFETY: forwarded caller contract.
    let chain = unsafe { collect_chain(head) };

    let base = chain
        .last()
        .and_then(|record| record.as_leaf_base())
        .expect("leaf chain must end in a leaf base");

    let mut values: Vec<V> = match slot_position(&base.slots, key, comparator) {
        Ok(i) => base.slots[i].values.clone(),
        Err(_) => Vec::new(),
    };

    for record in chain.iter().rev().skip(1) {
        match &record.kind {
            NodeKind::Insert(d) if comparator.equal(&d.key, key) => {
                values.push(d.value.clone());
            }

            NodeKind::Update(d) if comparator.equal(&d.key, key) => {
                if !values.is_empty() {
                    values = vec![d.value.clone()];
                }
            }

            NodeKind::Delete(d) if comparator.equal(&d.key, key) => match &d.value {
                None => values.clear(),

                Some(value) => values.retain(|v| v != value),
            },

            NodeKind::Split(d) => {
                // Everything at or above the split key moved to the sibling.
                if !matches!(comparator.compare(key, &d.split_key), CmpOrdering::Less) {
                    values.clear();
                }
            }

            _ => {}
        }
    }

    values
}

/// Whether `key` falls inside the leaf chain's responsible range.
///
/// The high fence is taken from the newest split delta on the chain
/// (splits only tighten the range), falling back to the base fence.
///
/// # Safety
///
/// Same contract as [`collect_chain`].
pub(crate) unsafe fn leaf_in_range<K, V, C>(head: *mut Node<K, V>, key: &K, comparator: &C) -> bool
where
    C: KeyComparator<K>,
{
    let mut split_high: Option<&K> = None;
    let mut cursor = head;

    loop {
        // SAFETY: see collect_chain.
        let record = unsafe { &*cursor };

        match &record.kind {
            NodeKind::Split(d) => {
                if split_high.is_none() {
                    split_high = Some(&d.split_key);
                }
                cursor = d.base;
            }

            NodeKind::LeafBase(base) => {
                let high = split_high.or(base.high_key.as_ref());

                let above_low = base
                    .low_key
                    .as_ref()
                    .is_none_or(|low| !matches!(comparator.compare(key, low), CmpOrdering::Less));
                let below_high = high
                    .is_none_or(|h| matches!(comparator.compare(key, h), CmpOrdering::Less));

                return above_low && below_high;
            }

            _ => cursor = record.base_ptr(),
        }
    }
}

// ============================================================================
//  Tests
// ============================================================================
