//! Modification operators: insert, update, delete-key, delete-pair.
//!
//! All four share one skeleton:
//!
//! 1. Bootstrap the root if this is the first mutation.
//! 2. Locate the target leaf (descent + sibling walk).
//! 3. Build one delta against the observed chain head, with the chain
//!    length and logical size carried forward so thresholds stay
//!    observable from the head.
//! 4. Publish by CAS on the leaf's PID. A failed CAS returns ownership
//!    of the key/value to the loop and retries from step 2; a successful
//!    one checks the split (insert only) and consolidation thresholds.
//!
//! Deletes and updates that can match nothing publish no delta at all:
//! the operation is a silent no-op, and the size accounting stays exact.

use seize::LocalGuard;

use crate::error::InsertError;
use crate::key::KeyComparator;
use crate::node::{Node, NodeKind, collect_key};
use crate::ordering::RELAXED;
use crate::tracing_helpers::trace_log;

use super::BwTree;

impl<K, V, C> BwTree<K, V, C>
where
    K: Clone,
    V: Clone + PartialEq,
    C: KeyComparator<K>,
{
    /// Insert one (key, value) pair. Duplicates are allowed unless the
    /// tree was configured with `unique_keys`.
    ///
    /// # Errors
    ///
    /// [`InsertError::DuplicateKey`] under `unique_keys` when the key is
    /// already present.
    #[inline]
    pub fn insert(&self, key: K, value: V) -> Result<(), InsertError> {
        let guard = self.guard();
        self.insert_with_guard(key, value, &guard)
    }

    /// [`insert`](Self::insert) against a caller-held epoch guard.
    pub fn insert_with_guard(
        &self,
        key: K,
        value: V,
        guard: &LocalGuard<'_>,
    ) -> Result<(), InsertError> {
        self.ensure_root(guard);

        let mut key = key;
        let mut value = value;

        loop {
            let (pid, head) = self.find_leaf(&key, guard);

            // SAFETY: head is the protected chain head for pid.
            let existing = unsafe { collect_key(head, &key, &self.comparator) };
            if self.config.unique_keys && !existing.is_empty() {
                return Err(InsertError::DuplicateKey);
            }

            // SAFETY: head stays valid for the guard's lifetime.
            let head_ref = unsafe { &*head };
            let new_size = head_ref.size() + usize::from(existing.is_empty());
            let chain_length = head_ref.chain_length() + 1;

            // SAFETY: head is the observed chain head; it becomes this
            // delta's base only if the CAS below succeeds.
            let delta =
                Box::into_raw(Box::new(unsafe { Node::new_insert(key, value, head, new_size) }));

            match self.mapping.cas(pid, head, delta) {
                Ok(()) => {
                    self.count.fetch_add(1, RELAXED);
                    trace_log!(pid = pid.index(), size = new_size, "insert delta published");

                    if new_size > self.config.leaf_size_threshold {
                        self.split_leaf(pid, guard);
                    } else if chain_length > self.config.delta_chain_threshold {
                        self.consolidate_leaf(pid, guard);
                    }

                    return Ok(());
                }

                Err(_) => {
                    // SAFETY: the delta lost its CAS and was never
                    // published; we are its only owner.
                    let orphan = unsafe { Box::from_raw(delta) };
                    match orphan.kind {
                        NodeKind::Insert(d) => {
                            key = d.key;
                            value = d.value;
                        }
                        _ => unreachable!("insert loop built a non-insert delta"),
                    }
                }
            }
        }
    }

    /// Rewrite the value list of `key` to exactly `[value]`.
    ///
    /// No-op when the key is absent.
    #[inline]
    pub fn update(&self, key: K, value: V) {
        let guard = self.guard();
        self.update_with_guard(key, value, &guard);
    }

    /// [`update`](Self::update) against a caller-held epoch guard.
    pub fn update_with_guard(&self, key: K, value: V, guard: &LocalGuard<'_>) {
        self.ensure_root(guard);

        let mut key = key;
        let mut value = value;

        loop {
            let (pid, head) = self.find_leaf(&key, guard);

            // SAFETY: head is the protected chain head for pid.
            let existing = unsafe { collect_key(head, &key, &self.comparator) };
            if existing.is_empty() {
                return;
            }

            // SAFETY: head stays valid for the guard's lifetime.
            let head_ref = unsafe { &*head };
            let size = head_ref.size();
            let chain_length = head_ref.chain_length() + 1;

            // SAFETY: see insert_with_guard.
            let delta =
                Box::into_raw(Box::new(unsafe { Node::new_update(key, value, head, size) }));

            match self.mapping.cas(pid, head, delta) {
                Ok(()) => {
                    // The slot collapses to a single pair.
                    if existing.len() > 1 {
                        self.count.fetch_sub(existing.len() - 1, RELAXED);
                    }
                    trace_log!(pid = pid.index(), "update delta published");

                    if chain_length > self.config.delta_chain_threshold {
                        self.consolidate_leaf(pid, guard);
                    }

                    return;
                }

                Err(_) => {
                    // SAFETY: unpublished orphan, exclusively owned.
                    let orphan = unsafe { Box::from_raw(delta) };
                    match orphan.kind {
                        NodeKind::Update(d) => {
                            key = d.key;
                            value = d.value;
                        }
                        _ => unreachable!("update loop built a non-update delta"),
                    }
                }
            }
        }
    }

    /// Remove every pair stored under `key`.
    ///
    /// No-op when the key is absent.
    #[inline]
    pub fn delete_key(&self, key: K) {
        let guard = self.guard();
        self.delete_key_with_guard(key, &guard);
    }

    /// [`delete_key`](Self::delete_key) against a caller-held epoch guard.
    pub fn delete_key_with_guard(&self, key: K, guard: &LocalGuard<'_>) {
        self.ensure_root(guard);

        let mut key = key;

        loop {
            let (pid, head) = self.find_leaf(&key, guard);

            // SAFETY: head is the protected chain head for pid.
            let existing = unsafe { collect_key(head, &key, &self.comparator) };
            if existing.is_empty() {
                return;
            }

            // SAFETY: head stays valid for the guard's lifetime.
            let head_ref = unsafe { &*head };
            let new_size = head_ref.size() - 1;
            let chain_length = head_ref.chain_length() + 1;

            // SAFETY: see insert_with_guard.
            let delta =
                Box::into_raw(Box::new(unsafe { Node::new_delete(key, None, head, new_size) }));

            match self.mapping.cas(pid, head, delta) {
                Ok(()) => {
                    self.count.fetch_sub(existing.len(), RELAXED);
                    trace_log!(pid = pid.index(), removed = existing.len(), "delete-key published");

                    if chain_length > self.config.delta_chain_threshold {
                        self.consolidate_leaf(pid, guard);
                    }

                    return;
                }

                Err(_) => {
                    // SAFETY: unpublished orphan, exclusively owned.
                    let orphan = unsafe { Box::from_raw(delta) };
                    match orphan.kind {
                        NodeKind::Delete(d) => key = d.key,
                        _ => unreachable!("delete loop built a non-delete delta"),
                    }
                }
            }
        }
    }

    /// Remove every occurrence of the exact (key, value) pair.
    ///
    /// No-op when no such pair exists.
    #[inline]
    pub fn delete_pair(&self, key: K, value: V) {
        let guard = self.guard();
        self.delete_pair_with_guard(key, value, &guard);
    }

    /// [`delete_pair`](Self::delete_pair) against a caller-held epoch
    /// guard.
    pub fn delete_pair_with_guard(&self, key: K, value: V, guard: &LocalGuard<'_>) {
        self.ensure_root(guard);

        let mut key = key;
        let mut value = value;

        loop {
            let (pid, head) = self.find_leaf(&key, guard);

            // SAFETY: head is the protected chain head for pid.
            let existing = unsafe { collect_key(head, &key, &self.comparator) };
            let matched = existing.iter().filter(|v| **v == value).count();
            if matched == 0 {
                return;
            }

            // SAFETY: head stays valid for the guard's lifetime.
            let head_ref = unsafe { &*head };
            // The slot disappears only when every pair under the key
            // matched.
            let new_size = head_ref.size() - usize::from(matched == existing.len());
            let chain_length = head_ref.chain_length() + 1;

            // SAFETY: see insert_with_guard.
            let delta = Box::into_raw(Box::new(unsafe {
                Node::new_delete(key, Some(value), head, new_size)
            }));

            match self.mapping.cas(pid, head, delta) {
                Ok(()) => {
                    self.count.fetch_sub(matched, RELAXED);
                    trace_log!(pid = pid.index(), removed = matched, "delete-pair published");

                    if chain_length > self.config.delta_chain_threshold {
                        self.consolidate_leaf(pid, guard);
                    }

                    return;
                }

                Err(_) => {
                    // SAFETY: unpublished orphan, exclusively owned.
                    let orphan = unsafe { Box::from_raw(delta) };
                    match orphan.kind {
                        NodeKind::Delete(d) => {
                            key = d.key;
                            value = d.value.expect("delete-pair delta carries a value");
                        }
                        _ => unreachable!("delete loop built a non-delete delta"),
                    }
                }
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::TreeConfig;

    #[test]
    fn test_insert_then_point_read() {
        let tree: BwTree<i64, u64> = BwTree::new();
        tree.insert(100, 1).unwrap();

        assert_eq!(tree.scan_key(&100), vec![1]);
        assert!(tree.scan_key(&101).is_empty());
    }

    #[test]
    fn test_duplicate_pairs_accumulate() {
        let tree: BwTree<i64, u64> = BwTree::new();
        tree.insert(100, 1).unwrap();
        tree.insert(100, 2).unwrap();
        tree.insert(100, 1).unwrap();

        let mut values = tree.scan_key(&100);
        values.sort_unstable();
        assert_eq!(values, vec![1, 1, 2]);
    }

    #[test]
    fn test_delete_pair_removes_every_occurrence() {
        let tree: BwTree<i64, u64> = BwTree::new();
        tree.insert(7, 1).unwrap();
        tree.insert(7, 2).unwrap();
        tree.insert(7, 1).unwrap();

        tree.delete_pair(7, 1);
        assert_eq!(tree.scan_key(&7), vec![2]);
        assert_eq!(tree.len(), 1);

        tree.delete_pair(7, 2);
        assert!(tree.scan_key(&7).is_empty());
    }

    #[test]
    fn test_delete_key_removes_all_pairs() {
        let tree: BwTree<i64, u64> = BwTree::new();
        tree.insert(7, 1).unwrap();
        tree.insert(7, 2).unwrap();
        tree.insert(8, 3).unwrap();

        tree.delete_key(7);
        assert!(tree.scan_key(&7).is_empty());
        assert_eq!(tree.scan_key(&8), vec![3]);
    }

    #[test]
    fn test_delete_absent_is_silent_noop() {
        let tree: BwTree<i64, u64> = BwTree::new();
        tree.insert(1, 10).unwrap();

        tree.delete_key(2);
        tree.delete_pair(1, 99);

        assert_eq!(tree.scan_key(&1), vec![10]);
        assert_eq!(tree.len(), 1);
    }

    #[test]
    fn test_update_rewrites_value_list() {
        let tree: BwTree<i64, u64> = BwTree::new();
        tree.insert(5, 1).unwrap();
        tree.insert(5, 2).unwrap();

        tree.update(5, 9);
        assert_eq!(tree.scan_key(&5), vec![9]);
        assert_eq!(tree.len(), 1);

        // Update of an absent key changes nothing.
        tree.update(6, 1);
        assert!(tree.scan_key(&6).is_empty());
    }

    #[test]
    fn test_unique_keys_reject_duplicates() {
        let tree: BwTree<i64, u64> =
            BwTree::with_config(TreeConfig::default().unique_keys(true));

        tree.insert(1, 10).unwrap();
        assert_eq!(tree.insert(1, 11), Err(InsertError::DuplicateKey));
        assert_eq!(tree.scan_key(&1), vec![10]);

        // A deleted key is insertable again.
        tree.delete_pair(1, 10);
        tree.insert(1, 12).unwrap();
        assert_eq!(tree.scan_key(&1), vec![12]);
    }
}
