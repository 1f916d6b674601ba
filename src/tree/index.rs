//! `BwTreeIndex` - the storage-engine facing facade.
//!
//! Exposes the operation table the enclosing engine consumes
//! (insert/delete/update entry, key scans, predicate scans, existence)
//! over a [`BwTree`]. Entry values are typically small stable tuple
//! pointers; the index treats them as opaque.

use std::fmt as StdFmt;

use crate::config::TreeConfig;
use crate::error::InsertError;
use crate::key::{DefaultComparator, KeyComparator};
use crate::predicate::{KeyAttributes, PredicateOp, ScanDirection};

use super::BwTree;

/// Storage-engine facade over a [`BwTree`].
///
/// # Example
///
/// ```
/// use bwtree::BwTreeIndex;
///
/// let index: BwTreeIndex<i64, u64> = BwTreeIndex::new();
/// index.insert_entry(100, 5).unwrap();
/// index.insert_entry(100, 7).unwrap();
///
/// assert_eq!(index.scan_key(&100).len(), 2);
/// index.delete_entry(100, 5);
/// assert_eq!(index.scan_key(&100), vec![7]);
/// ```
pub struct BwTreeIndex<K, V, C = DefaultComparator> {
    inner: BwTree<K, V, C>,
}

impl<K, V, C> StdFmt::Debug for BwTreeIndex<K, V, C>
where
    K: Clone,
    V: Clone + PartialEq,
    C: KeyComparator<K>,
{
    fn fmt(&self, f: &mut StdFmt::Formatter<'_>) -> StdFmt::Result {
        f.debug_struct("BwTreeIndex")
            .field("len", &self.inner.len())
            .field("config", self.inner.config())
            .finish()
    }
}

impl<K, V> BwTreeIndex<K, V, DefaultComparator>
where
    K: Clone + Ord,
    V: Clone + PartialEq,
{
    /// Create an empty index ordered by the key's `Ord` instance.
    #[must_use]
    pub fn new() -> Self {
        Self::with_config(TreeConfig::default())
    }

    /// Create an empty index with custom thresholds.
    #[must_use]
    pub fn with_config(config: TreeConfig) -> Self {
        Self {
            inner: BwTree::with_config(config),
        }
    }
}

impl<K, V> Default for BwTreeIndex<K, V, DefaultComparator>
where
    K: Clone + Ord,
    V: Clone + PartialEq,
{
    #[inline]
    fn default() -> Self {
        Self::new()
    }
}

impl<K, V, C> BwTreeIndex<K, V, C>
where
    K: Clone,
    V: Clone + PartialEq,
    C: KeyComparator<K>,
{
    /// Create an empty index with a caller-supplied comparator.
    #[must_use]
    pub fn with_comparator(comparator: C, config: TreeConfig) -> Self {
        Self {
            inner: BwTree::with_comparator(comparator, config),
        }
    }

    /// Insert one entry. Duplicate keys are allowed unless the index is
    /// unique.
    ///
    /// # Errors
    ///
    /// [`InsertError::DuplicateKey`] under `unique_keys`.
    #[inline]
    pub fn insert_entry(&self, key: K, value: V) -> Result<(), InsertError> {
        self.inner.insert(key, value)
    }

    /// Remove one occurrence of the exact (key, value) entry; silently a
    /// no-op when absent.
    #[inline]
    pub fn delete_entry(&self, key: K, value: V) {
        self.inner.delete_pair(key, value);
    }

    /// Rewrite the key's value list to `[value]`; no-op when the key is
    /// absent.
    #[inline]
    pub fn update_entry(&self, key: K, value: V) {
        self.inner.update(key, value);
    }

    /// All values stored under `key` (possibly empty).
    #[must_use]
    #[inline]
    pub fn scan_key(&self, key: &K) -> Vec<V> {
        self.inner.scan_key(key)
    }

    /// Every value in key order.
    #[must_use]
    #[inline]
    pub fn scan_all_keys(&self) -> Vec<V> {
        self.inner.scan_all()
    }

    /// Predicate scan; see [`BwTree::scan`].
    #[must_use]
    #[inline]
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
        self.inner.scan(values, column_ids, ops, direction)
    }

    /// Whether any entry is stored under `key`.
    #[must_use]
    #[inline]
    pub fn exists(&self, key: &K) -> bool {
        self.inner.exists(key)
    }

    /// Number of live entries.
    #[must_use]
    #[inline]
    pub fn len(&self) -> usize {
        self.inner.len()
    }

    /// Whether the index holds no entries.
    #[must_use]
    #[inline]
    pub fn is_empty(&self) -> bool {
        self.inner.is_empty()
    }

    /// The underlying engine, for guard-scoped batch operations.
    #[must_use]
    #[inline]
    pub fn tree(&self) -> &BwTree<K, V, C> {
        &self.inner
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_entry_roundtrip() {
        let index: BwTreeIndex<i64, u64> = BwTreeIndex::new();

        index.insert_entry(100, 5).unwrap();
        assert_eq!(index.scan_key(&100), vec![5]);
        assert!(index.exists(&100));

        index.delete_entry(100, 5);
        assert!(index.scan_key(&100).is_empty());
        assert!(!index.exists(&100));
    }

    #[test]
    fn test_update_entry_requires_presence() {
        let index: BwTreeIndex<i64, u64> = BwTreeIndex::new();

        index.update_entry(1, 10);
        assert!(index.scan_key(&1).is_empty());

        index.insert_entry(1, 10).unwrap();
        index.update_entry(1, 20);
        assert_eq!(index.scan_key(&1), vec![20]);
    }
}
