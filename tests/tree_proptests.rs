//! Property-based tests for the tree.
//!
//! Differential testing against `BTreeMap<i64, Vec<u64>>` as an oracle:
//! any sequence of operations applied to both must leave them observably
//! identical, with both the default configuration and aggressive
//! thresholds that force splits and consolidations constantly.

#![expect(clippy::unwrap_used, reason = "fail fast in tests")]

use std::collections::BTreeMap;

use bwtree::{BwTree, TreeConfig};
use proptest::prelude::*;

// ============================================================================
//  Strategies
// ============================================================================

/// Small key domain so operations collide on keys and value lists grow.
fn small_key() -> impl Strategy<Value = i64> {
    0i64..48
}

/// Operations for random testing.
#[derive(Debug, Clone)]
enum Op {
    Insert(i64, u64),
    Update(i64, u64),
    DeleteKey(i64),
    DeletePair(i64, u64),
}

fn operations(max_ops: usize) -> impl Strategy<Value = Vec<Op>> {
    prop::collection::vec(
        prop_oneof![
            4 => (small_key(), 0u64..8).prop_map(|(k, v)| Op::Insert(k, v)),
            1 => (small_key(), 0u64..8).prop_map(|(k, v)| Op::Update(k, v)),
            1 => small_key().prop_map(Op::DeleteKey),
            2 => (small_key(), 0u64..8).prop_map(|(k, v)| Op::DeletePair(k, v)),
        ],
        0..=max_ops,
    )
}

/// The two configurations under test: production defaults and a
/// pathological one that splits and consolidates almost every operation.
fn configs() -> impl Strategy<Value = TreeConfig> {
    prop_oneof![
        Just(TreeConfig::default()),
        Just(
            TreeConfig::default()
                .leaf_size_threshold(4)
                .inner_size_threshold(4)
                .delta_chain_threshold(1)
        ),
    ]
}

// ============================================================================
//  Oracle
// ============================================================================

fn apply_to_oracle(oracle: &mut BTreeMap<i64, Vec<u64>>, op: &Op) {
    match *op {
        Op::Insert(k, v) => oracle.entry(k).or_default().push(v),

        Op::Update(k, v) => {
            if let Some(values) = oracle.get_mut(&k) {
                *values = vec![v];
            }
        }

        Op::DeleteKey(k) => {
            oracle.remove(&k);
        }

        Op::DeletePair(k, v) => {
            if let Some(values) = oracle.get_mut(&k) {
                values.retain(|x| *x != v);
                if values.is_empty() {
                    oracle.remove(&k);
                }
            }
        }
    }
}

fn apply_to_tree(tree: &BwTree<i64, u64>, op: &Op) {
    match *op {
        Op::Insert(k, v) => tree.insert(k, v).unwrap(),
        Op::Update(k, v) => tree.update(k, v),
        Op::DeleteKey(k) => tree.delete_key(k),
        Op::DeletePair(k, v) => tree.delete_pair(k, v),
    }
}

// ============================================================================
//  Differential properties
// ============================================================================

proptest! {
    #![proptest_config(ProptestConfig::with_cases(256))]

    /// Point reads agree with the oracle after any operation sequence.
    #[test]
    fn point_reads_match_oracle(ops in operations(300), config in configs()) {
        let tree: BwTree<i64, u64> = BwTree::with_config(config);
        let mut oracle = BTreeMap::new();

        for op in &ops {
            apply_to_tree(&tree, op);
            apply_to_oracle(&mut oracle, op);
        }

        for k in 0..48 {
            let expected = oracle.get(&k).cloned().unwrap_or_default();
            prop_assert_eq!(tree.scan_key(&k), expected, "key {}", k);
        }
    }

    /// The full ordered scan is exactly the oracle's flattened content.
    #[test]
    fn ordered_scan_matches_oracle(ops in operations(300), config in configs()) {
        let tree: BwTree<i64, u64> = BwTree::with_config(config);
        let mut oracle = BTreeMap::new();

        for op in &ops {
            apply_to_tree(&tree, op);
            apply_to_oracle(&mut oracle, op);
        }

        let expected: Vec<u64> = oracle.values().flatten().copied().collect();
        prop_assert_eq!(tree.scan_all(), expected);

        let total: usize = oracle.values().map(Vec::len).sum();
        prop_assert_eq!(tree.len(), total);
    }

    /// Exists agrees with non-empty point reads.
    #[test]
    fn exists_matches_oracle(ops in operations(200), config in configs()) {
        let tree: BwTree<i64, u64> = BwTree::with_config(config);
        let mut oracle = BTreeMap::new();

        for op in &ops {
            apply_to_tree(&tree, op);
            apply_to_oracle(&mut oracle, op);
        }

        for k in 0..48 {
            prop_assert_eq!(tree.exists(&k), oracle.contains_key(&k), "key {}", k);
        }
    }

    /// The leaf chain tiles the key space: fences line up, every leaf is
    /// visited exactly once, entry counts add up.
    #[test]
    fn leaf_chain_is_well_formed(ops in operations(300)) {
        let tree: BwTree<i64, u64> = BwTree::with_config(
            TreeConfig::default()
                .leaf_size_threshold(4)
                .inner_size_threshold(4)
                .delta_chain_threshold(2),
        );
        let mut oracle = BTreeMap::new();

        for op in &ops {
            apply_to_tree(&tree, op);
            apply_to_oracle(&mut oracle, op);
        }

        let mut seen = std::collections::HashSet::new();
        let mut entries = 0usize;
        let mut previous_high: Option<Option<i64>> = None;

        for leaf in tree.leaves() {
            prop_assert!(seen.insert(leaf.pid), "leaf visited twice");
            entries += leaf.entries;

            if let Some(high) = previous_high {
                prop_assert_eq!(high, leaf.low_key, "fence mismatch");
            } else {
                prop_assert!(leaf.low_key.is_none(), "head leaf must be open below");
            }
            previous_high = Some(leaf.high_key);
        }

        if let Some(last_high) = previous_high {
            prop_assert!(last_high.is_none(), "tail leaf must be open above");
        }

        let total: usize = oracle.values().map(Vec::len).sum();
        prop_assert_eq!(entries, total);
    }

    /// Under unique_keys, an insert fails iff the key is already live.
    #[test]
    fn unique_insert_fails_iff_present(pairs in prop::collection::vec((small_key(), 0u64..8), 0..200)) {
        let tree: BwTree<i64, u64> = BwTree::with_config(
            TreeConfig::default()
                .unique_keys(true)
                .leaf_size_threshold(4)
                .delta_chain_threshold(2),
        );
        let mut oracle = std::collections::HashMap::new();

        for (k, v) in pairs {
            let already_present = oracle.contains_key(&k);
            let result = tree.insert(k, v);

            prop_assert_eq!(result.is_err(), already_present, "key {}", k);
            if !already_present {
                oracle.insert(k, v);
            }
        }

        for (k, v) in &oracle {
            prop_assert_eq!(tree.scan_key(k), vec![*v]);
        }
    }
}
