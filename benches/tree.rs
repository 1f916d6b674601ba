//! Benchmarks for `BwTree` using Divan.
//!
//! Run with: `cargo bench --bench tree`

use divan::{Bencher, black_box};

use bwtree::{BwTree, TreeConfig};

fn main() {
    divan::main();
}

/// Tree preloaded with `n` sequential keys.
fn preloaded(n: i64) -> BwTree<i64, u64> {
    let tree = BwTree::new();
    let guard = tree.guard();
    for i in 0..n {
        tree.insert_with_guard(i, i as u64, &guard).unwrap();
    }
    drop(guard);
    tree
}

// =============================================================================
// Insert Operations
// =============================================================================

#[divan::bench_group]
mod insert {
    use super::{Bencher, BwTree, TreeConfig, black_box};

    #[divan::bench]
    fn sequential_10k(bencher: Bencher) {
        bencher
            .with_inputs(BwTree::<i64, u64>::new)
            .bench_local_values(|tree| {
                let guard = tree.guard();
                for i in 0..10_000i64 {
                    tree.insert_with_guard(black_box(i), black_box(i as u64), &guard)
                        .unwrap();
                }
                drop(guard);
                tree
            });
    }

    #[divan::bench]
    fn sequential_10k_aggressive_consolidation(bencher: Bencher) {
        bencher
            .with_inputs(|| {
                BwTree::<i64, u64>::with_config(
                    TreeConfig::default().delta_chain_threshold(2),
                )
            })
            .bench_local_values(|tree| {
                let guard = tree.guard();
                for i in 0..10_000i64 {
                    tree.insert_with_guard(black_box(i), black_box(i as u64), &guard)
                        .unwrap();
                }
                drop(guard);
                tree
            });
    }

    #[divan::bench]
    fn duplicates_one_key_1k(bencher: Bencher) {
        bencher
            .with_inputs(BwTree::<i64, u64>::new)
            .bench_local_values(|tree| {
                let guard = tree.guard();
                for i in 0..1_000u64 {
                    tree.insert_with_guard(black_box(7), black_box(i), &guard)
                        .unwrap();
                }
                drop(guard);
                tree
            });
    }
}

// =============================================================================
// Read Operations
// =============================================================================

#[divan::bench_group]
mod read {
    use super::{Bencher, black_box, preloaded};

    #[divan::bench]
    fn point_lookup(bencher: Bencher) {
        let tree = preloaded(100_000);
        let guard = tree.guard();

        let mut i = 0i64;
        bencher.bench_local(|| {
            i = (i + 7_919) % 100_000;
            black_box(tree.scan_key_with_guard(&black_box(i), &guard))
        });
    }

    #[divan::bench]
    fn full_scan_100k(bencher: Bencher) {
        let tree = preloaded(100_000);

        bencher.bench_local(|| black_box(tree.scan_all()).len());
    }
}
