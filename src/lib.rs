//! # bwtree
//!
//! A concurrent, latch-free ordered index of the Bw-tree family.
//!
//! Logical node identity is separated from physical representation: a
//! mapping table translates stable page identifiers (PIDs) to the head
//! of a per-node delta chain, mutations prepend small delta records, and
//! every commit is a single compare-and-swap on one mapping-table slot.
//!
//! ## Design
//!
//! - **Mapping table**: the sole point of synchronization; no locks
//!   anywhere.
//! - **Delta chains**: inserts, updates and deletes are O(1) record
//!   prepends, collapsed back into base nodes by optimistic
//!   consolidation.
//! - **Two-step splits**: a split delta on the child and a separator
//!   delta on the parent publish independently; concurrent operations
//!   observe and route around half-done splits.
//! - **Epoch reclamation**: replaced chains are retired through a
//!   [`seize`] collector and freed only after every concurrent reader
//!   has moved on.
//!
//! ## Queries
//!
//! Point lookups, key-equality scans with duplicates, full ordered scans
//! over the doubly-linked leaf chain, and predicate scans with
//! caller-specified direction.
//!
//! ## Example
//!
//! ```
//! use bwtree::{BwTreeIndex, TreeConfig};
//!
//! let index: BwTreeIndex<i64, u64> = BwTreeIndex::new();
//!
//! index.insert_entry(100, 5).unwrap();
//! index.insert_entry(100, 7).unwrap();
//! index.insert_entry(200, 9).unwrap();
//!
//! assert_eq!(index.scan_key(&100).len(), 2);
//! assert_eq!(index.scan_all_keys().len(), 3);
//!
//! index.delete_entry(100, 5);
//! assert_eq!(index.scan_key(&100), vec![7]);
//! ```

mod config;
mod error;
mod key;
mod mapping;
mod node;
mod ordering;
mod pid;
mod predicate;
mod reclaim;
mod tracing_helpers;

pub mod tree;

pub use config::TreeConfig;
pub use error::InsertError;
pub use key::{DefaultComparator, KeyComparator};
pub use pid::Pid;
pub use predicate::{KeyAttributes, PredicateOp, ScanDirection};
pub use tree::{BwTree, BwTreeIndex, LeafChainIter, LeafSummary};
