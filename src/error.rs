//! Errors surfaced by index operations.
//!
//! Contention is never surfaced: a failed CAS is retried internally until
//! the operation linearizes. The only caller-visible error is the
//! unique-key constraint violation.

use std::fmt as StdFmt;

/// Errors that can occur during insert operations.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum InsertError {
    /// The key is already present and the tree was configured with
    /// `unique_keys`.
    DuplicateKey,
}

impl StdFmt::Display for InsertError {
    fn fmt(&self, f: &mut StdFmt::Formatter<'_>) -> StdFmt::Result {
        match self {
            Self::DuplicateKey => write!(f, "key already present in unique index"),
        }
    }
}

impl std::error::Error for InsertError {}
