//! Tree configuration.

/// Tunable thresholds and constraints for a [`BwTree`](crate::BwTree).
///
/// The defaults match the classic Bw-tree operating point: short delta
/// chains (consolidate past 8) and 128-slot nodes.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct TreeConfig {
    /// Maximum delta-chain length before a consolidation is attempted.
    pub delta_chain_threshold: u32,

    /// Logical slot count past which a leaf is split.
    pub leaf_size_threshold: usize,

    /// Routing-entry count past which an inner node is split.
    pub inner_size_threshold: usize,

    /// Reject inserts whose key is already present.
    pub unique_keys: bool,
}

impl TreeConfig {
    /// Configuration with the default thresholds.
    #[must_use]
    pub const fn new() -> Self {
        Self {
            delta_chain_threshold: 8,
            leaf_size_threshold: 128,
            inner_size_threshold: 128,
            unique_keys: false,
        }
    }

    /// Set the maximum delta-chain length before consolidation.
    #[must_use]
    pub const fn delta_chain_threshold(mut self, len: u32) -> Self {
        self.delta_chain_threshold = len;
        self
    }

    /// Set the leaf split threshold (logical slots).
    #[must_use]
    pub const fn leaf_size_threshold(mut self, slots: usize) -> Self {
        self.leaf_size_threshold = slots;
        self
    }

    /// Set the inner split threshold (routing entries).
    #[must_use]
    pub const fn inner_size_threshold(mut self, entries: usize) -> Self {
        self.inner_size_threshold = entries;
        self
    }

    /// Enforce key uniqueness on insert.
    #[must_use]
    pub const fn unique_keys(mut self, unique: bool) -> Self {
        self.unique_keys = unique;
        self
    }
}

impl Default for TreeConfig {
    #[inline]
    fn default() -> Self {
        Self::new()
    }
}
