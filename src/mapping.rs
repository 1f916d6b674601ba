//! The mapping table: stable PIDs to chain heads.
//!
//! This is the sole point of synchronization in the tree. Every slot is a
//! single `AtomicPtr` to the head of that PID's delta chain, and every
//! structural change in the index commits through exactly one
//! compare-and-swap on one slot.
//!
//! The table is a two-level directory so it is logically unbounded while
//! keeping slot addresses stable: segments are allocated lazily and never
//! move or shrink, and PIDs are never reused. Losing a segment-install
//! race costs one allocation, nothing more.

use std::sync::atomic::{AtomicPtr, AtomicU64};

use seize::LocalGuard;

use crate::node::Node;
use crate::ordering::{CAS_FAILURE, CAS_SUCCESS, READ_ORD, RELAXED, WRITE_ORD};
use crate::pid::Pid;

/// Slots per segment (2^16).
const SEGMENT_BITS: u32 = 16;
const SEGMENT_SIZE: usize = 1 << SEGMENT_BITS;

/// Segments in the directory; caps the table at 2^26 PIDs.
const DIRECTORY_SIZE: usize = 1024;

/// One lazily allocated block of slots.
struct Segment<K, V> {
    slots: Box<[AtomicPtr<Node<K, V>>]>,
}

impl<K, V> Segment<K, V> {
    fn new() -> Box<Self> {
        let slots: Box<[AtomicPtr<Node<K, V>>]> = (0..SEGMENT_SIZE)
            .map(|_| AtomicPtr::new(std::ptr::null_mut()))
            .collect();

        Box::new(Self { slots })
    }
}

/// Array-like indirection from PIDs to chain heads.
pub(crate) struct MappingTable<K, V> {
    directory: Box<[AtomicPtr<Segment<K, V>>]>,
    next_pid: AtomicU64,
}

impl<K, V> MappingTable<K, V> {
    pub(crate) fn new() -> Self {
        let directory: Box<[AtomicPtr<Segment<K, V>>]> = (0..DIRECTORY_SIZE)
            .map(|_| AtomicPtr::new(std::ptr::null_mut()))
            .collect();

        Self {
            directory,
            next_pid: AtomicU64::new(0),
        }
    }

    /// Hand out an unused PID whose slot is initialized to null.
    ///
    /// # Panics
    ///
    /// Panics when the directory is exhausted (2^26 allocations); PIDs
    /// are never reused, so this is the table's hard capacity.
    pub(crate) fn allocate_pid(&self) -> Pid {
        let index = self.next_pid.fetch_add(1, RELAXED);
        assert!(
            (index as usize) < DIRECTORY_SIZE * SEGMENT_SIZE,
            "mapping table exhausted"
        );

        self.ensure_segment(index as usize >> SEGMENT_BITS);
        Pid::from_index(index)
    }

    /// Number of PIDs handed out so far (teardown iteration bound).
    pub(crate) fn allocated(&self) -> u64 {
        self.next_pid.load(READ_ORD)
    }

    /// Install the segment covering `segment_index` if not yet present.
    fn ensure_segment(&self, segment_index: usize) {
        let cell = &self.directory[segment_index];
        if !cell.load(READ_ORD).is_null() {
            return;
        }

        let fresh = Box::into_raw(Segment::new());
        if let Err(_existing) =
            cell.compare_exchange(std::ptr::null_mut(), fresh, CAS_SUCCESS, CAS_FAILURE)
        {
            // Lost the install race; another thread's segment is live.
            // SAFETY: fresh was just allocated above and never published.
            drop(unsafe { Box::from_raw(fresh) });
        }
    }

    /// Slot cell backing `pid`.
    ///
    /// The segment is guaranteed live: `allocate_pid` installs it before
    /// the PID escapes, and segments are only freed when the table drops.
    fn slot(&self, pid: Pid) -> &AtomicPtr<Node<K, V>> {
        debug_assert!(!pid.is_null());
        let index = pid.index();

        let segment = self.directory[index >> SEGMENT_BITS].load(READ_ORD);
        debug_assert!(!segment.is_null(), "slot accessed before allocation");

        // SAFETY: published segments stay valid for the table's lifetime.
        unsafe { &(*segment).slots[index & (SEGMENT_SIZE - 1)] }
    }

    /// Load the chain head for `pid`.
    ///
    /// The returned pointer stays valid for the lifetime of the guard:
    /// replaced chains are retired through the collector and not freed
    /// while any guard from this tree's collector is active.
    #[inline]
    pub(crate) fn get(&self, pid: Pid, _guard: &LocalGuard<'_>) -> *mut Node<K, V> {
        self.slot(pid).load(READ_ORD)
    }

    /// Load without epoch protection.
    ///
    /// Only for teardown and tests, when the caller has exclusive access.
    pub(crate) fn load_exclusive(&self, pid: Pid) -> *mut Node<K, V> {
        self.slot(pid).load(READ_ORD)
    }

    /// Publish `new` as the head of `pid`'s chain iff the current head is
    /// `expected`. This is the linearization point of every mutation.
    ///
    /// # Errors
    ///
    /// Returns `Err(actual)` with the observed head when the CAS loses.
    #[inline]
    pub(crate) fn cas(
        &self,
        pid: Pid,
        expected: *mut Node<K, V>,
        new: *mut Node<K, V>,
    ) -> Result<(), *mut Node<K, V>> {
        self.slot(pid)
            .compare_exchange(expected, new, CAS_SUCCESS, CAS_FAILURE)
            .map(|_| ())
    }

    /// Unconditional store; used to publish fresh nodes on fresh PIDs and
    /// to clear the slot of a never-referenced orphan.
    pub(crate) fn store(&self, pid: Pid, node: *mut Node<K, V>) {
        self.slot(pid).store(node, WRITE_ORD);
    }
}

impl<K, V> Drop for MappingTable<K, V> {
    fn drop(&mut self) {
        // Chains are freed by the tree's Drop before the table goes away;
        // only the segment blocks are owned here.
        for cell in &self.directory {
            let segment = cell.load(READ_ORD);
            if !segment.is_null() {
                // SAFETY: segments are exclusively owned at drop time and
                // were allocated via Box::into_raw in ensure_segment.
                drop(unsafe { Box::from_raw(segment) });
            }
        }
    }
}
