//! Logical page identifiers.
//!
//! A [`Pid`] names a node for the life of that node; the mapping table
//! translates it to the current chain head. PIDs are never reused, so a
//! PID held across an epoch guard always resolves to either the same
//! logical node or a newer incarnation of its chain.

use std::fmt as StdFmt;
use std::sync::atomic::AtomicU64;

use crate::ordering::{CAS_FAILURE, CAS_SUCCESS, READ_ORD, WRITE_ORD};

/// A stable logical page identifier.
///
/// The all-ones value is reserved as the null sentinel ("absent").
#[derive(Clone, Copy, PartialEq, Eq, Hash)]
pub struct Pid(u64);

impl Pid {
    /// The "absent" PID.
    pub const NULL: Self = Self(u64::MAX);

    #[inline]
    pub(crate) const fn from_index(index: u64) -> Self {
        Self(index)
    }

    /// Slot index backing this PID.
    #[inline]
    pub(crate) const fn index(self) -> usize {
        self.0 as usize
    }

    /// Check for the null sentinel.
    #[inline]
    #[must_use]
    pub const fn is_null(self) -> bool {
        self.0 == u64::MAX
    }
}

impl StdFmt::Debug for Pid {
    fn fmt(&self, f: &mut StdFmt::Formatter<'_>) -> StdFmt::Result {
        if self.is_null() {
            write!(f, "Pid(NULL)")
        } else {
            write!(f, "Pid({})", self.0)
        }
    }
}

impl StdFmt::Display for Pid {
    fn fmt(&self, f: &mut StdFmt::Formatter<'_>) -> StdFmt::Result {
        StdFmt::Debug::fmt(self, f)
    }
}

/// An atomically updatable PID cell.
///
/// Used for the root pointer, the head/tail leaf pointers, and the
/// sibling/parent back-pointers on base nodes. Back-pointers are written
/// only by the thread that just published the corresponding SMO step, but
/// they are read concurrently, so every access goes through this cell.
pub(crate) struct AtomicPid(AtomicU64);

impl AtomicPid {
    #[inline]
    pub(crate) fn new(pid: Pid) -> Self {
        Self(AtomicU64::new(pid.0))
    }

    #[inline]
    pub(crate) fn null() -> Self {
        Self::new(Pid::NULL)
    }

    #[inline]
    pub(crate) fn load(&self) -> Pid {
        Pid(self.0.load(READ_ORD))
    }

    #[inline]
    pub(crate) fn store(&self, pid: Pid) {
        self.0.store(pid.0, WRITE_ORD);
    }

    /// Publish `new` iff the cell still holds `current`.
    ///
    /// # Errors
    ///
    /// Returns `Err(actual)` with the observed value when the CAS loses.
    #[inline]
    pub(crate) fn compare_exchange(&self, current: Pid, new: Pid) -> Result<Pid, Pid> {
        self.0
            .compare_exchange(current.0, new.0, CAS_SUCCESS, CAS_FAILURE)
            .map(Pid)
            .map_err(Pid)
    }
}

impl StdFmt::Debug for AtomicPid {
    fn fmt(&self, f: &mut StdFmt::Formatter<'_>) -> StdFmt::Result {
        f.debug_tuple("AtomicPid").field(&self.load()).finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_null_sentinel() {
        assert!(Pid::NULL.is_null());
        assert!(!Pid::from_index(0).is_null());
        assert_eq!(format!("{:?}", Pid::NULL), "Pid(NULL)");
    }

    #[test]
    fn test_atomic_pid_cas() {
        let cell = AtomicPid::null();
        assert!(cell.compare_exchange(Pid::NULL, Pid::from_index(7)).is_ok());
        assert_eq!(cell.load(), Pid::from_index(7));

        // A stale expectation must lose and report the live value.
        let err = cell
            .compare_exchange(Pid::NULL, Pid::from_index(9))
            .unwrap_err();
        assert_eq!(err, Pid::from_index(7));
    }
}
