//! Fail-fast gate shared by the workers of a single map call.

use std::sync::atomic::{AtomicU64, Ordering};

/// A lock-free flag that flips on the first transform failure.
///
/// Workers read it before and after pulling a job, so tripping it stops new
/// work on a best-effort basis. Jobs already running are left to finish, which
/// bounds the overrun after a failure by the number of workers. Concurrent
/// failures may each trip it; the count only ever grows.
#[derive(Debug, Default)]
pub(crate) struct FailFastGate {
    trips: AtomicU64,
}

impl FailFastGate {
    pub(crate) const fn new() -> Self {
        Self {
            trips: AtomicU64::new(0),
        }
    }

    /// Record a failure. Returns the number of trips so far, including this one.
    pub(crate) fn trip(&self) -> u64 {
        self.trips.fetch_add(1, Ordering::AcqRel) + 1
    }

    pub(crate) fn is_tripped(&self) -> bool {
        self.trips.load(Ordering::Acquire) > 0
    }
}
