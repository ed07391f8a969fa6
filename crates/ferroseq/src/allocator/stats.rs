use core::ops::{Add, AddAssign};

use portable_atomic::{AtomicU64, Ordering};

/// A point-in-time snapshot of allocation counters.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct AllocatorStats {
    /// Ids served straight from an in-memory range.
    pub fast_path: u64,
    /// Successful refills (one counter read and one update each).
    pub refills: u64,
    /// Refill attempts that failed with a transient error.
    pub failed_attempts: u64,
    /// Refills that gave up after exhausting the retry budget.
    pub exhausted: u64,
}

impl AllocatorStats {
    /// Total ids handed out, including the first id of every refill.
    pub const fn issued(&self) -> u64 {
        self.fast_path + self.refills
    }
}

impl Add for AllocatorStats {
    type Output = Self;

    fn add(self, rhs: Self) -> Self {
        Self {
            fast_path: self.fast_path + rhs.fast_path,
            refills: self.refills + rhs.refills,
            failed_attempts: self.failed_attempts + rhs.failed_attempts,
            exhausted: self.exhausted + rhs.exhausted,
        }
    }
}

impl AddAssign for AllocatorStats {
    fn add_assign(&mut self, rhs: Self) {
        *self = *self + rhs;
    }
}

#[derive(Debug, Default)]
pub(crate) struct StatCounters {
    fast_path: AtomicU64,
    refills: AtomicU64,
    failed_attempts: AtomicU64,
    exhausted: AtomicU64,
}

impl StatCounters {
    pub(crate) fn record_fast_path(&self) {
        self.fast_path.fetch_add(1, Ordering::Relaxed);
    }

    pub(crate) fn record_refill(&self) {
        self.refills.fetch_add(1, Ordering::Relaxed);
    }

    pub(crate) fn record_failed_attempt(&self) {
        self.failed_attempts.fetch_add(1, Ordering::Relaxed);
    }

    pub(crate) fn record_exhausted(&self) {
        self.exhausted.fetch_add(1, Ordering::Relaxed);
    }

    pub(crate) fn snapshot(&self) -> AllocatorStats {
        AllocatorStats {
            fast_path: self.fast_path.load(Ordering::Relaxed),
            refills: self.refills.load(Ordering::Relaxed),
            failed_attempts: self.failed_attempts.load(Ordering::Relaxed),
            exhausted: self.exhausted.load(Ordering::Relaxed),
        }
    }
}
