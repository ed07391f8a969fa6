use std::sync::Arc;

use dashmap::DashMap;
use parking_lot::Mutex;
#[cfg(feature = "tracing")]
use tracing::instrument;

use crate::{
    AllocatorConfig, Error, Range, Result, RetryPolicy, SequenceId, StoreError, TenantId,
    allocator::stats::{AllocatorStats, StatCounters},
    lock::{LockKey, LockService},
    store::{CounterStore, CounterTx},
};

/// Outcome of a single failed refill attempt.
enum Attempt {
    /// Worth another attempt, if the budget allows.
    Transient(String),
    /// Surface to the caller immediately.
    Fatal(Error),
}

/// Serves ids for every sequence of one tenant.
///
/// Each sequence has its own [`Range`] behind its own mutex. Drawing from a
/// non-empty range is the fast path: no external lock and no I/O. When a
/// range runs dry, the thread holding its mutex performs the refill while
/// other threads asking for the same sequence wait on that mutex, so a
/// single exhaustion causes a single round trip to storage.
///
/// A refill acquires the external lock for `(sequence, tenant)`, reads the
/// counter, advances it by the range capacity and commits, all inside one
/// transaction, then releases the lock. Transient failures restart the whole
/// sequence up to [`RetryPolicy::max_attempts`] times.
///
/// Usually obtained through [`Allocator`](crate::Allocator), which keeps one
/// instance per tenant.
pub struct TenantAllocator<S, L>
where
    S: CounterStore,
    L: LockService,
{
    tenant: TenantId,
    config: Arc<AllocatorConfig>,
    store: Arc<S>,
    locks: Arc<L>,
    ranges: DashMap<SequenceId, Arc<Mutex<Range>>>,
    stats: StatCounters,
}

impl<S, L> TenantAllocator<S, L>
where
    S: CounterStore,
    L: LockService,
{
    /// Creates an allocator for `tenant`. No storage is touched until the
    /// first id is requested.
    ///
    /// The configuration is expected to be validated already; see
    /// [`AllocatorConfig::validate`].
    pub fn new(
        tenant: TenantId,
        config: Arc<AllocatorConfig>,
        store: Arc<S>,
        locks: Arc<L>,
    ) -> Self {
        Self {
            tenant,
            config,
            store,
            locks,
            ranges: DashMap::new(),
            stats: StatCounters::default(),
        }
    }

    pub const fn tenant(&self) -> TenantId {
        self.tenant
    }

    /// Returns the next id for `key`.
    ///
    /// # Errors
    ///
    /// - [`Error::UnknownKey`] if `key` has no configured sequence.
    /// - [`Error::NotFound`] / [`Error::DataIntegrity`] if the counter row is
    ///   missing or unusable.
    /// - [`Error::Lock`] if the lock service refused the request.
    /// - [`Error::AllocationFailure`] if every refill attempt failed.
    pub fn next_id(&self, key: &str) -> Result<i64> {
        let sequence = self
            .config
            .sequence_for(key)
            .ok_or_else(|| Error::UnknownKey {
                key: key.to_string(),
            })?;

        let range = self.range(sequence)?;
        let mut range = range.lock();
        if let Some(id) = range.next() {
            self.stats.record_fast_path();
            return Ok(id);
        }
        self.refill(sequence, &mut range)
    }

    /// Number of ids left in the in-memory range backing `key`, or `None` if
    /// the key is unknown or has not been used by this tenant yet.
    pub fn remaining(&self, key: &str) -> Option<i64> {
        let sequence = self.config.sequence_for(key)?;
        let range = Arc::clone(self.ranges.get(&sequence)?.value());
        let remaining = range.lock().remaining();
        Some(remaining)
    }

    pub fn stats(&self) -> AllocatorStats {
        self.stats.snapshot()
    }

    fn range(&self, sequence: SequenceId) -> Result<Arc<Mutex<Range>>> {
        if let Some(range) = self.ranges.get(&sequence) {
            return Ok(Arc::clone(range.value()));
        }

        let capacity = self.config.capacity_of(sequence).ok_or_else(|| {
            Error::invalid_config(format!("sequence {sequence} has no configured capacity"))
        })?;
        let range = Range::new(capacity)?;

        let entry = self
            .ranges
            .entry(sequence)
            .or_insert_with(|| Arc::new(Mutex::new(range)));
        Ok(Arc::clone(entry.value()))
    }

    #[cfg_attr(
        feature = "tracing",
        instrument(level = "debug", skip(self, range), fields(tenant = self.tenant))
    )]
    fn refill(&self, sequence: SequenceId, range: &mut Range) -> Result<i64> {
        let capacity = range.capacity();
        let RetryPolicy {
            max_attempts,
            backoff,
        } = self.config.retry;
        let mut last_error = String::new();

        for attempt in 1..=max_attempts {
            match self.try_reserve(sequence, capacity) {
                Ok(start) => {
                    self.stats.record_refill();
                    #[cfg(feature = "tracing")]
                    tracing::debug!(start, capacity, attempt, "reserved id range");

                    range.reset(start);
                    return range.next().ok_or_else(|| {
                        Error::invalid_config(format!(
                            "range for sequence {sequence} yielded no ids after refill"
                        ))
                    });
                }
                Err(Attempt::Fatal(err)) => {
                    #[cfg(feature = "tracing")]
                    tracing::error!(error = %err, "refill failed permanently");
                    return Err(err);
                }
                Err(Attempt::Transient(reason)) => {
                    self.stats.record_failed_attempt();
                    #[cfg(feature = "tracing")]
                    tracing::warn!(attempt, max_attempts, %reason, "refill attempt failed");

                    last_error = reason;
                    if attempt < max_attempts && !backoff.is_zero() {
                        std::thread::sleep(backoff);
                    }
                }
            }
        }

        self.stats.record_exhausted();
        #[cfg(feature = "tracing")]
        tracing::error!(max_attempts, %last_error, "refill retries exhausted");

        Err(Error::AllocationFailure {
            sequence,
            tenant: self.tenant,
            attempts: max_attempts,
            last_error,
        })
    }

    /// One refill attempt: lock, reserve, release. Returns the first id of
    /// the reserved block.
    fn try_reserve(&self, sequence: SequenceId, capacity: i64) -> Result<i64, Attempt> {
        let scope = self.config.lock_scope;
        let key = LockKey::new(sequence, self.tenant);

        let handle = self.locks.acquire(&key, scope).map_err(|err| {
            if err.is_transient() {
                Attempt::Transient(err.to_string())
            } else {
                Attempt::Fatal(Error::Lock {
                    sequence,
                    tenant: self.tenant,
                    source: err,
                })
            }
        })?;

        let reserved = self.advance_counter(sequence, capacity);

        // The reservation stands even if the release fails: the counter has
        // already moved past it.
        if let Err(_err) = self.locks.release(handle, scope) {
            #[cfg(feature = "tracing")]
            tracing::warn!(%key, error = %_err, "failed to release refill lock");
        }

        reserved
    }

    /// Reads and advances the counter in one transaction. Any early return
    /// drops the transaction, which rolls it back.
    fn advance_counter(&self, sequence: SequenceId, capacity: i64) -> Result<i64, Attempt> {
        let mut tx = self
            .store
            .begin(self.tenant)
            .map_err(|e| self.store_failure(sequence, e))?;

        let current = tx.read(sequence).map_err(|e| self.store_failure(sequence, e))?;
        let next = current.checked_add(capacity).ok_or_else(|| {
            Attempt::Fatal(Error::DataIntegrity {
                sequence,
                tenant: self.tenant,
                reason: format!("counter {current} cannot advance by {capacity} without overflow"),
            })
        })?;

        tx.advance(sequence, next)
            .map_err(|e| self.store_failure(sequence, e))?;
        tx.commit().map_err(|e| self.store_failure(sequence, e))?;

        Ok(current)
    }

    fn store_failure(&self, sequence: SequenceId, err: StoreError) -> Attempt {
        let tenant = self.tenant;
        match err {
            StoreError::NotFound => Attempt::Fatal(Error::NotFound { sequence, tenant }),
            StoreError::DataIntegrity(reason) => Attempt::Fatal(Error::DataIntegrity {
                sequence,
                tenant,
                reason,
            }),
            StoreError::Transient(reason) => Attempt::Transient(reason),
        }
    }
}
