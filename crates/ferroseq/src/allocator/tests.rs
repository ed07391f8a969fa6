use core::time::Duration;
use std::collections::HashSet;
use std::sync::{Arc, Barrier};
use std::thread::scope;

use parking_lot::Mutex;
use portable_atomic::{AtomicU32, AtomicU64, Ordering};

use crate::{
    Allocator, AllocatorConfig, CounterStore, CounterTx, Error, ErrorKind, LocalLockHandle,
    LocalLockService, LockError, LockKey, LockScope, LockService, MemoryCounterStore,
    RetryPolicy, SequenceId, StoreError, TenantId,
};

const TENANT: TenantId = 7;
const ORDERS: SequenceId = 1;
const CUSTOMERS: SequenceId = 2;

/// Remaining number of forced failures per store operation. `u32::MAX`
/// effectively means "always fail".
#[derive(Debug, Default)]
struct Faults {
    begin: AtomicU32,
    read: AtomicU32,
    advance: AtomicU32,
    commit: AtomicU32,
}

impl Faults {
    fn trip(counter: &AtomicU32) -> bool {
        counter
            .fetch_update(Ordering::SeqCst, Ordering::SeqCst, |n| n.checked_sub(1))
            .is_ok()
    }

    fn clear(&self) {
        for counter in [&self.begin, &self.read, &self.advance, &self.commit] {
            counter.store(0, Ordering::SeqCst);
        }
    }
}

#[derive(Debug, Default)]
struct Calls {
    begins: AtomicU64,
    reads: AtomicU64,
    advances: Mutex<Vec<(SequenceId, i64)>>,
    commits: AtomicU64,
}

impl Calls {
    fn reads(&self) -> u64 {
        self.reads.load(Ordering::SeqCst)
    }

    fn advances(&self) -> Vec<(SequenceId, i64)> {
        self.advances.lock().clone()
    }

    fn commits(&self) -> u64 {
        self.commits.load(Ordering::SeqCst)
    }
}

/// Wraps a store, counting calls and failing them on demand.
struct ScriptedStore<S> {
    inner: S,
    faults: Arc<Faults>,
    calls: Arc<Calls>,
}

struct ScriptedTx<T> {
    inner: T,
    faults: Arc<Faults>,
    calls: Arc<Calls>,
}

fn injected(op: &str) -> StoreError {
    StoreError::Transient(format!("injected {op} failure"))
}

impl<S: CounterStore> CounterStore for ScriptedStore<S> {
    type Tx = ScriptedTx<S::Tx>;

    fn begin(&self, tenant: TenantId) -> Result<Self::Tx, StoreError> {
        self.calls.begins.fetch_add(1, Ordering::SeqCst);
        if Faults::trip(&self.faults.begin) {
            return Err(injected("begin"));
        }
        Ok(ScriptedTx {
            inner: self.inner.begin(tenant)?,
            faults: Arc::clone(&self.faults),
            calls: Arc::clone(&self.calls),
        })
    }
}

impl<T: CounterTx> CounterTx for ScriptedTx<T> {
    fn read(&mut self, sequence: SequenceId) -> Result<i64, StoreError> {
        self.calls.reads.fetch_add(1, Ordering::SeqCst);
        if Faults::trip(&self.faults.read) {
            return Err(injected("read"));
        }
        self.inner.read(sequence)
    }

    fn advance(&mut self, sequence: SequenceId, value: i64) -> Result<(), StoreError> {
        self.calls.advances.lock().push((sequence, value));
        if Faults::trip(&self.faults.advance) {
            return Err(injected("advance"));
        }
        self.inner.advance(sequence, value)
    }

    fn commit(self) -> Result<(), StoreError> {
        self.calls.commits.fetch_add(1, Ordering::SeqCst);
        if Faults::trip(&self.faults.commit) {
            return Err(injected("commit"));
        }
        self.inner.commit()
    }
}

/// Wraps [`LocalLockService`], failing acquires and releases on demand.
#[derive(Default)]
struct ScriptedLocks {
    inner: LocalLockService,
    fail_acquire: AtomicU32,
    fail_release: AtomicU32,
    acquires: AtomicU64,
    releases: AtomicU64,
}

impl LockService for ScriptedLocks {
    type Handle = LocalLockHandle;

    fn acquire(&self, key: &LockKey, scope: LockScope) -> Result<Self::Handle, LockError> {
        self.acquires.fetch_add(1, Ordering::SeqCst);
        if Faults::trip(&self.fail_acquire) {
            return Err(LockError::Unavailable("injected acquire failure".into()));
        }
        self.inner.acquire(key, scope)
    }

    fn release(&self, handle: Self::Handle, scope: LockScope) -> Result<(), LockError> {
        self.releases.fetch_add(1, Ordering::SeqCst);
        // The lock is freed either way; only the acknowledgement is lost.
        self.inner.release(handle, scope)?;
        if Faults::trip(&self.fail_release) {
            return Err(LockError::Unavailable("injected release failure".into()));
        }
        Ok(())
    }
}

struct Harness {
    allocator: Allocator<ScriptedStore<MemoryCounterStore>, ScriptedLocks>,
    table: MemoryCounterStore,
    faults: Arc<Faults>,
    calls: Arc<Calls>,
    locks: Arc<ScriptedLocks>,
}

fn config(capacity: i64, retry: RetryPolicy) -> AllocatorConfig {
    AllocatorConfig::builder()
        .sequence(ORDERS, capacity)
        .sequence(CUSTOMERS, capacity)
        .key("order", ORDERS)
        .key("order_line", ORDERS)
        .key("customer", CUSTOMERS)
        .retry(retry)
        .build()
        .unwrap()
}

fn harness(capacity: i64, retry: RetryPolicy) -> Harness {
    harness_with(config(capacity, retry))
}

fn harness_with(config: AllocatorConfig) -> Harness {
    let table = MemoryCounterStore::new();
    let faults = Arc::new(Faults::default());
    let calls = Arc::new(Calls::default());
    let locks = Arc::new(ScriptedLocks::default());
    let store = ScriptedStore {
        inner: table.clone(),
        faults: Arc::clone(&faults),
        calls: Arc::clone(&calls),
    };
    let allocator =
        Allocator::from_shared(Arc::new(config), Arc::new(store), Arc::clone(&locks)).unwrap();
    Harness {
        allocator,
        table,
        faults,
        calls,
        locks,
    }
}

fn retries(max_attempts: u32) -> RetryPolicy {
    RetryPolicy::new(max_attempts, Duration::ZERO)
}

fn draw<S, L>(allocator: &Allocator<S, L>, key: &str, tenant: TenantId, n: usize) -> Vec<i64>
where
    S: CounterStore,
    L: LockService,
{
    (0..n)
        .map(|_| allocator.next_id(key, tenant).unwrap())
        .collect()
}

/// Hammers one `(key, tenant)` from many threads and returns every id drawn.
/// Asserts per-thread monotonicity and global uniqueness along the way.
fn run_unique_under_contention<S, L>(
    allocators: &[&Allocator<S, L>],
    key: &str,
    tenant: TenantId,
    threads: usize,
    per_thread: usize,
) -> Vec<i64>
where
    S: CounterStore,
    L: LockService,
{
    let seen = Mutex::new(HashSet::with_capacity(threads * per_thread));
    let barrier = Barrier::new(threads);

    scope(|s| {
        for t in 0..threads {
            let allocator = allocators[t % allocators.len()];
            let seen = &seen;
            let barrier = &barrier;
            s.spawn(move || {
                barrier.wait();
                let mut last = None;
                let mut local = Vec::with_capacity(per_thread);
                for _ in 0..per_thread {
                    let id = allocator.next_id(key, tenant).unwrap();
                    if let Some(prev) = last {
                        assert!(id > prev, "ids went backwards: {prev} then {id}");
                    }
                    last = Some(id);
                    local.push(id);
                }
                let mut seen = seen.lock();
                for id in local {
                    assert!(seen.insert(id), "duplicate id {id}");
                }
            });
        }
    });

    let mut ids: Vec<_> = seen.into_inner().into_iter().collect();
    ids.sort_unstable();
    ids
}

#[test]
fn one_refill_serves_a_whole_range() {
    let h = harness(5, retries(3));
    h.table.insert(TENANT, ORDERS, Some(100));

    assert_eq!(draw(&h.allocator, "order", TENANT, 5), vec![100, 101, 102, 103, 104]);
    assert_eq!(h.calls.reads(), 1);
    assert_eq!(h.calls.advances(), vec![(ORDERS, 105)]);
    assert_eq!(h.table.counter(TENANT, ORDERS), Some(105));

    assert_eq!(h.allocator.next_id("order", TENANT).unwrap(), 105);
    assert_eq!(h.calls.reads(), 2);
    assert_eq!(h.calls.advances(), vec![(ORDERS, 105), (ORDERS, 110)]);

    let stats = h.allocator.stats();
    assert_eq!(stats.refills, 2);
    assert_eq!(stats.fast_path, 4);
    assert_eq!(stats.issued(), 6);
    assert_eq!(h.locks.acquires.load(Ordering::SeqCst), 2);
}

#[test]
fn keys_sharing_a_sequence_share_a_range() {
    let h = harness(4, retries(3));
    h.table.insert(TENANT, ORDERS, Some(0));

    assert_eq!(h.allocator.next_id("order", TENANT).unwrap(), 0);
    assert_eq!(h.allocator.next_id("order_line", TENANT).unwrap(), 1);
    assert_eq!(h.allocator.next_id("order", TENANT).unwrap(), 2);
    assert_eq!(h.calls.reads(), 1);
}

#[test]
fn capacity_one_refills_every_call() {
    let h = harness(1, retries(3));
    h.table.insert(TENANT, ORDERS, Some(10));

    assert_eq!(draw(&h.allocator, "order", TENANT, 3), vec![10, 11, 12]);
    assert_eq!(h.calls.reads(), 3);
    assert_eq!(h.table.counter(TENANT, ORDERS), Some(13));
}

#[test]
fn skips_ids_when_the_counter_jumps() {
    let h = harness(5, retries(3));
    h.table.insert(TENANT, ORDERS, Some(100));

    assert_eq!(draw(&h.allocator, "order", TENANT, 5), vec![100, 101, 102, 103, 104]);

    // Another node reserved 105..200 in the meantime.
    h.table.set(TENANT, ORDERS, Some(200));
    assert_eq!(h.allocator.next_id("order", TENANT).unwrap(), 200);
    assert_eq!(h.table.counter(TENANT, ORDERS), Some(205));
}

#[test]
fn transient_read_failure_is_retried_transparently() {
    let h = harness(5, retries(3));
    h.table.insert(TENANT, ORDERS, Some(100));
    h.faults.read.store(1, Ordering::SeqCst);

    assert_eq!(h.allocator.next_id("order", TENANT).unwrap(), 100);
    assert_eq!(h.calls.reads(), 2);
    assert_eq!(h.calls.advances(), vec![(ORDERS, 105)]);
    assert_eq!(h.table.counter(TENANT, ORDERS), Some(105));
    assert_eq!(h.allocator.stats().failed_attempts, 1);
    // Every attempt starts from the lock.
    assert_eq!(h.locks.acquires.load(Ordering::SeqCst), 2);
}

#[test]
fn each_refill_step_is_retried() {
    for fault in ["begin", "read", "advance", "commit"] {
        let h = harness(3, retries(2));
        h.table.insert(TENANT, ORDERS, Some(50));
        let counter = match fault {
            "begin" => &h.faults.begin,
            "read" => &h.faults.read,
            "advance" => &h.faults.advance,
            _ => &h.faults.commit,
        };
        counter.store(1, Ordering::SeqCst);

        assert_eq!(h.allocator.next_id("order", TENANT).unwrap(), 50, "{fault}");
        assert_eq!(h.table.counter(TENANT, ORDERS), Some(53), "{fault}");
    }
}

#[test]
fn exhausted_retries_fail_every_call_and_leave_counter_alone() {
    let h = harness(5, retries(3));
    h.table.insert(TENANT, ORDERS, Some(100));
    h.faults.commit.store(u32::MAX, Ordering::SeqCst);

    for _ in 0..2 {
        let err = h.allocator.next_id("order", TENANT).unwrap_err();
        assert_eq!(err.kind(), ErrorKind::AllocationFailure);
        match err {
            Error::AllocationFailure {
                sequence,
                tenant,
                attempts,
                last_error,
            } => {
                assert_eq!((sequence, tenant, attempts), (ORDERS, TENANT, 3));
                assert!(last_error.contains("commit"), "{last_error}");
            }
            other => panic!("unexpected error: {other}"),
        }
        assert_eq!(h.table.counter(TENANT, ORDERS), Some(100));
    }

    assert_eq!(h.calls.commits(), 6);
    let stats = h.allocator.stats();
    assert_eq!(stats.exhausted, 2);
    assert_eq!(stats.failed_attempts, 6);
    assert_eq!(stats.issued(), 0);

    // Once storage recovers, allocation resumes from the untouched counter.
    h.faults.clear();
    assert_eq!(h.allocator.next_id("order", TENANT).unwrap(), 100);
}

#[test]
fn failed_refill_does_not_disturb_a_drained_range() {
    let h = harness(2, retries(2));
    h.table.insert(TENANT, ORDERS, Some(0));
    assert_eq!(draw(&h.allocator, "order", TENANT, 2), vec![0, 1]);

    h.faults.read.store(u32::MAX, Ordering::SeqCst);
    assert!(h.allocator.next_id("order", TENANT).is_err());
    assert_eq!(h.allocator.tenant(TENANT).remaining("order"), Some(0));

    h.faults.clear();
    assert_eq!(draw(&h.allocator, "order", TENANT, 3), vec![2, 3, 4]);
}

#[test]
fn missing_row_is_not_retried() {
    let h = harness(5, retries(5));

    let err = h.allocator.next_id("order", TENANT).unwrap_err();
    assert!(matches!(
        err,
        Error::NotFound {
            sequence: ORDERS,
            tenant: TENANT
        }
    ));
    assert_eq!(h.calls.reads(), 1);
    assert!(h.calls.advances().is_empty());
    assert!(!h.locks.inner.is_held(&LockKey::new(ORDERS, TENANT)));
}

#[test]
fn integrity_violations_are_not_retried() {
    let h = harness(5, retries(5));
    h.table.insert(TENANT, ORDERS, Some(1));
    h.table.insert(TENANT, ORDERS, Some(2));
    h.table.insert(TENANT, CUSTOMERS, None);

    for key in ["order", "customer"] {
        let err = h.allocator.next_id(key, TENANT).unwrap_err();
        assert_eq!(err.kind(), ErrorKind::DataIntegrity, "{key}: {err}");
    }
    assert_eq!(h.calls.reads(), 2);
    assert!(h.calls.advances().is_empty());
}

#[test]
fn counter_overflow_is_an_integrity_error() {
    let h = harness(10, retries(3));
    h.table.insert(TENANT, ORDERS, Some(i64::MAX - 5));

    let err = h.allocator.next_id("order", TENANT).unwrap_err();
    assert_eq!(err.kind(), ErrorKind::DataIntegrity);
    assert_eq!(h.table.counter(TENANT, ORDERS), Some(i64::MAX - 5));
    assert_eq!(h.calls.reads(), 1);
}

#[test]
fn unknown_key_touches_nothing() {
    let h = harness(5, retries(3));
    h.table.insert(TENANT, ORDERS, Some(1));

    let err = h.allocator.next_id("invoice", TENANT).unwrap_err();
    assert!(matches!(err, Error::UnknownKey { ref key } if key == "invoice"));
    assert_eq!(h.calls.begins.load(Ordering::SeqCst), 0);
    assert_eq!(h.locks.acquires.load(Ordering::SeqCst), 0);
}

#[test]
fn transient_lock_failures_are_retried() {
    let h = harness(5, retries(3));
    h.table.insert(TENANT, ORDERS, Some(40));
    h.locks.fail_acquire.store(2, Ordering::SeqCst);

    assert_eq!(h.allocator.next_id("order", TENANT).unwrap(), 40);
    assert_eq!(h.locks.acquires.load(Ordering::SeqCst), 3);
    // No storage work happens without the lock.
    assert_eq!(h.calls.begins.load(Ordering::SeqCst), 1);
}

#[test]
fn failed_release_keeps_the_committed_reservation() {
    let h = harness(2, retries(3));
    h.table.insert(TENANT, ORDERS, Some(10));
    h.locks.fail_release.store(u32::MAX, Ordering::SeqCst);

    assert_eq!(h.allocator.next_id("order", TENANT).unwrap(), 10);
    assert_eq!(h.calls.advances(), vec![(ORDERS, 12)]);
    assert_eq!(h.calls.commits(), 1);
    assert_eq!(h.table.counter(TENANT, ORDERS), Some(12));
    assert_eq!(h.allocator.stats().failed_attempts, 0);

    // The reserved range is served, and the next refill starts after it.
    assert_eq!(draw(&h.allocator, "order", TENANT, 2), vec![11, 12]);
    assert_eq!(h.calls.advances(), vec![(ORDERS, 12), (ORDERS, 14)]);
    assert_eq!(h.table.counter(TENANT, ORDERS), Some(14));

    let stats = h.allocator.stats();
    assert_eq!(stats.refills, 2);
    assert_eq!(stats.failed_attempts, 0);
    assert_eq!(h.locks.acquires.load(Ordering::SeqCst), 2);
    assert_eq!(h.locks.releases.load(Ordering::SeqCst), 2);
    assert!(!h.locks.inner.is_held(&LockKey::new(ORDERS, TENANT)));
}

#[test]
fn refused_lock_is_surfaced_without_retry() {
    let config = AllocatorConfig::builder()
        .sequence(ORDERS, 5)
        .key("order", ORDERS)
        .retry(retries(4))
        .lock_scope(LockScope::Cluster)
        .build()
        .unwrap();
    let h = harness_with(config);
    h.table.insert(TENANT, ORDERS, Some(1));

    let err = h.allocator.next_id("order", TENANT).unwrap_err();
    assert_eq!(err.kind(), ErrorKind::Lock);
    assert!(matches!(
        err,
        Error::Lock {
            source: LockError::Rejected(_),
            ..
        }
    ));
    assert_eq!(h.locks.acquires.load(Ordering::SeqCst), 1);
    assert_eq!(h.calls.begins.load(Ordering::SeqCst), 0);
}

#[test]
fn lock_timeouts_count_against_the_budget() {
    let table = MemoryCounterStore::new();
    table.insert(TENANT, ORDERS, Some(9));
    let locks = Arc::new(LocalLockService::with_timeout(Duration::from_millis(5)));
    let allocator = Allocator::from_shared(
        Arc::new(config(3, retries(2))),
        Arc::new(table.clone()),
        Arc::clone(&locks),
    )
    .unwrap();

    let key = LockKey::new(ORDERS, TENANT);
    let held = locks.acquire(&key, LockScope::Process).unwrap();
    let err = allocator.next_id("order", TENANT).unwrap_err();
    match err {
        Error::AllocationFailure { last_error, .. } => {
            assert!(last_error.contains("timed out"), "{last_error}");
        }
        other => panic!("unexpected error: {other}"),
    }
    assert_eq!(table.counter(TENANT, ORDERS), Some(9));

    locks.release(held, LockScope::Process).unwrap();
    assert_eq!(allocator.next_id("order", TENANT).unwrap(), 9);
}

#[test]
fn backoff_sleeps_between_attempts() {
    let h = harness(5, RetryPolicy::new(3, Duration::from_millis(15)));
    h.table.insert(TENANT, ORDERS, Some(0));
    h.faults.read.store(2, Ordering::SeqCst);

    let started = std::time::Instant::now();
    assert_eq!(h.allocator.next_id("order", TENANT).unwrap(), 0);
    assert!(started.elapsed() >= Duration::from_millis(30));
}

#[test]
fn tenants_are_isolated() {
    let h = harness(10, retries(3));
    h.table.insert(1, ORDERS, Some(1_000));
    h.table.insert(2, ORDERS, Some(5_000));

    assert_eq!(draw(&h.allocator, "order", 1, 3), vec![1_000, 1_001, 1_002]);
    let first = h.allocator.tenant(1);
    assert_eq!(first.remaining("order"), Some(7));

    // Creating and draining a second tenant leaves the first untouched.
    assert_eq!(draw(&h.allocator, "order", 2, 12).first(), Some(&5_000));
    assert_eq!(first.remaining("order"), Some(7));
    assert_eq!(h.table.counter(1, ORDERS), Some(1_010));
    assert_eq!(h.table.counter(2, ORDERS), Some(5_020));
    assert_eq!(first.stats().issued(), 3);
    assert_eq!(h.allocator.tenant(2).stats().issued(), 12);

    assert_eq!(h.allocator.next_id("order", 1).unwrap(), 1_003);
    assert_eq!(h.allocator.tenants_created(), 2);
}

#[test]
fn one_instance_per_tenant_under_concurrent_first_use() {
    const THREADS: usize = 32;

    let h = harness(10, retries(3));
    let barrier = Barrier::new(THREADS);

    let instances: Vec<_> = scope(|s| {
        let handles: Vec<_> = (0..THREADS)
            .map(|_| {
                s.spawn(|| {
                    barrier.wait();
                    h.allocator.tenant(99)
                })
            })
            .collect();
        handles
            .into_iter()
            .map(|handle| handle.join().unwrap())
            .collect()
    });

    assert_eq!(h.allocator.tenants_created(), 1);
    assert!(instances.iter().all(|t| Arc::ptr_eq(t, &instances[0])));
    assert_eq!(instances[0].tenant(), 99);
}

#[test]
fn unique_and_dense_under_contention() {
    const THREADS: usize = 100;
    const PER_THREAD: usize = 100;
    const START: i64 = 1_000;

    let h = harness(7, retries(3));
    h.table.insert(TENANT, ORDERS, Some(START));

    let ids = run_unique_under_contention(&[&h.allocator], "order", TENANT, THREADS, PER_THREAD);

    let expected: Vec<i64> = (START..START + (THREADS * PER_THREAD) as i64).collect();
    assert_eq!(ids, expected);

    let stats = h.allocator.stats();
    assert_eq!(stats.issued(), (THREADS * PER_THREAD) as u64);
    assert_eq!(stats.failed_attempts, 0);
    let counter = h.table.counter(TENANT, ORDERS).unwrap();
    assert_eq!(counter, START + stats.refills as i64 * 7);
}

#[test]
fn allocators_sharing_storage_never_collide() {
    const THREADS: usize = 16;
    const PER_THREAD: usize = 250;

    let table = MemoryCounterStore::new();
    table.insert(TENANT, ORDERS, Some(0));
    let config = Arc::new(config(13, retries(3)));
    let store = Arc::new(table.clone());
    let locks = Arc::new(LocalLockService::new());

    // Two allocators with independent ranges stand in for two nodes.
    let node_a =
        Allocator::from_shared(Arc::clone(&config), Arc::clone(&store), Arc::clone(&locks))
            .unwrap();
    let node_b = Allocator::from_shared(config, store, locks).unwrap();

    let ids = run_unique_under_contention(&[&node_a, &node_b], "order", TENANT, THREADS, PER_THREAD);
    assert_eq!(ids.len(), THREADS * PER_THREAD);

    let refills = node_a.stats().refills + node_b.stats().refills;
    assert_eq!(table.counter(TENANT, ORDERS), Some(refills as i64 * 13));
}

#[test]
fn invalid_configuration_is_rejected_up_front() {
    let mut config = config(5, retries(3));
    config.capacities.insert(ORDERS, 0);

    let err = Allocator::new(config, MemoryCounterStore::new(), LocalLockService::new())
        .err()
        .unwrap();
    assert_eq!(err.kind(), ErrorKind::InvalidConfig);
}

#[cfg(feature = "sqlite")]
mod sqlite {
    use super::*;
    use crate::{SqliteCounterStore, SqliteStoreConfig};

    #[test]
    fn end_to_end_over_sqlite() {
        const THREADS: usize = 8;
        const PER_THREAD: usize = 200;

        let dir = tempfile::tempdir().unwrap();
        let store = SqliteCounterStore::open(dir.path().join("ids.db")).unwrap();
        store.create_schema().unwrap();
        store.provision(TENANT, ORDERS, Some(1)).unwrap();

        let allocator = Allocator::new(config(10, retries(5)), store, LocalLockService::new()).unwrap();
        let ids = run_unique_under_contention(&[&allocator], "order", TENANT, THREADS, PER_THREAD);

        let expected: Vec<i64> = (1..=(THREADS * PER_THREAD) as i64).collect();
        assert_eq!(ids, expected);
        assert_eq!(
            allocator.store().counter(TENANT, ORDERS).unwrap(),
            1 + allocator.stats().refills as i64 * 10
        );
    }

    #[test]
    fn separate_processes_are_serialized_by_the_database() {
        const THREADS: usize = 8;
        const PER_THREAD: usize = 100;

        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("ids.db");
        let open = || {
            let config = SqliteStoreConfig {
                max_connections: 4,
                ..SqliteStoreConfig::default()
            };
            SqliteCounterStore::with_config(&path, config).unwrap()
        };

        let setup = open();
        setup.create_schema().unwrap();
        setup.provision(TENANT, CUSTOMERS, Some(500)).unwrap();

        // Independent pools and process-local locks: only the database
        // serializes the two nodes.
        let node_a = Allocator::new(config(3, retries(10)), open(), LocalLockService::new()).unwrap();
        let node_b = Allocator::new(config(3, retries(10)), open(), LocalLockService::new()).unwrap();

        let ids = run_unique_under_contention(
            &[&node_a, &node_b],
            "customer",
            TENANT,
            THREADS,
            PER_THREAD,
        );
        assert_eq!(ids.len(), THREADS * PER_THREAD);
        assert!(ids.iter().all(|&id| id >= 500));
    }
}
