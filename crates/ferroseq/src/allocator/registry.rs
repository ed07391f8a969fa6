use std::sync::Arc;

use dashmap::DashMap;
use portable_atomic::{AtomicU64, Ordering};

use crate::{
    AllocatorConfig, Result, TenantId,
    allocator::{stats::AllocatorStats, tenant::TenantAllocator},
    lock::LockService,
    store::CounterStore,
};

/// The entry point for id allocation across tenants.
///
/// Keeps exactly one [`TenantAllocator`] per tenant, created on first use and
/// retained for the lifetime of the `Allocator`. Concurrent first requests
/// for a new tenant all end up sharing the same instance.
///
/// # Example
/// ```
/// use ferroseq::{Allocator, AllocatorConfig, LocalLockService, MemoryCounterStore};
///
/// let store = MemoryCounterStore::new();
/// store.insert(7, 1, Some(1_000));
///
/// let config = AllocatorConfig::builder().sequence(1, 10).key("order", 1).build().unwrap();
/// let allocator = Allocator::new(config, store.clone(), LocalLockService::new()).unwrap();
///
/// assert_eq!(allocator.next_id("order", 7).unwrap(), 1_000);
/// assert_eq!(allocator.next_id("order", 7).unwrap(), 1_001);
/// // One refill reserved ten ids.
/// assert_eq!(store.counter(7, 1), Some(1_010));
/// ```
pub struct Allocator<S, L>
where
    S: CounterStore,
    L: LockService,
{
    config: Arc<AllocatorConfig>,
    store: Arc<S>,
    locks: Arc<L>,
    tenants: DashMap<TenantId, Arc<TenantAllocator<S, L>>>,
    created: AtomicU64,
}

impl<S, L> Allocator<S, L>
where
    S: CounterStore,
    L: LockService,
{
    /// Creates an allocator owning its store and lock service.
    ///
    /// # Errors
    ///
    /// Returns [`Error::InvalidConfig`](crate::Error::InvalidConfig) if the
    /// configuration does not validate.
    pub fn new(config: AllocatorConfig, store: S, locks: L) -> Result<Self> {
        Self::from_shared(Arc::new(config), Arc::new(store), Arc::new(locks))
    }

    /// Creates an allocator over a store and lock service shared with other
    /// components, e.g. several allocators in one process standing in for
    /// separate nodes.
    ///
    /// # Errors
    ///
    /// See [`Allocator::new`].
    pub fn from_shared(config: Arc<AllocatorConfig>, store: Arc<S>, locks: Arc<L>) -> Result<Self> {
        config.validate()?;
        Ok(Self {
            config,
            store,
            locks,
            tenants: DashMap::new(),
            created: AtomicU64::new(0),
        })
    }

    /// Returns the next id for `key` within `tenant`.
    ///
    /// # Errors
    ///
    /// See [`TenantAllocator::next_id`].
    pub fn next_id(&self, key: &str, tenant: TenantId) -> Result<i64> {
        self.tenant(tenant).next_id(key)
    }

    /// Returns the allocator for `tenant`, creating it if needed.
    pub fn tenant(&self, tenant: TenantId) -> Arc<TenantAllocator<S, L>> {
        if let Some(existing) = self.tenants.get(&tenant) {
            return Arc::clone(existing.value());
        }

        // `entry` holds the shard write lock, so only one caller constructs.
        let entry = self.tenants.entry(tenant).or_insert_with(|| {
            self.created.fetch_add(1, Ordering::Relaxed);
            #[cfg(feature = "tracing")]
            tracing::debug!(tenant, "creating tenant allocator");
            Arc::new(TenantAllocator::new(
                tenant,
                Arc::clone(&self.config),
                Arc::clone(&self.store),
                Arc::clone(&self.locks),
            ))
        });
        Arc::clone(entry.value())
    }

    /// Number of tenant allocators constructed so far.
    pub fn tenants_created(&self) -> u64 {
        self.created.load(Ordering::Relaxed)
    }

    pub fn config(&self) -> &AllocatorConfig {
        &self.config
    }

    pub fn store(&self) -> &S {
        &self.store
    }

    /// Counters summed over every tenant.
    pub fn stats(&self) -> AllocatorStats {
        self.tenants
            .iter()
            .fold(AllocatorStats::default(), |acc, entry| acc + entry.value().stats())
    }
}
