use std::io::Write;
use std::thread::scope;
use std::time::Duration;

use anyhow::{Context, anyhow, bail};
use ferroseq::{
    Allocator, AllocatorConfig, LocalLockService, LockScope, SequenceId, SqliteCounterStore,
    SqliteStoreConfig, TenantId,
};

use super::config::{Action, Settings};

/// Executes the action described by `settings`, writing allocated ids to
/// `out`.
pub fn run(settings: Settings, out: &mut impl Write) -> anyhow::Result<()> {
    let store = open_store(&settings)?;

    match settings.action {
        Action::Init => init(&store),
        Action::Provision {
            tenant,
            sequence,
            start,
        } => provision(&store, tenant, sequence, start),
        Action::Next {
            tenant,
            key,
            count,
            threads,
            allocator,
        } => {
            let ids = next(
                store,
                allocator,
                settings.lock_timeout,
                tenant,
                &key,
                count,
                threads,
            )?;
            for id in ids {
                writeln!(out, "{id}")?;
            }
            out.flush()?;
            Ok(())
        }
    }
}

fn open_store(settings: &Settings) -> anyhow::Result<SqliteCounterStore> {
    let config = SqliteStoreConfig {
        table: settings.table.clone(),
        ..SqliteStoreConfig::default()
    };
    SqliteCounterStore::with_config(&settings.db, config)
        .with_context(|| format!("failed to open {}", settings.db.display()))
}

fn init(store: &SqliteCounterStore) -> anyhow::Result<()> {
    store.create_schema()?;
    tracing::info!(table = store.table(), "counter table ready");
    Ok(())
}

fn provision(
    store: &SqliteCounterStore,
    tenant: TenantId,
    sequence: SequenceId,
    start: i64,
) -> anyhow::Result<()> {
    if !store.provision_if_absent(tenant, sequence, Some(start))? {
        bail!("sequence {sequence} of tenant {tenant} is already provisioned");
    }
    tracing::info!(tenant, sequence, start, "provisioned counter row");
    Ok(())
}

/// Draws `count` ids for `key`, split across `threads` threads sharing one
/// allocator. Returns the ids in ascending order.
fn next(
    store: SqliteCounterStore,
    config: AllocatorConfig,
    lock_timeout: Duration,
    tenant: TenantId,
    key: &str,
    count: usize,
    threads: usize,
) -> anyhow::Result<Vec<i64>> {
    let mut locks = LocalLockService::with_timeout(lock_timeout);
    if config.lock_scope == LockScope::Cluster {
        // `BEGIN IMMEDIATE` already serializes writers on the database file.
        locks = locks.accept_cluster_scope();
    }
    let allocator = Allocator::new(config, store, locks)?;

    let per_thread = count / threads;
    let extra = count % threads;

    let batches = scope(|s| {
        let handles: Vec<_> = (0..threads)
            .map(|t| {
                let n = per_thread + usize::from(t < extra);
                let allocator = &allocator;
                s.spawn(move || {
                    (0..n)
                        .map(|_| allocator.next_id(key, tenant))
                        .collect::<ferroseq::Result<Vec<_>>>()
                })
            })
            .collect();

        handles
            .into_iter()
            .map(|handle| match handle.join() {
                Ok(batch) => batch.map_err(anyhow::Error::from),
                Err(_) => Err(anyhow!("allocation thread panicked")),
            })
            .collect::<anyhow::Result<Vec<_>>>()
    })?;

    let mut ids: Vec<i64> = batches.into_iter().flatten().collect();
    ids.sort_unstable();

    let stats = allocator.stats();
    tracing::info!(
        tenant,
        key,
        count,
        threads,
        refills = stats.refills,
        failed_attempts = stats.failed_attempts,
        "allocated ids"
    );
    Ok(ids)
}
