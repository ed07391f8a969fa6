//! SQLite-backed counter store.
//!
//! Counter rows live in a single table:
//!
//! ```sql
//! CREATE TABLE id_sequence (
//!     sequence_id INTEGER NOT NULL,
//!     tenant_id   INTEGER NOT NULL,
//!     next_id     INTEGER
//! );
//! ```
//!
//! Every transaction runs as `BEGIN IMMEDIATE`, which takes SQLite's write
//! lock up front, so the read and the update of a refill can never interleave
//! with another writer on the same database file.

use core::fmt;
use core::time::Duration;
use std::path::Path;

use r2d2::{Pool, PooledConnection};
use r2d2_sqlite::SqliteConnectionManager;
use rusqlite::{TransactionBehavior, params};

use crate::{
    SequenceId, TenantId,
    error::StoreError,
    store::{CounterStore, CounterTx},
};

/// Default name of the counter table.
pub const DEFAULT_TABLE: &str = "id_sequence";

/// Configuration for [`SqliteCounterStore`].
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct SqliteStoreConfig {
    /// Name of the counter table. Must be a plain SQL identifier.
    pub table: String,
    /// Maximum number of pooled connections.
    pub max_connections: u32,
    /// How long to wait for a pooled connection.
    pub connection_timeout: Duration,
    /// How long SQLite waits on a locked database before reporting busy.
    pub busy_timeout: Duration,
}

impl Default for SqliteStoreConfig {
    fn default() -> Self {
        Self {
            table: DEFAULT_TABLE.to_string(),
            max_connections: 8,
            connection_timeout: Duration::from_secs(5),
            busy_timeout: Duration::from_secs(5),
        }
    }
}

/// A [`CounterStore`] over a SQLite database file.
pub struct SqliteCounterStore {
    pool: Pool<SqliteConnectionManager>,
    queries: Queries,
}

impl fmt::Debug for SqliteCounterStore {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("SqliteCounterStore")
            .field("table", &self.queries.table)
            .field("max_connections", &self.pool.max_size())
            .finish_non_exhaustive()
    }
}

#[derive(Clone, Debug)]
struct Queries {
    table: String,
    select: String,
    update: String,
}

impl Queries {
    fn new(table: &str) -> Self {
        Self {
            table: table.to_string(),
            select: format!(
                "SELECT next_id FROM {table} WHERE sequence_id = ?1 AND tenant_id = ?2"
            ),
            update: format!(
                "UPDATE {table} SET next_id = ?3 WHERE sequence_id = ?1 AND tenant_id = ?2"
            ),
        }
    }
}

fn transient(context: &str, err: impl fmt::Display) -> StoreError {
    StoreError::Transient(format!("{context}: {err}"))
}

fn is_identifier(name: &str) -> bool {
    let mut chars = name.chars();
    chars
        .next()
        .is_some_and(|c| c.is_ascii_alphabetic() || c == '_')
        && chars.all(|c| c.is_ascii_alphanumeric() || c == '_')
}

impl SqliteCounterStore {
    /// Opens (or creates) the database at `path` with default settings.
    ///
    /// # Errors
    ///
    /// See [`SqliteCounterStore::with_config`].
    pub fn open<P: AsRef<Path>>(path: P) -> Result<Self, StoreError> {
        Self::with_config(path, SqliteStoreConfig::default())
    }

    /// Opens the database at `path` using `config`.
    ///
    /// # Errors
    ///
    /// Returns [`StoreError::DataIntegrity`] if the table name is not a plain
    /// identifier, and [`StoreError::Transient`] if the pool cannot be built.
    pub fn with_config<P: AsRef<Path>>(
        path: P,
        config: SqliteStoreConfig,
    ) -> Result<Self, StoreError> {
        if !is_identifier(&config.table) {
            return Err(StoreError::DataIntegrity(format!(
                "invalid counter table name `{}`",
                config.table
            )));
        }

        let busy_timeout = config.busy_timeout;
        let manager = SqliteConnectionManager::file(path.as_ref())
            .with_init(move |conn| conn.busy_timeout(busy_timeout));

        let pool = Pool::builder()
            .max_size(config.max_connections)
            .min_idle(Some(0))
            .connection_timeout(config.connection_timeout)
            .build(manager)
            .map_err(|e| transient("failed to build connection pool", e))?;

        Ok(Self {
            pool,
            queries: Queries::new(&config.table),
        })
    }

    /// Name of the counter table.
    pub fn table(&self) -> &str {
        &self.queries.table
    }

    fn connection(&self) -> Result<PooledConnection<SqliteConnectionManager>, StoreError> {
        self.pool
            .get()
            .map_err(|e| transient("failed to get a connection", e))
    }

    /// Creates the counter table if it does not exist.
    ///
    /// Provisioning helper for operators and tests; allocation never calls
    /// it.
    ///
    /// # Errors
    ///
    /// Returns [`StoreError::Transient`] if the statement fails.
    pub fn create_schema(&self) -> Result<(), StoreError> {
        let conn = self.connection()?;
        conn.execute_batch(&format!(
            "CREATE TABLE IF NOT EXISTS {table} (
                sequence_id INTEGER NOT NULL,
                tenant_id   INTEGER NOT NULL,
                next_id     INTEGER
            );
            CREATE INDEX IF NOT EXISTS {table}_lookup ON {table} (sequence_id, tenant_id);",
            table = self.queries.table
        ))
        .map_err(|e| transient("failed to create counter table", e))
    }

    /// Inserts a counter row starting at `start`.
    ///
    /// Provisioning helper; does not check for an existing row.
    ///
    /// # Errors
    ///
    /// Returns [`StoreError::Transient`] if the insert fails.
    pub fn provision(
        &self,
        tenant: TenantId,
        sequence: SequenceId,
        start: Option<i64>,
    ) -> Result<(), StoreError> {
        let conn = self.connection()?;
        conn.execute(
            &format!(
                "INSERT INTO {} (sequence_id, tenant_id, next_id) VALUES (?1, ?2, ?3)",
                self.queries.table
            ),
            params![sequence, tenant, start],
        )
        .map_err(|e| transient("failed to insert counter row", e))?;
        Ok(())
    }

    /// Inserts a counter row starting at `start` unless one already exists
    /// for `(tenant, sequence)`. Returns `false` if a row was already there.
    ///
    /// The existence check and the insert run in one `BEGIN IMMEDIATE`
    /// transaction, so concurrent callers cannot both insert.
    ///
    /// # Errors
    ///
    /// Returns [`StoreError::Transient`] if the insert fails.
    pub fn provision_if_absent(
        &self,
        tenant: TenantId,
        sequence: SequenceId,
        start: Option<i64>,
    ) -> Result<bool, StoreError> {
        let mut conn = self.connection()?;
        let tx = conn
            .transaction_with_behavior(TransactionBehavior::Immediate)
            .map_err(|e| transient("failed to begin transaction", e))?;
        let inserted = tx
            .execute(
                &format!(
                    "INSERT INTO {table} (sequence_id, tenant_id, next_id)
                     SELECT ?1, ?2, ?3
                     WHERE NOT EXISTS (
                         SELECT 1 FROM {table} WHERE sequence_id = ?1 AND tenant_id = ?2
                     )",
                    table = self.queries.table
                ),
                params![sequence, tenant, start],
            )
            .map_err(|e| transient("failed to insert counter row", e))?;
        tx.commit().map_err(|e| transient("failed to commit", e))?;
        Ok(inserted == 1)
    }

    /// Reads a counter outside of any allocation transaction.
    ///
    /// # Errors
    ///
    /// Same classification as [`CounterTx::read`].
    pub fn counter(&self, tenant: TenantId, sequence: SequenceId) -> Result<i64, StoreError> {
        let conn = self.connection()?;
        read_counter(&conn, &self.queries, tenant, sequence)
    }
}

fn read_counter(
    conn: &rusqlite::Connection,
    queries: &Queries,
    tenant: TenantId,
    sequence: SequenceId,
) -> Result<i64, StoreError> {
    let mut stmt = conn
        .prepare_cached(&queries.select)
        .map_err(|e| transient("failed to prepare counter read", e))?;
    let mut rows = stmt
        .query(params![sequence, tenant])
        .map_err(|e| transient("failed to read counter", e))?;

    let value: Option<i64> = match rows
        .next()
        .map_err(|e| transient("failed to read counter", e))?
    {
        Some(row) => row
            .get(0)
            .map_err(|e| StoreError::DataIntegrity(format!("unreadable counter column: {e}")))?,
        None => return Err(StoreError::NotFound),
    };

    if rows
        .next()
        .map_err(|e| transient("failed to read counter", e))?
        .is_some()
    {
        return Err(StoreError::DataIntegrity(format!(
            "multiple counter rows for sequence {sequence}"
        )));
    }

    value.ok_or_else(|| StoreError::DataIntegrity(format!("counter for sequence {sequence} is NULL")))
}

impl CounterStore for SqliteCounterStore {
    type Tx = SqliteTx;

    fn begin(&self, tenant: TenantId) -> Result<Self::Tx, StoreError> {
        let conn = self.connection()?;
        conn.execute_batch("BEGIN IMMEDIATE")
            .map_err(|e| transient("failed to begin transaction", e))?;
        Ok(SqliteTx {
            conn,
            queries: self.queries.clone(),
            tenant,
            active: true,
        })
    }
}

/// Transaction handle for [`SqliteCounterStore`].
///
/// Rolls back on drop unless committed.
pub struct SqliteTx {
    conn: PooledConnection<SqliteConnectionManager>,
    queries: Queries,
    tenant: TenantId,
    active: bool,
}

impl fmt::Debug for SqliteTx {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("SqliteTx")
            .field("table", &self.queries.table)
            .field("tenant", &self.tenant)
            .field("active", &self.active)
            .finish()
    }
}

impl CounterTx for SqliteTx {
    fn read(&mut self, sequence: SequenceId) -> Result<i64, StoreError> {
        read_counter(&self.conn, &self.queries, self.tenant, sequence)
    }

    fn advance(&mut self, sequence: SequenceId, value: i64) -> Result<(), StoreError> {
        let changed = self
            .conn
            .execute(&self.queries.update, params![sequence, self.tenant, value])
            .map_err(|e| transient("failed to advance counter", e))?;
        match changed {
            0 => Err(StoreError::NotFound),
            _ => Ok(()),
        }
    }

    fn commit(mut self) -> Result<(), StoreError> {
        // A failed COMMIT leaves the transaction open; Drop rolls it back.
        self.conn
            .execute_batch("COMMIT")
            .map_err(|e| transient("failed to commit", e))?;
        self.active = false;
        Ok(())
    }
}

impl Drop for SqliteTx {
    fn drop(&mut self) {
        if self.active {
            let _ = self.conn.execute_batch("ROLLBACK");
        }
    }
}
