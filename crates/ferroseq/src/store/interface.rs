use crate::{SequenceId, StoreError, TenantId};

/// Transactional access to the persisted counter table.
///
/// A store hands out one [`CounterTx`] per refill attempt. The allocator
/// decides when to commit; a transaction dropped without
/// [`CounterTx::commit`] must roll back.
///
/// Implementations perform no retries. Anything other than a missing or
/// inconsistent row is reported as [`StoreError::Transient`] and the caller
/// applies its own retry policy.
pub trait CounterStore: Send + Sync {
    /// The transaction type bound to a single connection.
    type Tx: CounterTx;

    /// Opens a connection and starts a transaction scoped to `tenant`.
    ///
    /// # Errors
    ///
    /// Returns [`StoreError::Transient`] if no connection could be obtained or
    /// the transaction could not be started.
    fn begin(&self, tenant: TenantId) -> Result<Self::Tx, StoreError>;
}

/// A single open transaction against the counter table.
pub trait CounterTx {
    /// Reads the counter for `sequence`.
    ///
    /// # Errors
    ///
    /// - [`StoreError::NotFound`] if no row matches.
    /// - [`StoreError::DataIntegrity`] if several rows match or the counter is
    ///   NULL.
    /// - [`StoreError::Transient`] for any backend failure.
    fn read(&mut self, sequence: SequenceId) -> Result<i64, StoreError>;

    /// Sets the counter for `sequence` to `value` without committing.
    ///
    /// # Errors
    ///
    /// Same classification as [`CounterTx::read`].
    fn advance(&mut self, sequence: SequenceId, value: i64) -> Result<(), StoreError>;

    /// Commits every change made through this transaction.
    ///
    /// # Errors
    ///
    /// Returns [`StoreError::Transient`] if the commit failed; nothing was
    /// persisted in that case.
    fn commit(self) -> Result<(), StoreError>;
}
