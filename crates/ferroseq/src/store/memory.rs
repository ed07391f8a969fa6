use std::sync::Arc;

use parking_lot::Mutex;

use crate::{
    SequenceId, TenantId,
    error::StoreError,
    store::{CounterStore, CounterTx},
};

/// One row of the in-memory counter table.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct CounterRow {
    pub sequence: SequenceId,
    pub tenant: TenantId,
    /// `None` models a NULL counter column.
    pub next_id: Option<i64>,
}

/// An in-memory [`CounterStore`].
///
/// Rows are kept as a plain table, so duplicated or NULL rows can be set up
/// to exercise integrity handling. Updates made through a transaction are
/// buffered and applied atomically on commit; dropping the transaction
/// discards them.
///
/// Cloning the store shares the underlying table.
#[derive(Clone, Debug, Default)]
pub struct MemoryCounterStore {
    rows: Arc<Mutex<Vec<CounterRow>>>,
}

impl MemoryCounterStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Adds a counter row. Does not check for duplicates.
    pub fn insert(&self, tenant: TenantId, sequence: SequenceId, next_id: Option<i64>) {
        self.rows.lock().push(CounterRow {
            sequence,
            tenant,
            next_id,
        });
    }

    /// Overwrites the counter of every row matching `(tenant, sequence)`.
    /// Returns the number of rows touched.
    pub fn set(&self, tenant: TenantId, sequence: SequenceId, next_id: Option<i64>) -> usize {
        let mut rows = self.rows.lock();
        let mut touched = 0;
        for row in rows.iter_mut().filter(|r| r.matches(tenant, sequence)) {
            row.next_id = next_id;
            touched += 1;
        }
        touched
    }

    /// Returns the counter of the first row matching `(tenant, sequence)`.
    pub fn counter(&self, tenant: TenantId, sequence: SequenceId) -> Option<i64> {
        self.rows
            .lock()
            .iter()
            .find(|r| r.matches(tenant, sequence))
            .and_then(|r| r.next_id)
    }

    /// Returns a copy of every row.
    pub fn rows(&self) -> Vec<CounterRow> {
        self.rows.lock().clone()
    }
}

impl CounterRow {
    fn matches(&self, tenant: TenantId, sequence: SequenceId) -> bool {
        self.tenant == tenant && self.sequence == sequence
    }
}

impl CounterStore for MemoryCounterStore {
    type Tx = MemoryTx;

    fn begin(&self, tenant: TenantId) -> Result<Self::Tx, StoreError> {
        Ok(MemoryTx {
            rows: Arc::clone(&self.rows),
            tenant,
            pending: Vec::new(),
        })
    }
}

/// Transaction handle for [`MemoryCounterStore`].
#[derive(Debug)]
pub struct MemoryTx {
    rows: Arc<Mutex<Vec<CounterRow>>>,
    tenant: TenantId,
    pending: Vec<(SequenceId, i64)>,
}

impl MemoryTx {
    fn lookup(rows: &[CounterRow], tenant: TenantId, sequence: SequenceId) -> Result<i64, StoreError> {
        let mut matching = rows.iter().filter(|r| r.matches(tenant, sequence));
        let row = matching.next().ok_or(StoreError::NotFound)?;
        if matching.next().is_some() {
            return Err(StoreError::DataIntegrity(format!(
                "multiple counter rows for sequence {sequence}"
            )));
        }
        row.next_id.ok_or_else(|| {
            StoreError::DataIntegrity(format!("counter for sequence {sequence} is NULL"))
        })
    }
}

impl CounterTx for MemoryTx {
    fn read(&mut self, sequence: SequenceId) -> Result<i64, StoreError> {
        // Own writes are visible inside the transaction.
        if let Some(&(_, value)) = self.pending.iter().rev().find(|(s, _)| *s == sequence) {
            return Ok(value);
        }
        Self::lookup(&self.rows.lock(), self.tenant, sequence)
    }

    fn advance(&mut self, sequence: SequenceId, value: i64) -> Result<(), StoreError> {
        Self::lookup(&self.rows.lock(), self.tenant, sequence)?;
        self.pending.push((sequence, value));
        Ok(())
    }

    fn commit(self) -> Result<(), StoreError> {
        let tenant = self.tenant;
        let mut rows = self.rows.lock();
        for (sequence, value) in self.pending {
            for row in rows.iter_mut().filter(|r| r.matches(tenant, sequence)) {
                row.next_id = Some(value);
            }
        }
        Ok(())
    }
}
