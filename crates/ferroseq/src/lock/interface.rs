use core::fmt;

#[cfg(feature = "serde")]
use serde::{Deserialize, Serialize};

use crate::{LockError, SequenceId, TenantId};

/// How far the mutual exclusion of a lock must reach.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Hash)]
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
#[cfg_attr(feature = "serde", serde(rename_all = "lowercase"))]
pub enum LockScope {
    /// Serialize refills between threads of this process only.
    #[default]
    Process,
    /// Serialize refills between every process sharing the counter table.
    Cluster,
}

impl fmt::Display for LockScope {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Process => f.write_str("process"),
            Self::Cluster => f.write_str("cluster"),
        }
    }
}

/// The resource a refill locks: one sequence of one tenant.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct LockKey {
    pub sequence: SequenceId,
    pub tenant: TenantId,
}

impl LockKey {
    pub const fn new(sequence: SequenceId, tenant: TenantId) -> Self {
        Self { sequence, tenant }
    }
}

impl fmt::Display for LockKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "ferroseq/{}/{}", self.tenant, self.sequence)
    }
}

/// An external mutual-exclusion service.
///
/// The allocator holds a lock only for the duration of one refill attempt:
/// acquire, read and advance the counter, commit, release. Implementations
/// may be process-local or cluster-wide; the allocator is only as correct
/// across processes as the scope the service actually enforces.
pub trait LockService: Send + Sync {
    /// Proof of ownership returned by [`LockService::acquire`].
    type Handle: Send;

    /// Blocks until the lock for `key` is granted.
    ///
    /// # Errors
    ///
    /// - [`LockError::Timeout`] or [`LockError::Unavailable`] for failures
    ///   that may clear up on a later attempt.
    /// - [`LockError::Rejected`] if the request can never succeed.
    fn acquire(&self, key: &LockKey, scope: LockScope) -> Result<Self::Handle, LockError>;

    /// Releases a lock previously granted by [`LockService::acquire`].
    ///
    /// # Errors
    ///
    /// Returns an error if the handle is not currently held or the service
    /// cannot be reached.
    fn release(&self, handle: Self::Handle, scope: LockScope) -> Result<(), LockError>;
}
