//! Error types for ID allocation.
//!
//! Allocation surfaces a single [`Error`] enum. Every variant maps to one
//! [`ErrorKind`] so callers (and the refill loop itself) can decide whether a
//! failure is worth retrying without matching on concrete collaborator errors.
//!
//! Collaborators report their own failures through [`StoreError`] and
//! [`LockError`], each of which classifies itself as transient or permanent.

use core::time::Duration;

use crate::{SequenceId, TenantId};

/// A result type defaulting to the allocator [`Error`].
pub type Result<T, E = Error> = core::result::Result<T, E>;

/// Coarse classification of every failure the allocator can observe.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum ErrorKind {
    /// No counter row exists for the sequence.
    NotFound,
    /// The counter row is duplicated, NULL, or would overflow.
    DataIntegrity,
    /// A storage or lock failure that may succeed on another attempt.
    Transient,
    /// Every refill attempt failed with a transient error.
    AllocationFailure,
    /// The key has no configured sequence.
    UnknownKey,
    /// The lock service refused the request outright.
    Lock,
    /// The configuration was rejected at construction time.
    InvalidConfig,
}

impl ErrorKind {
    /// Returns `true` if an operation failing with this kind may be retried.
    pub const fn is_transient(self) -> bool {
        matches!(self, Self::Transient)
    }
}

/// All errors surfaced by [`Allocator`](crate::Allocator) and
/// [`TenantAllocator`](crate::TenantAllocator).
///
/// Transient collaborator failures never appear here directly: they are
/// absorbed by the refill loop and only show up, summarized, inside
/// [`Error::AllocationFailure`].
#[derive(Debug, thiserror::Error)]
#[non_exhaustive]
pub enum Error {
    /// The requested key is not mapped to any sequence.
    #[error("no sequence is configured for key `{key}`")]
    UnknownKey { key: String },

    /// The counter row for the sequence does not exist for this tenant.
    #[error("counter row for sequence {sequence} of tenant {tenant} not found")]
    NotFound {
        sequence: SequenceId,
        tenant: TenantId,
    },

    /// The counter row is unusable.
    #[error("counter row for sequence {sequence} of tenant {tenant} is inconsistent: {reason}")]
    DataIntegrity {
        sequence: SequenceId,
        tenant: TenantId,
        reason: String,
    },

    /// The refill retry budget was exhausted. The in-memory range was left
    /// untouched, so the next call starts a fresh refill.
    #[error(
        "failed to reserve ids for sequence {sequence} of tenant {tenant} after {attempts} attempt(s): {last_error}"
    )]
    AllocationFailure {
        sequence: SequenceId,
        tenant: TenantId,
        attempts: u32,
        last_error: String,
    },

    /// The lock service rejected the request permanently.
    #[error("lock for sequence {sequence} of tenant {tenant} was refused: {source}")]
    Lock {
        sequence: SequenceId,
        tenant: TenantId,
        #[source]
        source: LockError,
    },

    /// The allocator configuration is invalid.
    #[error("invalid allocator configuration: {reason}")]
    InvalidConfig { reason: String },
}

impl Error {
    /// Returns the [`ErrorKind`] tag for this error.
    pub const fn kind(&self) -> ErrorKind {
        match self {
            Self::UnknownKey { .. } => ErrorKind::UnknownKey,
            Self::NotFound { .. } => ErrorKind::NotFound,
            Self::DataIntegrity { .. } => ErrorKind::DataIntegrity,
            Self::AllocationFailure { .. } => ErrorKind::AllocationFailure,
            Self::Lock { .. } => ErrorKind::Lock,
            Self::InvalidConfig { .. } => ErrorKind::InvalidConfig,
        }
    }

    pub(crate) fn invalid_config(reason: impl Into<String>) -> Self {
        Self::InvalidConfig {
            reason: reason.into(),
        }
    }
}

/// Failures reported by a [`CounterStore`](crate::CounterStore) transaction.
#[derive(Debug, thiserror::Error)]
#[non_exhaustive]
pub enum StoreError {
    /// No row matched the sequence for the transaction's tenant.
    #[error("counter row not found")]
    NotFound,

    /// More than one row matched, or the counter column was NULL.
    #[error("data integrity violation: {0}")]
    DataIntegrity(String),

    /// Any other backend failure: busy database, lost connection, failed
    /// commit, pool timeout.
    #[error("transient storage failure: {0}")]
    Transient(String),
}

impl StoreError {
    pub const fn kind(&self) -> ErrorKind {
        match self {
            Self::NotFound => ErrorKind::NotFound,
            Self::DataIntegrity(_) => ErrorKind::DataIntegrity,
            Self::Transient(_) => ErrorKind::Transient,
        }
    }

    pub const fn is_transient(&self) -> bool {
        self.kind().is_transient()
    }
}

/// Failures reported by a [`LockService`](crate::LockService).
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
#[non_exhaustive]
pub enum LockError {
    /// The lock was not granted before the acquire timeout elapsed.
    #[error("timed out after {waited:?} waiting for lock `{key}`")]
    Timeout { key: String, waited: Duration },

    /// The lock service could not be reached or failed mid-request.
    #[error("lock service unavailable: {0}")]
    Unavailable(String),

    /// The request can never succeed, e.g. an unsupported scope or a handle
    /// that is not held.
    #[error("lock request rejected: {0}")]
    Rejected(String),
}

impl LockError {
    pub const fn kind(&self) -> ErrorKind {
        match self {
            Self::Timeout { .. } | Self::Unavailable(_) => ErrorKind::Transient,
            Self::Rejected(_) => ErrorKind::Lock,
        }
    }

    pub const fn is_transient(&self) -> bool {
        self.kind().is_transient()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn kinds_classify_retryability() {
        assert!(StoreError::Transient("busy".into()).is_transient());
        assert!(!StoreError::NotFound.is_transient());
        assert!(!StoreError::DataIntegrity("dup".into()).is_transient());

        let timeout = LockError::Timeout {
            key: "k".into(),
            waited: Duration::from_millis(5),
        };
        assert!(timeout.is_transient());
        assert!(LockError::Unavailable("down".into()).is_transient());
        assert_eq!(LockError::Rejected("scope".into()).kind(), ErrorKind::Lock);
    }

    #[test]
    fn error_kind_matches_variant() {
        let err = Error::AllocationFailure {
            sequence: 3,
            tenant: 7,
            attempts: 2,
            last_error: "busy".into(),
        };
        assert_eq!(err.kind(), ErrorKind::AllocationFailure);
        assert!(!err.kind().is_transient());
        assert_eq!(
            err.to_string(),
            "failed to reserve ids for sequence 3 of tenant 7 after 2 attempt(s): busy"
        );
        assert_eq!(
            Error::UnknownKey { key: "x".into() }.kind(),
            ErrorKind::UnknownKey
        );
    }
}
