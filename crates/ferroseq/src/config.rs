use core::time::Duration;
use std::collections::HashMap;

#[cfg(feature = "serde")]
use serde::{Deserialize, Serialize};

use crate::{Error, LockScope, Result};

/// Numeric identifier of a persisted sequence (one counter row per tenant).
pub type SequenceId = i64;

/// Numeric identifier of a tenant.
pub type TenantId = i64;

/// Default number of refill attempts before giving up.
pub const DEFAULT_MAX_ATTEMPTS: u32 = 3;

/// How many times a refill is attempted, and how long to wait in between.
///
/// Every attempt starts over from lock acquisition.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
#[cfg_attr(feature = "serde", serde(default))]
pub struct RetryPolicy {
    /// Total attempts, including the first. Must be at least one.
    pub max_attempts: u32,
    /// Sleep between a failed attempt and the next one.
    #[cfg_attr(feature = "serde", serde(rename = "backoff_ms", with = "millis"))]
    pub backoff: Duration,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            max_attempts: DEFAULT_MAX_ATTEMPTS,
            backoff: Duration::ZERO,
        }
    }
}

impl RetryPolicy {
    pub const fn new(max_attempts: u32, backoff: Duration) -> Self {
        Self {
            max_attempts,
            backoff,
        }
    }
}

/// Static allocator configuration.
///
/// Maps logical keys (entity type names) to sequence ids, and sequence ids to
/// the number of ids reserved per refill. Several keys may share one sequence.
/// The configuration is validated once when an [`Allocator`] is built and is
/// immutable afterwards.
///
/// # Example
/// ```
/// use ferroseq::{AllocatorConfig, LockScope};
///
/// let config = AllocatorConfig::builder()
///     .sequence(1, 50)
///     .key("order", 1)
///     .key("order_line", 1)
///     .lock_scope(LockScope::Process)
///     .build()
///     .unwrap();
///
/// assert_eq!(config.sequence_for("order_line"), Some(1));
/// assert_eq!(config.capacity_of(1), Some(50));
/// ```
///
/// [`Allocator`]: crate::Allocator
#[derive(Clone, Debug, Default, PartialEq, Eq)]
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
#[cfg_attr(feature = "serde", serde(deny_unknown_fields))]
pub struct AllocatorConfig {
    /// Logical key to sequence id.
    pub keys: HashMap<String, SequenceId>,
    /// Sequence id to range capacity.
    pub capacities: HashMap<SequenceId, i64>,
    #[cfg_attr(feature = "serde", serde(default))]
    pub retry: RetryPolicy,
    #[cfg_attr(feature = "serde", serde(default))]
    pub lock_scope: LockScope,
}

impl AllocatorConfig {
    pub fn builder() -> AllocatorConfigBuilder {
        AllocatorConfigBuilder::default()
    }

    /// Resolves the sequence id configured for `key`.
    pub fn sequence_for(&self, key: &str) -> Option<SequenceId> {
        self.keys.get(key).copied()
    }

    /// Returns the range capacity configured for `sequence`.
    pub fn capacity_of(&self, sequence: SequenceId) -> Option<i64> {
        self.capacities.get(&sequence).copied()
    }

    /// Checks the configuration for errors that would otherwise only surface
    /// at allocation time.
    ///
    /// # Errors
    ///
    /// Returns [`Error::InvalidConfig`] if a key is empty, a key points at a
    /// sequence without a capacity, a capacity is not positive, or the retry
    /// policy allows zero attempts.
    pub fn validate(&self) -> Result<()> {
        if self.retry.max_attempts == 0 {
            return Err(Error::invalid_config(
                "retry.max_attempts must be at least 1",
            ));
        }

        for (&sequence, &capacity) in &self.capacities {
            if capacity <= 0 {
                return Err(Error::invalid_config(format!(
                    "capacity for sequence {sequence} must be positive, got {capacity}"
                )));
            }
        }

        for (key, sequence) in &self.keys {
            if key.is_empty() {
                return Err(Error::invalid_config("keys must not be empty"));
            }
            if !self.capacities.contains_key(sequence) {
                return Err(Error::invalid_config(format!(
                    "key `{key}` maps to sequence {sequence}, which has no capacity"
                )));
            }
        }

        Ok(())
    }
}

/// Incremental construction of an [`AllocatorConfig`].
#[derive(Clone, Debug, Default)]
pub struct AllocatorConfigBuilder {
    config: AllocatorConfig,
}

impl AllocatorConfigBuilder {
    /// Declares a sequence and its range capacity.
    #[must_use]
    pub fn sequence(mut self, sequence: SequenceId, capacity: i64) -> Self {
        self.config.capacities.insert(sequence, capacity);
        self
    }

    /// Maps a logical key onto a sequence.
    #[must_use]
    pub fn key(mut self, key: impl Into<String>, sequence: SequenceId) -> Self {
        self.config.keys.insert(key.into(), sequence);
        self
    }

    #[must_use]
    pub fn retry(mut self, retry: RetryPolicy) -> Self {
        self.config.retry = retry;
        self
    }

    #[must_use]
    pub fn lock_scope(mut self, scope: LockScope) -> Self {
        self.config.lock_scope = scope;
        self
    }

    /// Validates and returns the configuration.
    ///
    /// # Errors
    ///
    /// See [`AllocatorConfig::validate`].
    pub fn build(self) -> Result<AllocatorConfig> {
        self.config.validate()?;
        Ok(self.config)
    }
}

#[cfg(feature = "serde")]
mod millis {
    use core::time::Duration;

    use serde::{Deserialize, Deserializer, Serializer};

    pub fn serialize<S: Serializer>(value: &Duration, serializer: S) -> Result<S::Ok, S::Error> {
        let millis = u64::try_from(value.as_millis()).unwrap_or(u64::MAX);
        serializer.serialize_u64(millis)
    }

    pub fn deserialize<'de, D: Deserializer<'de>>(deserializer: D) -> Result<Duration, D::Error> {
        u64::deserialize(deserializer).map(Duration::from_millis)
    }
}
