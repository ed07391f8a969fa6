use core::time::Duration;
use std::{collections::HashMap, time::Instant};

use parking_lot::{Condvar, Mutex};
use portable_atomic::{AtomicU64, Ordering};

use crate::{
    LockError,
    lock::{LockKey, LockScope, LockService},
};

/// An in-process [`LockService`].
///
/// Grants at most one holder per [`LockKey`] at a time; other callers block
/// until the holder releases or the acquire timeout elapses. Locks are not
/// visible to other processes, so [`LockScope::Cluster`] requests are refused
/// unless the service was built with [`LocalLockService::accept_cluster_scope`]
/// (for single-node deployments where the store already serializes writers).
#[derive(Debug, Default)]
pub struct LocalLockService {
    held: Mutex<HashMap<LockKey, u64>>,
    released: Condvar,
    next_token: AtomicU64,
    timeout: Option<Duration>,
    cluster_scope: bool,
}

/// Handle returned by [`LocalLockService::acquire`].
#[derive(Debug, PartialEq, Eq)]
pub struct LocalLockHandle {
    key: LockKey,
    token: u64,
}

impl LocalLockHandle {
    pub const fn key(&self) -> LockKey {
        self.key
    }
}

impl LocalLockService {
    /// Creates a service whose acquires block without a deadline.
    pub fn new() -> Self {
        Self::default()
    }

    /// Creates a service whose acquires give up after `timeout`.
    pub fn with_timeout(timeout: Duration) -> Self {
        Self {
            timeout: Some(timeout),
            ..Self::default()
        }
    }

    /// Treats [`LockScope::Cluster`] requests like process-local ones.
    #[must_use]
    pub fn accept_cluster_scope(mut self) -> Self {
        self.cluster_scope = true;
        self
    }

    /// Returns `true` if `key` is currently held.
    pub fn is_held(&self, key: &LockKey) -> bool {
        self.held.lock().contains_key(key)
    }
}

impl LockService for LocalLockService {
    type Handle = LocalLockHandle;

    fn acquire(&self, key: &LockKey, scope: LockScope) -> Result<Self::Handle, LockError> {
        if scope == LockScope::Cluster && !self.cluster_scope {
            return Err(LockError::Rejected(format!(
                "`{key}` requested {scope} scope but this lock service is process-local"
            )));
        }

        let started = Instant::now();
        let deadline = self.timeout.map(|t| started + t);
        let mut held = self.held.lock();

        while held.contains_key(key) {
            match deadline {
                Some(deadline) => {
                    let result = self.released.wait_until(&mut held, deadline);
                    if result.timed_out() && held.contains_key(key) {
                        return Err(LockError::Timeout {
                            key: key.to_string(),
                            waited: started.elapsed(),
                        });
                    }
                }
                None => self.released.wait(&mut held),
            }
        }

        let token = self.next_token.fetch_add(1, Ordering::Relaxed);
        held.insert(*key, token);
        Ok(LocalLockHandle { key: *key, token })
    }

    fn release(&self, handle: Self::Handle, _scope: LockScope) -> Result<(), LockError> {
        let mut held = self.held.lock();
        match held.get(&handle.key) {
            Some(&token) if token == handle.token => {
                held.remove(&handle.key);
                drop(held);
                self.released.notify_all();
                Ok(())
            }
            _ => Err(LockError::Rejected(format!(
                "`{}` is not held by this handle",
                handle.key
            ))),
        }
    }
}
