// src/lock/memory.rs

use std::collections::HashSet;
use std::path::PathBuf;
use std::sync::{Arc, Mutex, PoisonError};

use super::sanitize::lock_file_name;
use super::{LockError, LockManager, LockToken, RetryPolicy, acquire_with_retries};

/// In-process lock manager.
///
/// Same naming and retry semantics as [`FileLockManager`](super::FileLockManager),
/// but the held set lives in memory. Clones share the held set, so several
/// jobs in one test process can contend on it.
#[derive(Debug, Clone, Default)]
pub struct MemoryLockManager {
    held: Arc<Mutex<HashSet<String>>>,
    policy: RetryPolicy,
}

impl MemoryLockManager {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_policy(mut self, policy: RetryPolicy) -> Self {
        self.policy = policy;
        self
    }

    pub fn is_held(&self, identifier: &str) -> bool {
        self.held
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .contains(&lock_file_name(identifier))
    }

    pub fn held_count(&self) -> usize {
        self.held.lock().unwrap_or_else(PoisonError::into_inner).len()
    }
}

impl LockManager for MemoryLockManager {
    fn lock_path(&self, identifier: &str) -> PathBuf {
        PathBuf::from(lock_file_name(identifier))
    }

    fn acquire(&self, identifier: &str) -> Result<LockToken, LockError> {
        let path = self.lock_path(identifier);
        let key = lock_file_name(identifier);

        acquire_with_retries(&self.policy, &path, || {
            let mut held = self.held.lock().unwrap_or_else(PoisonError::into_inner);
            Ok(held.insert(key.clone()))
        })?;

        Ok(LockToken::new(identifier, path))
    }

    fn release(&self, token: &LockToken) -> Result<(), LockError> {
        self.held
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .remove(&lock_file_name(token.identifier()));
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::Duration;

    #[test]
    fn clones_share_held_locks() {
        let a = MemoryLockManager::new().with_policy(RetryPolicy::new(Duration::from_millis(1), 2));
        let b = a.clone();

        let token = a.acquire("job").unwrap();
        assert!(b.is_held("job"));
        assert!(b.acquire("job").unwrap_err().is_contention());

        b.release(&token).unwrap();
        assert!(!a.is_held("job"));
        assert_eq!(a.held_count(), 0);
    }
}
