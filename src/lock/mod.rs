// src/lock/mod.rs

//! Named mutual exclusion for job runs.
//!
//! A lock is identified purely by the task identifier, so two unrelated
//! processes running the same task synchronise through the lock directory
//! and never through shared memory.
//!
//! - [`sanitize`] maps identifiers to collision-free file names.
//! - [`file`] provides [`FileLockManager`], the cross-process implementation
//!   built on exclusive file creation.
//! - [`memory`] provides [`MemoryLockManager`], an in-process stand-in with
//!   the same retry semantics for single-process tests.
//!
//! Callers normally go through [`LockGuard`], which releases the token on
//! every exit path, including unwinding.

use std::fmt::Debug;
use std::io;
use std::path::{Path, PathBuf};
use std::thread;
use std::time::Duration;

use thiserror::Error;
use tracing::{debug, trace, warn};

pub mod file;
pub mod memory;
pub mod sanitize;

pub use file::FileLockManager;
pub use memory::MemoryLockManager;
pub use sanitize::{lock_file_name, sanitize_identifier};

/// Pause between two acquisition attempts.
pub const DEFAULT_RETRY_INTERVAL: Duration = Duration::from_millis(100);

/// Attempts before giving up with [`LockError::RetriesExhausted`].
pub const DEFAULT_MAX_ATTEMPTS: u32 = 15;

/// Fixed-interval retry policy for lock acquisition.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RetryPolicy {
    pub interval: Duration,
    pub max_attempts: u32,
}

impl RetryPolicy {
    pub fn new(interval: Duration, max_attempts: u32) -> Self {
        Self {
            interval,
            max_attempts: max_attempts.max(1),
        }
    }

    /// Total time spent sleeping before the final attempt fails.
    pub fn budget(&self) -> Duration {
        self.interval * self.max_attempts.saturating_sub(1)
    }
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self::new(DEFAULT_RETRY_INTERVAL, DEFAULT_MAX_ATTEMPTS)
    }
}

#[derive(Error, Debug)]
pub enum LockError {
    /// Another run held the lock for the whole retry budget.
    #[error("surpassed retries acquiring lock {} after {attempts} attempts", .path.display())]
    RetriesExhausted { path: PathBuf, attempts: u32 },

    /// The lock could not be created or removed at all.
    #[error("lock I/O error on {}: {source}", .path.display())]
    Io {
        path: PathBuf,
        #[source]
        source: io::Error,
    },
}

impl LockError {
    pub(crate) fn io(path: impl Into<PathBuf>, source: io::Error) -> Self {
        LockError::Io {
            path: path.into(),
            source,
        }
    }

    /// `true` for the expected "someone else is running it" outcome.
    pub fn is_contention(&self) -> bool {
        matches!(self, LockError::RetriesExhausted { .. })
    }

    pub fn path(&self) -> &Path {
        match self {
            LockError::RetriesExhausted { path, .. } | LockError::Io { path, .. } => path,
        }
    }
}

/// Proof that a lock for `identifier` is currently held.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LockToken {
    identifier: String,
    path: PathBuf,
    owner: String,
}

impl LockToken {
    pub fn new(identifier: impl Into<String>, path: impl Into<PathBuf>) -> Self {
        Self {
            identifier: identifier.into(),
            path: path.into(),
            owner: String::new(),
        }
    }

    /// Attach the backend's ownership stamp (e.g. the lock file contents).
    pub fn with_owner(mut self, owner: impl Into<String>) -> Self {
        self.owner = owner.into();
        self
    }

    pub fn owner(&self) -> &str {
        &self.owner
    }

    pub fn identifier(&self) -> &str {
        &self.identifier
    }

    pub fn path(&self) -> &Path {
        &self.path
    }
}

/// Abstract lock backend.
pub trait LockManager: Send + Sync + Debug {
    /// Location of the lock for `identifier`. Pure; never touches the
    /// backend.
    fn lock_path(&self, identifier: &str) -> PathBuf;

    /// Acquire the lock, retrying according to the manager's policy.
    fn acquire(&self, identifier: &str) -> Result<LockToken, LockError>;

    /// Release a previously acquired token.
    fn release(&self, token: &LockToken) -> Result<(), LockError>;
}

/// Drive `attempt` until it reports success or the policy runs out.
///
/// `attempt` returns `Ok(true)` when the lock was taken, `Ok(false)` when it
/// is held elsewhere, and `Err` for anything that retrying cannot fix.
pub(crate) fn acquire_with_retries(
    policy: &RetryPolicy,
    path: &Path,
    mut attempt: impl FnMut() -> Result<bool, LockError>,
) -> Result<(), LockError> {
    let max_attempts = policy.max_attempts.max(1);

    for n in 1..=max_attempts {
        if attempt()? {
            if n > 1 {
                debug!(lock = %path.display(), attempts = n, "lock acquired after contention");
            }
            return Ok(());
        }

        if n < max_attempts {
            trace!(lock = %path.display(), attempt = n, "lock busy; backing off");
            thread::sleep(policy.interval);
        }
    }

    Err(LockError::RetriesExhausted {
        path: path.to_path_buf(),
        attempts: max_attempts,
    })
}

/// Scope guard around a held [`LockToken`].
///
/// Dropping the guard releases the lock. Use [`LockGuard::release`] to
/// observe release errors instead of only logging them.
#[derive(Debug)]
pub struct LockGuard<'a> {
    manager: &'a dyn LockManager,
    token: Option<LockToken>,
}

impl<'a> LockGuard<'a> {
    pub fn acquire(manager: &'a dyn LockManager, identifier: &str) -> Result<Self, LockError> {
        let token = manager.acquire(identifier)?;
        Ok(Self {
            manager,
            token: Some(token),
        })
    }

    pub fn token(&self) -> Option<&LockToken> {
        self.token.as_ref()
    }

    pub fn release(mut self) -> Result<(), LockError> {
        match self.token.take() {
            Some(token) => self.manager.release(&token),
            None => Ok(()),
        }
    }
}

impl Drop for LockGuard<'_> {
    fn drop(&mut self) {
        if let Some(token) = self.token.take() {
            if let Err(err) = self.manager.release(&token) {
                warn!(
                    task = %token.identifier(),
                    error = %err,
                    "failed to release lock while unwinding"
                );
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::cell::Cell;

    #[test]
    fn retries_until_attempt_succeeds() {
        let policy = RetryPolicy::new(Duration::from_millis(1), 5);
        let calls = Cell::new(0);
        let res = acquire_with_retries(&policy, Path::new("x.lock"), || {
            calls.set(calls.get() + 1);
            Ok(calls.get() == 3)
        });
        assert!(res.is_ok());
        assert_eq!(calls.get(), 3);
    }

    #[test]
    fn exhausted_retries_report_attempts_and_path() {
        let policy = RetryPolicy::new(Duration::from_millis(1), 4);
        let calls = Cell::new(0);
        let err = acquire_with_retries(&policy, Path::new("busy.lock"), || {
            calls.set(calls.get() + 1);
            Ok(false)
        })
        .unwrap_err();

        assert_eq!(calls.get(), 4);
        assert!(err.is_contention());
        let msg = err.to_string();
        assert!(msg.contains("surpassed retries"), "{msg}");
        assert!(msg.contains("busy.lock"), "{msg}");
    }

    #[test]
    fn io_errors_are_not_retried() {
        let policy = RetryPolicy::new(Duration::from_millis(1), 10);
        let calls = Cell::new(0);
        let err = acquire_with_retries(&policy, Path::new("x.lock"), || {
            calls.set(calls.get() + 1);
            Err(LockError::io(
                "x.lock",
                io::Error::new(io::ErrorKind::PermissionDenied, "denied"),
            ))
        })
        .unwrap_err();

        assert_eq!(calls.get(), 1);
        assert!(!err.is_contention());
    }

    #[test]
    fn zero_attempts_still_tries_once() {
        let policy = RetryPolicy::new(Duration::from_millis(1), 0);
        assert_eq!(policy.max_attempts, 1);
        assert_eq!(policy.budget(), Duration::ZERO);
    }

    #[test]
    fn default_budget_stays_under_two_seconds() {
        assert!(RetryPolicy::default().budget() < Duration::from_secs(2));
    }
}
