// src/lock/file.rs

//! Cross-process lock built on exclusive file creation.

use std::fs::{self, OpenOptions};
use std::io::{self, Write};
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::{Duration, SystemTime};

use tracing::{debug, warn};

use super::sanitize::lock_file_name;
use super::{LockError, LockManager, LockToken, RetryPolicy, acquire_with_retries};

/// A reclaim marker older than this is assumed abandoned by a crashed
/// reclaimer.
const MARKER_ABANDONED_AFTER: Duration = Duration::from_secs(10);

static NEXT_STAMP: AtomicU64 = AtomicU64::new(0);

/// Lock manager storing one file per held identifier under `dir`.
///
/// Creation uses `create_new`, which the filesystem guarantees to succeed
/// for exactly one concurrent creator. The file holds an owner stamp
/// (`<pid> <seq>`) so release only ever removes its own lock.
#[derive(Debug, Clone)]
pub struct FileLockManager {
    dir: PathBuf,
    policy: RetryPolicy,
    stale_after: Option<Duration>,
}

impl FileLockManager {
    pub fn new(dir: impl Into<PathBuf>) -> Self {
        Self {
            dir: dir.into(),
            policy: RetryPolicy::default(),
            stale_after: None,
        }
    }

    pub fn with_policy(mut self, policy: RetryPolicy) -> Self {
        self.policy = policy;
        self
    }

    /// Reclaim lock files older than `age` whose recorded pid is no longer
    /// running.
    pub fn with_stale_after(mut self, age: Option<Duration>) -> Self {
        self.stale_after = age;
        self
    }

    /// `$TMPDIR/cronguard`.
    pub fn default_dir() -> PathBuf {
        std::env::temp_dir().join("cronguard")
    }

    pub fn dir(&self) -> &Path {
        &self.dir
    }

    pub fn policy(&self) -> &RetryPolicy {
        &self.policy
    }

    /// One attempt. `Ok(Some(stamp))` when the lock file was created.
    fn try_create(&self, path: &Path) -> Result<Option<String>, LockError> {
        // Second pass only happens after a stale lock was reclaimed.
        for _ in 0..2 {
            match OpenOptions::new().write(true).create_new(true).open(path) {
                Ok(mut file) => {
                    let stamp = owner_stamp();
                    if let Err(err) = writeln!(file, "{stamp}") {
                        let _ = fs::remove_file(path);
                        return Err(LockError::io(path, err));
                    }
                    return Ok(Some(stamp));
                }
                Err(err) if err.kind() == io::ErrorKind::AlreadyExists => {
                    if !self.reclaim_stale(path)? {
                        return Ok(None);
                    }
                }
                Err(err) => return Err(LockError::io(path, err)),
            }
        }
        Ok(None)
    }

    /// Remove `path` when it is stale. Returns `true` when the caller should
    /// try creating the lock again right away.
    ///
    /// Reclaimers serialise on a `<lock>.reclaim` marker so that a lock
    /// judged stale by one contender cannot be re-taken by a second
    /// contender and then removed by the first.
    fn reclaim_stale(&self, path: &Path) -> Result<bool, LockError> {
        let Some(max_age) = self.stale_after else {
            return Ok(false);
        };

        let marker = reclaim_marker(path);
        match OpenOptions::new().write(true).create_new(true).open(&marker) {
            Ok(_) => {}
            Err(err) if err.kind() == io::ErrorKind::AlreadyExists => {
                clear_abandoned_marker(&marker);
                return Ok(false);
            }
            Err(err) => return Err(LockError::io(&marker, err)),
        }

        let outcome = remove_if_stale(path, max_age);
        if let Err(err) = fs::remove_file(&marker) {
            if err.kind() != io::ErrorKind::NotFound {
                warn!(marker = %marker.display(), error = %err, "failed to remove reclaim marker");
            }
        }
        outcome
    }
}

impl LockManager for FileLockManager {
    fn lock_path(&self, identifier: &str) -> PathBuf {
        self.dir.join(lock_file_name(identifier))
    }

    fn acquire(&self, identifier: &str) -> Result<LockToken, LockError> {
        fs::create_dir_all(&self.dir).map_err(|err| LockError::io(&self.dir, err))?;

        let path = self.lock_path(identifier);
        let mut owner = String::new();
        acquire_with_retries(&self.policy, &path, || {
            Ok(match self.try_create(&path)? {
                Some(stamp) => {
                    owner = stamp;
                    true
                }
                None => false,
            })
        })?;

        debug!(task = %identifier, lock = %path.display(), owner = %owner, "lock acquired");
        Ok(LockToken::new(identifier, path).with_owner(owner))
    }

    fn release(&self, token: &LockToken) -> Result<(), LockError> {
        let contents = match fs::read_to_string(token.path()) {
            Ok(contents) => contents,
            Err(err) if err.kind() == io::ErrorKind::NotFound => {
                warn!(
                    task = %token.identifier(),
                    lock = %token.path().display(),
                    "lock file already gone at release"
                );
                return Ok(());
            }
            Err(err) => return Err(LockError::io(token.path(), err)),
        };

        if !token.owner().is_empty() && contents.trim() != token.owner() {
            warn!(
                task = %token.identifier(),
                lock = %token.path().display(),
                holder = %contents.trim(),
                "lock file belongs to another holder; leaving it in place"
            );
            return Ok(());
        }

        match fs::remove_file(token.path()) {
            Ok(()) => {
                debug!(task = %token.identifier(), lock = %token.path().display(), "lock released");
                Ok(())
            }
            Err(err) if err.kind() == io::ErrorKind::NotFound => Ok(()),
            Err(err) => Err(LockError::io(token.path(), err)),
        }
    }
}

fn owner_stamp() -> String {
    format!(
        "{} {}",
        std::process::id(),
        NEXT_STAMP.fetch_add(1, Ordering::Relaxed)
    )
}

/// Pid recorded in a lock file, if the contents carry one.
fn owner_pid(contents: &str) -> Option<u32> {
    contents.split_whitespace().next()?.parse().ok()
}

fn reclaim_marker(path: &Path) -> PathBuf {
    let mut name = path.as_os_str().to_os_string();
    name.push(".reclaim");
    PathBuf::from(name)
}

fn clear_abandoned_marker(marker: &Path) {
    let abandoned = fs::metadata(marker)
        .and_then(|m| m.modified())
        .ok()
        .and_then(|modified| SystemTime::now().duration_since(modified).ok())
        .is_some_and(|age| age >= MARKER_ABANDONED_AFTER);
    if abandoned {
        warn!(marker = %marker.display(), "removing abandoned reclaim marker");
        let _ = fs::remove_file(marker);
    }
}

/// Caller holds the reclaim marker for `path`.
fn remove_if_stale(path: &Path, max_age: Duration) -> Result<bool, LockError> {
    let modified = match fs::metadata(path).and_then(|m| m.modified()) {
        Ok(modified) => modified,
        // Released between our create attempt and now.
        Err(err) if err.kind() == io::ErrorKind::NotFound => return Ok(true),
        Err(err) => return Err(LockError::io(path, err)),
    };

    let age = SystemTime::now()
        .duration_since(modified)
        .unwrap_or(Duration::ZERO);
    if age < max_age {
        return Ok(false);
    }

    let owner = match fs::read_to_string(path) {
        Ok(owner) => owner,
        Err(err) if err.kind() == io::ErrorKind::NotFound => return Ok(true),
        Err(err) => return Err(LockError::io(path, err)),
    };
    if let Some(pid) = owner_pid(&owner) {
        if is_pid_alive(pid) {
            debug!(
                lock = %path.display(),
                pid,
                age_secs = age.as_secs(),
                "lock is old but its holder is still running"
            );
            return Ok(false);
        }
    }

    warn!(
        lock = %path.display(),
        owner = %owner.trim(),
        age_secs = age.as_secs(),
        "reclaiming stale lock file"
    );
    match fs::remove_file(path) {
        Ok(()) => Ok(true),
        Err(err) if err.kind() == io::ErrorKind::NotFound => Ok(true),
        Err(err) => Err(LockError::io(path, err)),
    }
}

/// `kill(pid, 0)` checks for existence without delivering a signal.
#[cfg(unix)]
fn is_pid_alive(pid: u32) -> bool {
    let Ok(pid) = libc::pid_t::try_from(pid) else {
        return false;
    };
    if pid <= 0 {
        return false;
    }
    // SAFETY: signal 0 performs only the existence and permission checks.
    let result = unsafe { libc::kill(pid, 0) };
    if result == 0 {
        return true;
    }
    // EPERM: the process exists under another user.
    io::Error::last_os_error().raw_os_error() == Some(libc::EPERM)
}

/// Without a liveness check every recorded holder counts as running.
#[cfg(not(unix))]
fn is_pid_alive(_pid: u32) -> bool {
    true
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    fn fast_manager(dir: &Path) -> FileLockManager {
        FileLockManager::new(dir).with_policy(RetryPolicy::new(Duration::from_millis(5), 3))
    }

    #[test]
    fn acquire_creates_and_release_removes_lock_file() {
        let tmp = TempDir::new().unwrap();
        let locks = fast_manager(tmp.path());

        let token = locks.acquire("nightly backup").unwrap();
        assert_eq!(token.path(), tmp.path().join("nightly%20backup.lock"));
        assert!(token.path().exists());
        let contents = fs::read_to_string(token.path()).unwrap();
        assert_eq!(contents.trim(), token.owner());
        assert_eq!(owner_pid(&contents), Some(std::process::id()));

        locks.release(&token).unwrap();
        assert!(!token.path().exists());
    }

    #[test]
    fn second_acquire_fails_while_held() {
        let tmp = TempDir::new().unwrap();
        let locks = fast_manager(tmp.path());

        let held = locks.acquire("report").unwrap();
        let err = locks.acquire("report").unwrap_err();
        assert!(err.is_contention());
        assert_eq!(err.path(), held.path());

        locks.release(&held).unwrap();
        let again = locks.acquire("report").unwrap();
        locks.release(&again).unwrap();
    }

    #[test]
    fn different_identifiers_do_not_contend() {
        let tmp = TempDir::new().unwrap();
        let locks = fast_manager(tmp.path());

        let a = locks.acquire("a").unwrap();
        let b = locks.acquire("b").unwrap();
        locks.release(&a).unwrap();
        locks.release(&b).unwrap();
    }

    #[test]
    fn missing_lock_dir_is_created() {
        let tmp = TempDir::new().unwrap();
        let dir = tmp.path().join("nested").join("locks");
        let locks = fast_manager(&dir);

        let token = locks.acquire("x").unwrap();
        assert!(dir.is_dir());
        locks.release(&token).unwrap();
    }

    #[test]
    fn unusable_lock_dir_is_an_io_error() {
        let tmp = TempDir::new().unwrap();
        let not_a_dir = tmp.path().join("plain-file");
        fs::write(&not_a_dir, b"occupied").unwrap();

        let err = fast_manager(&not_a_dir).acquire("x").unwrap_err();
        assert!(!err.is_contention(), "{err}");
    }

    #[test]
    fn unreadable_owner_past_stale_age_is_reclaimed() {
        let tmp = TempDir::new().unwrap();
        let locks = fast_manager(tmp.path()).with_stale_after(Some(Duration::ZERO));

        fs::write(locks.lock_path("orphan"), b"garbage\n").unwrap();
        let token = locks.acquire("orphan").unwrap();
        locks.release(&token).unwrap();
        assert!(!locks.lock_path("orphan").exists());
    }

    #[cfg(unix)]
    #[test]
    fn lock_of_exited_process_is_reclaimed() {
        let tmp = TempDir::new().unwrap();
        let locks = fast_manager(tmp.path()).with_stale_after(Some(Duration::ZERO));

        let mut child = std::process::Command::new("true").spawn().unwrap();
        let dead_pid = child.id();
        child.wait().unwrap();
        assert!(!is_pid_alive(dead_pid));

        fs::write(locks.lock_path("orphan"), format!("{dead_pid} 0\n")).unwrap();
        let token = locks.acquire("orphan").unwrap();
        assert_eq!(owner_pid(token.owner()), Some(std::process::id()));
        locks.release(&token).unwrap();
    }

    #[test]
    fn old_lock_of_running_holder_is_not_reclaimed() {
        let tmp = TempDir::new().unwrap();
        let first = fast_manager(tmp.path()).with_stale_after(Some(Duration::ZERO));
        let second = FileLockManager::new(tmp.path())
            .with_policy(RetryPolicy::new(Duration::from_millis(20), 5))
            .with_stale_after(Some(Duration::ZERO));

        let held = first.acquire("nightly").unwrap();
        let err = second.acquire("nightly").unwrap_err();
        assert!(err.is_contention(), "{err}");
        assert_eq!(
            fs::read_to_string(held.path()).unwrap().trim(),
            held.owner()
        );

        first.release(&held).unwrap();
        assert!(!held.path().exists());
    }

    #[test]
    fn release_leaves_a_lock_now_owned_by_someone_else() {
        let tmp = TempDir::new().unwrap();
        let locks = fast_manager(tmp.path());

        let token = locks.acquire("nightly").unwrap();
        fs::write(token.path(), b"1 424242\n").unwrap();

        locks.release(&token).unwrap();
        assert!(token.path().exists());
    }

    #[test]
    fn concurrent_reclaimers_never_share_the_lock() {
        use std::sync::atomic::AtomicUsize;
        use std::sync::{Arc, Barrier};
        use std::thread;

        const CONTENDERS: usize = 8;

        let tmp = TempDir::new().unwrap();
        let dir = tmp.path().to_path_buf();
        fs::write(dir.join(lock_file_name("orphan")), b"garbage\n").unwrap();

        let barrier = Arc::new(Barrier::new(CONTENDERS));
        let active = Arc::new(AtomicUsize::new(0));
        let overlaps = Arc::new(AtomicUsize::new(0));

        let handles: Vec<_> = (0..CONTENDERS)
            .map(|_| {
                let dir = dir.clone();
                let barrier = Arc::clone(&barrier);
                let active = Arc::clone(&active);
                let overlaps = Arc::clone(&overlaps);
                thread::spawn(move || {
                    let locks = FileLockManager::new(dir)
                        .with_policy(RetryPolicy::new(Duration::from_millis(5), 400))
                        .with_stale_after(Some(Duration::ZERO));
                    barrier.wait();

                    let token = locks.acquire("orphan").unwrap();
                    if active.fetch_add(1, Ordering::SeqCst) != 0 {
                        overlaps.fetch_add(1, Ordering::SeqCst);
                    }
                    thread::sleep(Duration::from_millis(10));
                    active.fetch_sub(1, Ordering::SeqCst);
                    locks.release(&token).unwrap();
                })
            })
            .collect();

        for handle in handles {
            handle.join().unwrap();
        }
        assert_eq!(overlaps.load(Ordering::SeqCst), 0);
        assert!(!dir.join(lock_file_name("orphan")).exists());
    }

    #[test]
    fn fresh_lock_is_not_reclaimed() {
        let tmp = TempDir::new().unwrap();
        let locks =
            fast_manager(tmp.path()).with_stale_after(Some(Duration::from_secs(3600)));

        fs::write(locks.lock_path("busy"), b"1\n").unwrap();
        assert!(locks.acquire("busy").unwrap_err().is_contention());
    }

    #[test]
    fn releasing_a_vanished_lock_is_not_an_error() {
        let tmp = TempDir::new().unwrap();
        let locks = fast_manager(tmp.path());

        let token = locks.acquire("gone").unwrap();
        fs::remove_file(token.path()).unwrap();
        locks.release(&token).unwrap();
    }
}
