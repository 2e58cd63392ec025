#![allow(dead_code)]

use std::fs;
use std::io::Write;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::thread;
use std::time::Duration;

use cronguard::invoke::Registry;
use cronguard::lock::FileLockManager;
use cronguard::notify::MemoryMailbox;
use cronguard::report::{FileSink, LogSink};
use cronguard::{Job, JobBuilder, JobSettings};
use tempfile::TempDir;

/// Task that does nothing.
pub const NOOP_TASK: &str = "cron_test";
/// Task writing `out` to stdout and `err` to stderr.
pub const STDS_TASK: &str = "cron_stds_test";
/// Task sleeping for [`SLEEP_TASK_DURATION`].
pub const SLEEP_TASK: &str = "cron_sleep_test";
/// Task failing with an error mentioning `krash`.
pub const FAILING_TASK: &str = "cron_mail_test";

pub const SLEEP_TASK_DURATION: Duration = Duration::from_secs(2);

/// Registry with the fixture tasks above.
pub fn fixture_registry() -> Registry {
    let mut registry = Registry::new();
    registry
        .register_fn(NOOP_TASK, |_io| Ok(()))
        .register_fn(STDS_TASK, |io| {
            writeln!(io.stdout, "out")?;
            writeln!(io.stderr, "err")?;
            Ok(())
        })
        .register_fn(SLEEP_TASK, |_io| {
            thread::sleep(SLEEP_TASK_DURATION);
            Ok(())
        })
        .register_fn(FAILING_TASK, |_io| {
            anyhow::bail!("undefined local variable or method `krash`")
        });
    registry
}

/// Isolated lock dir + log file + mailbox for one test.
///
/// Everything lives under a temp dir removed when the env is dropped.
pub struct TestEnv {
    dir: TempDir,
    pub registry: Arc<Registry>,
    pub locks: Arc<FileLockManager>,
    pub sink: Arc<FileSink>,
    pub mailbox: MemoryMailbox,
}

impl TestEnv {
    pub fn new() -> Self {
        let dir = TempDir::new().expect("creating temp dir");
        let locks = FileLockManager::new(dir.path().join("locks"));
        let sink = FileSink::open(dir.path().join("log").join("cron.log"))
            .expect("opening log file");

        Self {
            dir,
            registry: Arc::new(fixture_registry()),
            locks: Arc::new(locks),
            sink: Arc::new(sink),
            mailbox: MemoryMailbox::new(),
        }
    }

    pub fn root(&self) -> &Path {
        self.dir.path()
    }

    pub fn lock_dir(&self) -> PathBuf {
        self.locks.dir().to_path_buf()
    }

    pub fn log_path(&self) -> &Path {
        self.sink.path()
    }

    pub fn log_contents(&self) -> String {
        fs::read_to_string(self.log_path()).unwrap_or_default()
    }

    /// Builder wired to this env's registry, locks, log and mailbox.
    pub fn builder(&self, settings: JobSettings) -> JobBuilder {
        let sink: Arc<dyn LogSink> = self.sink.clone();
        Job::builder()
            .shared_registry(self.registry.clone())
            .shared_locks(self.locks.clone())
            .shared_sink(sink)
            .transport(self.mailbox.clone())
            .settings(settings)
    }

    pub fn job(&self, settings: JobSettings) -> Job {
        self.builder(settings).build()
    }

    /// Same as [`job`](Self::job) but without a run log.
    pub fn job_without_log(&self, settings: JobSettings) -> Job {
        Job::builder()
            .shared_registry(self.registry.clone())
            .shared_locks(self.locks.clone())
            .transport(self.mailbox.clone())
            .settings(settings)
            .build()
    }
}

impl Default for TestEnv {
    fn default() -> Self {
        Self::new()
    }
}
