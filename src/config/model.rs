// src/config/model.rs

use std::collections::BTreeMap;
use std::path::PathBuf;
use std::time::Duration;

use serde::Deserialize;

use crate::job::JobSettings;
use crate::lock::{DEFAULT_MAX_ATTEMPTS, DEFAULT_RETRY_INTERVAL, FileLockManager, RetryPolicy};

/// Top-level configuration as read from a TOML file.
///
/// ```toml
/// [config]
/// mailto = "ops@example.com"
/// debug = false
/// lock_dir = "/var/lock/cronguard"
/// log_file = "log/cron.log"
///
/// [task.backup]
/// cmd = "pg_dump app > /backups/app.sql"
/// ```
///
/// Every section is optional.
#[derive(Debug, Clone, Deserialize, Default)]
pub struct RawConfigFile {
    #[serde(default)]
    pub config: ConfigSection,

    /// Named tasks from `[task.<name>]`.
    #[serde(default)]
    pub task: BTreeMap<String, TaskConfig>,
}

/// Validated configuration. Build it with `ConfigFile::try_from(raw)`.
#[derive(Debug, Clone, Default)]
pub struct ConfigFile {
    pub config: ConfigSection,
    pub task: BTreeMap<String, TaskConfig>,
}

impl ConfigFile {
    pub(crate) fn new_unchecked(config: ConfigSection, task: BTreeMap<String, TaskConfig>) -> Self {
        Self { config, task }
    }

    /// Settings handed to every [`Job`](crate::job::Job) built from this file.
    pub fn job_settings(&self) -> JobSettings {
        JobSettings {
            recipients: self.config.recipients(),
            debug: self.config.debug,
        }
    }

    pub fn retry_policy(&self) -> RetryPolicy {
        RetryPolicy::new(
            Duration::from_millis(self.config.retry_interval_ms),
            self.config.max_attempts,
        )
    }

    pub fn lock_dir(&self) -> PathBuf {
        self.config
            .lock_dir
            .clone()
            .unwrap_or_else(FileLockManager::default_dir)
    }

    pub fn stale_after(&self) -> Option<Duration> {
        self.config.stale_after_secs.map(Duration::from_secs)
    }
}

/// `mailto` accepts a single address, a comma separated list, or an array.
#[derive(Debug, Clone, Deserialize, PartialEq, Eq)]
#[serde(untagged)]
pub enum Mailto {
    One(String),
    Many(Vec<String>),
}

impl Mailto {
    pub fn addresses(&self) -> Vec<String> {
        let raw: Vec<&str> = match self {
            Mailto::One(s) => s.split(',').collect(),
            Mailto::Many(v) => v.iter().flat_map(|s| s.split(',')).collect(),
        };
        raw.into_iter()
            .map(str::trim)
            .filter(|s| !s.is_empty())
            .map(str::to_string)
            .collect()
    }
}

/// `[config]` section.
#[derive(Debug, Clone, Deserialize)]
pub struct ConfigSection {
    /// Failure notification recipients. Unset or empty disables mail.
    #[serde(default)]
    pub mailto: Option<Mailto>,

    /// Include captured stdout/stderr in the run log.
    #[serde(default)]
    pub debug: bool,

    /// Directory holding lock files. Defaults to `$TMPDIR/cronguard`.
    #[serde(default)]
    pub lock_dir: Option<PathBuf>,

    /// Run log destination. Without it, run records go to `tracing`.
    #[serde(default)]
    pub log_file: Option<PathBuf>,

    #[serde(default = "default_retry_interval_ms")]
    pub retry_interval_ms: u64,

    #[serde(default = "default_max_attempts")]
    pub max_attempts: u32,

    /// Age after which an existing lock file is considered abandoned.
    #[serde(default)]
    pub stale_after_secs: Option<u64>,

    #[serde(default)]
    pub mail_from: Option<String>,

    #[serde(default = "default_sendmail")]
    pub sendmail: PathBuf,
}

impl ConfigSection {
    pub fn recipients(&self) -> Vec<String> {
        self.mailto.as_ref().map(Mailto::addresses).unwrap_or_default()
    }
}

fn default_retry_interval_ms() -> u64 {
    DEFAULT_RETRY_INTERVAL.as_millis() as u64
}

fn default_max_attempts() -> u32 {
    DEFAULT_MAX_ATTEMPTS
}

fn default_sendmail() -> PathBuf {
    PathBuf::from("/usr/sbin/sendmail")
}

impl Default for ConfigSection {
    fn default() -> Self {
        Self {
            mailto: None,
            debug: false,
            lock_dir: None,
            log_file: None,
            retry_interval_ms: default_retry_interval_ms(),
            max_attempts: default_max_attempts(),
            stale_after_secs: None,
            mail_from: None,
            sendmail: default_sendmail(),
        }
    }
}

/// `[task.<name>]` section.
#[derive(Debug, Clone, Deserialize)]
pub struct TaskConfig {
    /// Shell command to execute.
    pub cmd: String,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn mailto_forms_normalise_to_address_list() {
        let one = Mailto::One("a@x.org, b@x.org ,".to_string());
        assert_eq!(one.addresses(), vec!["a@x.org", "b@x.org"]);

        let many = Mailto::Many(vec!["a@x.org".into(), " ".into(), "c@x.org".into()]);
        assert_eq!(many.addresses(), vec!["a@x.org", "c@x.org"]);
    }

    #[test]
    fn defaults_match_lock_defaults() {
        let cfg = ConfigFile::default();
        assert_eq!(cfg.retry_policy(), RetryPolicy::default());
        assert!(cfg.job_settings().recipients.is_empty());
        assert!(!cfg.job_settings().debug);
        assert_eq!(cfg.lock_dir(), FileLockManager::default_dir());
    }
}
