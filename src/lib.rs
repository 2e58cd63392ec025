// src/lib.rs

pub mod cli;
pub mod config;
pub mod errors;
pub mod invoke;
pub mod job;
pub mod lock;
pub mod logging;
pub mod notify;
pub mod report;
pub mod types;

use std::path::Path;
use std::sync::Arc;

use tracing::debug;

use crate::cli::CliArgs;
use crate::config::load_or_default;
use crate::config::model::ConfigFile;
use crate::errors::{CronError, Result};
use crate::invoke::Registry;
use crate::lock::{FileLockManager, LockManager};
use crate::notify::SendmailTransport;
use crate::report::{FileSink, LogSink, TracingSink};

pub use crate::job::{Job, JobBuilder, JobSettings};
pub use crate::types::RunMode;

/// High-level entry point used by `main.rs`.
///
/// Loads config, applies CLI overrides, and runs the requested task once.
/// Returns whether the run succeeded.
pub fn run(args: CliArgs) -> Result<bool> {
    let mut cfg = load_or_default(args.config.as_deref())?;
    if args.debug {
        cfg.config.debug = true;
    }
    if let Some(path) = args.log_file.clone() {
        cfg.config.log_file = Some(path);
    }

    let mode = if args.script {
        RunMode::Script
    } else {
        RunMode::Task
    };

    if args.dry_run {
        print_dry_run(&cfg, &args.task, mode);
        return Ok(true);
    }

    let mut job = job_from_config(&cfg)?;
    job.run(&args.task, mode)
}

/// Wire a [`Job`] from a validated config.
///
/// - tasks: one shell command per `[task.<name>]`
/// - locks: [`FileLockManager`] in `lock_dir` with the configured retries
/// - run log: `log_file` if set, otherwise `tracing`
/// - mail: `sendmail` to `mailto`
pub fn job_from_config(cfg: &ConfigFile) -> Result<Job> {
    let locks = lock_manager(cfg);

    let sink: Arc<dyn LogSink> = match &cfg.config.log_file {
        Some(path) => Arc::new(FileSink::open(path).map_err(CronError::Sink)?),
        None => Arc::new(TracingSink),
    };

    Ok(Job::builder()
        .registry(Registry::from_config(cfg))
        .locks(locks)
        .shared_sink(sink)
        .transport(SendmailTransport::new(cfg.config.sendmail.clone()))
        .mail_from(cfg.config.mail_from.clone())
        .settings(cfg.job_settings())
        .build())
}

fn lock_manager(cfg: &ConfigFile) -> FileLockManager {
    FileLockManager::new(cfg.lock_dir())
        .with_policy(cfg.retry_policy())
        .with_stale_after(cfg.stale_after())
}

/// Simple dry-run output: print resolved settings and what would run.
fn print_dry_run(cfg: &ConfigFile, identifier: &str, mode: RunMode) {
    let locks = lock_manager(cfg);
    let policy = cfg.retry_policy();

    println!("cronguard dry-run");
    println!("  {mode}: {identifier}");
    if mode == RunMode::Task {
        match cfg.task.get(identifier) {
            Some(task) => println!("  cmd: {}", task.cmd),
            None => println!("  cmd: <not configured>"),
        }
    }
    println!("  lock: {}", locks.lock_path(identifier).display());
    println!(
        "  retries: {} x {}ms",
        policy.max_attempts,
        policy.interval.as_millis()
    );
    match cfg.config.stale_after_secs {
        Some(secs) => println!("  stale_after: {secs}s"),
        None => println!("  stale_after: never"),
    }
    println!(
        "  log: {}",
        cfg.config
            .log_file
            .as_deref()
            .map(Path::display)
            .map(|p| p.to_string())
            .unwrap_or_else(|| "<tracing>".to_string())
    );
    let recipients = cfg.config.recipients();
    if recipients.is_empty() {
        println!("  mailto: <none>");
    } else {
        println!("  mailto: {}", recipients.join(", "));
    }
    println!("  debug: {}", cfg.config.debug);

    debug!("dry-run complete (no execution)");
}
