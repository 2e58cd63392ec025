// src/job.rs

//! The `Job` orchestrator.
//!
//! One call to [`Job::run`] walks through
//! `Idle -> Locking -> Running -> Logging -> (Notifying) -> Released -> Done`:
//!
//! 1. take the lock named after the identifier,
//! 2. invoke the task with captured output,
//! 3. write exactly one run record,
//! 4. mail the recipients if the run failed,
//! 5. release the lock.
//!
//! Lock contention and task failures end as `Ok(false)`. Only
//! infrastructure errors (unusable lock directory, unwritable log) are
//! returned as `Err`.

use std::sync::Arc;
use std::time::{Duration, Instant};

use chrono::Local;
use tracing::{error, info, warn};

use crate::errors::{CronError, Result};
use crate::invoke::{Failure, Invoker, Registry, ScriptEvaluator, ShellEvaluator, TaskRegistry};
use crate::lock::{FileLockManager, LockGuard, LockManager};
use crate::notify::{MailTransport, Notifier, SendmailTransport};
use crate::report::{HostInfo, LogSink, RunLogger, RunOutcome, RunRecord};
use crate::types::{Phase, RunMode};

/// Per-job settings, fixed at construction.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct JobSettings {
    /// Failure mail recipients; empty disables notification.
    pub recipients: Vec<String>,
    /// Log captured stdout/stderr with each record.
    pub debug: bool,
}

impl JobSettings {
    pub fn with_mailto(mut self, address: impl Into<String>) -> Self {
        self.recipients.push(address.into());
        self
    }

    pub fn with_debug(mut self, debug: bool) -> Self {
        self.debug = debug;
        self
    }
}

/// Transient state of the latest run.
#[derive(Debug, Clone, Default)]
struct RunState {
    identifier: Option<String>,
    mode: RunMode,
    phase: Phase,
    stdout: String,
    stderr: String,
    invoked: bool,
    failure: Option<Failure>,
    elapsed: Duration,
    notified: bool,
}

/// Guarded execution of named tasks and scripts.
///
/// A `Job` can be reused; each [`run`](Job::run) resets the previous run's
/// state first.
pub struct Job {
    invoker: Invoker,
    locks: Arc<dyn LockManager>,
    logger: RunLogger,
    notifier: Notifier,
    settings: JobSettings,
    host: HostInfo,
    state: RunState,
}

impl Job {
    pub fn builder() -> JobBuilder {
        JobBuilder::default()
    }

    /// Job over `registry` with default collaborators and no run log.
    pub fn new(registry: impl TaskRegistry + 'static) -> Self {
        Self::builder().registry(registry).build()
    }

    /// Run `identifier` under its lock.
    ///
    /// Returns `Ok(true)` on success, `Ok(false)` when the task failed or the
    /// lock stayed busy.
    pub fn run(&mut self, identifier: &str, mode: RunMode) -> Result<bool> {
        self.state = RunState {
            identifier: Some(identifier.to_string()),
            mode,
            ..RunState::default()
        };
        let started = Instant::now();
        info!(task = %identifier, %mode, "job run starting");

        self.state.phase = Phase::Locking;
        let guard = match LockGuard::acquire(self.locks.as_ref(), identifier) {
            Ok(guard) => Some(guard),
            Err(err) if err.is_contention() => {
                warn!(task = %identifier, error = %err, "lock busy; giving up on this run");
                self.state.failure = Some(Failure::from_lock(identifier, mode, &err));
                None
            }
            Err(err) => return Err(err.into()),
        };

        if guard.is_some() {
            self.state.phase = Phase::Running;
            let invocation = self.invoker.invoke(identifier, mode);
            self.state.stdout = invocation.stdout;
            self.state.stderr = invocation.stderr;
            self.state.invoked = invocation.invoked;
            self.state.failure = invocation.outcome.err();
        }
        self.state.elapsed = started.elapsed();

        self.state.phase = Phase::Logging;
        let record = self.record(identifier, mode);
        // A broken log must not also suppress the failure mail.
        let logged = self.logger.log(&record, self.settings.debug);
        if let Err(err) = &logged {
            error!(task = %identifier, error = ?err, "writing run record failed");
        }

        if let Some(failure) = &self.state.failure {
            self.state.phase = Phase::Notifying;
            self.state.notified =
                self.notifier
                    .notify(&self.settings.recipients, identifier, failure, &self.host);
        }

        let released = match guard {
            Some(guard) => guard.release(),
            None => Ok(()),
        };
        self.state.phase = Phase::Released;

        logged.map_err(CronError::Sink)?;
        released?;

        let success = self.state.failure.is_none();
        info!(
            task = %identifier,
            %mode,
            success,
            elapsed_ms = self.state.elapsed.as_millis() as u64,
            "job run finished"
        );
        self.state.phase = Phase::Done;
        Ok(success)
    }

    fn record(&self, identifier: &str, mode: RunMode) -> RunRecord {
        RunRecord {
            timestamp: Local::now(),
            host: self.host.clone(),
            identifier: identifier.to_string(),
            mode,
            elapsed: self.state.elapsed,
            stdout: self.state.stdout.clone(),
            stderr: self.state.stderr.clone(),
            outcome: match &self.state.failure {
                None => RunOutcome::Success,
                Some(failure) => RunOutcome::Failed(failure.clone()),
            },
        }
    }

    /// `true` once the latest run's task returned successfully.
    pub fn invoked(&self) -> bool {
        self.state.invoked
    }

    pub fn stdout(&self) -> &str {
        &self.state.stdout
    }

    pub fn stderr(&self) -> &str {
        &self.state.stderr
    }

    /// Backtrace of the latest failed run, `None` after a success.
    pub fn backtrace(&self) -> Option<&[String]> {
        self.state.failure.as_ref().map(|f| f.backtrace.as_slice())
    }

    pub fn failure(&self) -> Option<&Failure> {
        self.state.failure.as_ref()
    }

    pub fn elapsed(&self) -> Duration {
        self.state.elapsed
    }

    pub fn identifier(&self) -> Option<&str> {
        self.state.identifier.as_deref()
    }

    pub fn mode(&self) -> RunMode {
        self.state.mode
    }

    pub fn phase(&self) -> Phase {
        self.state.phase
    }

    /// Whether the latest run handed a failure mail to the transport.
    pub fn notified(&self) -> bool {
        self.state.notified
    }

    pub fn settings(&self) -> &JobSettings {
        &self.settings
    }

    pub fn host(&self) -> &HostInfo {
        &self.host
    }
}

/// Assembles a [`Job`] from its collaborators.
///
/// Unset collaborators default to an empty [`Registry`], the
/// [`ShellEvaluator`], a [`FileLockManager`] in the default lock directory,
/// no run log, and [`SendmailTransport`].
#[derive(Default)]
pub struct JobBuilder {
    registry: Option<Arc<dyn TaskRegistry>>,
    evaluator: Option<Arc<dyn ScriptEvaluator>>,
    locks: Option<Arc<dyn LockManager>>,
    sink: Option<Arc<dyn LogSink>>,
    transport: Option<Arc<dyn MailTransport>>,
    mail_from: Option<String>,
    settings: JobSettings,
}

impl JobBuilder {
    pub fn registry(self, registry: impl TaskRegistry + 'static) -> Self {
        self.shared_registry(Arc::new(registry))
    }

    pub fn shared_registry(mut self, registry: Arc<dyn TaskRegistry>) -> Self {
        self.registry = Some(registry);
        self
    }

    pub fn evaluator(mut self, evaluator: impl ScriptEvaluator + 'static) -> Self {
        self.evaluator = Some(Arc::new(evaluator));
        self
    }

    pub fn locks(self, locks: impl LockManager + 'static) -> Self {
        self.shared_locks(Arc::new(locks))
    }

    pub fn shared_locks(mut self, locks: Arc<dyn LockManager>) -> Self {
        self.locks = Some(locks);
        self
    }

    pub fn sink(self, sink: impl LogSink + 'static) -> Self {
        self.shared_sink(Arc::new(sink))
    }

    pub fn shared_sink(mut self, sink: Arc<dyn LogSink>) -> Self {
        self.sink = Some(sink);
        self
    }

    pub fn transport(mut self, transport: impl MailTransport + 'static) -> Self {
        self.transport = Some(Arc::new(transport));
        self
    }

    pub fn mail_from(mut self, from: Option<String>) -> Self {
        self.mail_from = from;
        self
    }

    pub fn settings(mut self, settings: JobSettings) -> Self {
        self.settings = settings;
        self
    }

    pub fn build(self) -> Job {
        let registry = self
            .registry
            .unwrap_or_else(|| Arc::new(Registry::new()));
        let evaluator = self.evaluator.unwrap_or_else(|| Arc::new(ShellEvaluator));
        let locks = self
            .locks
            .unwrap_or_else(|| Arc::new(FileLockManager::new(FileLockManager::default_dir())));
        let transport = self
            .transport
            .unwrap_or_else(|| Arc::new(SendmailTransport::default()));

        Job {
            invoker: Invoker::new(registry, evaluator),
            locks,
            logger: RunLogger::new(self.sink),
            notifier: Notifier::new(Some(transport)).with_from(self.mail_from),
            settings: self.settings,
            host: HostInfo::detect(),
            state: RunState::default(),
        }
    }
}
