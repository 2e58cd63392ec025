// src/invoke/mod.rs

//! Task resolution and execution.
//!
//! The invoker never lets a task failure escape: errors, panics and unknown
//! task names all come back as a [`Failure`] inside an [`Invocation`].
//!
//! Output is captured by writer injection. Every task receives a [`TaskIo`]
//! whose `stdout`/`stderr` handles write into per-invocation buffers, so two
//! jobs running on different threads never see each other's output.
//!
//! - [`registry`] holds named tasks (closures or configured shell commands).
//! - [`shell`] runs commands through the platform shell and backs both the
//!   configured tasks and the default [`ScriptEvaluator`].

use std::any::Any;
use std::backtrace::BacktraceStatus;
use std::io::Write;
use std::panic::{self, AssertUnwindSafe};
use std::sync::Arc;

use tracing::{debug, warn};

use crate::lock::LockError;
use crate::types::RunMode;

pub mod registry;
pub mod shell;

pub use registry::{Registry, TaskRegistry};
pub use shell::{ShellEvaluator, ShellTask};

/// Output handles handed to a running task.
pub struct TaskIo<'a> {
    pub stdout: &'a mut dyn Write,
    pub stderr: &'a mut dyn Write,
}

impl<'a> TaskIo<'a> {
    pub fn new(stdout: &'a mut dyn Write, stderr: &'a mut dyn Write) -> Self {
        Self { stdout, stderr }
    }
}

/// A unit of work that can be run by name.
pub trait Task: Send + Sync {
    fn run(&self, io: &mut TaskIo<'_>) -> anyhow::Result<()>;
}

impl<F> Task for F
where
    F: Fn(&mut TaskIo<'_>) -> anyhow::Result<()> + Send + Sync,
{
    fn run(&self, io: &mut TaskIo<'_>) -> anyhow::Result<()> {
        self(io)
    }
}

/// Executes ad-hoc source text in script mode.
pub trait ScriptEvaluator: Send + Sync {
    fn evaluate(&self, source: &str, io: &mut TaskIo<'_>) -> anyhow::Result<()>;
}

impl<F> ScriptEvaluator for F
where
    F: Fn(&str, &mut TaskIo<'_>) -> anyhow::Result<()> + Send + Sync,
{
    fn evaluate(&self, source: &str, io: &mut TaskIo<'_>) -> anyhow::Result<()> {
        self(source, io)
    }
}

/// Why a run did not complete.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FailureKind {
    /// The lock stayed busy for the whole retry budget.
    LockContention,
    /// The identifier is not in the registry.
    TaskNotFound,
    /// The task returned an error.
    TaskFailed,
    /// The task panicked.
    TaskPanicked,
}

/// Message plus backtrace of a failed run.
///
/// The backtrace is the error's context chain (outermost first), followed
/// by captured stack frames when `RUST_BACKTRACE` enabled them, and finally
/// the layer that observed the failure.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Failure {
    pub kind: FailureKind,
    pub message: String,
    pub backtrace: Vec<String>,
}

impl Failure {
    pub fn not_found(identifier: &str) -> Self {
        let message = format!("task not found: '{identifier}'");
        Self {
            kind: FailureKind::TaskNotFound,
            backtrace: vec![
                message.clone(),
                format!("in task registry: lookup of '{identifier}'"),
            ],
            message,
        }
    }

    pub fn from_error(identifier: &str, mode: RunMode, err: &anyhow::Error) -> Self {
        let mut backtrace: Vec<String> = err.chain().map(|cause| cause.to_string()).collect();

        let captured = err.backtrace();
        if captured.status() == BacktraceStatus::Captured {
            backtrace.extend(
                captured
                    .to_string()
                    .lines()
                    .map(|frame| frame.trim().to_string())
                    .filter(|frame| !frame.is_empty()),
            );
        }

        backtrace.push(format!("in {mode} '{identifier}'"));

        Self {
            kind: FailureKind::TaskFailed,
            message: err.to_string(),
            backtrace,
        }
    }

    pub fn from_panic(identifier: &str, mode: RunMode, payload: &(dyn Any + Send)) -> Self {
        let detail = payload
            .downcast_ref::<&str>()
            .map(|s| s.to_string())
            .or_else(|| payload.downcast_ref::<String>().cloned())
            .unwrap_or_else(|| "non-string panic payload".to_string());
        let message = format!("task panicked: {detail}");

        Self {
            kind: FailureKind::TaskPanicked,
            backtrace: vec![message.clone(), format!("in {mode} '{identifier}'")],
            message,
        }
    }

    pub fn from_lock(identifier: &str, mode: RunMode, err: &LockError) -> Self {
        let message = err.to_string();
        Self {
            kind: FailureKind::LockContention,
            backtrace: vec![
                message.clone(),
                format!("in lock manager: acquiring {}", err.path().display()),
                format!("in job: {mode} '{identifier}'"),
            ],
            message,
        }
    }
}

/// Everything the invoker learned about one execution.
#[derive(Debug, Clone)]
pub struct Invocation {
    pub stdout: String,
    pub stderr: String,
    /// `true` only when the task call returned successfully.
    pub invoked: bool,
    pub outcome: Result<(), Failure>,
}

/// Resolves identifiers and runs them with captured output.
#[derive(Clone)]
pub struct Invoker {
    registry: Arc<dyn TaskRegistry>,
    evaluator: Arc<dyn ScriptEvaluator>,
}

impl Invoker {
    pub fn new(registry: Arc<dyn TaskRegistry>, evaluator: Arc<dyn ScriptEvaluator>) -> Self {
        Self {
            registry,
            evaluator,
        }
    }

    pub fn invoke(&self, identifier: &str, mode: RunMode) -> Invocation {
        let mut stdout = Vec::new();
        let mut stderr = Vec::new();

        let outcome = {
            let mut io = TaskIo::new(&mut stdout, &mut stderr);
            self.dispatch(identifier, mode, &mut io)
        };

        match &outcome {
            Ok(()) => debug!(task = %identifier, %mode, "task returned normally"),
            Err(failure) => warn!(
                task = %identifier,
                %mode,
                kind = ?failure.kind,
                error = %failure.message,
                "task failed"
            ),
        }

        Invocation {
            stdout: String::from_utf8_lossy(&stdout).into_owned(),
            stderr: String::from_utf8_lossy(&stderr).into_owned(),
            invoked: outcome.is_ok(),
            outcome,
        }
    }

    fn dispatch(
        &self,
        identifier: &str,
        mode: RunMode,
        io: &mut TaskIo<'_>,
    ) -> Result<(), Failure> {
        let result = match mode {
            RunMode::Task => {
                let Some(task) = self.registry.lookup(identifier) else {
                    return Err(Failure::not_found(identifier));
                };
                panic::catch_unwind(AssertUnwindSafe(|| task.run(io)))
            }
            RunMode::Script => {
                panic::catch_unwind(AssertUnwindSafe(|| self.evaluator.evaluate(identifier, io)))
            }
        };

        match result {
            Ok(Ok(())) => Ok(()),
            Ok(Err(err)) => Err(Failure::from_error(identifier, mode, &err)),
            Err(payload) => Err(Failure::from_panic(identifier, mode, payload.as_ref())),
        }
    }
}
