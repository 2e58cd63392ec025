// src/report/sink.rs

//! Destinations for rendered run records.

use std::fmt::{self, Debug};
use std::fs::{self, File, OpenOptions};
use std::io::Write;
use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex, PoisonError};

use anyhow::{Context, Result};

/// Severity of a run log line.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
pub enum Level {
    Error,
    Info,
    Debug,
}

impl Level {
    pub fn as_str(&self) -> &'static str {
        match self {
            Level::Error => "ERROR",
            Level::Info => "INFO",
            Level::Debug => "DEBUG",
        }
    }
}

impl fmt::Display for Level {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// One rendered line of a run record.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LogLine {
    pub level: Level,
    /// Bare message, without the timestamp/host prefix.
    pub message: String,
    /// Full line as written to text sinks.
    pub rendered: String,
}

/// Append-capable destination for run records.
///
/// A record is handed over as a whole so implementations can write it
/// atomically with respect to other records.
pub trait LogSink: Send + Sync + Debug {
    fn write_record(&self, lines: &[LogLine]) -> Result<()>;
}

/// Appends rendered lines to a file.
#[derive(Debug)]
pub struct FileSink {
    path: PathBuf,
    file: Mutex<File>,
}

impl FileSink {
    /// Open `path` for appending, creating it and its parent dirs if needed.
    pub fn open(path: impl Into<PathBuf>) -> Result<Self> {
        let path = path.into();
        if let Some(parent) = path.parent() {
            if !parent.as_os_str().is_empty() {
                fs::create_dir_all(parent)
                    .with_context(|| format!("creating dir {:?}", parent))?;
            }
        }
        let file = OpenOptions::new()
            .create(true)
            .append(true)
            .open(&path)
            .with_context(|| format!("opening log file {:?}", path))?;
        Ok(Self {
            path,
            file: Mutex::new(file),
        })
    }

    pub fn path(&self) -> &Path {
        &self.path
    }
}

impl LogSink for FileSink {
    fn write_record(&self, lines: &[LogLine]) -> Result<()> {
        let mut buf = String::new();
        for line in lines {
            buf.push_str(&line.rendered);
            buf.push('\n');
        }

        let mut file = self.file.lock().unwrap_or_else(PoisonError::into_inner);
        file.write_all(buf.as_bytes())
            .with_context(|| format!("writing to log file {:?}", self.path))?;
        file.flush()
            .with_context(|| format!("flushing log file {:?}", self.path))?;
        Ok(())
    }
}

/// Keeps lines in memory. Clones share the buffer.
#[derive(Debug, Clone, Default)]
pub struct MemorySink {
    lines: Arc<Mutex<Vec<LogLine>>>,
}

impl MemorySink {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn lines(&self) -> Vec<LogLine> {
        self.lines.lock().unwrap_or_else(PoisonError::into_inner).clone()
    }

    /// All rendered lines joined with newlines, like a log file's content.
    pub fn contents(&self) -> String {
        self.lines()
            .iter()
            .map(|l| format!("{}\n", l.rendered))
            .collect()
    }
}

impl LogSink for MemorySink {
    fn write_record(&self, lines: &[LogLine]) -> Result<()> {
        self.lines
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .extend_from_slice(lines);
        Ok(())
    }
}

/// Forwards run records to the `tracing` subscriber under the
/// [`RUN_TARGET`] target.
///
/// Lines carry their full prefix so host, user and pid survive. Captured
/// output lines are only present in verbose records and are emitted at
/// INFO, so they are not lost to a diagnostics filter.
#[derive(Debug, Clone, Copy, Default)]
pub struct TracingSink;

/// `tracing` target of forwarded run records.
pub const RUN_TARGET: &str = "cronguard::run";

impl LogSink for TracingSink {
    fn write_record(&self, lines: &[LogLine]) -> Result<()> {
        for line in lines {
            match line.level {
                Level::Error => tracing::error!(target: RUN_TARGET, "{}", line.rendered),
                Level::Info | Level::Debug => {
                    tracing::info!(target: RUN_TARGET, "{}", line.rendered)
                }
            }
        }
        Ok(())
    }
}
