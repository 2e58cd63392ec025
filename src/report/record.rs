// src/report/record.rs

use std::time::Duration;

use chrono::{DateTime, Local};

use crate::invoke::Failure;
use crate::types::RunMode;

use super::host::HostInfo;
use super::sink::{Level, LogLine};

/// `Oct 19 14:03:22`, syslog style.
pub const TIMESTAMP_FORMAT: &str = "%b %d %H:%M:%S";

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RunOutcome {
    Success,
    Failed(Failure),
}

impl RunOutcome {
    pub fn is_success(&self) -> bool {
        matches!(self, RunOutcome::Success)
    }
}

/// Immutable description of one finished run.
#[derive(Debug, Clone)]
pub struct RunRecord {
    pub timestamp: DateTime<Local>,
    pub host: HostInfo,
    pub identifier: String,
    pub mode: RunMode,
    pub elapsed: Duration,
    pub stdout: String,
    pub stderr: String,
    pub outcome: RunOutcome,
}

impl RunRecord {
    /// Bare messages, in output order. `verbose` adds the captured streams.
    pub fn messages(&self, verbose: bool) -> Vec<(Level, String)> {
        let id = single_line(&self.identifier);
        let mut out = vec![(Level::Info, format!("Running {} '{}'", self.mode, id))];

        if verbose {
            push_stream(&mut out, "Standard output", &self.stdout);
            push_stream(&mut out, "Standard error", &self.stderr);
        }

        match &self.outcome {
            RunOutcome::Success => {
                out.push((Level::Info, format!("Job '{id}' completed successfully")));
            }
            RunOutcome::Failed(failure) => {
                out.push((Level::Error, format!("Job '{id}' failed")));
                out.push((
                    Level::Error,
                    format!("Exception message: {}", single_line(&failure.message)),
                ));
                out.push((Level::Error, "Backtrace:".to_string()));
                for frame in &failure.backtrace {
                    out.push((Level::Error, format!("    {}", single_line(frame))));
                }
            }
        }

        out.push((
            Level::Info,
            format!("{:.3} seconds elapsed", self.elapsed.as_secs_f64()),
        ));
        out
    }

    /// `<timestamp> <host> <user>[<pid>]:`
    pub fn prefix(&self) -> String {
        format!(
            "{} {} {}[{}]:",
            self.timestamp.format(TIMESTAMP_FORMAT),
            self.host.hostname,
            self.host.user,
            self.host.pid
        )
    }

    pub fn render(&self, verbose: bool) -> Vec<LogLine> {
        let prefix = self.prefix();
        self.messages(verbose)
            .into_iter()
            .map(|(level, message)| LogLine {
                rendered: format!("{prefix} {level} {message}"),
                level,
                message,
            })
            .collect()
    }
}

fn push_stream(out: &mut Vec<(Level, String)>, label: &str, text: &str) {
    if text.is_empty() {
        out.push((Level::Debug, format!("{label}: (empty)")));
        return;
    }
    out.push((Level::Debug, format!("{label}:")));
    for line in text.lines() {
        out.push((Level::Debug, format!("    {line}")));
    }
}

fn single_line(text: &str) -> String {
    text.replace('\r', "\\r").replace('\n', "\\n")
}
