// src/report/mod.rs

//! Run log: one structured record per run.
//!
//! - [`record`] defines [`RunRecord`] and its line rendering.
//! - [`sink`] holds the destinations (file, memory, `tracing`).
//! - [`host`] resolves hostname, user and pid.

use std::sync::Arc;

use anyhow::Result;

pub mod host;
pub mod record;
pub mod sink;

pub use host::HostInfo;
pub use record::{RunOutcome, RunRecord, TIMESTAMP_FORMAT};
pub use sink::{FileSink, Level, LogLine, LogSink, MemorySink, RUN_TARGET, TracingSink};

/// Writes run records to an optional sink.
#[derive(Debug, Clone, Default)]
pub struct RunLogger {
    sink: Option<Arc<dyn LogSink>>,
}

impl RunLogger {
    pub fn new(sink: Option<Arc<dyn LogSink>>) -> Self {
        Self { sink }
    }

    /// Write `record`; a no-op without a sink.
    pub fn log(&self, record: &RunRecord, verbose: bool) -> Result<()> {
        let Some(sink) = &self.sink else {
            return Ok(());
        };
        sink.write_record(&record.render(verbose))
    }
}
