// src/logging.rs

//! Diagnostics for `cronguard`, written to stderr through
//! `tracing-subscriber`. Cron mails anything a job prints, so stdout is left
//! alone.
//!
//! The filter comes from `--log-level`, else from `CRONGUARD_LOG` (any
//! `EnvFilter` directive string such as `warn,cronguard::lock=trace`), else
//! `info`. Run records forwarded by [`TracingSink`](crate::report::TracingSink)
//! stay visible at INFO whatever the diagnostics level is, unless the
//! directives name [`RUN_TARGET`] themselves.

use anyhow::{Result, anyhow};
use tracing_subscriber::{EnvFilter, fmt};

use crate::cli::LogLevel;
use crate::report::RUN_TARGET;

pub const LOG_ENV: &str = "CRONGUARD_LOG";

/// Install the global subscriber. Fails if one is already installed.
pub fn init_logging(cli_level: Option<LogLevel>) -> Result<()> {
    let env = std::env::var(LOG_ENV).ok();
    fmt()
        .with_env_filter(build_filter(cli_level, env.as_deref()))
        .with_target(true)
        .with_writer(std::io::stderr)
        .try_init()
        .map_err(|e| anyhow!("installing tracing subscriber: {e}"))
}

/// Filter used by [`init_logging`]. Unparsable env directives fall back to
/// `info`.
pub fn build_filter(cli_level: Option<LogLevel>, env: Option<&str>) -> EnvFilter {
    let directives = match (cli_level, env.map(str::trim)) {
        (Some(level), _) => level_directive(level).to_string(),
        (None, Some(env)) if !env.is_empty() => env.to_string(),
        _ => "info".to_string(),
    };

    let filter = EnvFilter::try_new(&directives).unwrap_or_else(|_| EnvFilter::new("info"));
    if directives.contains(RUN_TARGET) {
        return filter;
    }
    match format!("{RUN_TARGET}=info").parse() {
        Ok(directive) => filter.add_directive(directive),
        Err(_) => filter,
    }
}

fn level_directive(level: LogLevel) -> &'static str {
    match level {
        LogLevel::Error => "error",
        LogLevel::Warn => "warn",
        LogLevel::Info => "info",
        LogLevel::Debug => "debug",
        LogLevel::Trace => "trace",
    }
}
