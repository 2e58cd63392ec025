// src/config/validate.rs

use std::sync::OnceLock;

use regex::Regex;

use crate::config::model::{ConfigFile, RawConfigFile};
use crate::errors::{CronError, Result};

impl TryFrom<RawConfigFile> for ConfigFile {
    type Error = CronError;

    fn try_from(raw: RawConfigFile) -> std::result::Result<Self, Self::Error> {
        validate_raw_config(&raw)?;
        Ok(ConfigFile::new_unchecked(raw.config, raw.task))
    }
}

fn validate_raw_config(cfg: &RawConfigFile) -> Result<()> {
    validate_retry_settings(cfg)?;
    validate_recipients(cfg)?;
    validate_tasks(cfg)?;
    Ok(())
}

fn validate_retry_settings(cfg: &RawConfigFile) -> Result<()> {
    if cfg.config.max_attempts == 0 {
        return Err(CronError::ConfigError(
            "[config].max_attempts must be >= 1 (got 0)".to_string(),
        ));
    }
    if cfg.config.retry_interval_ms == 0 {
        return Err(CronError::ConfigError(
            "[config].retry_interval_ms must be >= 1 (got 0)".to_string(),
        ));
    }
    Ok(())
}

fn address_pattern() -> &'static Regex {
    static PATTERN: OnceLock<Regex> = OnceLock::new();
    PATTERN.get_or_init(|| {
        Regex::new(r"^[^@\s<>]+@[^@\s<>]+$").expect("address pattern is a valid regex")
    })
}

fn validate_recipients(cfg: &RawConfigFile) -> Result<()> {
    for address in cfg.config.recipients() {
        if !address_pattern().is_match(&address) {
            return Err(CronError::ConfigError(format!(
                "[config].mailto contains an invalid address '{address}'"
            )));
        }
    }
    Ok(())
}

fn validate_tasks(cfg: &RawConfigFile) -> Result<()> {
    for (name, task) in cfg.task.iter() {
        if name.trim().is_empty() {
            return Err(CronError::ConfigError(
                "task names must not be empty".to_string(),
            ));
        }
        if task.cmd.trim().is_empty() {
            return Err(CronError::ConfigError(format!(
                "task '{name}' has an empty `cmd`"
            )));
        }
    }
    Ok(())
}
