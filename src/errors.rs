// src/errors.rs

//! Crate-wide error type and result alias.
//!
//! Only infrastructure problems travel through [`CronError`] to the caller of
//! [`Job::run`](crate::job::Job::run). Task failures and lock contention are
//! absorbed by the job and surface as a `false` return plus a logged record.

use thiserror::Error;

use crate::lock::LockError;

#[derive(Error, Debug)]
pub enum CronError {
    #[error("Configuration error: {0}")]
    ConfigError(String),

    #[error("IO error: {0}")]
    IoError(#[from] std::io::Error),

    #[error("Lock error: {0}")]
    Lock(#[from] LockError),

    #[error("Log sink error: {0:#}")]
    Sink(anyhow::Error),

    #[error("TOML parsing error: {0}")]
    TomlError(#[from] toml::de::Error),

    #[error(transparent)]
    Other(#[from] anyhow::Error),
}

impl CronError {
    /// Exit code used by the `cronguard` binary for infrastructure failures.
    pub fn exit_code(&self) -> i32 {
        match self {
            CronError::ConfigError(_) | CronError::TomlError(_) => 78,
            _ => 2,
        }
    }
}

pub use anyhow::Error;
pub type Result<T> = std::result::Result<T, CronError>;
