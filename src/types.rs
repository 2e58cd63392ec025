use std::fmt;
use std::str::FromStr;

use serde::Deserialize;

/// How a job identifier is interpreted.
///
/// - `Task`: the identifier names a task in the [`TaskRegistry`].
/// - `Script`: the identifier *is* the source text, handed to the
///   [`ScriptEvaluator`].
///
/// [`TaskRegistry`]: crate::invoke::TaskRegistry
/// [`ScriptEvaluator`]: crate::invoke::ScriptEvaluator
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum RunMode {
    #[default]
    Task,
    Script,
}

impl RunMode {
    pub fn as_str(&self) -> &'static str {
        match self {
            RunMode::Task => "task",
            RunMode::Script => "script",
        }
    }
}

impl fmt::Display for RunMode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for RunMode {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_lowercase().as_str() {
            "task" => Ok(RunMode::Task),
            "script" => Ok(RunMode::Script),
            other => Err(format!(
                "invalid run mode: {other} (expected \"task\" or \"script\")"
            )),
        }
    }
}

/// Where a [`Job`](crate::job::Job) is in its per-run lifecycle.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum Phase {
    #[default]
    Idle,
    Locking,
    Running,
    Logging,
    Notifying,
    Released,
    Done,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn run_mode_parses_case_insensitively() {
        assert_eq!("Script".parse::<RunMode>(), Ok(RunMode::Script));
        assert_eq!(" task ".parse::<RunMode>(), Ok(RunMode::Task));
        assert!("rake".parse::<RunMode>().is_err());
    }
}
