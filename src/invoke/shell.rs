// src/invoke/shell.rs

//! Shell-backed tasks and script evaluation.

use std::process::{Command, ExitStatus, Stdio};

use anyhow::{Context, Result, bail};
use tracing::{debug, info};

use super::{ScriptEvaluator, Task, TaskIo};

/// Lines of stderr quoted in the error of a failing command.
const STDERR_TAIL_LINES: usize = 5;

/// Run `command` through the platform shell, copying its output into `io`.
///
/// The child's output is written to `io` before the exit status is checked,
/// so partial output from a failing command is preserved.
pub fn run_shell(command: &str, io: &mut TaskIo<'_>) -> Result<()> {
    // Build a shell command appropriate for the platform.
    let mut cmd = if cfg!(windows) {
        let mut c = Command::new("cmd");
        c.arg("/C").arg(command);
        c
    } else {
        let mut c = Command::new("sh");
        c.arg("-c").arg(command);
        c
    };

    info!(cmd = %command, "starting shell command");

    let output = cmd
        .stdin(Stdio::null())
        .output()
        .with_context(|| format!("spawning shell for `{command}`"))?;

    io.stdout
        .write_all(&output.stdout)
        .context("forwarding command stdout")?;
    io.stderr
        .write_all(&output.stderr)
        .context("forwarding command stderr")?;

    debug!(
        cmd = %command,
        exit_code = output.status.code().unwrap_or(-1),
        stdout_bytes = output.stdout.len(),
        stderr_bytes = output.stderr.len(),
        "shell command exited"
    );

    if !output.status.success() {
        let stderr = String::from_utf8_lossy(&output.stderr);
        bail!(
            "command `{}` {}{}",
            command,
            describe_status(&output.status),
            stderr_tail(&stderr)
        );
    }

    Ok(())
}

fn describe_status(status: &ExitStatus) -> String {
    match status.code() {
        Some(code) => format!("exited with status {code}"),
        None => "was terminated by a signal".to_string(),
    }
}

fn stderr_tail(stderr: &str) -> String {
    let lines: Vec<&str> = stderr.lines().filter(|l| !l.trim().is_empty()).collect();
    if lines.is_empty() {
        return String::new();
    }
    let start = lines.len().saturating_sub(STDERR_TAIL_LINES);
    format!(": {}", lines[start..].join(" | "))
}

/// A configured `[task.<name>]` command.
#[derive(Debug, Clone)]
pub struct ShellTask {
    cmd: String,
}

impl ShellTask {
    pub fn new(cmd: impl Into<String>) -> Self {
        Self { cmd: cmd.into() }
    }

    pub fn cmd(&self) -> &str {
        &self.cmd
    }
}

impl Task for ShellTask {
    fn run(&self, io: &mut TaskIo<'_>) -> Result<()> {
        run_shell(&self.cmd, io)
    }
}

/// Script evaluator that treats the source text as a shell snippet.
#[derive(Debug, Clone, Copy, Default)]
pub struct ShellEvaluator;

impl ScriptEvaluator for ShellEvaluator {
    fn evaluate(&self, source: &str, io: &mut TaskIo<'_>) -> Result<()> {
        run_shell(source, io)
    }
}

#[cfg(all(test, unix))]
mod tests {
    use super::*;

    fn capture(command: &str) -> (Result<()>, String, String) {
        let mut out = Vec::new();
        let mut err = Vec::new();
        let res = run_shell(command, &mut TaskIo::new(&mut out, &mut err));
        (
            res,
            String::from_utf8(out).unwrap(),
            String::from_utf8(err).unwrap(),
        )
    }

    #[test]
    fn captures_stdout_and_stderr() {
        let (res, out, err) = capture("echo out; echo err 1>&2");
        res.unwrap();
        assert_eq!(out, "out\n");
        assert_eq!(err, "err\n");
    }

    #[test]
    fn non_zero_exit_is_an_error_with_stderr_tail() {
        let (res, out, _) = capture("echo partial; echo 'no such table' 1>&2; exit 3");
        let msg = res.unwrap_err().to_string();
        assert_eq!(out, "partial\n");
        assert!(msg.contains("exited with status 3"), "{msg}");
        assert!(msg.contains("no such table"), "{msg}");
    }

    #[test]
    fn evaluator_runs_snippets() {
        let mut out = Vec::new();
        let mut err = Vec::new();
        ShellEvaluator
            .evaluate("a=$((3 * 2)); echo $a", &mut TaskIo::new(&mut out, &mut err))
            .unwrap();
        assert_eq!(String::from_utf8(out).unwrap().trim(), "6");
    }

    #[test]
    fn stderr_tail_keeps_last_lines() {
        let text = (1..=8).map(|i| format!("line{i}\n")).collect::<String>();
        assert_eq!(stderr_tail(&text), ": line4 | line5 | line6 | line7 | line8");
        assert_eq!(stderr_tail("\n \n"), "");
    }
}
