// src/notify/sendmail.rs

use std::io::Write;
use std::path::PathBuf;
use std::process::{Command, Stdio};

use anyhow::{Context, Result, bail};
use tracing::debug;

use super::{MailMessage, MailTransport};

/// Delivers through the local MTA via `sendmail -t -i`.
#[derive(Debug, Clone)]
pub struct SendmailTransport {
    program: PathBuf,
}

impl SendmailTransport {
    pub fn new(program: impl Into<PathBuf>) -> Self {
        Self {
            program: program.into(),
        }
    }
}

impl Default for SendmailTransport {
    fn default() -> Self {
        Self::new("/usr/sbin/sendmail")
    }
}

impl MailTransport for SendmailTransport {
    fn send(&self, message: &MailMessage) -> Result<()> {
        let mut child = Command::new(&self.program)
            .arg("-t")
            .arg("-i")
            .stdin(Stdio::piped())
            .stdout(Stdio::null())
            .stderr(Stdio::piped())
            .spawn()
            .with_context(|| format!("spawning {:?}", self.program))?;

        {
            let stdin = child
                .stdin
                .as_mut()
                .context("sendmail stdin was not captured")?;
            stdin
                .write_all(message.to_rfc5322().as_bytes())
                .context("writing message to sendmail")?;
        }

        let output = child
            .wait_with_output()
            .with_context(|| format!("waiting for {:?}", self.program))?;
        if !output.status.success() {
            bail!(
                "{:?} exited with {}: {}",
                self.program,
                output.status,
                String::from_utf8_lossy(&output.stderr).trim()
            );
        }

        debug!(program = ?self.program, to = ?message.to, "message handed to sendmail");
        Ok(())
    }
}
