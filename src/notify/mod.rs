// src/notify/mod.rs

//! Failure notification by mail.
//!
//! The [`Notifier`] composes one message per failing run and hands it to a
//! [`MailTransport`]. Delivery is fire-and-forget: a transport error is
//! logged and otherwise ignored, so a broken mail setup never turns a task
//! failure into a crash.

use std::fmt::Debug;
use std::sync::Arc;

use anyhow::Result;
use tracing::{info, warn};

use crate::invoke::Failure;
use crate::report::HostInfo;

pub mod mailbox;
pub mod sendmail;

pub use mailbox::MemoryMailbox;
pub use sendmail::SendmailTransport;

/// Marker every failure subject carries, for mail filters.
pub const SUBJECT_MARKER: &str = "CRON JOB ERROR";

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MailMessage {
    pub from: Option<String>,
    pub to: Vec<String>,
    pub subject: String,
    pub body: String,
}

impl MailMessage {
    /// Headers plus body, as accepted by `sendmail -t`.
    pub fn to_rfc5322(&self) -> String {
        let mut out = String::new();
        if let Some(from) = &self.from {
            out.push_str(&format!("From: {from}\n"));
        }
        out.push_str(&format!("To: {}\n", self.to.join(", ")));
        out.push_str(&format!("Subject: {}\n", self.subject));
        out.push_str("Content-Type: text/plain; charset=utf-8\n");
        out.push('\n');
        out.push_str(&self.body);
        if !self.body.ends_with('\n') {
            out.push('\n');
        }
        out
    }
}

/// Hands composed messages to a delivery mechanism.
pub trait MailTransport: Send + Sync + Debug {
    fn send(&self, message: &MailMessage) -> Result<()>;
}

/// Build the failure message for `identifier`.
pub fn compose(
    recipients: &[String],
    from: Option<&str>,
    identifier: &str,
    failure: &Failure,
    host: &HostInfo,
) -> MailMessage {
    let mut body = String::new();
    body.push_str(&format!("Job: {identifier}\n"));
    body.push_str(&format!("Host: {}\n", host.hostname));
    body.push_str(&format!("User: {}\n", host.user));
    body.push_str(&format!("Pid: {}\n", host.pid));
    body.push('\n');
    body.push_str(&format!("Exception message: {}\n", failure.message));
    body.push('\n');
    body.push_str("Backtrace:\n");
    for frame in &failure.backtrace {
        body.push_str(&format!("    {frame}\n"));
    }

    MailMessage {
        from: from.map(str::to_string),
        to: recipients.to_vec(),
        subject: format!(
            "[{SUBJECT_MARKER}] {} on {}",
            subject_safe(identifier),
            host.hostname
        ),
        body,
    }
}

/// Headers must stay on one line.
fn subject_safe(text: &str) -> String {
    text.replace(['\r', '\n'], " ")
}

/// Sends failure mail to configured recipients.
#[derive(Debug, Clone, Default)]
pub struct Notifier {
    transport: Option<Arc<dyn MailTransport>>,
    from: Option<String>,
}

impl Notifier {
    pub fn new(transport: Option<Arc<dyn MailTransport>>) -> Self {
        Self {
            transport,
            from: None,
        }
    }

    pub fn with_from(mut self, from: Option<String>) -> Self {
        self.from = from;
        self
    }

    /// Notify `recipients` about a failed run.
    ///
    /// Returns `true` when a message was handed to the transport.
    pub fn notify(
        &self,
        recipients: &[String],
        identifier: &str,
        failure: &Failure,
        host: &HostInfo,
    ) -> bool {
        if recipients.is_empty() {
            return false;
        }
        let Some(transport) = &self.transport else {
            warn!(task = %identifier, "recipients configured but no mail transport; skipping notification");
            return false;
        };

        let message = compose(recipients, self.from.as_deref(), identifier, failure, host);
        match transport.send(&message) {
            Ok(()) => {
                info!(task = %identifier, to = ?recipients, "failure notification sent");
                true
            }
            Err(err) => {
                warn!(task = %identifier, error = %err, "failed to send failure notification");
                false
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::invoke::FailureKind;

    fn failure() -> Failure {
        Failure {
            kind: FailureKind::TaskFailed,
            message: "undefined local variable `krash`".to_string(),
            backtrace: vec!["undefined local variable `krash`".to_string()],
        }
    }

    fn host() -> HostInfo {
        HostInfo {
            hostname: "web01".to_string(),
            user: "deploy".to_string(),
            pid: 7,
        }
    }

    #[test]
    fn compose_marks_subject_and_names_task() {
        let to = vec!["ops@example.com".to_string()];
        let msg = compose(&to, Some("cron@web01"), "cron_mail_test", &failure(), &host());

        assert_eq!(msg.subject, "[CRON JOB ERROR] cron_mail_test on web01");
        assert_eq!(msg.to, to);
        assert!(msg.body.contains("Job: cron_mail_test"));
        assert!(msg.body.contains("krash"));

        let wire = msg.to_rfc5322();
        assert!(wire.starts_with("From: cron@web01\nTo: ops@example.com\n"));
        assert!(wire.contains("\n\nJob: cron_mail_test\n"));
    }

    #[test]
    fn no_recipients_means_no_mail() {
        let mailbox = MemoryMailbox::new();
        let notifier = Notifier::new(Some(Arc::new(mailbox.clone())));
        assert!(!notifier.notify(&[], "x", &failure(), &host()));
        assert!(mailbox.is_empty());
    }

    #[test]
    fn transport_errors_are_absorbed() {
        let mailbox = MemoryMailbox::failing();
        let notifier = Notifier::new(Some(Arc::new(mailbox.clone())));
        let sent = notifier.notify(&["a@b.c".to_string()], "x", &failure(), &host());
        assert!(!sent);
        assert!(mailbox.is_empty());
    }

    #[test]
    fn multi_line_identifiers_keep_subject_on_one_line() {
        let msg = compose(&[], None, "echo a\necho b", &failure(), &host());
        assert!(!msg.subject.contains('\n'));
    }
}
