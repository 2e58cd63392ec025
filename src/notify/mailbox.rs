// src/notify/mailbox.rs

use std::sync::{Arc, Mutex, PoisonError};

use anyhow::{Result, bail};

use super::{MailMessage, MailTransport};

/// Transport that records messages instead of delivering them.
///
/// Clones share the delivery list, so a test can keep one handle and give
/// another to the job.
#[derive(Debug, Clone, Default)]
pub struct MemoryMailbox {
    deliveries: Arc<Mutex<Vec<MailMessage>>>,
    fail: bool,
}

impl MemoryMailbox {
    pub fn new() -> Self {
        Self::default()
    }

    /// A mailbox whose `send` always errors.
    pub fn failing() -> Self {
        Self {
            fail: true,
            ..Self::default()
        }
    }

    pub fn deliveries(&self) -> Vec<MailMessage> {
        self.deliveries
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .clone()
    }

    pub fn len(&self) -> usize {
        self.deliveries
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

impl MailTransport for MemoryMailbox {
    fn send(&self, message: &MailMessage) -> Result<()> {
        if self.fail {
            bail!("mailbox rejected message to {:?}", message.to);
        }
        self.deliveries
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .push(message.clone());
        Ok(())
    }
}
