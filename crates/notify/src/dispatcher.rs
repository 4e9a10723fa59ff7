//! Sends chat messages and remembers them for bulk retraction.
//!
//! The dispatcher is owned by the fetch task; the message log only lives
//! until the next daily reset.

use std::fmt;
use std::sync::Arc;

use crate::traits::{ChatChannel, MessageId, NotifyError};

/// A message the dispatcher has sent and may later retract.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct NotificationRecord {
    pub message_id: MessageId,
    pub pilot_id: String,
}

/// Every retraction that failed during one [`Dispatcher::retract_all`] call.
#[derive(Debug)]
pub struct RetractError {
    pub attempted: usize,
    pub failures: Vec<(MessageId, NotifyError)>,
}

impl fmt::Display for RetractError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{} of {} retractions failed: ",
            self.failures.len(),
            self.attempted
        )?;
        let joined = self
            .failures
            .iter()
            .map(|(id, e)| format!("message {id}: {e}"))
            .collect::<Vec<_>>()
            .join("; ");
        f.write_str(&joined)
    }
}

impl std::error::Error for RetractError {}

pub struct Dispatcher {
    channel: Arc<dyn ChatChannel>,
    sent: Vec<NotificationRecord>,
}

impl Dispatcher {
    pub fn new(channel: Arc<dyn ChatChannel>) -> Self {
        Self {
            channel,
            sent: Vec::new(),
        }
    }

    /// Send `text` on behalf of `pilot_id`; the message is recorded only on success.
    pub async fn send(&mut self, pilot_id: &str, text: &str) -> Result<MessageId, NotifyError> {
        let start = std::time::Instant::now();
        match self.channel.send_message(text).await {
            Ok(message_id) => {
                tracing::info!(
                    pilot_id,
                    channel = self.channel.channel_name(),
                    message_id,
                    duration_ms = start.elapsed().as_millis() as u64,
                    "Notification delivered"
                );
                self.sent.push(NotificationRecord {
                    message_id,
                    pilot_id: pilot_id.to_string(),
                });
                Ok(message_id)
            }
            Err(e) => {
                tracing::warn!(
                    pilot_id,
                    channel = self.channel.channel_name(),
                    error = %e,
                    "Notification delivery failed"
                );
                Err(e)
            }
        }
    }

    /// Delete every recorded message. The log is cleared even when some
    /// deletions fail; one failure does not stop the others.
    pub async fn retract_all(&mut self) -> Result<usize, RetractError> {
        let records = std::mem::take(&mut self.sent);
        let attempted = records.len();
        let mut failures = Vec::new();

        for record in records {
            if let Err(e) = self.channel.delete_message(record.message_id).await {
                tracing::warn!(
                    pilot_id = %record.pilot_id,
                    message_id = record.message_id,
                    error = %e,
                    "Notification retraction failed"
                );
                failures.push((record.message_id, e));
            }
        }

        tracing::info!(attempted, failed = failures.len(), "Notifications retracted");
        if failures.is_empty() {
            Ok(attempted)
        } else {
            Err(RetractError { attempted, failures })
        }
    }

    /// Messages sent since the last retraction.
    pub fn pending(&self) -> &[NotificationRecord] {
        &self.sent
    }
}
