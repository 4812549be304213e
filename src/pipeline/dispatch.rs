//! Sequential, paced delivery of a domain's messages.

use std::sync::Arc;
use std::time::Duration;

use serde::Serialize;

use super::batch::Message;
use crate::services::Notifier;

/// A message that could not be delivered.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct FailedMessage {
    pub index: usize,
    pub error: String,
}

/// Outcome of sending one domain's messages.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct DispatchReport {
    pub sent: usize,
    pub failed: Vec<FailedMessage>,
}

impl DispatchReport {
    pub fn is_complete(&self) -> bool {
        self.failed.is_empty()
    }
}

/// Sends messages one at a time with a fixed pause between sends.
#[derive(Clone)]
pub struct Dispatcher {
    notifier: Arc<dyn Notifier>,
    delay: Duration,
}

impl Dispatcher {
    pub fn new(notifier: Arc<dyn Notifier>, delay: Duration) -> Self {
        Self { notifier, delay }
    }

    /// Send every message in order. A failed message is logged and skipped;
    /// the remaining ones are still attempted.
    pub async fn dispatch(
        &self,
        domain: &str,
        destination: &str,
        messages: &[Message],
    ) -> DispatchReport {
        let mut report = DispatchReport::default();

        for (i, message) in messages.iter().enumerate() {
            if i > 0 && !self.delay.is_zero() {
                tokio::time::sleep(self.delay).await;
            }

            match self.notifier.send(destination, &message.text).await {
                Ok(()) => {
                    report.sent += 1;
                    log::debug!(
                        "[{}] Sent message {}/{} ({} chars)",
                        domain,
                        i + 1,
                        messages.len(),
                        message.len()
                    );
                }
                Err(e) => {
                    log::warn!(
                        "[{}] Failed to send message {}/{}: {}",
                        domain,
                        i + 1,
                        messages.len(),
                        e
                    );
                    report.failed.push(FailedMessage {
                        index: message.index,
                        error: e.to_string(),
                    });
                }
            }
        }

        report
    }
}
