//! In-process notifier that records deliveries instead of sending them.
//!
//! Used by the worker's dry-run mode and by tests across the workspace.

use std::sync::{Arc, Mutex};
use std::time::Duration;

use crate::traits::{Channel, Destination, Notification, Notifier, NotifyError};

#[derive(Debug, Clone)]
pub struct MemoryNotifier {
    channel: Channel,
    sent: Arc<Mutex<Vec<(Destination, Notification)>>>,
    should_fail: bool,
    delay: Option<Duration>,
}

impl MemoryNotifier {
    pub fn new(channel: Channel) -> Self {
        Self {
            channel,
            sent: Arc::new(Mutex::new(Vec::new())),
            should_fail: false,
            delay: None,
        }
    }

    /// A notifier whose every send fails.
    pub fn failing(channel: Channel) -> Self {
        Self {
            should_fail: true,
            ..Self::new(channel)
        }
    }

    pub fn with_delay(mut self, delay: Duration) -> Self {
        self.delay = Some(delay);
        self
    }

    /// Everything delivered so far, oldest first.
    pub fn sent(&self) -> Vec<(Destination, Notification)> {
        self.sent.lock().unwrap_or_else(|e| e.into_inner()).clone()
    }
}

#[async_trait::async_trait]
impl Notifier for MemoryNotifier {
    async fn send(&self, to: &Destination, notification: &Notification) -> Result<(), NotifyError> {
        if let Some(delay) = self.delay {
            tokio::time::sleep(delay).await;
        }
        if self.should_fail {
            return Err(NotifyError::Config(format!(
                "{} channel rejected delivery",
                self.channel
            )));
        }
        tracing::info!(
            channel = self.channel.as_str(),
            to = to.address(),
            subject = %notification.subject,
            "recorded notification"
        );
        self.sent
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .push((to.clone(), notification.clone()));
        Ok(())
    }

    fn channel(&self) -> Channel {
        self.channel
    }
}
