//! Routes notifications to the channels a delivery asks for.
//!
//! Every delivery is attempted on its own and bounded by the dispatcher's
//! timeout. A failure or timeout on one channel never stops the others.

use std::collections::HashMap;
use std::time::{Duration, Instant};

use crate::traits::{Channel, Delivery, DispatchResult, Notification, Notifier, NotifyError};

/// Dispatches notifications, one registered notifier per channel.
pub struct Dispatcher {
    channels: HashMap<Channel, Box<dyn Notifier>>,
    timeout: Duration,
}

impl Dispatcher {
    /// Create an empty dispatcher whose sends are bounded by `timeout`.
    pub fn new(timeout: Duration) -> Self {
        Self {
            channels: HashMap::new(),
            timeout,
        }
    }

    /// Register a notifier, replacing any existing one for its channel.
    pub fn register(&mut self, notifier: Box<dyn Notifier>) {
        self.channels.insert(notifier.channel(), notifier);
    }

    pub fn with_notifier(mut self, notifier: Box<dyn Notifier>) -> Self {
        self.register(notifier);
        self
    }

    pub fn timeout(&self) -> Duration {
        self.timeout
    }

    /// Dispatch a notification to every delivery.
    ///
    /// Returns one result per delivery, in order.
    pub async fn dispatch(
        &self,
        deliveries: &[Delivery],
        notification: &Notification,
    ) -> Vec<DispatchResult> {
        if deliveries.is_empty() {
            tracing::debug!("No deliveries requested");
            return Vec::new();
        }

        let mut results = Vec::with_capacity(deliveries.len());
        for delivery in deliveries {
            results.push(self.deliver(delivery, notification).await);
        }
        results
    }

    async fn deliver(&self, delivery: &Delivery, notification: &Notification) -> DispatchResult {
        let start = Instant::now();
        let result = match self.channels.get(&delivery.channel) {
            Some(notifier) => {
                match tokio::time::timeout(self.timeout, notifier.send(&delivery.destination, notification)).await {
                    Ok(sent) => sent,
                    Err(_) => Err(NotifyError::Timeout(self.timeout.as_millis() as u64)),
                }
            }
            None => Err(NotifyError::Config(format!(
                "no notifier registered for channel '{}'",
                delivery.channel
            ))),
        };
        let duration_ms = start.elapsed().as_millis() as u64;

        let (success, error) = match result {
            Ok(()) => {
                tracing::info!(
                    channel = delivery.channel.as_str(),
                    duration_ms,
                    "Notification delivered"
                );
                (true, None)
            }
            Err(e) => {
                tracing::warn!(
                    channel = delivery.channel.as_str(),
                    error = %e,
                    duration_ms,
                    "Notification delivery failed"
                );
                (false, Some(e.to_string()))
            }
        };

        DispatchResult {
            channel: delivery.channel,
            destination: delivery.destination.address().to_string(),
            success,
            error,
            duration_ms,
        }
    }
}
