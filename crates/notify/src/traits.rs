//! Notifier trait definition and shared error types.

use std::collections::HashMap;
use std::fmt;

use serde::{Deserialize, Serialize};

/// Errors that can occur during notification delivery.
#[derive(Debug, thiserror::Error)]
pub enum NotifyError {
    #[error("HTTP request failed: {0}")]
    Http(#[from] reqwest::Error),

    #[error("SMTP delivery failed: {0}")]
    Smtp(String),

    #[error("SMS gateway returned {status}: {body}")]
    Gateway { status: u16, body: String },

    #[error("Template rendering failed: {0}")]
    Template(String),

    #[error("Configuration error: {0}")]
    Config(String),

    #[error("Unusable destination: {0}")]
    Destination(String),

    #[error("Delivery timed out after {0}ms")]
    Timeout(u64),
}

/// Delivery channels a user can enable.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Channel {
    Email,
    Sms,
}

impl Channel {
    pub fn as_str(&self) -> &'static str {
        match self {
            Channel::Email => "email",
            Channel::Sms => "sms",
        }
    }
}

impl fmt::Display for Channel {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Where a single message goes.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize)]
#[serde(tag = "kind", content = "address", rename_all = "lowercase")]
pub enum Destination {
    Email(String),
    Phone(String),
}

impl Destination {
    pub fn address(&self) -> &str {
        match self {
            Destination::Email(a) | Destination::Phone(a) => a,
        }
    }
}

/// One requested send: a channel plus the address to use on it.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct Delivery {
    pub channel: Channel,
    pub destination: Destination,
}

/// A rendered notification ready for delivery.
#[derive(Debug, Clone, Serialize)]
pub struct Notification {
    pub subject: String,
    /// Plain-text message body.
    pub body: String,
    /// HTML rendition for email, when available.
    pub html: Option<String>,
    /// Absolute link appended to text channels.
    pub link: Option<String>,
    /// Additional metadata (rule id, user id, local date).
    pub metadata: HashMap<String, String>,
}

/// Trait for notification channel implementations.
#[async_trait::async_trait]
pub trait Notifier: Send + Sync {
    /// Deliver a notification to one destination through this channel.
    async fn send(&self, to: &Destination, notification: &Notification) -> Result<(), NotifyError>;

    fn channel(&self) -> Channel;
}

/// Result of dispatching a notification to a single channel.
#[derive(Debug, Clone)]
pub struct DispatchResult {
    pub channel: Channel,
    pub destination: String,
    pub success: bool,
    pub error: Option<String>,
    pub duration_ms: u64,
}
