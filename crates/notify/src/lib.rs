//! Outbound notification channels for rule dispatch.
//!
//! This crate provides:
//! - `Notifier` trait for pluggable delivery channels (email, SMS)
//! - SMTP email and HTTP SMS-gateway notifier implementations
//! - Minijinja rendering of rule messages and their hyperlinks
//! - Dispatcher that sends to each requested channel independently, time-bounded

pub mod dispatcher;
pub mod email;
pub mod memory;
pub mod sms;
pub mod templating;
pub mod traits;

pub use dispatcher::Dispatcher;
pub use traits::{Channel, Delivery, Destination, DispatchResult, Notification, Notifier, NotifyError};
