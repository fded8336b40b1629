//! SMTP email notifier via `lettre` with TLS support.
//!
//! Delivers notifications as emails through an SMTP server. The recipient
//! comes from each delivery's destination, not from configuration.

use crate::traits::{Channel, Destination, Notification, Notifier, NotifyError};
use lettre::{
    message::{Mailbox, MultiPart},
    transport::smtp::authentication::Credentials,
    AsyncSmtpTransport, AsyncTransport, Message, Tokio1Executor,
};

/// Sends notifications as emails via SMTP.
#[derive(Debug)]
pub struct EmailNotifier {
    /// Async SMTP transport for sending emails.
    transport: AsyncSmtpTransport<Tokio1Executor>,
    /// Sender mailbox.
    from: Mailbox,
}

impl EmailNotifier {
    /// Build an `EmailNotifier` from SMTP configuration.
    ///
    /// - `smtp_port`: Optional port (defaults to 587). Port 465 uses implicit TLS.
    /// - `tls`: `None` or `Some(true)` enables STARTTLS on other ports.
    /// - `from`: Sender address, e.g. `"Reminders <noreply@example.com>"`.
    ///
    /// SMTP credentials are resolved from the `SMTP_USERNAME` and `SMTP_PASSWORD`
    /// environment variables. If both are set, they are passed to the transport;
    /// otherwise the connection is unauthenticated.
    pub fn from_config(
        smtp_host: &str,
        smtp_port: Option<u16>,
        tls: Option<bool>,
        from: &str,
    ) -> Result<Self, NotifyError> {
        let from_mailbox: Mailbox = from
            .parse()
            .map_err(|e: lettre::address::AddressError| NotifyError::Config(e.to_string()))?;

        let port = smtp_port.unwrap_or(587);
        let use_tls = tls.unwrap_or(true);

        let mut builder = if port == 465 {
            AsyncSmtpTransport::<Tokio1Executor>::relay(smtp_host)
                .map_err(|e| NotifyError::Config(e.to_string()))?
                .port(port)
        } else if use_tls {
            AsyncSmtpTransport::<Tokio1Executor>::starttls_relay(smtp_host)
                .map_err(|e| NotifyError::Config(e.to_string()))?
                .port(port)
        } else {
            AsyncSmtpTransport::<Tokio1Executor>::builder_dangerous(smtp_host).port(port)
        };

        if let (Ok(username), Ok(password)) =
            (std::env::var("SMTP_USERNAME"), std::env::var("SMTP_PASSWORD"))
        {
            builder = builder.credentials(Credentials::new(username, password));
        }

        Ok(Self {
            transport: builder.build(),
            from: from_mailbox,
        })
    }
}

/// Plain-text body with the link on its own line.
fn plain_body(notification: &Notification) -> String {
    match &notification.link {
        Some(link) => format!("{}\n\n{}", notification.body, link),
        None => notification.body.clone(),
    }
}

#[async_trait::async_trait]
impl Notifier for EmailNotifier {
    async fn send(&self, to: &Destination, notification: &Notification) -> Result<(), NotifyError> {
        let Destination::Email(address) = to else {
            return Err(NotifyError::Destination(format!(
                "email channel cannot deliver to {}",
                to.address()
            )));
        };
        let recipient: Mailbox = address
            .parse()
            .map_err(|e: lettre::address::AddressError| NotifyError::Destination(e.to_string()))?;

        let builder = Message::builder()
            .from(self.from.clone())
            .to(recipient)
            .subject(&notification.subject);

        let plain = plain_body(notification);
        let email = match &notification.html {
            Some(html) => builder.multipart(MultiPart::alternative_plain_html(plain, html.clone())),
            None => builder.body(plain),
        }
        .map_err(|e| NotifyError::Smtp(e.to_string()))?;

        self.transport
            .send(email)
            .await
            .map_err(|e| NotifyError::Smtp(e.to_string()))?;

        tracing::info!(
            channel = "email",
            subject = %notification.subject,
            "notification delivered"
        );

        Ok(())
    }

    fn channel(&self) -> Channel {
        Channel::Email
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    fn notification(link: Option<&str>) -> Notification {
        Notification {
            subject: "Morning nudge".to_string(),
            body: "Complete your morning routine".to_string(),
            html: None,
            link: link.map(String::from),
            metadata: HashMap::new(),
        }
    }

    #[test]
    fn parse_email_with_display_name() {
        let mailbox: Result<Mailbox, _> = "Reminders <noreply@example.com>".parse();
        let mb = mailbox.unwrap();
        assert_eq!(mb.email.to_string(), "noreply@example.com");
    }

    #[test]
    fn from_config_valid() {
        let notifier =
            EmailNotifier::from_config("smtp.example.com", Some(587), Some(true), "noreply@example.com");
        assert!(notifier.is_ok());
    }

    #[test]
    fn from_config_invalid_from_address() {
        let result = EmailNotifier::from_config("smtp.example.com", None, None, "bad-address");
        let err = result.unwrap_err().to_string();
        assert!(err.contains("Configuration error"), "got: {err}");
    }

    #[test]
    fn from_config_implicit_tls_port() {
        let notifier =
            EmailNotifier::from_config("smtp.example.com", Some(465), None, "noreply@example.com");
        assert!(notifier.is_ok());
    }

    #[test]
    fn from_config_no_tls() {
        let notifier =
            EmailNotifier::from_config("smtp.example.com", Some(25), Some(false), "noreply@example.com");
        assert_eq!(notifier.unwrap().channel(), Channel::Email);
    }

    #[test]
    fn plain_body_appends_link() {
        assert_eq!(
            plain_body(&notification(Some("https://app.example.com/today"))),
            "Complete your morning routine\n\nhttps://app.example.com/today"
        );
        assert_eq!(plain_body(&notification(None)), "Complete your morning routine");
    }

    #[tokio::test]
    async fn rejects_phone_destination() {
        let notifier =
            EmailNotifier::from_config("smtp.example.com", Some(25), Some(false), "noreply@example.com")
                .unwrap();
        let err = notifier
            .send(&Destination::Phone("+15550100".into()), &notification(None))
            .await
            .unwrap_err();
        assert!(matches!(err, NotifyError::Destination(_)));
    }
}
