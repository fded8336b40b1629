//! SMS delivery through an HTTP gateway.
//!
//! Posts `{to, from, body}` as JSON to a configured gateway endpoint with an
//! optional bearer token. The provider behind the gateway is not our concern.

use crate::traits::{Channel, Destination, Notification, Notifier, NotifyError};

#[derive(Debug)]
pub struct SmsGatewayNotifier {
    /// Gateway URL (env vars already resolved).
    url: String,
    token: Option<String>,
    from: Option<String>,
    /// Shared HTTP client (connection pooling).
    client: reqwest::Client,
}

#[derive(Debug, serde::Serialize)]
struct SmsPayload<'a> {
    to: &'a str,
    #[serde(skip_serializing_if = "Option::is_none")]
    from: Option<&'a str>,
    body: String,
}

impl SmsGatewayNotifier {
    /// Create a new gateway notifier.
    ///
    /// Environment variable references (`${VAR_NAME}`) in `url` and `token`
    /// are resolved eagerly. Missing env vars produce a [`NotifyError::Config`].
    pub fn new(url: &str, token: Option<&str>, from: Option<String>) -> Result<Self, NotifyError> {
        let url = resolve_env_vars(url)?;
        if !url.starts_with("http://") && !url.starts_with("https://") {
            return Err(NotifyError::Config(format!(
                "SMS gateway URL must start with http:// or https://, got '{url}'"
            )));
        }
        let token = token.map(resolve_env_vars).transpose()?;
        Ok(Self {
            url,
            token,
            from,
            client: reqwest::Client::new(),
        })
    }
}

/// Text messages carry the link inline after the message.
fn sms_text(notification: &Notification) -> String {
    match &notification.link {
        Some(link) => format!("{} {}", notification.body, link),
        None => notification.body.clone(),
    }
}

#[async_trait::async_trait]
impl Notifier for SmsGatewayNotifier {
    async fn send(&self, to: &Destination, notification: &Notification) -> Result<(), NotifyError> {
        let Destination::Phone(number) = to else {
            return Err(NotifyError::Destination(format!(
                "sms channel cannot deliver to {}",
                to.address()
            )));
        };

        let payload = SmsPayload {
            to: number,
            from: self.from.as_deref(),
            body: sms_text(notification),
        };

        let mut request = self.client.post(&self.url).json(&payload);
        if let Some(token) = &self.token {
            request = request.bearer_auth(token);
        }

        let response = request.send().await?;
        let status = response.status();

        if !status.is_success() {
            let body_text = response
                .text()
                .await
                .unwrap_or_else(|_| "<unreadable body>".to_string());
            tracing::warn!(
                url = %self.url,
                %status,
                body = %body_text,
                "SMS gateway returned non-2xx status"
            );
            return Err(NotifyError::Gateway {
                status: status.as_u16(),
                body: body_text,
            });
        }

        tracing::debug!(url = %self.url, status = %status, "sms notification delivered");
        Ok(())
    }

    fn channel(&self) -> Channel {
        Channel::Sms
    }
}

/// Resolve `${VAR_NAME}` patterns in a string using `std::env::var`.
///
/// Returns an error if a referenced variable is not set.
fn resolve_env_vars(input: &str) -> Result<String, NotifyError> {
    let mut result = String::with_capacity(input.len());
    let mut chars = input.chars().peekable();

    while let Some(ch) = chars.next() {
        if ch == '$' && chars.peek() == Some(&'{') {
            chars.next();
            let mut var_name = String::new();
            let mut closed = false;
            for c in chars.by_ref() {
                if c == '}' {
                    closed = true;
                    break;
                }
                var_name.push(c);
            }
            if !closed {
                return Err(NotifyError::Config(format!(
                    "unclosed env var reference in: {input}"
                )));
            }
            let value = std::env::var(&var_name).map_err(|_| {
                NotifyError::Config(format!("env var not found: {var_name}"))
            })?;
            result.push_str(&value);
        } else {
            result.push(ch);
        }
    }

    Ok(result)
}
