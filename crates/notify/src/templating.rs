//! Minijinja rendering for rule messages.
//!
//! Rule messages are arbitrary strings (not pre-registered), so a fresh
//! [`minijinja::Environment`] is created per render call. The HTML email
//! body is a fixed, autoescaped template that turns the rule's link text
//! into a hyperlink.

use std::collections::HashMap;

use crate::traits::{Notification, NotifyError};

const EMAIL_HTML: &str = r#"<p>{{ before }}{% if href %}<a href="{{ href }}" style="color: #0066cc; text-decoration: underline;">{{ link_text }}</a>{{ after }}{% endif %}</p>"#;

/// Context data available to rule message templates.
#[derive(Debug, Clone, serde::Serialize)]
pub struct MessageContext {
    pub user: UserContext,
    pub rule: RuleContext,
    /// Program day index, if the user belongs to an anchored cohort.
    pub day: Option<i64>,
    /// Local calendar date the message is for (`YYYY-MM-DD`).
    pub date: String,
}

#[derive(Debug, Clone, serde::Serialize)]
pub struct UserContext {
    pub display_name: String,
    pub email: String,
}

#[derive(Debug, Clone, serde::Serialize)]
pub struct RuleContext {
    pub id: String,
    pub name: String,
}

/// The parts of a rule that make up an outgoing message.
#[derive(Debug, Clone, Copy)]
pub struct MessageTemplate<'a> {
    pub subject: &'a str,
    pub message: &'a str,
    pub link_text: Option<&'a str>,
    pub link_url: Option<&'a str>,
}

/// Renders rule messages using minijinja.
#[derive(Debug, Clone)]
pub struct TemplateRenderer {
    /// Absolute app URL that relative links resolve against.
    base_url: String,
}

impl TemplateRenderer {
    pub fn new(base_url: impl Into<String>) -> Self {
        Self {
            base_url: base_url.into().trim_end_matches('/').to_string(),
        }
    }

    pub fn base_url(&self) -> &str {
        &self.base_url
    }

    /// Build a configured minijinja environment with custom filters.
    fn build_env() -> minijinja::Environment<'static> {
        let mut env = minijinja::Environment::new();
        env.add_filter("first_name", first_name_filter);
        env
    }

    /// Render a message template string with the given context.
    pub fn render(&self, template_str: &str, ctx: &MessageContext) -> Result<String, NotifyError> {
        let env = Self::build_env();
        env.render_str(template_str, ctx)
            .map_err(|e| NotifyError::Template(e.to_string()))
    }

    /// Check that a message template parses, without evaluating it.
    pub fn validate(&self, template_str: &str) -> Result<(), NotifyError> {
        let env = Self::build_env();
        env.template_from_str(template_str)
            .map_err(|e| NotifyError::Template(e.to_string()))?;
        Ok(())
    }

    /// Absolute URL for a rule link. Absolute URLs pass through unchanged.
    pub fn resolve_link(&self, url: &str) -> String {
        if url.starts_with("http://") || url.starts_with("https://") {
            url.to_string()
        } else {
            format!("{}/{}", self.base_url, url.trim_start_matches('/'))
        }
    }

    /// Render a rule into a deliverable notification.
    ///
    /// The link is the rule's resolved link when configured, otherwise the app
    /// base URL. The HTML body hyperlinks the first occurrence of the link
    /// text when both link text and url are set and the text is present.
    pub fn compose(
        &self,
        template: &MessageTemplate<'_>,
        ctx: &MessageContext,
    ) -> Result<Notification, NotifyError> {
        let body = self.render(template.message, ctx)?;
        let link = template
            .link_url
            .filter(|u| !u.trim().is_empty())
            .map(|u| self.resolve_link(u.trim()));

        let anchored = match (template.link_text, &link) {
            (Some(text), Some(href)) if !text.is_empty() => body
                .find(text)
                .map(|at| (&body[..at], text, &body[at + text.len()..], href.as_str())),
            _ => None,
        };
        if let (Some(text), None) = (template.link_text, anchored) {
            tracing::debug!(rule_id = %ctx.rule.id, link_text = text, "link text not found in message");
        }

        let mut env = minijinja::Environment::new();
        env.add_template("email.html", EMAIL_HTML)
            .map_err(|e| NotifyError::Template(e.to_string()))?;
        let html = env
            .get_template("email.html")
            .and_then(|t| match anchored {
                Some((before, link_text, after, href)) => t.render(minijinja::context! {
                    before, link_text, after, href,
                }),
                None => t.render(minijinja::context! { before => &body }),
            })
            .map_err(|e| NotifyError::Template(e.to_string()))?;

        let metadata = HashMap::from([
            ("rule_id".to_string(), ctx.rule.id.clone()),
            ("date".to_string(), ctx.date.clone()),
        ]);

        Ok(Notification {
            subject: template.subject.to_string(),
            body,
            html: Some(html),
            link: Some(link.unwrap_or_else(|| self.base_url.clone())),
            metadata,
        })
    }
}

/// Custom filter: first word of a display name.
fn first_name_filter(value: String) -> String {
    value.split_whitespace().next().unwrap_or_default().to_string()
}
