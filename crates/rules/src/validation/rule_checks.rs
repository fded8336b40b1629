//! Field checks for a single notification rule.

use cohort_core::rule::NotificationRule;
use cohort_notify::templating::TemplateRenderer;

use super::fuzzy::fuzzy_match;
use super::ValidationResult;
use crate::criteria::{is_legacy_key, Criterion, CRITERION_KEYS};
use crate::scheduler::TriggerTime;

pub(super) fn validate_identity(prefix: &str, rule: &NotificationRule, result: &mut ValidationResult) {
    if rule.name.trim().is_empty() {
        result.error(format!("{prefix}name"), "Rule name must not be empty");
    }
    if !rule.enabled {
        result.warn(format!("{prefix}enabled"), "Rule is disabled and will only record skips");
    }
}

pub(super) fn validate_time(prefix: &str, rule: &NotificationRule, result: &mut ValidationResult) {
    if let Err(e) = rule.time.parse::<TriggerTime>() {
        result.error(format!("{prefix}time"), e);
    }
}

pub(super) fn validate_criteria(prefix: &str, rule: &NotificationRule, result: &mut ValidationResult) {
    let path = format!("{prefix}criteria");
    match rule.criteria.parse::<Criterion>() {
        Ok(criterion) if is_legacy_key(&rule.criteria) => result.warn(
            path,
            format!(
                "'{}' is a legacy key; use '{criterion}' instead",
                rule.criteria.trim()
            ),
        ),
        Ok(_) => {}
        Err(e) => match fuzzy_match(rule.criteria.trim(), CRITERION_KEYS) {
            Some(suggestion) => {
                result.error_with_suggestion(path, e.to_string(), format!("Did you mean '{suggestion}'?"))
            }
            None => result.error(
                path,
                format!("{e}; expected one of {}", CRITERION_KEYS.join(", ")),
            ),
        },
    }
}

pub(super) fn validate_message(prefix: &str, rule: &NotificationRule, result: &mut ValidationResult) {
    let path = format!("{prefix}message");
    if rule.message.trim().is_empty() {
        result.error(path, "Message must not be empty");
        return;
    }
    if let Err(e) = TemplateRenderer::new("").validate(&rule.message) {
        result.error(path, e.to_string());
    }
}

pub(super) fn validate_link(prefix: &str, rule: &NotificationRule, result: &mut ValidationResult) {
    let text = rule.link_text.as_deref().map(str::trim).filter(|t| !t.is_empty());
    let url = rule.link_url.as_deref().map(str::trim).filter(|u| !u.is_empty());

    match (text, url) {
        (Some(text), Some(_)) => {
            if !rule.message.contains(text) {
                result.error(
                    format!("{prefix}linkText"),
                    format!("Link text '{text}' does not appear in the message"),
                );
            }
        }
        (Some(_), None) => result.warn(
            format!("{prefix}linkUrl"),
            "Link text is set without a link URL; the app URL will be used",
        ),
        _ => {}
    }

    if let Some(url) = url {
        let absolute = url.contains("://");
        if absolute && !url.starts_with("http://") && !url.starts_with("https://") {
            result.error(
                format!("{prefix}linkUrl"),
                format!("URL must start with http:// or https://, got '{url}'"),
            );
        }
    }
}
