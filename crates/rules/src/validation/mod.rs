//! Notification rule validation with structured errors and suggestions.
//!
//! Checks what the scheduler needs to dispatch a rule: trigger time,
//! criterion key, message template and link. Returns a [`ValidationResult`]
//! with errors (block save) and warnings (advisory).

mod rule_checks;

pub mod fuzzy;

use std::collections::HashSet;

use cohort_core::rule::NotificationRule;
use serde::{Deserialize, Serialize};

// ── Result types ────────────────────────────────────────────────────

/// Overall validation outcome.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ValidationResult {
    pub valid: bool,
    pub errors: Vec<ValidationError>,
    pub warnings: Vec<ValidationWarning>,
}

/// A blocking validation error.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ValidationError {
    /// Field path, e.g. `"rules[2].criteria"`.
    pub path: String,
    pub message: String,
    /// Optional "Did you mean …?" suggestion.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub suggestion: Option<String>,
}

/// A non-blocking advisory warning.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ValidationWarning {
    pub path: String,
    pub message: String,
}

impl ValidationResult {
    pub(crate) fn new() -> Self {
        Self {
            valid: true,
            errors: Vec::new(),
            warnings: Vec::new(),
        }
    }

    pub(crate) fn error(&mut self, path: impl Into<String>, message: impl Into<String>) {
        self.valid = false;
        self.errors.push(ValidationError {
            path: path.into(),
            message: message.into(),
            suggestion: None,
        });
    }

    pub(crate) fn error_with_suggestion(
        &mut self,
        path: impl Into<String>,
        message: impl Into<String>,
        suggestion: impl Into<String>,
    ) {
        self.valid = false;
        self.errors.push(ValidationError {
            path: path.into(),
            message: message.into(),
            suggestion: Some(suggestion.into()),
        });
    }

    pub(crate) fn warn(&mut self, path: impl Into<String>, message: impl Into<String>) {
        self.warnings.push(ValidationWarning {
            path: path.into(),
            message: message.into(),
        });
    }

    fn merge(&mut self, other: ValidationResult) {
        self.valid &= other.valid;
        self.errors.extend(other.errors);
        self.warnings.extend(other.warnings);
    }
}

// ── Public API ──────────────────────────────────────────────────────

/// Validate a single [`NotificationRule`].
pub fn validate_rule(rule: &NotificationRule) -> ValidationResult {
    let mut result = ValidationResult::new();
    rule_checks::validate_identity("", rule, &mut result);
    rule_checks::validate_time("", rule, &mut result);
    rule_checks::validate_criteria("", rule, &mut result);
    rule_checks::validate_message("", rule, &mut result);
    rule_checks::validate_link("", rule, &mut result);
    result
}

/// Validate a whole rule set, including duplicate ids.
pub fn validate_rules(rules: &[NotificationRule]) -> ValidationResult {
    let mut result = ValidationResult::new();
    let mut seen = HashSet::new();
    for (i, rule) in rules.iter().enumerate() {
        let prefix = format!("rules[{i}].");
        if !rule.id.is_empty() && !seen.insert(rule.id.as_str()) {
            result.error(format!("{prefix}id"), format!("Duplicate rule id '{}'", rule.id));
        }
        let mut single = ValidationResult::new();
        rule_checks::validate_identity(&prefix, rule, &mut single);
        rule_checks::validate_time(&prefix, rule, &mut single);
        rule_checks::validate_criteria(&prefix, rule, &mut single);
        rule_checks::validate_message(&prefix, rule, &mut single);
        rule_checks::validate_link(&prefix, rule, &mut single);
        result.merge(single);
    }
    result
}

/// Parse raw YAML for one rule and validate. Parse failures become errors.
pub fn validate_yaml(yaml: &str) -> ValidationResult {
    match serde_yaml::from_str::<NotificationRule>(yaml) {
        Ok(rule) => validate_rule(&rule),
        Err(e) => {
            let mut result = ValidationResult::new();
            result.error("", format!("YAML parse error: {e}"));
            result
        }
    }
}
