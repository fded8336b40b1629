//! Per-rule compiled entry type.

use std::sync::Arc;

use cohort_core::rule::NotificationRule;

use crate::criteria::Criterion;

use super::trigger::TriggerTime;

/// A rule with its trigger time and criterion parsed.
#[derive(Debug, Clone)]
pub struct CompiledRule {
    pub rule: Arc<NotificationRule>,
    pub trigger: TriggerTime,
    pub criterion: Criterion,
}

impl CompiledRule {
    /// Parse a stored rule. A rule that fails to parse is never dispatched.
    pub fn compile(rule: NotificationRule) -> Result<Self, String> {
        let trigger = rule.time.parse::<TriggerTime>()?;
        let criterion = rule.criteria.parse::<Criterion>().map_err(|e| e.to_string())?;
        Ok(Self {
            rule: Arc::new(rule),
            trigger,
            criterion,
        })
    }

    pub fn id(&self) -> &str {
        &self.rule.id
    }
}
