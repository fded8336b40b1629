use serde::{Deserialize, Serialize};

use crate::entity::RuleId;

/// A `notification_rules/{id}` document as stored by the admin console.
///
/// `time` and `criteria` stay as raw strings here; they are parsed and
/// validated when the scheduler compiles the rule so one malformed rule
/// cannot poison a whole load.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct NotificationRule {
    #[serde(default)]
    pub id: RuleId,
    pub name: String,
    /// Local trigger time-of-day, `"HH:MM"`.
    pub time: String,
    pub criteria: String,
    pub message: String,
    #[serde(default)]
    pub link_text: Option<String>,
    #[serde(default)]
    pub link_url: Option<String>,
    #[serde(default)]
    pub enabled: bool,
}
