use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

pub type CohortId = String;
pub type UserId = String;
pub type RuleId = String;

/// A named group of users sharing one program start instant and timezone.
///
/// Mirrors the `cohorts/{id}` document. `start_date` is optional because the
/// admin console allows saving a cohort before its start is scheduled; a
/// cohort without a start yields no day index for its members.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Cohort {
    #[serde(default)]
    pub id: CohortId,
    pub name: String,
    #[serde(default)]
    pub start_date: Option<DateTime<Utc>>,
    /// IANA timezone name, e.g. `"America/New_York"`.
    #[serde(default)]
    pub timezone: String,
    #[serde(default)]
    pub facilitator: Option<String>,
    #[serde(default)]
    pub settings: CohortSettings,
    #[serde(default)]
    pub member_ids: Vec<UserId>,
}

impl Cohort {
    pub fn has_members(&self) -> bool {
        !self.member_ids.is_empty()
    }

    pub fn is_full(&self) -> bool {
        self.settings
            .max_capacity
            .is_some_and(|cap| self.member_ids.len() >= cap as usize)
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CohortSettings {
    #[serde(default)]
    pub max_capacity: Option<u32>,
    #[serde(default = "default_allow_late_joins")]
    pub allow_late_joins: bool,
    /// Days after the start instant during which late joins are still accepted.
    #[serde(default)]
    pub late_join_cutoff: Option<u32>,
}

fn default_allow_late_joins() -> bool {
    true
}

impl Default for CohortSettings {
    fn default() -> Self {
        Self {
            max_capacity: None,
            allow_late_joins: default_allow_late_joins(),
            late_join_cutoff: None,
        }
    }
}

/// The subset of a `users/{id}` document the engine reads.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct UserRecord {
    #[serde(default)]
    pub id: UserId,
    #[serde(default)]
    pub email: Option<String>,
    #[serde(default)]
    pub display_name: Option<String>,
    #[serde(default)]
    pub cohort_id: Option<CohortId>,
    /// Anchor of the user's program, inherited from the cohort start on
    /// assignment. Survives removal so a later reassignment can preserve it.
    #[serde(default)]
    pub program_start: Option<DateTime<Utc>>,
    #[serde(default)]
    pub notification_settings: NotificationSettings,
    #[serde(default)]
    pub is_test_user: bool,
    #[serde(default)]
    pub test_notification_recipient: Option<String>,
    #[serde(default)]
    pub disabled: bool,
}

impl UserRecord {
    /// Notifications are on and at least one channel is enabled.
    pub fn accepts_notifications(&self) -> bool {
        let s = &self.notification_settings;
        s.enabled && (s.channels.email || s.channels.sms)
    }
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct NotificationSettings {
    #[serde(default)]
    pub enabled: bool,
    /// The user's own IANA timezone, used for trigger times. Distinct from
    /// the cohort timezone that defines day boundaries.
    #[serde(default)]
    pub timezone: Option<String>,
    #[serde(default)]
    pub channels: ChannelPreferences,
    #[serde(default)]
    pub phone_number: Option<String>,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ChannelPreferences {
    #[serde(default)]
    pub email: bool,
    #[serde(default)]
    pub sms: bool,
}

/// Last completion instants of the user's daily practice items.
///
/// Each field is the most recent completion, if any; whether it counts for
/// "today" is decided by the caller in the user's timezone.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DailyProgress {
    #[serde(default)]
    pub morning_routine_completed_at: Option<DateTime<Utc>>,
    #[serde(default)]
    pub daily_action_completed_at: Option<DateTime<Utc>>,
    #[serde(default)]
    pub evening_routine_completed_at: Option<DateTime<Utc>>,
}

/// Versioned list of administrator identities.
///
/// Read from the store on every privileged trigger. There is no built-in
/// fallback list; a missing roster is an error.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AdminRoster {
    pub version: u64,
    #[serde(default)]
    pub emails: Vec<String>,
    #[serde(default)]
    pub updated_at: Option<DateTime<Utc>>,
}

impl AdminRoster {
    pub fn contains(&self, email: &str) -> bool {
        let email = email.trim();
        self.emails.iter().any(|e| e.trim().eq_ignore_ascii_case(email))
    }
}

/// A single atomic change to a user's cohort membership.
///
/// Applied by [`crate::DocumentStore::commit_membership`] as one update
/// across the user record and both cohorts' member lists.
#[derive(Debug, Clone, PartialEq)]
pub struct MembershipChange {
    pub user_id: UserId,
    /// Target cohort; `None` removes the user from their current cohort.
    pub cohort_id: Option<CohortId>,
    pub anchor: AnchorUpdate,
}

/// What happens to the user's program anchor in a membership change.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AnchorUpdate {
    Keep,
    Set(DateTime<Utc>),
    Clear,
}
