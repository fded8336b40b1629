//! Append-only activity log entries (`system_logs` collection).

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ActivityType {
    UserSignup,
    UserLogin,
    ProfileComplete,
    ContentComplete,
    VideoWatched,
    AssessmentComplete,
    WeekComplete,
    StreakMilestone,
    AdminAction,
    ConfigChange,
    WidgetToggle,
    NotificationSent,
    Purge,
    SystemError,
}

impl ActivityType {
    /// Human-readable default action label.
    pub fn label(&self) -> &'static str {
        match self {
            ActivityType::UserSignup => "User Sign-up",
            ActivityType::UserLogin => "User Login",
            ActivityType::ProfileComplete => "Profile Completed",
            ActivityType::ContentComplete => "Content Completed",
            ActivityType::VideoWatched => "Video Watched",
            ActivityType::AssessmentComplete => "Assessment Completed",
            ActivityType::WeekComplete => "Week Completed",
            ActivityType::StreakMilestone => "Streak Milestone",
            ActivityType::AdminAction => "Admin Action",
            ActivityType::ConfigChange => "Config Changed",
            ActivityType::WidgetToggle => "Widget Toggled",
            ActivityType::NotificationSent => "Notification Sent",
            ActivityType::Purge => "Records Purged",
            ActivityType::SystemError => "System Error",
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ActivityLogEntry {
    #[serde(default)]
    pub id: String,
    #[serde(rename = "type")]
    pub activity_type: ActivityType,
    pub action: String,
    #[serde(default)]
    pub details: String,
    /// Actor email, or `"System"`.
    pub user: String,
    #[serde(default)]
    pub user_id: Option<String>,
    #[serde(default)]
    pub target_user: Option<String>,
    #[serde(default)]
    pub metadata: serde_json::Value,
    pub timestamp: DateTime<Utc>,
}
