//! Append-only domain activity log over the `system_logs` collection.

use std::sync::Arc;

use chrono::{DateTime, Utc};
use chrono_tz::Tz;
use serde::Serialize;

use cohort_core::activity::{ActivityLogEntry, ActivityType};
use cohort_core::{DocumentStore, Result};

/// Actor recorded for entries the engine writes on its own behalf.
pub const SYSTEM_ACTOR: &str = "System";

#[derive(Clone)]
pub struct ActivityLedger {
    store: Arc<dyn DocumentStore>,
}

/// Counts of today's activity, grouped the way the admin dashboard shows them.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ActivitySummary {
    pub signups: usize,
    pub logins: usize,
    pub completions: usize,
    pub admin_actions: usize,
    pub notifications: usize,
    pub errors: usize,
    pub total: usize,
}

impl ActivitySummary {
    fn count(&mut self, kind: ActivityType) {
        self.total += 1;
        match kind {
            ActivityType::UserSignup => self.signups += 1,
            ActivityType::UserLogin => self.logins += 1,
            ActivityType::ContentComplete
            | ActivityType::VideoWatched
            | ActivityType::AssessmentComplete
            | ActivityType::WeekComplete => self.completions += 1,
            ActivityType::AdminAction | ActivityType::ConfigChange | ActivityType::WidgetToggle => {
                self.admin_actions += 1
            }
            ActivityType::NotificationSent => self.notifications += 1,
            ActivityType::SystemError => self.errors += 1,
            ActivityType::ProfileComplete | ActivityType::StreakMilestone | ActivityType::Purge => {}
        }
    }
}

impl ActivityLedger {
    pub fn new(store: Arc<dyn DocumentStore>) -> Self {
        Self { store }
    }

    /// Append an entry, returning its id.
    pub async fn record(
        &self,
        kind: ActivityType,
        actor: &str,
        details: impl Into<String>,
        metadata: serde_json::Value,
        at: DateTime<Utc>,
    ) -> Result<String> {
        let entry = ActivityLogEntry {
            id: String::new(),
            activity_type: kind,
            action: kind.label().to_string(),
            details: details.into(),
            user: actor.to_string(),
            user_id: None,
            target_user: None,
            metadata,
            timestamp: at,
        };
        self.append(entry).await
    }

    pub async fn append(&self, entry: ActivityLogEntry) -> Result<String> {
        let kind = entry.activity_type;
        let id = self.store.append_log(entry).await?;
        tracing::debug!(id = %id, kind = ?kind, "activity recorded");
        Ok(id)
    }

    /// Newest-first entries at or after `since`, capped at `limit`.
    pub async fn recent(&self, since: DateTime<Utc>, limit: usize) -> Result<Vec<ActivityLogEntry>> {
        let mut entries = self.store.logs_since(since).await?;
        entries.truncate(limit);
        Ok(entries)
    }

    /// Summary of everything logged since local midnight of `now` in `tz`.
    pub async fn daily_summary(&self, now: DateTime<Utc>, tz: Tz) -> Result<ActivitySummary> {
        let midnight = now
            .with_timezone(&tz)
            .date_naive()
            .and_hms_opt(0, 0, 0)
            .and_then(|m| m.and_local_timezone(tz).earliest())
            .map(|m| m.with_timezone(&Utc))
            .unwrap_or(now);

        let mut summary = ActivitySummary::default();
        for entry in self.store.logs_since(midnight).await? {
            summary.count(entry.activity_type);
        }
        Ok(summary)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;
    use cohort_core::MemoryStore;

    #[tokio::test]
    async fn daily_summary_groups_by_category() {
        let store = Arc::new(MemoryStore::new());
        let activity = ActivityLedger::new(store.clone());
        let now = Utc.with_ymd_and_hms(2025, 1, 7, 18, 0, 0).unwrap();
        let yesterday = now - chrono::Duration::days(1);

        for (kind, at) in [
            (ActivityType::UserSignup, now),
            (ActivityType::UserLogin, now),
            (ActivityType::UserLogin, now),
            (ActivityType::VideoWatched, now),
            (ActivityType::WeekComplete, now),
            (ActivityType::WidgetToggle, now),
            (ActivityType::NotificationSent, now),
            (ActivityType::SystemError, now),
            (ActivityType::UserLogin, yesterday),
        ] {
            activity
                .record(kind, SYSTEM_ACTOR, "", serde_json::Value::Null, at)
                .await
                .unwrap();
        }

        let summary = activity.daily_summary(now, Tz::UTC).await.unwrap();
        assert_eq!(summary.signups, 1);
        assert_eq!(summary.logins, 2);
        assert_eq!(summary.completions, 2);
        assert_eq!(summary.admin_actions, 1);
        assert_eq!(summary.notifications, 1);
        assert_eq!(summary.errors, 1);
        assert_eq!(summary.total, 8);
    }

    #[tokio::test]
    async fn recent_is_newest_first_and_limited() {
        let store = Arc::new(MemoryStore::new());
        let activity = ActivityLedger::new(store);
        let base = Utc.with_ymd_and_hms(2025, 1, 7, 0, 0, 0).unwrap();
        for i in 0..5 {
            activity
                .record(
                    ActivityType::UserLogin,
                    "u@example.com",
                    format!("login {i}"),
                    serde_json::Value::Null,
                    base + chrono::Duration::minutes(i),
                )
                .await
                .unwrap();
        }
        let recent = activity.recent(base, 2).await.unwrap();
        assert_eq!(recent.len(), 2);
        assert_eq!(recent[0].details, "login 4");
    }
}
