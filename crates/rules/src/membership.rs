//! Cohort membership changes and cohort edits.
//!
//! Assignment enforces the cohort's capacity and late-join settings and
//! writes the user record and member lists as one store update. Moving a
//! cohort's start once it has members goes through [`MembershipService::reanchor`].

use std::sync::Arc;

use chrono::{DateTime, Utc};

use cohort_core::activity::ActivityType;
use cohort_core::{AnchorUpdate, Cohort, DocumentStore, EngineError, MembershipChange, Result};

use crate::activity::ActivityLedger;
use crate::admin::require_admin;
use crate::clock::ClockResolver;

/// What happens to a user's existing program anchor on reassignment.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum AnchorPolicy {
    /// Adopt the new cohort's start.
    #[default]
    Reset,
    /// Keep the current anchor if the user has one.
    Preserve,
}

pub struct MembershipService {
    store: Arc<dyn DocumentStore>,
    activity: ActivityLedger,
    clock: ClockResolver,
}

impl MembershipService {
    pub fn new(store: Arc<dyn DocumentStore>, clock: ClockResolver) -> Self {
        let activity = ActivityLedger::new(store.clone());
        Self {
            store,
            activity,
            clock,
        }
    }

    async fn load_cohort(&self, cohort_id: &str) -> Result<Cohort> {
        self.store
            .cohort(cohort_id)
            .await?
            .ok_or_else(|| EngineError::not_found("cohorts", cohort_id))
    }

    /// Put `user_id` into `cohort_id`, leaving any previous cohort.
    pub async fn assign(
        &self,
        user_id: &str,
        cohort_id: &str,
        policy: AnchorPolicy,
        actor: &str,
        now: DateTime<Utc>,
    ) -> Result<()> {
        let cohort = self.load_cohort(cohort_id).await?;
        let user = self
            .store
            .user(user_id)
            .await?
            .ok_or_else(|| EngineError::not_found("users", user_id))?;

        let already_member = cohort.member_ids.iter().any(|m| m == user_id);
        if !already_member {
            self.check_late_join(&cohort, now)?;
        }

        let anchor = match (policy, user.program_start, cohort.start_date) {
            (AnchorPolicy::Preserve, Some(_), _) => AnchorUpdate::Keep,
            (_, _, Some(start)) => AnchorUpdate::Set(start),
            (_, _, None) => AnchorUpdate::Clear,
        };

        self.store
            .commit_membership(MembershipChange {
                user_id: user_id.to_string(),
                cohort_id: Some(cohort_id.to_string()),
                anchor,
            })
            .await?;

        tracing::info!(user_id, cohort_id, ?policy, "user assigned to cohort");
        self.activity
            .record(
                ActivityType::AdminAction,
                actor,
                format!("Assigned {user_id} to {}", cohort.name),
                serde_json::json!({ "userId": user_id, "cohortId": cohort_id }),
                now,
            )
            .await?;
        Ok(())
    }

    fn check_late_join(&self, cohort: &Cohort, now: DateTime<Utc>) -> Result<()> {
        if cohort.is_full() {
            return Err(EngineError::Conflict(format!(
                "cohort '{}' is at capacity",
                cohort.name
            )));
        }
        let Some(start) = cohort.start_date else {
            return Ok(());
        };
        let days_after_start = self.clock.day_index(start, &cohort.timezone, now) - 1;
        if days_after_start <= 0 {
            return Ok(());
        }
        if !cohort.settings.allow_late_joins {
            return Err(EngineError::Conflict(format!(
                "cohort '{}' has started and does not accept late joins",
                cohort.name
            )));
        }
        if let Some(cutoff) = cohort.settings.late_join_cutoff {
            if days_after_start > i64::from(cutoff) {
                return Err(EngineError::Conflict(format!(
                    "cohort '{}' closed to late joins {cutoff} days after start",
                    cohort.name
                )));
            }
        }
        Ok(())
    }

    /// Take `user_id` out of their cohort. The anchor is kept so a later
    /// reassignment can preserve it.
    pub async fn remove(&self, user_id: &str, actor: &str, now: DateTime<Utc>) -> Result<()> {
        self.store
            .commit_membership(MembershipChange {
                user_id: user_id.to_string(),
                cohort_id: None,
                anchor: AnchorUpdate::Keep,
            })
            .await?;
        tracing::info!(user_id, "user removed from cohort");
        self.activity
            .record(
                ActivityType::AdminAction,
                actor,
                format!("Removed {user_id} from cohort"),
                serde_json::json!({ "userId": user_id }),
                now,
            )
            .await?;
        Ok(())
    }

    /// Save admin edits to a cohort. Member lists are owned by membership
    /// changes and are never overwritten here. Start instant and timezone are
    /// frozen once the cohort has members, checked in the same store write.
    pub async fn update_cohort(&self, cohort: Cohort, actor: &str, now: DateTime<Utc>) -> Result<()> {
        let details = format!("Updated cohort {}", cohort.name);
        let cohort_id = cohort.id.clone();
        self.store.save_cohort(cohort).await?;
        tracing::info!(cohort_id = %cohort_id, "cohort updated");
        self.activity
            .record(
                ActivityType::ConfigChange,
                actor,
                details,
                serde_json::json!({ "cohortId": cohort_id }),
                now,
            )
            .await?;
        Ok(())
    }

    /// Move a populated cohort's start (and optionally timezone). Members
    /// anchored on the old start move with it. Admin only.
    pub async fn reanchor(
        &self,
        cohort_id: &str,
        start_date: DateTime<Utc>,
        timezone: Option<String>,
        actor: &str,
        now: DateTime<Utc>,
    ) -> Result<usize> {
        let roster = require_admin(self.store.as_ref(), actor).await?;
        let cohort = self.load_cohort(cohort_id).await?;

        let moved = self
            .store
            .reanchor_cohort(cohort_id, start_date, timezone.clone())
            .await?;

        tracing::warn!(
            cohort_id,
            from = ?cohort.start_date,
            to = %start_date,
            moved,
            "cohort start re-anchored"
        );
        self.activity
            .record(
                ActivityType::AdminAction,
                actor,
                format!("Re-anchored {} start", cohort.name),
                serde_json::json!({
                    "cohortId": cohort_id,
                    "previousStart": cohort.start_date.map(|d| d.to_rfc3339()),
                    "newStart": start_date.to_rfc3339(),
                    "timezone": timezone,
                    "membersMoved": moved,
                    "rosterVersion": roster.version,
                }),
                now,
            )
            .await?;
        Ok(moved)
    }
}
