//! Document store collaborator interfaces.
//!
//! The engine never talks to a concrete database. [`DocumentStore`] covers the
//! admin-owned collections it reads (cohorts, users, rules, content, roster)
//! plus the append-only `system_logs`; [`LedgerStore`] covers the dispatch
//! ledger, whose claim operation must be atomic.

use std::time::Duration;

use async_trait::async_trait;
use chrono::{DateTime, NaiveDate, Utc};

use crate::activity::ActivityLogEntry;
use crate::content::ContentItem;
use crate::dispatch::{ClaimOutcome, DispatchKey, DispatchRecord, LedgerEntry};
use crate::entity::{AdminRoster, Cohort, DailyProgress, MembershipChange, UserRecord};
use crate::error::Result;
use crate::rule::NotificationRule;

#[async_trait]
pub trait DocumentStore: Send + Sync {
    async fn cohort(&self, id: &str) -> Result<Option<Cohort>>;

    /// Create a cohort, or update an existing one's name, facilitator and
    /// settings in one write. The stored member list is always kept. Start
    /// instant and timezone may only change while the stored cohort has no
    /// members; otherwise this fails with [`crate::EngineError::Conflict`].
    async fn save_cohort(&self, cohort: Cohort) -> Result<()>;

    /// Move a cohort's start instant (and optionally timezone) and shift
    /// every member anchored on the old start, as one update. Returns the
    /// number of member anchors moved.
    async fn reanchor_cohort(
        &self,
        cohort_id: &str,
        start_date: DateTime<Utc>,
        timezone: Option<String>,
    ) -> Result<usize>;

    async fn user(&self, id: &str) -> Result<Option<UserRecord>>;

    /// All user records, including disabled accounts.
    async fn users(&self) -> Result<Vec<UserRecord>>;

    /// Apply a membership change atomically across the user record and the
    /// member lists of the old and new cohort. Fails with
    /// [`crate::EngineError::Conflict`] if the target cohort is at capacity.
    async fn commit_membership(&self, change: MembershipChange) -> Result<()>;

    async fn notification_rules(&self) -> Result<Vec<NotificationRule>>;

    async fn content_items(&self) -> Result<Vec<ContentItem>>;

    async fn admin_roster(&self) -> Result<Option<AdminRoster>>;

    async fn daily_progress(&self, user_id: &str) -> Result<Option<DailyProgress>>;

    /// Append to `system_logs`, returning the assigned id.
    async fn append_log(&self, entry: ActivityLogEntry) -> Result<String>;

    /// Log entries with `timestamp >= since`, newest first.
    async fn logs_since(&self, since: DateTime<Utc>) -> Result<Vec<ActivityLogEntry>>;

    /// Delete log entries with `timestamp < cutoff`.
    async fn delete_logs_before(&self, cutoff: DateTime<Utc>) -> Result<usize>;
}

#[async_trait]
pub trait LedgerStore: Send + Sync {
    /// Availability check run before a tick claims anything.
    async fn ping(&self) -> Result<()>;

    /// Atomic insert-if-absent. An unresolved claim at least `grace` old is
    /// taken over and reported as [`ClaimOutcome::Reclaimed`].
    async fn claim(
        &self,
        key: &DispatchKey,
        now: DateTime<Utc>,
        grace: Duration,
    ) -> Result<ClaimOutcome>;

    /// Finalise a key. Fails with [`crate::EngineError::Conflict`] if the key
    /// is already resolved.
    async fn finalize(&self, record: DispatchRecord) -> Result<()>;

    async fn entry(&self, key: &DispatchKey) -> Result<Option<LedgerEntry>>;

    async fn entries_for_date(&self, date: NaiveDate) -> Result<Vec<LedgerEntry>>;

    /// Delete entries whose timestamp is before `cutoff`.
    async fn delete_before(&self, cutoff: DateTime<Utc>) -> Result<usize>;
}
