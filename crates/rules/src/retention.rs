//! Administrator-triggered deletion of records past a retention horizon.

use std::fmt;
use std::str::FromStr;
use std::sync::Arc;

use chrono::{DateTime, Utc};
use serde::Serialize;

use cohort_core::activity::ActivityType;
use cohort_core::config::RetentionConfig;
use cohort_core::{DocumentStore, EngineError, Result};

use crate::activity::ActivityLedger;
use crate::admin::require_admin;
use crate::ledger::DispatchLedger;

/// Collections the sweeper is allowed to prune.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum Collection {
    SystemLogs,
    DispatchLedger,
}

impl Collection {
    pub fn as_str(&self) -> &'static str {
        match self {
            Collection::SystemLogs => "system_logs",
            Collection::DispatchLedger => "dispatch_ledger",
        }
    }
}

impl fmt::Display for Collection {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Collection {
    type Err = EngineError;

    fn from_str(s: &str) -> Result<Self> {
        match s.trim() {
            "system_logs" | "logs" => Ok(Collection::SystemLogs),
            "dispatch_ledger" | "ledger" => Ok(Collection::DispatchLedger),
            other => Err(EngineError::Validation(format!(
                "unknown collection '{other}' (expected system_logs or dispatch_ledger)"
            ))),
        }
    }
}

/// A privileged purge trigger.
#[derive(Debug, Clone)]
pub struct PurgeRequest {
    pub collection: Collection,
    pub older_than_days: u32,
    /// Email of the administrator issuing the purge.
    pub actor: String,
    /// Explicit confirmation; unconfirmed requests are refused.
    pub confirmed: bool,
}

#[derive(Debug, Clone, Serialize)]
pub struct PurgeReport {
    pub collection: Collection,
    pub cutoff: DateTime<Utc>,
    pub deleted: usize,
    /// Id of the `Purge` activity entry written before deletion.
    pub log_id: String,
}

pub struct RetentionSweeper {
    docs: Arc<dyn DocumentStore>,
    ledger: DispatchLedger,
    activity: ActivityLedger,
}

impl RetentionSweeper {
    pub fn new(docs: Arc<dyn DocumentStore>, ledger: DispatchLedger) -> Self {
        let activity = ActivityLedger::new(docs.clone());
        Self {
            docs,
            ledger,
            activity,
        }
    }

    /// Delete every record in the collection strictly older than
    /// `older_than_days` whole days before `now`.
    pub async fn purge(&self, request: &PurgeRequest, now: DateTime<Utc>) -> Result<PurgeReport> {
        if !request.confirmed {
            return Err(EngineError::Validation(
                "purge must be explicitly confirmed".to_string(),
            ));
        }
        let roster = require_admin(self.docs.as_ref(), &request.actor).await?;

        let cutoff = now - chrono::Duration::days(i64::from(request.older_than_days));
        let log_id = self
            .activity
            .record(
                ActivityType::Purge,
                &request.actor,
                format!(
                    "Purging {} older than {} days",
                    request.collection, request.older_than_days
                ),
                serde_json::json!({
                    "collection": request.collection.as_str(),
                    "olderThanDays": request.older_than_days,
                    "cutoff": cutoff.to_rfc3339(),
                    "rosterVersion": roster.version,
                }),
                now,
            )
            .await?;

        let deleted = match request.collection {
            Collection::SystemLogs => self.docs.delete_logs_before(cutoff).await?,
            Collection::DispatchLedger => self.ledger.delete_before(cutoff).await?,
        };

        tracing::info!(
            collection = %request.collection,
            older_than_days = request.older_than_days,
            deleted,
            actor = %request.actor,
            "retention purge complete"
        );

        Ok(PurgeReport {
            collection: request.collection,
            cutoff,
            deleted,
            log_id,
        })
    }

    /// Purge both collections at their configured horizons on behalf of
    /// `actor`, who must be on the admin roster.
    pub async fn sweep(
        &self,
        retention: &RetentionConfig,
        actor: &str,
        now: DateTime<Utc>,
    ) -> Result<Vec<PurgeReport>> {
        let mut reports = Vec::with_capacity(2);
        for (collection, days) in [
            (Collection::SystemLogs, retention.log_days),
            (Collection::DispatchLedger, retention.ledger_days),
        ] {
            let request = PurgeRequest {
                collection,
                older_than_days: days,
                actor: actor.to_string(),
                confirmed: true,
            };
            reports.push(self.purge(&request, now).await?);
        }
        Ok(reports)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;
    use cohort_core::{AdminRoster, MemoryStore};
    use std::time::Duration;

    const ADMIN: &str = "admin@example.com";

    fn setup() -> (Arc<MemoryStore>, RetentionSweeper) {
        let store = Arc::new(MemoryStore::new());
        store.set_admin_roster(Some(AdminRoster {
            version: 1,
            emails: vec![ADMIN.into()],
            updated_at: None,
        }));
        let ledger = DispatchLedger::new(store.clone(), Duration::from_secs(300));
        let sweeper = RetentionSweeper::new(store.clone(), ledger);
        (store, sweeper)
    }

    fn request(confirmed: bool, actor: &str) -> PurgeRequest {
        PurgeRequest {
            collection: Collection::SystemLogs,
            older_than_days: 30,
            actor: actor.to_string(),
            confirmed,
        }
    }

    #[tokio::test]
    async fn unconfirmed_purge_is_refused() {
        let (store, sweeper) = setup();
        assert!(matches!(
            sweeper.purge(&request(false, ADMIN), Utc::now()).await,
            Err(EngineError::Validation(_))
        ));
        assert_eq!(store.log_count(), 0);
    }

    #[tokio::test]
    async fn non_admin_purge_is_refused() {
        let (store, sweeper) = setup();
        assert!(matches!(
            sweeper.purge(&request(true, "mallory@example.com"), Utc::now()).await,
            Err(EngineError::Unauthorized(_))
        ));
        assert_eq!(store.log_count(), 0);
    }

    #[tokio::test]
    async fn boundary_entry_is_kept() {
        let (store, sweeper) = setup();
        let now = Utc.with_ymd_and_hms(2025, 3, 1, 12, 0, 0).unwrap();
        let activity = ActivityLedger::new(store.clone());
        for days in [31, 30, 29] {
            activity
                .record(
                    ActivityType::UserLogin,
                    "u@example.com",
                    "",
                    serde_json::Value::Null,
                    now - chrono::Duration::days(days),
                )
                .await
                .unwrap();
        }

        let report = sweeper.purge(&request(true, ADMIN), now).await.unwrap();
        assert_eq!(report.deleted, 1);
        // Two survivors plus the purge entry itself.
        assert_eq!(store.log_count(), 3);
    }

    #[test]
    fn collection_names_parse() {
        assert_eq!("ledger".parse::<Collection>().unwrap(), Collection::DispatchLedger);
        assert_eq!("system_logs".parse::<Collection>().unwrap(), Collection::SystemLogs);
        assert!("users".parse::<Collection>().is_err());
    }
}
