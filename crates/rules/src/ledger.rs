//! Exactly-once bookkeeping for (rule, user, local date) keys.

use std::sync::Arc;
use std::time::Duration;

use chrono::{DateTime, NaiveDate, Utc};
use serde::Serialize;

use cohort_core::dispatch::{
    ChannelOutcome, ClaimOutcome, DispatchKey, DispatchOutcome, DispatchRecord, LedgerEntry,
};
use cohort_core::{LedgerStore, Result};

/// Claim/finalise front-end over a [`LedgerStore`].
#[derive(Clone)]
pub struct DispatchLedger {
    store: Arc<dyn LedgerStore>,
    grace: Duration,
}

/// Outcome counts for one local date.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct DispatchSummary {
    pub date: Option<NaiveDate>,
    pub sent: usize,
    pub skipped_criteria_not_met: usize,
    pub skipped_disabled: usize,
    pub errors: usize,
    /// Claims not yet finalised.
    pub pending: usize,
}

impl DispatchSummary {
    pub fn total(&self) -> usize {
        self.sent + self.skipped_criteria_not_met + self.skipped_disabled + self.errors + self.pending
    }

    fn count(&mut self, entry: &LedgerEntry) {
        match entry.record().map(|r| r.outcome) {
            None => self.pending += 1,
            Some(DispatchOutcome::Sent) => self.sent += 1,
            Some(DispatchOutcome::SkippedCriteriaNotMet) => self.skipped_criteria_not_met += 1,
            Some(DispatchOutcome::SkippedDisabled) => self.skipped_disabled += 1,
            Some(DispatchOutcome::Error) => self.errors += 1,
        }
    }
}

impl DispatchLedger {
    /// `grace` is how old an unresolved claim must be before it may be retried.
    pub fn new(store: Arc<dyn LedgerStore>, grace: Duration) -> Self {
        Self { store, grace }
    }

    pub fn grace(&self) -> Duration {
        self.grace
    }

    /// Fails when the backing store cannot be reached.
    pub async fn health_check(&self) -> Result<()> {
        self.store.ping().await
    }

    /// Atomically claim `key`. Only [`ClaimOutcome::is_owned`] outcomes may
    /// proceed to evaluation.
    pub async fn try_claim(&self, key: &DispatchKey, now: DateTime<Utc>) -> Result<ClaimOutcome> {
        let outcome = self.store.claim(key, now, self.grace).await?;
        match &outcome {
            ClaimOutcome::Reclaimed { previous_claim } => {
                tracing::warn!(key = %key, previous_claim = %previous_claim, "re-claimed stale ledger entry");
            }
            ClaimOutcome::Held { claimed_at } => {
                tracing::debug!(key = %key, claimed_at = %claimed_at, "key held by another evaluation");
            }
            _ => {}
        }
        Ok(outcome)
    }

    /// Finalise `key` with `outcome`. The stored record is returned.
    pub async fn record(
        &self,
        key: DispatchKey,
        outcome: DispatchOutcome,
        channels: Vec<ChannelOutcome>,
        detail: Option<String>,
        now: DateTime<Utc>,
    ) -> Result<DispatchRecord> {
        let record = DispatchRecord {
            key,
            outcome,
            channels,
            detail,
            recorded_at: now,
        };
        self.store.finalize(record.clone()).await?;
        tracing::debug!(key = %record.key, outcome = %record.outcome, "ledger entry finalised");
        Ok(record)
    }

    pub async fn lookup(&self, key: &DispatchKey) -> Result<Option<LedgerEntry>> {
        self.store.entry(key).await
    }

    pub async fn summary(&self, date: NaiveDate) -> Result<DispatchSummary> {
        let mut summary = DispatchSummary {
            date: Some(date),
            ..DispatchSummary::default()
        };
        for entry in self.store.entries_for_date(date).await? {
            summary.count(&entry);
        }
        Ok(summary)
    }

    /// Remove entries older than `cutoff`. Used by the retention sweeper.
    pub(crate) async fn delete_before(&self, cutoff: DateTime<Utc>) -> Result<usize> {
        self.store.delete_before(cutoff).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use cohort_core::MemoryStore;

    fn ledger() -> DispatchLedger {
        DispatchLedger::new(Arc::new(MemoryStore::new()), Duration::from_secs(300))
    }

    fn key(rule: &str, user: &str) -> DispatchKey {
        DispatchKey::new(rule, user, NaiveDate::from_ymd_opt(2025, 1, 7).unwrap())
    }

    #[tokio::test]
    async fn second_claim_loses() {
        let ledger = ledger();
        let now = Utc::now();
        assert!(ledger.try_claim(&key("r", "u"), now).await.unwrap().is_owned());
        assert!(!ledger.try_claim(&key("r", "u"), now).await.unwrap().is_owned());
    }

    #[tokio::test]
    async fn summary_counts_outcomes_and_pending() {
        let ledger = ledger();
        let now = Utc::now();
        for (user, outcome) in [
            ("u1", Some(DispatchOutcome::Sent)),
            ("u2", Some(DispatchOutcome::Sent)),
            ("u3", Some(DispatchOutcome::SkippedCriteriaNotMet)),
            ("u4", Some(DispatchOutcome::Error)),
            ("u5", None),
        ] {
            ledger.try_claim(&key("r", user), now).await.unwrap();
            if let Some(outcome) = outcome {
                ledger
                    .record(key("r", user), outcome, vec![], None, now)
                    .await
                    .unwrap();
            }
        }

        let summary = ledger
            .summary(NaiveDate::from_ymd_opt(2025, 1, 7).unwrap())
            .await
            .unwrap();
        assert_eq!(summary.sent, 2);
        assert_eq!(summary.skipped_criteria_not_met, 1);
        assert_eq!(summary.errors, 1);
        assert_eq!(summary.pending, 1);
        assert_eq!(summary.total(), 5);
    }
}
