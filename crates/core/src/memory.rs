//! In-process [`DocumentStore`] and [`LedgerStore`] implementation.
//!
//! Backs the worker when it runs from a seed file and every test in the
//! workspace. All document state sits behind one `RwLock`, which is what
//! makes membership changes atomic; the ledger has its own `Mutex` so claims
//! never wait on document reads.

use std::collections::{BTreeMap, HashMap};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Mutex, MutexGuard, RwLock, RwLockReadGuard, RwLockWriteGuard};
use std::time::Duration;

use async_trait::async_trait;
use chrono::{DateTime, NaiveDate, Utc};
use uuid::Uuid;

use crate::activity::ActivityLogEntry;
use crate::content::ContentItem;
use crate::dispatch::{ClaimOutcome, DispatchKey, DispatchRecord, LedgerEntry};
use crate::entity::{
    AdminRoster, AnchorUpdate, Cohort, CohortId, DailyProgress, MembershipChange, RuleId, UserId,
    UserRecord,
};
use crate::error::{EngineError, Result};
use crate::rule::NotificationRule;
use crate::seed::Seed;
use crate::store::{DocumentStore, LedgerStore};

#[derive(Debug, Default)]
struct Documents {
    cohorts: HashMap<CohortId, Cohort>,
    users: HashMap<UserId, UserRecord>,
    rules: BTreeMap<RuleId, NotificationRule>,
    content: Vec<ContentItem>,
    roster: Option<AdminRoster>,
    progress: HashMap<UserId, DailyProgress>,
    logs: Vec<ActivityLogEntry>,
}

#[derive(Debug)]
pub struct MemoryStore {
    docs: RwLock<Documents>,
    ledger: Mutex<BTreeMap<DispatchKey, LedgerEntry>>,
    ledger_available: AtomicBool,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self {
            docs: RwLock::new(Documents::default()),
            ledger: Mutex::new(BTreeMap::new()),
            ledger_available: AtomicBool::new(true),
        }
    }

    /// Build a store pre-populated from a [`Seed`].
    pub fn from_seed(seed: Seed) -> Self {
        let store = Self::new();
        {
            let mut docs = store.write();
            for cohort in seed.cohorts {
                docs.cohorts.insert(cohort.id.clone(), cohort);
            }
            for user in seed.users {
                docs.users.insert(user.id.clone(), user);
            }
            for rule in seed.rules {
                docs.rules.insert(rule.id.clone(), rule);
            }
            docs.content = seed.content;
            docs.roster = seed.admin_roster;
            docs.progress = seed.progress;
        }
        store
    }

    fn read(&self) -> RwLockReadGuard<'_, Documents> {
        self.docs.read().unwrap_or_else(|e| e.into_inner())
    }

    fn write(&self) -> RwLockWriteGuard<'_, Documents> {
        self.docs.write().unwrap_or_else(|e| e.into_inner())
    }

    fn ledger(&self) -> Result<MutexGuard<'_, BTreeMap<DispatchKey, LedgerEntry>>> {
        if !self.ledger_available.load(Ordering::SeqCst) {
            return Err(EngineError::Store("dispatch ledger unavailable".to_string()));
        }
        Ok(self.ledger.lock().unwrap_or_else(|e| e.into_inner()))
    }

    pub fn insert_cohort(&self, cohort: Cohort) {
        self.write().cohorts.insert(cohort.id.clone(), cohort);
    }

    pub fn insert_user(&self, user: UserRecord) {
        self.write().users.insert(user.id.clone(), user);
    }

    pub fn insert_rule(&self, rule: NotificationRule) {
        self.write().rules.insert(rule.id.clone(), rule);
    }

    pub fn insert_content(&self, item: ContentItem) {
        self.write().content.push(item);
    }

    pub fn set_admin_roster(&self, roster: Option<AdminRoster>) {
        self.write().roster = roster;
    }

    pub fn set_progress(&self, user_id: &str, progress: DailyProgress) {
        self.write().progress.insert(user_id.to_string(), progress);
    }

    /// Simulate the ledger backend going away (or coming back).
    pub fn set_ledger_available(&self, available: bool) {
        self.ledger_available.store(available, Ordering::SeqCst);
    }

    pub fn log_count(&self) -> usize {
        self.read().logs.len()
    }

    pub fn ledger_len(&self) -> usize {
        self.ledger.lock().unwrap_or_else(|e| e.into_inner()).len()
    }
}

impl Default for MemoryStore {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl DocumentStore for MemoryStore {
    async fn cohort(&self, id: &str) -> Result<Option<Cohort>> {
        Ok(self.read().cohorts.get(id).cloned())
    }

    async fn save_cohort(&self, cohort: Cohort) -> Result<()> {
        if cohort.id.is_empty() {
            return Err(EngineError::Validation("cohort id is required".to_string()));
        }
        let mut docs = self.write();
        match docs.cohorts.get_mut(&cohort.id) {
            Some(existing) => {
                let moves_start = existing.start_date != cohort.start_date
                    || existing.timezone != cohort.timezone;
                if moves_start && existing.has_members() {
                    return Err(EngineError::Conflict(format!(
                        "cohort '{}' has members; use reanchor to move its start",
                        existing.name
                    )));
                }
                existing.name = cohort.name;
                existing.facilitator = cohort.facilitator;
                existing.settings = cohort.settings;
                existing.start_date = cohort.start_date;
                existing.timezone = cohort.timezone;
            }
            None => {
                docs.cohorts.insert(cohort.id.clone(), cohort);
            }
        }
        Ok(())
    }

    async fn reanchor_cohort(
        &self,
        cohort_id: &str,
        start_date: DateTime<Utc>,
        timezone: Option<String>,
    ) -> Result<usize> {
        let mut docs = self.write();
        let (previous_start, members) = {
            let cohort = docs
                .cohorts
                .get_mut(cohort_id)
                .ok_or_else(|| EngineError::not_found("cohorts", cohort_id))?;
            let previous = cohort.start_date.replace(start_date);
            if let Some(tz) = timezone {
                cohort.timezone = tz;
            }
            (previous, cohort.member_ids.clone())
        };

        let mut moved = 0;
        for member in members {
            if let Some(user) = docs.users.get_mut(&member) {
                if user.program_start.is_none() || user.program_start == previous_start {
                    user.program_start = Some(start_date);
                    moved += 1;
                }
            }
        }
        Ok(moved)
    }

    async fn user(&self, id: &str) -> Result<Option<UserRecord>> {
        Ok(self.read().users.get(id).cloned())
    }

    async fn users(&self) -> Result<Vec<UserRecord>> {
        let docs = self.read();
        let mut users: Vec<UserRecord> = docs.users.values().cloned().collect();
        users.sort_by(|a, b| a.id.cmp(&b.id));
        Ok(users)
    }

    async fn commit_membership(&self, change: MembershipChange) -> Result<()> {
        let mut docs = self.write();

        let previous = docs
            .users
            .get(&change.user_id)
            .ok_or_else(|| EngineError::not_found("users", change.user_id.as_str()))?
            .cohort_id
            .clone();

        // Validate everything before touching state.
        if let Some(target) = &change.cohort_id {
            let cohort = docs
                .cohorts
                .get(target)
                .ok_or_else(|| EngineError::not_found("cohorts", target.as_str()))?;
            if !cohort.member_ids.contains(&change.user_id) && cohort.is_full() {
                return Err(EngineError::Conflict(format!(
                    "cohort '{}' is at capacity",
                    cohort.name
                )));
            }
        }

        if let Some(prev) = previous.as_ref().filter(|p| Some(*p) != change.cohort_id.as_ref()) {
            if let Some(cohort) = docs.cohorts.get_mut(prev) {
                cohort.member_ids.retain(|m| m != &change.user_id);
            }
        }
        if let Some(target) = &change.cohort_id {
            if let Some(cohort) = docs.cohorts.get_mut(target) {
                if !cohort.member_ids.contains(&change.user_id) {
                    cohort.member_ids.push(change.user_id.clone());
                }
            }
        }
        if let Some(user) = docs.users.get_mut(&change.user_id) {
            user.cohort_id = change.cohort_id.clone();
            match change.anchor {
                AnchorUpdate::Keep => {}
                AnchorUpdate::Set(anchor) => user.program_start = Some(anchor),
                AnchorUpdate::Clear => user.program_start = None,
            }
        }
        Ok(())
    }

    async fn notification_rules(&self) -> Result<Vec<NotificationRule>> {
        Ok(self.read().rules.values().cloned().collect())
    }

    async fn content_items(&self) -> Result<Vec<ContentItem>> {
        Ok(self.read().content.clone())
    }

    async fn admin_roster(&self) -> Result<Option<AdminRoster>> {
        Ok(self.read().roster.clone())
    }

    async fn daily_progress(&self, user_id: &str) -> Result<Option<DailyProgress>> {
        Ok(self.read().progress.get(user_id).cloned())
    }

    async fn append_log(&self, mut entry: ActivityLogEntry) -> Result<String> {
        if entry.id.is_empty() {
            entry.id = Uuid::new_v4().to_string();
        }
        let id = entry.id.clone();
        self.write().logs.push(entry);
        Ok(id)
    }

    async fn logs_since(&self, since: DateTime<Utc>) -> Result<Vec<ActivityLogEntry>> {
        let docs = self.read();
        let mut logs: Vec<ActivityLogEntry> = docs
            .logs
            .iter()
            .filter(|e| e.timestamp >= since)
            .cloned()
            .collect();
        logs.sort_by(|a, b| b.timestamp.cmp(&a.timestamp));
        Ok(logs)
    }

    async fn delete_logs_before(&self, cutoff: DateTime<Utc>) -> Result<usize> {
        let mut docs = self.write();
        let before = docs.logs.len();
        docs.logs.retain(|e| e.timestamp >= cutoff);
        Ok(before - docs.logs.len())
    }
}

#[async_trait]
impl LedgerStore for MemoryStore {
    async fn ping(&self) -> Result<()> {
        self.ledger().map(|_| ())
    }

    async fn claim(
        &self,
        key: &DispatchKey,
        now: DateTime<Utc>,
        grace: Duration,
    ) -> Result<ClaimOutcome> {
        let grace = chrono::Duration::from_std(grace)
            .map_err(|e| EngineError::Config(format!("invalid claim grace window: {e}")))?;
        let mut ledger = self.ledger()?;

        let outcome = match ledger.get(key) {
            None => ClaimOutcome::Claimed,
            Some(LedgerEntry::Resolved(record)) => return Ok(ClaimOutcome::Resolved(record.outcome)),
            Some(LedgerEntry::Claimed { claimed_at }) => {
                let claimed_at = *claimed_at;
                if now.signed_duration_since(claimed_at) >= grace {
                    ClaimOutcome::Reclaimed {
                        previous_claim: claimed_at,
                    }
                } else {
                    return Ok(ClaimOutcome::Held { claimed_at });
                }
            }
        };

        ledger.insert(key.clone(), LedgerEntry::Claimed { claimed_at: now });
        Ok(outcome)
    }

    async fn finalize(&self, record: DispatchRecord) -> Result<()> {
        let mut ledger = self.ledger()?;
        if let Some(LedgerEntry::Resolved(existing)) = ledger.get(&record.key) {
            return Err(EngineError::Conflict(format!(
                "ledger key {} already resolved as {}",
                existing.key, existing.outcome
            )));
        }
        ledger.insert(record.key.clone(), LedgerEntry::Resolved(record));
        Ok(())
    }

    async fn entry(&self, key: &DispatchKey) -> Result<Option<LedgerEntry>> {
        Ok(self.ledger()?.get(key).cloned())
    }

    async fn entries_for_date(&self, date: NaiveDate) -> Result<Vec<LedgerEntry>> {
        Ok(self
            .ledger()?
            .iter()
            .filter(|(k, _)| k.date == date)
            .map(|(_, v)| v.clone())
            .collect())
    }

    async fn delete_before(&self, cutoff: DateTime<Utc>) -> Result<usize> {
        let mut ledger = self.ledger()?;
        let before = ledger.len();
        ledger.retain(|_, entry| entry.timestamp() >= cutoff);
        Ok(before - ledger.len())
    }
}
