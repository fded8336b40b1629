//! Dispatch ledger records: one per (rule, user, local date).

use std::fmt;

use chrono::{DateTime, NaiveDate, Utc};
use serde::{Deserialize, Serialize};

use crate::entity::{RuleId, UserId};

/// Composite ledger key. `date` is the calendar date in the timezone the
/// rule was evaluated in (the user's notification timezone).
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct DispatchKey {
    pub rule_id: RuleId,
    pub user_id: UserId,
    pub date: NaiveDate,
}

impl DispatchKey {
    pub fn new(rule_id: impl Into<RuleId>, user_id: impl Into<UserId>, date: NaiveDate) -> Self {
        Self {
            rule_id: rule_id.into(),
            user_id: user_id.into(),
            date,
        }
    }
}

impl fmt::Display for DispatchKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}:{}:{}", self.rule_id, self.user_id, self.date)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum DispatchOutcome {
    Sent,
    SkippedCriteriaNotMet,
    SkippedDisabled,
    Error,
}

impl DispatchOutcome {
    pub fn as_str(&self) -> &'static str {
        match self {
            DispatchOutcome::Sent => "sent",
            DispatchOutcome::SkippedCriteriaNotMet => "skipped_criteria_not_met",
            DispatchOutcome::SkippedDisabled => "skipped_disabled",
            DispatchOutcome::Error => "error",
        }
    }
}

impl fmt::Display for DispatchOutcome {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Per-channel delivery result stored alongside the outcome.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ChannelOutcome {
    pub channel: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub destination: Option<String>,
    pub success: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

/// A finalised ledger record. Never mutated after it is written.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DispatchRecord {
    pub key: DispatchKey,
    pub outcome: DispatchOutcome,
    #[serde(default)]
    pub channels: Vec<ChannelOutcome>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub detail: Option<String>,
    pub recorded_at: DateTime<Utc>,
}

/// Ledger slot for a key: either claimed by an in-flight evaluation or
/// finalised with a record.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "state", rename_all = "snake_case")]
pub enum LedgerEntry {
    Claimed { claimed_at: DateTime<Utc> },
    Resolved(DispatchRecord),
}

impl LedgerEntry {
    /// Instant used for retention: claim time or record time.
    pub fn timestamp(&self) -> DateTime<Utc> {
        match self {
            LedgerEntry::Claimed { claimed_at } => *claimed_at,
            LedgerEntry::Resolved(record) => record.recorded_at,
        }
    }

    pub fn record(&self) -> Option<&DispatchRecord> {
        match self {
            LedgerEntry::Claimed { .. } => None,
            LedgerEntry::Resolved(record) => Some(record),
        }
    }
}

/// Result of an atomic insert-if-absent on the ledger.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ClaimOutcome {
    /// No entry existed; the caller now owns the key.
    Claimed,
    /// An unresolved claim older than the grace window was taken over.
    Reclaimed { previous_claim: DateTime<Utc> },
    /// Another evaluation holds a fresh claim.
    Held { claimed_at: DateTime<Utc> },
    /// The key is already finalised.
    Resolved(DispatchOutcome),
}

impl ClaimOutcome {
    pub fn is_owned(&self) -> bool {
        matches!(self, ClaimOutcome::Claimed | ClaimOutcome::Reclaimed { .. })
    }
}
