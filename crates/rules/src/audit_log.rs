//! In-memory trail of rule evaluations, kept per rule.
//!
//! Each rule keeps its most recent entries (500 by default); older ones are
//! dropped first. Writes take a `std::sync::RwLock` briefly and never hold
//! it across an `.await`.

use std::collections::{HashMap, VecDeque};
use std::sync::{Arc, RwLock};

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

const DEFAULT_MAX_PER_RULE: usize = 500;
const DEFAULT_QUERY_LIMIT: usize = 100;

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, PartialOrd, Ord)]
#[serde(rename_all = "lowercase")]
pub enum LogLevel {
    Debug,
    Info,
    Warning,
    Error,
}

impl std::str::FromStr for LogLevel {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "debug" => Ok(Self::Debug),
            "info" => Ok(Self::Info),
            "warn" | "warning" => Ok(Self::Warning),
            "error" => Ok(Self::Error),
            other => Err(format!("unknown log level '{other}'")),
        }
    }
}

/// Step of a (rule, user) evaluation an entry was written from.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum ExecutionPhase {
    ScheduleCheck,
    Claim,
    CriteriaCheck,
    Render,
    Dispatch,
    DispatchError,
    Complete,
}

#[derive(Debug, Clone, Serialize)]
pub struct LogEntry {
    pub timestamp: DateTime<Utc>,
    pub rule_id: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub user_id: Option<String>,
    pub level: LogLevel,
    pub phase: ExecutionPhase,
    pub message: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub details: Option<serde_json::Value>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub duration_ms: Option<u64>,
}

/// Filters for [`AuditLog::query`]. Every field is optional.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct LogQueryParams {
    /// Minimum level, inclusive.
    pub level: Option<LogLevel>,
    pub phase: Option<ExecutionPhase>,
    pub user_id: Option<String>,
    pub since: Option<DateTime<Utc>>,
    /// Defaults to 100.
    pub limit: Option<usize>,
}

impl LogQueryParams {
    fn matches(&self, entry: &LogEntry) -> bool {
        self.level.map_or(true, |l| entry.level >= l)
            && self.phase.map_or(true, |p| entry.phase == p)
            && self
                .user_id
                .as_deref()
                .map_or(true, |u| entry.user_id.as_deref() == Some(u))
            && self.since.map_or(true, |s| entry.timestamp >= s)
    }
}

#[derive(Clone)]
pub struct AuditLog {
    entries: Arc<RwLock<HashMap<String, VecDeque<LogEntry>>>>,
    max_per_rule: usize,
}

impl AuditLog {
    pub fn new() -> Self {
        Self::with_max_entries(DEFAULT_MAX_PER_RULE)
    }

    pub fn with_max_entries(max: usize) -> Self {
        Self {
            entries: Arc::new(RwLock::new(HashMap::new())),
            max_per_rule: max.max(1),
        }
    }

    pub fn log(&self, rule_id: &str, level: LogLevel, phase: ExecutionPhase, message: impl Into<String>) {
        self.log_with_details(rule_id, None, level, phase, message, None, None);
    }

    /// Entry about one user's evaluation of `rule_id`.
    pub fn log_for_user(
        &self,
        rule_id: &str,
        user_id: &str,
        level: LogLevel,
        phase: ExecutionPhase,
        message: impl Into<String>,
    ) {
        self.log_with_details(rule_id, Some(user_id), level, phase, message, None, None);
    }

    #[allow(clippy::too_many_arguments)]
    pub fn log_with_details(
        &self,
        rule_id: &str,
        user_id: Option<&str>,
        level: LogLevel,
        phase: ExecutionPhase,
        message: impl Into<String>,
        details: Option<serde_json::Value>,
        duration_ms: Option<u64>,
    ) {
        let entry = LogEntry {
            timestamp: Utc::now(),
            rule_id: rule_id.to_string(),
            user_id: user_id.map(str::to_string),
            level,
            phase,
            message: message.into(),
            details,
            duration_ms,
        };

        let mut guard = self.entries.write().unwrap_or_else(|e| e.into_inner());
        let trail = guard.entry(rule_id.to_string()).or_default();
        trail.push_back(entry);
        while trail.len() > self.max_per_rule {
            trail.pop_front();
        }
    }

    /// Entries for `rule_id` matching `params`, newest first.
    pub fn query(&self, rule_id: &str, params: &LogQueryParams) -> Vec<LogEntry> {
        let guard = self.entries.read().unwrap_or_else(|e| e.into_inner());
        let Some(trail) = guard.get(rule_id) else {
            return Vec::new();
        };
        trail
            .iter()
            .rev()
            .filter(|e| params.matches(e))
            .take(params.limit.unwrap_or(DEFAULT_QUERY_LIMIT))
            .cloned()
            .collect()
    }

    /// Entries across every rule matching `params`, newest first.
    pub fn query_all(&self, params: &LogQueryParams) -> Vec<LogEntry> {
        let guard = self.entries.read().unwrap_or_else(|e| e.into_inner());
        let mut found: Vec<LogEntry> = guard
            .values()
            .flat_map(|trail| trail.iter().filter(|e| params.matches(e)).cloned())
            .collect();
        found.sort_by(|a, b| b.timestamp.cmp(&a.timestamp));
        found.truncate(params.limit.unwrap_or(DEFAULT_QUERY_LIMIT));
        found
    }
}

impl Default for AuditLog {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn all() -> LogQueryParams {
        LogQueryParams::default()
    }

    #[test]
    fn newest_entries_come_first() {
        let log = AuditLog::new();
        log.log("morning", LogLevel::Debug, ExecutionPhase::Claim, "claimed");
        log.log("morning", LogLevel::Info, ExecutionPhase::Dispatch, "sent");
        log.log("morning", LogLevel::Info, ExecutionPhase::Complete, "finalised");

        let entries = log.query("morning", &all());
        assert_eq!(entries.len(), 3);
        assert_eq!(entries[0].phase, ExecutionPhase::Complete);
        assert_eq!(entries[2].phase, ExecutionPhase::Claim);
    }

    #[test]
    fn level_is_a_minimum() {
        let log = AuditLog::new();
        log.log("r1", LogLevel::Debug, ExecutionPhase::CriteriaCheck, "not met");
        log.log("r1", LogLevel::Info, ExecutionPhase::Dispatch, "sent");
        log.log("r1", LogLevel::Warning, ExecutionPhase::DispatchError, "sms: 503");
        log.log("r1", LogLevel::Error, ExecutionPhase::Render, "bad template");

        let params = LogQueryParams {
            level: Some(LogLevel::Warning),
            ..all()
        };
        let entries = log.query("r1", &params);
        assert_eq!(entries.len(), 2);
        assert!(entries.iter().all(|e| e.level >= LogLevel::Warning));
    }

    #[test]
    fn filters_by_phase_and_user() {
        let log = AuditLog::new();
        log.log_for_user("r1", "ana", LogLevel::Info, ExecutionPhase::Dispatch, "sent");
        log.log_for_user("r1", "ben", LogLevel::Info, ExecutionPhase::Dispatch, "sent");
        log.log_for_user("r1", "ana", LogLevel::Info, ExecutionPhase::Complete, "done");

        let params = LogQueryParams {
            phase: Some(ExecutionPhase::Dispatch),
            user_id: Some("ana".into()),
            ..all()
        };
        let entries = log.query("r1", &params);
        assert_eq!(entries.len(), 1);
        assert_eq!(entries[0].user_id.as_deref(), Some("ana"));
    }

    #[test]
    fn since_excludes_older_entries() {
        let log = AuditLog::new();
        log.log("r1", LogLevel::Info, ExecutionPhase::Claim, "old");
        let params = LogQueryParams {
            since: Some(Utc::now() + chrono::Duration::seconds(60)),
            ..all()
        };
        assert!(log.query("r1", &params).is_empty());
    }

    #[test]
    fn cap_drops_oldest_first() {
        let log = AuditLog::with_max_entries(3);
        for i in 1..=4 {
            log.log("r1", LogLevel::Info, ExecutionPhase::Claim, format!("claim {i}"));
        }
        let entries = log.query("r1", &all());
        assert_eq!(entries.len(), 3);
        assert_eq!(entries[0].message, "claim 4");
        assert_eq!(entries[2].message, "claim 2");
    }

    #[test]
    fn limit_applies_after_filtering() {
        let log = AuditLog::new();
        for i in 0..10 {
            log.log("r1", LogLevel::Info, ExecutionPhase::Claim, format!("claim {i}"));
        }
        let params = LogQueryParams {
            limit: Some(3),
            ..all()
        };
        assert_eq!(log.query("r1", &params).len(), 3);
    }

    #[test]
    fn details_and_duration_are_kept() {
        let log = AuditLog::new();
        let details = serde_json::json!({ "channels": ["email", "sms"] });
        log.log_with_details(
            "r1",
            Some("u1"),
            LogLevel::Info,
            ExecutionPhase::Dispatch,
            "delivered",
            Some(details.clone()),
            Some(150),
        );

        let entries = log.query("r1", &all());
        assert_eq!(entries[0].details, Some(details));
        assert_eq!(entries[0].duration_ms, Some(150));
    }

    #[test]
    fn levels_parse_from_cli_names() {
        assert_eq!("warn".parse::<LogLevel>(), Ok(LogLevel::Warning));
        assert_eq!("Error".parse::<LogLevel>(), Ok(LogLevel::Error));
        assert!("loud".parse::<LogLevel>().is_err());
    }

    #[test]
    fn rules_are_isolated_but_query_all_spans_them() {
        let log = AuditLog::new();
        log.log("r1", LogLevel::Info, ExecutionPhase::Claim, "r1");
        log.log("r2", LogLevel::Error, ExecutionPhase::Render, "r2");

        assert_eq!(log.query("r1", &all()).len(), 1);
        assert!(log.query("missing", &all()).is_empty());

        let errors = log.query_all(&LogQueryParams {
            level: Some(LogLevel::Error),
            ..all()
        });
        assert_eq!(errors.len(), 1);
        assert_eq!(errors[0].rule_id, "r2");
    }
}
