//! Completion criteria a notification rule can be gated on.

use std::fmt;
use std::str::FromStr;

use chrono::{DateTime, NaiveDate, Utc};
use chrono_tz::Tz;
use serde::Serialize;

use cohort_core::DailyProgress;

/// Canonical criterion keys, used for validation suggestions.
pub const CRITERION_KEYS: &[&str] = &[
    "morning_routine_incomplete",
    "daily_action_incomplete",
    "evening_routine_incomplete",
    "always",
];

/// Older keys still present in stored rules.
const LEGACY_ALIASES: &[(&str, Criterion)] = &[
    ("am_bookend_incomplete", Criterion::MorningRoutineIncomplete),
    ("pm_bookend_incomplete", Criterion::EveningRoutineIncomplete),
];

/// Whether `key` is an older spelling that still parses.
pub fn is_legacy_key(key: &str) -> bool {
    let key = key.trim();
    LEGACY_ALIASES.iter().any(|(alias, _)| *alias == key)
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum Criterion {
    MorningRoutineIncomplete,
    DailyActionIncomplete,
    EveningRoutineIncomplete,
    Always,
}

impl Criterion {
    pub fn as_str(&self) -> &'static str {
        match self {
            Criterion::MorningRoutineIncomplete => "morning_routine_incomplete",
            Criterion::DailyActionIncomplete => "daily_action_incomplete",
            Criterion::EveningRoutineIncomplete => "evening_routine_incomplete",
            Criterion::Always => "always",
        }
    }

    /// Whether evaluating this criterion needs the user's progress document.
    pub fn needs_progress(&self) -> bool {
        !matches!(self, Criterion::Always)
    }
}

impl fmt::Display for Criterion {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct UnknownCriterion(pub String);

impl fmt::Display for UnknownCriterion {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "unknown criterion '{}'", self.0)
    }
}

impl std::error::Error for UnknownCriterion {}

impl FromStr for Criterion {
    type Err = UnknownCriterion;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let key = s.trim();
        match key {
            "morning_routine_incomplete" => Ok(Criterion::MorningRoutineIncomplete),
            "daily_action_incomplete" => Ok(Criterion::DailyActionIncomplete),
            "evening_routine_incomplete" => Ok(Criterion::EveningRoutineIncomplete),
            "always" => Ok(Criterion::Always),
            other => LEGACY_ALIASES
                .iter()
                .find(|(alias, _)| *alias == other)
                .map(|(_, c)| *c)
                .ok_or_else(|| UnknownCriterion(other.to_string())),
        }
    }
}

/// What the user has completed on the current local day.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct DailySnapshot {
    pub morning_routine_done: bool,
    pub daily_action_done: bool,
    pub evening_routine_done: bool,
}

impl DailySnapshot {
    /// Build a snapshot for `today` in `tz`. A completion instant counts only
    /// when it falls on `today` locally; yesterday's completions are stale.
    pub fn from_progress(progress: Option<&DailyProgress>, tz: Tz, today: NaiveDate) -> Self {
        let Some(p) = progress else {
            return Self::default();
        };
        let on_today = |at: Option<DateTime<Utc>>| {
            at.is_some_and(|at| at.with_timezone(&tz).date_naive() == today)
        };
        Self {
            morning_routine_done: on_today(p.morning_routine_completed_at),
            daily_action_done: on_today(p.daily_action_completed_at),
            evening_routine_done: on_today(p.evening_routine_completed_at),
        }
    }
}

/// Whether `criterion` holds for `snapshot`.
pub fn satisfied(criterion: Criterion, snapshot: &DailySnapshot) -> bool {
    match criterion {
        Criterion::Always => true,
        Criterion::MorningRoutineIncomplete => !snapshot.morning_routine_done,
        Criterion::DailyActionIncomplete => !snapshot.daily_action_done,
        Criterion::EveningRoutineIncomplete => !snapshot.evening_routine_done,
    }
}
