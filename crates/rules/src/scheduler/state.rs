//! Evaluation state of one (rule, user, local date) key, and tick totals.

use chrono::NaiveTime;
use serde::Serialize;

use cohort_core::dispatch::DispatchOutcome;

use super::trigger::TriggerTime;

/// `NotYetDue -> Due -> {Sent | SkippedCriteriaNotMet | SkippedDisabled | Error}`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum EvaluationState {
    NotYetDue,
    Due,
    Sent,
    SkippedCriteriaNotMet,
    SkippedDisabled,
    Error,
}

impl EvaluationState {
    /// Where a key stands given the local time and any finalised outcome.
    pub fn observe(trigger: TriggerTime, local: NaiveTime, resolved: Option<DispatchOutcome>) -> Self {
        match resolved {
            Some(outcome) => Self::from(outcome),
            None if trigger.is_due(local) => EvaluationState::Due,
            None => EvaluationState::NotYetDue,
        }
    }

    pub fn is_terminal(&self) -> bool {
        !matches!(self, EvaluationState::NotYetDue | EvaluationState::Due)
    }
}

impl From<DispatchOutcome> for EvaluationState {
    fn from(outcome: DispatchOutcome) -> Self {
        match outcome {
            DispatchOutcome::Sent => EvaluationState::Sent,
            DispatchOutcome::SkippedCriteriaNotMet => EvaluationState::SkippedCriteriaNotMet,
            DispatchOutcome::SkippedDisabled => EvaluationState::SkippedDisabled,
            DispatchOutcome::Error => EvaluationState::Error,
        }
    }
}

/// Totals for one scheduler tick.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct TickReport {
    pub rules: usize,
    pub invalid_rules: usize,
    pub users: usize,
    pub not_yet_due: usize,
    /// Keys another evaluation currently holds.
    pub held: usize,
    /// Keys already finalised earlier today.
    pub already_resolved: usize,
    pub sent: usize,
    pub skipped_criteria_not_met: usize,
    pub skipped_disabled: usize,
    pub errors: usize,
}

impl TickReport {
    pub(crate) fn record(&mut self, outcome: DispatchOutcome) {
        match outcome {
            DispatchOutcome::Sent => self.sent += 1,
            DispatchOutcome::SkippedCriteriaNotMet => self.skipped_criteria_not_met += 1,
            DispatchOutcome::SkippedDisabled => self.skipped_disabled += 1,
            DispatchOutcome::Error => self.errors += 1,
        }
    }

    /// Keys finalised by this tick.
    pub fn finalised(&self) -> usize {
        self.sent + self.skipped_criteria_not_met + self.skipped_disabled + self.errors
    }
}
