//! Cohort-relative scheduling and notification rules.
//!
//! This crate provides:
//! - Day-index resolution against a cohort's start instant and timezone
//! - Content unlock gating by program day
//! - Completion criteria for daily reminder rules
//! - A tick-driven rule scheduler backed by an idempotent dispatch ledger
//! - Cohort membership changes, activity logging and retention purges

pub mod activity;
pub mod admin;
pub mod audit_log;
pub mod clock;
pub mod criteria;
pub mod ledger;
pub mod membership;
pub mod retention;
pub mod scheduler;
pub mod unlock;
pub mod validation;

pub use clock::{Clock, ClockResolver, FixedClock, SystemClock};
pub use ledger::DispatchLedger;
pub use retention::RetentionSweeper;
pub use scheduler::RuleScheduler;
