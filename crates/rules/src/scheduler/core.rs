//! [`RuleScheduler`]: drives one evaluation per (rule, user) per tick.

use std::collections::HashMap;
use std::future::Future;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;

use chrono::{DateTime, NaiveDate, Utc};
use chrono_tz::Tz;
use tokio::sync::Semaphore;
use tokio::task::JoinSet;
use tokio::time::{Instant, MissedTickBehavior};
use tracing::{debug, error, info, warn};

use cohort_core::activity::ActivityType;
use cohort_core::config::Config;
use cohort_core::dispatch::{ChannelOutcome, ClaimOutcome, DispatchKey, DispatchOutcome};
use cohort_core::{Cohort, DocumentStore, EngineError, LedgerStore, Result, UserRecord};
use cohort_notify::templating::{
    MessageContext, MessageTemplate, RuleContext, TemplateRenderer, UserContext,
};
use cohort_notify::{Channel, Delivery, Destination, Dispatcher};

use crate::activity::ActivityLedger;
use crate::audit_log::{AuditLog, ExecutionPhase, LogLevel};
use crate::clock::{Clock, ClockResolver};
use crate::criteria::{satisfied, DailySnapshot};
use crate::ledger::DispatchLedger;

use super::entry::CompiledRule;
use super::state::{EvaluationState, TickReport};

const DEFAULT_CONCURRENCY: usize = 16;

/// Evaluates notification rules against users on a fixed tick.
///
/// Call [`tick`](RuleScheduler::tick) with the current instant, or
/// [`run_until`](RuleScheduler::run_until) to drive ticks on an interval.
pub struct RuleScheduler {
    docs: Arc<dyn DocumentStore>,
    ledger: DispatchLedger,
    dispatcher: Arc<Dispatcher>,
    renderer: TemplateRenderer,
    clock: ClockResolver,
    audit: AuditLog,
    activity: ActivityLedger,
    concurrency: usize,
}

/// Everything a spawned evaluation needs, shared across one tick's tasks.
struct Evaluator {
    docs: Arc<dyn DocumentStore>,
    ledger: DispatchLedger,
    dispatcher: Arc<Dispatcher>,
    renderer: TemplateRenderer,
    clock: ClockResolver,
    audit: AuditLog,
    activity: ActivityLedger,
    /// Set when a ledger call fails; no new keys are claimed after that.
    ledger_failed: AtomicBool,
}

struct Job {
    rule: CompiledRule,
    user: Arc<UserRecord>,
    cohort: Option<Arc<Cohort>>,
    tz: Tz,
    date: NaiveDate,
}

/// Wall time inside a tick: the tick's instant plus the time spent since the
/// tick began. Claims and finalisations are stamped with it.
#[derive(Debug, Clone, Copy)]
struct TickTime {
    at: DateTime<Utc>,
    started: Instant,
}

impl TickTime {
    fn now(&self) -> DateTime<Utc> {
        let elapsed = chrono::Duration::from_std(self.started.elapsed())
            .unwrap_or_else(|_| chrono::Duration::zero());
        self.at + elapsed
    }
}

enum JobResult {
    Finished(DispatchOutcome),
    Held,
    AlreadyResolved,
    LedgerFailure,
}

/// Deliveries for one user, plus channels that had nowhere to go.
#[derive(Debug, Default)]
struct DeliveryPlan {
    deliveries: Vec<Delivery>,
    unreachable: Vec<ChannelOutcome>,
    subject_prefix: Option<String>,
    /// Test user with no override recipient: nothing may be sent.
    suppressed: bool,
}

impl DeliveryPlan {
    fn for_user(user: &UserRecord) -> Self {
        let settings = &user.notification_settings;
        let mut enabled = Vec::with_capacity(2);
        if settings.channels.email {
            enabled.push(Channel::Email);
        }
        if settings.channels.sms {
            enabled.push(Channel::Sms);
        }

        let mut plan = DeliveryPlan::default();
        if user.is_test_user {
            let original = user.email.as_deref().unwrap_or(&user.id);
            match user
                .test_notification_recipient
                .as_deref()
                .map(str::trim)
                .filter(|r| !r.is_empty())
            {
                Some(recipient) => {
                    // Every channel collapses onto the override mailbox.
                    plan.deliveries.push(Delivery {
                        channel: Channel::Email,
                        destination: Destination::Email(recipient.to_string()),
                    });
                    plan.subject_prefix = Some(format!("[TEST for {original}] "));
                }
                None => {
                    plan.suppressed = true;
                    plan.unreachable = enabled
                        .iter()
                        .map(|c| ChannelOutcome {
                            channel: c.as_str().to_string(),
                            destination: None,
                            success: false,
                            error: None,
                        })
                        .collect();
                }
            }
            return plan;
        }

        for channel in enabled {
            let destination = match channel {
                Channel::Email => user.email.clone().map(Destination::Email),
                Channel::Sms => settings.phone_number.clone().map(Destination::Phone),
            };
            match destination.filter(|d| !d.address().trim().is_empty()) {
                Some(destination) => plan.deliveries.push(Delivery {
                    channel,
                    destination,
                }),
                None => plan.unreachable.push(ChannelOutcome {
                    channel: channel.as_str().to_string(),
                    destination: None,
                    success: false,
                    error: Some(format!("no {channel} destination on file")),
                }),
            }
        }
        plan
    }
}

impl RuleScheduler {
    pub fn new(
        docs: Arc<dyn DocumentStore>,
        ledger: DispatchLedger,
        dispatcher: Arc<Dispatcher>,
        renderer: TemplateRenderer,
    ) -> Self {
        let activity = ActivityLedger::new(docs.clone());
        Self {
            docs,
            ledger,
            dispatcher,
            renderer,
            clock: ClockResolver::default(),
            audit: AuditLog::new(),
            activity,
            concurrency: DEFAULT_CONCURRENCY,
        }
    }

    /// Build a scheduler with grace window, concurrency, default timezone and
    /// link base URL taken from `config`.
    pub fn from_config(
        docs: Arc<dyn DocumentStore>,
        ledger_store: Arc<dyn LedgerStore>,
        dispatcher: Arc<Dispatcher>,
        config: &Config,
    ) -> Self {
        let ledger = DispatchLedger::new(ledger_store, config.scheduler.claim_grace());
        Self::new(docs, ledger, dispatcher, TemplateRenderer::new(&config.app.base_url))
            .with_clock(ClockResolver::from_config(&config.scheduler))
            .with_concurrency(config.scheduler.concurrency)
    }

    pub fn with_clock(mut self, clock: ClockResolver) -> Self {
        self.clock = clock;
        self
    }

    pub fn with_concurrency(mut self, concurrency: usize) -> Self {
        self.concurrency = concurrency.max(1);
        self
    }

    pub fn with_audit_log(mut self, audit: AuditLog) -> Self {
        self.audit = audit;
        self
    }

    pub fn audit_log(&self) -> &AuditLog {
        &self.audit
    }

    pub fn ledger(&self) -> &DispatchLedger {
        &self.ledger
    }

    fn evaluator(&self) -> Arc<Evaluator> {
        Arc::new(Evaluator {
            docs: self.docs.clone(),
            ledger: self.ledger.clone(),
            dispatcher: self.dispatcher.clone(),
            renderer: self.renderer.clone(),
            clock: self.clock,
            audit: self.audit.clone(),
            activity: self.activity.clone(),
            ledger_failed: AtomicBool::new(false),
        })
    }

    /// Load and parse the current rule set. Rules that fail to parse are
    /// logged and left out.
    async fn compile_rules(&self, report: &mut TickReport) -> Result<Vec<CompiledRule>> {
        let rules = self.docs.notification_rules().await?;
        let mut compiled = Vec::with_capacity(rules.len());
        for rule in rules {
            let rule_id = rule.id.clone();
            match CompiledRule::compile(rule) {
                Ok(c) => compiled.push(c),
                Err(e) => {
                    report.invalid_rules += 1;
                    warn!(rule_id = %rule_id, error = %e, "skipping invalid rule");
                    self.audit
                        .log(&rule_id, LogLevel::Error, ExecutionPhase::ScheduleCheck, e);
                }
            }
        }
        report.rules = compiled.len();
        Ok(compiled)
    }

    async fn load_cohorts(&self, users: &[Arc<UserRecord>]) -> Result<HashMap<String, Arc<Cohort>>> {
        let mut cohorts = HashMap::new();
        for id in users.iter().filter_map(|u| u.cohort_id.as_deref()) {
            if cohorts.contains_key(id) {
                continue;
            }
            match self.docs.cohort(id).await? {
                Some(cohort) => {
                    cohorts.insert(id.to_string(), Arc::new(cohort));
                }
                None => warn!(cohort_id = id, "users reference a missing cohort"),
            }
        }
        Ok(cohorts)
    }

    /// Run one tick at `now`.
    ///
    /// Fails before claiming anything when the ledger is unreachable. If the
    /// ledger fails mid-tick, in-flight evaluations finish, nothing new is
    /// claimed, and the tick returns an error.
    pub async fn tick(&self, now: DateTime<Utc>) -> Result<TickReport> {
        let started = Instant::now();
        if let Err(e) = self.ledger.health_check().await {
            error!(error = %e, "dispatch ledger unavailable, tick aborted");
            return Err(e);
        }

        let mut report = TickReport::default();
        let rules = self.compile_rules(&mut report).await?;
        let users: Vec<Arc<UserRecord>> = self
            .docs
            .users()
            .await?
            .into_iter()
            .filter(|u| !u.disabled)
            .map(Arc::new)
            .collect();
        report.users = users.len();
        let cohorts = self.load_cohorts(&users).await?;

        let time = TickTime { at: now, started };
        let evaluator = self.evaluator();
        let semaphore = Arc::new(Semaphore::new(self.concurrency));
        let mut tasks = JoinSet::new();

        'users: for user in &users {
            let tz = self.clock.timezone(user.notification_settings.timezone.as_deref());
            let local_time = self.clock.local_time(now, tz);
            let date = self.clock.local_date(now, tz);
            let cohort = user.cohort_id.as_ref().and_then(|id| cohorts.get(id).cloned());

            for rule in &rules {
                if EvaluationState::observe(rule.trigger, local_time, None) == EvaluationState::NotYetDue {
                    report.not_yet_due += 1;
                    continue;
                }

                let permit = semaphore
                    .clone()
                    .acquire_owned()
                    .await
                    .map_err(|e| EngineError::Store(e.to_string()))?;
                if evaluator.ledger_failed.load(Ordering::SeqCst) {
                    break 'users;
                }

                let job = Job {
                    rule: rule.clone(),
                    user: user.clone(),
                    cohort: cohort.clone(),
                    tz,
                    date,
                };
                let evaluator = evaluator.clone();
                tasks.spawn(async move {
                    let _permit = permit;
                    evaluator.evaluate(job, now, time).await
                });
            }
        }

        while let Some(joined) = tasks.join_next().await {
            match joined {
                Ok(JobResult::Finished(outcome)) => report.record(outcome),
                Ok(JobResult::Held) => report.held += 1,
                Ok(JobResult::AlreadyResolved) => report.already_resolved += 1,
                Ok(JobResult::LedgerFailure) => {}
                Err(e) => error!(error = %e, "evaluation task failed"),
            }
        }

        info!(
            rules = report.rules,
            users = report.users,
            sent = report.sent,
            skipped_criteria = report.skipped_criteria_not_met,
            skipped_disabled = report.skipped_disabled,
            errors = report.errors,
            held = report.held,
            duration_ms = started.elapsed().as_millis() as u64,
            "tick complete"
        );

        if evaluator.ledger_failed.load(Ordering::SeqCst) {
            return Err(EngineError::Store(
                "dispatch ledger failed during tick; unclaimed keys left for the next tick"
                    .to_string(),
            ));
        }
        Ok(report)
    }

    /// Tick every `every` until `shutdown` resolves. A tick in progress when
    /// shutdown fires is allowed to finish. Missed intervals are skipped.
    pub async fn run_until<F>(&self, clock: &dyn Clock, every: Duration, shutdown: F)
    where
        F: Future<Output = ()>,
    {
        let mut interval = tokio::time::interval(every);
        interval.set_missed_tick_behavior(MissedTickBehavior::Skip);
        tokio::pin!(shutdown);

        loop {
            tokio::select! {
                _ = interval.tick() => {
                    if let Err(e) = self.tick(clock.now()).await {
                        error!(error = %e, "scheduler tick failed");
                    }
                }
                _ = &mut shutdown => {
                    info!("scheduler shutting down");
                    break;
                }
            }
        }
    }
}

impl Evaluator {
    async fn evaluate(&self, job: Job, now: DateTime<Utc>, time: TickTime) -> JobResult {
        let rule_id = job.rule.id();
        let user_id = job.user.id.as_str();
        let key = DispatchKey::new(rule_id, user_id, job.date);

        if self.ledger_failed.load(Ordering::SeqCst) {
            return JobResult::LedgerFailure;
        }
        match self.ledger.try_claim(&key, time.now()).await {
            Ok(ClaimOutcome::Held { .. }) => return JobResult::Held,
            Ok(ClaimOutcome::Resolved(_)) => return JobResult::AlreadyResolved,
            Ok(_) => {}
            Err(e) => {
                self.ledger_failed.store(true, Ordering::SeqCst);
                error!(key = %key, error = %e, "ledger claim failed, halting new claims");
                self.audit.log_for_user(
                    rule_id,
                    user_id,
                    LogLevel::Error,
                    ExecutionPhase::Claim,
                    format!("claim failed: {e}"),
                );
                return JobResult::LedgerFailure;
            }
        }
        self.audit
            .log_for_user(rule_id, user_id, LogLevel::Debug, ExecutionPhase::Claim, format!("claimed {key}"));

        let (outcome, channels, detail) = self.decide_and_send(&job, now).await;

        if let Err(e) = self
            .ledger
            .record(key.clone(), outcome, channels, detail.clone(), time.now())
            .await
        {
            if let EngineError::Conflict(msg) = &e {
                warn!(key = %key, error = %msg, "key finalised elsewhere");
                return JobResult::AlreadyResolved;
            }
            self.ledger_failed.store(true, Ordering::SeqCst);
            error!(key = %key, error = %e, "ledger finalise failed, halting new claims");
            return JobResult::LedgerFailure;
        }

        let level = if outcome == DispatchOutcome::Error {
            LogLevel::Warning
        } else {
            LogLevel::Info
        };
        self.audit.log_with_details(
            rule_id,
            Some(user_id),
            level,
            ExecutionPhase::Complete,
            format!("{key} finalised as {outcome}"),
            detail.map(serde_json::Value::String),
            None,
        );

        if outcome == DispatchOutcome::Sent {
            let entry = cohort_core::activity::ActivityLogEntry {
                id: String::new(),
                activity_type: ActivityType::NotificationSent,
                action: ActivityType::NotificationSent.label().to_string(),
                details: job.rule.rule.name.clone(),
                user: crate::activity::SYSTEM_ACTOR.to_string(),
                user_id: Some(user_id.to_string()),
                target_user: job.user.email.clone(),
                metadata: serde_json::json!({ "ruleId": rule_id, "date": job.date.to_string() }),
                timestamp: now,
            };
            if let Err(e) = self.activity.append(entry).await {
                warn!(key = %key, error = %e, "failed to log sent notification");
            }
        }

        JobResult::Finished(outcome)
    }

    /// Decide the outcome for a claimed key, sending when it is `Sent`.
    async fn decide_and_send(
        &self,
        job: &Job,
        now: DateTime<Utc>,
    ) -> (DispatchOutcome, Vec<ChannelOutcome>, Option<String>) {
        let rule = &job.rule.rule;
        let user = &job.user;

        if !rule.enabled {
            return (DispatchOutcome::SkippedDisabled, vec![], Some("rule disabled".to_string()));
        }
        if !user.accepts_notifications() {
            return (
                DispatchOutcome::SkippedDisabled,
                vec![],
                Some("notifications disabled for user".to_string()),
            );
        }

        if job.rule.criterion.needs_progress() {
            let progress = match self.docs.daily_progress(&user.id).await {
                Ok(p) => p,
                Err(e) => {
                    return (
                        DispatchOutcome::Error,
                        vec![],
                        Some(format!("progress lookup failed: {e}")),
                    )
                }
            };
            let snapshot = DailySnapshot::from_progress(progress.as_ref(), job.tz, job.date);
            if !satisfied(job.rule.criterion, &snapshot) {
                self.audit.log_for_user(
                    &rule.id,
                    &user.id,
                    LogLevel::Debug,
                    ExecutionPhase::CriteriaCheck,
                    format!("{} not met", job.rule.criterion),
                );
                return (DispatchOutcome::SkippedCriteriaNotMet, vec![], None);
            }
        }

        let plan = DeliveryPlan::for_user(user);
        if plan.suppressed {
            debug!(user_id = %user.id, "test user without override recipient, not sending");
            return (
                DispatchOutcome::SkippedDisabled,
                plan.unreachable,
                Some("test user has no override recipient".to_string()),
            );
        }
        if plan.deliveries.is_empty() {
            return (
                DispatchOutcome::Error,
                plan.unreachable,
                Some("no deliverable destination".to_string()),
            );
        }

        let ctx = MessageContext {
            user: UserContext {
                display_name: user.display_name.clone().unwrap_or_default(),
                email: user.email.clone().unwrap_or_default(),
            },
            rule: RuleContext {
                id: rule.id.clone(),
                name: rule.name.clone(),
            },
            day: self.clock.user_day_index(user, job.cohort.as_deref(), now),
            date: job.date.to_string(),
        };
        let template = MessageTemplate {
            subject: &rule.name,
            message: &rule.message,
            link_text: rule.link_text.as_deref(),
            link_url: rule.link_url.as_deref(),
        };
        let mut notification = match self.renderer.compose(&template, &ctx) {
            Ok(n) => n,
            Err(e) => {
                self.audit.log_for_user(
                    &rule.id,
                    &user.id,
                    LogLevel::Error,
                    ExecutionPhase::Render,
                    e.to_string(),
                );
                return (DispatchOutcome::Error, plan.unreachable, Some(e.to_string()));
            }
        };
        if let Some(prefix) = &plan.subject_prefix {
            notification.subject = format!("{prefix}{}", notification.subject);
        }
        notification
            .metadata
            .insert("user_id".to_string(), user.id.clone());

        let results = self.dispatcher.dispatch(&plan.deliveries, &notification).await;
        let mut channels: Vec<ChannelOutcome> = Vec::with_capacity(results.len() + plan.unreachable.len());
        let mut failures = Vec::new();
        for result in &results {
            if let Some(err) = &result.error {
                self.audit.log_for_user(
                    &rule.id,
                    &user.id,
                    LogLevel::Warning,
                    ExecutionPhase::DispatchError,
                    format!("{}: {err}", result.channel),
                );
                failures.push(format!("{}: {err}", result.channel));
            }
            channels.push(ChannelOutcome {
                channel: result.channel.as_str().to_string(),
                destination: Some(result.destination.clone()),
                success: result.success,
                error: result.error.clone(),
            });
        }
        channels.extend(plan.unreachable);

        if results.iter().any(|r| r.success) {
            self.audit.log_for_user(
                &rule.id,
                &user.id,
                LogLevel::Info,
                ExecutionPhase::Dispatch,
                format!("delivered on {} channel(s)", results.iter().filter(|r| r.success).count()),
            );
            (DispatchOutcome::Sent, channels, None)
        } else {
            (DispatchOutcome::Error, channels, Some(failures.join("; ")))
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn user() -> UserRecord {
        let mut u = UserRecord {
            id: "u1".into(),
            email: Some("u1@example.com".into()),
            display_name: None,
            cohort_id: None,
            program_start: None,
            notification_settings: Default::default(),
            is_test_user: false,
            test_notification_recipient: None,
            disabled: false,
        };
        u.notification_settings.enabled = true;
        u.notification_settings.channels.email = true;
        u.notification_settings.channels.sms = true;
        u
    }

    #[test]
    fn plan_marks_missing_phone_unreachable() {
        let plan = DeliveryPlan::for_user(&user());
        assert_eq!(plan.deliveries.len(), 1);
        assert_eq!(plan.unreachable.len(), 1);
        assert_eq!(plan.unreachable[0].channel, "sms");
        assert!(plan.unreachable[0].error.is_some());
    }

    #[test]
    fn test_user_collapses_onto_override() {
        let mut u = user();
        u.is_test_user = true;
        u.test_notification_recipient = Some("qa@example.com".into());
        u.notification_settings.phone_number = Some("+15550100".into());
        let plan = DeliveryPlan::for_user(&u);
        assert_eq!(
            plan.deliveries,
            vec![Delivery {
                channel: Channel::Email,
                destination: Destination::Email("qa@example.com".into()),
            }]
        );
        assert_eq!(plan.subject_prefix.as_deref(), Some("[TEST for u1@example.com] "));
    }

    #[test]
    fn test_user_without_override_is_suppressed() {
        let mut u = user();
        u.is_test_user = true;
        let plan = DeliveryPlan::for_user(&u);
        assert!(plan.suppressed);
        assert!(plan.deliveries.is_empty());
        assert!(plan.unreachable.iter().all(|c| c.error.is_none() && !c.success));
    }
}
