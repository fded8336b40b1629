//! End-to-end scenarios over the in-memory store: day index, unlocks,
//! scheduling, reassignment and retention.

use std::io::Write;
use std::sync::Arc;
use std::time::Duration;

use chrono::{DateTime, NaiveDate, TimeZone, Utc};
use chrono_tz::Tz;
use proptest::prelude::*;

use cohort_core::activity::ActivityType;
use cohort_core::content::ContentUnlockSpec;
use cohort_core::dispatch::{DispatchKey, DispatchOutcome, LedgerEntry};
use cohort_core::seed::{load_seed, Seed};
use cohort_core::{DocumentStore, MemoryStore};
use cohort_notify::memory::MemoryNotifier;
use cohort_notify::templating::TemplateRenderer;
use cohort_notify::{Channel, Dispatcher};
use cohort_rules::activity::ActivityLedger;
use cohort_rules::membership::{AnchorPolicy, MembershipService};
use cohort_rules::retention::{Collection, PurgeRequest};
use cohort_rules::unlock::{is_unlocked, UnlockResolver};
use cohort_rules::{ClockResolver, DispatchLedger, RetentionSweeper, RuleScheduler};

const SEED: &str = r#"
adminRoster:
  version: 3
  emails: [admin@example.com]
cohorts:
  - id: spring
    name: Spring 2025
    startDate: 2025-01-06T14:00:00Z
    timezone: America/New_York
    memberIds: [ana, ben, cal]
  - id: winter
    name: Winter 2025
    startDate: 2025-01-02T14:00:00Z
    timezone: America/New_York
    memberIds: [dee]
users:
  - id: ana
    email: ana@example.com
    displayName: Ana Lima
    cohortId: spring
    notificationSettings:
      enabled: true
      timezone: America/New_York
      channels: { email: true, sms: false }
  - id: ben
    email: ben@example.com
    cohortId: spring
    notificationSettings:
      enabled: false
      timezone: America/New_York
      channels: { email: true, sms: false }
  - id: cal
    email: cal@example.com
    cohortId: spring
    notificationSettings:
      enabled: true
      timezone: America/New_York
      channels: { email: false, sms: false }
  - id: dee
    email: dee@example.com
    cohortId: winter
    programStart: 2025-01-02T14:00:00Z
rules:
  - id: morning
    name: Morning routine
    time: "09:00"
    criteria: morning_routine_incomplete
    message: Start your morning routine.
    enabled: true
  - id: checkin
    name: Daily check-in
    time: "09:00"
    criteria: always
    message: Time for your daily check-in.
    enabled: true
content:
  - id: welcome
    title: Welcome
    isActive: true
  - id: week-one
    title: Week one deep dive
    isActive: true
    isHiddenUntilUnlocked: true
    unlockDay: 3
"#;

fn utc(y: i32, m: u32, d: u32, h: u32, min: u32) -> DateTime<Utc> {
    Utc.with_ymd_and_hms(y, m, d, h, min, 0).unwrap()
}

fn store() -> Arc<MemoryStore> {
    Arc::new(MemoryStore::from_seed(Seed::from_yaml(SEED).unwrap()))
}

fn scheduler(store: &Arc<MemoryStore>, mail: &MemoryNotifier) -> RuleScheduler {
    let dispatcher = Dispatcher::new(Duration::from_secs(1)).with_notifier(Box::new(mail.clone()));
    RuleScheduler::new(
        store.clone(),
        DispatchLedger::new(store.clone(), Duration::from_secs(300)),
        Arc::new(dispatcher),
        TemplateRenderer::new("https://app.example.com"),
    )
}

async fn outcome(s: &RuleScheduler, rule: &str, user: &str, date: NaiveDate) -> Option<DispatchOutcome> {
    match s.ledger().lookup(&DispatchKey::new(rule, user, date)).await.unwrap() {
        Some(LedgerEntry::Resolved(record)) => Some(record.outcome),
        _ => None,
    }
}

#[test]
fn cohort_start_scenario_is_day_two() {
    let clock = ClockResolver::default();
    let start = utc(2025, 1, 6, 14, 0); // 09:00 in New York
    let observation = utc(2025, 1, 7, 23, 0); // 18:00 local
    assert_eq!(clock.day_index(start, "America/New_York", observation), 2);
}

#[test]
fn inactive_content_is_never_unlocked() {
    for hidden in [false, true] {
        for unlock_day in [None, Some(1), Some(3)] {
            let spec = ContentUnlockSpec {
                is_active: false,
                is_hidden_until_unlocked: hidden,
                unlock_day,
            };
            for day in -5..100 {
                assert!(!is_unlocked(&spec, Some(day)));
            }
            assert!(!is_unlocked(&spec, None));
        }
    }
}

#[tokio::test]
async fn always_rule_is_sent_or_skipped_disabled() {
    let store = store();
    let mail = MemoryNotifier::new(Channel::Email);
    let s = scheduler(&store, &mail);

    // 09:01 in New York on 2025-01-07.
    s.tick(utc(2025, 1, 7, 14, 1)).await.unwrap();

    let date = NaiveDate::from_ymd_opt(2025, 1, 7).unwrap();
    for user in ["ana", "ben", "cal", "dee"] {
        let got = outcome(&s, "checkin", user, date).await;
        assert!(
            matches!(got, Some(DispatchOutcome::Sent) | Some(DispatchOutcome::SkippedDisabled)),
            "{user}: {got:?}"
        );
    }
    assert_eq!(outcome(&s, "checkin", "ana", date).await, Some(DispatchOutcome::Sent));
    assert_eq!(outcome(&s, "checkin", "ben", date).await, Some(DispatchOutcome::SkippedDisabled));
}

#[tokio::test]
async fn rerunning_after_sent_never_dispatches_twice() {
    let store = store();
    let mail = MemoryNotifier::new(Channel::Email);
    let s = scheduler(&store, &mail);
    let now = utc(2025, 1, 7, 14, 1);

    s.tick(now).await.unwrap();
    let after_first = mail.sent().len();
    let again = s.tick(now).await.unwrap();
    s.tick(utc(2025, 1, 7, 20, 0)).await.unwrap();

    assert_eq!(again.sent, 0);
    assert_eq!(mail.sent().len(), after_first);
    // morning + checkin for ana
    assert_eq!(after_first, 2);
}

#[tokio::test]
async fn morning_routine_done_before_trigger_skips() {
    let store = store();
    store.set_progress(
        "ana",
        cohort_core::DailyProgress {
            // 08:50 local
            morning_routine_completed_at: Some(utc(2025, 1, 7, 13, 50)),
            ..Default::default()
        },
    );
    let mail = MemoryNotifier::new(Channel::Email);
    let s = scheduler(&store, &mail);

    s.tick(utc(2025, 1, 7, 14, 1)).await.unwrap();

    let date = NaiveDate::from_ymd_opt(2025, 1, 7).unwrap();
    assert_eq!(
        outcome(&s, "morning", "ana", date).await,
        Some(DispatchOutcome::SkippedCriteriaNotMet)
    );
}

#[tokio::test]
async fn reassignment_uses_new_cohort_start() {
    let store = store();
    let clock = ClockResolver::default();
    let resolver = UnlockResolver::new(clock);
    // 15:00 in New York on 2025-01-06: day 5 of winter, day 1 of spring.
    let now = utc(2025, 1, 6, 20, 0);

    assert_eq!(clock.day_for_user(store.as_ref(), "dee", now).await.unwrap(), Some(5));
    let before = resolver.content_for_user(store.as_ref(), "dee", now).await.unwrap();
    assert!(before.iter().any(|c| c.id == "week-one"));

    MembershipService::new(store.clone(), clock)
        .assign("dee", "spring", AnchorPolicy::Reset, "admin@example.com", now)
        .await
        .unwrap();

    assert_eq!(clock.day_for_user(store.as_ref(), "dee", now).await.unwrap(), Some(1));
    let after = resolver.content_for_user(store.as_ref(), "dee", now).await.unwrap();
    assert!(!after.iter().any(|c| c.id == "week-one"));
    assert!(after.iter().any(|c| c.id == "welcome"));

    let winter = store.cohort("winter").await.unwrap().unwrap();
    assert!(winter.member_ids.is_empty());
}

#[tokio::test]
async fn purge_logs_removes_only_entries_past_horizon() {
    let store = store();
    let activity = ActivityLedger::new(store.clone());
    let now = utc(2025, 3, 1, 12, 0);
    for days in [10, 29, 30, 31, 45] {
        activity
            .record(
                ActivityType::UserLogin,
                "ana@example.com",
                format!("{days} days old"),
                serde_json::Value::Null,
                now - chrono::Duration::days(days),
            )
            .await
            .unwrap();
    }

    let sweeper = RetentionSweeper::new(
        store.clone(),
        DispatchLedger::new(store.clone(), Duration::from_secs(300)),
    );
    let report = sweeper
        .purge(
            &PurgeRequest {
                collection: Collection::SystemLogs,
                older_than_days: 30,
                actor: "admin@example.com".to_string(),
                confirmed: true,
            },
            now,
        )
        .await
        .unwrap();

    assert_eq!(report.deleted, 2);
    let remaining = store.logs_since(now - chrono::Duration::days(365)).await.unwrap();
    let mut details: Vec<&str> = remaining.iter().map(|e| e.details.as_str()).collect();
    details.sort();
    assert!(details.contains(&"10 days old"));
    assert!(details.contains(&"29 days old"));
    assert!(details.contains(&"30 days old"));
    assert!(!details.contains(&"31 days old"));
    assert!(!details.contains(&"45 days old"));
    // the purge itself is logged
    assert!(remaining.iter().any(|e| e.activity_type == ActivityType::Purge));
}

#[test]
fn seed_loads_from_file() {
    let mut file = tempfile::NamedTempFile::new().unwrap();
    file.write_all(SEED.as_bytes()).unwrap();
    let seed = load_seed(file.path()).unwrap();
    assert_eq!(seed.cohorts.len(), 2);
    assert_eq!(seed.rules.len(), 2);
    assert_eq!(seed.admin_roster.map(|r| r.version), Some(3));
}

const ZONES: &[&str] = &[
    "UTC",
    "America/New_York",
    "America/Los_Angeles",
    "Europe/London",
    "Asia/Kolkata",
    "Australia/Sydney",
    "Pacific/Auckland",
];

proptest! {
    #[test]
    fn day_index_never_decreases(
        zone in 0..ZONES.len(),
        start in 1_600_000_000i64..1_800_000_000,
        a in 0i64..200 * 86_400,
        b in 0i64..200 * 86_400,
    ) {
        let clock = ClockResolver::default();
        let start = Utc.timestamp_opt(start, 0).unwrap();
        let (lo, hi) = (a.min(b), a.max(b));
        let first = clock.day_index(start, ZONES[zone], start + chrono::Duration::seconds(lo));
        let second = clock.day_index(start, ZONES[zone], start + chrono::Duration::seconds(hi));
        prop_assert!(first <= second);
    }

    #[test]
    fn day_index_steps_by_one_at_local_midnight(
        zone in 0..ZONES.len(),
        start in 1_600_000_000i64..1_800_000_000,
        offset_days in 1i64..400,
    ) {
        let clock = ClockResolver::default();
        let tz: Tz = ZONES[zone].parse().unwrap();
        let start = Utc.timestamp_opt(start, 0).unwrap();
        let day = start.with_timezone(&tz).date_naive() + chrono::Duration::days(offset_days);
        let midnight = tz.from_local_datetime(&day.and_hms_opt(0, 0, 0).unwrap()).single();
        prop_assume!(midnight.is_some());
        let midnight = midnight.unwrap().with_timezone(&Utc);

        let before = clock.day_index(start, ZONES[zone], midnight - chrono::Duration::seconds(1));
        let after = clock.day_index(start, ZONES[zone], midnight);
        prop_assert_eq!(after - before, 1);
        prop_assert_eq!(after, offset_days + 1);
    }
}
