//! Converts instants into local dates, local times and program day indices.
//!
//! Every conversion goes through an explicit IANA zone. An empty or unknown
//! zone name resolves to the configured default zone with a warning; the
//! host's local time is never consulted.

use std::sync::{Arc, Mutex};

use chrono::{DateTime, NaiveDate, NaiveTime, Utc};
use chrono_tz::Tz;

use cohort_core::config::SchedulerConfig;
use cohort_core::{Cohort, DocumentStore, Result, UserRecord};

/// Source of "now" for the scheduler and the read paths.
pub trait Clock: Send + Sync {
    fn now(&self) -> DateTime<Utc>;
}

/// Real system clock
#[derive(Debug, Clone, Copy, Default)]
pub struct SystemClock;

impl Clock for SystemClock {
    fn now(&self) -> DateTime<Utc> {
        Utc::now()
    }
}

/// Clock pinned to a settable instant, for tests and replays.
#[derive(Debug, Clone)]
pub struct FixedClock {
    current: Arc<Mutex<DateTime<Utc>>>,
}

impl FixedClock {
    pub fn new(at: DateTime<Utc>) -> Self {
        Self {
            current: Arc::new(Mutex::new(at)),
        }
    }

    pub fn set(&self, at: DateTime<Utc>) {
        *self.current.lock().unwrap_or_else(|e| e.into_inner()) = at;
    }

    pub fn advance(&self, by: chrono::Duration) {
        let mut current = self.current.lock().unwrap_or_else(|e| e.into_inner());
        *current += by;
    }
}

impl Clock for FixedClock {
    fn now(&self) -> DateTime<Utc> {
        *self.current.lock().unwrap_or_else(|e| e.into_inner())
    }
}

/// Parse an IANA zone name, falling back to `fallback` with a warning when it
/// is empty or unknown.
pub fn resolve_timezone(name: &str, fallback: Tz) -> Tz {
    let trimmed = name.trim();
    if trimmed.is_empty() {
        tracing::warn!(fallback = %fallback, "missing timezone, using fallback");
        return fallback;
    }
    match trimmed.parse::<Tz>() {
        Ok(tz) => tz,
        Err(_) => {
            tracing::warn!(timezone = %trimmed, fallback = %fallback, "unknown timezone, using fallback");
            fallback
        }
    }
}

/// Day-number arithmetic in explicit timezones.
#[derive(Debug, Clone, Copy)]
pub struct ClockResolver {
    default_tz: Tz,
}

impl ClockResolver {
    pub fn new(default_tz: Tz) -> Self {
        Self { default_tz }
    }

    pub fn from_config(config: &SchedulerConfig) -> Self {
        Self::new(resolve_timezone(&config.default_timezone, Tz::UTC))
    }

    pub fn default_timezone(&self) -> Tz {
        self.default_tz
    }

    /// Resolve an optional zone name against the default zone. An unset or
    /// blank name is the default without a warning.
    pub fn timezone(&self, name: Option<&str>) -> Tz {
        name.map(str::trim)
            .filter(|n| !n.is_empty())
            .map_or(self.default_tz, |n| resolve_timezone(n, self.default_tz))
    }

    pub fn local_date(&self, instant: DateTime<Utc>, tz: Tz) -> NaiveDate {
        instant.with_timezone(&tz).date_naive()
    }

    pub fn local_time(&self, instant: DateTime<Utc>, tz: Tz) -> NaiveTime {
        instant.with_timezone(&tz).time()
    }

    /// Program day of `observation` for a program started at `start`, both
    /// taken as calendar dates in `timezone`. Day 1 is the start date.
    pub fn day_index(&self, start: DateTime<Utc>, timezone: &str, observation: DateTime<Utc>) -> i64 {
        let tz = resolve_timezone(timezone, self.default_tz);
        let start_date = self.local_date(start, tz);
        let today = self.local_date(observation, tz);
        (today - start_date).num_days() + 1
    }

    /// Day index for a user in `cohort`, or `None` while the user has no
    /// cohort, the cohort is not theirs, or there is no anchor to count from.
    pub fn user_day_index(
        &self,
        user: &UserRecord,
        cohort: Option<&Cohort>,
        observation: DateTime<Utc>,
    ) -> Option<i64> {
        let cohort_id = user.cohort_id.as_deref()?;
        let cohort = cohort.filter(|c| c.id == cohort_id)?;
        let anchor = user.program_start.or(cohort.start_date)?;
        Some(self.day_index(anchor, &cohort.timezone, observation))
    }

    /// Look up a user and their cohort and compute the day index.
    pub async fn day_for_user(
        &self,
        store: &dyn DocumentStore,
        user_id: &str,
        observation: DateTime<Utc>,
    ) -> Result<Option<i64>> {
        let Some(user) = store.user(user_id).await? else {
            return Err(cohort_core::EngineError::not_found("users", user_id));
        };
        let cohort = match user.cohort_id.as_deref() {
            Some(id) => {
                let cohort = store.cohort(id).await?;
                if cohort.is_none() {
                    tracing::warn!(user_id, cohort_id = id, "user references a missing cohort");
                }
                cohort
            }
            None => None,
        };
        Ok(self.user_day_index(&user, cohort.as_ref(), observation))
    }
}

impl Default for ClockResolver {
    fn default() -> Self {
        Self::new(Tz::UTC)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    fn utc(y: i32, m: u32, d: u32, h: u32, min: u32) -> DateTime<Utc> {
        Utc.with_ymd_and_hms(y, m, d, h, min, 0).unwrap()
    }

    #[test]
    fn start_date_is_day_one() {
        let clock = ClockResolver::default();
        let start = utc(2025, 1, 6, 14, 0);
        assert_eq!(clock.day_index(start, "America/New_York", start), 1);
        assert_eq!(clock.day_index(start, "America/New_York", utc(2025, 1, 7, 14, 0)), 2);
    }

    #[test]
    fn before_start_is_zero_or_negative() {
        let clock = ClockResolver::default();
        let start = utc(2025, 1, 6, 14, 0);
        assert_eq!(clock.day_index(start, "UTC", utc(2025, 1, 5, 12, 0)), 0);
        assert_eq!(clock.day_index(start, "UTC", utc(2025, 1, 1, 12, 0)), -4);
    }

    #[test]
    fn day_boundary_follows_cohort_zone() {
        let clock = ClockResolver::default();
        // 2025-01-06 09:00 in New York.
        let start = utc(2025, 1, 6, 14, 0);
        // 2025-01-07 03:00 UTC is still the 6th in New York.
        assert_eq!(clock.day_index(start, "America/New_York", utc(2025, 1, 7, 3, 0)), 1);
        assert_eq!(clock.day_index(start, "UTC", utc(2025, 1, 7, 3, 0)), 2);
    }

    #[test]
    fn dst_transition_does_not_skip_days() {
        let clock = ClockResolver::default();
        let start = utc(2025, 3, 8, 17, 0);
        // Spring-forward night in New York: 2025-03-09.
        assert_eq!(clock.day_index(start, "America/New_York", utc(2025, 3, 9, 16, 0)), 2);
        assert_eq!(clock.day_index(start, "America/New_York", utc(2025, 3, 10, 16, 0)), 3);
    }

    #[test]
    fn invalid_zone_falls_back_to_default() {
        let clock = ClockResolver::new(Tz::UTC);
        let start = utc(2025, 1, 6, 14, 0);
        assert_eq!(
            clock.day_index(start, "Mars/Olympus", utc(2025, 1, 7, 3, 0)),
            clock.day_index(start, "UTC", utc(2025, 1, 7, 3, 0))
        );
        assert_eq!(clock.timezone(Some("")), Tz::UTC);
        assert_eq!(clock.timezone(None), Tz::UTC);
    }

    /// Runs `f` with warnings captured as plain text.
    fn captured_warnings(f: impl FnOnce()) -> String {
        let buf = Arc::new(Mutex::new(Vec::new()));
        let writer = buf.clone();
        let subscriber = tracing_subscriber::fmt()
            .with_ansi(false)
            .with_max_level(tracing::Level::WARN)
            .with_writer(move || Capture(writer.clone()))
            .finish();
        tracing::subscriber::with_default(subscriber, f);
        let bytes = buf.lock().unwrap().clone();
        String::from_utf8(bytes).unwrap()
    }

    struct Capture(Arc<Mutex<Vec<u8>>>);

    impl std::io::Write for Capture {
        fn write(&mut self, data: &[u8]) -> std::io::Result<usize> {
            self.0.lock().unwrap().extend_from_slice(data);
            Ok(data.len())
        }
        fn flush(&mut self) -> std::io::Result<()> {
            Ok(())
        }
    }

    #[test]
    fn empty_cohort_zone_falls_back_with_warning() {
        let clock = ClockResolver::new(chrono_tz::America::New_York);
        let start = utc(2025, 1, 6, 14, 0);
        let mut day = 0;
        let logged = captured_warnings(|| day = clock.day_index(start, "", utc(2025, 1, 7, 3, 0)));
        assert_eq!(day, 1);
        assert!(logged.contains("missing timezone"), "{logged}");
    }

    #[test]
    fn unset_user_zone_is_silent() {
        let clock = ClockResolver::default();
        let logged = captured_warnings(|| {
            assert_eq!(clock.timezone(None), Tz::UTC);
            assert_eq!(clock.timezone(Some("  ")), Tz::UTC);
        });
        assert!(logged.is_empty(), "{logged}");
    }

    #[test]
    fn user_without_cohort_has_no_day() {
        let clock = ClockResolver::default();
        let user = UserRecord {
            id: "u1".into(),
            email: None,
            display_name: None,
            cohort_id: None,
            program_start: Some(utc(2025, 1, 6, 14, 0)),
            notification_settings: Default::default(),
            is_test_user: false,
            test_notification_recipient: None,
            disabled: false,
        };
        assert_eq!(clock.user_day_index(&user, None, utc(2025, 1, 8, 0, 0)), None);
    }

    #[test]
    fn fixed_clock_advances() {
        let clock = FixedClock::new(utc(2025, 1, 6, 14, 0));
        clock.advance(chrono::Duration::minutes(90));
        assert_eq!(clock.now(), utc(2025, 1, 6, 15, 30));
        clock.set(utc(2025, 2, 1, 0, 0));
        assert_eq!(clock.now(), utc(2025, 2, 1, 0, 0));
    }
}
