use std::env;
use std::time::Duration;

use serde::{Deserialize, Serialize};

/// Load .env file (silently ignores if missing).
pub fn load_dotenv() {
    dotenvy::dotenv().ok();
}

fn env_or(key: &str, default: &str) -> String {
    env::var(key).unwrap_or_else(|_| default.to_string())
}

fn env_opt(key: &str) -> Option<String> {
    env::var(key).ok().filter(|s| !s.is_empty())
}

/// Read a profiled env var: tries {PROFILE}_{KEY} first, falls back to {KEY}.
fn profiled_env_opt(profile: &str, key: &str) -> Option<String> {
    if !profile.is_empty() {
        let prefixed = format!("{}_{}", profile, key);
        if let Some(v) = env_opt(&prefixed) {
            return Some(v);
        }
    }
    env_opt(key)
}

fn profiled_env_or(profile: &str, key: &str, default: &str) -> String {
    profiled_env_opt(profile, key).unwrap_or_else(|| default.to_string())
}

fn profiled_env_u16(profile: &str, key: &str, default: u16) -> u16 {
    profiled_env_opt(profile, key)
        .and_then(|v| v.parse().ok())
        .unwrap_or(default)
}

fn profiled_env_u32(profile: &str, key: &str, default: u32) -> u32 {
    profiled_env_opt(profile, key)
        .and_then(|v| v.parse().ok())
        .unwrap_or(default)
}

fn profiled_env_u64(profile: &str, key: &str, default: u64) -> u64 {
    profiled_env_opt(profile, key)
        .and_then(|v| v.parse().ok())
        .unwrap_or(default)
}

// ── Top-level config ──────────────────────────────────────────

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Config {
    /// Active profile name (empty = default).
    pub profile: String,
    pub scheduler: SchedulerConfig,
    pub retention: RetentionConfig,
    pub smtp: SmtpConfig,
    pub sms: SmsConfig,
    pub app: AppConfig,
}

impl Config {
    /// Build config from environment variables (call `load_dotenv()` first).
    /// Profile is read from `COHORT_PROFILE`. When set (e.g. `PROD`), every key
    /// is first looked up as `{PROFILE}_{KEY}`, falling back to `{KEY}`.
    pub fn from_env() -> Self {
        let profile = env_or("COHORT_PROFILE", "").to_uppercase();
        Self::for_profile(&profile)
    }

    /// Build config for a specific named profile (empty string = default).
    pub fn for_profile(profile: &str) -> Self {
        let p = profile.to_uppercase();
        let p = p.as_str();
        Self {
            profile: p.to_string(),
            scheduler: SchedulerConfig::from_env_profiled(p),
            retention: RetentionConfig::from_env_profiled(p),
            smtp: SmtpConfig::from_env_profiled(p),
            sms: SmsConfig::from_env_profiled(p),
            app: AppConfig::from_env_profiled(p),
        }
    }

    pub fn profile_label(&self) -> &str {
        if self.profile.is_empty() { "default" } else { &self.profile }
    }

    /// Print a redacted summary for startup logs.
    pub fn log_summary(&self) {
        tracing::info!("Config loaded (profile: {}):", self.profile_label());
        tracing::info!(
            "  scheduler:   tick={}s, concurrency={}, grace={}s, send_timeout={}s, default_tz={}",
            self.scheduler.tick_seconds,
            self.scheduler.concurrency,
            self.scheduler.claim_grace_seconds,
            self.scheduler.dispatch_timeout_seconds,
            self.scheduler.default_timezone
        );
        tracing::info!(
            "  retention:   ledger={}d, logs={}d",
            self.retention.ledger_days,
            self.retention.log_days
        );
        tracing::info!(
            "  smtp:        host={}, port={}",
            self.smtp.host.as_deref().unwrap_or("(none)"),
            self.smtp.port
        );
        tracing::info!(
            "  sms:         gateway={}",
            self.sms.gateway_url.as_deref().unwrap_or("(none)")
        );
        tracing::info!("  app:         base_url={}", self.app.base_url);
    }

    /// Return a redacted view safe for API responses (no secrets).
    pub fn redacted_summary(&self) -> serde_json::Value {
        serde_json::json!({
            "profile": self.profile_label(),
            "scheduler": {
                "tick_seconds": self.scheduler.tick_seconds,
                "concurrency": self.scheduler.concurrency,
                "claim_grace_seconds": self.scheduler.claim_grace_seconds,
                "dispatch_timeout_seconds": self.scheduler.dispatch_timeout_seconds,
                "default_timezone": self.scheduler.default_timezone,
            },
            "retention": {
                "ledger_days": self.retention.ledger_days,
                "log_days": self.retention.log_days,
            },
            "smtp": {
                "host": self.smtp.host,
                "port": self.smtp.port,
                "configured": self.smtp.is_configured(),
            },
            "sms": {
                "configured": self.sms.is_configured(),
            },
            "app": { "base_url": self.app.base_url },
        })
    }
}

// ── Scheduler ─────────────────────────────────────────────────

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SchedulerConfig {
    /// Tick interval. One minute matches the finest trigger-time resolution.
    pub tick_seconds: u64,
    /// Maximum (rule, user) evaluations in flight per tick.
    pub concurrency: usize,
    /// Age after which an unresolved claim may be retried.
    pub claim_grace_seconds: u64,
    /// Upper bound on a single channel send.
    pub dispatch_timeout_seconds: u64,
    /// Zone used when a user or cohort timezone is missing or invalid.
    pub default_timezone: String,
}

impl SchedulerConfig {
    fn from_env_profiled(p: &str) -> Self {
        Self {
            tick_seconds: profiled_env_u64(p, "SCHEDULER_TICK_SECONDS", 60),
            concurrency: profiled_env_u32(p, "SCHEDULER_CONCURRENCY", 16) as usize,
            claim_grace_seconds: profiled_env_u64(p, "CLAIM_GRACE_SECONDS", 300),
            dispatch_timeout_seconds: profiled_env_u64(p, "DISPATCH_TIMEOUT_SECONDS", 30),
            default_timezone: profiled_env_or(p, "DEFAULT_TIMEZONE", "UTC"),
        }
    }

    pub fn tick_interval(&self) -> Duration {
        Duration::from_secs(self.tick_seconds.max(1))
    }

    pub fn claim_grace(&self) -> Duration {
        Duration::from_secs(self.claim_grace_seconds)
    }

    pub fn dispatch_timeout(&self) -> Duration {
        Duration::from_secs(self.dispatch_timeout_seconds.max(1))
    }
}

impl Default for SchedulerConfig {
    fn default() -> Self {
        Self {
            tick_seconds: 60,
            concurrency: 16,
            claim_grace_seconds: 300,
            dispatch_timeout_seconds: 30,
            default_timezone: "UTC".to_string(),
        }
    }
}

// ── Retention ─────────────────────────────────────────────────

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RetentionConfig {
    pub ledger_days: u32,
    pub log_days: u32,
    /// Interval between scheduled sweeps when a standing admin trigger is set.
    pub sweep_interval_seconds: u64,
}

impl RetentionConfig {
    fn from_env_profiled(p: &str) -> Self {
        Self {
            ledger_days: profiled_env_u32(p, "LEDGER_RETENTION_DAYS", 90),
            log_days: profiled_env_u32(p, "LOG_RETENTION_DAYS", 30),
            sweep_interval_seconds: profiled_env_u64(p, "RETENTION_SWEEP_SECONDS", 86_400),
        }
    }

    pub fn sweep_interval(&self) -> Duration {
        Duration::from_secs(self.sweep_interval_seconds.max(1))
    }
}

// ── SMTP ──────────────────────────────────────────────────────

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SmtpConfig {
    pub host: Option<String>,
    pub port: u16,
    pub tls: bool,
    pub from: String,
}

impl SmtpConfig {
    fn from_env_profiled(p: &str) -> Self {
        Self {
            host: profiled_env_opt(p, "SMTP_HOST"),
            port: profiled_env_u16(p, "SMTP_PORT", 587),
            tls: profiled_env_or(p, "SMTP_TLS", "true") != "false",
            from: profiled_env_or(p, "EMAIL_FROM", "Notifications <noreply@localhost>"),
        }
    }

    pub fn is_configured(&self) -> bool {
        self.host.is_some()
    }
}

// ── SMS gateway ───────────────────────────────────────────────

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SmsConfig {
    pub gateway_url: Option<String>,
    pub from: Option<String>,
    #[serde(skip_serializing)]
    pub token: Option<String>,
}

impl SmsConfig {
    fn from_env_profiled(p: &str) -> Self {
        Self {
            gateway_url: profiled_env_opt(p, "SMS_GATEWAY_URL"),
            from: profiled_env_opt(p, "SMS_FROM"),
            token: profiled_env_opt(p, "SMS_GATEWAY_TOKEN"),
        }
    }

    pub fn is_configured(&self) -> bool {
        self.gateway_url.is_some()
    }
}

// ── App ───────────────────────────────────────────────────────

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AppConfig {
    /// Absolute base URL that relative rule links resolve against.
    pub base_url: String,
}

impl AppConfig {
    fn from_env_profiled(p: &str) -> Self {
        Self {
            base_url: profiled_env_or(p, "APP_BASE_URL", "http://localhost:5173"),
        }
    }
}
