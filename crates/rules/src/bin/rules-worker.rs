//! rules-worker: runs the cohort notification scheduler and retention jobs.
//!
//! Subcommands:
//! - `run` ticks the scheduler until Ctrl-C, optionally sweeping old records
//! - `tick` runs a single evaluation pass and prints its report, optionally
//!   followed by the evaluation trail
//! - `purge` deletes old activity logs or ledger entries for an administrator
//! - `day` / `content` show a user's program day and unlocked content
//! - `summary` prints today's activity and dispatch totals
//! - `logs` prints recent activity log entries
//! - `validate` checks every rule in the seed

use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

use anyhow::Context;
use chrono::Utc;
use clap::{Parser, Subcommand};
use tokio::sync::watch;
use tracing::{error, info, warn};

use cohort_core::config::{load_dotenv, Config};
use cohort_core::seed::load_seed;
use cohort_core::{DocumentStore, LedgerStore, MemoryStore};
use cohort_notify::email::EmailNotifier;
use cohort_notify::memory::MemoryNotifier;
use cohort_notify::sms::SmsGatewayNotifier;
use cohort_notify::{Channel, Dispatcher};
use cohort_rules::activity::ActivityLedger;
use cohort_rules::audit_log::{LogLevel, LogQueryParams};
use cohort_rules::retention::{Collection, PurgeRequest};
use cohort_rules::unlock::UnlockResolver;
use cohort_rules::validation::validate_rules;
use cohort_rules::{ClockResolver, DispatchLedger, RetentionSweeper, RuleScheduler, SystemClock};

// ── CLI ─────────────────────────────────────────────────────────────

/// Cohort rules worker: daily notification rules, day index and retention.
#[derive(Parser, Debug)]
#[command(name = "rules-worker", version, about)]
struct Cli {
    /// YAML seed with cohorts, users, rules, content and the admin roster.
    #[arg(long, global = true, env = "COHORT_SEED", default_value = "data/seed.yaml")]
    seed: PathBuf,

    /// Record notifications in memory instead of sending them.
    #[arg(long, global = true, env = "COHORT_DRY_RUN")]
    dry_run: bool,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Tick the scheduler on the configured interval until Ctrl-C.
    Run {
        /// Administrator to run periodic retention sweeps as. Sweeps are off
        /// when unset.
        #[arg(long, env = "COHORT_SWEEP_ACTOR")]
        sweep_as: Option<String>,
    },
    /// Run one scheduler tick now.
    Tick {
        /// Print the evaluation trail after the report.
        #[arg(long)]
        trail: bool,
        /// Only show the trail for this rule.
        #[arg(long)]
        rule: Option<String>,
        /// Minimum trail level: debug, info, warning or error.
        #[arg(long)]
        level: Option<LogLevel>,
        /// Only show trail entries for this user.
        #[arg(long)]
        user: Option<String>,
    },
    /// Delete records older than a number of days.
    Purge {
        /// `system_logs` or `dispatch_ledger`.
        collection: String,
        #[arg(long)]
        days: u32,
        /// Administrator email issuing the purge.
        #[arg(long)]
        actor: String,
        /// Required; the purge is refused without it.
        #[arg(long)]
        confirm: bool,
    },
    /// Print a user's current program day.
    Day { user: String },
    /// List the content unlocked for a user today.
    Content { user: String },
    /// Print today's activity and dispatch totals.
    Summary,
    /// Print recent activity log entries, newest first.
    Logs {
        #[arg(long, default_value_t = 1)]
        days: i64,
        #[arg(long, default_value_t = 50)]
        limit: usize,
    },
    /// Validate every rule in the seed.
    Validate,
}

// ── wiring ──────────────────────────────────────────────────────────

fn build_dispatcher(config: &Config, dry_run: bool) -> anyhow::Result<Dispatcher> {
    let mut dispatcher = Dispatcher::new(config.scheduler.dispatch_timeout());

    match (&config.smtp.host, dry_run) {
        (Some(host), false) => {
            let notifier = EmailNotifier::from_config(
                host,
                Some(config.smtp.port),
                Some(config.smtp.tls),
                &config.smtp.from,
            )
            .context("failed to configure SMTP")?;
            dispatcher.register(Box::new(notifier));
        }
        _ => {
            if !dry_run {
                warn!("SMTP_HOST not set, email notifications are recorded only");
            }
            dispatcher.register(Box::new(MemoryNotifier::new(Channel::Email)));
        }
    }

    match (&config.sms.gateway_url, dry_run) {
        (Some(url), false) => {
            let notifier =
                SmsGatewayNotifier::new(url, config.sms.token.as_deref(), config.sms.from.clone())
                    .context("failed to configure SMS gateway")?;
            dispatcher.register(Box::new(notifier));
        }
        _ => {
            if !dry_run {
                warn!("SMS_GATEWAY_URL not set, SMS notifications are recorded only");
            }
            dispatcher.register(Box::new(MemoryNotifier::new(Channel::Sms)));
        }
    }

    Ok(dispatcher)
}

async fn run(
    scheduler: RuleScheduler,
    sweeper: RetentionSweeper,
    config: &Config,
    sweep_as: Option<String>,
) {
    let (stop_tx, stop_rx) = watch::channel(false);
    tokio::spawn(async move {
        if let Err(e) = tokio::signal::ctrl_c().await {
            error!(error = %e, "failed to listen for Ctrl-C");
            return;
        }
        info!("shutdown requested");
        let _ = stop_tx.send(true);
    });

    let stopped = |mut rx: watch::Receiver<bool>| async move {
        while !*rx.borrow() {
            if rx.changed().await.is_err() {
                break;
            }
        }
    };

    let clock = SystemClock;
    let ticks = scheduler.run_until(&clock, config.scheduler.tick_interval(), stopped(stop_rx.clone()));

    let retention = config.retention.clone();
    let sweeps = async {
        let Some(actor) = sweep_as else {
            return;
        };
        let mut interval = tokio::time::interval(retention.sweep_interval());
        interval.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Skip);
        let shutdown = stopped(stop_rx.clone());
        tokio::pin!(shutdown);
        loop {
            tokio::select! {
                _ = interval.tick() => {
                    match sweeper.sweep(&retention, &actor, Utc::now()).await {
                        Ok(reports) => {
                            for r in reports {
                                info!(collection = %r.collection, deleted = r.deleted, "retention sweep");
                            }
                        }
                        Err(e) => error!(error = %e, "retention sweep failed"),
                    }
                }
                _ = &mut shutdown => break,
            }
        }
    };

    tokio::join!(ticks, sweeps);
}

// ── main ────────────────────────────────────────────────────────────

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    load_dotenv();
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("info")),
        )
        .init();

    let cli = Cli::parse();
    let config = Config::from_env();
    config.log_summary();

    let seed = load_seed(&cli.seed)
        .with_context(|| format!("failed to load seed {}", cli.seed.display()))?;
    let store = Arc::new(MemoryStore::from_seed(seed));
    let docs: Arc<dyn DocumentStore> = store.clone();
    let ledger_store: Arc<dyn LedgerStore> = store;

    let clock = ClockResolver::from_config(&config.scheduler);
    let ledger = DispatchLedger::new(ledger_store.clone(), config.scheduler.claim_grace());

    match cli.command {
        Command::Run { sweep_as } => {
            let dispatcher = Arc::new(build_dispatcher(&config, cli.dry_run)?);
            let scheduler = RuleScheduler::from_config(docs.clone(), ledger_store, dispatcher, &config);
            let sweeper = RetentionSweeper::new(docs, ledger);
            info!(tick_seconds = config.scheduler.tick_seconds, "rules-worker starting");
            run(scheduler, sweeper, &config, sweep_as).await;
            info!("rules-worker exited cleanly");
        }
        Command::Tick {
            trail,
            rule,
            level,
            user,
        } => {
            let dispatcher = Arc::new(build_dispatcher(&config, cli.dry_run)?);
            let scheduler = RuleScheduler::from_config(docs, ledger_store, dispatcher, &config);
            let result = scheduler.tick(Utc::now()).await;
            if trail {
                let params = LogQueryParams {
                    level,
                    user_id: user,
                    ..LogQueryParams::default()
                };
                let audit = scheduler.audit_log();
                let entries = match rule.as_deref() {
                    Some(rule_id) => audit.query(rule_id, &params),
                    None => audit.query_all(&params),
                };
                println!("{}", serde_json::to_string_pretty(&entries)?);
            }
            println!("{}", serde_json::to_string_pretty(&result?)?);
        }
        Command::Purge {
            collection,
            days,
            actor,
            confirm,
        } => {
            let request = PurgeRequest {
                collection: collection.parse::<Collection>()?,
                older_than_days: days,
                actor,
                confirmed: confirm,
            };
            let report = RetentionSweeper::new(docs, ledger)
                .purge(&request, Utc::now())
                .await?;
            println!("{}", serde_json::to_string_pretty(&report)?);
        }
        Command::Day { user } => match clock.day_for_user(docs.as_ref(), &user, Utc::now()).await? {
            Some(day) => println!("{user}: day {day}"),
            None => println!("{user}: no program day (no cohort or start date)"),
        },
        Command::Content { user } => {
            let items = UnlockResolver::new(clock)
                .content_for_user(docs.as_ref(), &user, Utc::now())
                .await?;
            for item in items {
                println!("{}\t{}", item.id, item.title);
            }
        }
        Command::Summary => {
            let now = Utc::now();
            let tz = clock.default_timezone();
            let activity = ActivityLedger::new(docs).daily_summary(now, tz).await?;
            let dispatch = ledger.summary(clock.local_date(now, tz)).await?;
            println!(
                "{}",
                serde_json::to_string_pretty(&serde_json::json!({
                    "activity": activity,
                    "dispatch": dispatch,
                }))?
            );
        }
        Command::Logs { days, limit } => {
            let since = Utc::now() - chrono::Duration::days(days.max(0));
            let entries = ActivityLedger::new(docs).recent(since, limit).await?;
            println!("{}", serde_json::to_string_pretty(&entries)?);
        }
        Command::Validate => {
            let rules = docs.notification_rules().await?;
            let result = validate_rules(&rules);
            println!("{}", serde_json::to_string_pretty(&result)?);
            if !result.valid {
                anyhow::bail!("{} rule error(s)", result.errors.len());
            }
        }
    }

    Ok(())
}
