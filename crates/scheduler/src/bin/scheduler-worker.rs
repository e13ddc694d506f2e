//! scheduler-worker: standalone notification scheduler process.
//!
//! Wires the job store, rule engine, and dispatcher together and drives
//! the periodic tick loop. Membership comes from a JSON fixture file;
//! email is enabled only when SMTP_HOST is set.

use std::path::Path;
use std::sync::Arc;

use clap::Parser;
use tracing::{info, warn};

use flotilla_core::config::load_dotenv;
use flotilla_core::membership::StaticMembership;
use flotilla_core::{AlertStore, Config, InMemoryAlertStore, MembershipResolver};
use flotilla_notify::email::SmtpEmailTransport;
use flotilla_notify::{Dispatcher, EmailTransport, Ledger};
use flotilla_rules::{loader, RuleEngine, RuleStore};
use flotilla_scheduler::{run_scheduler_loop, JobScheduler, JobStore};

// ── CLI ─────────────────────────────────────────────────────────────

/// Flotilla scheduler worker: job execution, reminders, rule dispatch.
#[derive(Parser, Debug)]
#[command(name = "scheduler-worker", version, about)]
struct Cli {
    /// Seconds between scheduler ticks (overrides FLOTILLA_TICK_INTERVAL_SECS).
    #[arg(long)]
    tick_interval: Option<u64>,

    /// Directory of YAML rule files loaded at startup.
    #[arg(long, env = "FLOTILLA_RULES_DIR", default_value = "data/rules")]
    rules_dir: String,

    /// JSON fixture of membership records (role/yacht/active/email).
    #[arg(long, env = "FLOTILLA_MEMBERSHIP_FILE", default_value = "data/membership.json")]
    membership_file: String,
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

    let membership: Arc<StaticMembership> =
        match StaticMembership::from_json_file(Path::new(&cli.membership_file)) {
            Ok(m) => {
                info!(path = %cli.membership_file, "membership fixture loaded");
                Arc::new(m)
            }
            Err(e) => {
                warn!(
                    path = %cli.membership_file,
                    error = %e,
                    "membership fixture unavailable, starting with no members"
                );
                Arc::new(StaticMembership::new(Vec::new()))
            }
        };

    let email: Option<Arc<dyn EmailTransport>> = if config.smtp.enabled() {
        match SmtpEmailTransport::from_config(&config.smtp, membership.clone()) {
            Ok(t) => {
                info!(from = %config.smtp.from, "smtp transport configured");
                Some(Arc::new(t))
            }
            Err(e) => {
                warn!(error = %e, "smtp configuration invalid, email channel disabled");
                None
            }
        }
    } else {
        info!("SMTP_HOST not set, email channel disabled");
        None
    };

    let ledger = Arc::new(Ledger::new());
    let dispatcher = Arc::new(Dispatcher::new(ledger, email, None));

    let rule_store = Arc::new(RuleStore::new());
    let loaded = loader::load_into(&rule_store, Path::new(&cli.rules_dir));
    info!(rules = loaded, dir = %cli.rules_dir, "rules loaded");

    let alerts: Arc<dyn AlertStore> = Arc::new(InMemoryAlertStore::new());
    let rules = Arc::new(RuleEngine::new(
        rule_store,
        membership.clone() as Arc<dyn MembershipResolver>,
        dispatcher.clone(),
        alerts,
    ));

    let scheduler = Arc::new(JobScheduler::new(
        Arc::new(JobStore::new()),
        membership,
        dispatcher,
        rules,
        config.scheduler.clone(),
    ));

    let tick_interval = cli.tick_interval.unwrap_or(config.scheduler.tick_interval_secs);
    info!(tick_interval, "scheduler-worker starting");
    run_scheduler_loop(scheduler, tick_interval).await;
    Ok(())
}
