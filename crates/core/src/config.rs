use std::env;

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

fn env_u64(key: &str, default: u64) -> u64 {
    env_opt(key).and_then(|v| v.parse().ok()).unwrap_or(default)
}

fn env_u16(key: &str, default: u16) -> u16 {
    env_opt(key).and_then(|v| v.parse().ok()).unwrap_or(default)
}

fn env_usize(key: &str, default: usize) -> usize {
    env_opt(key).and_then(|v| v.parse().ok()).unwrap_or(default)
}

fn env_bool(key: &str, default: bool) -> bool {
    env_opt(key)
        .map(|v| matches!(v.to_lowercase().as_str(), "1" | "true" | "yes"))
        .unwrap_or(default)
}

// ── Top-level config ──────────────────────────────────────────

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Config {
    pub scheduler: SchedulerConfig,
    pub smtp: SmtpConfig,
}

impl Config {
    /// Build config from environment variables (call `load_dotenv()` first).
    pub fn from_env() -> Self {
        Self {
            scheduler: SchedulerConfig::from_env(),
            smtp: SmtpConfig::from_env(),
        }
    }
}

// ── Scheduler ─────────────────────────────────────────────────

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SchedulerConfig {
    /// Seconds between scheduler ticks.
    pub tick_interval_secs: u64,
    /// Max due jobs executed per tick (bounds tick latency).
    pub due_job_batch: usize,
    /// Max jobs scanned for reminders per tick.
    pub reminder_batch: usize,
    /// Reminder lookahead window in days.
    pub reminder_lookahead_days: i64,
    /// Directory holding YAML rule definitions loaded at startup.
    pub rules_dir: String,
}

impl SchedulerConfig {
    pub fn from_env() -> Self {
        Self {
            tick_interval_secs: env_u64("FLOTILLA_TICK_INTERVAL_SECS", 60),
            due_job_batch: env_usize("FLOTILLA_DUE_JOB_BATCH", 50),
            reminder_batch: env_usize("FLOTILLA_REMINDER_BATCH", 100),
            reminder_lookahead_days: env_u64("FLOTILLA_REMINDER_LOOKAHEAD_DAYS", 7) as i64,
            rules_dir: env_or("FLOTILLA_RULES_DIR", "data/rules"),
        }
    }
}

impl Default for SchedulerConfig {
    fn default() -> Self {
        Self {
            tick_interval_secs: 60,
            due_job_batch: 50,
            reminder_batch: 100,
            reminder_lookahead_days: 7,
            rules_dir: "data/rules".to_string(),
        }
    }
}

// ── SMTP ──────────────────────────────────────────────────────

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SmtpConfig {
    /// SMTP relay host; empty disables the email channel transport.
    pub host: Option<String>,
    pub port: u16,
    pub tls: bool,
    /// Sender mailbox, e.g. `"Flotilla <alerts@example.com>"`.
    pub from: String,
}

impl SmtpConfig {
    pub fn from_env() -> Self {
        Self {
            host: env_opt("SMTP_HOST"),
            port: env_u16("SMTP_PORT", 587),
            tls: env_bool("SMTP_TLS", true),
            from: env_or("SMTP_FROM", "Flotilla <noreply@localhost>"),
        }
    }

    pub fn enabled(&self) -> bool {
        self.host.is_some()
    }
}
