//! Job definitions, runs, and assignment vocabulary.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use flotilla_core::{FlotillaError, Payload, Severity};
use flotilla_notify::Channel;

use crate::schedule::Schedule;

// ── Job definitions ─────────────────────────────────────────────────

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum JobStatus {
    Active,
    Paused,
    Archived,
}

/// How run-time assignees are resolved for a job.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AssignmentMode {
    #[default]
    Roles,
    Users,
    YachtCaptain,
    EntityOwner,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AssignmentPolicy {
    #[serde(default)]
    pub mode: AssignmentMode,
    #[serde(default)]
    pub roles: Vec<String>,
    #[serde(default)]
    pub user_ids: Vec<String>,
}

/// A pre-run reminder: fires `offset_hours` before the next scheduled run.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ReminderSpec {
    pub offset_hours: u32,
    pub channels: Vec<Channel>,
}

/// A recurring operational job (maintenance task, checklist, inspection).
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct JobDefinition {
    #[serde(default)]
    pub id: String,
    pub name: String,
    pub module: String,
    #[serde(default)]
    pub yacht_id: Option<String>,
    #[serde(default)]
    pub entity_type: Option<String>,
    #[serde(default)]
    pub entity_id: Option<String>,
    pub schedule: Schedule,
    #[serde(default)]
    pub assignment: AssignmentPolicy,
    #[serde(default)]
    pub reminders: Vec<ReminderSpec>,
    /// Instructions template rendered into each run's notification.
    #[serde(default)]
    pub instructions: String,
    #[serde(default)]
    pub payload: Payload,
    pub status: JobStatus,
    #[serde(default)]
    pub next_run_at: Option<DateTime<Utc>>,
    #[serde(default)]
    pub last_run_at: Option<DateTime<Utc>>,
    #[serde(default = "Utc::now")]
    pub created_at: DateTime<Utc>,
}

impl JobDefinition {
    pub fn is_active(&self) -> bool {
        self.status == JobStatus::Active
    }
}

/// Reject duplicate reminder offsets and order reminders farthest-out
/// first, so the window scan emits them in firing order.
pub fn normalize_reminders(mut reminders: Vec<ReminderSpec>) -> Result<Vec<ReminderSpec>, FlotillaError> {
    let mut seen = std::collections::HashSet::new();
    for r in &reminders {
        if !seen.insert(r.offset_hours) {
            return Err(FlotillaError::validation(format!(
                "duplicate reminder offset: {} hours",
                r.offset_hours
            )));
        }
        if r.channels.is_empty() {
            return Err(FlotillaError::validation(
                "reminder must name at least one channel",
            ));
        }
    }
    reminders.sort_by(|a, b| b.offset_hours.cmp(&a.offset_hours));
    Ok(reminders)
}

// ── Job runs ────────────────────────────────────────────────────────

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RunStatus {
    Pending,
    Running,
    Completed,
    Failed,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RunTrigger {
    Scheduler,
    Manual,
}

/// What a completed run produced, persisted on the run record.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RunSummary {
    pub delivered: usize,
    pub assignees: Vec<String>,
    pub instructions: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

/// One execution of a job at one scheduled time.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct JobRun {
    pub id: String,
    pub job_id: String,
    pub scheduled_at: DateTime<Utc>,
    pub dedupe_key: String,
    pub trigger: RunTrigger,
    pub status: RunStatus,
    pub severity: Severity,
    #[serde(default)]
    pub summary: RunSummary,
    pub started_at: DateTime<Utc>,
    #[serde(default)]
    pub finished_at: Option<DateTime<Utc>>,
}

impl JobRun {
    pub fn begin(job_id: &str, scheduled_at: DateTime<Utc>, trigger: RunTrigger) -> Self {
        Self {
            id: Uuid::new_v4().to_string(),
            job_id: job_id.to_string(),
            scheduled_at,
            dedupe_key: run_dedupe_key(job_id, scheduled_at),
            trigger,
            status: RunStatus::Pending,
            severity: Severity::Info,
            summary: RunSummary::default(),
            started_at: Utc::now(),
            finished_at: None,
        }
    }
}

/// Run idempotency key: one non-failed run per (job, scheduled time).
pub fn run_dedupe_key(job_id: &str, scheduled_at: DateTime<Utc>) -> String {
    format!("job-run:{}:{}", job_id, scheduled_at.to_rfc3339())
}

#[cfg(test)]
mod tests {
    use super::*;

    fn reminder(offset_hours: u32) -> ReminderSpec {
        ReminderSpec {
            offset_hours,
            channels: vec![Channel::InApp],
        }
    }

    #[test]
    fn reminders_sort_farthest_first() {
        let out = normalize_reminders(vec![reminder(2), reminder(48), reminder(24)]).unwrap();
        let offsets: Vec<u32> = out.iter().map(|r| r.offset_hours).collect();
        assert_eq!(offsets, vec![48, 24, 2]);
    }

    #[test]
    fn duplicate_offsets_rejected() {
        assert!(normalize_reminders(vec![reminder(24), reminder(24)]).is_err());
    }

    #[test]
    fn reminder_without_channels_rejected() {
        let bad = ReminderSpec {
            offset_hours: 24,
            channels: Vec::new(),
        };
        assert!(normalize_reminders(vec![bad]).is_err());
    }

    #[test]
    fn run_dedupe_key_is_stable_per_slot() {
        let at = Utc::now();
        assert_eq!(run_dedupe_key("j1", at), run_dedupe_key("j1", at));
        assert_ne!(
            run_dedupe_key("j1", at),
            run_dedupe_key("j1", at + chrono::Duration::hours(1))
        );
    }
}
