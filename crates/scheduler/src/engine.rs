//! Tick-driven job execution and reminders.
//!
//! One scheduler instance is the single scheduling authority per process.
//! Every tick processes due jobs then reminders, each job isolated so one
//! failure never aborts the batch. Dedupe keys make re-delivery idempotent
//! rather than preventing races outright.

use std::sync::Arc;
use std::time::Duration as StdDuration;

use chrono::{DateTime, Duration, Utc};
use serde::Serialize;
use serde_json::Value;
use tracing::{debug, info, warn};

use flotilla_core::config::SchedulerConfig;
use flotilla_core::membership::roles;
use flotilla_core::{EventCandidate, FlotillaError, MembershipResolver, Payload, Severity};
use flotilla_notify::{Channel, Delivery, Dispatcher, TemplateRenderer};
use flotilla_rules::RuleEngine;

use crate::jobs::{AssignmentMode, JobDefinition, JobRun, RunSummary, RunTrigger};
use crate::store::JobStore;

/// A run is overdue (critical severity, `jobs.overdue`) when execution
/// starts this long after its scheduled slot.
const OVERDUE_GRACE_MINUTES: i64 = 30;

/// Counters for one scheduler tick.
#[derive(Debug, Clone, Copy, Default, Serialize)]
pub struct TickSummary {
    pub executed: usize,
    pub failed: usize,
    pub reminders_sent: usize,
}

pub struct JobScheduler {
    jobs: Arc<JobStore>,
    membership: Arc<dyn MembershipResolver>,
    dispatcher: Arc<Dispatcher>,
    rules: Arc<RuleEngine>,
    config: SchedulerConfig,
    templates: TemplateRenderer,
}

impl JobScheduler {
    pub fn new(
        jobs: Arc<JobStore>,
        membership: Arc<dyn MembershipResolver>,
        dispatcher: Arc<Dispatcher>,
        rules: Arc<RuleEngine>,
        config: SchedulerConfig,
    ) -> Self {
        Self {
            jobs,
            membership,
            dispatcher,
            rules,
            config,
            templates: TemplateRenderer::new(),
        }
    }

    pub fn jobs(&self) -> &Arc<JobStore> {
        &self.jobs
    }

    /// One scheduler tick: due jobs first, then reminders.
    pub async fn tick(&self) -> TickSummary {
        let mut summary = self.process_due_jobs().await;
        summary.reminders_sent = self.process_reminders().await;
        if summary.executed > 0 || summary.failed > 0 || summary.reminders_sent > 0 {
            info!(
                executed = summary.executed,
                failed = summary.failed,
                reminders_sent = summary.reminders_sent,
                "scheduler tick"
            );
        }
        summary
    }

    /// Execute every due job, isolating failures per job.
    pub async fn process_due_jobs(&self) -> TickSummary {
        let now = Utc::now();
        let due = self.jobs.due_jobs(now, self.config.due_job_batch);
        let mut summary = TickSummary::default();
        for job in due {
            let scheduled_at = match job.next_run_at {
                Some(at) => at,
                None => continue,
            };
            match self.execute_job(&job, scheduled_at, RunTrigger::Scheduler).await {
                Ok(Some(run)) => {
                    summary.executed += 1;
                    debug!(job_id = %job.id, run_id = %run.id, "job executed");
                }
                Ok(None) => {
                    debug!(job_id = %job.id, "run slot already claimed, skipping");
                }
                Err(e) => {
                    summary.failed += 1;
                    warn!(job_id = %job.id, error = %e, "job execution failed");
                }
            }
        }
        summary
    }

    /// Manually execute a job right now, bypassing its schedule. The next
    /// run is recomputed from the manual execution time.
    pub async fn run_job_now(&self, job_id: &str) -> Result<JobRun, FlotillaError> {
        let job = self.jobs.get(job_id)?;
        match self.execute_job(&job, Utc::now(), RunTrigger::Manual).await? {
            Some(run) => Ok(run),
            None => Err(FlotillaError::validation(format!(
                "a run for job {job_id} at this slot already exists"
            ))),
        }
    }

    /// Run one job at one slot. Returns `Ok(None)` when the slot's run
    /// dedupe key is already claimed. Any failure past run creation marks
    /// the run failed and leaves the job's `nextRunAt` untouched.
    pub async fn execute_job(
        &self,
        job: &JobDefinition,
        scheduled_at: DateTime<Utc>,
        trigger: RunTrigger,
    ) -> Result<Option<JobRun>, FlotillaError> {
        let run = match self.jobs.begin_run(&job.id, scheduled_at, trigger)? {
            Some(run) => run,
            None => return Ok(None),
        };

        match self.perform_run(job, &run).await {
            Ok(completed) => Ok(Some(completed)),
            Err(e) => {
                self.jobs.fail_run(&run.id, &e.to_string())?;
                Err(FlotillaError::Run(e.to_string()))
            }
        }
    }

    async fn perform_run(&self, job: &JobDefinition, run: &JobRun) -> Result<JobRun, FlotillaError> {
        self.jobs.mark_running(&run.id)?;

        let assignees = self.resolve_assignees(job).await;

        let now = Utc::now();
        let overdue = now - run.scheduled_at > Duration::minutes(OVERDUE_GRACE_MINUTES);
        let (severity, event_type) = if overdue {
            (Severity::Critical, "jobs.overdue")
        } else {
            (Severity::Info, "jobs.reminder_due")
        };

        // Explicit run fields win over caller-supplied payload keys.
        let mut explicit = Payload::new()
            .with("jobName", job.name.as_str())
            .with("scheduledAt", run.scheduled_at.to_rfc3339());
        if let Some(yacht_id) = &job.yacht_id {
            explicit.insert("yachtId", yacht_id.as_str());
        }
        if let Some(entity_type) = &job.entity_type {
            explicit.insert("entityType", entity_type.as_str());
        }
        if let Some(entity_id) = &job.entity_id {
            explicit.insert("entityId", entity_id.as_str());
        }
        let merged = job.payload.merged(&explicit);
        let instructions = self
            .templates
            .render_or_raw(&job.instructions, merged.as_map());

        let delivery = Delivery {
            base_dedupe_key: run.dedupe_key.clone(),
            yacht_id: job.yacht_id.clone(),
            event_type: event_type.to_string(),
            severity,
            title: job.name.clone(),
            body: instructions.clone(),
            payload: merged.clone(),
            dedupe_window_hours: None,
        };
        let delivered = self
            .dispatcher
            .fan_out(&assignees, &[Channel::InApp], &delivery)
            .await;

        // Feed the run back through the rule engine so escalation rules
        // (e.g. on jobs.overdue) can fire on top of the direct dispatch.
        let mut candidate = EventCandidate::new(event_type, &job.module, severity)
            .with_payload(
                merged
                    .with("delivered", delivered as u64)
                    .with("assignees", Value::from(assignees.clone())),
            );
        candidate.yacht_id = job.yacht_id.clone();
        candidate.entity_type = job.entity_type.clone();
        candidate.entity_id = job.entity_id.clone();
        candidate.occurred_at = Some(run.scheduled_at);
        self.rules.dispatch_candidates(&[candidate]).await;

        // Anchor on the slot, not on now, so late ticks never drift.
        let next_run_at = job.schedule.next_run_at(run.scheduled_at);
        let summary = RunSummary {
            delivered,
            assignees,
            instructions,
            error: None,
        };
        self.jobs.complete_run(&run.id, severity, summary, next_run_at)
    }

    /// Resolve the users a job run is assigned to.
    pub async fn resolve_assignees(&self, job: &JobDefinition) -> Vec<String> {
        let yacht = job.yacht_id.as_deref();
        match job.assignment.mode {
            AssignmentMode::Users => {
                let mut out = Vec::new();
                for user_id in &job.assignment.user_ids {
                    if self.membership.is_active(user_id).await {
                        out.push(user_id.clone());
                    }
                }
                out
            }
            AssignmentMode::YachtCaptain => {
                let captains = self
                    .membership
                    .resolve_users_by_roles(&[roles::CAPTAIN.to_string()], yacht)
                    .await;
                if !captains.is_empty() {
                    return captains;
                }
                self.membership
                    .resolve_users_by_roles(
                        &[roles::MANAGEMENT.to_string(), roles::ADMIN.to_string()],
                        yacht,
                    )
                    .await
            }
            AssignmentMode::EntityOwner => {
                if !job.assignment.roles.is_empty() {
                    let owners = self
                        .membership
                        .resolve_users_by_roles(&job.assignment.roles, yacht)
                        .await;
                    if !owners.is_empty() {
                        return owners;
                    }
                }
                self.membership
                    .resolve_users_by_roles(
                        &[roles::CAPTAIN.to_string(), roles::CHIEF_ENGINEER.to_string()],
                        yacht,
                    )
                    .await
            }
            AssignmentMode::Roles => {
                self.membership
                    .resolve_users_by_roles(&job.assignment.roles, yacht)
                    .await
            }
        }
    }

    /// Send due reminders for jobs whose next run falls inside the
    /// lookahead window. Returns the number of successful sends.
    pub async fn process_reminders(&self) -> usize {
        let now = Utc::now();
        let upcoming = self.jobs.reminder_window_jobs(
            now,
            self.config.reminder_lookahead_days,
            self.config.reminder_batch,
        );

        let mut sent = 0;
        for job in upcoming {
            let next_run_at = match job.next_run_at {
                Some(at) => at,
                None => continue,
            };
            let assignees = self.resolve_assignees(&job).await;
            if assignees.is_empty() {
                debug!(job_id = %job.id, "no assignees for reminders");
                continue;
            }

            let rendered = self
                .templates
                .render_or_raw(&job.instructions, job.payload.as_map());

            for reminder in &job.reminders {
                let reminder_at = next_run_at - Duration::hours(i64::from(reminder.offset_hours));
                if reminder_at > now {
                    continue;
                }
                // Keyed by (job, slot, offset) so a schedule edit naturally
                // invalidates stale reminder dedupe state.
                let delivery = Delivery {
                    base_dedupe_key: format!(
                        "job-reminder:{}:{}:offset:{}",
                        job.id,
                        next_run_at.to_rfc3339(),
                        reminder.offset_hours
                    ),
                    yacht_id: job.yacht_id.clone(),
                    event_type: "jobs.reminder".to_string(),
                    severity: Severity::Info,
                    title: format!("Upcoming: {}", job.name),
                    body: rendered.clone(),
                    payload: job.payload.clone(),
                    dedupe_window_hours: None,
                };
                sent += self
                    .dispatcher
                    .fan_out(&assignees, &reminder.channels, &delivery)
                    .await;
            }
        }
        sent
    }
}

/// Periodic tick loop. Spawned as a tokio task by the worker binary.
pub async fn run_scheduler_loop(scheduler: Arc<JobScheduler>, tick_interval_secs: u64) {
    info!(tick_interval_secs, "scheduler loop started");
    let mut interval = tokio::time::interval(StdDuration::from_secs(tick_interval_secs));
    loop {
        interval.tick().await;
        let summary = scheduler.tick().await;
        debug!(
            executed = summary.executed,
            failed = summary.failed,
            reminders_sent = summary.reminders_sent,
            "tick complete"
        );
    }
}
