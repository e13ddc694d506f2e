//! In-memory job and run store.
//!
//! Jobs and runs live behind one lock so run completion and job
//! advancement commit together: a crash between the two can never leave
//! a completed run next to a stale `next_run_at`.
//!
//! Invariant: `next_run_at` is `Some` if and only if the job is active.

use std::collections::HashMap;
use std::sync::RwLock;

use chrono::{DateTime, Duration, Utc};
use tracing::debug;
use uuid::Uuid;

use flotilla_core::FlotillaError;

use crate::jobs::{
    normalize_reminders, JobDefinition, JobRun, JobStatus, RunStatus, RunSummary, RunTrigger,
    run_dedupe_key,
};

#[derive(Default)]
struct Inner {
    jobs: HashMap<String, JobDefinition>,
    runs: HashMap<String, JobRun>,
}

#[derive(Default)]
pub struct JobStore {
    inner: RwLock<Inner>,
}

impl JobStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Create a job. Blank id gets a fresh uuid; an active job gets its
    /// first `next_run_at` computed from creation time.
    pub fn create(&self, mut job: JobDefinition) -> Result<JobDefinition, FlotillaError> {
        validate(&job)?;
        job.reminders = normalize_reminders(std::mem::take(&mut job.reminders))?;
        if job.id.is_empty() {
            job.id = Uuid::new_v4().to_string();
        }
        job.last_run_at = None;
        job.next_run_at = match job.status {
            JobStatus::Active => Some(job.schedule.next_run_at(Utc::now())),
            _ => None,
        };

        let mut inner = self.inner.write().expect("job lock poisoned");
        if inner.jobs.contains_key(&job.id) {
            return Err(FlotillaError::validation(format!(
                "job id already exists: {}",
                job.id
            )));
        }
        debug!(job_id = %job.id, name = %job.name, "job created");
        inner.jobs.insert(job.id.clone(), job.clone());
        Ok(job)
    }

    /// Update a job in place. A schedule or status change recomputes
    /// `next_run_at`; pausing or archiving clears it.
    pub fn update(&self, id: &str, mut job: JobDefinition) -> Result<JobDefinition, FlotillaError> {
        validate(&job)?;
        job.reminders = normalize_reminders(std::mem::take(&mut job.reminders))?;

        let mut inner = self.inner.write().expect("job lock poisoned");
        let existing = inner
            .jobs
            .get(id)
            .ok_or_else(|| FlotillaError::NotFound(format!("job {id}")))?;

        job.id = existing.id.clone();
        job.created_at = existing.created_at;
        job.last_run_at = existing.last_run_at;
        job.next_run_at = match job.status {
            JobStatus::Active => {
                if existing.status == JobStatus::Active && job.schedule == existing.schedule {
                    existing.next_run_at
                } else {
                    Some(job.schedule.next_run_at(Utc::now()))
                }
            }
            _ => None,
        };
        inner.jobs.insert(job.id.clone(), job.clone());
        Ok(job)
    }

    pub fn get(&self, id: &str) -> Result<JobDefinition, FlotillaError> {
        self.inner
            .read()
            .expect("job lock poisoned")
            .jobs
            .get(id)
            .cloned()
            .ok_or_else(|| FlotillaError::NotFound(format!("job {id}")))
    }

    pub fn list(&self) -> Vec<JobDefinition> {
        let mut jobs: Vec<JobDefinition> = self
            .inner
            .read()
            .expect("job lock poisoned")
            .jobs
            .values()
            .cloned()
            .collect();
        jobs.sort_by(|a, b| a.name.cmp(&b.name));
        jobs
    }

    /// Active jobs whose slot has arrived, oldest slot first.
    pub fn due_jobs(&self, now: DateTime<Utc>, limit: usize) -> Vec<JobDefinition> {
        let inner = self.inner.read().expect("job lock poisoned");
        let mut due: Vec<JobDefinition> = inner
            .jobs
            .values()
            .filter(|j| j.is_active())
            .filter(|j| j.next_run_at.is_some_and(|at| at <= now))
            .cloned()
            .collect();
        due.sort_by_key(|j| j.next_run_at);
        due.truncate(limit);
        due
    }

    /// Active jobs with reminders whose next run falls inside the
    /// lookahead window `(now, now + lookahead_days]`.
    pub fn reminder_window_jobs(
        &self,
        now: DateTime<Utc>,
        lookahead_days: i64,
        limit: usize,
    ) -> Vec<JobDefinition> {
        let horizon = now + Duration::days(lookahead_days);
        let inner = self.inner.read().expect("job lock poisoned");
        let mut upcoming: Vec<JobDefinition> = inner
            .jobs
            .values()
            .filter(|j| j.is_active() && !j.reminders.is_empty())
            .filter(|j| j.next_run_at.is_some_and(|at| at > now && at <= horizon))
            .cloned()
            .collect();
        upcoming.sort_by_key(|j| j.next_run_at);
        upcoming.truncate(limit);
        upcoming
    }

    /// Open a run for a (job, slot) pair. Only active jobs may open runs;
    /// paused and archived jobs are rejected regardless of trigger. Returns
    /// `None` when a non-failed run already claimed the slot; failed runs
    /// may be retried.
    pub fn begin_run(
        &self,
        job_id: &str,
        scheduled_at: DateTime<Utc>,
        trigger: RunTrigger,
    ) -> Result<Option<JobRun>, FlotillaError> {
        let mut inner = self.inner.write().expect("job lock poisoned");
        match inner.jobs.get(job_id) {
            None => return Err(FlotillaError::NotFound(format!("job {job_id}"))),
            Some(job) if !job.is_active() => {
                return Err(FlotillaError::validation(format!(
                    "job {job_id} is not active and cannot produce runs"
                )))
            }
            Some(_) => {}
        }
        let key = run_dedupe_key(job_id, scheduled_at);
        let claimed = inner
            .runs
            .values()
            .any(|r| r.dedupe_key == key && r.status != RunStatus::Failed);
        if claimed {
            debug!(job_id, dedupe_key = %key, "run slot already claimed");
            return Ok(None);
        }
        let run = JobRun::begin(job_id, scheduled_at, trigger);
        inner.runs.insert(run.id.clone(), run.clone());
        Ok(Some(run))
    }

    pub fn mark_running(&self, run_id: &str) -> Result<(), FlotillaError> {
        let mut inner = self.inner.write().expect("job lock poisoned");
        let run = inner
            .runs
            .get_mut(run_id)
            .ok_or_else(|| FlotillaError::NotFound(format!("run {run_id}")))?;
        run.status = RunStatus::Running;
        Ok(())
    }

    /// Commit a successful run and advance the job in one locked section.
    pub fn complete_run(
        &self,
        run_id: &str,
        severity: flotilla_core::Severity,
        summary: RunSummary,
        next_run_at: DateTime<Utc>,
    ) -> Result<JobRun, FlotillaError> {
        let mut inner = self.inner.write().expect("job lock poisoned");
        let run = inner
            .runs
            .get_mut(run_id)
            .ok_or_else(|| FlotillaError::NotFound(format!("run {run_id}")))?;
        run.status = RunStatus::Completed;
        run.severity = severity;
        run.summary = summary;
        run.finished_at = Some(Utc::now());
        let completed = run.clone();

        if let Some(job) = inner.jobs.get_mut(&completed.job_id) {
            job.last_run_at = Some(completed.scheduled_at);
            if job.is_active() {
                job.next_run_at = Some(next_run_at);
            }
        }
        Ok(completed)
    }

    /// Record a failed run. The job's `next_run_at` is left untouched so
    /// the next tick retries the same slot.
    pub fn fail_run(&self, run_id: &str, error: &str) -> Result<(), FlotillaError> {
        let mut inner = self.inner.write().expect("job lock poisoned");
        let run = inner
            .runs
            .get_mut(run_id)
            .ok_or_else(|| FlotillaError::NotFound(format!("run {run_id}")))?;
        run.status = RunStatus::Failed;
        run.summary.error = Some(error.to_string());
        run.finished_at = Some(Utc::now());
        Ok(())
    }

    /// Run history for a job, newest first.
    pub fn runs_for_job(&self, job_id: &str) -> Vec<JobRun> {
        let inner = self.inner.read().expect("job lock poisoned");
        let mut runs: Vec<JobRun> = inner
            .runs
            .values()
            .filter(|r| r.job_id == job_id)
            .cloned()
            .collect();
        runs.sort_by(|a, b| b.started_at.cmp(&a.started_at));
        runs
    }

    pub fn len(&self) -> usize {
        self.inner.read().expect("job lock poisoned").jobs.len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

fn validate(job: &JobDefinition) -> Result<(), FlotillaError> {
    if job.name.trim().is_empty() {
        return Err(FlotillaError::validation("job name must not be empty"));
    }
    if job.module.trim().is_empty() {
        return Err(FlotillaError::validation("job module must not be empty"));
    }
    Ok(())
}
