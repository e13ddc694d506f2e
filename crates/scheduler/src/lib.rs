//! Recurring job scheduling and execution.
//!
//! This crate provides:
//! - restricted cron parsing and schedule normalization with pure UTC
//!   next-run computation
//! - job definitions (assignment policies, reminder specs) and job runs
//!   with per-slot dedupe keys
//! - the in-memory job/run store with atomic run-completion semantics
//! - the tick-driven scheduler: due-job execution, reminders, and the
//!   feedback path into the rule engine
//! - the `scheduler-worker` binary wiring the loop together

pub mod cron;
pub mod engine;
pub mod jobs;
pub mod schedule;
pub mod store;

pub use cron::CronSpec;
pub use engine::{run_scheduler_loop, JobScheduler, TickSummary};
pub use jobs::{
    normalize_reminders, run_dedupe_key, AssignmentMode, AssignmentPolicy, JobDefinition, JobRun,
    JobStatus, ReminderSpec, RunStatus, RunSummary, RunTrigger,
};
pub use schedule::{Recurrence, Schedule, ScheduleInput};
pub use store::JobStore;
