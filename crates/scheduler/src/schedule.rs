//! Schedule normalization and next-run computation.
//!
//! Wire format is a loose `{type, expression?, everyHours?, everyDays?,
//! timezone?}` object; it normalizes into a closed `Recurrence` enum at
//! deserialization time so the rest of the crate never sees a half-valid
//! schedule. All arithmetic is UTC; the stored timezone is informational
//! only (displayed to users, never applied to computation).

use chrono::{DateTime, Datelike, Duration, Timelike, Utc};
use serde::{Deserialize, Serialize};

use flotilla_core::FlotillaError;

use crate::cron::CronSpec;

/// Wire shape for schedules, as stored on job definitions.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ScheduleInput {
    #[serde(rename = "type")]
    pub schedule_type: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub expression: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub every_hours: Option<u32>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub every_days: Option<u32>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub timezone: Option<String>,
}

/// A normalized recurrence. Intervals anchor on the previous scheduled
/// time, not on wall-clock "now", so a late tick never drifts the cadence.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Recurrence {
    IntervalHours(u32),
    IntervalDays(u32),
    Cron(CronSpec),
}

/// A validated schedule: recurrence plus informational timezone label.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(try_from = "ScheduleInput", into = "ScheduleInput")]
pub struct Schedule {
    pub recurrence: Recurrence,
    pub timezone: Option<String>,
}

impl Schedule {
    /// Validate a wire schedule into its normalized form.
    pub fn normalize(input: ScheduleInput) -> Result<Self, FlotillaError> {
        let recurrence = match input.schedule_type.as_str() {
            "interval_hours" => {
                let hours = input.every_hours.ok_or_else(|| {
                    FlotillaError::validation("interval_hours schedule requires everyHours")
                })?;
                if hours == 0 {
                    return Err(FlotillaError::validation("everyHours must be at least 1"));
                }
                Recurrence::IntervalHours(hours)
            }
            "interval_days" => {
                let days = input.every_days.ok_or_else(|| {
                    FlotillaError::validation("interval_days schedule requires everyDays")
                })?;
                if days == 0 {
                    return Err(FlotillaError::validation("everyDays must be at least 1"));
                }
                Recurrence::IntervalDays(days)
            }
            "cron" => {
                let expression = input.expression.as_deref().ok_or_else(|| {
                    FlotillaError::validation("cron schedule requires an expression")
                })?;
                Recurrence::Cron(CronSpec::parse(expression)?)
            }
            other => {
                return Err(FlotillaError::validation(format!(
                    "unknown schedule type {other:?}"
                )));
            }
        };
        Ok(Self {
            recurrence,
            timezone: input.timezone,
        })
    }

    /// Next occurrence strictly after `from`. Pure UTC arithmetic.
    pub fn next_run_at(&self, from: DateTime<Utc>) -> DateTime<Utc> {
        match &self.recurrence {
            Recurrence::IntervalHours(h) => from + Duration::hours(i64::from(*h)),
            Recurrence::IntervalDays(d) => from + Duration::days(i64::from(*d)),
            Recurrence::Cron(spec) => next_cron_occurrence(spec, from),
        }
    }
}

/// First h:m occurrence after `from`, honoring an optional weekday pin
/// (0 = Sunday .. 6 = Saturday).
fn next_cron_occurrence(spec: &CronSpec, from: DateTime<Utc>) -> DateTime<Utc> {
    let mut candidate = from
        .with_hour(spec.hour)
        .and_then(|t| t.with_minute(spec.minute))
        .and_then(|t| t.with_second(0))
        .and_then(|t| t.with_nanosecond(0))
        .unwrap_or(from);

    match spec.day_of_week {
        None => {
            if candidate <= from {
                candidate += Duration::days(1);
            }
        }
        Some(dow) => {
            let today = candidate.weekday().num_days_from_sunday();
            let mut ahead = (dow + 7 - today) % 7;
            if ahead == 0 && candidate <= from {
                ahead = 7;
            }
            candidate += Duration::days(i64::from(ahead));
        }
    }
    candidate
}

impl TryFrom<ScheduleInput> for Schedule {
    type Error = FlotillaError;

    fn try_from(input: ScheduleInput) -> Result<Self, Self::Error> {
        Self::normalize(input)
    }
}

impl From<Schedule> for ScheduleInput {
    fn from(schedule: Schedule) -> Self {
        let timezone = schedule.timezone;
        match schedule.recurrence {
            Recurrence::IntervalHours(h) => ScheduleInput {
                schedule_type: "interval_hours".to_string(),
                every_hours: Some(h),
                timezone,
                ..Default::default()
            },
            Recurrence::IntervalDays(d) => ScheduleInput {
                schedule_type: "interval_days".to_string(),
                every_days: Some(d),
                timezone,
                ..Default::default()
            },
            Recurrence::Cron(spec) => ScheduleInput {
                schedule_type: "cron".to_string(),
                expression: Some(spec.to_string()),
                timezone,
                ..Default::default()
            },
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    fn at(y: i32, mo: u32, d: u32, h: u32, mi: u32) -> DateTime<Utc> {
        Utc.with_ymd_and_hms(y, mo, d, h, mi, 0).unwrap()
    }

    fn cron(expr: &str) -> Schedule {
        Schedule {
            recurrence: Recurrence::Cron(CronSpec::parse(expr).unwrap()),
            timezone: None,
        }
    }

    #[test]
    fn interval_hours_adds_from_anchor() {
        let s = Schedule {
            recurrence: Recurrence::IntervalHours(6),
            timezone: None,
        };
        assert_eq!(s.next_run_at(at(2026, 3, 10, 9, 15)), at(2026, 3, 10, 15, 15));
    }

    #[test]
    fn interval_days_preserves_time_of_day() {
        let s = Schedule {
            recurrence: Recurrence::IntervalDays(14),
            timezone: None,
        };
        assert_eq!(s.next_run_at(at(2026, 3, 10, 9, 15)), at(2026, 3, 24, 9, 15));
    }

    #[test]
    fn daily_cron_before_todays_slot_fires_today() {
        assert_eq!(
            cron("30 8 * * *").next_run_at(at(2026, 3, 10, 6, 0)),
            at(2026, 3, 10, 8, 30)
        );
    }

    #[test]
    fn daily_cron_after_todays_slot_fires_tomorrow() {
        assert_eq!(
            cron("30 8 * * *").next_run_at(at(2026, 3, 10, 9, 0)),
            at(2026, 3, 11, 8, 30)
        );
    }

    #[test]
    fn daily_cron_exactly_at_slot_fires_tomorrow() {
        // "strictly after" contract
        assert_eq!(
            cron("30 8 * * *").next_run_at(at(2026, 3, 10, 8, 30)),
            at(2026, 3, 11, 8, 30)
        );
    }

    #[test]
    fn weekly_cron_picks_next_matching_weekday() {
        // 2026-03-10 is a Tuesday; dow 1 = Monday.
        assert_eq!(
            cron("0 6 * * 1").next_run_at(at(2026, 3, 10, 12, 0)),
            at(2026, 3, 16, 6, 0)
        );
    }

    #[test]
    fn weekly_cron_same_day_earlier_time_fires_today() {
        // 2026-03-10 is a Tuesday; dow 2 = Tuesday.
        assert_eq!(
            cron("0 18 * * 2").next_run_at(at(2026, 3, 10, 12, 0)),
            at(2026, 3, 10, 18, 0)
        );
    }

    #[test]
    fn weekly_cron_same_day_past_time_waits_a_week() {
        assert_eq!(
            cron("0 6 * * 2").next_run_at(at(2026, 3, 10, 12, 0)),
            at(2026, 3, 17, 6, 0)
        );
    }

    #[test]
    fn normalize_rejects_bad_inputs() {
        assert!(Schedule::normalize(ScheduleInput {
            schedule_type: "interval_hours".to_string(),
            every_hours: Some(0),
            ..Default::default()
        })
        .is_err());
        assert!(Schedule::normalize(ScheduleInput {
            schedule_type: "interval_days".to_string(),
            ..Default::default()
        })
        .is_err());
        assert!(Schedule::normalize(ScheduleInput {
            schedule_type: "monthly".to_string(),
            ..Default::default()
        })
        .is_err());
    }

    #[test]
    fn serde_round_trips_through_wire_shape() {
        let raw = r#"{"type":"cron","expression":"0 7 * * 3","timezone":"Europe/Monaco"}"#;
        let s: Schedule = serde_json::from_str(raw).unwrap();
        assert_eq!(s.recurrence, Recurrence::Cron(CronSpec::parse("0 7 * * 3").unwrap()));
        assert_eq!(s.timezone.as_deref(), Some("Europe/Monaco"));

        let back = serde_json::to_value(&s).unwrap();
        assert_eq!(back["type"], "cron");
        assert_eq!(back["expression"], "0 7 * * 3");
    }

    #[test]
    fn serde_rejects_invalid_wire_schedule() {
        let raw = r#"{"type":"cron","expression":"*/5 * * * *"}"#;
        assert!(serde_json::from_str::<Schedule>(raw).is_err());
    }

    #[test]
    fn timezone_is_informational_only() {
        // Same expression with and without a timezone computes identically.
        let with_tz: Schedule =
            serde_json::from_str(r#"{"type":"cron","expression":"0 7 * * *","timezone":"Asia/Tokyo"}"#)
                .unwrap();
        let without: Schedule =
            serde_json::from_str(r#"{"type":"cron","expression":"0 7 * * *"}"#).unwrap();
        let from = at(2026, 3, 10, 3, 0);
        assert_eq!(with_tz.next_run_at(from), without.next_run_at(from));
    }
}
