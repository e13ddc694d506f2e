//! Restricted cron expressions for job schedules.
//!
//! Jobs only ever need "daily at HH:MM" and "weekly on day D at HH:MM", so
//! instead of a general cron engine we accept exactly two shapes:
//!
//! - `m h * * *`  for every day at h:m
//! - `m h * * d`  for every week on day d (0-6, Sunday = 0) at h:m
//!
//! Ranges, lists, steps and wildcards in the minute/hour fields are
//! rejected up front, at job creation time, rather than producing a
//! schedule that silently never fires.

use std::fmt;

use flotilla_core::FlotillaError;

/// A validated restricted cron expression.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct CronSpec {
    pub minute: u32,
    pub hour: u32,
    /// `None` for daily, `Some(0..=6)` for weekly (Sunday = 0).
    pub day_of_week: Option<u32>,
}

impl CronSpec {
    /// Parse `m h * * *` or `m h * * d`. Anything else is a validation error.
    pub fn parse(expression: &str) -> Result<Self, FlotillaError> {
        let fields: Vec<&str> = expression.split_whitespace().collect();
        if fields.len() != 5 {
            return Err(FlotillaError::validation(format!(
                "cron expression must have 5 fields, got {}: {expression:?}",
                fields.len()
            )));
        }
        if fields[2] != "*" || fields[3] != "*" {
            return Err(FlotillaError::validation(
                "only daily (m h * * *) and weekly (m h * * d) cron shapes are supported",
            ));
        }

        let minute = parse_field(fields[0], "minute", 59)?;
        let hour = parse_field(fields[1], "hour", 23)?;
        let day_of_week = match fields[4] {
            "*" => None,
            dow => Some(parse_field(dow, "day-of-week", 6)?),
        };

        Ok(Self {
            minute,
            hour,
            day_of_week,
        })
    }
}

fn parse_field(raw: &str, name: &str, max: u32) -> Result<u32, FlotillaError> {
    let value: u32 = raw.parse().map_err(|_| {
        FlotillaError::validation(format!("cron {name} field must be a number, got {raw:?}"))
    })?;
    if value > max {
        return Err(FlotillaError::validation(format!(
            "cron {name} field out of range: {value} > {max}"
        )));
    }
    Ok(value)
}

impl fmt::Display for CronSpec {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self.day_of_week {
            Some(dow) => write!(f, "{} {} * * {}", self.minute, self.hour, dow),
            None => write!(f, "{} {} * * *", self.minute, self.hour),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_daily_shape() {
        let spec = CronSpec::parse("30 8 * * *").unwrap();
        assert_eq!(spec.minute, 30);
        assert_eq!(spec.hour, 8);
        assert_eq!(spec.day_of_week, None);
    }

    #[test]
    fn parses_weekly_shape() {
        let spec = CronSpec::parse("0 6 * * 1").unwrap();
        assert_eq!(spec.day_of_week, Some(1));
        assert_eq!(spec.to_string(), "0 6 * * 1");
    }

    #[test]
    fn rejects_wrong_field_count() {
        assert!(CronSpec::parse("0 6 * *").is_err());
        assert!(CronSpec::parse("0 6 * * * *").is_err());
        assert!(CronSpec::parse("").is_err());
    }

    #[test]
    fn rejects_day_of_month_and_month_fields() {
        assert!(CronSpec::parse("0 6 1 * *").is_err());
        assert!(CronSpec::parse("0 6 * 3 *").is_err());
    }

    #[test]
    fn rejects_out_of_range_values() {
        assert!(CronSpec::parse("60 6 * * *").is_err());
        assert!(CronSpec::parse("0 24 * * *").is_err());
        assert!(CronSpec::parse("0 6 * * 7").is_err());
    }

    #[test]
    fn rejects_ranges_lists_and_steps() {
        assert!(CronSpec::parse("*/5 6 * * *").is_err());
        assert!(CronSpec::parse("0 6-8 * * *").is_err());
        assert!(CronSpec::parse("0,30 6 * * *").is_err());
        assert!(CronSpec::parse("* 6 * * *").is_err());
    }
}
