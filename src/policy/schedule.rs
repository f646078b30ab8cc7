//! Cron schedule expressions
//!
//! Five whitespace-separated fields: minute, hour, day-of-month, month,
//! day-of-week. Each field is `*`, a number, a `lo-hi` range, a `*/step` or
//! `lo-hi/step` step expression, or a comma list of those. Day-of-week runs
//! Sunday=0 through Saturday=6, with 7 accepted as Sunday.
//!
//! Matching follows the crontab convention for the two day fields: when both
//! are restricted, a timestamp matches if either field matches.

use crate::error::{Error, Result};
use chrono::{DateTime, Datelike, Timelike, Utc};
use std::collections::BTreeSet;
use std::fmt;

#[derive(Debug, Clone)]
struct Field {
    values: BTreeSet<u32>,
    wildcard: bool,
}

impl Field {
    fn contains(&self, value: u32) -> bool {
        self.wildcard || self.values.contains(&value)
    }
}

/// A parsed, validated cron expression
#[derive(Debug, Clone)]
pub struct Schedule {
    expression: String,
    minute: Field,
    hour: Field,
    day_of_month: Field,
    month: Field,
    day_of_week: Field,
}

impl Schedule {
    /// Parse and validate an expression; malformed input yields
    /// `InvalidSchedule` naming the offending field.
    pub fn parse(expression: &str) -> Result<Self> {
        let fields: Vec<&str> = expression.split_whitespace().collect();
        if fields.len() != 5 {
            return Err(Error::InvalidSchedule(format!(
                "expected 5 fields, got {} in '{}'",
                fields.len(),
                expression
            )));
        }

        Ok(Self {
            expression: expression.to_string(),
            minute: parse_field(fields[0], 0, 59, "minute")?,
            hour: parse_field(fields[1], 0, 23, "hour")?,
            day_of_month: parse_field(fields[2], 1, 31, "day-of-month")?,
            month: parse_field(fields[3], 1, 12, "month")?,
            day_of_week: parse_dow(fields[4])?,
        })
    }

    /// Whether the minute containing `now` is a scheduled occurrence.
    pub fn matches(&self, now: DateTime<Utc>) -> bool {
        if !self.minute.contains(now.minute())
            || !self.hour.contains(now.hour())
            || !self.month.contains(now.month())
        {
            return false;
        }

        let dom_hit = self.day_of_month.contains(now.day());
        let dow_hit = self
            .day_of_week
            .contains(now.weekday().num_days_from_sunday());

        match (self.day_of_month.wildcard, self.day_of_week.wildcard) {
            // Both restricted: crontab matches on either day field.
            (false, false) => dom_hit || dow_hit,
            _ => dom_hit && dow_hit,
        }
    }

    pub fn expression(&self) -> &str {
        &self.expression
    }
}

impl fmt::Display for Schedule {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.expression)
    }
}

fn parse_dow(spec: &str) -> Result<Field> {
    let mut field = parse_field(spec, 0, 7, "day-of-week")?;
    // 7 is an alias for Sunday.
    if field.values.remove(&7) {
        field.values.insert(0);
    }
    Ok(field)
}

fn parse_field(spec: &str, min: u32, max: u32, name: &str) -> Result<Field> {
    let invalid = |detail: &str| {
        Error::InvalidSchedule(format!("{} field '{}': {}", name, spec, detail))
    };

    if spec.is_empty() {
        return Err(invalid("empty"));
    }

    let mut values = BTreeSet::new();
    let mut wildcard = false;

    for part in spec.split(',') {
        let (range, step) = match part.split_once('/') {
            Some((range, step)) => {
                let step: u32 = step
                    .parse()
                    .map_err(|_| invalid("step is not a number"))?;
                if step == 0 {
                    return Err(invalid("step must be positive"));
                }
                (range, step)
            }
            None => (part, 1),
        };

        let (lo, hi) = if range == "*" {
            (min, max)
        } else if let Some((lo, hi)) = range.split_once('-') {
            let lo: u32 = lo.parse().map_err(|_| invalid("range start is not a number"))?;
            let hi: u32 = hi.parse().map_err(|_| invalid("range end is not a number"))?;
            if lo > hi {
                return Err(invalid("range is reversed"));
            }
            (lo, hi)
        } else {
            let value: u32 = range.parse().map_err(|_| invalid("not a number"))?;
            (value, value)
        };

        if lo < min || hi > max {
            return Err(invalid(&format!("out of range {}-{}", min, max)));
        }

        if range == "*" && step == 1 {
            wildcard = true;
        }
        values.extend((lo..=hi).step_by(step as usize));
    }

    Ok(Field { values, wildcard })
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    fn at(hour: u32, minute: u32) -> DateTime<Utc> {
        // 2024-03-01 is a Friday.
        Utc.with_ymd_and_hms(2024, 3, 1, hour, minute, 0).unwrap()
    }

    #[test]
    fn test_daily_at_time() {
        let schedule = Schedule::parse("10 9 * * *").unwrap();
        assert!(schedule.matches(at(9, 10)));
        assert!(!schedule.matches(at(9, 11)));
        assert!(!schedule.matches(at(10, 10)));
    }

    #[test]
    fn test_every_minute() {
        let schedule = Schedule::parse("* * * * *").unwrap();
        assert!(schedule.matches(at(0, 0)));
        assert!(schedule.matches(at(23, 59)));
    }

    #[test]
    fn test_step_and_list() {
        let schedule = Schedule::parse("*/15 2,14 * * *").unwrap();
        assert!(schedule.matches(at(2, 0)));
        assert!(schedule.matches(at(14, 45)));
        assert!(!schedule.matches(at(14, 10)));
        assert!(!schedule.matches(at(3, 0)));
    }

    #[test]
    fn test_range() {
        let schedule = Schedule::parse("0 9-17 * * *").unwrap();
        assert!(schedule.matches(at(9, 0)));
        assert!(schedule.matches(at(17, 0)));
        assert!(!schedule.matches(at(18, 0)));
    }

    #[test]
    fn test_day_of_week() {
        // 2024-03-01 is a Friday (dow 5).
        let friday_only = Schedule::parse("10 9 * * 5").unwrap();
        assert!(friday_only.matches(at(9, 10)));

        let sunday_only = Schedule::parse("10 9 * * 0").unwrap();
        assert!(!sunday_only.matches(at(9, 10)));

        // 7 aliases Sunday.
        let sunday_alias = Schedule::parse("10 9 * * 7").unwrap();
        assert!(!sunday_alias.matches(at(9, 10)));
    }

    #[test]
    fn test_restricted_day_fields_match_on_either() {
        // March 1st is a Friday; the 15th restriction misses but dow 5 hits.
        let schedule = Schedule::parse("10 9 15 * 5").unwrap();
        assert!(schedule.matches(at(9, 10)));

        // Neither day field matches on a Friday the 1st.
        let schedule = Schedule::parse("10 9 15 * 0").unwrap();
        assert!(!schedule.matches(at(9, 10)));
    }

    #[test]
    fn test_rejects_malformed_expressions() {
        assert!(Schedule::parse("invalid").is_err());
        assert!(Schedule::parse("0 2 * *").is_err());
        assert!(Schedule::parse("0 2 * * * *").is_err());
        assert!(Schedule::parse("60 * * * *").is_err());
        assert!(Schedule::parse("* 24 * * *").is_err());
        assert!(Schedule::parse("*/0 * * * *").is_err());
        assert!(Schedule::parse("5-2 * * * *").is_err());
        assert!(Schedule::parse("a * * * *").is_err());
    }

    #[test]
    fn test_parse_error_names_field() {
        let err = Schedule::parse("* 24 * * *").unwrap_err();
        assert!(err.to_string().contains("hour"));
    }
}
