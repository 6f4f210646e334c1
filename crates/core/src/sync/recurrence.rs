//! Cron-style recurrence rules for sync jobs.
//!
//! Five fields, evaluated in UTC: `minute hour day-of-month month day-of-week`.
//! Each field accepts `*`, `*/n`, `a`, `a-b`, `a-b/n`, `a/n` and comma lists.
//! Day-of-week uses `0`-`6` with both `0` and `7` meaning Sunday.

use chrono::{DateTime, Datelike, Duration, DurationRound, NaiveDate, TimeZone, Timelike, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

use crate::errors::{Error, ValidationError};

/// How far ahead `next_after` searches before giving up.
const MAX_SEARCH_DAYS: i64 = 366 * 5;

/// A parsed recurrence rule.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct RecurrenceRule {
    expression: String,
    minutes: u64,
    hours: u32,
    days_of_month: u32,
    months: u16,
    days_of_week: u8,
    dom_restricted: bool,
    dow_restricted: bool,
}

impl RecurrenceRule {
    pub fn parse(expression: &str) -> Result<Self, Error> {
        let expression = expression.trim();
        let expanded = match expression {
            "@hourly" => "0 * * * *",
            "@daily" | "@midnight" => "0 0 * * *",
            "@weekly" => "0 0 * * 0",
            "@monthly" => "0 0 1 * *",
            other => other,
        };

        let fields: Vec<&str> = expanded.split_whitespace().collect();
        if fields.len() != 5 {
            return Err(invalid(
                expression,
                format!("expected 5 fields, found {}", fields.len()),
            ));
        }

        let minutes = parse_field(expression, fields[0], 0, 59)?;
        let hours = parse_field(expression, fields[1], 0, 23)?;
        let days_of_month = parse_field(expression, fields[2], 1, 31)?;
        let months = parse_field(expression, fields[3], 1, 12)?;
        let mut days_of_week = parse_field(expression, fields[4], 0, 7)?;
        if days_of_week & (1 << 7) != 0 {
            days_of_week = (days_of_week & !(1 << 7)) | 1;
        }

        Ok(Self {
            expression: expression.to_string(),
            minutes,
            hours: hours as u32,
            days_of_month: days_of_month as u32,
            months: months as u16,
            days_of_week: days_of_week as u8,
            dom_restricted: fields[2] != "*",
            dow_restricted: fields[4] != "*",
        })
    }

    pub fn expression(&self) -> &str {
        &self.expression
    }

    /// First trigger strictly after `now`, at minute precision.
    ///
    /// Returns `None` when the rule cannot fire within the search horizon
    /// (e.g. `0 0 31 2 *`).
    pub fn next_after(&self, now: DateTime<Utc>) -> Option<DateTime<Utc>> {
        let start = now.duration_trunc(Duration::minutes(1)).ok()? + Duration::minutes(1);
        let first_day = start.date_naive();

        for offset in 0..MAX_SEARCH_DAYS {
            let day = first_day + Duration::days(offset);
            if !self.matches_day(day) {
                continue;
            }
            let same_day = offset == 0;
            let first_hour = if same_day { start.hour() } else { 0 };
            for hour in first_hour..24 {
                if self.hours & (1 << hour) == 0 {
                    continue;
                }
                let first_minute = if same_day && hour == start.hour() {
                    start.minute()
                } else {
                    0
                };
                for minute in first_minute..60 {
                    if self.minutes & (1 << minute) != 0 {
                        let naive = day.and_hms_opt(hour, minute, 0)?;
                        return Some(Utc.from_utc_datetime(&naive));
                    }
                }
            }
        }
        None
    }

    fn matches_day(&self, day: NaiveDate) -> bool {
        if self.months & (1 << day.month()) == 0 {
            return false;
        }
        let dom = self.days_of_month & (1 << day.day()) != 0;
        let dow = self.days_of_week & (1 << day.weekday().num_days_from_sunday()) != 0;
        match (self.dom_restricted, self.dow_restricted) {
            (true, true) => dom || dow,
            (true, false) => dom,
            (false, true) => dow,
            (false, false) => true,
        }
    }
}

impl FromStr for RecurrenceRule {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::parse(s)
    }
}

impl TryFrom<String> for RecurrenceRule {
    type Error = Error;

    fn try_from(value: String) -> Result<Self, Self::Error> {
        Self::parse(&value)
    }
}

impl From<RecurrenceRule> for String {
    fn from(rule: RecurrenceRule) -> Self {
        rule.expression
    }
}

impl fmt::Display for RecurrenceRule {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.expression)
    }
}

fn invalid(rule: &str, reason: impl Into<String>) -> Error {
    Error::Validation(ValidationError::Recurrence {
        rule: rule.to_string(),
        reason: reason.into(),
    })
}

/// Parse one cron field into a bit set of allowed values.
fn parse_field(rule: &str, field: &str, min: u32, max: u32) -> Result<u64, Error> {
    let mut bits = 0u64;
    for part in field.split(',') {
        let (range, step) = match part.split_once('/') {
            Some((range, step)) => {
                let step: u32 = step
                    .parse()
                    .map_err(|_| invalid(rule, format!("bad step in '{}'", part)))?;
                if step == 0 {
                    return Err(invalid(rule, format!("zero step in '{}'", part)));
                }
                (range, step)
            }
            None => (part, 1),
        };

        let (start, end) = if range == "*" {
            (min, max)
        } else if let Some((a, b)) = range.split_once('-') {
            (parse_value(rule, a, min, max)?, parse_value(rule, b, min, max)?)
        } else {
            let value = parse_value(rule, range, min, max)?;
            // `a/n` runs from `a` to the end of the field.
            (value, if step > 1 { max } else { value })
        };

        if start > end {
            return Err(invalid(rule, format!("descending range '{}'", part)));
        }

        let mut value = start;
        while value <= end {
            bits |= 1 << value;
            value += step;
        }
    }
    Ok(bits)
}

fn parse_value(rule: &str, raw: &str, min: u32, max: u32) -> Result<u32, Error> {
    let value: u32 = raw
        .trim()
        .parse()
        .map_err(|_| invalid(rule, format!("'{}' is not a number", raw)))?;
    if value < min || value > max {
        return Err(invalid(
            rule,
            format!("{} is outside {}-{}", value, min, max),
        ));
    }
    Ok(value)
}
