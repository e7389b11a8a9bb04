// src/timer/cron.rs

//! Five-field cron expressions: "MIN HOUR DOM MON DOW".
//!
//! Fields support `*`, single values, ranges (`1-5`), lists (`0,15,30,45`)
//! and steps (`*/10`, `10-50/20`). Day-of-week accepts 0-7 with both 0 and
//! 7 meaning Sunday. When both day-of-month and day-of-week are restricted,
//! a date matches if either does, as classic cron has it.

use chrono::{DateTime, Datelike, Duration, Timelike, Utc};

use crate::errors::{CrondagError, Result};

/// A parsed cron expression.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CronSchedule {
    minutes: Vec<u32>,
    hours: Vec<u32>,
    days_of_month: Vec<u32>,
    months: Vec<u32>,
    days_of_week: Vec<u32>,
    dom_restricted: bool,
    dow_restricted: bool,
}

/// Parse an expression, failing with [`CrondagError::InvalidTrigger`].
pub fn parse(expression: &str) -> Result<CronSchedule> {
    let invalid = || CrondagError::InvalidTrigger(expression.to_string());

    let parts: Vec<&str> = expression.split_whitespace().collect();
    if parts.len() != 5 {
        return Err(invalid());
    }

    let minutes = parse_field(parts[0], 0, 59).ok_or_else(invalid)?;
    let hours = parse_field(parts[1], 0, 23).ok_or_else(invalid)?;
    let days_of_month = parse_field(parts[2], 1, 31).ok_or_else(invalid)?;
    let months = parse_field(parts[3], 1, 12).ok_or_else(invalid)?;
    let mut days_of_week = parse_field(parts[4], 0, 7).ok_or_else(invalid)?;

    // 7 is an alias for Sunday.
    for dow in days_of_week.iter_mut() {
        if *dow == 7 {
            *dow = 0;
        }
    }
    days_of_week.sort_unstable();
    days_of_week.dedup();

    Ok(CronSchedule {
        minutes,
        hours,
        days_of_month,
        months,
        days_of_week,
        dom_restricted: parts[2] != "*",
        dow_restricted: parts[4] != "*",
    })
}

/// Whether a string parses as a cron expression. Used to disambiguate
/// bare-string triggers (cron time vs task reference).
pub fn is_cron_expression(s: &str) -> bool {
    parse(s).is_ok()
}

impl CronSchedule {
    /// Next fire time strictly after `after`, with minute resolution.
    ///
    /// Scans forward one minute at a time, giving up after a year for
    /// expressions that can never match (e.g. February 30th).
    pub fn next_fire(&self, after: DateTime<Utc>) -> Option<DateTime<Utc>> {
        let mut candidate = (after + Duration::minutes(1))
            .with_second(0)?
            .with_nanosecond(0)?;

        for _ in 0..(366 * 24 * 60) {
            if self.matches(candidate) {
                return Some(candidate);
            }
            candidate += Duration::minutes(1);
        }

        None
    }

    fn matches(&self, t: DateTime<Utc>) -> bool {
        if !self.minutes.contains(&t.minute())
            || !self.hours.contains(&t.hour())
            || !self.months.contains(&t.month())
        {
            return false;
        }

        let dom = self.days_of_month.contains(&t.day());
        let dow = self.days_of_week.contains(&t.weekday().num_days_from_sunday());

        match (self.dom_restricted, self.dow_restricted) {
            (true, true) => dom || dow,
            (true, false) => dom,
            (false, true) => dow,
            (false, false) => true,
        }
    }
}

/// Parse one field into its sorted list of matching values.
fn parse_field(field: &str, min: u32, max: u32) -> Option<Vec<u32>> {
    let mut values = Vec::new();

    for item in field.split(',') {
        let (range, step) = match item.split_once('/') {
            Some((range, step)) => (range, step.parse::<usize>().ok().filter(|n| *n > 0)?),
            None => (item, 1),
        };

        let (lo, hi) = if range == "*" {
            (min, max)
        } else if let Some((a, b)) = range.split_once('-') {
            (a.parse().ok()?, b.parse().ok()?)
        } else {
            let v: u32 = range.parse().ok()?;
            // "5/15" means "starting at 5, every 15" in classic cron.
            if step == 1 { (v, v) } else { (v, max) }
        };

        if lo < min || hi > max || lo > hi {
            return None;
        }

        values.extend((lo..=hi).step_by(step));
    }

    values.sort_unstable();
    values.dedup();

    if values.is_empty() { None } else { Some(values) }
}
