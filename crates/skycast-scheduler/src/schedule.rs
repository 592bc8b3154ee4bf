//! Trigger schedule: five-field cron expressions evaluated in UTC.
//!
//! Expressions use the usual crontab layout (minute, hour, day of month,
//! month, day of week with 0 or 7 meaning Sunday). Internally they are
//! widened to the six-field, seconds-first form the job scheduler expects.

use std::str::FromStr;

use chrono::{DateTime, Duration, Timelike, Utc};
use cron::Schedule;

use skycast_weather::ScheduleInfo;

use crate::SchedulerError;

const WEEKDAYS: [&str; 7] = ["Sun", "Mon", "Tue", "Wed", "Thu", "Fri", "Sat"];

#[derive(Debug, Clone)]
pub struct TriggerSchedule {
    expression: String,
    job_expression: String,
    schedule: Schedule,
}

impl TriggerSchedule {
    /// Parse a five-field cron expression. Anything else is rejected.
    pub fn parse(expression: &str) -> Result<Self, SchedulerError> {
        let invalid = |reason: String| SchedulerError::InvalidSchedule {
            expression: expression.to_string(),
            reason,
        };

        let fields: Vec<&str> = expression.split_whitespace().collect();
        let [minute, hour, day, month, weekday] = fields.as_slice() else {
            return Err(invalid(format!("expected 5 fields, got {}", fields.len())));
        };

        let weekday = translate_day_of_week(weekday).map_err(invalid)?;
        let job_expression = format!("0 {minute} {hour} {day} {month} {weekday}");
        let schedule = Schedule::from_str(&job_expression).map_err(|e| invalid(e.to_string()))?;

        Ok(Self {
            expression: fields.join(" "),
            job_expression,
            schedule,
        })
    }

    /// The expression as configured
    pub fn expression(&self) -> &str {
        &self.expression
    }

    /// Six-field form handed to the job scheduler
    pub fn job_expression(&self) -> &str {
        &self.job_expression
    }

    /// Next fire time strictly after `instant`.
    pub fn next_after(&self, instant: DateTime<Utc>) -> Option<DateTime<Utc>> {
        self.schedule.after(&instant).next()
    }

    /// The next `count` fire times after `instant`.
    pub fn upcoming(&self, instant: DateTime<Utc>, count: usize) -> Vec<DateTime<Utc>> {
        self.schedule.after(&instant).take(count).collect()
    }

    /// Whether the schedule fires at `instant`, compared to the second.
    pub fn fires_at(&self, instant: DateTime<Utc>) -> bool {
        let Some(second) = instant.with_nanosecond(0) else {
            return false;
        };
        self.next_after(second - Duration::seconds(1)) == Some(second)
    }

    /// Human-readable frequency, e.g. "Twice daily at 12:00 and 22:00 UTC".
    pub fn describe(&self) -> String {
        let fields: Vec<&str> = self.expression.split_whitespace().collect();

        if let [minute, hours, "*", "*", "*"] = fields.as_slice() {
            if let (Ok(minute), Some(hours)) = (minute.parse::<u32>(), parse_hour_list(hours)) {
                let times: Vec<String> = hours
                    .iter()
                    .map(|h| format!("{:02}:{:02}", h, minute))
                    .collect();
                let frequency = if times.len() == 2 { "Twice daily" } else { "Daily" };
                return format!("{} at {} UTC", frequency, join_with_and(&times));
            }
        }

        format!("Cron \"{}\" (UTC)", self.expression)
    }

    pub fn schedule_info(
        &self,
        now: DateTime<Utc>,
        last_prediction: Option<DateTime<Utc>>,
    ) -> Option<ScheduleInfo> {
        Some(ScheduleInfo {
            next_prediction: self.next_after(now)?,
            schedule_frequency: self.describe(),
            last_prediction,
        })
    }
}

impl FromStr for TriggerSchedule {
    type Err = SchedulerError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::parse(s)
    }
}

fn parse_hour_list(field: &str) -> Option<Vec<u32>> {
    let mut hours = field
        .split(',')
        .map(|h| h.parse::<u32>().ok().filter(|h| *h < 24))
        .collect::<Option<Vec<_>>>()?;
    hours.sort_unstable();
    hours.dedup();
    Some(hours)
}

fn join_with_and(items: &[String]) -> String {
    match items {
        [] => String::new(),
        [only] => only.clone(),
        [init @ .., last] => format!("{} and {}", init.join(", "), last),
    }
}

/// Rewrite crontab day-of-week numbers (0-7, Sunday = 0 or 7) as names,
/// which the cron parser numbers differently.
fn translate_day_of_week(field: &str) -> Result<String, String> {
    field
        .split(',')
        .map(translate_day_item)
        .collect::<Result<Vec<_>, _>>()
        .map(|items| items.join(","))
}

fn translate_day_item(item: &str) -> Result<String, String> {
    let (range, step) = match item.split_once('/') {
        Some((range, step)) => (range, Some(step)),
        None => (item, None),
    };

    let translated = match range.split_once('-') {
        // A range ending on Sunday-as-7 wraps the week, split it in two
        Some((start, "7")) if step.is_none() => {
            let start = day_name(start)?;
            if start == "Sat" {
                "Sat,Sun".to_string()
            } else {
                format!("{}-Sat,Sun", start)
            }
        }
        Some((start, end)) => format!("{}-{}", day_name(start)?, day_name(end)?),
        None => day_name(range)?,
    };

    Ok(match step {
        Some(step) => format!("{}/{}", translated, step),
        None => translated,
    })
}

fn day_name(token: &str) -> Result<String, String> {
    match token.parse::<usize>() {
        Ok(n) if n <= 7 => Ok(WEEKDAYS[n % 7].to_string()),
        Ok(n) => Err(format!("day of week {} is out of range 0-7", n)),
        Err(_) => Ok(token.to_string()),
    }
}
