use std::str::FromStr;

use chrono::{DateTime, TimeZone, Utc};
use chrono_tz::Tz;
use cron::Schedule;
use nanoclaw_protocol::ScheduleKind;

use crate::error::SchedulerError;

/// Computes the first fire time for a freshly created task.
pub fn initial_run(
    kind: ScheduleKind,
    value: &str,
    timezone: &str,
) -> Result<Option<DateTime<Utc>>, SchedulerError> {
    match kind {
        ScheduleKind::Once => parse_once(value).map(Some),
        _ => next_after(kind, value, timezone, Utc::now()),
    }
}

/// Computes the next fire time after a task has just fired at `fired_at`. `once` tasks never
/// recur: this always returns `None` for them, which the store interprets as completion.
pub fn next_after(
    kind: ScheduleKind,
    value: &str,
    timezone: &str,
    fired_at: DateTime<Utc>,
) -> Result<Option<DateTime<Utc>>, SchedulerError> {
    match kind {
        ScheduleKind::Once => Ok(None),
        ScheduleKind::Interval => parse_interval(value, fired_at).map(Some),
        ScheduleKind::Cron => next_cron_tick(value, timezone, fired_at).map(Some),
    }
}

fn parse_once(value: &str) -> Result<DateTime<Utc>, SchedulerError> {
    DateTime::parse_from_rfc3339(value)
        .map(|dt| dt.with_timezone(&Utc))
        .map_err(|_| SchedulerError::InvalidOnce(value.to_string()))
}

fn parse_interval(value: &str, from: DateTime<Utc>) -> Result<DateTime<Utc>, SchedulerError> {
    let ms: i64 = value.parse().map_err(|_| SchedulerError::InvalidInterval(value.to_string()))?;
    if ms <= 0 {
        return Err(SchedulerError::InvalidInterval(value.to_string()));
    }
    Ok(from + chrono::Duration::milliseconds(ms))
}

fn next_cron_tick(expression: &str, timezone: &str, from: DateTime<Utc>) -> Result<DateTime<Utc>, SchedulerError> {
    let tz: Tz = timezone.parse().map_err(|_| SchedulerError::InvalidTimezone(timezone.to_string()))?;
    // `cron`'s parser is quartz-style (seconds field first); the task-facing schedule value is
    // standard 5-field unix cron, so a bare seconds field of 0 is prepended before parsing.
    let quartz_expression = match expression.split_whitespace().count() {
        5 => format!("0 {expression}"),
        _ => expression.to_string(),
    };
    let schedule = Schedule::from_str(&quartz_expression)
        .map_err(|e| SchedulerError::InvalidCron(expression.to_string(), e.to_string()))?;
    let local_from = from.with_timezone(&tz);
    let next_local = schedule
        .after(&local_from)
        .next()
        .ok_or_else(|| SchedulerError::InvalidCron(expression.to_string(), "no future occurrence".to_string()))?;
    Ok(next_local.with_timezone(&Utc))
}
