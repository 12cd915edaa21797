//! Cron expression parsing.

use chrono::{DateTime, Utc};
use cron::Schedule;

use crate::errors::TriggerError;

/// Convert a 5-field cron expression to the 7-field format the `cron` crate
/// expects. 6 and 7 field expressions already carry seconds and pass through.
///
/// Standard cron: `min hour day month weekday`
/// Cron crate:    `sec min hour day month weekday year`
pub(crate) fn normalize_cron_expression(expr: &str) -> String {
    let fields: Vec<&str> = expr.split_whitespace().collect();
    match fields.len() {
        5 => format!("0 {} *", fields.join(" ")),
        _ => fields.join(" "),
    }
}

pub(crate) fn parse_cron(expr: &str) -> Result<Schedule, TriggerError> {
    normalize_cron_expression(expr)
        .parse()
        .map_err(|e| TriggerError::Config {
            message: format!("invalid cron expression '{expr}': {e}"),
        })
}

/// The first occurrence strictly after `now`.
pub(crate) fn next_occurrence(schedule: &Schedule, now: DateTime<Utc>) -> Option<DateTime<Utc>> {
    schedule.after(&now).next()
}
