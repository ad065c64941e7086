//! Cron utility functions for calculating next scheduled times

use chrono::{DateTime, Utc};
use cron::Schedule;
use std::str::FromStr;

/// Calculate the next occurrence of a cron expression
///
/// Returns `None` when the expression is invalid or has no future schedules.
pub fn next_cron_occurrence(cron_expression: &str) -> Option<DateTime<Utc>> {
    Schedule::from_str(cron_expression)
        .ok()
        .and_then(|schedule| schedule.upcoming(Utc).next())
}

/// Validate a cron expression, returning a human-readable error
pub fn validate_cron_expression(cron_expression: &str) -> Result<(), String> {
    Schedule::from_str(cron_expression)
        .map(|_| ())
        .map_err(|e| format!("Invalid cron expression '{cron_expression}': {e}"))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn valid_expression_has_future_occurrence() {
        let next = next_cron_occurrence("0 0 3 * * * *");
        assert!(next.is_some());
        assert!(next.unwrap() > Utc::now());
    }

    #[test]
    fn invalid_expression_is_rejected() {
        assert!(next_cron_occurrence("not-a-cron").is_none());
        assert!(validate_cron_expression("not-a-cron").is_err());
        assert!(validate_cron_expression("0 30 2 * * * *").is_ok());
    }
}
