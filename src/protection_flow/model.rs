use chrono::{DateTime, Utc};
use croner::Cron;
use error::FlowError;

use super::error;

/// Computes the next fire time strictly after `now` (spec §4.9's
/// `NextFireAfter(now) -> time` contract).
pub fn next_execution_time(cron_expr: &str, now: DateTime<Utc>) -> Result<DateTime<Utc>, FlowError> {
    let cron = Cron::new(cron_expr)
        .parse()
        .map_err(|e| FlowError::InvalidSchedule(format!("{}: {}", cron_expr, e)))?;
    cron.find_next_occurrence(&now, false)
        .map_err(|e| FlowError::InvalidSchedule(format!("{}: {}", cron_expr, e)))
}

/// Full if there is no chain yet (or the policy forces full); incremental
/// otherwise (spec §4.9).
pub fn decide_backup_type(chain_exists: bool, force_full: bool) -> &'static str {
    if !chain_exists || force_full {
        "full"
    } else {
        "incremental"
    }
}

/// Aggregation rule for a completed execution (spec §4.9).
pub fn rollup_status(completed: i64, failed: i64, skipped: i64, cancelled: bool) -> &'static str {
    if cancelled {
        "cancelled"
    } else if failed > 0 {
        "error"
    } else if skipped > 0 {
        "warning"
    } else if completed > 0 {
        "success"
    } else {
        "warning"
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn rollup_all_success() {
        assert_eq!(rollup_status(3, 0, 0, false), "success");
    }

    #[test]
    fn rollup_any_failure_is_error() {
        assert_eq!(rollup_status(2, 1, 0, false), "error");
    }

    #[test]
    fn rollup_skipped_without_failure_is_warning() {
        assert_eq!(rollup_status(2, 0, 1, false), "warning");
    }

    #[test]
    fn decide_backup_type_defaults_to_full_with_no_chain() {
        assert_eq!(decide_backup_type(false, false), "full");
        assert_eq!(decide_backup_type(true, false), "incremental");
        assert_eq!(decide_backup_type(true, true), "full");
    }
}
