use chrono::{DateTime, Duration, Utc};

use crate::models::PlayerRecord;

/// Whether the cached stats of `record` should be fetched again.
///
/// Stats are stale when absent, when they were computed over a different
/// history window, or when older than `max_age_days`.
pub fn is_stale(
    record: &PlayerRecord,
    max_age_days: u32,
    expected_window_years: u32,
    now: DateTime<Utc>,
) -> bool {
    let Some(stats) = &record.stats else {
        return true;
    };
    if stats.window_years != expected_window_years {
        return true;
    }
    now - stats.fetched_at > Duration::days(i64::from(max_age_days))
}

/// Compact human age such as `45s`, `5m`, `3h` or `2d`.
pub fn human_age(since: DateTime<Utc>, now: DateTime<Utc>) -> String {
    let secs = (now - since).num_seconds().max(0);
    match secs {
        s if s < 60 => format!("{s}s"),
        s if s < 3600 => format!("{}m", s / 60),
        s if s < 86_400 => format!("{}h", s / 3600),
        s => format!("{}d", s / 86_400),
    }
}
