//! Local-midnight arithmetic for the daily force-refresh.
//!
//! The delay is recomputed from the wall clock before every wait, so day
//! length changes and process pauses never accumulate drift.

use chrono::{DateTime, Days, NaiveDate, TimeZone, Utc};
use chrono_tz::Tz;
use std::time::Duration;

/// Start of the next local day strictly after `now`.
///
/// When local midnight falls inside a DST gap the first valid local instant
/// of that day is used instead.
pub fn next_local_midnight(now: DateTime<Utc>, timezone: Tz) -> DateTime<Utc> {
    let today = now.with_timezone(&timezone).date_naive();
    today
        .checked_add_days(Days::new(1))
        .and_then(|tomorrow| start_of_day(tomorrow, timezone))
        .unwrap_or_else(|| now + chrono::Duration::days(1))
}

pub fn delay_until_next_local_midnight(now: DateTime<Utc>, timezone: Tz) -> Duration {
    (next_local_midnight(now, timezone) - now)
        .to_std()
        .unwrap_or(Duration::ZERO)
}

fn start_of_day(date: NaiveDate, timezone: Tz) -> Option<DateTime<Utc>> {
    let midnight = date.and_hms_opt(0, 0, 0)?;
    // Gaps are at most a few hours and always on quarter-hour boundaries.
    (0..=4 * 4).find_map(|quarter| {
        let local = midnight + chrono::Duration::minutes(15 * quarter);
        timezone
            .from_local_datetime(&local)
            .earliest()
            .map(|dt| dt.with_timezone(&Utc))
    })
}
