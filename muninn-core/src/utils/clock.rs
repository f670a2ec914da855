//! Wall-clock and calendar helpers

use chrono::{DateTime, Datelike, Utc};
use std::time::{SystemTime, UNIX_EPOCH};

/// Current wall-clock time as epoch nanoseconds.
///
/// Saturates at zero if the system clock is before the epoch.
#[inline]
pub fn epoch_nanos() -> i64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|d| d.as_nanos().min(i64::MAX as u128) as i64)
        .unwrap_or(0)
}

/// UTC calendar day of an epoch-nanosecond timestamp, as `YYYYMMDD`.
#[inline]
pub fn utc_yyyymmdd(epoch_nanos: i64) -> u32 {
    let secs = epoch_nanos.div_euclid(1_000_000_000);
    let dt: DateTime<Utc> = DateTime::from_timestamp(secs, 0).unwrap_or_default();
    dt.year() as u32 * 10_000 + dt.month() * 100 + dt.day()
}
