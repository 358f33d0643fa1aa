//! Windows FILETIME helpers.
//!
//! Timestamps in [`crate::types::FileInfo`] are 100-nanosecond ticks since
//! 1601-01-01 UTC.

use std::time::{Duration, SystemTime, UNIX_EPOCH};

/// FILETIME value of the Unix epoch.
pub const EPOCH_AS_FILETIME: u64 = 116_444_736_000_000_000;

/// FILETIME ticks per second.
pub const TICKS_PER_SECOND: u64 = 10_000_000;

/// Current time as a FILETIME.
pub fn filetime_now() -> u64 {
    from_system_time(SystemTime::now())
}

/// Convert a `SystemTime` to FILETIME ticks. Times before 1601 clamp to 0.
pub fn from_system_time(time: SystemTime) -> u64 {
    match time.duration_since(UNIX_EPOCH) {
        Ok(after) => EPOCH_AS_FILETIME.saturating_add(duration_to_ticks(after)),
        Err(before) => EPOCH_AS_FILETIME.saturating_sub(duration_to_ticks(before.duration())),
    }
}

/// Convert FILETIME ticks to a `SystemTime`.
pub fn to_system_time(filetime: u64) -> SystemTime {
    if filetime >= EPOCH_AS_FILETIME {
        UNIX_EPOCH + ticks_to_duration(filetime - EPOCH_AS_FILETIME)
    } else {
        UNIX_EPOCH - ticks_to_duration(EPOCH_AS_FILETIME - filetime)
    }
}

/// Seconds since the Unix epoch, negative before 1970.
pub fn to_unix_seconds(filetime: u64) -> i64 {
    (filetime as i128 - EPOCH_AS_FILETIME as i128).div_euclid(TICKS_PER_SECOND as i128) as i64
}

fn duration_to_ticks(d: Duration) -> u64 {
    d.as_secs()
        .saturating_mul(TICKS_PER_SECOND)
        .saturating_add(u64::from(d.subsec_nanos() / 100))
}

fn ticks_to_duration(ticks: u64) -> Duration {
    Duration::new(
        ticks / TICKS_PER_SECOND,
        ((ticks % TICKS_PER_SECOND) * 100) as u32,
    )
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_unix_epoch_maps_to_constant() {
        assert_eq!(from_system_time(UNIX_EPOCH), EPOCH_AS_FILETIME);
        assert_eq!(to_system_time(EPOCH_AS_FILETIME), UNIX_EPOCH);
    }

    #[test]
    fn test_round_trip_at_tick_precision() {
        let t = UNIX_EPOCH + Duration::new(1_700_000_000, 123_456_700);
        assert_eq!(to_system_time(from_system_time(t)), t);
    }

    #[test]
    fn test_unix_seconds() {
        let ft = EPOCH_AS_FILETIME + 5 * TICKS_PER_SECOND;
        assert_eq!(to_unix_seconds(ft), 5);
        assert_eq!(to_unix_seconds(EPOCH_AS_FILETIME - 1), -1);
    }

    #[test]
    fn test_now_is_after_epoch() {
        assert!(filetime_now() > EPOCH_AS_FILETIME);
    }
}
