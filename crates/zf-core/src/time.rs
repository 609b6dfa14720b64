//! Wall-clock helpers.
//!
//! All controller timestamps are UTC; durations handed to the control
//! algorithms are plain minutes or seconds as `f64`.

use chrono::{DateTime, Duration, Utc};

pub type Timestamp = DateTime<Utc>;

/// Elapsed seconds from `earlier` to `now` (negative when the clock went back).
pub fn elapsed_seconds(now: Timestamp, earlier: Timestamp) -> f64 {
    (now - earlier).num_milliseconds() as f64 / 1000.0
}

/// Elapsed minutes from `earlier` to `now`.
pub fn elapsed_minutes(now: Timestamp, earlier: Timestamp) -> f64 {
    elapsed_seconds(now, earlier) / 60.0
}

/// Duration from fractional minutes, rounded to the millisecond.
pub fn minutes(value: f64) -> Duration {
    Duration::milliseconds((value * 60_000.0).round() as i64)
}
