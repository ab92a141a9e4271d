//! Apple-epoch time conversion utilities.
//!
//! `chat.db` stores dates as nanoseconds since 2001-01-01T00:00:00Z.

use chrono::{DateTime, TimeZone, Utc};

/// Seconds between the Unix epoch and the Apple (Core Data) epoch.
pub const APPLE_EPOCH_OFFSET_SECS: i64 = 978_307_200;

const NANOS_PER_SEC: i64 = 1_000_000_000;

/// Convert a UTC datetime into Apple-epoch nanoseconds.
#[must_use]
pub fn datetime_to_apple_ns(dt: DateTime<Utc>) -> i64 {
    (dt.timestamp() - APPLE_EPOCH_OFFSET_SECS) * NANOS_PER_SEC + i64::from(dt.timestamp_subsec_nanos())
}

/// Convert Apple-epoch nanoseconds back into a UTC datetime.
#[must_use]
pub fn apple_ns_to_datetime(ns: i64) -> DateTime<Utc> {
    let secs = ns.div_euclid(NANOS_PER_SEC) + APPLE_EPOCH_OFFSET_SECS;
    let nanos = ns.rem_euclid(NANOS_PER_SEC) as u32;
    Utc.timestamp_opt(secs, nanos).single().unwrap_or_default()
}
