//! Wall clock helpers
//!
//! Everything on disk is unix seconds.  Session tokens want something finer.
use std::convert::TryFrom;

use chrono::prelude::*;

/// Seconds since the epoch
pub(crate) fn unix_now() -> u64 {
    Utc::now().timestamp().max(0) as u64
}

/// Nanoseconds since the epoch
pub(crate) fn unix_nanos() -> u64 {
    // Saturates in 2262.
    Utc::now().timestamp_nanos_opt().unwrap_or(i64::MAX).max(0) as u64
}

/// `YYYY-MM-DD` for the given unix seconds, empty if chrono can't represent it
pub(crate) fn format_date(secs: u64) -> String {
    i64::try_from(secs)
        .ok()
        .and_then(|secs| Utc.timestamp_opt(secs, 0).single())
        .map(|t| t.format("%Y-%m-%d").to_string())
        .unwrap_or_default()
}
