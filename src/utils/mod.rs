//! Utilities Module
//!
//! Common utilities used across the crate.

pub mod json;
pub mod logging;

/// Current time as unix nanoseconds, used to stamp exported files
pub fn unix_nanos() -> i64 {
    let now = chrono::Utc::now();
    now.timestamp_nanos_opt()
        .unwrap_or_else(|| now.timestamp_micros().saturating_mul(1_000))
}
