//! Timing decisions for the lifecycle jobs.

use std::time::Duration;

use chrono::{DateTime, Utc};
use rand::Rng;

use crate::config::START_RETRY_BACKOFF_MAX_SECS;

/// How long a start trigger waits before its first fetch: until the start
/// time if it is known and ahead of `now`, otherwise the grace delay.
pub fn start_delay(start_time: Option<DateTime<Utc>>, now: DateTime<Utc>, grace: Duration) -> Duration {
    match start_time {
        Some(start) if start > now => (start - now).to_std().unwrap_or(grace),
        _ => grace,
    }
}

/// Delay before retry number `attempt` (1-based) of a failed start fetch.
pub fn retry_backoff(base: Duration, attempt: u32) -> Duration {
    let factor = 1u32 << attempt.saturating_sub(1).min(16);
    base.saturating_mul(factor)
        .min(Duration::from_secs(START_RETRY_BACKOFF_MAX_SECS))
}

/// Uniform random offset in `[0, max]`.
pub fn jitter(max: Duration) -> Duration {
    let max_ms = max.as_millis().min(u128::from(u64::MAX)) as u64;
    if max_ms == 0 {
        return Duration::ZERO;
    }
    Duration::from_millis(rand::rng().random_range(0..=max_ms))
}
