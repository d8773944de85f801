//! Retry delay schedule

use std::time::Duration;

const BASE_DELAY: Duration = Duration::from_secs(15);
const MAX_DELAY: Duration = Duration::from_secs(6 * 60 * 60);

/// Delay before retry number `retry_count` (1-based): `15s * 2^(n-1)`, capped at 6 hours.
pub fn backoff(retry_count: u32) -> Duration {
    let exponent = retry_count.saturating_sub(1).min(20);
    BASE_DELAY
        .checked_mul(1 << exponent)
        .map_or(MAX_DELAY, |delay| delay.min(MAX_DELAY))
}

/// Unix-ms timestamp at which retry `retry_count` becomes due.
pub fn next_retry_at(now_ms: i64, retry_count: u32) -> i64 {
    let delay = i64::try_from(backoff(retry_count).as_millis()).unwrap_or(i64::MAX);
    now_ms.saturating_add(delay)
}

/// Like [`next_retry_at`], but never earlier than a server-requested `retry_after`.
pub fn retry_at(now_ms: i64, retry_count: u32, retry_after: Option<Duration>) -> i64 {
    let scheduled = next_retry_at(now_ms, retry_count);
    retry_after.map_or(scheduled, |wait| {
        let wait = i64::try_from(wait.as_millis()).unwrap_or(i64::MAX);
        scheduled.max(now_ms.saturating_add(wait))
    })
}
