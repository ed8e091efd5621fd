//! Retry backoff schedule for failed deliveries.

use chrono::{DateTime, Duration, Utc};

/// Maximum automatic delivery attempts per delivery.
pub const MAX_RETRY_ATTEMPTS: i32 = 5;

/// Backoff schedule in seconds: 1 min, 5 min, 15 min, 1 hr, 2 hr.
///
/// Indexed by zero-based attempt number; attempts past the table length
/// (possible after manual retries) clamp to the last entry.
pub const RETRY_DELAYS_SECS: [i64; 5] = [60, 300, 900, 3600, 7200];

/// Compute when a delivery that just failed its `attempt_count`-th attempt
/// may run again.
///
/// Returns `None` once the attempt budget is spent — the delivery is
/// exhausted and only a manual retry can revive it.
pub fn next_retry_at(attempt_count: i32, max_attempts: i32) -> Option<DateTime<Utc>> {
    if attempt_count >= max_attempts {
        return None;
    }

    Some(Utc::now() + Duration::seconds(retry_delay_secs(attempt_count)))
}

/// Backoff delay after the `attempt_count`-th attempt, clamped to the table.
fn retry_delay_secs(attempt_count: i32) -> i64 {
    let idx = (attempt_count - 1).max(0) as usize;
    RETRY_DELAYS_SECS
        .get(idx)
        .copied()
        .unwrap_or(RETRY_DELAYS_SECS[RETRY_DELAYS_SECS.len() - 1])
}
