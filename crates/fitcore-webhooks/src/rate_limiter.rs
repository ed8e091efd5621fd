//! Per-subscription delivery rate limiting.
//!
//! Bounds delivery attempts to `rate_limit_per_minute` within any rolling
//! 60-second window using a sliding timestamp log (a token bucket can
//! exceed a rolling-window bound by its burst size, so the strict window is
//! kept explicitly). A denied permit defers the attempt to a later
//! dispatcher cycle; it never mutates ledger state and never counts as an
//! attempt.
//!
//! State is in-memory and per-process: rate limiting is a politeness
//! mechanism, not a correctness guarantee.

use std::collections::{HashMap, VecDeque};
use std::time::{Duration, Instant};

use tokio::sync::Mutex;
use uuid::Uuid;

/// Length of the rolling window.
const WINDOW: Duration = Duration::from_secs(60);

/// Sliding-window rate limiter for a single subscription.
#[derive(Debug)]
pub struct RateLimiter {
    limit: u32,
    hits: VecDeque<Instant>,
}

impl RateLimiter {
    /// Create a limiter allowing `limit` acquisitions per rolling minute.
    pub fn new(limit: u32) -> Self {
        Self {
            limit,
            hits: VecDeque::new(),
        }
    }

    /// Try to take a permit now.
    pub fn try_acquire(&mut self) -> bool {
        self.try_acquire_at(Instant::now())
    }

    /// Try to take a permit at an explicit instant.
    ///
    /// Exposed so tests can drive the window deterministically.
    pub fn try_acquire_at(&mut self, now: Instant) -> bool {
        self.evict_before(now);

        if self.hits.len() as u32 >= self.limit {
            return false;
        }

        self.hits.push_back(now);
        true
    }

    /// Permits still available in the window ending at `now`.
    pub fn available_at(&mut self, now: Instant) -> u32 {
        self.evict_before(now);
        self.limit.saturating_sub(self.hits.len() as u32)
    }

    /// Change the per-minute limit, keeping the current window history.
    pub fn set_limit(&mut self, limit: u32) {
        self.limit = limit;
    }

    /// Current per-minute limit.
    pub fn limit(&self) -> u32 {
        self.limit
    }

    fn evict_before(&mut self, now: Instant) {
        while let Some(&oldest) = self.hits.front() {
            if now.duration_since(oldest) >= WINDOW {
                self.hits.pop_front();
            } else {
                break;
            }
        }
    }
}

/// Registry of per-subscription rate limiters, keyed by subscription id.
///
/// Injected into the dispatcher so tests can drive it directly. Limits come
/// from the subscription row on every call, so an admin lowering
/// `rate_limit_per_minute` takes effect on the next cycle.
#[derive(Debug)]
pub struct RateLimiterRegistry {
    limiters: Mutex<HashMap<Uuid, RateLimiter>>,
}

impl RateLimiterRegistry {
    pub fn new() -> Self {
        Self {
            limiters: Mutex::new(HashMap::new()),
        }
    }

    /// Try to take a permit for a subscription at its current limit.
    pub async fn try_acquire(&self, webhook_id: Uuid, limit_per_minute: u32) -> bool {
        let mut limiters = self.limiters.lock().await;
        let limiter = limiters
            .entry(webhook_id)
            .or_insert_with(|| RateLimiter::new(limit_per_minute));

        if limiter.limit() != limit_per_minute {
            limiter.set_limit(limit_per_minute);
        }

        limiter.try_acquire()
    }

    /// Drop the limiter for a subscription (e.g. after deactivation),
    /// releasing its window history.
    pub async fn remove(&self, webhook_id: Uuid) {
        self.limiters.lock().await.remove(&webhook_id);
    }

    /// Drop all limiters.
    pub async fn clear(&self) {
        self.limiters.lock().await.clear();
    }

    /// Number of subscriptions with live limiter state.
    pub async fn count(&self) -> usize {
        self.limiters.lock().await.len()
    }
}

impl Default for RateLimiterRegistry {
    fn default() -> Self {
        Self::new()
    }
}
