//! Sliding-window rate limiter
//!
//! Guards sensitive mutation endpoints against brute-force attempts. State
//! is keyed by `lowercase(world):lowercase(subject)` and holds the failure
//! timestamps inside a trailing window; reads prune, writes prune and
//! append. The read-modify-write in `record_failed_attempt` runs under a
//! short-lived per-key lock with a bounded wait - on contention the limiter
//! FAILS OPEN: the caller is reported not-rate-limited and nothing is
//! recorded, so lock trouble can never block legitimate traffic.

use dashmap::DashMap;
use std::sync::Arc;
use std::time::{Duration, Instant};
use tokio::sync::Mutex;
use tracing::{debug, warn};

/// Limiter tuning
#[derive(Debug, Clone)]
pub struct RateLimiterConfig {
    /// Failures allowed inside the window before limiting kicks in
    pub max_attempts: usize,
    /// Trailing window length
    pub window: Duration,
    /// Bounded wait for the per-key lock
    pub lock_timeout: Duration,
}

impl Default for RateLimiterConfig {
    fn default() -> Self {
        Self {
            max_attempts: 3,
            window: Duration::from_secs(60),
            lock_timeout: Duration::from_millis(500),
        }
    }
}

struct AttemptState {
    timestamps: Vec<Instant>,
    touched_at: Instant,
}

/// Sliding-window failure counter with per-key locking
pub struct SlidingWindowRateLimiter {
    config: RateLimiterConfig,
    attempts: DashMap<String, AttemptState>,
    locks: DashMap<String, Arc<Mutex<()>>>,
}

fn state_key(world: &str, subject: &str) -> String {
    format!("{}:{}", world.to_lowercase(), subject.to_lowercase())
}

impl SlidingWindowRateLimiter {
    pub fn new(config: RateLimiterConfig) -> Self {
        Self {
            config,
            attempts: DashMap::new(),
            locks: DashMap::new(),
        }
    }

    /// State entries idle longer than this are eligible for eviction;
    /// slightly longer than the window so a saturated key cannot expire
    /// mid-window.
    fn state_ttl(&self) -> Duration {
        self.config.window + Duration::from_secs(10)
    }

    fn lock_handle(&self, key: &str) -> Arc<Mutex<()>> {
        self.locks
            .entry(key.to_string())
            .or_insert_with(|| Arc::new(Mutex::new(())))
            .clone()
    }

    /// Count of failures still inside the window. Pure read, no mutation.
    fn live_count(&self, key: &str) -> usize {
        // checked_sub: a monotonic clock younger than the window has no cutoff
        let cutoff = Instant::now().checked_sub(self.config.window);
        self.attempts
            .get(key)
            .map(|state| {
                state
                    .timestamps
                    .iter()
                    .filter(|t| cutoff.is_none_or(|c| **t > c))
                    .count()
            })
            .unwrap_or(0)
    }

    /// Whether the pair is currently rate limited. Never mutates state.
    pub fn is_rate_limited(&self, world: &str, subject: &str) -> bool {
        self.live_count(&state_key(world, subject)) >= self.config.max_attempts
    }

    /// Record one failed attempt. Returns whether the pair is rate limited.
    ///
    /// Already-saturated keys are reported limited without recording beyond
    /// the limit. If the per-key lock cannot be acquired inside the bounded
    /// wait, the limiter fails open.
    pub async fn record_failed_attempt(&self, world: &str, subject: &str) -> bool {
        let key = state_key(world, subject);
        let lock = self.lock_handle(&key);

        let Ok(_guard) = tokio::time::timeout(self.config.lock_timeout, lock.lock()).await else {
            warn!(key = %key, "Rate-limiter lock contended, failing open");
            return false;
        };
        // From here the guard releases on every exit path

        let now = Instant::now();
        let cutoff = now.checked_sub(self.config.window);

        let mut state = self.attempts.entry(key.clone()).or_insert_with(|| AttemptState {
            timestamps: Vec::new(),
            touched_at: now,
        });

        state.timestamps.retain(|t| cutoff.is_none_or(|c| *t > c));
        state.touched_at = now;

        if state.timestamps.len() >= self.config.max_attempts {
            debug!(key = %key, "Rate limit saturated, not recording further");
            return true;
        }

        state.timestamps.push(now);
        false
    }

    /// Forget every failure for the pair (called after a successful
    /// authenticated action).
    pub fn clear_attempts(&self, world: &str, subject: &str) {
        let key = state_key(world, subject);
        self.attempts.remove(&key);
        self.locks.remove(&key);
    }

    /// Evict idle state and orphaned locks; returns evicted state entries.
    pub fn purge_expired(&self) -> usize {
        let ttl = self.state_ttl();
        let before = self.attempts.len();
        self.attempts.retain(|_, state| state.touched_at.elapsed() <= ttl);
        self.locks.retain(|key, _| self.attempts.contains_key(key));
        before - self.attempts.len()
    }
}
