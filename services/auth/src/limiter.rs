//! Rate limiter for preventing credential-guessing attacks
//!
//! Keyed attempt counters over a fixed, lazily-rolled window plus an
//! explicit lockout that outlives the window. The limiter itself never
//! decides to block anyone: `check_limit` is an advisory read and
//! `increment`/`block` are only called by the session service once it knows
//! the true outcome of an attempt, so retried requests are never counted
//! twice.

use std::collections::HashMap;
use std::sync::Arc;
use std::time::{Duration, Instant};
use tokio::sync::Mutex;
use tracing::warn;

/// Rate limiter configuration
#[derive(Debug, Clone)]
pub struct RateLimiterConfig {
    /// Maximum number of failed attempts allowed per window
    pub max_attempts: u32,
    /// Counting window
    pub window: Duration,
    /// Failed-attempt count at which an explicit lockout is imposed
    pub lockout_threshold: u32,
    /// Lockout duration
    pub lockout_duration: Duration,
}

impl Default for RateLimiterConfig {
    fn default() -> Self {
        Self {
            max_attempts: 10,
            window: Duration::from_secs(60),
            lockout_threshold: 20,
            lockout_duration: Duration::from_secs(3600), // 1 hour
        }
    }
}

impl RateLimiterConfig {
    /// Create a new RateLimiterConfig from environment variables
    ///
    /// # Environment Variables
    /// - `AUTH_RATE_LIMIT_MAX_ATTEMPTS`: Attempts per window (default: 10)
    /// - `AUTH_RATE_LIMIT_WINDOW_SECONDS`: Window length (default: 60)
    /// - `AUTH_RATE_LIMIT_LOCKOUT_THRESHOLD`: Lockout threshold (default: 20)
    /// - `AUTH_RATE_LIMIT_LOCKOUT_SECONDS`: Lockout length (default: 3600)
    pub fn from_env() -> Self {
        let defaults = Self::default();

        let max_attempts = std::env::var("AUTH_RATE_LIMIT_MAX_ATTEMPTS")
            .ok()
            .and_then(|v| v.parse().ok())
            .unwrap_or(defaults.max_attempts);

        let window = std::env::var("AUTH_RATE_LIMIT_WINDOW_SECONDS")
            .ok()
            .and_then(|v| v.parse().ok())
            .map(Duration::from_secs)
            .unwrap_or(defaults.window);

        let lockout_threshold = std::env::var("AUTH_RATE_LIMIT_LOCKOUT_THRESHOLD")
            .ok()
            .and_then(|v| v.parse().ok())
            .unwrap_or(defaults.lockout_threshold);

        let lockout_duration = std::env::var("AUTH_RATE_LIMIT_LOCKOUT_SECONDS")
            .ok()
            .and_then(|v| v.parse().ok())
            .map(Duration::from_secs)
            .unwrap_or(defaults.lockout_duration);

        Self {
            max_attempts,
            window,
            lockout_threshold,
            lockout_duration,
        }
    }
}

/// Per-key limiter state
#[derive(Debug)]
struct KeyState {
    /// Failed attempts within the current window
    attempts: u32,
    /// Timestamp anchoring the current window
    window_start: Instant,
    /// Active lockout, authoritative over the counter until it elapses
    blocked_until: Option<Instant>,
}

impl KeyState {
    fn new(now: Instant) -> Self {
        Self {
            attempts: 0,
            window_start: now,
            blocked_until: None,
        }
    }

    /// Reset the counter if the window has elapsed (lazy rollover)
    fn roll_window(&mut self, window: Duration, now: Instant) {
        if now.duration_since(self.window_start) >= window {
            self.attempts = 0;
            self.window_start = now;
        }
    }

    fn is_blocked(&self, now: Instant) -> bool {
        self.blocked_until.is_some_and(|until| now < until)
    }
}

/// Rate limiter over a keyed in-memory store
///
/// All mutations for a key happen under one lock, so concurrent failed
/// logins can never undercount attempts.
#[derive(Debug, Clone)]
pub struct RateLimiter {
    config: RateLimiterConfig,
    entries: Arc<Mutex<HashMap<String, KeyState>>>,
}

impl RateLimiter {
    /// Create a new rate limiter
    pub fn new(config: RateLimiterConfig) -> Self {
        Self {
            config,
            entries: Arc::new(Mutex::new(HashMap::new())),
        }
    }

    /// Check whether an attempt for this key is currently allowed
    ///
    /// Advisory read: blocked keys are refused without touching the counter,
    /// otherwise the window is rolled if elapsed and the counter compared to
    /// the limit. Never counts anything itself.
    pub async fn check_limit(&self, key: &str) -> bool {
        self.check_limit_at(key, Instant::now()).await
    }

    async fn check_limit_at(&self, key: &str, now: Instant) -> bool {
        let mut entries = self.entries.lock().await;
        let entry = entries
            .entry(key.to_string())
            .or_insert_with(|| KeyState::new(now));

        if entry.is_blocked(now) {
            return false;
        }
        entry.blocked_until = None;

        entry.roll_window(self.config.window, now);
        entry.attempts < self.config.max_attempts
    }

    /// Record one failed attempt for this key, returning the updated count
    ///
    /// Called after an attempt is known to have failed, never before.
    pub async fn increment(&self, key: &str) -> u32 {
        self.increment_at(key, Instant::now()).await
    }

    async fn increment_at(&self, key: &str, now: Instant) -> u32 {
        let mut entries = self.entries.lock().await;
        let entry = entries
            .entry(key.to_string())
            .or_insert_with(|| KeyState::new(now));

        entry.roll_window(self.config.window, now);
        entry.attempts += 1;
        entry.attempts
    }

    /// Impose an explicit lockout on this key
    ///
    /// Extends but never shortens an existing lockout. The counter is left
    /// untouched; the lockout is authoritative over it until it elapses.
    pub async fn block(&self, key: &str, duration: Duration, reason: &str) {
        self.block_at(key, duration, reason, Instant::now()).await;
    }

    async fn block_at(&self, key: &str, duration: Duration, reason: &str, now: Instant) {
        let mut entries = self.entries.lock().await;
        let entry = entries
            .entry(key.to_string())
            .or_insert_with(|| KeyState::new(now));

        let until = now + duration;
        if entry.blocked_until.is_none_or(|existing| until > existing) {
            entry.blocked_until = Some(until);
        }

        warn!(
            "Blocked key {} for {}s (reason: {})",
            key,
            duration.as_secs(),
            reason
        );
    }

    /// Check whether this key is under an active lockout; pure read
    pub async fn is_blocked(&self, key: &str) -> bool {
        self.is_blocked_at(key, Instant::now()).await
    }

    async fn is_blocked_at(&self, key: &str, now: Instant) -> bool {
        let entries = self.entries.lock().await;
        entries.get(key).is_some_and(|entry| entry.is_blocked(now))
    }

    /// Read the current attempt count for this key; pure read
    ///
    /// Counts are only reconciled against the window inside
    /// `check_limit`/`increment`, so a stale count may be reported for a key
    /// that has not been touched since its window elapsed.
    pub async fn attempts(&self, key: &str) -> u32 {
        let entries = self.entries.lock().await;
        entries.get(key).map_or(0, |entry| entry.attempts)
    }

    /// Get the rate limiter configuration
    pub fn config(&self) -> &RateLimiterConfig {
        &self.config
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serial_test::serial;

    fn test_config() -> RateLimiterConfig {
        RateLimiterConfig {
            max_attempts: 10,
            window: Duration::from_secs(60),
            lockout_threshold: 20,
            lockout_duration: Duration::from_secs(900),
        }
    }

    #[tokio::test]
    async fn test_eleventh_attempt_is_refused() {
        let limiter = RateLimiter::new(test_config());
        let now = Instant::now();

        for _ in 0..10 {
            assert!(limiter.check_limit_at("10.0.0.1", now).await);
            limiter.increment_at("10.0.0.1", now).await;
        }

        assert_eq!(limiter.attempts("10.0.0.1").await, 10);
        assert!(!limiter.check_limit_at("10.0.0.1", now).await);
    }

    #[tokio::test]
    async fn test_keys_are_independent() {
        let limiter = RateLimiter::new(test_config());
        let now = Instant::now();

        for _ in 0..10 {
            limiter.increment_at("10.0.0.1", now).await;
        }

        assert!(!limiter.check_limit_at("10.0.0.1", now).await);
        assert!(limiter.check_limit_at("10.0.0.2", now).await);
    }

    #[tokio::test]
    async fn test_window_rollover_resets_counter() {
        let limiter = RateLimiter::new(test_config());
        let now = Instant::now();

        for _ in 0..10 {
            limiter.increment_at("key", now).await;
        }
        assert!(!limiter.check_limit_at("key", now).await);

        // One second past the window the counter starts over.
        let later = now + Duration::from_secs(61);
        assert!(limiter.check_limit_at("key", later).await);
        assert_eq!(limiter.increment_at("key", later).await, 1);
    }

    #[tokio::test]
    async fn test_attempt_count_is_lazy_across_window_boundary() {
        let limiter = RateLimiter::new(test_config());
        let now = Instant::now();

        limiter.increment_at("key", now).await;
        limiter.increment_at("key", now).await;

        // No check or increment has run since the window elapsed, so the
        // stale count is still visible to the diagnostics read.
        assert_eq!(limiter.attempts("key").await, 2);
    }

    #[tokio::test]
    async fn test_block_refuses_without_touching_counter() {
        let limiter = RateLimiter::new(test_config());
        let now = Instant::now();

        limiter.increment_at("key", now).await;
        limiter
            .block_at("key", Duration::from_secs(300), "brute_force", now)
            .await;

        assert!(limiter.is_blocked_at("key", now).await);
        assert!(!limiter.check_limit_at("key", now).await);
        assert_eq!(limiter.attempts("key").await, 1);
    }

    #[tokio::test]
    async fn test_block_elapses() {
        let limiter = RateLimiter::new(test_config());
        let now = Instant::now();

        limiter
            .block_at("key", Duration::from_secs(300), "brute_force", now)
            .await;

        assert!(limiter.is_blocked_at("key", now + Duration::from_secs(299)).await);
        assert!(!limiter.is_blocked_at("key", now + Duration::from_secs(301)).await);
        assert!(limiter.check_limit_at("key", now + Duration::from_secs(301)).await);
    }

    #[test]
    #[serial]
    fn test_config_from_env_defaults() {
        unsafe {
            std::env::remove_var("AUTH_RATE_LIMIT_MAX_ATTEMPTS");
            std::env::remove_var("AUTH_RATE_LIMIT_WINDOW_SECONDS");
            std::env::remove_var("AUTH_RATE_LIMIT_LOCKOUT_THRESHOLD");
            std::env::remove_var("AUTH_RATE_LIMIT_LOCKOUT_SECONDS");
        }

        let config = RateLimiterConfig::from_env();
        assert_eq!(config.max_attempts, 10);
        assert_eq!(config.window, Duration::from_secs(60));
        assert_eq!(config.lockout_threshold, 20);
        assert_eq!(config.lockout_duration, Duration::from_secs(3600));
    }

    #[test]
    #[serial]
    fn test_config_from_env_with_custom_values() {
        unsafe {
            std::env::set_var("AUTH_RATE_LIMIT_MAX_ATTEMPTS", "5");
            std::env::set_var("AUTH_RATE_LIMIT_WINDOW_SECONDS", "300");
            std::env::set_var("AUTH_RATE_LIMIT_LOCKOUT_THRESHOLD", "8");
            std::env::set_var("AUTH_RATE_LIMIT_LOCKOUT_SECONDS", "7200");
        }

        let config = RateLimiterConfig::from_env();
        assert_eq!(config.max_attempts, 5);
        assert_eq!(config.window, Duration::from_secs(300));
        assert_eq!(config.lockout_threshold, 8);
        assert_eq!(config.lockout_duration, Duration::from_secs(7200));

        unsafe {
            std::env::remove_var("AUTH_RATE_LIMIT_MAX_ATTEMPTS");
            std::env::remove_var("AUTH_RATE_LIMIT_WINDOW_SECONDS");
            std::env::remove_var("AUTH_RATE_LIMIT_LOCKOUT_THRESHOLD");
            std::env::remove_var("AUTH_RATE_LIMIT_LOCKOUT_SECONDS");
        }
    }

    #[tokio::test]
    async fn test_block_never_shortens_an_existing_lockout() {
        let limiter = RateLimiter::new(test_config());
        let now = Instant::now();

        limiter
            .block_at("key", Duration::from_secs(600), "brute_force", now)
            .await;
        limiter
            .block_at("key", Duration::from_secs(60), "captcha_failures", now)
            .await;

        assert!(limiter.is_blocked_at("key", now + Duration::from_secs(300)).await);
    }
}
