//! Login throttling against password guessing

use std::collections::HashMap;
use std::sync::Arc;
use std::time::{Duration, Instant};
use tokio::sync::Mutex;
use tracing::warn;

/// Rate limiter configuration
#[derive(Debug, Clone)]
pub struct RateLimiterConfig {
    /// Failed attempts allowed within the window
    pub max_failures: u32,
    /// Time window in seconds
    pub window_seconds: u64,
    /// Lockout duration in seconds
    pub lockout_seconds: u64,
}

impl Default for RateLimiterConfig {
    fn default() -> Self {
        Self {
            max_failures: 5,
            window_seconds: 300,   // 5 minutes
            lockout_seconds: 3600, // 1 hour
        }
    }
}

/// Failure history of one key
#[derive(Debug)]
struct FailureEntry {
    failures: u32,
    window_start: Instant,
    locked_until: Option<Instant>,
}

/// Per-key failure counter with temporary lockout
#[derive(Debug, Clone)]
pub struct RateLimiter {
    config: RateLimiterConfig,
    entries: Arc<Mutex<HashMap<String, FailureEntry>>>,
}

impl RateLimiter {
    /// Create a new rate limiter
    pub fn new(config: RateLimiterConfig) -> Self {
        Self {
            config,
            entries: Arc::new(Mutex::new(HashMap::new())),
        }
    }

    /// Whether `key` is currently locked out
    pub async fn is_locked(&self, key: &str) -> bool {
        let mut entries = self.entries.lock().await;
        let now = Instant::now();

        let Some(locked_until) = entries.get(key).map(|entry| entry.locked_until) else {
            return false;
        };

        match locked_until {
            Some(until) if now < until => true,
            Some(_) => {
                entries.remove(key);
                false
            }
            None => false,
        }
    }

    /// Count a failed attempt for `key`, locking it once the limit is reached
    pub async fn record_failure(&self, key: &str) {
        let mut entries = self.entries.lock().await;
        let now = Instant::now();

        let entry = entries.entry(key.to_string()).or_insert(FailureEntry {
            failures: 0,
            window_start: now,
            locked_until: None,
        });

        if now.duration_since(entry.window_start) >= Duration::from_secs(self.config.window_seconds)
        {
            entry.failures = 0;
            entry.window_start = now;
        }

        entry.failures += 1;

        if entry.failures >= self.config.max_failures && entry.locked_until.is_none() {
            entry.locked_until = Some(now + Duration::from_secs(self.config.lockout_seconds));
            warn!(
                "Locked {} for {} seconds after {} failed logins",
                key, self.config.lockout_seconds, entry.failures
            );
        }
    }

    /// Forget the failures of `key` after a successful login
    pub async fn reset(&self, key: &str) {
        self.entries.lock().await.remove(key);
    }

    /// Get the rate limiter configuration
    pub fn config(&self) -> &RateLimiterConfig {
        &self.config
    }
}

impl Default for RateLimiter {
    fn default() -> Self {
        Self::new(RateLimiterConfig::default())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_locks_after_max_failures() {
        let limiter = RateLimiter::new(RateLimiterConfig {
            max_failures: 3,
            window_seconds: 300,
            lockout_seconds: 3600,
        });

        for _ in 0..2 {
            limiter.record_failure("employer:a@b.co").await;
            assert!(!limiter.is_locked("employer:a@b.co").await);
        }

        limiter.record_failure("employer:a@b.co").await;
        assert!(limiter.is_locked("employer:a@b.co").await);
        assert!(!limiter.is_locked("employer:other@b.co").await);
    }

    #[tokio::test]
    async fn test_reset_clears_failures() {
        let limiter = RateLimiter::default();
        assert_eq!(limiter.config().max_failures, 5);

        for _ in 0..4 {
            limiter.record_failure("admin:admin").await;
        }
        limiter.reset("admin:admin").await;
        limiter.record_failure("admin:admin").await;

        assert!(!limiter.is_locked("admin:admin").await);
    }

    #[tokio::test]
    async fn test_lockout_expires() {
        let limiter = RateLimiter::new(RateLimiterConfig {
            max_failures: 1,
            window_seconds: 300,
            lockout_seconds: 0,
        });

        limiter.record_failure("admin:admin").await;
        assert!(!limiter.is_locked("admin:admin").await);
    }
}
