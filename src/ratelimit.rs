use std::time::Duration;

use dashmap::DashMap;
use tokio::time::Instant;

use crate::config::ConfigStore;
use crate::error::AppError;

/// Per-key token bucket for rate limiting.
#[derive(Clone)]
pub struct RateLimitBucket {
    pub remaining: u32,
    pub last_refill: Instant,
}

/// Token-bucket rate limiter keyed by user id. A bucket holds `capacity`
/// tokens and refills fully over `window`.
pub struct RateLimiter {
    capacity: u32,
    window: Duration,
    buckets: DashMap<String, RateLimitBucket>,
}

impl RateLimiter {
    pub fn new(capacity: u32, window: Duration) -> Self {
        Self {
            capacity: capacity.max(1),
            window: window.max(Duration::from_secs(1)),
            buckets: DashMap::new(),
        }
    }

    /// Built from `api.rate_limit_per_user` and `api.rate_limit_window` (seconds).
    pub fn from_config(config: &dyn ConfigStore) -> Self {
        let capacity = config.get_u64("api.rate_limit_per_user", 10);
        let window = config.get_u64("api.rate_limit_window", 60);
        Self::new(
            u32::try_from(capacity).unwrap_or(u32::MAX),
            Duration::from_secs(window),
        )
    }

    pub fn capacity(&self) -> u32 {
        self.capacity
    }

    pub fn window(&self) -> Duration {
        self.window
    }

    /// Take one token for `key`. Returns the tokens left, or
    /// `AppError::RateLimited` when the bucket is empty.
    pub fn check(&self, key: &str) -> Result<u32, AppError> {
        self.check_at(key, Instant::now())
    }

    fn check_at(&self, key: &str, now: Instant) -> Result<u32, AppError> {
        let mut entry = self
            .buckets
            .entry(key.to_string())
            .or_insert_with(|| RateLimitBucket {
                remaining: self.capacity,
                last_refill: now,
            });
        let bucket = entry.value_mut();

        // Refill tokens based on elapsed time
        let elapsed = now.saturating_duration_since(bucket.last_refill);
        if elapsed >= self.window {
            bucket.remaining = self.capacity;
            bucket.last_refill = now;
        } else {
            let refill = (elapsed.as_secs_f64() / self.window.as_secs_f64() * self.capacity as f64)
                as u32;
            if refill > 0 {
                bucket.remaining = (bucket.remaining + refill).min(self.capacity);
                bucket.last_refill = now;
            }
        }

        if bucket.remaining == 0 {
            let until_refill = self
                .window
                .saturating_sub(now.saturating_duration_since(bucket.last_refill))
                .as_secs();
            return Err(AppError::RateLimited {
                retry_after: until_refill.max(1),
            });
        }

        bucket.remaining -= 1;
        Ok(bucket.remaining)
    }

    /// Drop buckets that have been idle for a full window.
    pub fn prune(&self) {
        let now = Instant::now();
        self.buckets
            .retain(|_, bucket| now.saturating_duration_since(bucket.last_refill) < self.window);
    }
}
