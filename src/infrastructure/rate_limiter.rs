//! Rate Limiter
//!
//! Token bucket rate limiting per key. The dispatcher keys buckets by
//! campaign so each campaign is held to its own per-minute limit.
//!
//! A per-minute bucket holds a single token and refills one every `60/n`
//! seconds, so no 60 s window ever admits more than `n` requests.

use dashmap::DashMap;
use parking_lot::Mutex;
use std::hash::Hash;
use std::time::Duration;
use tokio::time::Instant;

/// Rate limiter configuration.
#[derive(Debug, Clone, PartialEq)]
pub struct RateLimitConfig {
    /// Maximum requests per window
    pub max_requests: u64,
    /// Time window for rate limiting
    pub window: Duration,
    /// Maximum burst size (token bucket capacity)
    pub burst_size: u64,
}

impl RateLimitConfig {
    /// `n` requests per minute, evenly paced.
    pub fn per_minute(n: u32) -> Self {
        Self {
            max_requests: u64::from(n.max(1)),
            window: Duration::from_secs(60),
            burst_size: 1,
        }
    }
}

impl Default for RateLimitConfig {
    fn default() -> Self {
        Self::per_minute(60)
    }
}

/// Result of a rate limit check.
#[derive(Debug, Clone, PartialEq)]
pub enum RateLimitResult {
    /// Request is allowed
    Allowed { remaining: u64 },
    /// Request is rate limited
    Limited { retry_after_ms: u64 },
}

impl RateLimitResult {
    pub fn is_allowed(&self) -> bool {
        matches!(self, Self::Allowed { .. })
    }
}

struct Bucket {
    capacity: f64,
    /// Tokens added per millisecond
    refill_rate_per_ms: f64,
    tokens: f64,
    last_refill: Instant,
}

impl Bucket {
    fn new(config: &RateLimitConfig) -> Self {
        let window_ms = config.window.as_millis().max(1) as f64;
        Self {
            capacity: config.burst_size.max(1) as f64,
            refill_rate_per_ms: config.max_requests as f64 / window_ms,
            tokens: config.burst_size.max(1) as f64,
            last_refill: Instant::now(),
        }
    }

    fn refill(&mut self, now: Instant) {
        let elapsed_ms = now.saturating_duration_since(self.last_refill).as_secs_f64() * 1000.0;
        self.tokens = (self.tokens + elapsed_ms * self.refill_rate_per_ms).min(self.capacity);
        self.last_refill = now;
    }

    fn try_take(&mut self, cost: f64) -> RateLimitResult {
        self.refill(Instant::now());
        if self.tokens >= cost {
            self.tokens -= cost;
            RateLimitResult::Allowed {
                remaining: self.tokens.floor() as u64,
            }
        } else {
            let deficit = cost - self.tokens;
            let wait_ms = (deficit / self.refill_rate_per_ms).ceil().max(1.0);
            RateLimitResult::Limited {
                retry_after_ms: wait_ms as u64,
            }
        }
    }
}

/// Token bucket rate limiter.
///
/// Keys without a configured bucket are not limited.
pub struct RateLimiter<K: Eq + Hash> {
    buckets: DashMap<K, Mutex<Bucket>>,
}

impl<K: Eq + Hash + Clone> RateLimiter<K> {
    pub fn new() -> Self {
        Self {
            buckets: DashMap::new(),
        }
    }

    /// Install (or reset to full) the bucket for `key`.
    pub fn configure(&self, key: K, config: &RateLimitConfig) {
        self.buckets.insert(key, Mutex::new(Bucket::new(config)));
    }

    /// Take one token for `key` if available.
    pub fn check(&self, key: &K) -> RateLimitResult {
        match self.buckets.get(key) {
            Some(bucket) => bucket.lock().try_take(1.0),
            None => RateLimitResult::Allowed { remaining: u64::MAX },
        }
    }

    /// Wait until a token for `key` is available and take it.
    pub async fn acquire(&self, key: &K) {
        loop {
            match self.check(key) {
                RateLimitResult::Allowed { .. } => return,
                RateLimitResult::Limited { retry_after_ms } => {
                    tokio::time::sleep(Duration::from_millis(retry_after_ms)).await;
                }
            }
        }
    }

    /// Whole tokens currently available for `key`.
    pub fn remaining(&self, key: &K) -> Option<u64> {
        self.buckets.get(key).map(|bucket| {
            let mut bucket = bucket.lock();
            bucket.refill(Instant::now());
            bucket.tokens.floor() as u64
        })
    }

    /// Drop the bucket for `key`.
    pub fn clear(&self, key: &K) {
        self.buckets.remove(key);
    }

    /// Number of tracked keys.
    pub fn len(&self) -> usize {
        self.buckets.len()
    }

    pub fn is_empty(&self) -> bool {
        self.buckets.is_empty()
    }
}

impl<K: Eq + Hash + Clone> Default for RateLimiter<K> {
    fn default() -> Self {
        Self::new()
    }
}
