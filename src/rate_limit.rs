//! Token-bucket limiter for expensive operations, keyed by caller.
//!
//! Built once at startup and shared through the server state.

use crate::error::{AppError, Result};
use chrono::Utc;
use std::collections::HashMap;
use std::time::{Duration, Instant};
use tokio::sync::Mutex;

#[derive(Debug, Clone)]
struct Bucket {
    tokens: f64,
    last_refill: Instant,
}

#[derive(Debug)]
pub struct RateLimiter {
    capacity: f64,
    refill_per_sec: f64,
    buckets: Mutex<HashMap<String, Bucket>>,
}

impl RateLimiter {
    /// `capacity` calls, refilled evenly over `period`.
    pub fn new(capacity: u32, period: Duration) -> Self {
        let capacity = f64::from(capacity.max(1));
        Self {
            capacity,
            refill_per_sec: capacity / period.as_secs_f64().max(f64::EPSILON),
            buckets: Mutex::new(HashMap::new()),
        }
    }

    pub fn per_hour(capacity: u32) -> Self {
        Self::new(capacity, Duration::from_secs(3600))
    }

    /// Take one token for `key`, or fail with a quota error naming when the next
    /// token becomes available.
    pub async fn check(&self, key: &str) -> Result<()> {
        let now = Instant::now();
        let mut buckets = self.buckets.lock().await;
        let bucket = buckets
            .entry(key.to_lowercase())
            .or_insert_with(|| Bucket {
                tokens: self.capacity,
                last_refill: now,
            });

        let elapsed = now.duration_since(bucket.last_refill).as_secs_f64();
        bucket.last_refill = now;
        bucket.tokens = (bucket.tokens + elapsed * self.refill_per_sec).min(self.capacity);

        if bucket.tokens >= 1.0 {
            bucket.tokens -= 1.0;
            return Ok(());
        }

        let wait = Duration::from_secs_f64((1.0 - bucket.tokens) / self.refill_per_sec);
        let reset_at = chrono::Duration::from_std(wait)
            .ok()
            .map(|d| Utc::now() + d);
        Err(AppError::Quota {
            message: format!("Too many requests for {}", key),
            reset_at,
        })
    }
}
