use std::{collections::HashMap, time::Instant};

use tokio::sync::Mutex;

#[derive(Debug, Clone)]
pub struct RateLimitHeaders {
    pub limit: u32,
    pub remaining: u32,
    pub reset_seconds: u64,
}

#[derive(Debug, Clone)]
pub struct RateLimitDecision {
    pub allowed: bool,
    pub headers: RateLimitHeaders,
}

#[derive(Debug)]
struct BucketState {
    tokens: f64,
    last_refill: Instant,
}

const DEFAULT_MAX_KEYS: usize = 10_000;

/// Token bucket per key. Used to slow down password guessing on login, keyed
/// by the normalized username.
///
/// Keys come from unauthenticated input, so the map is bounded: once it holds
/// `max_keys` entries, buckets that have refilled to capacity are dropped, and
/// if that frees nothing the least recently touched bucket is evicted.
#[derive(Debug)]
pub struct RateLimiter {
    per_minute: u32,
    burst: u32,
    max_keys: usize,
    buckets: Mutex<HashMap<String, BucketState>>,
}

impl RateLimiter {
    pub fn new(per_minute: u32, burst: u32) -> Self {
        Self::with_max_keys(per_minute, burst, DEFAULT_MAX_KEYS)
    }

    pub fn with_max_keys(per_minute: u32, burst: u32, max_keys: usize) -> Self {
        Self {
            per_minute: per_minute.max(1),
            burst: burst.max(1),
            max_keys: max_keys.max(1),
            buckets: Mutex::new(HashMap::new()),
        }
    }

    fn make_room(&self, buckets: &mut HashMap<String, BucketState>, now: Instant) {
        let refill_per_sec = f64::from(self.per_minute) / 60.0;
        let capacity = f64::from(self.burst);
        buckets.retain(|_, bucket| {
            let elapsed = now.duration_since(bucket.last_refill).as_secs_f64();
            bucket.tokens + elapsed * refill_per_sec < capacity
        });
        if buckets.len() < self.max_keys {
            return;
        }
        let stalest = buckets
            .iter()
            .min_by_key(|(_, bucket)| bucket.last_refill)
            .map(|(key, _)| key.clone());
        if let Some(key) = stalest {
            buckets.remove(&key);
        }
    }

    pub async fn check(&self, key: &str) -> RateLimitDecision {
        let now = Instant::now();
        let refill_per_sec = f64::from(self.per_minute) / 60.0;
        let capacity = f64::from(self.burst);

        let mut guard = self.buckets.lock().await;
        if !guard.contains_key(key) && guard.len() >= self.max_keys {
            self.make_room(&mut guard, now);
        }
        let bucket = guard.entry(key.to_string()).or_insert(BucketState {
            tokens: capacity,
            last_refill: now,
        });

        let elapsed = now.duration_since(bucket.last_refill).as_secs_f64();
        if elapsed > 0.0 {
            let restored = elapsed * refill_per_sec;
            bucket.tokens = (bucket.tokens + restored).min(capacity);
            bucket.last_refill = now;
        }

        let allowed = bucket.tokens >= 1.0;
        if allowed {
            bucket.tokens -= 1.0;
        }

        let remaining = bucket.tokens.floor().max(0.0) as u32;
        let deficit = (1.0 - bucket.tokens).max(0.0);
        let reset_seconds = if deficit <= 0.0 {
            0
        } else {
            (deficit / refill_per_sec).ceil() as u64
        };

        RateLimitDecision {
            allowed,
            headers: RateLimitHeaders {
                limit: self.burst,
                remaining,
                reset_seconds,
            },
        }
    }

    /// Drops the bucket for `key`, e.g. after a successful login.
    pub async fn forget(&self, key: &str) {
        self.buckets.lock().await.remove(key);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn burst_is_exhausted_then_denied() {
        let limiter = RateLimiter::new(1, 3);
        for _ in 0..3 {
            assert!(limiter.check("ada").await.allowed);
        }
        let denied = limiter.check("ada").await;
        assert!(!denied.allowed);
        assert_eq!(denied.headers.remaining, 0);
        assert!(denied.headers.reset_seconds > 0);
    }

    #[tokio::test]
    async fn keys_are_independent_and_forget_resets() {
        let limiter = RateLimiter::new(1, 1);
        assert!(limiter.check("ada").await.allowed);
        assert!(!limiter.check("ada").await.allowed);
        assert!(limiter.check("bob").await.allowed);

        limiter.forget("ada").await;
        assert!(limiter.check("ada").await.allowed);
    }

    #[tokio::test]
    async fn distinct_keys_stay_bounded() {
        let limiter = RateLimiter::with_max_keys(1, 5, 100);
        for i in 0..5_000 {
            limiter.check(&format!("nobody-{i}")).await;
        }
        assert!(limiter.buckets.lock().await.len() <= 100);
    }

    #[tokio::test]
    async fn refilled_buckets_are_dropped_before_throttled_ones() {
        // 100 tokens per second, so an idle bucket refills within milliseconds.
        let limiter = RateLimiter::with_max_keys(6_000, 1, 2);
        assert!(limiter.check("idle").await.allowed);
        tokio::time::sleep(std::time::Duration::from_millis(50)).await;
        assert!(limiter.check("busy").await.allowed);

        assert!(limiter.check("new").await.allowed);
        let buckets = limiter.buckets.lock().await;
        assert!(!buckets.contains_key("idle"));
        assert!(buckets.contains_key("new"));
    }
}
