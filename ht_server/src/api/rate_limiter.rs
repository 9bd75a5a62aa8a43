//! Per-IP rate limiting.
//!
//! Token-bucket per client IP (60 requests/minute by default), all buckets
//! behind a single mutex. A periodic evictor drops buckets idle for more
//! than five minutes so the table stays bounded. The state is
//! process-local; multi-replica deployments rate-limit per replica.

use std::collections::HashMap;
use std::net::IpAddr;
use std::sync::{Arc, Mutex};
use std::time::{Duration, Instant};

/// How long a bucket may sit idle before the evictor drops it
const IDLE_EVICTION: Duration = Duration::from_secs(5 * 60);

/// How often the evictor sweeps the table
const EVICTION_INTERVAL: Duration = Duration::from_secs(5 * 60);

#[derive(Debug)]
struct Bucket {
    tokens: f64,
    last_refill: Instant,
    last_seen: Instant,
}

/// Per-IP token-bucket rate limiter
#[derive(Debug)]
pub struct IpRateLimiter {
    buckets: Mutex<HashMap<IpAddr, Bucket>>,
    capacity: f64,
    refill_per_sec: f64,
}

impl IpRateLimiter {
    /// Create a limiter allowing `requests_per_minute` per IP
    pub fn new(requests_per_minute: u32) -> Self {
        Self {
            buckets: Mutex::new(HashMap::new()),
            capacity: requests_per_minute as f64,
            refill_per_sec: requests_per_minute as f64 / 60.0,
        }
    }

    /// Check whether a request from `ip` is allowed, consuming one token
    pub fn check(&self, ip: IpAddr) -> bool {
        let now = Instant::now();
        let mut buckets = self.buckets.lock().expect("rate limit table poisoned");

        let bucket = buckets.entry(ip).or_insert(Bucket {
            tokens: self.capacity,
            last_refill: now,
            last_seen: now,
        });

        let elapsed = now.duration_since(bucket.last_refill).as_secs_f64();
        bucket.tokens = (bucket.tokens + elapsed * self.refill_per_sec).min(self.capacity);
        bucket.last_refill = now;
        bucket.last_seen = now;

        if bucket.tokens >= 1.0 {
            bucket.tokens -= 1.0;
            true
        } else {
            false
        }
    }

    /// Drop buckets idle longer than the eviction threshold.
    /// Returns how many were removed.
    pub fn evict_idle(&self) -> usize {
        let now = Instant::now();
        let mut buckets = self.buckets.lock().expect("rate limit table poisoned");
        let before = buckets.len();
        buckets.retain(|_, b| now.duration_since(b.last_seen) <= IDLE_EVICTION);
        before - buckets.len()
    }

    /// Number of tracked IPs
    pub fn tracked_ips(&self) -> usize {
        self.buckets.lock().expect("rate limit table poisoned").len()
    }

    /// Spawn the periodic evictor task for a shared limiter
    pub fn spawn_evictor(limiter: Arc<IpRateLimiter>) {
        tokio::spawn(async move {
            let mut ticker = tokio::time::interval(EVICTION_INTERVAL);
            ticker.tick().await; // first tick fires immediately
            loop {
                ticker.tick().await;
                let evicted = limiter.evict_idle();
                if evicted > 0 {
                    tracing::debug!(evicted, "idle rate-limit buckets evicted");
                }
            }
        });
    }
}
