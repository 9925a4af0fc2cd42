use tokio::sync::Mutex;

/// Single-key token bucket, a specialization of `hermes`'s per-route
/// `RateLimiter` token-bucket arm down to the one global stream the ingestor
/// limits (spec.md §4.1 "Token-bucket rate limiter with configured steady
/// rate and burst"). `tokio::sync::Mutex` so a contended waiter yields back
/// to the runtime instead of blocking a worker thread.
pub struct TokenBucket {
    inner: Mutex<Bucket>,
}

struct Bucket {
    tokens: f64,
    max_tokens: f64,
    rate_per_sec: f64,
    last_refill: std::time::Instant,
}

impl TokenBucket {
    pub fn new(rate_per_sec: f64, burst: u64) -> Self {
        let max_tokens = (rate_per_sec + burst as f64).max(1.0);
        Self {
            inner: Mutex::new(Bucket { tokens: max_tokens, max_tokens, rate_per_sec, last_refill: std::time::Instant::now() }),
        }
    }

    /// Returns `true` if a token was available and consumed.
    pub async fn try_acquire(&self) -> bool {
        let mut b = self.inner.lock().await;
        let now = std::time::Instant::now();
        let elapsed = now.saturating_duration_since(b.last_refill).as_secs_f64();
        if elapsed > 0.0 {
            b.tokens = (b.tokens + elapsed * b.rate_per_sec).min(b.max_tokens);
            b.last_refill = now;
        }

        if b.tokens >= 1.0 {
            b.tokens -= 1.0;
            true
        } else {
            false
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn allows_up_to_burst_then_rejects() {
        let bucket = TokenBucket::new(1.0, 2); // max_tokens = 3.0
        let mut allowed = 0;
        for _ in 0..10 {
            if bucket.try_acquire().await {
                allowed += 1;
            }
        }
        assert_eq!(allowed, 3);
    }

    #[tokio::test]
    async fn refills_over_time() {
        let bucket = TokenBucket::new(1000.0, 0);
        assert!(bucket.try_acquire().await);
        tokio::time::sleep(std::time::Duration::from_millis(5)).await;
        assert!(bucket.try_acquire().await);
    }
}
