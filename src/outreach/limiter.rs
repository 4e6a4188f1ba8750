//! Token-bucket limiter for provider calls.
//!
//! Batch generation awaits one token before each call. With the default
//! capacity of one, calls are spaced at least `refill_every` apart.

use std::time::Duration;

use tokio::sync::Mutex;
use tokio::time::Instant;
use tracing::trace;

struct Bucket {
    tokens: u32,
    last_refill: Instant,
}

/// Async token bucket.
pub struct CallLimiter {
    capacity: u32,
    refill_every: Duration,
    bucket: Mutex<Bucket>,
}

impl CallLimiter {
    /// A bucket holding `capacity` tokens (minimum one), gaining one every `refill_every`.
    /// Starts full.
    pub fn new(capacity: u32, refill_every: Duration) -> Self {
        let capacity = capacity.max(1);
        Self {
            capacity,
            refill_every,
            bucket: Mutex::new(Bucket {
                tokens: capacity,
                last_refill: Instant::now(),
            }),
        }
    }

    /// One call per `interval`, no bursting.
    pub fn spaced(interval: Duration) -> Self {
        Self::new(1, interval)
    }

    /// Never waits.
    pub fn unlimited() -> Self {
        Self::new(1, Duration::ZERO)
    }

    pub fn capacity(&self) -> u32 {
        self.capacity
    }

    pub fn refill_every(&self) -> Duration {
        self.refill_every
    }

    /// Take a token if one is available right now.
    pub async fn try_acquire(&self) -> bool {
        if self.refill_every.is_zero() {
            return true;
        }
        let mut bucket = self.bucket.lock().await;
        self.refill(&mut bucket);
        if bucket.tokens > 0 {
            bucket.tokens -= 1;
            true
        } else {
            false
        }
    }

    /// Wait until a token is available, then take it.
    pub async fn acquire(&self) {
        if self.refill_every.is_zero() {
            return;
        }
        loop {
            let wait = {
                let mut bucket = self.bucket.lock().await;
                self.refill(&mut bucket);
                if bucket.tokens > 0 {
                    bucket.tokens -= 1;
                    return;
                }
                self.refill_every
                    .saturating_sub(Instant::now().saturating_duration_since(bucket.last_refill))
            };
            trace!(wait_ms = wait.as_millis() as u64, "Call limiter waiting for token");
            tokio::time::sleep(wait).await;
        }
    }

    fn refill(&self, bucket: &mut Bucket) {
        let elapsed = Instant::now().saturating_duration_since(bucket.last_refill);
        let earned = (elapsed.as_nanos() / self.refill_every.as_nanos()) as u64;
        if earned == 0 {
            return;
        }
        if bucket.tokens as u64 + earned >= self.capacity as u64 {
            bucket.tokens = self.capacity;
            bucket.last_refill = Instant::now();
        } else {
            bucket.tokens += earned as u32;
            bucket.last_refill += self.refill_every * earned as u32;
        }
    }
}
