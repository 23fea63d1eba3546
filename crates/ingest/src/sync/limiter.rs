//! Continuous-refill token bucket
//!
//! Tokens accrue continuously with elapsed time instead of in per-interval
//! jumps, so admissions are evenly spaced at `interval / max_requests`. The
//! bucket starts empty: the first caller always waits one refill period.

use std::time::Duration;

use log::debug;
use parking_lot::Mutex;
use tokio::time::Instant;
use tokio_util::sync::CancellationToken;

use crate::config::RateLimit;

/// Returned by [`RateLimiter::admit`] when the wait was cancelled
#[derive(Debug, Clone, Copy, PartialEq, Eq, thiserror::Error)]
#[error("rate limiter wait cancelled")]
pub struct Cancelled;

#[derive(Debug)]
struct Bucket {
    tokens: f64,
    last_refill: Instant,
}

/// Token bucket throttle, safe to share between concurrent callers
#[derive(Debug)]
pub struct RateLimiter {
    max_tokens: f64,
    /// Tokens added per second
    refill_rate: f64,
    bucket: Mutex<Bucket>,
}

impl RateLimiter {
    /// Admit at most `max_requests` per `interval`, evenly spaced
    pub fn new(max_requests: u32, interval: Duration) -> Self {
        let max_tokens = f64::from(max_requests.max(1));
        let interval = interval.max(Duration::from_nanos(1));

        Self {
            max_tokens,
            refill_rate: max_tokens / interval.as_secs_f64(),
            bucket: Mutex::new(Bucket {
                tokens: 0.0,
                last_refill: Instant::now(),
            }),
        }
    }

    pub fn from_rate(rate: RateLimit) -> Self {
        Self::new(rate.max_requests, rate.interval)
    }

    /// Time between two admissions once the bucket is drained
    pub fn spacing(&self) -> Duration {
        seconds(1.0 / self.refill_rate)
    }

    /// Current token count after refilling
    pub fn available_tokens(&self) -> f64 {
        let mut bucket = self.bucket.lock();
        self.refill(&mut bucket);
        bucket.tokens
    }

    /// Wait until a token is available and consume it
    ///
    /// Returns `Err(Cancelled)` as soon as `cancel` fires, whether the token
    /// was already cancelled on entry or fires while waiting.
    pub async fn admit(&self, cancel: &CancellationToken) -> Result<(), Cancelled> {
        loop {
            if cancel.is_cancelled() {
                return Err(Cancelled);
            }

            let wait = {
                let mut bucket = self.bucket.lock();
                self.refill(&mut bucket);

                if bucket.tokens >= 1.0 {
                    bucket.tokens -= 1.0;
                    return Ok(());
                }

                seconds((1.0 - bucket.tokens) / self.refill_rate)
            };

            debug!("Rate limiter waiting {:?} for next token", wait);

            tokio::select! {
                biased;
                _ = cancel.cancelled() => return Err(Cancelled),
                _ = tokio::time::sleep(wait) => {}
            }
        }
    }

    fn refill(&self, bucket: &mut Bucket) {
        let now = Instant::now();
        if now <= bucket.last_refill {
            return;
        }

        let elapsed = now.duration_since(bucket.last_refill).as_secs_f64();
        bucket.tokens = (bucket.tokens + elapsed * self.refill_rate).min(self.max_tokens);
        bucket.last_refill = now;
    }
}

/// Saturates instead of panicking for waits beyond `Duration::MAX`
fn seconds(secs: f64) -> Duration {
    Duration::try_from_secs_f64(secs).unwrap_or(Duration::MAX)
}
