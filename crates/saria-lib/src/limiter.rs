//! Token-bucket admission control.
//!
//! Continuous lazy refill: credit accrues smoothly with elapsed wall-clock
//! time and is computed on demand — no background timer. The whole
//! refill-check-deduct sequence runs as one critical section.

use std::sync::Mutex;
use std::time::{Duration, Instant};

use saria_core::error::RelayError;

/// Interval between admission polls in [`TokenBucket::acquire_within`].
const POLL_INTERVAL: Duration = Duration::from_millis(150);

pub struct TokenBucket {
    capacity: f64,
    refill_period: Duration,
    state: Mutex<BucketState>,
}

struct BucketState {
    tokens: f64,
    last_refill: Instant,
}

impl TokenBucket {
    /// Create a bucket starting at full capacity.
    pub fn new(capacity: f64, refill_period: Duration) -> Result<Self, RelayError> {
        if !capacity.is_finite() || capacity <= 0.0 {
            return Err(RelayError::Config(format!(
                "token bucket capacity must be positive, got {capacity}"
            )));
        }
        if refill_period.is_zero() {
            return Err(RelayError::Config(
                "token bucket refill period must be positive".into(),
            ));
        }
        Ok(Self {
            capacity,
            refill_period,
            state: Mutex::new(BucketState {
                tokens: capacity,
                last_refill: Instant::now(),
            }),
        })
    }

    /// Deduct one unit of credit if available. No deduction on failure.
    pub fn try_acquire(&self) -> bool {
        let mut state = self.state.lock().unwrap_or_else(|e| e.into_inner());
        self.refill(&mut state);
        if state.tokens >= 1.0 {
            state.tokens -= 1.0;
            true
        } else {
            false
        }
    }

    /// Poll [`Self::try_acquire`] until it succeeds or `max_wait` elapses.
    ///
    /// A zero `max_wait` degenerates to a single attempt. Never sleeps past
    /// the deadline by more than one poll interval.
    pub async fn acquire_within(&self, max_wait: Duration) -> bool {
        let deadline = Instant::now() + max_wait;
        loop {
            if self.try_acquire() {
                return true;
            }
            let now = Instant::now();
            if now >= deadline {
                return false;
            }
            tokio::time::sleep(POLL_INTERVAL.min(deadline - now)).await;
        }
    }

    /// Current credit balance after refill. Exposed for status reporting.
    pub fn available(&self) -> f64 {
        let mut state = self.state.lock().unwrap_or_else(|e| e.into_inner());
        self.refill(&mut state);
        state.tokens
    }

    /// Add credit for time elapsed since the last refill, clamped to
    /// capacity. `last_refill` only advances when credit was actually
    /// added, so sub-resolution elapsed times are not discarded.
    fn refill(&self, state: &mut BucketState) {
        let elapsed = state.last_refill.elapsed();
        let credit = elapsed.as_secs_f64() / self.refill_period.as_secs_f64() * self.capacity;
        if credit > 0.0 {
            state.tokens = (state.tokens + credit).min(self.capacity);
            state.last_refill += elapsed;
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    /// Long enough that no measurable credit accrues during a test.
    const SLOW: Duration = Duration::from_secs(3600);

    #[test]
    fn rejects_nonpositive_capacity() {
        assert!(TokenBucket::new(0.0, SLOW).is_err());
        assert!(TokenBucket::new(-1.0, SLOW).is_err());
        assert!(TokenBucket::new(f64::NAN, SLOW).is_err());
    }

    #[test]
    fn rejects_zero_refill_period() {
        assert!(TokenBucket::new(6.0, Duration::ZERO).is_err());
    }

    #[test]
    fn drains_capacity_then_rejects() {
        let bucket = TokenBucket::new(3.0, SLOW).unwrap();
        for _ in 0..3 {
            assert!(bucket.try_acquire());
        }
        assert!(!bucket.try_acquire());
    }

    #[test]
    fn failed_acquire_does_not_deduct() {
        let bucket = TokenBucket::new(1.0, SLOW).unwrap();
        assert!(bucket.try_acquire());
        let before = bucket.available();
        assert!(!bucket.try_acquire());
        assert!(bucket.available() >= before);
    }

    #[test]
    fn refills_continuously() {
        let bucket = TokenBucket::new(10.0, Duration::from_millis(100)).unwrap();
        for _ in 0..10 {
            assert!(bucket.try_acquire());
        }
        assert!(!bucket.try_acquire());
        // 30% of the period restores ~3 tokens — no tick boundary to wait for
        std::thread::sleep(Duration::from_millis(30));
        assert!(bucket.try_acquire());
    }

    #[test]
    fn clamps_at_capacity() {
        let bucket = TokenBucket::new(2.0, Duration::from_millis(50)).unwrap();
        // Well past a full refill period: still only `capacity` credits
        std::thread::sleep(Duration::from_millis(150));
        assert!(bucket.try_acquire());
        assert!(bucket.try_acquire());
        assert!(!bucket.try_acquire());
    }

    #[tokio::test]
    async fn acquire_within_bounded_by_max_wait() {
        let bucket = TokenBucket::new(1.0, SLOW).unwrap();
        assert!(bucket.try_acquire());
        let start = Instant::now();
        assert!(!bucket.acquire_within(Duration::from_millis(200)).await);
        let waited = start.elapsed();
        assert!(waited >= Duration::from_millis(200));
        // one poll interval of slop, generously
        assert!(waited < Duration::from_millis(700), "waited {waited:?}");
    }

    #[tokio::test]
    async fn zero_wait_is_a_single_attempt() {
        let bucket = TokenBucket::new(1.0, SLOW).unwrap();
        assert!(bucket.acquire_within(Duration::ZERO).await);
        assert!(!bucket.acquire_within(Duration::ZERO).await);
    }

    #[tokio::test]
    async fn acquire_within_succeeds_once_credit_returns() {
        let bucket = TokenBucket::new(1.0, Duration::from_millis(200)).unwrap();
        assert!(bucket.try_acquire());
        assert!(bucket.acquire_within(Duration::from_secs(2)).await);
    }
}
