//! Circuit breaker and token-bucket rate limiter
//!
//! Each concrete provider sits behind one breaker and one bucket. The
//! breaker fails fast after repeated failures; the bucket blocks callers
//! that exceed the configured request rate.

use std::sync::Mutex;
use std::time::{Duration, Instant};

use tracing::{debug, warn};

/// Breaker state
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CircuitState {
    /// Normal operation
    Closed,
    /// Failing fast until the cooldown elapses
    Open,
    /// One probe call allowed through
    HalfOpen,
}

struct BreakerInner {
    state: CircuitState,
    consecutive_failures: u32,
    opened_at: Option<Instant>,
}

/// Consecutive-failure circuit breaker with cooldown and half-open probe
pub struct CircuitBreaker {
    failure_threshold: u32,
    cooldown: Duration,
    inner: Mutex<BreakerInner>,
}

impl CircuitBreaker {
    pub fn new(failure_threshold: u32, cooldown: Duration) -> Self {
        Self {
            failure_threshold: failure_threshold.max(1),
            cooldown,
            inner: Mutex::new(BreakerInner {
                state: CircuitState::Closed,
                consecutive_failures: 0,
                opened_at: None,
            }),
        }
    }

    /// Check whether a call may proceed
    ///
    /// Returns false while the circuit is open. After the cooldown, the
    /// breaker moves to half-open and admits exactly one probe.
    pub fn try_acquire(&self) -> bool {
        let mut inner = self.inner.lock().unwrap_or_else(|e| e.into_inner());
        match inner.state {
            CircuitState::Closed => true,
            CircuitState::HalfOpen => {
                // Only one probe at a time: further calls wait for its verdict
                false
            }
            CircuitState::Open => {
                let elapsed = inner.opened_at.map(|t| t.elapsed()).unwrap_or_default();
                if elapsed >= self.cooldown {
                    debug!("circuit cooldown elapsed, admitting probe");
                    inner.state = CircuitState::HalfOpen;
                    true
                } else {
                    false
                }
            }
        }
    }

    pub fn record_success(&self) {
        let mut inner = self.inner.lock().unwrap_or_else(|e| e.into_inner());
        if inner.state != CircuitState::Closed {
            debug!("circuit closing after successful call");
        }
        inner.state = CircuitState::Closed;
        inner.consecutive_failures = 0;
        inner.opened_at = None;
    }

    pub fn record_failure(&self) {
        let mut inner = self.inner.lock().unwrap_or_else(|e| e.into_inner());
        inner.consecutive_failures += 1;
        let reopen = inner.state == CircuitState::HalfOpen;
        if reopen || inner.consecutive_failures >= self.failure_threshold {
            if inner.state != CircuitState::Open {
                warn!(failures = inner.consecutive_failures, "circuit opening");
            }
            inner.state = CircuitState::Open;
            inner.opened_at = Some(Instant::now());
        }
    }

    pub fn state(&self) -> CircuitState {
        self.inner.lock().unwrap_or_else(|e| e.into_inner()).state
    }
}

struct BucketInner {
    tokens: f64,
    last_refill: Instant,
}

/// Token bucket that blocks the caller when drained
pub struct TokenBucket {
    capacity: f64,
    refill_per_sec: f64,
    inner: Mutex<BucketInner>,
}

impl TokenBucket {
    pub fn new(capacity: u32, refill_per_sec: f64) -> Self {
        let capacity = f64::from(capacity.max(1));
        Self {
            capacity,
            refill_per_sec: refill_per_sec.max(0.001),
            inner: Mutex::new(BucketInner {
                tokens: capacity,
                last_refill: Instant::now(),
            }),
        }
    }

    fn refill(inner: &mut BucketInner, capacity: f64, rate: f64) {
        let now = Instant::now();
        let elapsed = now.duration_since(inner.last_refill).as_secs_f64();
        inner.tokens = (inner.tokens + elapsed * rate).min(capacity);
        inner.last_refill = now;
    }

    /// Take one token without waiting
    pub fn try_acquire(&self) -> bool {
        let mut inner = self.inner.lock().unwrap_or_else(|e| e.into_inner());
        Self::refill(&mut inner, self.capacity, self.refill_per_sec);
        if inner.tokens >= 1.0 {
            inner.tokens -= 1.0;
            true
        } else {
            false
        }
    }

    /// Take one token, sleeping until one is available
    pub async fn acquire(&self) {
        loop {
            let wait = {
                let mut inner = self.inner.lock().unwrap_or_else(|e| e.into_inner());
                Self::refill(&mut inner, self.capacity, self.refill_per_sec);
                if inner.tokens >= 1.0 {
                    inner.tokens -= 1.0;
                    return;
                }
                let deficit = 1.0 - inner.tokens;
                Duration::from_secs_f64(deficit / self.refill_per_sec)
            };
            debug!(?wait, "rate limit reached, blocking caller");
            tokio::time::sleep(wait).await;
        }
    }
}
