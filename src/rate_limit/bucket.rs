use crate::backoff::MAX_BACKOFF;
use crate::error::BuildError;
use std::sync::{Arc, Mutex, PoisonError};
use std::time::Duration;
use tokio::time::Instant;

#[derive(Debug)]
struct BucketState {
    tokens: f64,
    last_refill: Instant,
}

/// A token bucket.
///
/// Replenishes tokens at a fixed `rate` per second, up to `capacity`. Reservations may drive
/// the balance negative; the deficit is the queue of callers already promised a future token.
#[derive(Debug)]
pub struct TokenBucket {
    capacity: f64,
    rate: f64,
    state: Mutex<BucketState>,
}

impl TokenBucket {
    /// `n` requests per minute, with a burst of `n`.
    pub fn per_minute(n: u32) -> Result<Self, BuildError> {
        if n == 0 {
            return Err(BuildError::InvalidRateLimit(n));
        }
        Self::new(n, f64::from(n) / 60.0)
    }

    /// Bucket holding up to `capacity` tokens, refilled at `rate` tokens per second.
    pub fn new(capacity: u32, rate: f64) -> Result<Self, BuildError> {
        if capacity == 0 {
            return Err(BuildError::InvalidRateLimit(capacity));
        }
        if !rate.is_finite() || rate <= 0.0 {
            return Err(BuildError::InvalidRefillRate(rate));
        }
        let capacity = f64::from(capacity);
        Ok(Self {
            capacity,
            rate,
            state: Mutex::new(BucketState { tokens: capacity, last_refill: Instant::now() }),
        })
    }

    pub fn capacity(&self) -> f64 {
        self.capacity
    }

    /// Tokens per second.
    pub fn rate(&self) -> f64 {
        self.rate
    }

    fn refill(&self, state: &mut BucketState) {
        let now = Instant::now();
        let elapsed = now.saturating_duration_since(state.last_refill).as_secs_f64();
        state.tokens = (state.tokens + elapsed * self.rate).min(self.capacity);
        state.last_refill = now;
    }

    /// Take one token, now or in the future.
    ///
    /// The returned reservation carries the delay until the token exists; zero when one was
    /// available immediately. Delays saturate at [`MAX_BACKOFF`].
    pub fn reserve(self: &Arc<Self>) -> Reservation {
        let mut state = self.state.lock().unwrap_or_else(PoisonError::into_inner);
        self.refill(&mut state);
        state.tokens -= 1.0;
        let delay = if state.tokens >= 0.0 {
            Duration::ZERO
        } else {
            Duration::try_from_secs_f64(-state.tokens / self.rate)
                .map_or(MAX_BACKOFF, |delay| delay.min(MAX_BACKOFF))
        };
        Reservation { bucket: Arc::clone(self), delay }
    }

    /// Take one token only if it is available right now.
    pub fn try_acquire(&self) -> bool {
        let mut state = self.state.lock().unwrap_or_else(PoisonError::into_inner);
        self.refill(&mut state);
        if state.tokens >= 1.0 {
            state.tokens -= 1.0;
            true
        } else {
            false
        }
    }

    /// Current balance after refill; negative while reservations are outstanding.
    pub fn available(&self) -> f64 {
        let mut state = self.state.lock().unwrap_or_else(PoisonError::into_inner);
        self.refill(&mut state);
        state.tokens
    }

    fn give_back(&self) {
        let mut state = self.state.lock().unwrap_or_else(PoisonError::into_inner);
        self.refill(&mut state);
        state.tokens = (state.tokens + 1.0).min(self.capacity);
    }
}

/// A token promised by [`TokenBucket::reserve`].
#[derive(Debug)]
#[must_use = "a reservation holds a token; wait for its delay or cancel it"]
pub struct Reservation {
    bucket: Arc<TokenBucket>,
    delay: Duration,
}

impl Reservation {
    /// How long the holder must wait before using the token.
    pub fn delay(&self) -> Duration {
        self.delay
    }

    /// Return the token to the bucket.
    pub fn cancel(self) {
        self.bucket.give_back();
    }
}
