//! Backoff schedule for the retry interceptor.
//!
//! The schedule is exponential with a fixed multiplier of two: the wait after the failed
//! attempt with zero-based index `n` is `initial × 2^n`. A server may override a single wait
//! through `Retry-After`, which is honoured only as an integer count of seconds.
//!
//! Example
//! ```rust
//! use std::time::Duration;
//! use restline::Backoff;
//!
//! let backoff = Backoff::exponential(Duration::from_millis(100));
//! assert_eq!(backoff.delay(0), Duration::from_millis(100));
//! assert_eq!(backoff.delay(1), Duration::from_millis(200));
//! assert_eq!(backoff.delay(3), Duration::from_millis(800));
//! ```
//!
//! Overflow behavior: computations that would overflow saturate to `MAX_BACKOFF` (1 day).

use http::header::RETRY_AFTER;
use http::HeaderMap;
use std::time::Duration;

/// Maximum delay used when calculations overflow (1 day).
pub const MAX_BACKOFF: Duration = Duration::from_secs(24 * 60 * 60);

/// Exponential backoff with a doubling multiplier.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Backoff {
    initial: Duration,
}

impl Backoff {
    /// Exponential backoff starting at `initial`.
    pub fn exponential(initial: Duration) -> Self {
        Self { initial }
    }

    /// The first wait of the schedule.
    pub fn initial(&self) -> Duration {
        self.initial
    }

    /// Wait after the failed attempt `attempt` (zero-based).
    pub fn delay(&self, attempt: usize) -> Duration {
        let exp = u32::try_from(attempt).unwrap_or(u32::MAX);
        match 2u32.checked_pow(exp).and_then(|factor| self.initial.checked_mul(factor)) {
            Some(delay) => delay.min(MAX_BACKOFF),
            None if self.initial.is_zero() => Duration::ZERO,
            None => MAX_BACKOFF,
        }
    }
}

impl Default for Backoff {
    fn default() -> Self {
        Self::exponential(Duration::from_secs(1))
    }
}

/// Parse a `Retry-After` header given as a non-negative integer count of seconds.
///
/// HTTP-date values and anything else that is not a plain integer are treated as absent.
pub fn retry_after(headers: &HeaderMap) -> Option<Duration> {
    let raw = headers.get(RETRY_AFTER)?.to_str().ok()?;
    raw.trim().parse::<u64>().ok().map(Duration::from_secs)
}
