//! Per-call cancellation signal.
//!
//! A [`CallContext`] rides along in the request's [`http::Extensions`]. Interceptors read it to
//! make their waits cancellable, and the base transport reads it to abort in-flight I/O.
//! Requests without a context are only cancelled by dropping the returned future.
//!
//! ```rust
//! use restline::CallContext;
//! use std::time::Duration;
//!
//! let mut req = http::Request::new(());
//! CallContext::with_timeout(Duration::from_millis(50)).attach(&mut req);
//! assert!(CallContext::of(&req).deadline().is_some());
//! ```

use crate::error::CancelCause;
use crate::sleeper::Sleeper;
use std::time::Duration;
use tokio::time::Instant;
use tokio_util::sync::CancellationToken;

/// Cancellation token and/or deadline governing one outbound call.
#[derive(Debug, Clone, Default)]
pub struct CallContext {
    token: Option<CancellationToken>,
    deadline: Option<Instant>,
}

impl CallContext {
    /// A context that never fires.
    pub fn background() -> Self {
        Self::default()
    }

    /// Context cancelled through `token`.
    pub fn with_token(token: CancellationToken) -> Self {
        Self { token: Some(token), deadline: None }
    }

    /// Context that expires `timeout` from now. A timeout past the clock's range means no
    /// deadline.
    pub fn with_timeout(timeout: Duration) -> Self {
        Self { token: None, deadline: Instant::now().checked_add(timeout) }
    }

    /// Add (or tighten) a deadline.
    #[must_use]
    pub fn deadline_at(mut self, deadline: Instant) -> Self {
        self.deadline = Some(match self.deadline {
            Some(existing) => existing.min(deadline),
            None => deadline,
        });
        self
    }

    /// Add a cancellation token.
    #[must_use]
    pub fn token(mut self, token: CancellationToken) -> Self {
        self.token = Some(token);
        self
    }

    pub fn deadline(&self) -> Option<Instant> {
        self.deadline
    }

    /// Store this context on a request.
    pub fn attach<B>(self, req: &mut http::Request<B>) {
        req.extensions_mut().insert(self);
    }

    /// Context attached to `req`, or a background context.
    pub fn of<B>(req: &http::Request<B>) -> Self {
        req.extensions().get::<CallContext>().cloned().unwrap_or_default()
    }

    /// Whether the signal has already fired.
    pub fn is_done(&self) -> bool {
        self.token.as_ref().is_some_and(CancellationToken::is_cancelled)
            || self.deadline.is_some_and(|d| Instant::now() >= d)
    }

    /// Resolves once the token is cancelled or the deadline passes; pending forever otherwise.
    pub async fn done(&self) -> CancelCause {
        let cancelled = async {
            match &self.token {
                Some(token) => token.cancelled().await,
                None => std::future::pending::<()>().await,
            }
        };
        let expired = async {
            match self.deadline {
                Some(deadline) => tokio::time::sleep_until(deadline).await,
                None => std::future::pending::<()>().await,
            }
        };
        tokio::select! {
            biased;
            _ = cancelled => CancelCause::Cancelled,
            _ = expired => CancelCause::DeadlineExceeded,
        }
    }

    /// Sleep for `delay` unless the signal fires first.
    ///
    /// Whichever branch loses is dropped before this returns, so no timer outlives the call.
    pub async fn wait(&self, sleeper: &dyn Sleeper, delay: Duration) -> Result<(), CancelCause> {
        tokio::select! {
            biased;
            cause = self.done() => Err(cause),
            _ = sleeper.sleep(delay) => Ok(()),
        }
    }
}
