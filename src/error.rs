//! Error types for the transport pipeline.
//!
//! Every interceptor and the response validator report failures through the single
//! [`Error`] enum so that errors compose across the chain without re-boxing. Retry exhaustion
//! and cancellation keep the root cause reachable through [`std::error::Error::source`].
use http::StatusCode;
use std::fmt;

/// Boxed error produced by a base transport.
pub type BoxError = Box<dyn std::error::Error + Send + Sync + 'static>;

/// Why a wait or an in-flight call was interrupted.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CancelCause {
    /// The caller cancelled the call explicitly.
    Cancelled,
    /// The call's deadline passed.
    DeadlineExceeded,
}

impl fmt::Display for CancelCause {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            CancelCause::Cancelled => write!(f, "call cancelled"),
            CancelCause::DeadlineExceeded => write!(f, "deadline exceeded"),
        }
    }
}

impl std::error::Error for CancelCause {}

/// Unified error type for the transport chain and the response validator.
#[derive(thiserror::Error, Debug)]
pub enum Error {
    /// The underlying network call failed (connect, DNS, timeout, body read).
    #[error("transport error: {source}")]
    Transport {
        #[source]
        source: BoxError,
    },
    /// A wait or the network I/O was interrupted by the caller's cancellation signal.
    #[error("{operation} interrupted: {cause}")]
    Cancelled {
        operation: &'static str,
        #[source]
        cause: CancelCause,
    },
    /// The caller cancelled while the request waited for a rate-limit token.
    #[error("rate limit wait for {label} abandoned: {cause}")]
    RateLimitWait {
        label: String,
        #[source]
        cause: CancelCause,
    },
    /// Every allowed attempt failed at the transport level.
    #[error("request failed after {attempts} attempts: {source}")]
    RetriesExhausted {
        attempts: usize,
        #[source]
        source: Box<Error>,
    },
    /// The retry loop stopped early because the caller cancelled during backoff.
    #[error("retry aborted after {attempts} attempts: {source}")]
    RetryAborted {
        attempts: usize,
        #[source]
        source: Box<Error>,
    },
    /// The remote answered with a 5xx status where another status was expected.
    ///
    /// `attempts` is set when the retry interceptor gave up on this status.
    #[error("{operation}: server error (status {status}){}", after_attempts(.attempts))]
    Server { operation: &'static str, status: StatusCode, attempts: Option<usize> },
    /// The remote answered 429 where another status was expected.
    #[error("{operation}: rate limited by server (status 429){}", after_attempts(.attempts))]
    RateLimited { operation: &'static str, attempts: Option<usize> },
    /// The remote answered with an unexpected non-5xx, non-429 status.
    #[error("{operation}: unexpected status {actual} (expected {expected})")]
    ApiStatus { operation: &'static str, expected: StatusCode, actual: StatusCode },
    /// The expected status arrived without a payload.
    #[error("{operation}: empty response")]
    EmptyResponse { operation: &'static str },
    /// The payload could not be decoded.
    #[error("{operation}: failed to decode response: {source}")]
    Decode {
        operation: &'static str,
        #[source]
        source: serde_json::Error,
    },
    /// A lower-level error annotated with the endpoint operation that hit it.
    #[error("{operation}: {source}")]
    Operation {
        operation: &'static str,
        #[source]
        source: Box<Error>,
    },
    /// The request could not be converted for the base transport.
    #[error("invalid request: {0}")]
    InvalidRequest(String),
}

fn after_attempts(attempts: &Option<usize>) -> String {
    attempts.map(|n| format!(", failed after {n} attempts")).unwrap_or_default()
}

/// Errors produced while building limiters, policies, and clients.
#[derive(thiserror::Error, Debug, Clone, PartialEq)]
pub enum BuildError {
    /// Rate limits need at least one request per window.
    #[error("rate limit must allow at least one request (got {0})")]
    InvalidRateLimit(u32),
    /// Refill rates must be finite and positive.
    #[error("refill rate must be positive and finite (got {0})")]
    InvalidRefillRate(f64),
    /// Header names/values must be valid HTTP tokens.
    #[error("invalid header {name}: {reason}")]
    InvalidHeader { name: String, reason: String },
    /// The base URL did not parse.
    #[error("invalid base url {url}: {reason}")]
    InvalidBaseUrl { url: String, reason: String },
    /// The HTTP client could not be constructed.
    #[error("failed to build http client: {0}")]
    Client(String),
}

impl Error {
    /// Wrap a base transport failure.
    pub fn transport<E>(source: E) -> Self
    where
        E: Into<BoxError>,
    {
        Error::Transport { source: source.into() }
    }

    /// Build a cancellation error for the named operation.
    pub fn cancelled(operation: &'static str, cause: CancelCause) -> Self {
        Error::Cancelled { operation, cause }
    }

    /// Short, stable label used for error metrics.
    pub fn kind(&self) -> &'static str {
        match self {
            Error::Transport { .. } => "transport",
            Error::Cancelled { .. } => "cancelled",
            Error::RateLimitWait { .. } => "rate_limit_wait",
            Error::RetriesExhausted { .. } => "retries_exhausted",
            Error::RetryAborted { .. } => "retry_aborted",
            Error::Server { .. } => "server",
            Error::RateLimited { .. } => "rate_limited",
            Error::ApiStatus { .. } => "api_status",
            Error::EmptyResponse { .. } => "empty_response",
            Error::Decode { .. } => "decode",
            Error::Operation { source, .. } => source.kind(),
            Error::InvalidRequest(_) => "invalid_request",
        }
    }

    /// True when the failure was caused by the caller's cancellation signal, at any depth.
    pub fn is_cancelled(&self) -> bool {
        match self {
            Error::Cancelled { .. } | Error::RateLimitWait { .. } => true,
            Error::RetriesExhausted { source, .. }
            | Error::RetryAborted { source, .. }
            | Error::Operation { source, .. } => source.is_cancelled(),
            _ => false,
        }
    }

    /// Whether the retry interceptor may try again after this error.
    pub fn is_retryable(&self) -> bool {
        matches!(self, Error::Transport { .. })
    }

    /// The cancellation cause, if this error stems from one.
    pub fn cancel_cause(&self) -> Option<CancelCause> {
        match self {
            Error::Cancelled { cause, .. } | Error::RateLimitWait { cause, .. } => Some(*cause),
            Error::RetriesExhausted { source, .. }
            | Error::RetryAborted { source, .. }
            | Error::Operation { source, .. } => source.cancel_cause(),
            _ => None,
        }
    }

    /// Observed HTTP status for status-classified errors.
    pub fn status(&self) -> Option<StatusCode> {
        match self {
            Error::Server { status, .. } => Some(*status),
            Error::RateLimited { .. } => Some(StatusCode::TOO_MANY_REQUESTS),
            Error::ApiStatus { actual, .. } => Some(*actual),
            Error::Operation { source, .. } => source.status(),
            _ => None,
        }
    }

    /// Attempts made before the retry loop gave up, when known.
    pub fn attempts(&self) -> Option<usize> {
        match self {
            Error::RetriesExhausted { attempts, .. } | Error::RetryAborted { attempts, .. } => {
                Some(*attempts)
            }
            Error::Server { attempts, .. } | Error::RateLimited { attempts, .. } => *attempts,
            Error::Operation { source, .. } => source.attempts(),
            _ => None,
        }
    }
}
