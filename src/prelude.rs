//! Convenient re-exports for common restline types.
pub use crate::{
    chain::{chain, ChainBuilder, Middleware},
    context::CallContext,
    error::{BuildError, CancelCause, Error},
    rate_limit::{LimiterSelector, PathPrefixSelector, RateLimitLayer, Selection, TokenBucket},
    retry::{RetryLayer, RetryPolicy},
    telemetry::{Field, Logger, Metrics},
    transport::{HttpRequest, HttpResponse, HttpTransport},
    ApiClient, AuthLayer, Backoff, ClientConfig, ObserveLayer,
};
