//! Client-side admission control.
//!
//! A [`TokenBucket`] turns "N requests per minute" into a continuous bucket with capacity `N`
//! and refill rate `N/60` tokens per second: a fresh limiter admits a full minute's allowance at
//! once, then throttles to the steady rate. The limiter never rejects; callers wait for their
//! token, and the wait is cancellable through the request's
//! [`CallContext`](crate::context::CallContext).
//!
//! A [`LimiterSelector`] picks the bucket for each request, so one client can hold several
//! independent buckets (for example "standard" and "restricted" endpoint classes).
//!
//! ```rust
//! use restline::rate_limit::{PathPrefixSelector, RateLimitLayer, TokenBucket};
//! use std::sync::Arc;
//!
//! let standard = Arc::new(TokenBucket::per_minute(600).unwrap());
//! let restricted = Arc::new(TokenBucket::per_minute(30).unwrap());
//! let selector = PathPrefixSelector::new(Some(standard), "standard")
//!     .route("/api/admin", Some(restricted), "restricted");
//! let _layer = RateLimitLayer::with_selector(selector);
//! ```

mod bucket;
mod middleware;
mod selector;

pub use bucket::{Reservation, TokenBucket};
pub use middleware::{RateLimitLayer, RateLimitService};
pub use selector::{LimiterSelector, PathPrefixSelector, Selection, DEFAULT_LABEL};
