#![forbid(unsafe_code)]
#![cfg_attr(not(test), deny(clippy::all))]

//! # restline
//!
//! Resilient outbound HTTP transport for generated REST API clients: every call passes through
//! a composable chain of tower interceptors before it reaches the network.
//!
//! ## Features
//!
//! - **Middleware chain** composing interceptors in declared order
//! - **Token-bucket rate limiting** with per-request bucket selection
//! - **Retry with body replay**, exponential backoff, and `Retry-After`
//! - **Observability** with cached, cardinality-safe path templates
//! - **Auth and TLS** policies applied per client
//! - **Response validation** shared by endpoint methods
//!
//! Every wait (rate limit or backoff) is cancellable through the [`CallContext`] attached to
//! the request.
//!
//! ## Quick Start
//!
//! ```rust,no_run
//! use http::{Method, StatusCode};
//! use restline::{ApiClient, AuthLayer, CallContext, ClientConfig};
//! use std::time::Duration;
//!
//! #[derive(serde::Deserialize)]
//! struct Site {
//!     name: String,
//! }
//!
//! #[tokio::main]
//! async fn main() -> Result<(), Box<dyn std::error::Error>> {
//!     let config = ClientConfig::builder()
//!         .base_url("https://unifi.example.com/proxy/network")
//!         .auth(AuthLayer::api_key("X-API-KEY", "secret")?)
//!         .rate_limit_per_minute(100)
//!         .build()?;
//!     let client = ApiClient::new(config)?;
//!
//!     let mut req = client.request(Method::GET, "/integration/v1/sites/default")?;
//!     CallContext::with_timeout(Duration::from_secs(10)).attach(&mut req);
//!     let site: Site = client.send_json("get_site", req, StatusCode::OK).await?;
//!     println!("{}", site.name);
//!     Ok(())
//! }
//! ```

pub mod auth;
pub mod backoff;
pub mod chain;
pub mod client;
pub mod config;
pub mod context;
pub mod error;
pub mod observe;
pub mod path;
pub mod prelude;
pub mod rate_limit;
pub mod retry;
pub mod sleeper;
pub mod telemetry;
pub mod tls;
pub mod transport;
pub mod validate;

// Re-exports
pub use auth::{AuthLayer, AuthService};
pub use backoff::{Backoff, MAX_BACKOFF};
pub use chain::{chain, ChainBuilder, Middleware};
pub use client::ApiClient;
pub use config::{ClientConfig, ClientConfigBuilder};
pub use context::CallContext;
pub use error::{BoxError, BuildError, CancelCause, Error};
pub use observe::{ObserveLayer, ObserveService};
pub use path::{normalize_cached, normalize_path, PathTemplateCache};
pub use rate_limit::{
    LimiterSelector, PathPrefixSelector, RateLimitLayer, RateLimitService, Reservation, Selection,
    TokenBucket,
};
pub use retry::{
    is_retryable_status, Attempts, RetryLayer, RetryPolicy, RetryPolicyBuilder, RetryService,
};
pub use sleeper::{InstantSleeper, RecordingSleeper, Sleeper, TokioSleeper};
pub use tls::{TlsConfig, TlsVersion};
pub use transport::{HttpRequest, HttpResponse, HttpTransport, ReqwestTransport, TransportConfig};
pub use validate::{validate, validate_no_content, ApiResponse};
