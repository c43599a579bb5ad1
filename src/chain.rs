//! Middleware composition.
//!
//! A [`Middleware`] decorates an [`HttpTransport`] and returns another one. The builder folds an
//! ordered list from innermost to outermost, so `[A, B, C]` around `base` yields
//! `A(B(C(base)))`: `A` runs first on the way in and last on the way out.
//!
//! ```rust
//! use restline::chain::{ChainBuilder, Middleware};
//! use restline::{AuthLayer, HttpRequest, HttpResponse};
//! use http::{HeaderName, HeaderValue};
//!
//! let base = tower::service_fn(|req: HttpRequest| async move {
//!     assert_eq!(req.headers()["x-api-key"], "secret");
//!     Ok::<_, restline::Error>(HttpResponse::new(reqwest::Body::from("ok")))
//! });
//! let auth = AuthLayer::new(
//!     HeaderName::from_static("x-api-key"),
//!     HeaderValue::from_static("secret"),
//! );
//! let _transport = ChainBuilder::new().layer(Middleware::from_layer("auth", auth)).build(base);
//! ```
//!
//! Building happens once, at client construction. The composed transport is immutable and can be
//! cloned freely across tasks; each clone shares the interceptors' state.

use crate::auth::AuthLayer;
use crate::error::Error;
use crate::observe::ObserveLayer;
use crate::rate_limit::RateLimitLayer;
use crate::retry::{RetryLayer, RetryPolicy};
use crate::transport::{boxed, HttpRequest, HttpResponse, HttpTransport};
use std::fmt;
use std::sync::Arc;
use tower_layer::Layer;
use tower_service::Service;

type Wrap = dyn Fn(HttpTransport) -> HttpTransport + Send + Sync;

/// A named transport decorator.
#[derive(Clone)]
pub struct Middleware {
    name: &'static str,
    wrap: Arc<Wrap>,
}

impl fmt::Debug for Middleware {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Middleware").field("name", &self.name).finish()
    }
}

impl Middleware {
    /// Decorator from a plain function.
    pub fn from_fn<F>(name: &'static str, wrap: F) -> Self
    where
        F: Fn(HttpTransport) -> HttpTransport + Send + Sync + 'static,
    {
        Self { name, wrap: Arc::new(wrap) }
    }

    /// Decorator from any tower layer whose service speaks the transport contract.
    pub fn from_layer<L>(name: &'static str, layer: L) -> Self
    where
        L: Layer<HttpTransport> + Send + Sync + 'static,
        L::Service: Service<HttpRequest, Response = HttpResponse, Error = Error>
            + Clone
            + Send
            + Sync
            + 'static,
        <L::Service as Service<HttpRequest>>::Future: Send + 'static,
    {
        Self::from_fn(name, move |inner| boxed(layer.layer(inner)))
    }

    /// Credential injection.
    pub fn auth(layer: AuthLayer) -> Self {
        Self::from_layer("auth", layer)
    }

    /// Client-side token-bucket admission.
    pub fn rate_limit(layer: RateLimitLayer) -> Self {
        Self::from_layer("rate_limit", layer)
    }

    /// Retry with body replay.
    pub fn retry(policy: RetryPolicy) -> Self {
        Self::from_layer("retry", RetryLayer::new(policy))
    }

    /// Timing, logs, and request metrics.
    pub fn observe(layer: ObserveLayer) -> Self {
        Self::from_layer("observe", layer)
    }

    pub fn name(&self) -> &'static str {
        self.name
    }

    /// Apply this decorator to `inner`.
    pub fn wrap(&self, inner: HttpTransport) -> HttpTransport {
        (self.wrap)(inner)
    }
}

impl Layer<HttpTransport> for Middleware {
    type Service = HttpTransport;

    fn layer(&self, inner: HttpTransport) -> Self::Service {
        self.wrap(inner)
    }
}

/// Ordered list of middleware, outermost first.
#[derive(Debug, Clone, Default)]
pub struct ChainBuilder {
    middleware: Vec<Middleware>,
}

impl ChainBuilder {
    pub fn new() -> Self {
        Self::default()
    }

    /// Append a middleware; it runs inside everything added before it.
    #[must_use]
    pub fn layer(mut self, middleware: Middleware) -> Self {
        self.middleware.push(middleware);
        self
    }

    /// Append a middleware when present.
    #[must_use]
    pub fn optional_layer(self, middleware: Option<Middleware>) -> Self {
        match middleware {
            Some(mw) => self.layer(mw),
            None => self,
        }
    }

    /// Names in execution order.
    pub fn names(&self) -> Vec<&'static str> {
        self.middleware.iter().map(Middleware::name).collect()
    }

    /// Compose around `base`.
    pub fn build<S>(&self, base: S) -> HttpTransport
    where
        S: Service<HttpRequest, Response = HttpResponse, Error = Error>
            + Clone
            + Send
            + Sync
            + 'static,
        S::Future: Send + 'static,
    {
        self.middleware.iter().rev().fold(boxed(base), |inner, mw| mw.wrap(inner))
    }
}

/// Compose `middleware` (outermost first) around `base`.
pub fn chain<S, I>(base: S, middleware: I) -> HttpTransport
where
    S: Service<HttpRequest, Response = HttpResponse, Error = Error> + Clone + Send + Sync + 'static,
    S::Future: Send + 'static,
    I: IntoIterator<Item = Middleware>,
{
    middleware.into_iter().fold(ChainBuilder::new(), ChainBuilder::layer).build(base)
}
