//! Client configuration.
//!
//! [`ClientConfig`] collects every recognized option with documented defaults; the builder
//! validates them once, at construction time.
//!
//! | option                   | default                  |
//! |--------------------------|--------------------------|
//! | `max_retries`            | 3                        |
//! | `initial_wait`           | 1s                       |
//! | `rate_limit_per_minute`  | none (no client limit)   |
//! | `selector`               | none                     |
//! | `logger` / `metrics`     | no-op                    |
//! | `auth`                   | none                     |
//! | `transport`              | [`TransportConfig::default`] |
//!
//! ```rust
//! use restline::{AuthLayer, ClientConfig};
//! use std::time::Duration;
//!
//! let config = ClientConfig::builder()
//!     .base_url("https://unifi.example.com/proxy/network")
//!     .auth(AuthLayer::api_key("X-API-KEY", "secret").unwrap())
//!     .rate_limit_per_minute(100)
//!     .initial_wait(Duration::from_millis(500))
//!     .build()
//!     .unwrap();
//! assert_eq!(config.max_retries(), 3);
//! ```

use crate::auth::AuthLayer;
use crate::chain::{ChainBuilder, Middleware};
use crate::error::BuildError;
use crate::observe::ObserveLayer;
use crate::rate_limit::{LimiterSelector, RateLimitLayer, TokenBucket};
use crate::retry::RetryPolicy;
use crate::sleeper::{default_sleeper, Sleeper};
use crate::telemetry::{noop_logger, noop_metrics, Logger, Metrics};
use crate::tls::TlsConfig;
use crate::transport::TransportConfig;
use std::fmt;
use std::sync::Arc;
use std::time::Duration;

/// Validated client configuration.
#[derive(Clone)]
pub struct ClientConfig {
    base_url: Option<String>,
    max_retries: usize,
    initial_wait: Duration,
    limiter: Option<Arc<TokenBucket>>,
    selector: Option<Arc<dyn LimiterSelector>>,
    logger: Arc<dyn Logger>,
    metrics: Arc<dyn Metrics>,
    sleeper: Arc<dyn Sleeper>,
    auth: Option<AuthLayer>,
    transport: TransportConfig,
}

impl fmt::Debug for ClientConfig {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ClientConfig")
            .field("base_url", &self.base_url)
            .field("max_retries", &self.max_retries)
            .field("initial_wait", &self.initial_wait)
            .field("limiter", &self.limiter)
            .field("selector", &self.selector.as_ref().map(|_| "<selector>"))
            .field("auth", &self.auth.as_ref().map(AuthLayer::header_name))
            .field("transport", &self.transport)
            .finish()
    }
}

impl ClientConfig {
    pub fn builder() -> ClientConfigBuilder {
        ClientConfigBuilder::new()
    }

    pub fn base_url(&self) -> Option<&str> {
        self.base_url.as_deref()
    }

    pub fn max_retries(&self) -> usize {
        self.max_retries
    }

    pub fn initial_wait(&self) -> Duration {
        self.initial_wait
    }

    /// The client-wide bucket, when `rate_limit_per_minute` was set.
    pub fn limiter(&self) -> Option<&Arc<TokenBucket>> {
        self.limiter.as_ref()
    }

    pub fn transport(&self) -> &TransportConfig {
        &self.transport
    }

    pub fn logger(&self) -> Arc<dyn Logger> {
        self.logger.clone()
    }

    pub fn metrics(&self) -> Arc<dyn Metrics> {
        self.metrics.clone()
    }

    pub fn retry_policy(&self) -> RetryPolicy {
        RetryPolicy::builder()
            .max_retries(self.max_retries)
            .initial_wait(self.initial_wait)
            .logger(self.logger.clone())
            .metrics(self.metrics.clone())
            .with_sleeper(self.sleeper.clone())
            .build()
    }

    fn rate_limit_layer(&self) -> Option<RateLimitLayer> {
        let layer = match (&self.selector, &self.limiter) {
            (Some(selector), _) => RateLimitLayer::with_selector(SharedSelector(selector.clone())),
            (None, Some(bucket)) => RateLimitLayer::new(bucket.clone()),
            (None, None) => return None,
        };
        Some(
            layer
                .with_sleeper(self.sleeper.clone())
                .logger(self.logger.clone())
                .metrics(self.metrics.clone()),
        )
    }

    /// The default interceptor order: observe, auth, rate limit, retry.
    pub fn chain(&self) -> ChainBuilder {
        ChainBuilder::new()
            .layer(Middleware::observe(ObserveLayer::new(self.logger.clone(), self.metrics.clone())))
            .optional_layer(self.auth.clone().map(Middleware::auth))
            .optional_layer(self.rate_limit_layer().map(Middleware::rate_limit))
            .layer(Middleware::retry(self.retry_policy()))
    }
}

struct SharedSelector(Arc<dyn LimiterSelector>);

impl LimiterSelector for SharedSelector {
    fn select(&self, req: &crate::transport::HttpRequest) -> crate::rate_limit::Selection {
        self.0.select(req)
    }
}

/// Builder for `ClientConfig`.
pub struct ClientConfigBuilder {
    base_url: Option<String>,
    max_retries: usize,
    initial_wait: Duration,
    rate_limit_per_minute: Option<u32>,
    selector: Option<Arc<dyn LimiterSelector>>,
    logger: Arc<dyn Logger>,
    metrics: Arc<dyn Metrics>,
    sleeper: Arc<dyn Sleeper>,
    auth: Option<AuthLayer>,
    transport: TransportConfig,
}

impl ClientConfigBuilder {
    pub fn new() -> Self {
        Self {
            base_url: None,
            max_retries: 3,
            initial_wait: Duration::from_secs(1),
            rate_limit_per_minute: None,
            selector: None,
            logger: noop_logger(),
            metrics: noop_metrics(),
            sleeper: default_sleeper(),
            auth: None,
            transport: TransportConfig::default(),
        }
    }

    /// Prefix for paths passed to [`ApiClient::request`](crate::ApiClient::request).
    pub fn base_url(mut self, url: impl Into<String>) -> Self {
        self.base_url = Some(url.into());
        self
    }

    pub fn max_retries(mut self, retries: usize) -> Self {
        self.max_retries = retries;
        self
    }

    pub fn initial_wait(mut self, wait: Duration) -> Self {
        self.initial_wait = wait;
        self
    }

    /// One client-wide bucket of `n` requests per minute.
    pub fn rate_limit_per_minute(mut self, n: u32) -> Self {
        self.rate_limit_per_minute = Some(n);
        self
    }

    /// Per-request bucket selection; takes precedence over `rate_limit_per_minute`.
    pub fn selector<S>(mut self, selector: S) -> Self
    where
        S: LimiterSelector + 'static,
    {
        self.selector = Some(Arc::new(selector));
        self
    }

    pub fn logger(mut self, logger: Arc<dyn Logger>) -> Self {
        self.logger = logger;
        self
    }

    pub fn metrics(mut self, metrics: Arc<dyn Metrics>) -> Self {
        self.metrics = metrics;
        self
    }

    /// Sleeper used by rate-limit and backoff waits.
    pub fn sleeper(mut self, sleeper: Arc<dyn Sleeper>) -> Self {
        self.sleeper = sleeper;
        self
    }

    pub fn auth(mut self, auth: AuthLayer) -> Self {
        self.auth = Some(auth);
        self
    }

    pub fn transport(mut self, transport: TransportConfig) -> Self {
        self.transport = transport;
        self
    }

    pub fn tls(mut self, tls: TlsConfig) -> Self {
        self.transport.tls = tls;
        self
    }

    /// Validate and build.
    pub fn build(self) -> Result<ClientConfig, BuildError> {
        let base_url = match self.base_url {
            Some(url) => {
                reqwest::Url::parse(&url).map_err(|e| BuildError::InvalidBaseUrl {
                    url: url.clone(),
                    reason: e.to_string(),
                })?;
                Some(url.trim_end_matches('/').to_owned())
            }
            None => None,
        };
        let limiter = self.rate_limit_per_minute.map(TokenBucket::per_minute).transpose()?;
        Ok(ClientConfig {
            base_url,
            max_retries: self.max_retries,
            initial_wait: self.initial_wait,
            limiter: limiter.map(Arc::new),
            selector: self.selector,
            logger: self.logger,
            metrics: self.metrics,
            sleeper: self.sleeper,
            auth: self.auth,
            transport: self.transport,
        })
    }
}

impl Default for ClientConfigBuilder {
    fn default() -> Self {
        Self::new()
    }
}
