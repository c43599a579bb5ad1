//! Prometheus metrics for `restline`.
//! Bring your own `prometheus::Registry`; collectors are registered once and updated on every
//! call. Path and endpoint labels arrive already normalized, so label cardinality stays bounded.

use prometheus::{HistogramOpts, HistogramVec, IntCounterVec, Opts, Registry};
use restline::telemetry::Metrics;
use std::sync::Arc;
use std::time::Duration;

/// `Metrics` implementation backed by Prometheus collectors.
#[derive(Clone, Debug)]
pub struct PrometheusMetrics {
    registry: Arc<Registry>,
    requests: IntCounterVec,
    request_duration: HistogramVec,
    retries: IntCounterVec,
    rate_limit_waits: HistogramVec,
    errors: IntCounterVec,
}

impl PrometheusMetrics {
    /// Create the collectors and register them into the provided registry.
    ///
    /// # Errors
    /// Returns an error if a metric cannot be registered (e.g. name conflict).
    pub fn new<R: Into<Arc<Registry>>>(registry: R) -> Result<Self, prometheus::Error> {
        let registry = registry.into();
        let requests = IntCounterVec::new(
            Opts::new("restline_http_requests_total", "Completed outbound HTTP requests"),
            &["method", "path", "status"],
        )?;
        let request_duration = HistogramVec::new(
            HistogramOpts::new(
                "restline_http_request_duration_seconds",
                "Outbound HTTP request latency, including retries and rate-limit waits",
            ),
            &["method", "path"],
        )?;
        let retries = IntCounterVec::new(
            Opts::new("restline_retries_total", "Retry attempts scheduled"),
            &["endpoint", "attempt"],
        )?;
        let rate_limit_waits = HistogramVec::new(
            HistogramOpts::new(
                "restline_rate_limit_wait_seconds",
                "Time spent waiting for a client-side rate-limit token",
            ),
            &["endpoint"],
        )?;
        let errors = IntCounterVec::new(
            Opts::new("restline_errors_total", "Failed operations by error kind"),
            &["operation", "kind"],
        )?;

        registry.register(Box::new(requests.clone()))?;
        registry.register(Box::new(request_duration.clone()))?;
        registry.register(Box::new(retries.clone()))?;
        registry.register(Box::new(rate_limit_waits.clone()))?;
        registry.register(Box::new(errors.clone()))?;
        Ok(Self { registry, requests, request_duration, retries, rate_limit_waits, errors })
    }

    /// Expose the registry for HTTP scraping.
    pub fn registry(&self) -> &Registry {
        &self.registry
    }
}

impl Metrics for PrometheusMetrics {
    fn record_http_request(&self, method: &str, path: &str, status: u16, duration: Duration) {
        let status = status.to_string();
        self.requests.with_label_values(&[method, path, status.as_str()]).inc();
        self.request_duration.with_label_values(&[method, path]).observe(duration.as_secs_f64());
    }

    fn record_retry(&self, attempt: usize, endpoint: &str) {
        let attempt = attempt.to_string();
        self.retries.with_label_values(&[endpoint, attempt.as_str()]).inc();
    }

    fn record_rate_limit(&self, endpoint: &str, wait: Duration) {
        self.rate_limit_waits.with_label_values(&[endpoint]).observe(wait.as_secs_f64());
    }

    fn record_error(&self, operation: &str, kind: &str) {
        self.errors.with_label_values(&[operation, kind]).inc();
    }
}
