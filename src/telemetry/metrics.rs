use std::fmt;
use std::sync::{Arc, Mutex, PoisonError};
use std::time::Duration;

/// Metrics sink for the transport pipeline.
///
/// `path` and `endpoint` arguments are already normalized templates, so implementations may use
/// them directly as label values.
pub trait Metrics: Send + Sync + fmt::Debug {
    fn record_http_request(&self, method: &str, path: &str, status: u16, duration: Duration);

    fn record_retry(&self, attempt: usize, endpoint: &str);

    fn record_rate_limit(&self, endpoint: &str, wait: Duration);

    fn record_error(&self, operation: &str, kind: &str);
}

/// Metrics sink that discards everything.
#[derive(Debug, Default, Clone, Copy)]
pub struct NoopMetrics;

impl Metrics for NoopMetrics {
    fn record_http_request(&self, _method: &str, _path: &str, _status: u16, _duration: Duration) {}

    fn record_retry(&self, _attempt: usize, _endpoint: &str) {}

    fn record_rate_limit(&self, _endpoint: &str, _wait: Duration) {}

    fn record_error(&self, _operation: &str, _kind: &str) {}
}

/// One recorded metric call.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum MetricEvent {
    HttpRequest { method: String, path: String, status: u16, duration: Duration },
    Retry { attempt: usize, endpoint: String },
    RateLimit { endpoint: String, wait: Duration },
    Error { operation: String, kind: String },
}

/// A metrics sink that stores events in memory.
///
/// Useful for testing and debugging. Events are stored in a `Vec` protected by a `Mutex`.
#[derive(Debug, Clone, Default)]
pub struct MemoryMetrics {
    events: Arc<Mutex<Vec<MetricEvent>>>,
}

impl MemoryMetrics {
    pub fn new() -> Self {
        Self::default()
    }

    /// Returns a snapshot of all events received so far.
    pub fn events(&self) -> Vec<MetricEvent> {
        self.events.lock().unwrap_or_else(PoisonError::into_inner).clone()
    }

    pub fn http_requests(&self) -> Vec<MetricEvent> {
        self.filtered(|e| matches!(e, MetricEvent::HttpRequest { .. }))
    }

    pub fn retries(&self) -> Vec<MetricEvent> {
        self.filtered(|e| matches!(e, MetricEvent::Retry { .. }))
    }

    pub fn rate_limits(&self) -> Vec<MetricEvent> {
        self.filtered(|e| matches!(e, MetricEvent::RateLimit { .. }))
    }

    pub fn errors(&self) -> Vec<MetricEvent> {
        self.filtered(|e| matches!(e, MetricEvent::Error { .. }))
    }

    fn filtered(&self, keep: impl Fn(&MetricEvent) -> bool) -> Vec<MetricEvent> {
        self.events().into_iter().filter(|e| keep(e)).collect()
    }

    fn push(&self, event: MetricEvent) {
        self.events.lock().unwrap_or_else(PoisonError::into_inner).push(event);
    }
}

impl Metrics for MemoryMetrics {
    fn record_http_request(&self, method: &str, path: &str, status: u16, duration: Duration) {
        self.push(MetricEvent::HttpRequest {
            method: method.to_owned(),
            path: path.to_owned(),
            status,
            duration,
        });
    }

    fn record_retry(&self, attempt: usize, endpoint: &str) {
        self.push(MetricEvent::Retry { attempt, endpoint: endpoint.to_owned() });
    }

    fn record_rate_limit(&self, endpoint: &str, wait: Duration) {
        self.push(MetricEvent::RateLimit { endpoint: endpoint.to_owned(), wait });
    }

    fn record_error(&self, operation: &str, kind: &str) {
        self.push(MetricEvent::Error { operation: operation.to_owned(), kind: kind.to_owned() });
    }
}
