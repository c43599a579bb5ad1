//! Retry with body replay.
//!
//! Semantics:
//! - A call makes at most `max_retries + 1` attempts.
//! - Transport errors and responses with status 429 or 5xx are retryable; anything else returns
//!   on first occurrence. Cancellation from an inner layer is never retried.
//! - The request body is read into memory once and a fresh copy is attached to every attempt,
//!   including the first. "No body" and "empty body" stay distinct across attempts. Bodies are
//!   replayed for every method; callers issuing non-idempotent requests accept that a retried
//!   5xx may repeat a side effect.
//! - The wait after attempt `n` (zero-based) is `initial_wait × 2^n`, unless the last response
//!   was a 429 carrying an integer `Retry-After`, which replaces that one wait.
//! - When attempts run out, the last response is returned (its status may still be retryable)
//!   tagged with an [`Attempts`] extension; a last transport error becomes
//!   [`Error::RetriesExhausted`].
//! - Waits race the request's [`CallContext`]; cancellation yields [`Error::RetryAborted`].
//!
//! Invariants:
//! - Attempts never exceed `max_retries + 1`.
//! - A discarded response is dropped (body closed) before the next wait starts.
//!
//! Example
//! ```rust
//! use std::time::Duration;
//! use restline::{RetryLayer, RetryPolicy};
//!
//! let policy = RetryPolicy::builder()
//!     .max_retries(2)
//!     .initial_wait(Duration::from_millis(200))
//!     .build();
//! assert_eq!(policy.max_attempts(), 3);
//! let _layer = RetryLayer::new(policy);
//! ```

use crate::backoff::{retry_after, Backoff};
use crate::context::CallContext;
use crate::error::Error;
use crate::path::normalize_cached;
use crate::sleeper::{default_sleeper, Sleeper};
use crate::telemetry::{noop_logger, noop_metrics, Field, Logger, Metrics};
use crate::transport::{HttpRequest, HttpResponse};
use bytes::Bytes;
use futures::future::BoxFuture;
use http::StatusCode;
use http_body_util::BodyExt;
use std::sync::Arc;
use std::task::{Context, Poll};
use std::time::Duration;
use tower::ServiceExt;
use tower_layer::Layer;
use tower_service::Service;

/// Response extension set when retries ran out on a retryable status; holds the attempts made.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Attempts(pub usize);

/// Whether a response status may be retried: 429 or any 5xx.
pub fn is_retryable_status(status: StatusCode) -> bool {
    status == StatusCode::TOO_MANY_REQUESTS || status.is_server_error()
}

/// Retry policy: attempt budget, backoff, and the collaborators used while waiting.
#[derive(Clone)]
pub struct RetryPolicy {
    max_retries: usize,
    backoff: Backoff,
    sleeper: Arc<dyn Sleeper>,
    logger: Arc<dyn Logger>,
    metrics: Arc<dyn Metrics>,
}

impl std::fmt::Debug for RetryPolicy {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("RetryPolicy")
            .field("max_retries", &self.max_retries)
            .field("backoff", &self.backoff)
            .field("sleeper", &self.sleeper)
            .finish()
    }
}

impl Default for RetryPolicy {
    fn default() -> Self {
        RetryPolicyBuilder::new().build()
    }
}

impl RetryPolicy {
    /// Construct a new builder with defaults.
    pub fn builder() -> RetryPolicyBuilder {
        RetryPolicyBuilder::new()
    }

    pub fn max_retries(&self) -> usize {
        self.max_retries
    }

    /// Total attempts (initial try + retries).
    pub fn max_attempts(&self) -> usize {
        self.max_retries.saturating_add(1)
    }

    pub fn backoff(&self) -> Backoff {
        self.backoff
    }

    /// Wait before the attempt following `attempt`, given the response it produced.
    pub fn wait_for(&self, attempt: usize, last: Option<&HttpResponse>) -> Duration {
        last.filter(|resp| resp.status() == StatusCode::TOO_MANY_REQUESTS)
            .and_then(|resp| retry_after(resp.headers()))
            .unwrap_or_else(|| self.backoff.delay(attempt))
    }
}

/// Builder for `RetryPolicy`.
pub struct RetryPolicyBuilder {
    max_retries: usize,
    initial_wait: Duration,
    sleeper: Arc<dyn Sleeper>,
    logger: Arc<dyn Logger>,
    metrics: Arc<dyn Metrics>,
}

impl RetryPolicyBuilder {
    /// Create a builder with sane defaults: 3 retries, 1s initial wait.
    pub fn new() -> Self {
        Self {
            max_retries: 3,
            initial_wait: Duration::from_secs(1),
            sleeper: default_sleeper(),
            logger: noop_logger(),
            metrics: noop_metrics(),
        }
    }

    /// Retries after the first attempt. Zero disables retrying.
    pub fn max_retries(mut self, retries: usize) -> Self {
        self.max_retries = retries;
        self
    }

    /// First backoff wait; later waits double.
    pub fn initial_wait(mut self, wait: Duration) -> Self {
        self.initial_wait = wait;
        self
    }

    /// Provide a custom sleeper implementation.
    pub fn with_sleeper<S>(mut self, sleeper: S) -> Self
    where
        S: Sleeper + 'static,
    {
        self.sleeper = Arc::new(sleeper);
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

    pub fn build(self) -> RetryPolicy {
        RetryPolicy {
            max_retries: self.max_retries,
            backoff: Backoff::exponential(self.initial_wait),
            sleeper: self.sleeper,
            logger: self.logger,
            metrics: self.metrics,
        }
    }
}

impl Default for RetryPolicyBuilder {
    fn default() -> Self {
        Self::new()
    }
}

/// Tower-native retry layer.
#[derive(Clone, Debug, Default)]
pub struct RetryLayer {
    policy: RetryPolicy,
}

impl RetryLayer {
    pub fn new(policy: RetryPolicy) -> Self {
        Self { policy }
    }
}

impl<S> Layer<S> for RetryLayer {
    type Service = RetryService<S>;

    fn layer(&self, inner: S) -> Self::Service {
        RetryService { inner, policy: self.policy.clone() }
    }
}

/// Retry service produced by `RetryLayer`.
#[derive(Clone, Debug)]
pub struct RetryService<S> {
    inner: S,
    policy: RetryPolicy,
}

async fn buffer(body: Option<reqwest::Body>) -> Result<Option<Bytes>, Error> {
    match body {
        None => Ok(None),
        Some(body) => {
            let collected = body.collect().await.map_err(Error::transport)?;
            Ok(Some(collected.to_bytes()))
        }
    }
}

impl<S> Service<HttpRequest> for RetryService<S>
where
    S: Service<HttpRequest, Response = HttpResponse, Error = Error> + Clone + Send + 'static,
    S::Future: Send + 'static,
{
    type Response = HttpResponse;
    type Error = Error;
    type Future = BoxFuture<'static, Result<Self::Response, Self::Error>>;

    fn poll_ready(&mut self, _cx: &mut Context<'_>) -> Poll<Result<(), Self::Error>> {
        Poll::Ready(Ok(()))
    }

    fn call(&mut self, req: HttpRequest) -> Self::Future {
        let policy = self.policy.clone();
        let inner = self.inner.clone();
        Box::pin(async move {
            let ctx = CallContext::of(&req);
            let (parts, body) = req.into_parts();
            let body = buffer(body).await?;
            let endpoint = normalize_cached(parts.uri.path());
            let max_attempts = policy.max_attempts();

            let mut attempt = 0;
            loop {
                let req: HttpRequest =
                    http::Request::from_parts(parts.clone(), body.clone().map(Into::into));
                let outcome = inner.clone().oneshot(req).await;

                let retryable = match &outcome {
                    Ok(resp) => is_retryable_status(resp.status()),
                    Err(err) => err.is_retryable(),
                };
                if !retryable {
                    return outcome;
                }

                if attempt + 1 >= max_attempts {
                    policy.logger.warn(
                        "retries exhausted",
                        &[
                            Field::new("endpoint", &endpoint),
                            Field::new("attempts", max_attempts),
                        ],
                    );
                    return match outcome {
                        Ok(mut resp) => {
                            resp.extensions_mut().insert(Attempts(max_attempts));
                            Ok(resp)
                        }
                        Err(err) => Err(Error::RetriesExhausted {
                            attempts: max_attempts,
                            source: Box::new(err),
                        }),
                    };
                }

                let wait = policy.wait_for(attempt, outcome.as_ref().ok());
                let cause = match &outcome {
                    Ok(resp) => Field::new("status", resp.status().as_u16()),
                    Err(err) => Field::new("error", err),
                };
                policy.logger.warn(
                    "retrying request",
                    &[
                        Field::new("attempt", attempt + 1),
                        Field::new("endpoint", &endpoint),
                        cause,
                        Field::new("wait_ms", wait.as_millis()),
                    ],
                );
                policy.metrics.record_retry(attempt + 1, &endpoint);

                // Release the connection before waiting.
                drop(outcome);

                if let Err(cause) = ctx.wait(policy.sleeper.as_ref(), wait).await {
                    return Err(Error::RetryAborted {
                        attempts: attempt + 1,
                        source: Box::new(Error::cancelled("retry backoff", cause)),
                    });
                }
                attempt += 1;
            }
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::CancelCause;
    use crate::sleeper::{InstantSleeper, RecordingSleeper};
    use crate::telemetry::{MemoryLogger, MemoryMetrics, MetricEvent};
    use std::collections::VecDeque;
    use std::io;
    use std::sync::Mutex;

    #[derive(Clone)]
    enum Step {
        Status(u16),
        StatusWith(u16, &'static str, &'static str),
        Fail,
    }

    #[derive(Clone)]
    struct Scripted {
        steps: Arc<Mutex<VecDeque<Step>>>,
        bodies: Arc<Mutex<Vec<Option<Vec<u8>>>>>,
    }

    impl Scripted {
        fn new(steps: Vec<Step>) -> Self {
            Self { steps: Arc::new(Mutex::new(steps.into())), bodies: Arc::default() }
        }

        fn attempts(&self) -> usize {
            self.bodies.lock().unwrap().len()
        }
    }

    impl Service<HttpRequest> for Scripted {
        type Response = HttpResponse;
        type Error = Error;
        type Future = std::future::Ready<Result<HttpResponse, Error>>;

        fn poll_ready(&mut self, _cx: &mut Context<'_>) -> Poll<Result<(), Error>> {
            Poll::Ready(Ok(()))
        }

        fn call(&mut self, req: HttpRequest) -> Self::Future {
            let body = req.body().as_ref().map(|b| b.as_bytes().unwrap_or_default().to_vec());
            self.bodies.lock().unwrap().push(body);
            let step = self.steps.lock().unwrap().pop_front().unwrap_or(Step::Status(200));
            let respond = |code: u16| {
                http::Response::builder().status(code).body(reqwest::Body::from("")).unwrap()
            };
            std::future::ready(match step {
                Step::Status(code) => Ok(respond(code)),
                Step::StatusWith(code, name, value) => {
                    let mut resp = respond(code);
                    resp.headers_mut().insert(name, http::HeaderValue::from_static(value));
                    Ok(resp)
                }
                Step::Fail => Err(Error::transport(io::Error::new(
                    io::ErrorKind::ConnectionReset,
                    "reset",
                ))),
            })
        }
    }

    fn policy(retries: usize, sleeper: RecordingSleeper) -> RetryPolicy {
        RetryPolicy::builder()
            .max_retries(retries)
            .initial_wait(Duration::from_millis(100))
            .with_sleeper(sleeper)
            .build()
    }

    fn post(body: Option<&'static str>) -> HttpRequest {
        http::Request::builder()
            .method("POST")
            .uri("https://api.test/orders/1234567")
            .body(body.map(reqwest::Body::from))
            .unwrap()
    }

    #[tokio::test]
    async fn recovers_after_transient_failures() {
        let server = Scripted::new(vec![Step::Status(500), Step::Fail, Step::Status(201)]);
        let sleeper = RecordingSleeper::new();
        let svc = RetryLayer::new(policy(3, sleeper.clone())).layer(server.clone());

        let resp = svc.oneshot(post(Some("{}"))).await.unwrap();
        assert_eq!(resp.status(), StatusCode::CREATED);
        assert_eq!(server.attempts(), 3);
        assert_eq!(sleeper.waits(), vec![Duration::from_millis(100), Duration::from_millis(200)]);
    }

    #[tokio::test]
    async fn body_is_replayed_identically() {
        let server = Scripted::new(vec![Step::Status(503), Step::Status(503), Step::Status(200)]);
        let svc = RetryLayer::new(policy(3, RecordingSleeper::new())).layer(server.clone());
        svc.oneshot(post(Some("payload"))).await.unwrap();

        let bodies = server.bodies.lock().unwrap().clone();
        assert_eq!(bodies, vec![Some(b"payload".to_vec()); 3]);
    }

    #[tokio::test]
    async fn no_body_and_empty_body_stay_distinct() {
        let server = Scripted::new(vec![Step::Status(500); 4]);
        let svc = RetryLayer::new(policy(1, RecordingSleeper::new())).layer(server.clone());
        svc.clone().oneshot(post(None)).await.unwrap();
        svc.oneshot(post(Some(""))).await.unwrap();

        let bodies = server.bodies.lock().unwrap().clone();
        assert_eq!(bodies, vec![None, None, Some(Vec::new()), Some(Vec::new())]);
    }

    #[tokio::test]
    async fn client_errors_are_not_retried() {
        let server = Scripted::new(vec![Step::Status(404)]);
        let sleeper = RecordingSleeper::new();
        let svc = RetryLayer::new(policy(3, sleeper.clone())).layer(server.clone());
        let resp = svc.oneshot(post(None)).await.unwrap();
        assert_eq!(resp.status(), StatusCode::NOT_FOUND);
        assert!(resp.extensions().get::<Attempts>().is_none());
        assert_eq!(server.attempts(), 1);
        assert!(sleeper.waits().is_empty());
    }

    #[tokio::test]
    async fn exhaustion_returns_last_response() {
        let server = Scripted::new(vec![Step::Status(502); 4]);
        let logger = MemoryLogger::new();
        let svc = RetryLayer::new(
            RetryPolicy::builder()
                .max_retries(2)
                .with_sleeper(InstantSleeper)
                .logger(Arc::new(logger.clone()))
                .build(),
        )
        .layer(server.clone());

        let resp = svc.oneshot(post(None)).await.unwrap();
        assert_eq!(resp.status(), StatusCode::BAD_GATEWAY);
        assert_eq!(resp.extensions().get::<Attempts>(), Some(&Attempts(3)));
        assert_eq!(server.attempts(), 3);
        assert_eq!(logger.find("retrying request").len(), 2);
        assert_eq!(logger.find("retries exhausted").len(), 1);
    }

    #[tokio::test]
    async fn exhaustion_on_transport_error_names_attempts() {
        let server = Scripted::new(vec![Step::Fail, Step::Fail, Step::Fail]);
        let svc = RetryLayer::new(policy(2, RecordingSleeper::new())).layer(server.clone());
        let err = svc.oneshot(post(None)).await.unwrap_err();
        assert!(err.to_string().contains("failed after 3 attempts"), "{err}");
        assert_eq!(err.attempts(), Some(3));
        assert_eq!(server.attempts(), 3);
    }

    #[tokio::test]
    async fn retry_after_overrides_backoff_only_for_429() {
        let server = Scripted::new(vec![
            Step::StatusWith(429, "retry-after", "7"),
            Step::StatusWith(503, "retry-after", "9"),
            Step::StatusWith(429, "retry-after", "soon"),
            Step::Status(200),
        ]);
        let sleeper = RecordingSleeper::new();
        let svc = RetryLayer::new(policy(3, sleeper.clone())).layer(server);
        svc.oneshot(post(None)).await.unwrap();
        assert_eq!(
            sleeper.waits(),
            vec![Duration::from_secs(7), Duration::from_millis(200), Duration::from_millis(400)]
        );
    }

    #[tokio::test]
    async fn retries_are_measured_with_normalized_endpoint() {
        let server = Scripted::new(vec![Step::Status(500), Step::Status(200)]);
        let metrics = MemoryMetrics::new();
        let svc = RetryLayer::new(
            RetryPolicy::builder()
                .with_sleeper(InstantSleeper)
                .metrics(Arc::new(metrics.clone()))
                .build(),
        )
        .layer(server);
        svc.oneshot(post(None)).await.unwrap();
        assert_eq!(
            metrics.retries(),
            vec![MetricEvent::Retry { attempt: 1, endpoint: "/orders/:id".into() }]
        );
    }

    #[tokio::test(start_paused = true)]
    async fn cancellation_during_backoff_aborts() {
        let server = Scripted::new(vec![Step::Status(500); 10]);
        let svc = RetryLayer::new(RetryPolicy::builder().initial_wait(Duration::from_secs(1)).build())
            .layer(server.clone());
        let mut req = post(None);
        CallContext::with_timeout(Duration::from_millis(50)).attach(&mut req);

        let start = tokio::time::Instant::now();
        let err = svc.oneshot(req).await.unwrap_err();
        assert!(start.elapsed() < Duration::from_millis(100));
        assert!(matches!(err, Error::RetryAborted { attempts: 1, .. }));
        assert_eq!(err.cancel_cause(), Some(CancelCause::DeadlineExceeded));
        assert_eq!(server.attempts(), 1);
    }

    #[tokio::test]
    async fn inner_cancellation_is_not_retried() {
        #[derive(Clone)]
        struct Cancelling;
        impl Service<HttpRequest> for Cancelling {
            type Response = HttpResponse;
            type Error = Error;
            type Future = std::future::Ready<Result<HttpResponse, Error>>;
            fn poll_ready(&mut self, _cx: &mut Context<'_>) -> Poll<Result<(), Error>> {
                Poll::Ready(Ok(()))
            }
            fn call(&mut self, _req: HttpRequest) -> Self::Future {
                std::future::ready(Err(Error::cancelled("transport", CancelCause::Cancelled)))
            }
        }
        let sleeper = RecordingSleeper::new();
        let svc = RetryLayer::new(policy(3, sleeper.clone())).layer(Cancelling);
        let err = svc.oneshot(post(None)).await.unwrap_err();
        assert!(matches!(err, Error::Cancelled { operation: "transport", .. }));
        assert!(sleeper.waits().is_empty());
    }

    #[test]
    fn retryable_status_set() {
        assert!(is_retryable_status(StatusCode::TOO_MANY_REQUESTS));
        assert!(is_retryable_status(StatusCode::INTERNAL_SERVER_ERROR));
        assert!(is_retryable_status(StatusCode::GATEWAY_TIMEOUT));
        assert!(!is_retryable_status(StatusCode::NOT_FOUND));
        assert!(!is_retryable_status(StatusCode::OK));
        assert!(!is_retryable_status(StatusCode::MOVED_PERMANENTLY));
    }
}
