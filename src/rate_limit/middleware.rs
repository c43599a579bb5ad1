use super::{LimiterSelector, Selection, TokenBucket, DEFAULT_LABEL};
use crate::context::CallContext;
use crate::error::Error;
use crate::sleeper::{default_sleeper, Sleeper};
use crate::telemetry::{noop_logger, noop_metrics, Field, Logger, Metrics};
use crate::transport::{HttpRequest, HttpResponse};
use futures::future::BoxFuture;
use std::fmt;
use std::sync::Arc;
use std::task::{Context, Poll};
use tower::ServiceExt;
use tower_layer::Layer;
use tower_service::Service;

/// A layer that makes every request wait for a token from its selected bucket.
#[derive(Clone)]
pub struct RateLimitLayer {
    selector: Arc<dyn LimiterSelector>,
    sleeper: Arc<dyn Sleeper>,
    logger: Arc<dyn Logger>,
    metrics: Arc<dyn Metrics>,
}

impl fmt::Debug for RateLimitLayer {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("RateLimitLayer")
            .field("selector", &"<selector>")
            .field("sleeper", &self.sleeper)
            .finish()
    }
}

impl RateLimitLayer {
    /// Guard every request with `bucket`, reported as `"default"`.
    pub fn new(bucket: Arc<TokenBucket>) -> Self {
        let selection = Selection::new(Some(bucket), DEFAULT_LABEL);
        Self::with_selector(move |_: &HttpRequest| selection.clone())
    }

    /// Pick the bucket per request.
    pub fn with_selector<S>(selector: S) -> Self
    where
        S: LimiterSelector + 'static,
    {
        Self {
            selector: Arc::new(selector),
            sleeper: default_sleeper(),
            logger: noop_logger(),
            metrics: noop_metrics(),
        }
    }

    #[must_use]
    pub fn with_sleeper(mut self, sleeper: Arc<dyn Sleeper>) -> Self {
        self.sleeper = sleeper;
        self
    }

    #[must_use]
    pub fn logger(mut self, logger: Arc<dyn Logger>) -> Self {
        self.logger = logger;
        self
    }

    #[must_use]
    pub fn metrics(mut self, metrics: Arc<dyn Metrics>) -> Self {
        self.metrics = metrics;
        self
    }

    /// Wait until `req` may be sent. Fails only when the caller cancels first.
    async fn admit(&self, req: &HttpRequest) -> Result<(), Error> {
        let Selection { limiter, label } = self.selector.select(req);
        let Some(bucket) = limiter else {
            return Ok(());
        };
        let reservation = bucket.reserve();
        let delay = reservation.delay();
        if delay.is_zero() {
            return Ok(());
        }

        self.logger.info(
            "rate limit wait",
            &[Field::new("endpoint", &label), Field::new("wait_ms", delay.as_millis())],
        );
        self.metrics.record_rate_limit(&label, delay);

        match CallContext::of(req).wait(self.sleeper.as_ref(), delay).await {
            Ok(()) => Ok(()),
            Err(cause) => {
                reservation.cancel();
                Err(Error::RateLimitWait { label: label.into_owned(), cause })
            }
        }
    }
}

impl<S> Layer<S> for RateLimitLayer {
    type Service = RateLimitService<S>;

    fn layer(&self, inner: S) -> Self::Service {
        RateLimitService { inner, layer: self.clone() }
    }
}

/// Middleware service that enforces rate limits.
#[derive(Clone)]
pub struct RateLimitService<S> {
    inner: S,
    layer: RateLimitLayer,
}

impl<S> Service<HttpRequest> for RateLimitService<S>
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
        let layer = self.layer.clone();
        let mut inner = self.inner.clone();
        Box::pin(async move {
            layer.admit(&req).await?;
            inner.ready().await?.call(req).await
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::sleeper::RecordingSleeper;
    use crate::telemetry::{MemoryLogger, MemoryMetrics, MetricEvent};
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::time::Duration;

    fn counting(hits: &Arc<AtomicUsize>) -> impl Service<
        HttpRequest,
        Response = HttpResponse,
        Error = Error,
        Future = std::future::Ready<Result<HttpResponse, Error>>,
    > + Clone
           + Send
           + 'static {
        let hits = hits.clone();
        tower::service_fn(move |_req: HttpRequest| {
            hits.fetch_add(1, Ordering::SeqCst);
            std::future::ready(Ok(HttpResponse::new(reqwest::Body::from(""))))
        })
    }

    #[tokio::test(start_paused = true)]
    async fn waits_are_logged_and_measured_only_when_delayed() {
        let hits = Arc::new(AtomicUsize::new(0));
        let logger = MemoryLogger::new();
        let metrics = MemoryMetrics::new();
        let sleeper = RecordingSleeper::new();
        let layer = RateLimitLayer::new(Arc::new(TokenBucket::new(2, 1.0).unwrap()))
            .with_sleeper(Arc::new(sleeper.clone()))
            .logger(Arc::new(logger.clone()))
            .metrics(Arc::new(metrics.clone()));
        let svc = layer.layer(counting(&hits));

        for _ in 0..3 {
            svc.clone().oneshot(http::Request::new(None)).await.unwrap();
        }

        assert_eq!(hits.load(Ordering::SeqCst), 3);
        assert_eq!(sleeper.waits(), vec![Duration::from_secs(1)]);
        assert_eq!(
            metrics.rate_limits(),
            vec![MetricEvent::RateLimit { endpoint: "default".into(), wait: Duration::from_secs(1) }]
        );
        let waits = logger.find("rate limit wait");
        assert_eq!(waits.len(), 1);
        assert_eq!(waits[0].field("endpoint"), Some("default"));
    }

    #[tokio::test]
    async fn bypass_selection_skips_the_bucket() {
        let hits = Arc::new(AtomicUsize::new(0));
        let metrics = MemoryMetrics::new();
        let svc = RateLimitLayer::with_selector(|_: &HttpRequest| Selection::bypass("none"))
            .metrics(Arc::new(metrics.clone()))
            .layer(counting(&hits));
        for _ in 0..5 {
            svc.clone().oneshot(http::Request::new(None)).await.unwrap();
        }
        assert_eq!(hits.load(Ordering::SeqCst), 5);
        assert!(metrics.rate_limits().is_empty());
    }

    #[tokio::test(start_paused = true)]
    async fn cancelled_wait_releases_the_reservation() {
        let hits = Arc::new(AtomicUsize::new(0));
        let bucket = Arc::new(TokenBucket::new(1, 0.1).unwrap());
        let svc = RateLimitLayer::new(bucket.clone()).layer(counting(&hits));
        svc.clone().oneshot(http::Request::new(None)).await.unwrap();

        let mut req = http::Request::new(None);
        CallContext::with_timeout(Duration::from_millis(50)).attach(&mut req);
        let err = svc.oneshot(req).await.unwrap_err();

        assert!(matches!(err, Error::RateLimitWait { ref label, .. } if label == "default"));
        assert!(err.is_cancelled());
        assert_eq!(hits.load(Ordering::SeqCst), 1, "no request is sent after cancellation");
        assert!(bucket.available() > -0.5, "token handed back");
    }
}
