//! Timing, structured logs, and request metrics.
//!
//! [`ObserveLayer`] is usually the outermost link so its timing covers rate-limit and retry
//! waits. Metrics are labelled with the normalized path template; logs carry the full URL.

use crate::error::Error;
use crate::path::{self, PathTemplateCache};
use crate::telemetry::{Field, Logger, Metrics};
use crate::transport::{HttpRequest, HttpResponse};
use futures::future::BoxFuture;
use std::fmt;
use std::sync::Arc;
use std::task::{Context, Poll};
use tokio::time::Instant;
use tower::ServiceExt;
use tower_layer::Layer;
use tower_service::Service;

#[derive(Clone)]
enum Paths {
    Global,
    Local(Arc<PathTemplateCache>),
}

impl Paths {
    fn normalize(&self, raw: &str) -> Arc<str> {
        match self {
            Paths::Global => path::normalize_cached(raw),
            Paths::Local(cache) => cache.normalize(raw),
        }
    }
}

/// Layer that logs and measures every call.
#[derive(Clone)]
pub struct ObserveLayer {
    logger: Arc<dyn Logger>,
    metrics: Arc<dyn Metrics>,
    paths: Paths,
}

impl fmt::Debug for ObserveLayer {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ObserveLayer")
            .field("logger", &self.logger)
            .field("metrics", &self.metrics)
            .finish()
    }
}

impl ObserveLayer {
    /// Observe through `logger` and `metrics`, normalizing paths with the process-wide cache.
    pub fn new(logger: Arc<dyn Logger>, metrics: Arc<dyn Metrics>) -> Self {
        Self { logger, metrics, paths: Paths::Global }
    }

    /// Use a dedicated path cache instead of the process-wide one.
    #[must_use]
    pub fn with_paths(mut self, cache: Arc<PathTemplateCache>) -> Self {
        self.paths = Paths::Local(cache);
        self
    }
}

impl<S> Layer<S> for ObserveLayer {
    type Service = ObserveService<S>;

    fn layer(&self, inner: S) -> Self::Service {
        ObserveService { inner, layer: self.clone() }
    }
}

/// Service produced by [`ObserveLayer`].
#[derive(Clone)]
pub struct ObserveService<S> {
    inner: S,
    layer: ObserveLayer,
}

impl<S> Service<HttpRequest> for ObserveService<S>
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
        let inner = self.inner.clone();
        Box::pin(async move {
            let method = req.method().clone();
            let url = req.uri().to_string();
            let raw_path = req.uri().path().to_owned();

            layer.logger.debug(
                "http request started",
                &[
                    Field::new("method", &method),
                    Field::new("url", &url),
                    Field::new("path", &raw_path),
                ],
            );

            let start = Instant::now();
            let result = inner.oneshot(req).await;
            let duration = start.elapsed();

            match &result {
                Err(err) => {
                    layer.logger.error(
                        "http request failed",
                        &[
                            Field::new("method", &method),
                            Field::new("url", &url),
                            Field::new("duration_ms", duration.as_millis()),
                            Field::new("error", err),
                        ],
                    );
                    layer.metrics.record_error("http_request", err.kind());
                }
                Ok(resp) => {
                    let status = resp.status();
                    let fields = [
                        Field::new("method", &method),
                        Field::new("url", &url),
                        Field::new("status", status.as_u16()),
                        Field::new("duration_ms", duration.as_millis()),
                    ];
                    if status.as_u16() >= 400 {
                        layer.logger.warn("http request completed", &fields);
                    } else {
                        layer.logger.debug("http request completed", &fields);
                    }
                    let template = layer.paths.normalize(&raw_path);
                    layer.metrics.record_http_request(
                        method.as_str(),
                        &template,
                        status.as_u16(),
                        duration,
                    );
                }
            }
            result
        })
    }
}
