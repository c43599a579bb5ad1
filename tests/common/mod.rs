#![allow(dead_code)]

use futures::StreamExt;
use restline::{ClientConfig, ClientConfigBuilder, Error, HttpRequest, HttpResponse};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::task::{Context, Poll};
use tower::{Service, ServiceExt};
use wiremock::MockServer;

/// Config builder pointed at a mock server.
pub fn config_for(server: &MockServer) -> ClientConfigBuilder {
    ClientConfig::builder().base_url(server.uri())
}

/// Counts responses handed out and response bodies dropped.
#[derive(Debug, Default)]
pub struct BodyLedger {
    opened: AtomicUsize,
    closed: AtomicUsize,
}

impl BodyLedger {
    pub fn opened(&self) -> usize {
        self.opened.load(Ordering::SeqCst)
    }

    pub fn closed(&self) -> usize {
        self.closed.load(Ordering::SeqCst)
    }
}

struct CloseGuard(Arc<BodyLedger>);

impl Drop for CloseGuard {
    fn drop(&mut self) {
        self.0.closed.fetch_add(1, Ordering::SeqCst);
    }
}

/// Base transport wrapper that records every response body's lifetime.
#[derive(Clone)]
pub struct Tracked<S> {
    inner: S,
    ledger: Arc<BodyLedger>,
}

impl<S> Tracked<S> {
    pub fn new(inner: S) -> (Self, Arc<BodyLedger>) {
        let ledger = Arc::new(BodyLedger::default());
        (Self { inner, ledger: ledger.clone() }, ledger)
    }
}

impl<S> Service<HttpRequest> for Tracked<S>
where
    S: Service<HttpRequest, Response = HttpResponse, Error = Error> + Clone + Send + 'static,
    S::Future: Send + 'static,
{
    type Response = HttpResponse;
    type Error = Error;
    type Future = futures::future::BoxFuture<'static, Result<HttpResponse, Error>>;

    fn poll_ready(&mut self, _cx: &mut Context<'_>) -> Poll<Result<(), Error>> {
        Poll::Ready(Ok(()))
    }

    fn call(&mut self, req: HttpRequest) -> Self::Future {
        let inner = self.inner.clone();
        let ledger = self.ledger.clone();
        Box::pin(async move {
            let resp = inner.oneshot(req).await?;
            ledger.opened.fetch_add(1, Ordering::SeqCst);
            let guard = CloseGuard(ledger);
            Ok(resp.map(move |body| {
                let stream = http_body_util::BodyDataStream::new(body).map(move |chunk| {
                    let _alive = &guard;
                    chunk
                });
                reqwest::Body::wrap_stream(stream)
            }))
        })
    }
}

/// Live tasks on the current runtime, polled until it drops to `ceiling` or two seconds pass.
pub async fn settle_tasks(ceiling: usize) -> usize {
    let metrics = tokio::runtime::Handle::current().metrics();
    for _ in 0..200 {
        let alive = metrics.num_alive_tasks();
        if alive <= ceiling {
            return alive;
        }
        tokio::time::sleep(std::time::Duration::from_millis(10)).await;
    }
    metrics.num_alive_tasks()
}

/// Terminal service answering every request with `status` and counting calls.
pub fn fixed_status(
    status: u16,
    hits: Arc<AtomicUsize>,
) -> impl Service<
    HttpRequest,
    Response = HttpResponse,
    Error = Error,
    Future = std::future::Ready<Result<HttpResponse, Error>>,
> + Clone
       + Send
       + Sync
       + 'static {
    tower::service_fn(move |_req: HttpRequest| {
        hits.fetch_add(1, Ordering::SeqCst);
        std::future::ready(Ok(http::Response::builder()
            .status(status)
            .body(reqwest::Body::from(""))
            .expect("static response")))
    })
}
