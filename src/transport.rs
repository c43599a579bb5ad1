//! Request/response types and the network base transport.
//!
//! Every interceptor is a `tower::Service<HttpRequest>` with [`Error`] as its error type. The
//! innermost service is normally [`ReqwestTransport`], which performs the I/O over a pooled
//! `reqwest::Client` and aborts when the request's [`CallContext`] fires.

use crate::context::CallContext;
use crate::error::{BuildError, Error};
use crate::tls::TlsConfig;
use futures::future::BoxFuture;
use std::task::{Context, Poll};
use std::time::Duration;
use tower::util::BoxCloneSyncService;
use tower_service::Service;

/// Outbound request. `None` is "no body"; `Some` of an empty body is "empty body".
pub type HttpRequest = http::Request<Option<reqwest::Body>>;

/// Inbound response. Dropping it closes the body and releases the connection.
pub type HttpResponse = http::Response<reqwest::Body>;

/// Type-erased transport capability shared by the chain builder and the client.
pub type HttpTransport = BoxCloneSyncService<HttpRequest, HttpResponse, Error>;

/// Settings for the network base transport.
#[derive(Debug, Clone)]
pub struct TransportConfig {
    /// Whole-request timeout enforced by reqwest. `None` disables it.
    pub timeout: Option<Duration>,
    pub connect_timeout: Option<Duration>,
    pub user_agent: String,
    pub tls: TlsConfig,
}

impl Default for TransportConfig {
    fn default() -> Self {
        Self {
            timeout: Some(Duration::from_secs(30)),
            connect_timeout: Some(Duration::from_secs(10)),
            user_agent: format!("restline/{}", env!("CARGO_PKG_VERSION")),
            tls: TlsConfig::default(),
        }
    }
}

/// Network transport over `reqwest`.
#[derive(Debug, Clone)]
pub struct ReqwestTransport {
    client: reqwest::Client,
}

impl ReqwestTransport {
    /// Build a transport with its own connection pool and TLS policy.
    pub fn new(config: &TransportConfig) -> Result<Self, BuildError> {
        let mut builder = reqwest::Client::builder().user_agent(config.user_agent.as_str());
        if let Some(timeout) = config.timeout {
            builder = builder.timeout(timeout);
        }
        if let Some(timeout) = config.connect_timeout {
            builder = builder.connect_timeout(timeout);
        }
        let client =
            config.tls.apply(builder).build().map_err(|e| BuildError::Client(e.to_string()))?;
        Ok(Self { client })
    }

    /// Wrap an already configured client.
    pub fn from_client(client: reqwest::Client) -> Self {
        Self { client }
    }
}

fn into_reqwest(req: HttpRequest) -> Result<reqwest::Request, Error> {
    let (parts, body) = req.into_parts();
    let url = reqwest::Url::parse(&parts.uri.to_string())
        .map_err(|e| Error::InvalidRequest(format!("{}: {e}", parts.uri)))?;
    let mut out = reqwest::Request::new(parts.method, url);
    *out.headers_mut() = parts.headers;
    *out.version_mut() = parts.version;
    *out.body_mut() = body;
    Ok(out)
}

fn from_reqwest(mut resp: reqwest::Response) -> HttpResponse {
    let status = resp.status();
    let version = resp.version();
    let headers = std::mem::take(resp.headers_mut());
    let mut out = http::Response::new(reqwest::Body::from(resp));
    *out.status_mut() = status;
    *out.version_mut() = version;
    *out.headers_mut() = headers;
    out
}

impl Service<HttpRequest> for ReqwestTransport {
    type Response = HttpResponse;
    type Error = Error;
    type Future = BoxFuture<'static, Result<Self::Response, Self::Error>>;

    fn poll_ready(&mut self, _cx: &mut Context<'_>) -> Poll<Result<(), Self::Error>> {
        Poll::Ready(Ok(()))
    }

    fn call(&mut self, req: HttpRequest) -> Self::Future {
        let client = self.client.clone();
        Box::pin(async move {
            let ctx = CallContext::of(&req);
            let request = into_reqwest(req)?;
            tokio::select! {
                biased;
                cause = ctx.done() => Err(Error::cancelled("transport", cause)),
                res = client.execute(request) => res.map(from_reqwest).map_err(Error::transport),
            }
        })
    }
}

/// Box any compatible service into an [`HttpTransport`].
pub fn boxed<S>(service: S) -> HttpTransport
where
    S: Service<HttpRequest, Response = HttpResponse, Error = Error> + Clone + Send + Sync + 'static,
    S::Future: Send + 'static,
{
    BoxCloneSyncService::new(service)
}
