//! The client facade consumed by endpoint methods.
//!
//! [`ApiClient`] owns one composed transport and exposes the `execute(request)` contract plus
//! the two helpers every generated endpoint method reduces to: [`ApiClient::send_json`] and
//! [`ApiClient::send_no_content`].

use crate::chain::Middleware;
use crate::config::ClientConfig;
use crate::error::{BuildError, Error};
use crate::retry::Attempts;
use crate::transport::{HttpRequest, HttpResponse, HttpTransport, ReqwestTransport};
use crate::validate::{validate, validate_no_content, ApiResponse};
use http::{Method, StatusCode};
use http_body_util::BodyExt;
use serde::de::DeserializeOwned;
use std::sync::Arc;
use tower::ServiceExt;
use tower_service::Service;

/// A configured, clonable API client.
#[derive(Clone)]
pub struct ApiClient {
    transport: HttpTransport,
    base_url: Option<Arc<str>>,
    middleware: Vec<&'static str>,
}

impl std::fmt::Debug for ApiClient {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ApiClient")
            .field("base_url", &self.base_url)
            .field("middleware", &self.middleware)
            .finish()
    }
}

impl ApiClient {
    /// Build the default chain over a network transport.
    pub fn new(config: ClientConfig) -> Result<Self, BuildError> {
        let base = ReqwestTransport::new(config.transport())?;
        Ok(Self::with_transport(config, base))
    }

    /// Build the default chain over `base`.
    pub fn with_transport<S>(config: ClientConfig, base: S) -> Self
    where
        S: Service<HttpRequest, Response = HttpResponse, Error = Error>
            + Clone
            + Send
            + Sync
            + 'static,
        S::Future: Send + 'static,
    {
        Self::with_middleware(config, base, std::iter::empty())
    }

    /// Build the default chain with `extra` middleware between retry and `base`.
    pub fn with_middleware<S, I>(config: ClientConfig, base: S, extra: I) -> Self
    where
        S: Service<HttpRequest, Response = HttpResponse, Error = Error>
            + Clone
            + Send
            + Sync
            + 'static,
        S::Future: Send + 'static,
        I: IntoIterator<Item = Middleware>,
    {
        let builder = extra.into_iter().fold(config.chain(), |b, mw| b.layer(mw));
        Self {
            middleware: builder.names(),
            transport: builder.build(base),
            base_url: config.base_url().map(Arc::from),
        }
    }

    /// Interceptor names, outermost first.
    pub fn middleware(&self) -> &[&'static str] {
        &self.middleware
    }

    /// A bodiless request for `path`, resolved against the base URL.
    pub fn request(&self, method: Method, path: &str) -> Result<HttpRequest, Error> {
        let uri = match &self.base_url {
            Some(base) if path.starts_with('/') => format!("{base}{path}"),
            Some(base) => format!("{base}/{path}"),
            None => path.to_owned(),
        };
        http::Request::builder()
            .method(method)
            .uri(uri)
            .body(None)
            .map_err(|e| Error::InvalidRequest(e.to_string()))
    }

    /// Send `req` through the chain.
    pub async fn execute(&self, req: HttpRequest) -> Result<HttpResponse, Error> {
        self.transport.clone().oneshot(req).await
    }

    /// Send `req` and decode a JSON payload returned with `expected`.
    ///
    /// An empty body or a JSON `null` counts as "no payload".
    pub async fn send_json<T>(
        &self,
        operation: &'static str,
        req: HttpRequest,
        expected: StatusCode,
    ) -> Result<T, Error>
    where
        T: DeserializeOwned,
    {
        let response = match self.execute(req).await {
            Ok(response) => response,
            Err(err) => return validate(operation, Err(err), expected),
        };
        let status = response.status();
        let attempts = response.extensions().get::<Attempts>().map(|a| a.0);
        let payload = if status == expected { decode(operation, response).await? } else { None };
        let response = ApiResponse::new(status, payload).with_attempts(attempts);
        validate(operation, Ok(response), expected)
    }

    /// Send `req` and check that it returned `expected` without reading a payload.
    pub async fn send_no_content(
        &self,
        operation: &'static str,
        req: HttpRequest,
        expected: StatusCode,
    ) -> Result<(), Error> {
        let response = match self.execute(req).await {
            Ok(response) => response,
            Err(err) => return validate_no_content(operation, Err(err), expected),
        };
        let attempts = response.extensions().get::<Attempts>().map(|a| a.0);
        let status = ApiResponse::new(response.status(), Some(())).with_attempts(attempts);
        validate(operation, Ok(status), expected)
    }
}

async fn decode<T>(operation: &'static str, response: HttpResponse) -> Result<Option<T>, Error>
where
    T: DeserializeOwned,
{
    let bytes = response
        .into_body()
        .collect()
        .await
        .map_err(|e| Error::Operation { operation, source: Box::new(Error::transport(e)) })?
        .to_bytes();
    if bytes.is_empty() {
        return Ok(None);
    }
    serde_json::from_slice::<Option<T>>(&bytes).map_err(|source| Error::Decode { operation, source })
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde::Deserialize;

    #[derive(Debug, Deserialize, PartialEq)]
    struct Site {
        name: String,
    }

    fn fixed(status: u16, body: &'static str) -> impl Service<
        HttpRequest,
        Response = HttpResponse,
        Error = Error,
        Future = std::future::Ready<Result<HttpResponse, Error>>,
    > + Clone
           + Send
           + Sync
           + 'static {
        tower::service_fn(move |_req: HttpRequest| {
            std::future::ready(Ok(http::Response::builder()
                .status(status)
                .body(reqwest::Body::from(body))
                .unwrap()))
        })
    }

    fn client(status: u16, body: &'static str) -> ApiClient {
        let config = ClientConfig::builder().base_url("https://api.test/v1").build().unwrap();
        ApiClient::with_transport(config, fixed(status, body))
    }

    #[test]
    fn request_joins_base_url() {
        let client = client(200, "");
        let req = client.request(Method::GET, "/sites/default").unwrap();
        assert_eq!(req.uri(), "https://api.test/v1/sites/default");
        assert!(req.body().is_none());
        let req = client.request(Method::DELETE, "sites").unwrap();
        assert_eq!(req.uri(), "https://api.test/v1/sites");
    }

    #[tokio::test]
    async fn send_json_decodes_expected_payload() {
        let client = client(200, r#"{"name":"default"}"#);
        let req = client.request(Method::GET, "/sites/1").unwrap();
        let site: Site = client.send_json("get_site", req, StatusCode::OK).await.unwrap();
        assert_eq!(site, Site { name: "default".into() });
    }

    #[tokio::test]
    async fn send_json_reports_empty_and_mismatch() {
        let empty = client(200, "null");
        let req = empty.request(Method::GET, "/sites/1").unwrap();
        let err = empty.send_json::<Site>("get_site", req, StatusCode::OK).await.unwrap_err();
        assert!(matches!(err, Error::EmptyResponse { operation: "get_site" }));

        let missing = client(404, r#"{"error":"nope"}"#);
        let req = missing.request(Method::GET, "/sites/1").unwrap();
        let err = missing.send_json::<Site>("get_site", req, StatusCode::OK).await.unwrap_err();
        assert_eq!(err.status(), Some(StatusCode::NOT_FOUND));
    }

    #[tokio::test]
    async fn send_json_reports_decode_errors() {
        let client = client(200, "{not json");
        let req = client.request(Method::GET, "/sites/1").unwrap();
        let err = client.send_json::<Site>("get_site", req, StatusCode::OK).await.unwrap_err();
        assert!(matches!(err, Error::Decode { operation: "get_site", .. }));
    }

    #[tokio::test]
    async fn send_no_content_checks_status() {
        let client = client(204, "");
        let req = client.request(Method::DELETE, "/sites/1").unwrap();
        client.send_no_content("delete_site", req, StatusCode::NO_CONTENT).await.unwrap();
    }

    #[test]
    fn default_chain_is_reported() {
        assert_eq!(client(200, "").middleware(), ["observe", "retry"]);
    }
}
