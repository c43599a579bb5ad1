//! Credential injection.
//!
//! [`AuthLayer`] sets one header on every outgoing request and forwards it unchanged otherwise.
//! Any existing header with the same name is overwritten; the value is marked sensitive so it
//! never shows up in `Debug` output of the request.
//!
//! ```rust
//! use restline::AuthLayer;
//!
//! let bearer = AuthLayer::bearer("s3cr3t").unwrap();
//! let api_key = AuthLayer::api_key("X-API-KEY", "s3cr3t").unwrap();
//! assert_eq!(api_key.header_name().as_str(), "x-api-key");
//! # let _ = bearer;
//! ```

use crate::error::{BuildError, Error};
use crate::transport::{HttpRequest, HttpResponse};
use http::header::AUTHORIZATION;
use http::{HeaderName, HeaderValue};
use std::task::{Context, Poll};
use tower_layer::Layer;
use tower_service::Service;

/// Layer that injects a fixed credential header.
#[derive(Clone, Debug)]
pub struct AuthLayer {
    name: HeaderName,
    value: HeaderValue,
}

impl AuthLayer {
    /// Inject `name: value`.
    pub fn new(name: HeaderName, mut value: HeaderValue) -> Self {
        value.set_sensitive(true);
        Self { name, value }
    }

    /// `Authorization: Bearer <token>`.
    pub fn bearer(token: &str) -> Result<Self, BuildError> {
        let value = header_value(AUTHORIZATION.as_str(), &format!("Bearer {token}"))?;
        Ok(Self::new(AUTHORIZATION, value))
    }

    /// An API key under a custom header, e.g. `X-API-KEY`.
    pub fn api_key(name: &str, key: &str) -> Result<Self, BuildError> {
        let header = HeaderName::from_bytes(name.as_bytes()).map_err(|e| {
            BuildError::InvalidHeader { name: name.to_owned(), reason: e.to_string() }
        })?;
        let value = header_value(name, key)?;
        Ok(Self::new(header, value))
    }

    pub fn header_name(&self) -> &HeaderName {
        &self.name
    }
}

fn header_value(name: &str, raw: &str) -> Result<HeaderValue, BuildError> {
    HeaderValue::from_str(raw).map_err(|e| BuildError::InvalidHeader {
        name: name.to_owned(),
        reason: e.to_string(),
    })
}

impl<S> Layer<S> for AuthLayer {
    type Service = AuthService<S>;

    fn layer(&self, inner: S) -> Self::Service {
        AuthService { inner, name: self.name.clone(), value: self.value.clone() }
    }
}

/// Service produced by [`AuthLayer`].
#[derive(Clone, Debug)]
pub struct AuthService<S> {
    inner: S,
    name: HeaderName,
    value: HeaderValue,
}

impl<S> Service<HttpRequest> for AuthService<S>
where
    S: Service<HttpRequest, Response = HttpResponse, Error = Error>,
{
    type Response = HttpResponse;
    type Error = Error;
    type Future = S::Future;

    fn poll_ready(&mut self, cx: &mut Context<'_>) -> Poll<Result<(), Self::Error>> {
        self.inner.poll_ready(cx)
    }

    fn call(&mut self, mut req: HttpRequest) -> Self::Future {
        req.headers_mut().insert(self.name.clone(), self.value.clone());
        self.inner.call(req)
    }
}
