use super::TokenBucket;
use crate::transport::HttpRequest;
use std::borrow::Cow;
use std::fmt;
use std::sync::Arc;

/// Label used when a single bucket guards every request.
pub const DEFAULT_LABEL: &str = "default";

/// Bucket chosen for one request, with the label reported in logs and metrics.
///
/// A `None` limiter means the request bypasses rate limiting.
#[derive(Debug, Clone)]
pub struct Selection {
    pub limiter: Option<Arc<TokenBucket>>,
    pub label: Cow<'static, str>,
}

impl Selection {
    pub fn new(limiter: Option<Arc<TokenBucket>>, label: impl Into<Cow<'static, str>>) -> Self {
        Self { limiter, label: label.into() }
    }

    /// Skip rate limiting for this request.
    pub fn bypass(label: impl Into<Cow<'static, str>>) -> Self {
        Self::new(None, label)
    }
}

/// Maps a request to the bucket that governs it.
pub trait LimiterSelector: Send + Sync {
    fn select(&self, req: &HttpRequest) -> Selection;
}

impl<F> LimiterSelector for F
where
    F: Fn(&HttpRequest) -> Selection + Send + Sync,
{
    fn select(&self, req: &HttpRequest) -> Selection {
        self(req)
    }
}

/// Selector that classifies requests by URL path prefix.
///
/// Routes are checked in registration order and the first matching prefix wins; requests
/// matching no route use the fallback selection.
#[derive(Clone)]
pub struct PathPrefixSelector {
    routes: Vec<(String, Selection)>,
    fallback: Selection,
}

impl fmt::Debug for PathPrefixSelector {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let prefixes: Vec<_> = self.routes.iter().map(|(p, s)| (p.as_str(), &s.label)).collect();
        f.debug_struct("PathPrefixSelector")
            .field("routes", &prefixes)
            .field("fallback", &self.fallback.label)
            .finish()
    }
}

impl PathPrefixSelector {
    /// Selector whose fallback is `limiter` under `label`.
    pub fn new(limiter: Option<Arc<TokenBucket>>, label: impl Into<Cow<'static, str>>) -> Self {
        Self { routes: Vec::new(), fallback: Selection::new(limiter, label) }
    }

    /// Send paths starting with `prefix` to `limiter`.
    #[must_use]
    pub fn route(
        mut self,
        prefix: impl Into<String>,
        limiter: Option<Arc<TokenBucket>>,
        label: impl Into<Cow<'static, str>>,
    ) -> Self {
        self.routes.push((prefix.into(), Selection::new(limiter, label)));
        self
    }
}

impl LimiterSelector for PathPrefixSelector {
    fn select(&self, req: &HttpRequest) -> Selection {
        let path = req.uri().path();
        self.routes
            .iter()
            .find(|(prefix, _)| path.starts_with(prefix.as_str()))
            .map_or_else(|| self.fallback.clone(), |(_, selection)| selection.clone())
    }
}
