//! Path templating for low-cardinality metric labels.
//!
//! [`normalize_path`] turns a concrete request path into a template by collapsing identifier
//! segments:
//!
//! 1. UUID segments (8-4-4-4-12 hex) become `:id`.
//! 2. 24-hex-character document ids become `:id`.
//! 3. Numeric segments of five or more digits become `:id`; shorter ones (`v2`, `2024`) stay.
//! 4. The segment right after a literal `site` segment becomes `:site`.
//!
//! The function is pure and idempotent. [`PathTemplateCache`] memoizes it; the cache never
//! evicts because templated paths are low-cardinality by construction.
//!
//! ```rust
//! use restline::path::normalize_path;
//!
//! assert_eq!(
//!     normalize_path("/api/site/default/dns/record/507f1f77bcf86cd799439011"),
//!     "/api/site/:site/dns/record/:id"
//! );
//! ```

use dashmap::DashMap;
use once_cell::sync::Lazy;
use regex::Regex;
use std::sync::Arc;

static UUID_SEGMENT: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"^[0-9a-fA-F]{8}-[0-9a-fA-F]{4}-[0-9a-fA-F]{4}-[0-9a-fA-F]{4}-[0-9a-fA-F]{12}$")
        .expect("uuid pattern is valid")
});

static OBJECT_ID_SEGMENT: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"^[0-9a-fA-F]{24}$").expect("object id pattern is valid"));

static NUMERIC_SEGMENT: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"^[0-9]{5,}$").expect("numeric pattern is valid"));

static GLOBAL: Lazy<PathTemplateCache> = Lazy::new(PathTemplateCache::new);

/// Placeholder for identifier segments.
pub const ID_PLACEHOLDER: &str = ":id";
/// Placeholder for the segment following `site`.
pub const SITE_PLACEHOLDER: &str = ":site";

fn is_identifier(segment: &str) -> bool {
    UUID_SEGMENT.is_match(segment)
        || OBJECT_ID_SEGMENT.is_match(segment)
        || NUMERIC_SEGMENT.is_match(segment)
}

/// Convert a concrete path into its template.
pub fn normalize_path(path: &str) -> String {
    let mut out = String::with_capacity(path.len());
    let mut after_site = false;
    for (idx, segment) in path.split('/').enumerate() {
        if idx > 0 {
            out.push('/');
        }
        if after_site && !segment.is_empty() {
            // Matches are non-overlapping: the replaced segment never opens a new `site` match.
            out.push_str(SITE_PLACEHOLDER);
            after_site = false;
            continue;
        }
        if is_identifier(segment) {
            out.push_str(ID_PLACEHOLDER);
        } else {
            out.push_str(segment);
        }
        after_site = segment == "site";
    }
    out
}

/// Concurrent memo of raw path → template.
///
/// Hits return a clone of the stored `Arc<str>` without running any regex or allocating.
#[derive(Debug, Default)]
pub struct PathTemplateCache {
    entries: DashMap<Box<str>, Arc<str>>,
}

impl PathTemplateCache {
    pub fn new() -> Self {
        Self::default()
    }

    /// Template for `path`, computing and storing it on first sight.
    pub fn normalize(&self, path: &str) -> Arc<str> {
        if let Some(hit) = self.entries.get(path) {
            return Arc::clone(hit.value());
        }
        let template: Arc<str> = Arc::from(normalize_path(path));
        let entry = self.entries.entry(Box::from(path)).or_insert(template);
        Arc::clone(entry.value())
    }

    /// Number of distinct raw paths seen.
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

/// Process-wide cache shared by every interceptor that was not handed its own.
pub fn global() -> &'static PathTemplateCache {
    &GLOBAL
}

/// Normalize through the process-wide cache.
pub fn normalize_cached(path: &str) -> Arc<str> {
    GLOBAL.normalize(path)
}
