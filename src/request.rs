//! Request and response types exchanged between the cache, the network and the host.

use bytes::Bytes;
use serde::{Deserialize, Serialize};

/// An intercepted resource request.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Request {
    /// HTTP method, uppercased.
    pub method: String,
    /// Absolute URL or origin-relative path (e.g. `/static/app.js`).
    pub url: String,
}

impl Request {
    /// Creates a request with the given method and URL.
    #[must_use]
    pub fn new(method: &str, url: impl Into<String>) -> Self {
        Self {
            method: method.to_ascii_uppercase(),
            url: url.into(),
        }
    }

    /// Creates a `GET` request for the given URL.
    #[must_use]
    pub fn get(url: impl Into<String>) -> Self {
        Self::new("GET", url)
    }

    /// Returns true if this request may be answered from a cache store.
    ///
    /// Stores only ever hold `GET` responses, so other methods always miss.
    #[must_use]
    pub fn is_cacheable(&self) -> bool {
        self.method == "GET"
    }

    /// Rewrites a URL on `origin` to its origin-relative path.
    ///
    /// `http://127.0.0.1:5000/static/app.js` against `http://127.0.0.1:5000`
    /// becomes `/static/app.js`. Relative URLs and URLs on other origins are
    /// returned unchanged.
    #[must_use]
    pub fn relative_to(&self, origin: &str) -> Self {
        let origin = origin.trim_end_matches('/');
        let rest = self
            .url
            .get(..origin.len())
            .filter(|head| !origin.is_empty() && head.eq_ignore_ascii_case(origin))
            .map(|_| &self.url[origin.len()..]);

        let url = match rest {
            Some("") => "/".to_string(),
            Some(rest) if rest.starts_with('/') => rest.to_string(),
            Some(rest) if rest.starts_with(['?', '#']) => format!("/{rest}"),
            _ => return self.clone(),
        };
        Self {
            method: self.method.clone(),
            url,
        }
    }

    /// Returns the identity this request is stored and matched under.
    #[must_use]
    pub fn key(&self) -> RequestKey {
        RequestKey::new(&self.method, &self.url)
    }
}

/// Identity of a request inside a store: method plus URL without fragment.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct RequestKey {
    /// HTTP method, uppercased.
    pub method: String,
    /// URL with any `#fragment` removed.
    pub url: String,
}

impl RequestKey {
    /// Builds a normalized key.
    #[must_use]
    pub fn new(method: &str, url: &str) -> Self {
        let url = url.split_once('#').map_or(url, |(base, _)| base);
        Self {
            method: method.to_ascii_uppercase(),
            url: url.to_string(),
        }
    }
}

/// A response as produced by the network or held in a store.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Response {
    /// HTTP status code.
    pub status: u16,
    /// Response headers in the order received.
    pub headers: Vec<(String, String)>,
    /// Response body.
    pub body: Bytes,
}

impl Response {
    /// Creates a response with no headers.
    #[must_use]
    pub fn new(status: u16, body: impl Into<Bytes>) -> Self {
        Self {
            status,
            headers: Vec::new(),
            body: body.into(),
        }
    }

    /// Adds a header.
    #[must_use]
    pub fn with_header(mut self, name: impl Into<String>, value: impl Into<String>) -> Self {
        self.headers.push((name.into(), value.into()));
        self
    }

    /// Returns true for a 2xx status.
    #[must_use]
    pub const fn is_ok(&self) -> bool {
        self.status >= 200 && self.status <= 299
    }

    /// Looks up a header value, case-insensitively.
    #[must_use]
    pub fn header(&self, name: &str) -> Option<&str> {
        self.headers
            .iter()
            .find(|(k, _)| k.eq_ignore_ascii_case(name))
            .map(|(_, v)| v.as_str())
    }

    /// Returns the body length in bytes.
    #[must_use]
    pub fn len(&self) -> u64 {
        self.body.len() as u64
    }

    /// Returns true if the body is empty.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.body.is_empty()
    }
}
