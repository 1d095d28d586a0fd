//! Live network access for cache misses and precaching.

use std::time::Duration;

use async_trait::async_trait;

use crate::config::NetworkConfig;
use crate::error::{Error, Result};
use crate::request::{Request, Response};

/// Abstraction over the live network.
///
/// Implementations return `Ok` for any HTTP response, including error
/// statuses, and `Err` only when no response could be obtained at all.
#[async_trait]
pub trait Network: Send + Sync {
    /// Performs the request against the network.
    async fn fetch(&self, request: &Request) -> Result<Response>;
}

/// Network implementation backed by `reqwest`.
#[derive(Debug, Clone)]
pub struct HttpNetwork {
    client: reqwest::Client,
    origin: String,
}

/// Builds a configured HTTP client for origin requests.
fn build_http_client(timeout: Duration) -> reqwest::Result<reqwest::Client> {
    reqwest::Client::builder()
        .pool_idle_timeout(Duration::from_secs(60))
        .pool_max_idle_per_host(8)
        .tcp_keepalive(Duration::from_secs(30))
        .timeout(timeout)
        .build()
}

impl HttpNetwork {
    /// Creates a network client for the configured origin.
    ///
    /// # Errors
    ///
    /// Returns an error if the HTTP client cannot be built.
    pub fn new(config: &NetworkConfig) -> Result<Self> {
        Ok(Self::with_client(
            build_http_client(config.timeout())?,
            &config.origin,
        ))
    }

    /// Creates a network using an existing client.
    #[must_use]
    pub fn with_client(client: reqwest::Client, origin: &str) -> Self {
        Self {
            client,
            origin: origin.trim_end_matches('/').to_string(),
        }
    }

    /// Returns the origin that relative URLs are resolved against.
    #[must_use]
    pub fn origin(&self) -> &str {
        &self.origin
    }

    /// Resolves a request URL to an absolute URL.
    #[must_use]
    pub fn resolve(&self, url: &str) -> String {
        if url.starts_with("http://") || url.starts_with("https://") {
            url.to_string()
        } else if url.starts_with('/') {
            format!("{}{url}", self.origin)
        } else {
            format!("{}/{url}", self.origin)
        }
    }
}

#[async_trait]
impl Network for HttpNetwork {
    async fn fetch(&self, request: &Request) -> Result<Response> {
        let url = self.resolve(&request.url);
        let method = reqwest::Method::from_bytes(request.method.as_bytes()).map_err(|e| {
            Error::Network {
                url: url.clone(),
                reason: e.to_string(),
            }
        })?;

        let network_error = |e: reqwest::Error| Error::Network {
            url: url.clone(),
            reason: e.to_string(),
        };

        let resp = self
            .client
            .request(method, &url)
            .send()
            .await
            .map_err(network_error)?;

        let status = resp.status().as_u16();
        let headers = resp
            .headers()
            .iter()
            .filter_map(|(k, v)| v.to_str().ok().map(|v| (k.as_str().to_string(), v.to_string())))
            .collect();
        let body = resp.bytes().await.map_err(network_error)?;

        log::debug!("{} {url} -> {status} ({} bytes)", request.method, body.len());

        Ok(Response {
            status,
            headers,
            body,
        })
    }
}
