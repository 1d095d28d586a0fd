//! Error types for the clarity-cache library.

use thiserror::Error;

/// Errors that can occur while installing, activating or serving from the cache.
#[derive(Error, Debug)]
pub enum Error {
    /// I/O error during store file operations.
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// HTTP client error outside of a single request (e.g. client construction).
    #[error("HTTP error: {0}")]
    Http(#[from] reqwest::Error),

    /// The network could not be reached for a request.
    #[error("Network error for {url}: {reason}")]
    Network {
        /// URL that was being fetched.
        url: String,
        /// Transport-level failure description.
        reason: String,
    },

    /// A precache asset could not be retrieved during install.
    #[error("Asset unreachable during install: {url} ({reason})")]
    AssetUnreachable {
        /// URL of the asset.
        url: String,
        /// Transport-level failure description.
        reason: String,
    },

    /// A precache asset answered with a non-ok HTTP status during install.
    #[error("Asset {url} returned HTTP {status} during install")]
    AssetStatus {
        /// URL of the asset.
        url: String,
        /// HTTP status code returned.
        status: u16,
    },

    /// Neither the cache, the network, nor the offline fallback could answer.
    #[error("Offline and no cached response for {url}")]
    Offline {
        /// URL of the request that could not be served.
        url: String,
    },

    /// Cache store backend failure.
    #[error("Cache store error: {0}")]
    Store(String),

    /// Command-line arguments could not be parsed.
    #[error("{0}")]
    Usage(String),

    /// Configuration could not be loaded or parsed.
    #[error("Configuration error: {0}")]
    Config(String),
}

impl Error {
    /// Returns true if this error is the unrecovered offline case.
    #[must_use]
    pub const fn is_offline(&self) -> bool {
        matches!(self, Self::Offline { .. })
    }
}

/// A specialized `Result` type for clarity-cache operations.
pub type Result<T> = std::result::Result<T, Error>;
