//! clarity-cache - An offline asset cache for the Wiki Clarity web page.
//!
//! The library precaches a fixed set of static assets into a named store,
//! deletes stores left behind by older versions, and answers resource
//! requests cache-first with a network fallback and a cached offline
//! document, independent of any particular host or transport.
//!
//! # Example
//!
//! ```no_run
//! use clarity_cache::{AssetCacheManager, DiskStorage, HttpNetwork, NetworkConfig, Request};
//!
//! # async fn example() -> clarity_cache::Result<()> {
//! let storage = DiskStorage::new("/var/cache/clarity-cache/stores");
//! let network = HttpNetwork::new(&NetworkConfig::default())?;
//! let manager = AssetCacheManager::new(storage, network);
//!
//! // Lifecycle: install, then activate, then serve requests
//! manager.install().await?;
//! manager.activate().await?;
//!
//! let served = manager.handle_fetch(&Request::get("/static/app.js")).await?;
//! println!("{} via {}", served.response.status, served.source);
//! # Ok(())
//! # }
//! ```

#![warn(clippy::pedantic)]
#![warn(clippy::nursery)]

pub mod cli;
pub mod config;
pub mod error;
pub mod format;
pub mod manager;
pub mod network;
pub mod request;
#[cfg(feature = "server")]
pub mod server;
pub mod stats;
pub mod store;

// Re-export main types for convenience
pub use config::{
    AppConfig, CACHE_NAME, CacheConfig, DEFAULT_ORIGIN, NetworkConfig, OFFLINE_FALLBACK,
    PRECACHE_ASSETS, PathConfig, ServerConfig,
};
pub use error::{Error, Result};
pub use format::{format_bytes, format_duration};
pub use manager::{AssetCacheManager, ResponseSource, Served};
pub use network::{HttpNetwork, Network};
pub use request::{Request, RequestKey, Response};
pub use stats::{ActivationStats, FetchCounters, FetchSnapshot, InstallStats};
pub use store::{CacheStorage, DiskStorage, MemoryStorage};
