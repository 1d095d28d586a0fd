//! Configuration for the cache manager and the host binary.
//!
//! The cache version name and the precache manifest are compiled in: bumping
//! [`CACHE_NAME`] is how a deploy invalidates every previously cached asset.
//! Only host-side settings (origin, store location, listen address) are read
//! from the config file.

use std::path::{Path, PathBuf};
use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::error::{Error, Result};

/// Name of the current cache store.
pub const CACHE_NAME: &str = "wiki-clarity-v1";

/// Assets stored during install, in order.
pub const PRECACHE_ASSETS: [&str; 5] = [
    "/",
    "/static/css/style.css",
    "/static/app.js",
    "/static/assets/icon-192.png",
    "/static/assets/icon-512.png",
];

/// Document served when a request misses the cache and the network is down.
pub const OFFLINE_FALLBACK: &str = "/";

/// Origin the site is served from unless configured otherwise.
pub const DEFAULT_ORIGIN: &str = "http://127.0.0.1:5000";

/// Cache manager settings: which store to own and what to put in it.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CacheConfig {
    /// Name of the store owned by this version.
    pub cache_name: String,
    /// URLs stored during install.
    pub assets: Vec<String>,
    /// URL served from the store when the network fails.
    pub fallback_url: String,
    /// Origin whose absolute URLs share entries with their relative paths.
    pub origin: String,
}

impl Default for CacheConfig {
    fn default() -> Self {
        Self {
            cache_name: CACHE_NAME.to_string(),
            assets: PRECACHE_ASSETS.iter().map(ToString::to_string).collect(),
            fallback_url: OFFLINE_FALLBACK.to_string(),
            origin: DEFAULT_ORIGIN.to_string(),
        }
    }
}

impl CacheConfig {
    /// Creates a new configuration with the compiled-in values.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Sets the store name.
    #[must_use]
    pub fn with_cache_name(mut self, name: impl Into<String>) -> Self {
        self.cache_name = name.into();
        self
    }

    /// Replaces the precache asset list.
    #[must_use]
    pub fn with_assets<I, S>(mut self, assets: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.assets = assets.into_iter().map(Into::into).collect();
        self
    }

    /// Sets the offline fallback URL.
    #[must_use]
    pub fn with_fallback_url(mut self, url: impl Into<String>) -> Self {
        self.fallback_url = url.into();
        self
    }

    /// Sets the origin that absolute request URLs are made relative to.
    #[must_use]
    pub fn with_origin(mut self, origin: impl Into<String>) -> Self {
        self.origin = origin.into();
        self
    }
}

/// Network settings for live fetches.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct NetworkConfig {
    /// Origin that relative request URLs are resolved against.
    pub origin: String,
    /// Per-request timeout in seconds.
    pub timeout_secs: u64,
}

impl Default for NetworkConfig {
    fn default() -> Self {
        Self {
            origin: DEFAULT_ORIGIN.to_string(),
            timeout_secs: 30,
        }
    }
}

impl NetworkConfig {
    /// Returns the request timeout.
    #[must_use]
    pub const fn timeout(&self) -> Duration {
        Duration::from_secs(self.timeout_secs)
    }
}

/// Path configuration for persistent cache stores.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct PathConfig {
    /// Directory holding one file per cache store.
    pub store_dir: PathBuf,
}

impl Default for PathConfig {
    fn default() -> Self {
        Self {
            store_dir: default_store_dir(),
        }
    }
}

/// Returns the default store directory.
///
/// Uses `$CACHE_DIRECTORY/stores` (set by systemd when `CacheDirectory=` is
/// configured), falling back to `$XDG_CACHE_HOME/clarity-cache/stores` for
/// interactive use.
#[must_use]
pub fn default_store_dir() -> PathBuf {
    if let Ok(dir) = std::env::var("CACHE_DIRECTORY") {
        PathBuf::from(dir).join("stores")
    } else {
        dirs::cache_dir()
            .unwrap_or_else(|| PathBuf::from("."))
            .join("clarity-cache")
            .join("stores")
    }
}

/// HTTP server configuration for `serve` mode.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct ServerConfig {
    /// Bind address.
    pub host: String,
    /// Bind port.
    pub port: u16,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            host: "127.0.0.1".to_string(),
            port: 9724,
        }
    }
}

/// Complete application configuration as stored in `config.toml`.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct AppConfig {
    /// Network configuration.
    pub network: NetworkConfig,
    /// Path configuration.
    pub paths: PathConfig,
    /// Server configuration.
    pub server: ServerConfig,
}

impl AppConfig {
    /// Returns the default config file location.
    #[must_use]
    pub fn default_path() -> PathBuf {
        dirs::config_dir()
            .unwrap_or_else(|| PathBuf::from("."))
            .join("clarity-cache")
            .join("config.toml")
    }

    /// Loads configuration from a TOML file.
    ///
    /// # Errors
    ///
    /// Returns an error if the file cannot be read or parsed.
    pub fn load(path: &Path) -> Result<Self> {
        let contents = std::fs::read_to_string(path)?;
        toml::from_str(&contents)
            .map_err(|e| Error::Config(format!("{}: {e}", path.display())))
    }

    /// Loads configuration, writing a default file first if none exists.
    ///
    /// # Errors
    ///
    /// Returns an error if the file cannot be created, read or parsed.
    pub fn load_or_create(path: &Path) -> Result<Self> {
        if !path.exists() {
            let config = Self::default();
            config.save(path)?;
            log::info!("Wrote default config to {}", path.display());
            return Ok(config);
        }
        Self::load(path)
    }

    /// Saves the configuration atomically (write tmp + rename).
    ///
    /// # Errors
    ///
    /// Returns an error if the directory cannot be created or the file
    /// cannot be written.
    pub fn save(&self, path: &Path) -> Result<()> {
        if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
            std::fs::create_dir_all(parent)?;
        }
        let toml_str = toml::to_string(self).map_err(|e| Error::Config(e.to_string()))?;
        let tmp_path = path.with_extension("toml.tmp");
        std::fs::write(&tmp_path, toml_str)?;
        std::fs::rename(&tmp_path, path)?;
        Ok(())
    }
}
