//! Lifecycle statistics types.

use std::sync::atomic::{AtomicU64, Ordering};
use std::time::{Duration, Instant};

use crate::manager::ResponseSource;

/// Statistics for a completed install.
#[derive(Debug, Clone)]
pub struct InstallStats {
    /// Name of the populated store.
    pub cache_name: String,
    /// Number of assets committed.
    pub assets: usize,
    /// Total body bytes committed.
    pub total_bytes: u64,
    /// Time taken to retrieve and commit every asset.
    pub elapsed: Duration,
}

impl InstallStats {
    /// Returns the average retrieval speed in bytes per second.
    #[must_use]
    #[allow(
        clippy::cast_precision_loss,
        clippy::cast_possible_truncation,
        clippy::cast_sign_loss
    )]
    pub fn average_speed(&self) -> u64 {
        let secs = self.elapsed.as_secs_f64();
        if secs > 0.0 {
            (self.total_bytes as f64 / secs) as u64
        } else {
            0
        }
    }
}

/// Builder for accumulating install statistics while assets arrive.
pub struct InstallStatsBuilder {
    cache_name: String,
    assets: usize,
    total_bytes: u64,
    start_time: Instant,
}

impl InstallStatsBuilder {
    /// Creates a new builder; the clock starts now.
    #[must_use]
    pub fn new(cache_name: &str) -> Self {
        Self {
            cache_name: cache_name.to_string(),
            assets: 0,
            total_bytes: 0,
            start_time: Instant::now(),
        }
    }

    /// Records one retrieved asset of the given size.
    pub const fn add_asset(&mut self, bytes: u64) {
        self.assets += 1;
        self.total_bytes += bytes;
    }

    /// Builds the final install statistics.
    #[must_use]
    pub fn build(self) -> InstallStats {
        InstallStats {
            cache_name: self.cache_name,
            assets: self.assets,
            total_bytes: self.total_bytes,
            elapsed: self.start_time.elapsed(),
        }
    }
}

/// Outcome of an activation.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ActivationStats {
    /// Stores that were deleted.
    pub deleted: Vec<String>,
    /// Stores whose deletion failed, with the error message.
    pub failed: Vec<(String, String)>,
}

impl ActivationStats {
    /// Returns true if every stale store was deleted.
    #[must_use]
    pub fn is_clean(&self) -> bool {
        self.failed.is_empty()
    }
}

/// Per-source response counters, shared between concurrent fetch handlers.
#[derive(Debug, Default)]
pub struct FetchCounters {
    cache: AtomicU64,
    network: AtomicU64,
    fallback: AtomicU64,
    offline: AtomicU64,
}

/// Point-in-time copy of [`FetchCounters`].
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct FetchSnapshot {
    /// Responses served from the store.
    pub cache: u64,
    /// Responses served from the network.
    pub network: u64,
    /// Offline fallbacks served.
    pub fallback: u64,
    /// Requests that could not be answered at all.
    pub offline: u64,
}

impl FetchSnapshot {
    /// Total requests handled.
    #[must_use]
    pub const fn total(&self) -> u64 {
        self.cache + self.network + self.fallback + self.offline
    }
}

impl FetchCounters {
    /// Creates zeroed counters.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Records a served response.
    pub fn record(&self, source: ResponseSource) {
        let counter = match source {
            ResponseSource::Cache => &self.cache,
            ResponseSource::Network => &self.network,
            ResponseSource::Fallback => &self.fallback,
        };
        counter.fetch_add(1, Ordering::Relaxed);
    }

    /// Records a request that failed with no fallback.
    pub fn record_offline(&self) {
        self.offline.fetch_add(1, Ordering::Relaxed);
    }

    /// Returns the current counts.
    #[must_use]
    pub fn snapshot(&self) -> FetchSnapshot {
        FetchSnapshot {
            cache: self.cache.load(Ordering::Relaxed),
            network: self.network.load(Ordering::Relaxed),
            fallback: self.fallback.load(Ordering::Relaxed),
            offline: self.offline.load(Ordering::Relaxed),
        }
    }
}
