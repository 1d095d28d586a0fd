//! Named cache store abstraction.
//!
//! A [`CacheStorage`] holds any number of named stores, each mapping a
//! [`RequestKey`] to a [`Response`]. The manager only ever talks to storage
//! through this trait so it can run against [`MemoryStorage`] in tests and
//! [`DiskStorage`] in the host binary.

mod disk;
mod memory;

use async_trait::async_trait;

use crate::error::{Error, Result};
use crate::request::{Request, RequestKey, Response};

pub use disk::DiskStorage;
pub use memory::MemoryStorage;

/// Abstraction over a set of named request → response stores.
#[async_trait]
pub trait CacheStorage: Send + Sync {
    /// Opens the named store, creating it empty if it does not exist.
    async fn open(&self, name: &str) -> Result<()>;

    /// Returns true if a store with this name exists.
    async fn has(&self, name: &str) -> Result<bool>;

    /// Returns the names of all existing stores.
    async fn keys(&self) -> Result<Vec<String>>;

    /// Deletes the named store. Returns false if it did not exist.
    async fn delete(&self, name: &str) -> Result<bool>;

    /// Writes every entry into the named store as one atomic commit.
    ///
    /// Either all entries become visible or, on error, none do. Existing
    /// entries with the same key are replaced. The store is created if absent.
    async fn put_all(&self, name: &str, entries: Vec<(Request, Response)>) -> Result<()>;

    /// Looks up a request in the named store.
    ///
    /// Returns `None` when the store or the entry is absent, and for any
    /// request that is not cacheable.
    async fn match_request(&self, name: &str, request: &Request) -> Result<Option<Response>>;

    /// Returns the keys of every entry in the named store.
    async fn entries(&self, name: &str) -> Result<Vec<RequestKey>>;
}

/// Rejects entries that can never be matched, before anything is written.
fn validate_entries(entries: &[(Request, Response)]) -> Result<()> {
    if let Some((request, _)) = entries.iter().find(|(r, _)| !r.is_cacheable()) {
        return Err(Error::Store(format!(
            "cannot store {} request for {}",
            request.method, request.url
        )));
    }
    Ok(())
}
