//! In-process cache storage.

use std::collections::HashMap;
use std::sync::{Mutex, MutexGuard, PoisonError};

use async_trait::async_trait;

use super::{CacheStorage, validate_entries};
use crate::error::Result;
use crate::request::{Request, RequestKey, Response};

type Store = HashMap<RequestKey, Response>;

/// Cache storage held entirely in memory.
///
/// Every operation takes a single lock, so a `put_all` is observed either
/// completely or not at all by concurrent readers.
#[derive(Debug, Default)]
pub struct MemoryStorage {
    stores: Mutex<HashMap<String, Store>>,
}

impl MemoryStorage {
    /// Creates an empty storage.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    fn stores(&self) -> MutexGuard<'_, HashMap<String, Store>> {
        self.stores.lock().unwrap_or_else(PoisonError::into_inner)
    }
}

#[async_trait]
impl CacheStorage for MemoryStorage {
    async fn open(&self, name: &str) -> Result<()> {
        self.stores().entry(name.to_string()).or_default();
        Ok(())
    }

    async fn has(&self, name: &str) -> Result<bool> {
        Ok(self.stores().contains_key(name))
    }

    async fn keys(&self) -> Result<Vec<String>> {
        let mut names: Vec<String> = self.stores().keys().cloned().collect();
        names.sort();
        Ok(names)
    }

    async fn delete(&self, name: &str) -> Result<bool> {
        Ok(self.stores().remove(name).is_some())
    }

    async fn put_all(&self, name: &str, entries: Vec<(Request, Response)>) -> Result<()> {
        validate_entries(&entries)?;
        let mut stores = self.stores();
        let store = stores.entry(name.to_string()).or_default();
        for (request, response) in entries {
            store.insert(request.key(), response);
        }
        Ok(())
    }

    async fn match_request(&self, name: &str, request: &Request) -> Result<Option<Response>> {
        if !request.is_cacheable() {
            return Ok(None);
        }
        Ok(self
            .stores()
            .get(name)
            .and_then(|store| store.get(&request.key()))
            .cloned())
    }

    async fn entries(&self, name: &str) -> Result<Vec<RequestKey>> {
        let mut keys: Vec<RequestKey> = self
            .stores()
            .get(name)
            .map(|store| store.keys().cloned().collect())
            .unwrap_or_default();
        keys.sort();
        Ok(keys)
    }
}
