//! File-backed cache storage: one JSON file per named store.

use std::path::{Path, PathBuf};

use async_trait::async_trait;
use base64::Engine;
use base64::engine::general_purpose::STANDARD as BASE64;
use bytes::Bytes;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};
use tokio::sync::Mutex;

use super::{CacheStorage, validate_entries};
use crate::error::{Error, Result};
use crate::request::{Request, RequestKey, Response};

/// On-disk representation of one store.
#[derive(Debug, Default, Serialize, Deserialize)]
struct StoreFile {
    name: String,
    entries: Vec<StoredEntry>,
}

/// Just enough of a store file to enumerate names.
#[derive(Deserialize)]
struct StoreHeader {
    name: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
struct StoredEntry {
    method: String,
    url: String,
    status: u16,
    headers: Vec<(String, String)>,
    /// Base64 of the response body.
    body: String,
    stored_at: DateTime<Utc>,
}

impl StoredEntry {
    fn new(key: RequestKey, response: &Response) -> Self {
        Self {
            method: key.method,
            url: key.url,
            status: response.status,
            headers: response.headers.clone(),
            body: BASE64.encode(&response.body),
            stored_at: Utc::now(),
        }
    }

    fn key(&self) -> RequestKey {
        RequestKey::new(&self.method, &self.url)
    }

    fn to_response(&self) -> Result<Response> {
        let body = BASE64
            .decode(&self.body)
            .map_err(|e| Error::Store(format!("corrupt body for {}: {e}", self.url)))?;
        Ok(Response {
            status: self.status,
            headers: self.headers.clone(),
            body: Bytes::from(body),
        })
    }
}

/// Cache storage persisted under a directory.
///
/// Store files are named by the SHA-256 of the store name, so any name is
/// safe on disk; the real name is kept inside the file. Writes go to a
/// `.tmp` sibling and are renamed into place, which makes every commit
/// atomic for readers.
#[derive(Debug)]
pub struct DiskStorage {
    dir: PathBuf,
    write_lock: Mutex<()>,
}

impl DiskStorage {
    /// Creates a storage rooted at `dir`. The directory is created lazily.
    #[must_use]
    pub fn new(dir: impl Into<PathBuf>) -> Self {
        Self {
            dir: dir.into(),
            write_lock: Mutex::new(()),
        }
    }

    /// Returns the directory holding the store files.
    #[must_use]
    pub fn dir(&self) -> &Path {
        &self.dir
    }

    fn store_path(&self, name: &str) -> PathBuf {
        let digest = Sha256::digest(name.as_bytes());
        let hex: String = digest.iter().map(|b| format!("{b:02x}")).collect();
        self.dir.join(format!("{hex}.json"))
    }

    async fn read_store(&self, name: &str) -> Result<Option<StoreFile>> {
        let path = self.store_path(name);
        match tokio::fs::read(&path).await {
            Ok(raw) => serde_json::from_slice(&raw)
                .map(Some)
                .map_err(|e| Error::Store(format!("{}: {e}", path.display()))),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(None),
            Err(e) => Err(Error::Io(e)),
        }
    }

    async fn write_store(&self, file: &StoreFile) -> Result<()> {
        tokio::fs::create_dir_all(&self.dir).await?;
        let path = self.store_path(&file.name);
        let tmp_path = path.with_extension("json.tmp");
        let json = serde_json::to_vec(file).map_err(|e| Error::Store(e.to_string()))?;
        tokio::fs::write(&tmp_path, json).await?;
        tokio::fs::rename(&tmp_path, &path).await?;
        Ok(())
    }
}

#[async_trait]
impl CacheStorage for DiskStorage {
    async fn open(&self, name: &str) -> Result<()> {
        let _guard = self.write_lock.lock().await;
        if self.read_store(name).await?.is_none() {
            self.write_store(&StoreFile {
                name: name.to_string(),
                entries: Vec::new(),
            })
            .await?;
            log::debug!("Created cache store {name}");
        }
        Ok(())
    }

    async fn has(&self, name: &str) -> Result<bool> {
        match tokio::fs::metadata(self.store_path(name)).await {
            Ok(_) => Ok(true),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(false),
            Err(e) => Err(Error::Io(e)),
        }
    }

    async fn keys(&self) -> Result<Vec<String>> {
        let mut read_dir = match tokio::fs::read_dir(&self.dir).await {
            Ok(rd) => rd,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(Vec::new()),
            Err(e) => return Err(Error::Io(e)),
        };

        let mut names = Vec::new();
        while let Some(entry) = read_dir.next_entry().await? {
            let path = entry.path();
            if !path.extension().is_some_and(|ext| ext == "json") {
                continue;
            }
            let parsed = tokio::fs::read(&path)
                .await
                .map_err(|e| e.to_string())
                .and_then(|raw| {
                    serde_json::from_slice::<StoreHeader>(&raw).map_err(|e| e.to_string())
                });
            match parsed {
                Ok(header) => names.push(header.name),
                Err(e) => log::warn!("Skipping unreadable store file {}: {e}", path.display()),
            }
        }
        names.sort();
        Ok(names)
    }

    async fn delete(&self, name: &str) -> Result<bool> {
        let _guard = self.write_lock.lock().await;
        match tokio::fs::remove_file(self.store_path(name)).await {
            Ok(()) => Ok(true),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(false),
            Err(e) => Err(Error::Io(e)),
        }
    }

    async fn put_all(&self, name: &str, entries: Vec<(Request, Response)>) -> Result<()> {
        validate_entries(&entries)?;
        let _guard = self.write_lock.lock().await;

        let mut file = self.read_store(name).await?.unwrap_or_else(|| StoreFile {
            name: name.to_string(),
            entries: Vec::new(),
        });

        for (request, response) in &entries {
            let entry = StoredEntry::new(request.key(), response);
            let key = entry.key();
            if let Some(existing) = file.entries.iter_mut().find(|e| e.key() == key) {
                *existing = entry;
            } else {
                file.entries.push(entry);
            }
        }

        self.write_store(&file).await
    }

    async fn match_request(&self, name: &str, request: &Request) -> Result<Option<Response>> {
        if !request.is_cacheable() {
            return Ok(None);
        }
        let Some(file) = self.read_store(name).await? else {
            return Ok(None);
        };
        let key = request.key();
        file.entries
            .iter()
            .find(|e| e.key() == key)
            .map(StoredEntry::to_response)
            .transpose()
    }

    async fn entries(&self, name: &str) -> Result<Vec<RequestKey>> {
        let mut keys: Vec<RequestKey> = self
            .read_store(name)
            .await?
            .map(|file| file.entries.iter().map(StoredEntry::key).collect())
            .unwrap_or_default();
        keys.sort();
        Ok(keys)
    }
}
