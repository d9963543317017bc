//! Object-store backend.
//!
//! Wraps any [`object_store::ObjectStore`] implementation (in-memory, local
//! directory, or S3-compatible with the `aws` feature). Object stores have
//! no real directories; listing synthesizes them from common key prefixes.

use std::path::Path as StdPath;
use std::sync::Arc;

use async_trait::async_trait;
use bytes::Bytes;
use futures::TryStreamExt;
use object_store::path::Path as ObjectPath;
use object_store::{ObjectMeta, ObjectStore, PutPayload};
use tracing::instrument;

use crate::backend::Backend;
use crate::error::{BackendError, BackendResult};
use crate::types::Entry;

pub struct ObjectBackend {
    store: Arc<dyn ObjectStore>,
    prefix: String,
}

impl ObjectBackend {
    /// Wrap an existing store, keying everything under `prefix`
    /// ("" = bucket root).
    pub fn new(store: Arc<dyn ObjectStore>, prefix: impl Into<String>) -> Self {
        let prefix = prefix.into().trim_matches('/').to_string();
        ObjectBackend { store, prefix }
    }

    /// Ephemeral store, mainly for tests and scratch mounts.
    pub fn in_memory() -> Self {
        Self::new(Arc::new(object_store::memory::InMemory::new()), "")
    }

    /// Store over a local directory.
    pub fn local(root: impl AsRef<StdPath>) -> BackendResult<Self> {
        let root = root.as_ref();
        if !root.exists() {
            std::fs::create_dir_all(root)?;
        }
        let store = object_store::local::LocalFileSystem::new_with_prefix(root)
            .map_err(|e| BackendError::Other(e.to_string()))?;
        Ok(Self::new(Arc::new(store), ""))
    }

    /// S3-compatible store.
    #[cfg(feature = "aws")]
    pub fn s3(
        bucket: &str,
        prefix: Option<&str>,
        region: Option<&str>,
        endpoint: Option<&str>,
        access_key_id: Option<&str>,
        secret_access_key: Option<&str>,
    ) -> BackendResult<Self> {
        let mut builder = object_store::aws::AmazonS3Builder::from_env().with_bucket_name(bucket);
        if let Some(region) = region {
            builder = builder.with_region(region);
        }
        if let Some(endpoint) = endpoint {
            builder = builder.with_endpoint(endpoint);
        }
        if let Some(key) = access_key_id {
            builder = builder.with_access_key_id(key);
        }
        if let Some(secret) = secret_access_key {
            builder = builder.with_secret_access_key(secret);
        }
        let store = builder
            .build()
            .map_err(|e| BackendError::Other(e.to_string()))?;
        Ok(Self::new(Arc::new(store), prefix.unwrap_or("")))
    }

    fn key(&self, path: &str) -> ObjectPath {
        let rel = path.trim_matches('/');
        if self.prefix.is_empty() {
            ObjectPath::from(rel)
        } else if rel.is_empty() {
            ObjectPath::from(self.prefix.as_str())
        } else {
            ObjectPath::from(format!("{}/{}", self.prefix, rel))
        }
    }

    /// Strip the store prefix back off a key, yielding a backend-relative
    /// path.
    fn rel(&self, key: &ObjectPath) -> String {
        let key = key.as_ref();
        if self.prefix.is_empty() {
            key.to_string()
        } else {
            key.strip_prefix(&self.prefix)
                .map(|rest| rest.trim_start_matches('/').to_string())
                .unwrap_or_else(|| key.to_string())
        }
    }

    fn file_entry(&self, meta: &ObjectMeta) -> Entry {
        let path = self.rel(&meta.location);
        let name = path.rsplit('/').next().unwrap_or(&path).to_string();
        Entry::file(path, name, meta.size, Some(meta.last_modified))
    }

    async fn get_bytes(&self, path: &str) -> BackendResult<Bytes> {
        let key = self.key(path);
        let result = self
            .store
            .get(&key)
            .await
            .map_err(|e| map_err(e, path))?;
        result.bytes().await.map_err(|e| map_err(e, path))
    }

    /// Whether any object lives under `path/`.
    async fn is_dir(&self, path: &str) -> BackendResult<bool> {
        let key = self.key(path);
        let listing = self
            .store
            .list_with_delimiter(Some(&key))
            .await
            .map_err(|e| map_err(e, path))?;
        Ok(!listing.objects.is_empty() || !listing.common_prefixes.is_empty())
    }
}

fn map_err(err: object_store::Error, path: &str) -> BackendError {
    match err {
        object_store::Error::NotFound { .. } => BackendError::NotFound(path.to_string()),
        other => BackendError::Other(other.to_string()),
    }
}

#[async_trait]
impl Backend for ObjectBackend {
    #[instrument(skip(self), fields(backend = "object", path = %path))]
    async fn read(&self, path: &str) -> BackendResult<Vec<u8>> {
        if path.trim_matches('/').is_empty() {
            return Err(BackendError::IsADirectory(path.to_string()));
        }
        match self.get_bytes(path).await {
            Ok(bytes) => Ok(bytes.to_vec()),
            Err(BackendError::NotFound(_)) if self.is_dir(path).await? => {
                Err(BackendError::IsADirectory(path.to_string()))
            }
            Err(err) => Err(err),
        }
    }

    #[instrument(skip(self, data), fields(backend = "object", path = %path, size = data.len()))]
    async fn write(&self, path: &str, data: &[u8]) -> BackendResult<()> {
        if path.trim_matches('/').is_empty() {
            return Err(BackendError::IsADirectory(path.to_string()));
        }
        let key = self.key(path);
        self.store
            .put(&key, PutPayload::from(data.to_vec()))
            .await
            .map_err(|e| map_err(e, path))?;
        Ok(())
    }

    #[instrument(skip(self, data), fields(backend = "object", path = %path, size = data.len()))]
    async fn append(&self, path: &str, data: &[u8]) -> BackendResult<()> {
        if path.trim_matches('/').is_empty() {
            return Err(BackendError::IsADirectory(path.to_string()));
        }
        // No native append on object stores: read-modify-write.
        let mut existing = match self.get_bytes(path).await {
            Ok(bytes) => bytes.to_vec(),
            Err(BackendError::NotFound(_)) => Vec::new(),
            Err(err) => return Err(err),
        };
        existing.extend_from_slice(data);
        self.write(path, &existing).await
    }

    #[instrument(skip(self), fields(backend = "object", path = %path))]
    async fn delete(&self, path: &str) -> BackendResult<()> {
        let key = self.key(path);
        match self.store.delete(&key).await {
            Ok(()) => Ok(()),
            Err(object_store::Error::NotFound { .. }) => {
                // Synthetic directory: delete every object below it.
                let keys: Vec<ObjectPath> = self
                    .store
                    .list(Some(&key))
                    .map_ok(|meta| meta.location)
                    .try_collect()
                    .await
                    .map_err(|e| map_err(e, path))?;
                if keys.is_empty() {
                    return Err(BackendError::NotFound(path.to_string()));
                }
                for k in keys {
                    self.store.delete(&k).await.map_err(|e| map_err(e, path))?;
                }
                Ok(())
            }
            Err(err) => Err(map_err(err, path)),
        }
    }

    #[instrument(skip(self), fields(backend = "object", path = %path))]
    async fn list(&self, path: &str) -> BackendResult<Vec<Entry>> {
        let rel = path.trim_matches('/');
        if !rel.is_empty() && self.store.head(&self.key(path)).await.is_ok() {
            return Err(BackendError::NotADirectory(path.to_string()));
        }

        let key = self.key(path);
        let listing = self
            .store
            .list_with_delimiter(if rel.is_empty() && self.prefix.is_empty() {
                None
            } else {
                Some(&key)
            })
            .await
            .map_err(|e| map_err(e, path))?;

        if !rel.is_empty() && listing.objects.is_empty() && listing.common_prefixes.is_empty() {
            return Err(BackendError::NotFound(path.to_string()));
        }

        let mut entries = Vec::new();
        for prefix in &listing.common_prefixes {
            let dir_path = self.rel(prefix);
            let name = dir_path.rsplit('/').next().unwrap_or(&dir_path).to_string();
            entries.push(Entry::dir(dir_path, name, None));
        }
        for meta in &listing.objects {
            entries.push(self.file_entry(meta));
        }

        entries.sort_by(|a, b| match (a.is_dir, b.is_dir) {
            (true, false) => std::cmp::Ordering::Less,
            (false, true) => std::cmp::Ordering::Greater,
            _ => a.name.cmp(&b.name),
        });
        Ok(entries)
    }

    #[instrument(skip(self), fields(backend = "object", path = %path))]
    async fn exists(&self, path: &str) -> BackendResult<bool> {
        let key = self.key(path);
        if path.trim_matches('/').is_empty() {
            return Ok(true);
        }
        match self.store.head(&key).await {
            Ok(_) => Ok(true),
            Err(object_store::Error::NotFound { .. }) => {
                Ok(self.is_dir(path).await.unwrap_or(false))
            }
            Err(_) => Ok(false),
        }
    }

    #[instrument(skip(self), fields(backend = "object", path = %path))]
    async fn stat(&self, path: &str) -> BackendResult<Entry> {
        if path.trim_matches('/').is_empty() {
            return Ok(Entry::dir("", "", None));
        }
        let key = self.key(path);
        match self.store.head(&key).await {
            Ok(meta) => Ok(self.file_entry(&meta)),
            Err(object_store::Error::NotFound { .. }) => {
                if self.is_dir(path).await? {
                    let rel = path.trim_matches('/').to_string();
                    let name = rel.rsplit('/').next().unwrap_or(&rel).to_string();
                    Ok(Entry::dir(rel, name, None))
                } else {
                    Err(BackendError::NotFound(path.to_string()))
                }
            }
            Err(err) => Err(map_err(err, path)),
        }
    }

    #[instrument(skip(self), fields(backend = "object", from = %from, to = %to))]
    async fn rename(&self, from: &str, to: &str) -> BackendResult<()> {
        let from_key = self.key(from);
        match self.store.rename(&from_key, &self.key(to)).await {
            Ok(()) => Ok(()),
            Err(object_store::Error::NotFound { .. }) => {
                // Synthetic directory: move every object below it.
                let keys: Vec<ObjectPath> = self
                    .store
                    .list(Some(&from_key))
                    .map_ok(|meta| meta.location)
                    .try_collect()
                    .await
                    .map_err(|e| map_err(e, from))?;
                if keys.is_empty() {
                    return Err(BackendError::NotFound(from.to_string()));
                }
                let from_prefix = format!("{}/", from_key.as_ref());
                let to_rel = to.trim_matches('/');
                for k in keys {
                    let rest = k.as_ref().strip_prefix(&from_prefix).unwrap_or(k.as_ref());
                    let dst = self.key(&format!("{to_rel}/{rest}"));
                    self.store
                        .rename(&k, &dst)
                        .await
                        .map_err(|e| map_err(e, from))?;
                }
                Ok(())
            }
            Err(err) => Err(map_err(err, from)),
        }
    }

    #[instrument(skip(self), fields(backend = "object", from = %from, to = %to))]
    async fn copy(&self, from: &str, to: &str) -> BackendResult<u64> {
        let meta = self
            .store
            .head(&self.key(from))
            .await
            .map_err(|e| map_err(e, from))?;
        self.store
            .copy(&self.key(from), &self.key(to))
            .await
            .map_err(|e| map_err(e, from))?;
        Ok(meta.size)
    }
}
