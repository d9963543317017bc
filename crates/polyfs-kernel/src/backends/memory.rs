//! In-memory backend.

use std::collections::HashMap;
use std::sync::RwLock;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use tracing::instrument;

use crate::backend::Backend;
use crate::error::{BackendError, BackendResult};
use crate::types::Entry;

/// Ephemeral backend backed by a flat path → bytes map.
///
/// Directories are implicit: `a/b` is a directory whenever some key starts
/// with `a/b/`. Useful for scratch mounts and tests.
pub struct MemoryBackend {
    files: RwLock<HashMap<String, (Vec<u8>, DateTime<Utc>)>>,
}

impl MemoryBackend {
    pub fn new() -> Self {
        MemoryBackend {
            files: RwLock::new(HashMap::new()),
        }
    }
}

impl Default for MemoryBackend {
    fn default() -> Self {
        Self::new()
    }
}

/// Strip leading and trailing slashes; keys are stored bare.
fn normalize(path: &str) -> String {
    path.trim_matches('/').to_string()
}

fn dir_prefix(normalized: &str) -> String {
    format!("{normalized}/")
}

#[async_trait]
impl Backend for MemoryBackend {
    #[instrument(skip(self), fields(backend = "memory", path = %path))]
    async fn read(&self, path: &str) -> BackendResult<Vec<u8>> {
        let files = self.files.read().unwrap_or_else(|e| e.into_inner());
        let key = normalize(path);
        if key.is_empty() {
            return Err(BackendError::IsADirectory(path.to_string()));
        }
        if let Some((data, _)) = files.get(&key) {
            return Ok(data.clone());
        }
        let prefix = dir_prefix(&key);
        if files.keys().any(|k| k.starts_with(&prefix)) {
            return Err(BackendError::IsADirectory(path.to_string()));
        }
        Err(BackendError::NotFound(path.to_string()))
    }

    #[instrument(skip(self, data), fields(backend = "memory", path = %path, size = data.len()))]
    async fn write(&self, path: &str, data: &[u8]) -> BackendResult<()> {
        let mut files = self.files.write().unwrap_or_else(|e| e.into_inner());
        let key = normalize(path);
        let prefix = dir_prefix(&key);
        if key.is_empty() || files.keys().any(|k| k.starts_with(&prefix)) {
            return Err(BackendError::IsADirectory(path.to_string()));
        }
        files.insert(key, (data.to_vec(), Utc::now()));
        Ok(())
    }

    #[instrument(skip(self, data), fields(backend = "memory", path = %path, size = data.len()))]
    async fn append(&self, path: &str, data: &[u8]) -> BackendResult<()> {
        let mut files = self.files.write().unwrap_or_else(|e| e.into_inner());
        let key = normalize(path);
        let prefix = dir_prefix(&key);
        if key.is_empty() || files.keys().any(|k| k.starts_with(&prefix)) {
            return Err(BackendError::IsADirectory(path.to_string()));
        }
        let entry = files.entry(key).or_insert_with(|| (Vec::new(), Utc::now()));
        entry.0.extend_from_slice(data);
        entry.1 = Utc::now();
        Ok(())
    }

    #[instrument(skip(self), fields(backend = "memory", path = %path))]
    async fn delete(&self, path: &str) -> BackendResult<()> {
        let mut files = self.files.write().unwrap_or_else(|e| e.into_inner());
        let key = normalize(path);
        if files.remove(&key).is_some() {
            return Ok(());
        }
        // Implicit directory: drop the whole subtree.
        let prefix = dir_prefix(&key);
        let subtree: Vec<String> = files
            .keys()
            .filter(|k| k.starts_with(&prefix))
            .cloned()
            .collect();
        if subtree.is_empty() {
            return Err(BackendError::NotFound(path.to_string()));
        }
        for k in subtree {
            files.remove(&k);
        }
        Ok(())
    }

    #[instrument(skip(self), fields(backend = "memory", path = %path))]
    async fn list(&self, path: &str) -> BackendResult<Vec<Entry>> {
        let files = self.files.read().unwrap_or_else(|e| e.into_inner());
        let key = normalize(path);
        let prefix = if key.is_empty() {
            String::new()
        } else {
            if files.contains_key(&key) {
                return Err(BackendError::NotADirectory(path.to_string()));
            }
            dir_prefix(&key)
        };

        let mut children: HashMap<String, Entry> = HashMap::new();
        for (file_path, (data, mtime)) in files.iter() {
            let relative = match file_path.strip_prefix(&prefix) {
                Some(rest) if !rest.is_empty() => rest,
                _ => continue,
            };
            let first = match relative.split('/').next() {
                Some(first) => first,
                None => continue,
            };
            let child_path = format!("{prefix}{first}");
            if relative.contains('/') {
                children
                    .entry(first.to_string())
                    .or_insert_with(|| Entry::dir(child_path, first.to_string(), None));
            } else {
                children.insert(
                    first.to_string(),
                    Entry::file(child_path, first.to_string(), data.len() as u64, Some(*mtime)),
                );
            }
        }

        if !key.is_empty() && children.is_empty() {
            return Err(BackendError::NotFound(path.to_string()));
        }

        let mut entries: Vec<_> = children.into_values().collect();
        entries.sort_by(|a, b| match (a.is_dir, b.is_dir) {
            (true, false) => std::cmp::Ordering::Less,
            (false, true) => std::cmp::Ordering::Greater,
            _ => a.name.cmp(&b.name),
        });
        Ok(entries)
    }

    #[instrument(skip(self), fields(backend = "memory", path = %path))]
    async fn exists(&self, path: &str) -> BackendResult<bool> {
        let files = self.files.read().unwrap_or_else(|e| e.into_inner());
        let key = normalize(path);
        if key.is_empty() || files.contains_key(&key) {
            return Ok(true);
        }
        let prefix = dir_prefix(&key);
        Ok(files.keys().any(|k| k.starts_with(&prefix)))
    }

    #[instrument(skip(self), fields(backend = "memory", path = %path))]
    async fn stat(&self, path: &str) -> BackendResult<Entry> {
        let files = self.files.read().unwrap_or_else(|e| e.into_inner());
        let key = normalize(path);

        // The backend root is always a directory.
        if key.is_empty() {
            return Ok(Entry::dir("", "", None));
        }

        if let Some((data, mtime)) = files.get(&key) {
            let name = key.rsplit('/').next().unwrap_or(&key).to_string();
            return Ok(Entry::file(key.clone(), name, data.len() as u64, Some(*mtime)));
        }

        let prefix = dir_prefix(&key);
        if files.keys().any(|k| k.starts_with(&prefix)) {
            let name = key.rsplit('/').next().unwrap_or(&key).to_string();
            return Ok(Entry::dir(key, name, None));
        }

        Err(BackendError::NotFound(path.to_string()))
    }

    #[instrument(skip(self), fields(backend = "memory", from = %from, to = %to))]
    async fn rename(&self, from: &str, to: &str) -> BackendResult<()> {
        let mut files = self.files.write().unwrap_or_else(|e| e.into_inner());
        let from_key = normalize(from);
        let to_key = normalize(to);
        if let Some(entry) = files.remove(&from_key) {
            files.insert(to_key, entry);
            return Ok(());
        }
        // Implicit directory: move the whole subtree under the new prefix.
        let prefix = dir_prefix(&from_key);
        let subtree: Vec<String> = files
            .keys()
            .filter(|k| k.starts_with(&prefix))
            .cloned()
            .collect();
        if subtree.is_empty() {
            return Err(BackendError::NotFound(from.to_string()));
        }
        for k in subtree {
            if let Some(entry) = files.remove(&k) {
                let moved = format!("{to_key}/{}", &k[prefix.len()..]);
                files.insert(moved, entry);
            }
        }
        Ok(())
    }
}
