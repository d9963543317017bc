//! Local filesystem backend.

use std::path::{Component, Path, PathBuf};

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use tokio::fs;
use tokio::io::AsyncWriteExt;
use tracing::{debug, instrument};

use crate::backend::Backend;
use crate::error::{BackendError, BackendResult};
use crate::types::Entry;

/// Backend over a directory of the local filesystem.
///
/// All paths resolve strictly under `root`; `..` segments and symlinks that
/// point outside the root are rejected. Deleting a directory removes its
/// whole subtree.
pub struct LocalBackend {
    root: PathBuf,
}

impl LocalBackend {
    /// Create a backend rooted at `root`, creating the directory if needed.
    pub fn new(root: impl AsRef<Path>) -> BackendResult<Self> {
        let root = root.as_ref();
        if !root.exists() {
            std::fs::create_dir_all(root)?;
        }
        let root = root.canonicalize()?;
        Ok(LocalBackend { root })
    }

    /// Resolve a backend-relative path to an absolute one, refusing anything
    /// that would land outside the root.
    fn resolve(&self, path: &str) -> BackendResult<PathBuf> {
        let trimmed = path.trim_matches('/');
        let rel = Path::new(trimmed);

        for component in rel.components() {
            match component {
                Component::ParentDir | Component::RootDir | Component::Prefix(_) => {
                    return Err(BackendError::PathTraversal(trimmed.to_string()));
                }
                _ => {}
            }
        }

        let full = self.root.join(rel);

        // Symlinks inside the tree can still escape; canonicalize the
        // nearest existing ancestor and check it stays under root.
        let mut ancestor = full.as_path();
        while !ancestor.exists() {
            match ancestor.parent() {
                Some(parent) => ancestor = parent,
                None => break,
            }
        }
        let canonical = ancestor.canonicalize()?;
        if !canonical.starts_with(&self.root) {
            return Err(BackendError::PathTraversal(trimmed.to_string()));
        }

        Ok(full)
    }
}

fn modified_of(metadata: &std::fs::Metadata) -> Option<DateTime<Utc>> {
    metadata.modified().ok().map(DateTime::<Utc>::from)
}

#[async_trait]
impl Backend for LocalBackend {
    #[instrument(skip(self), fields(backend = "fs", path = %path))]
    async fn read(&self, path: &str) -> BackendResult<Vec<u8>> {
        let full = self.resolve(path)?;
        if full.is_dir() {
            return Err(BackendError::IsADirectory(path.to_string()));
        }
        fs::read(&full)
            .await
            .map_err(|e| BackendError::from_io(e, path))
    }

    #[instrument(skip(self, data), fields(backend = "fs", path = %path, size = data.len()))]
    async fn write(&self, path: &str, data: &[u8]) -> BackendResult<()> {
        let full = self.resolve(path)?;
        if full.is_dir() {
            return Err(BackendError::IsADirectory(path.to_string()));
        }
        if let Some(parent) = full.parent() {
            fs::create_dir_all(parent).await?;
        }
        debug!(full = ?full, "writing file");
        Ok(fs::write(&full, data).await?)
    }

    #[instrument(skip(self, data), fields(backend = "fs", path = %path, size = data.len()))]
    async fn append(&self, path: &str, data: &[u8]) -> BackendResult<()> {
        let full = self.resolve(path)?;
        if full.is_dir() {
            return Err(BackendError::IsADirectory(path.to_string()));
        }
        if let Some(parent) = full.parent() {
            fs::create_dir_all(parent).await?;
        }
        let mut file = fs::OpenOptions::new()
            .create(true)
            .append(true)
            .open(&full)
            .await?;
        file.write_all(data).await?;
        file.flush().await?;
        Ok(())
    }

    #[instrument(skip(self), fields(backend = "fs", path = %path))]
    async fn delete(&self, path: &str) -> BackendResult<()> {
        let full = self.resolve(path)?;
        if full.is_dir() {
            Ok(fs::remove_dir_all(&full).await?)
        } else {
            fs::remove_file(&full)
                .await
                .map_err(|e| BackendError::from_io(e, path))
        }
    }

    #[instrument(skip(self), fields(backend = "fs", path = %path))]
    async fn list(&self, path: &str) -> BackendResult<Vec<Entry>> {
        let full = self.resolve(path)?;

        if !full.exists() {
            return Err(BackendError::NotFound(path.to_string()));
        }
        if !full.is_dir() {
            return Err(BackendError::NotADirectory(path.to_string()));
        }

        let mut entries = Vec::new();
        let mut read_dir = fs::read_dir(&full).await?;
        while let Some(item) = read_dir.next_entry().await? {
            let metadata = item.metadata().await?;
            let name = item.file_name().to_string_lossy().to_string();
            let entry_path = join_rel(path, &name);
            if metadata.is_dir() {
                entries.push(Entry::dir(entry_path, name, modified_of(&metadata)));
            } else {
                entries.push(Entry::file(
                    entry_path,
                    name,
                    metadata.len(),
                    modified_of(&metadata),
                ));
            }
        }

        entries.sort_by(|a, b| match (a.is_dir, b.is_dir) {
            (true, false) => std::cmp::Ordering::Less,
            (false, true) => std::cmp::Ordering::Greater,
            _ => a.name.cmp(&b.name),
        });

        Ok(entries)
    }

    #[instrument(skip(self), fields(backend = "fs", path = %path))]
    async fn exists(&self, path: &str) -> BackendResult<bool> {
        match self.resolve(path) {
            Ok(full) => Ok(full.exists()),
            Err(_) => Ok(false),
        }
    }

    #[instrument(skip(self), fields(backend = "fs", path = %path))]
    async fn stat(&self, path: &str) -> BackendResult<Entry> {
        let full = self.resolve(path)?;
        let metadata = fs::metadata(&full)
            .await
            .map_err(|e| BackendError::from_io(e, path))?;

        let name = full
            .file_name()
            .map(|n| n.to_string_lossy().to_string())
            .unwrap_or_default();
        let modified = modified_of(&metadata);

        if metadata.is_dir() {
            Ok(Entry::dir(path.to_string(), name, modified))
        } else {
            Ok(Entry::file(path.to_string(), name, metadata.len(), modified))
        }
    }

    #[instrument(skip(self), fields(backend = "fs", from = %from, to = %to))]
    async fn rename(&self, from: &str, to: &str) -> BackendResult<()> {
        let from_path = self.resolve(from)?;
        let to_path = self.resolve(to)?;
        if let Some(parent) = to_path.parent() {
            fs::create_dir_all(parent).await?;
        }
        fs::rename(&from_path, &to_path)
            .await
            .map_err(|e| BackendError::from_io(e, from))
    }

    #[instrument(skip(self), fields(backend = "fs", from = %from, to = %to))]
    async fn copy(&self, from: &str, to: &str) -> BackendResult<u64> {
        let from_path = self.resolve(from)?;
        let to_path = self.resolve(to)?;
        if from_path.is_dir() {
            return Err(BackendError::IsADirectory(from.to_string()));
        }
        if let Some(parent) = to_path.parent() {
            fs::create_dir_all(parent).await?;
        }
        fs::copy(&from_path, &to_path)
            .await
            .map_err(|e| BackendError::from_io(e, from))
    }
}

/// Join a backend-relative directory path with a child name.
fn join_rel(dir: &str, name: &str) -> String {
    let dir = dir.trim_matches('/');
    if dir.is_empty() {
        name.to_string()
    } else {
        format!("{dir}/{name}")
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    async fn setup() -> (LocalBackend, TempDir) {
        let dir = TempDir::new().unwrap();
        let backend = LocalBackend::new(dir.path()).unwrap();
        (backend, dir)
    }

    #[tokio::test]
    async fn write_read_roundtrip() {
        let (backend, _dir) = setup().await;
        backend.write("test.txt", b"hello world").await.unwrap();
        assert_eq!(backend.read("test.txt").await.unwrap(), b"hello world");
    }

    #[tokio::test]
    async fn write_creates_ancestors() {
        let (backend, _dir) = setup().await;
        backend.write("a/b/c/deep.txt", b"x").await.unwrap();
        assert!(backend.exists("a/b/c/deep.txt").await.unwrap());
        assert!(backend.stat("a/b").await.unwrap().is_dir);
    }

    #[tokio::test]
    async fn append_creates_missing_file() {
        let (backend, _dir) = setup().await;
        backend.append("log.txt", b"one\n").await.unwrap();
        backend.append("log.txt", b"two\n").await.unwrap();
        assert_eq!(backend.read("log.txt").await.unwrap(), b"one\ntwo\n");
    }

    #[tokio::test]
    async fn read_missing_is_not_found() {
        let (backend, _dir) = setup().await;
        let err = backend.read("missing.txt").await.unwrap_err();
        assert!(matches!(err, BackendError::NotFound(_)));
    }

    #[tokio::test]
    async fn read_directory_is_rejected() {
        let (backend, _dir) = setup().await;
        backend.write("docs/a.txt", b"x").await.unwrap();
        let err = backend.read("docs").await.unwrap_err();
        assert!(matches!(err, BackendError::IsADirectory(_)));
    }

    #[tokio::test]
    async fn traversal_is_rejected() {
        let (backend, _dir) = setup().await;
        let err = backend.read("../etc/passwd").await.unwrap_err();
        assert!(matches!(err, BackendError::PathTraversal(_)));
        // exists() maps the same failure to false.
        assert!(!backend.exists("../etc/passwd").await.unwrap());
    }

    #[cfg(unix)]
    #[tokio::test]
    async fn symlink_escape_is_rejected() {
        let (backend, dir) = setup().await;
        let outside = TempDir::new().unwrap();
        std::fs::write(outside.path().join("secret.txt"), b"s").unwrap();
        std::os::unix::fs::symlink(outside.path(), dir.path().join("link")).unwrap();
        let err = backend.read("link/secret.txt").await.unwrap_err();
        assert!(matches!(err, BackendError::PathTraversal(_)));
    }

    #[tokio::test]
    async fn list_sorts_dirs_first() {
        let (backend, _dir) = setup().await;
        backend.write("b.txt", b"1").await.unwrap();
        backend.write("a.txt", b"2").await.unwrap();
        backend.write("sub/c.txt", b"3").await.unwrap();

        let entries = backend.list("").await.unwrap();
        let names: Vec<_> = entries.iter().map(|e| e.name.as_str()).collect();
        assert_eq!(names, vec!["sub", "a.txt", "b.txt"]);
        assert_eq!(entries[1].path, "a.txt");
        assert_eq!(entries[1].size, Some(2));
    }

    #[tokio::test]
    async fn list_file_is_not_a_directory() {
        let (backend, _dir) = setup().await;
        backend.write("f.txt", b"x").await.unwrap();
        let err = backend.list("f.txt").await.unwrap_err();
        assert!(matches!(err, BackendError::NotADirectory(_)));
    }

    #[tokio::test]
    async fn delete_directory_removes_subtree() {
        let (backend, _dir) = setup().await;
        backend.write("docs/a.txt", b"1").await.unwrap();
        backend.write("docs/sub/b.txt", b"2").await.unwrap();
        backend.delete("docs").await.unwrap();
        assert!(!backend.exists("docs").await.unwrap());
        assert!(!backend.exists("docs/sub/b.txt").await.unwrap());
    }

    #[tokio::test]
    async fn rename_moves_file() {
        let (backend, _dir) = setup().await;
        backend.write("old.txt", b"data").await.unwrap();
        backend.rename("old.txt", "sub/new.txt").await.unwrap();
        assert!(!backend.exists("old.txt").await.unwrap());
        assert_eq!(backend.read("sub/new.txt").await.unwrap(), b"data");
    }

    #[tokio::test]
    async fn copy_returns_byte_count() {
        let (backend, _dir) = setup().await;
        backend.write("src.txt", b"12345678").await.unwrap();
        let n = backend.copy("src.txt", "dst.txt").await.unwrap();
        assert_eq!(n, 8);
        assert!(backend.exists("src.txt").await.unwrap());
        assert_eq!(backend.read("dst.txt").await.unwrap(), b"12345678");
    }

    #[tokio::test]
    async fn stat_reports_size() {
        let (backend, _dir) = setup().await;
        backend.write("f.txt", b"12345678").await.unwrap();
        let entry = backend.stat("f.txt").await.unwrap();
        assert!(!entry.is_dir);
        assert_eq!(entry.size, Some(8));
        assert!(entry.modified.is_some());
    }
}
