//! The storage backend contract.

use async_trait::async_trait;

use crate::error::BackendResult;
use crate::types::Entry;

/// Uniform contract every storage backend implements.
///
/// Paths are backend-relative, `/`-separated, with no leading slash
/// required; backends normalize internally. Semantics all implementations
/// must honor:
///
/// - `write` creates missing ancestor directories.
/// - `append` creates the file when it does not exist.
/// - `exists` maps any unresolvable path to `Ok(false)` instead of failing.
/// - `read`/`stat`/`delete` on a missing path report
///   [`BackendError::NotFound`](crate::BackendError::NotFound).
///
/// `rename` and `copy` have provided read-then-write defaults; backends with
/// a native primitive override them.
#[async_trait]
pub trait Backend: Send + Sync + 'static {
    /// Read the full contents of a file.
    async fn read(&self, path: &str) -> BackendResult<Vec<u8>>;

    /// Write a file, replacing any existing contents and creating missing
    /// ancestor directories.
    async fn write(&self, path: &str, data: &[u8]) -> BackendResult<()>;

    /// Append to a file, creating it if absent.
    async fn append(&self, path: &str, data: &[u8]) -> BackendResult<()>;

    /// Delete a file, or a directory and everything under it.
    async fn delete(&self, path: &str) -> BackendResult<()>;

    /// List the direct children of a directory.
    async fn list(&self, path: &str) -> BackendResult<Vec<Entry>>;

    /// Whether a file or directory exists at the path.
    async fn exists(&self, path: &str) -> BackendResult<bool>;

    /// Metadata for a single path.
    async fn stat(&self, path: &str) -> BackendResult<Entry>;

    /// Move a file within this backend.
    async fn rename(&self, from: &str, to: &str) -> BackendResult<()> {
        let data = self.read(from).await?;
        self.write(to, &data).await?;
        self.delete(from).await
    }

    /// Copy a file within this backend, returning the number of bytes
    /// copied.
    async fn copy(&self, from: &str, to: &str) -> BackendResult<u64> {
        let data = self.read(from).await?;
        let n = data.len() as u64;
        self.write(to, &data).await?;
        Ok(n)
    }
}
