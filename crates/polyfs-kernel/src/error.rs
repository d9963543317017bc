//! Error types for the VFS.
//!
//! Two layers: [`BackendError`] is what a storage backend reports about a
//! backend-relative path, and [`VfsError`] is what the facade surfaces about
//! a virtual path. Backend-native error types (io, HTTP, object-store) never
//! cross the facade; they are folded into these enums at the boundary.

use thiserror::Error;

/// Errors reported by a single backend about a backend-relative path.
#[derive(Debug, Error)]
#[non_exhaustive]
pub enum BackendError {
    /// The path does not exist.
    #[error("not found: {0}")]
    NotFound(String),

    /// A file operation was applied to a directory.
    #[error("is a directory: {0}")]
    IsADirectory(String),

    /// A directory operation was applied to a file.
    #[error("not a directory: {0}")]
    NotADirectory(String),

    /// The path would escape the backend root.
    #[error("path escapes backend root: {0}")]
    PathTraversal(String),

    /// The backend refused the operation.
    #[error("permission denied: {0}")]
    PermissionDenied(String),

    /// Underlying I/O failure.
    #[error("io error: {0}")]
    Io(#[from] std::io::Error),

    /// Anything else (network failures, protocol errors, ...).
    #[error("{0}")]
    Other(String),
}

impl BackendError {
    /// Map an io::Error against a known path, preserving not-found and
    /// permission failures as structured variants.
    pub fn from_io(err: std::io::Error, path: &str) -> Self {
        match err.kind() {
            std::io::ErrorKind::NotFound => BackendError::NotFound(path.to_string()),
            std::io::ErrorKind::PermissionDenied => {
                BackendError::PermissionDenied(path.to_string())
            }
            _ => BackendError::Io(err),
        }
    }
}

/// Errors surfaced by the VFS facade. Paths in these errors are always
/// virtual (mount-prefixed) paths, never backend-relative ones.
#[derive(Debug, Error)]
#[non_exhaustive]
pub enum VfsError {
    /// The path does not exist.
    #[error("not found: {0}")]
    NotFound(String),

    /// A file operation was applied to a directory.
    #[error("is a directory: {0}")]
    IsADirectory(String),

    /// A directory operation was applied to a file.
    #[error("not a directory: {0}")]
    NotADirectory(String),

    /// No mount prefix matches the path.
    #[error("no mount matches path: {0}")]
    NoMount(String),

    /// The mount is read-only.
    #[error("mount is read-only: {0}")]
    ReadOnly(String),

    /// The workspace descriptor is invalid.
    #[error("invalid config: {0}")]
    InvalidConfig(String),

    /// An unrecognized tool-manifest format token.
    #[error("invalid format: {0}")]
    InvalidFormat(String),

    /// File contents are not valid UTF-8.
    #[error("not valid utf-8: {0}")]
    NotUtf8(String),

    /// A cross-backend rename copied the data but failed to delete the
    /// source. Both paths may now hold the content.
    #[error("rename from '{from}' to '{to}' copied but failed to delete source: {source}")]
    PartialRename {
        from: String,
        to: String,
        source: BackendError,
    },

    /// A backend failed in a way with no structural mapping.
    #[error("backend error at '{path}': {source}")]
    Backend {
        path: String,
        source: BackendError,
    },
}

impl VfsError {
    /// Fold a backend error into a facade error against the virtual path
    /// the caller used.
    pub fn from_backend(err: BackendError, path: &str) -> Self {
        match err {
            BackendError::NotFound(_) => VfsError::NotFound(path.to_string()),
            BackendError::IsADirectory(_) => VfsError::IsADirectory(path.to_string()),
            BackendError::NotADirectory(_) => VfsError::NotADirectory(path.to_string()),
            other => VfsError::Backend {
                path: path.to_string(),
                source: other,
            },
        }
    }
}

impl From<polyfs_config::ConfigError> for VfsError {
    fn from(err: polyfs_config::ConfigError) -> Self {
        VfsError::InvalidConfig(err.to_string())
    }
}

/// Result alias for facade operations.
pub type VfsResult<T> = Result<T, VfsError>;

/// Result alias for backend operations.
pub type BackendResult<T> = Result<T, BackendError>;
