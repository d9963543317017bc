//! Mount table: routes virtual paths to backends by longest prefix.

use std::sync::Arc;

use crate::backend::Backend;
use crate::error::{VfsError, VfsResult};

/// A virtual path prefix bound to a backend.
pub struct Mount {
    /// Normalized mount prefix (`/` or `/x/y`).
    pub path: String,
    pub backend: Arc<dyn Backend>,
    /// Backend-relative root the mount is anchored at ("" = backend root).
    pub backend_root: String,
    pub read_only: bool,
}

impl std::fmt::Debug for Mount {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Mount")
            .field("path", &self.path)
            .field("backend_root", &self.backend_root)
            .field("read_only", &self.read_only)
            .finish_non_exhaustive()
    }
}

impl Mount {
    pub fn new(path: &str, backend: Arc<dyn Backend>) -> Self {
        Mount {
            path: normalize_path(path),
            backend,
            backend_root: String::new(),
            read_only: false,
        }
    }

    pub fn with_root(mut self, root: impl Into<String>) -> Self {
        self.backend_root = root.into().trim_matches('/').to_string();
        self
    }

    pub fn read_only(mut self, read_only: bool) -> Self {
        self.read_only = read_only;
        self
    }
}

/// Immutable routing table. Mounts are sorted by descending prefix length
/// at construction so lookup is a linear scan that stops at the most
/// specific match.
pub struct MountTable {
    mounts: Vec<Mount>,
}

impl MountTable {
    pub fn new(mut mounts: Vec<Mount>) -> Self {
        mounts.sort_by(|a, b| b.path.len().cmp(&a.path.len()));
        MountTable { mounts }
    }

    /// Resolve a virtual path to its mount and backend-relative path.
    ///
    /// A mount prefix only matches on a segment boundary: `/workspace`
    /// matches `/workspace/a.txt` but never `/workspace2/a.txt`.
    pub fn resolve(&self, path: &str) -> VfsResult<(&Mount, String)> {
        let normalized = normalize_path(path);

        for mount in &self.mounts {
            let remainder = if normalized == mount.path {
                ""
            } else if mount.path == "/" {
                normalized.trim_start_matches('/')
            } else if let Some(rest) = normalized.strip_prefix(&mount.path) {
                match rest.strip_prefix('/') {
                    Some(rest) => rest,
                    None => continue,
                }
            } else {
                continue;
            };

            let rel = if mount.backend_root.is_empty() {
                remainder.to_string()
            } else if remainder.is_empty() {
                mount.backend_root.clone()
            } else {
                format!("{}/{remainder}", mount.backend_root)
            };
            return Ok((mount, rel));
        }

        Err(VfsError::NoMount(normalized))
    }

    pub fn iter(&self) -> impl Iterator<Item = &Mount> {
        self.mounts.iter()
    }
}

/// Normalize a virtual path: ensure a leading `/`, collapse duplicate
/// separators, and strip a trailing `/` (except for the root itself).
/// Idempotent.
pub fn normalize_path(path: &str) -> String {
    let mut out = String::with_capacity(path.len() + 1);
    out.push('/');
    for segment in path.split('/') {
        if segment.is_empty() {
            continue;
        }
        if !out.ends_with('/') {
            out.push('/');
        }
        out.push_str(segment);
    }
    out
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::backends::MemoryBackend;

    fn mem() -> Arc<dyn Backend> {
        Arc::new(MemoryBackend::new())
    }

    #[test]
    fn normalization() {
        assert_eq!(normalize_path("workspace/a.txt"), "/workspace/a.txt");
        assert_eq!(normalize_path("/a//b///c"), "/a/b/c");
        assert_eq!(normalize_path("/a/b/"), "/a/b");
        assert_eq!(normalize_path("/"), "/");
        assert_eq!(normalize_path(""), "/");
    }

    #[test]
    fn normalization_is_idempotent() {
        for raw in ["/a//b/", "x/y", "//", "/workspace/notes.txt"] {
            let once = normalize_path(raw);
            assert_eq!(normalize_path(&once), once);
        }
    }

    #[test]
    fn longest_prefix_wins() {
        let table = MountTable::new(vec![
            Mount::new("/workspace", mem()),
            Mount::new("/workspace/cache", mem()),
        ]);

        let (mount, rel) = table.resolve("/workspace/cache/x.bin").unwrap();
        assert_eq!(mount.path, "/workspace/cache");
        assert_eq!(rel, "x.bin");

        let (mount, rel) = table.resolve("/workspace/notes.txt").unwrap();
        assert_eq!(mount.path, "/workspace");
        assert_eq!(rel, "notes.txt");
    }

    #[test]
    fn prefix_match_respects_segment_boundaries() {
        let table = MountTable::new(vec![Mount::new("/workspace", mem())]);
        assert!(matches!(
            table.resolve("/workspace2/file.txt").unwrap_err(),
            VfsError::NoMount(_)
        ));
        // The mount point itself resolves to the backend root.
        let (_, rel) = table.resolve("/workspace").unwrap();
        assert_eq!(rel, "");
    }

    #[test]
    fn root_mount_matches_everything() {
        let table = MountTable::new(vec![
            Mount::new("/", mem()),
            Mount::new("/special", mem()),
        ]);

        let (mount, rel) = table.resolve("/anything/goes.txt").unwrap();
        assert_eq!(mount.path, "/");
        assert_eq!(rel, "anything/goes.txt");

        let (mount, _) = table.resolve("/special/x").unwrap();
        assert_eq!(mount.path, "/special");
    }

    #[test]
    fn backend_root_is_joined() {
        let table =
            MountTable::new(vec![Mount::new("/docs", mem()).with_root("shared/docs")]);
        let (_, rel) = table.resolve("/docs/guide.md").unwrap();
        assert_eq!(rel, "shared/docs/guide.md");
        let (_, rel) = table.resolve("/docs").unwrap();
        assert_eq!(rel, "shared/docs");
    }

    #[test]
    fn unnormalized_input_resolves() {
        let table = MountTable::new(vec![Mount::new("/workspace", mem())]);
        let (_, rel) = table.resolve("workspace//a/b.txt/").unwrap();
        assert_eq!(rel, "a/b.txt");
    }

    #[test]
    fn no_mount_is_an_error() {
        let table = MountTable::new(vec![Mount::new("/data", mem())]);
        let err = table.resolve("/elsewhere/f.txt").unwrap_err();
        assert!(matches!(err, VfsError::NoMount(ref p) if p == "/elsewhere/f.txt"));
    }
}
