//! Core VFS types.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// A directory entry or stat result.
///
/// At the backend layer `path` is backend-relative; the facade rewrites it
/// to the virtual (mount-prefixed) path before returning entries to callers.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Entry {
    /// Full path of the entry.
    pub path: String,
    /// Final path segment.
    pub name: String,
    /// Whether the entry is a directory.
    pub is_dir: bool,
    /// Size in bytes. `None` for directories and backends without sizes.
    pub size: Option<u64>,
    /// Last modification time, when the backend tracks one.
    pub modified: Option<DateTime<Utc>>,
}

impl Entry {
    /// Create a file entry.
    pub fn file(
        path: impl Into<String>,
        name: impl Into<String>,
        size: u64,
        modified: Option<DateTime<Utc>>,
    ) -> Self {
        Self {
            path: path.into(),
            name: name.into(),
            is_dir: false,
            size: Some(size),
            modified,
        }
    }

    /// Create a directory entry.
    pub fn dir(
        path: impl Into<String>,
        name: impl Into<String>,
        modified: Option<DateTime<Utc>>,
    ) -> Self {
        Self {
            path: path.into(),
            name: name.into(),
            is_dir: true,
            size: None,
            modified,
        }
    }
}

/// A single line matched by [`Vfs::grep`](crate::Vfs::grep).
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct GrepMatch {
    /// Virtual path of the file containing the match.
    pub path: String,
    /// 1-based line number.
    pub line_number: usize,
    /// The matching line, without its trailing newline.
    pub line: String,
}

/// Options for [`Vfs::grep_with_options`](crate::Vfs::grep_with_options).
#[derive(Debug, Clone)]
pub struct GrepOptions {
    /// Descend into subdirectories.
    pub recursive: bool,
    /// Stop after this many matches.
    pub max_matches: usize,
    /// Maximum recursion depth below the starting directory.
    pub max_depth: usize,
}

impl Default for GrepOptions {
    fn default() -> Self {
        Self {
            recursive: false,
            max_matches: 1000,
            max_depth: 10,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn constructors() {
        let f = Entry::file("docs/a.txt", "a.txt", 12, None);
        assert!(!f.is_dir);
        assert_eq!(f.size, Some(12));

        let d = Entry::dir("docs", "docs", None);
        assert!(d.is_dir);
        assert_eq!(d.size, None);
    }
}
