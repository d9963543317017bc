//! Line-oriented content search over the VFS.
//!
//! Patterns are literal substrings, matched case-sensitively. The pattern
//! is escaped and compiled once per search, so matching a file is a single
//! regex scan per line. The walk is best-effort: unreadable or
//! non-UTF-8 files are skipped and never abort the search.

use regex::Regex;
use tracing::{debug, instrument};

use crate::error::{VfsError, VfsResult};
use crate::types::{GrepMatch, GrepOptions};
use crate::vfs::Vfs;

impl Vfs {
    /// Search a file or directory for lines containing `pattern`.
    ///
    /// If `path` names a file only that file is searched. If it names a
    /// directory, its direct children are searched, or the whole subtree
    /// when `recursive` is set. Line numbers are 1-based.
    #[instrument(skip(self))]
    pub async fn grep(
        &self,
        pattern: &str,
        path: &str,
        recursive: bool,
    ) -> VfsResult<Vec<GrepMatch>> {
        let options = GrepOptions {
            recursive,
            ..GrepOptions::default()
        };
        self.grep_with_options(pattern, path, &options).await
    }

    /// [`grep`](Self::grep) with explicit match and depth limits.
    pub async fn grep_with_options(
        &self,
        pattern: &str,
        path: &str,
        options: &GrepOptions,
    ) -> VfsResult<Vec<GrepMatch>> {
        let matcher = Regex::new(&regex::escape(pattern))
            .map_err(|e| VfsError::InvalidFormat(format!("bad search pattern: {e}")))?;

        let mut matches = Vec::new();

        // A file target is searched directly; anything else must list.
        let target = self.stat(path).await?;
        if !target.is_dir {
            scan_file(self, &target.path, &matcher, options, &mut matches).await;
            return Ok(matches);
        }

        grep_dir(self, &target.path, &matcher, options, 0, &mut matches).await?;
        Ok(matches)
    }
}

async fn grep_dir(
    vfs: &Vfs,
    dir: &str,
    matcher: &Regex,
    options: &GrepOptions,
    depth: usize,
    matches: &mut Vec<GrepMatch>,
) -> VfsResult<()> {
    // Only the root listing is a hard error; failures below it are skipped.
    let entries = match vfs.list(dir).await {
        Ok(entries) => entries,
        Err(err) if depth == 0 => return Err(err),
        Err(err) => {
            debug!(dir = %dir, error = %err, "skipping unlistable directory");
            return Ok(());
        }
    };

    for entry in entries {
        if matches.len() >= options.max_matches {
            return Ok(());
        }
        if entry.is_dir {
            if options.recursive && depth < options.max_depth {
                Box::pin(grep_dir(
                    vfs,
                    &entry.path,
                    matcher,
                    options,
                    depth + 1,
                    matches,
                ))
                .await?;
            }
        } else {
            scan_file(vfs, &entry.path, matcher, options, matches).await;
        }
    }
    Ok(())
}

async fn scan_file(
    vfs: &Vfs,
    path: &str,
    matcher: &Regex,
    options: &GrepOptions,
    matches: &mut Vec<GrepMatch>,
) {
    // Binary or unreadable content is silently skipped.
    let text = match vfs.read_text(path).await {
        Ok(text) => text,
        Err(err) => {
            debug!(path = %path, error = %err, "skipping unsearchable file");
            return;
        }
    };

    for (index, line) in text.lines().enumerate() {
        if matches.len() >= options.max_matches {
            return;
        }
        if matcher.is_match(line) {
            matches.push(GrepMatch {
                path: path.to_string(),
                line_number: index + 1,
                line: line.to_string(),
            });
        }
    }
}
