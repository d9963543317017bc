//! The VFS facade.
//!
//! Every public operation follows the same shape: normalize the virtual
//! path, resolve it through the mount table, dispatch to the owning
//! backend, and fold any backend error into a [`VfsError`] carrying the
//! virtual path the caller used. Paths in results are always virtual too.

use std::collections::HashMap;
use std::fmt;
use std::sync::Arc;

use tracing::{debug, instrument, warn};

use polyfs_config::{BackendConfig, WorkspaceConfig};

use crate::backend::Backend;
use crate::backends::{ChromaBackend, LocalBackend, MemoryBackend, QueryHit};
use crate::error::{VfsError, VfsResult};
use crate::mount::{Mount, MountTable, normalize_path};
use crate::types::Entry;

/// A named workspace: a mount table plus the operations agents call.
///
/// `Vfs` is `Send + Sync` and internally immutable after construction;
/// concurrent operations on different mounts never contend on a shared
/// lock.
pub struct Vfs {
    name: String,
    mount_paths: Vec<String>,
    table: MountTable,
    search_mounts: Vec<(String, Arc<ChromaBackend>)>,
}

impl Vfs {
    /// Assemble a workspace from explicit mounts. Mainly for tests and
    /// embedding; descriptors go through [`Vfs::from_config`].
    pub fn new(name: impl Into<String>, mounts: Vec<Mount>) -> Self {
        let mount_paths = mounts.iter().map(|m| m.path.clone()).collect();
        Vfs {
            name: name.into(),
            mount_paths,
            table: MountTable::new(mounts),
            search_mounts: Vec::new(),
        }
    }

    /// Build a workspace from a descriptor.
    ///
    /// Validation runs first; no backend is constructed for an invalid
    /// descriptor. Backends are instantiated once per id and shared
    /// between mounts that reference the same id.
    pub async fn from_config(config: WorkspaceConfig) -> VfsResult<Self> {
        config.validate_or_err()?;

        let mut built: HashMap<String, Arc<dyn Backend>> = HashMap::new();
        let mut chroma_handles: HashMap<String, Arc<ChromaBackend>> = HashMap::new();
        let mut mounts = Vec::with_capacity(config.mounts.len());
        let mut search_mounts = Vec::new();
        let mut mount_paths = Vec::with_capacity(config.mounts.len());

        for mount_cfg in &config.mounts {
            let id = &mount_cfg.backend;
            if !built.contains_key(id) {
                // validate_or_err guarantees the id is declared.
                let Some(backend_cfg) = config.backends.get(id) else {
                    return Err(VfsError::InvalidConfig(format!(
                        "backend '{id}' is not declared"
                    )));
                };
                let backend = build_backend(id, backend_cfg, &mut chroma_handles).await?;
                built.insert(id.clone(), backend);
            }
            let backend = Arc::clone(&built[id]);

            let mount = Mount::new(&mount_cfg.path, backend)
                .with_root(&mount_cfg.root)
                .read_only(mount_cfg.read_only);
            debug!(
                mount = %mount.path,
                backend = %id,
                read_only = mount.read_only,
                "mounting backend"
            );
            mount_paths.push(mount.path.clone());
            if let Some(handle) = chroma_handles.get(id) {
                search_mounts.push((mount.path.clone(), Arc::clone(handle)));
            }
            mounts.push(mount);
        }

        Ok(Vfs {
            name: config.name,
            mount_paths,
            table: MountTable::new(mounts),
            search_mounts,
        })
    }

    /// Workspace name.
    pub fn name(&self) -> &str {
        &self.name
    }

    /// Mount prefixes in declaration order.
    pub fn mounts(&self) -> Vec<String> {
        self.mount_paths.clone()
    }

    /// Whether any mount supports semantic search.
    pub fn has_search(&self) -> bool {
        !self.search_mounts.is_empty()
    }

    fn resolve(&self, path: &str) -> VfsResult<(&Mount, String, String)> {
        let virtual_path = normalize_path(path);
        let (mount, rel) = self.table.resolve(&virtual_path)?;
        Ok((mount, rel, virtual_path))
    }

    fn resolve_writable(&self, path: &str) -> VfsResult<(&Mount, String, String)> {
        let (mount, rel, virtual_path) = self.resolve(path)?;
        if mount.read_only {
            return Err(VfsError::ReadOnly(virtual_path));
        }
        Ok((mount, rel, virtual_path))
    }

    /// Read the full contents of a file.
    #[instrument(skip(self))]
    pub async fn read(&self, path: &str) -> VfsResult<Vec<u8>> {
        let (mount, rel, virtual_path) = self.resolve(path)?;
        mount
            .backend
            .read(&rel)
            .await
            .map_err(|e| VfsError::from_backend(e, &virtual_path))
    }

    /// Read a file and decode it as UTF-8.
    #[instrument(skip(self))]
    pub async fn read_text(&self, path: &str) -> VfsResult<String> {
        let bytes = self.read(path).await?;
        String::from_utf8(bytes).map_err(|_| VfsError::NotUtf8(normalize_path(path)))
    }

    /// Write a file, replacing existing contents. Missing ancestor
    /// directories are created.
    #[instrument(skip(self, data), fields(size = data.len()))]
    pub async fn write(&self, path: &str, data: &[u8]) -> VfsResult<()> {
        let (mount, rel, virtual_path) = self.resolve_writable(path)?;
        mount
            .backend
            .write(&rel, data)
            .await
            .map_err(|e| VfsError::from_backend(e, &virtual_path))
    }

    /// Write a UTF-8 string to a file.
    pub async fn write_text(&self, path: &str, text: &str) -> VfsResult<()> {
        self.write(path, text.as_bytes()).await
    }

    /// Append to a file, creating it if absent.
    #[instrument(skip(self, data), fields(size = data.len()))]
    pub async fn append(&self, path: &str, data: &[u8]) -> VfsResult<()> {
        let (mount, rel, virtual_path) = self.resolve_writable(path)?;
        mount
            .backend
            .append(&rel, data)
            .await
            .map_err(|e| VfsError::from_backend(e, &virtual_path))
    }

    /// Append a UTF-8 string to a file.
    pub async fn append_text(&self, path: &str, text: &str) -> VfsResult<()> {
        self.append(path, text.as_bytes()).await
    }

    /// Delete a file, or a directory and its whole subtree.
    #[instrument(skip(self))]
    pub async fn delete(&self, path: &str) -> VfsResult<()> {
        let (mount, rel, virtual_path) = self.resolve_writable(path)?;
        mount
            .backend
            .delete(&rel)
            .await
            .map_err(|e| VfsError::from_backend(e, &virtual_path))
    }

    /// Whether a path exists. Never fails: an unmounted or unreachable
    /// path is simply absent.
    #[instrument(skip(self))]
    pub async fn exists(&self, path: &str) -> bool {
        let Ok((mount, rel, _)) = self.resolve(path) else {
            return false;
        };
        mount.backend.exists(&rel).await.unwrap_or(false)
    }

    /// List the direct children of a directory. Entry paths are virtual.
    #[instrument(skip(self))]
    pub async fn list(&self, path: &str) -> VfsResult<Vec<Entry>> {
        let (mount, rel, virtual_path) = self.resolve(path)?;
        let entries = mount
            .backend
            .list(&rel)
            .await
            .map_err(|e| VfsError::from_backend(e, &virtual_path))?;
        Ok(entries
            .into_iter()
            .map(|mut entry| {
                entry.path = join_virtual(&virtual_path, &entry.name);
                entry
            })
            .collect())
    }

    /// Metadata for a single path. The entry path is virtual.
    #[instrument(skip(self))]
    pub async fn stat(&self, path: &str) -> VfsResult<Entry> {
        let (mount, rel, virtual_path) = self.resolve(path)?;
        let mut entry = mount
            .backend
            .stat(&rel)
            .await
            .map_err(|e| VfsError::from_backend(e, &virtual_path))?;
        entry.path = virtual_path;
        Ok(entry)
    }

    /// Move a file, possibly across backends.
    ///
    /// Within one backend this is the backend's native rename. Across
    /// backends it degrades to copy-then-delete; if the copy lands but the
    /// source delete fails, [`VfsError::PartialRename`] reports that both
    /// paths may now hold the content.
    #[instrument(skip(self))]
    pub async fn rename(&self, from: &str, to: &str) -> VfsResult<()> {
        let (from_mount, from_rel, from_virtual) = self.resolve_writable(from)?;
        let (to_mount, to_rel, to_virtual) = self.resolve_writable(to)?;

        if Arc::ptr_eq(&from_mount.backend, &to_mount.backend) {
            return from_mount
                .backend
                .rename(&from_rel, &to_rel)
                .await
                .map_err(|e| VfsError::from_backend(e, &from_virtual));
        }

        let data = from_mount
            .backend
            .read(&from_rel)
            .await
            .map_err(|e| VfsError::from_backend(e, &from_virtual))?;
        to_mount
            .backend
            .write(&to_rel, &data)
            .await
            .map_err(|e| VfsError::from_backend(e, &to_virtual))?;
        from_mount.backend.delete(&from_rel).await.map_err(|e| {
            warn!(from = %from_virtual, to = %to_virtual, "rename copied but source delete failed");
            VfsError::PartialRename {
                from: from_virtual.clone(),
                to: to_virtual.clone(),
                source: e,
            }
        })
    }

    /// Copy a file, possibly across backends. Returns the number of bytes
    /// copied.
    #[instrument(skip(self))]
    pub async fn copy(&self, from: &str, to: &str) -> VfsResult<u64> {
        let (from_mount, from_rel, from_virtual) = self.resolve(from)?;
        let (to_mount, to_rel, to_virtual) = self.resolve_writable(to)?;

        if Arc::ptr_eq(&from_mount.backend, &to_mount.backend) {
            return from_mount
                .backend
                .copy(&from_rel, &to_rel)
                .await
                .map_err(|e| VfsError::from_backend(e, &from_virtual));
        }

        let data = from_mount
            .backend
            .read(&from_rel)
            .await
            .map_err(|e| VfsError::from_backend(e, &from_virtual))?;
        let n = data.len() as u64;
        to_mount
            .backend
            .write(&to_rel, &data)
            .await
            .map_err(|e| VfsError::from_backend(e, &to_virtual))?;
        Ok(n)
    }

    /// Semantic search across every mount that supports it. Hit paths are
    /// virtual. Returns an empty list when no mount has search.
    #[instrument(skip(self))]
    pub async fn search(&self, query: &str, limit: usize) -> VfsResult<Vec<QueryHit>> {
        let mut hits = Vec::new();
        for (mount_path, backend) in &self.search_mounts {
            let mount_hits = backend
                .query(query, limit)
                .await
                .map_err(|e| VfsError::from_backend(e, mount_path))?;
            for mut hit in mount_hits {
                hit.path = join_virtual(mount_path, &hit.path);
                hits.push(hit);
            }
        }
        hits.sort_by(|a, b| b.score.total_cmp(&a.score));
        hits.truncate(limit);
        Ok(hits)
    }
}

impl fmt::Display for Vfs {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "Vfs(name='{}', mounts={:?})", self.name, self.mount_paths)
    }
}

impl fmt::Debug for Vfs {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Vfs")
            .field("name", &self.name)
            .field("mount_paths", &self.mount_paths)
            .finish_non_exhaustive()
    }
}

/// Join a normalized virtual directory path with a relative child path.
fn join_virtual(parent: &str, child: &str) -> String {
    let child = child.trim_matches('/');
    if child.is_empty() {
        parent.to_string()
    } else if parent == "/" {
        format!("/{child}")
    } else {
        format!("{parent}/{child}")
    }
}

async fn build_backend(
    id: &str,
    config: &BackendConfig,
    chroma_handles: &mut HashMap<String, Arc<ChromaBackend>>,
) -> VfsResult<Arc<dyn Backend>> {
    let wrap = |e: crate::error::BackendError| {
        VfsError::InvalidConfig(format!("failed to initialize backend '{id}': {e}"))
    };
    match config {
        BackendConfig::Fs { root } => Ok(Arc::new(LocalBackend::new(root).map_err(wrap)?)),
        BackendConfig::Memory {} => Ok(Arc::new(MemoryBackend::new())),
        #[cfg(feature = "aws")]
        BackendConfig::S3 {
            bucket,
            prefix,
            region,
            endpoint,
            access_key_id,
            secret_access_key,
        } => {
            let backend = crate::backends::ObjectBackend::s3(
                bucket,
                prefix.as_deref(),
                region.as_deref(),
                endpoint.as_deref(),
                access_key_id.as_ref().map(|s| s.expose()),
                secret_access_key.as_ref().map(|s| s.expose()),
            )
            .map_err(wrap)?;
            Ok(Arc::new(backend))
        }
        #[cfg(not(feature = "aws"))]
        BackendConfig::S3 { .. } => Err(VfsError::InvalidConfig(format!(
            "backend '{id}' needs s3 support; rebuild with the 'aws' feature"
        ))),
        BackendConfig::Chroma { url, collection } => {
            let backend = Arc::new(ChromaBackend::new(url, collection).await.map_err(wrap)?);
            chroma_handles.insert(id.to_string(), Arc::clone(&backend));
            Ok(backend)
        }
        other => Err(VfsError::InvalidConfig(format!(
            "backend '{id}' has unsupported type '{}'",
            other.kind()
        ))),
    }
}
