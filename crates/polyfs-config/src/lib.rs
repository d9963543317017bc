//! Workspace descriptor for polyfs.
//!
//! A descriptor names the workspace, declares a set of backends keyed by id,
//! and maps virtual path prefixes onto those backends. Descriptors are TOML:
//!
//! ```toml
//! name = "agent-workspace"
//!
//! [backends.local]
//! type = "fs"
//! root = "./data"
//!
//! [backends.scratch]
//! type = "memory"
//!
//! [[mounts]]
//! path = "/workspace"
//! backend = "local"
//!
//! [[mounts]]
//! path = "/tmp"
//! backend = "scratch"
//! read_only = false
//! ```
//!
//! Validation is eager: [`WorkspaceConfig::validate_or_err`] runs before any
//! backend is constructed, so a descriptor that references an undeclared
//! backend id or a malformed mount path fails without touching the network
//! or the filesystem.

mod error;
mod secret;

pub use error::ConfigError;
pub use secret::Secret;

use indexmap::IndexMap;
use serde::{Deserialize, Serialize};
use std::path::Path;

/// Declaration of a single backend instance.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
#[non_exhaustive]
pub enum BackendConfig {
    /// Local filesystem rooted at a directory.
    Fs { root: String },

    /// Ephemeral in-memory store.
    Memory {},

    /// S3-compatible object store.
    S3 {
        bucket: String,
        #[serde(default)]
        prefix: Option<String>,
        #[serde(default)]
        region: Option<String>,
        #[serde(default)]
        endpoint: Option<String>,
        #[serde(default)]
        access_key_id: Option<Secret>,
        #[serde(default)]
        secret_access_key: Option<Secret>,
    },

    /// Chroma vector store (documents addressable by path, plus semantic
    /// search).
    Chroma {
        url: String,
        #[serde(default = "default_collection")]
        collection: String,
    },
}

fn default_collection() -> String {
    "default".to_string()
}

impl BackendConfig {
    /// Short kind name used in logs and error messages.
    pub fn kind(&self) -> &'static str {
        match self {
            BackendConfig::Fs { .. } => "fs",
            BackendConfig::Memory {} => "memory",
            BackendConfig::S3 { .. } => "s3",
            BackendConfig::Chroma { .. } => "chroma",
        }
    }
}

/// A single mount: a virtual path prefix routed to a declared backend.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MountConfig {
    /// Absolute virtual path prefix, e.g. `/workspace`.
    pub path: String,
    /// Id of a backend declared under `[backends.*]`.
    pub backend: String,
    /// Backend-relative root the mount is anchored at ("" = backend root).
    #[serde(default)]
    pub root: String,
    /// Reject writes through this mount.
    #[serde(default)]
    pub read_only: bool,
}

/// The full workspace descriptor.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct WorkspaceConfig {
    /// Workspace name, surfaced by the VFS facade.
    pub name: String,
    /// Declared backends, keyed by id. Order is preserved.
    #[serde(default)]
    pub backends: IndexMap<String, BackendConfig>,
    /// Mounts in declaration order.
    #[serde(default)]
    pub mounts: Vec<MountConfig>,
}

impl WorkspaceConfig {
    /// Parse a descriptor from TOML text.
    pub fn from_toml(text: &str) -> Result<Self, ConfigError> {
        Ok(toml::from_str(text)?)
    }

    /// Read and parse a descriptor file.
    pub fn from_file(path: impl AsRef<Path>) -> Result<Self, ConfigError> {
        let text = std::fs::read_to_string(path)?;
        Self::from_toml(&text)
    }

    /// Check the descriptor for structural problems, collecting every
    /// violation rather than stopping at the first.
    ///
    /// Nested mounts (`/workspace` and `/workspace/cache`) are legal; the
    /// mount table resolves them longest-prefix-first.
    pub fn validate(&self) -> Vec<ConfigError> {
        let mut errors = Vec::new();

        if self.name.trim().is_empty() {
            errors.push(ConfigError::InvalidConfig(
                "workspace name must not be empty".to_string(),
            ));
        }

        if self.mounts.is_empty() {
            errors.push(ConfigError::InvalidConfig(
                "at least one mount is required".to_string(),
            ));
        }

        let mut seen = std::collections::HashSet::new();
        for mount in &self.mounts {
            if !mount.path.starts_with('/') {
                errors.push(ConfigError::InvalidMountPath {
                    path: mount.path.clone(),
                    reason: "mount paths must be absolute".to_string(),
                });
            }
            if mount.path.contains("//") {
                errors.push(ConfigError::InvalidMountPath {
                    path: mount.path.clone(),
                    reason: "mount paths must not contain empty segments".to_string(),
                });
            }
            let canonical = if mount.path.len() > 1 {
                mount.path.trim_end_matches('/').to_string()
            } else {
                mount.path.clone()
            };
            if !seen.insert(canonical) {
                errors.push(ConfigError::DuplicateMountPath(mount.path.clone()));
            }
            if !self.backends.contains_key(&mount.backend) {
                errors.push(ConfigError::UndefinedBackend {
                    mount: mount.path.clone(),
                    backend: mount.backend.clone(),
                });
            }
        }

        errors
    }

    /// Like [`validate`](Self::validate), but returns the first violation
    /// as an error.
    pub fn validate_or_err(&self) -> Result<(), ConfigError> {
        match self.validate().into_iter().next() {
            Some(err) => Err(err),
            None => Ok(()),
        }
    }
}
