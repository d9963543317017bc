//! Configuration errors.

use thiserror::Error;

/// Errors produced while loading or validating a workspace descriptor.
#[derive(Debug, Error)]
#[non_exhaustive]
pub enum ConfigError {
    /// The descriptor file could not be read.
    #[error("failed to read config: {0}")]
    Io(#[from] std::io::Error),

    /// The descriptor is not valid TOML or has the wrong shape.
    #[error("failed to parse config: {0}")]
    Parse(#[from] toml::de::Error),

    /// Two mounts declare the same path.
    #[error("duplicate mount path: {0}")]
    DuplicateMountPath(String),

    /// A mount path is not absolute or is otherwise malformed.
    #[error("invalid mount path '{path}': {reason}")]
    InvalidMountPath { path: String, reason: String },

    /// A mount references a backend id with no `[backends.*]` entry.
    #[error("mount '{mount}' references undefined backend '{backend}'")]
    UndefinedBackend { mount: String, backend: String },

    /// Any other structural problem with the descriptor.
    #[error("invalid config: {0}")]
    InvalidConfig(String),
}
