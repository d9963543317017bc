//! Path-addressed virtual filesystem over heterogeneous backends.
//!
//! One workspace gives agents a single `/`-rooted namespace spanning local
//! directories, in-memory scratch space, object stores, and vector stores.
//! Key components:
//!
//! - [`Backend`] - Uniform contract every storage backend implements
//! - [`MountTable`] - Routes virtual paths to backends by longest prefix
//! - [`Vfs`] - The facade: normalize, resolve, dispatch, normalize errors
//! - [`Vfs::grep`] - Literal substring search across mounted content
//! - [`tools`] - Tool manifests (json / mcp / openai) describing the surface
//!
//! ## Design decisions
//!
//! - **Paths, not handles**: every operation takes a whole path; no open
//!   file state lives in the VFS.
//! - **Longest-prefix routing on segment boundaries**: `/workspace` owns
//!   `/workspace/a.txt` but never `/workspace2/a.txt`.
//! - **Errors carry virtual paths**: backend-native errors never cross the
//!   facade.
//! - **Deleting a directory is recursive** on every backend.

pub mod backend;
pub mod backends;
mod error;
mod grep;
mod mount;
pub mod tools;
mod types;
mod vfs;

pub use backend::Backend;
pub use backends::{ChromaBackend, LocalBackend, MemoryBackend, ObjectBackend, QueryHit};
pub use error::{BackendError, BackendResult, VfsError, VfsResult};
pub use mount::{Mount, MountTable, normalize_path};
pub use tools::{ToolDefinition, ToolFormat, ToolParameter, format_tools, generate_tools};
pub use types::{Entry, GrepMatch, GrepOptions};
pub use vfs::Vfs;
