//! Storage backend implementations.

mod chroma;
mod local;
mod memory;
mod object;

pub use chroma::{ChromaBackend, QueryHit};
pub use local::LocalBackend;
pub use memory::MemoryBackend;
pub use object::ObjectBackend;
