//! Storage collaborator contracts and an in-memory backend.
//!
//! The traits define the read-only interface the engine needs. The
//! in-memory stores are used for embedding, tests and benchmarks.

mod memory;
mod traits;

pub use memory::{InMemoryBuildStore, InMemoryStores, InMemoryTaskStore, InMemoryVersionStore};
pub use traits::{BuildStore, StorageError, TaskStore, VersionStore};
