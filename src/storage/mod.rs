//! Storage backends for cached records
//!
//! Records live in object stores behind the `Repository` trait. The
//! persistent implementation is `SqliteStore`; `MemoryRepository` keeps
//! everything in process.

mod memory;
mod sqlite;
mod traits;

pub use memory::MemoryRepository;
pub use sqlite::{SqliteRepository, SqliteStore};
pub use traits::{OpenStore, Repository, StorageError, StorageResult, StoredRecord};
