//! Repository trait definitions

use async_trait::async_trait;
use serde::de::DeserializeOwned;
use serde::Serialize;
use std::path::Path;
use thiserror::Error;

/// Errors that can occur during storage operations
#[derive(Debug, Error)]
pub enum StorageError {
    #[error("Database error: {0}")]
    Database(#[from] rusqlite::Error),

    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Unknown index '{index}' on store '{store}'")]
    UnknownIndex { store: &'static str, index: String },

    #[error("Storage lock poisoned")]
    LockPoisoned,
}

/// Result type for storage operations
pub type StorageResult<T> = Result<T, StorageError>;

/// A record that can live in an object store.
///
/// Every record has a primary key and a value for each declared index.
/// Index values are plain strings; lookups compare them verbatim.
pub trait StoredRecord: Serialize + DeserializeOwned + Clone + Send + Sync + 'static {
    /// Name of the object store (e.g. "beat-savior")
    const STORE: &'static str;

    /// Index names declared on the store
    const INDEXES: &'static [&'static str];

    /// Primary key of this record
    fn key(&self) -> String;

    /// Value of this record for the given index, if it has one
    fn index_value(&self, index: &str) -> Option<String>;
}

/// Key/value object store keyed by primary key with secondary indices.
///
/// Implementations must be thread-safe (Send + Sync) so a single repository
/// can be shared between concurrent refreshes.
#[async_trait]
pub trait Repository<T: StoredRecord>: Send + Sync {
    /// Insert or overwrite a record
    async fn set(&self, record: &T) -> StorageResult<()>;

    /// Load a record by primary key
    async fn get(&self, key: &str) -> StorageResult<Option<T>>;

    /// Every record in the store, ordered by key
    async fn get_all(&self) -> StorageResult<Vec<T>>;

    /// All records whose `index` value equals `value`, ordered by key
    async fn get_all_from_index(&self, index: &str, value: &str) -> StorageResult<Vec<T>>;

    /// First record whose `index` value equals `value`
    async fn get_from_index(&self, index: &str, value: &str) -> StorageResult<Option<T>>;
}

/// Extension trait for opening stores from paths
pub trait OpenStore: Sized {
    /// Open or create a store at the given path
    fn open(path: impl AsRef<Path>) -> StorageResult<Self>;

    /// Create an in-memory store (useful for testing)
    fn open_in_memory() -> StorageResult<Self>;
}

/// Reject lookups on indices the record type does not declare.
pub(crate) fn check_index<T: StoredRecord>(index: &str) -> StorageResult<()> {
    if T::INDEXES.contains(&index) {
        Ok(())
    } else {
        Err(StorageError::UnknownIndex {
            store: T::STORE,
            index: index.to_string(),
        })
    }
}
