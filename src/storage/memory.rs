//! In-process repository backed by a concurrent map

use super::traits::{check_index, Repository, StorageResult, StoredRecord};
use async_trait::async_trait;
use dashmap::DashMap;

/// Repository that keeps records in memory.
///
/// Used by tests and by embedders that do not need data to survive
/// a restart.
#[derive(Debug)]
pub struct MemoryRepository<T: StoredRecord> {
    records: DashMap<String, T>,
}

impl<T: StoredRecord> MemoryRepository<T> {
    pub fn new() -> Self {
        Self {
            records: DashMap::new(),
        }
    }

    /// Number of stored records
    pub fn len(&self) -> usize {
        self.records.len()
    }

    pub fn is_empty(&self) -> bool {
        self.records.is_empty()
    }
}

impl<T: StoredRecord> Default for MemoryRepository<T> {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl<T: StoredRecord> Repository<T> for MemoryRepository<T> {
    async fn set(&self, record: &T) -> StorageResult<()> {
        self.records.insert(record.key(), record.clone());
        Ok(())
    }

    async fn get(&self, key: &str) -> StorageResult<Option<T>> {
        Ok(self.records.get(key).map(|r| r.clone()))
    }

    async fn get_all(&self) -> StorageResult<Vec<T>> {
        let mut all: Vec<(String, T)> = self
            .records
            .iter()
            .map(|r| (r.key().clone(), r.value().clone()))
            .collect();
        all.sort_by(|a, b| a.0.cmp(&b.0));

        Ok(all.into_iter().map(|(_, record)| record).collect())
    }

    async fn get_all_from_index(&self, index: &str, value: &str) -> StorageResult<Vec<T>> {
        check_index::<T>(index)?;

        let mut matching: Vec<(String, T)> = self
            .records
            .iter()
            .filter(|r| r.value().index_value(index).as_deref() == Some(value))
            .map(|r| (r.key().clone(), r.value().clone()))
            .collect();
        matching.sort_by(|a, b| a.0.cmp(&b.0));

        Ok(matching.into_iter().map(|(_, record)| record).collect())
    }

    async fn get_from_index(&self, index: &str, value: &str) -> StorageResult<Option<T>> {
        Ok(self.get_all_from_index(index, value).await?.into_iter().next())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::storage::StorageError;
    use serde::{Deserialize, Serialize};

    #[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
    struct Item {
        id: String,
        owner: String,
    }

    impl StoredRecord for Item {
        const STORE: &'static str = "items";
        const INDEXES: &'static [&'static str] = &["items-owner"];

        fn key(&self) -> String {
            self.id.clone()
        }

        fn index_value(&self, index: &str) -> Option<String> {
            match index {
                "items-owner" => Some(self.owner.clone()),
                _ => None,
            }
        }
    }

    fn item(id: &str, owner: &str) -> Item {
        Item {
            id: id.to_string(),
            owner: owner.to_string(),
        }
    }

    #[tokio::test]
    async fn set_overwrites_by_key() {
        let repo = MemoryRepository::new();
        repo.set(&item("1", "a")).await.unwrap();
        repo.set(&item("1", "b")).await.unwrap();

        assert_eq!(repo.len(), 1);
        assert_eq!(repo.get("1").await.unwrap(), Some(item("1", "b")));
    }

    #[tokio::test]
    async fn index_lookup_is_ordered_by_key() {
        let repo = MemoryRepository::new();
        repo.set(&item("2", "a")).await.unwrap();
        repo.set(&item("1", "a")).await.unwrap();
        repo.set(&item("3", "b")).await.unwrap();

        let owned = repo.get_all_from_index("items-owner", "a").await.unwrap();
        assert_eq!(owned, vec![item("1", "a"), item("2", "a")]);
        assert_eq!(
            repo.get_from_index("items-owner", "b").await.unwrap(),
            Some(item("3", "b"))
        );
        assert_eq!(repo.get_from_index("items-owner", "c").await.unwrap(), None);
    }

    #[tokio::test]
    async fn unknown_index_is_rejected() {
        let repo: MemoryRepository<Item> = MemoryRepository::new();
        let err = repo.get_all_from_index("items-color", "red").await.unwrap_err();
        assert!(matches!(err, StorageError::UnknownIndex { .. }));
    }
}
