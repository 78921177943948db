//! SQLite storage backend

use super::traits::{
    check_index, OpenStore, Repository, StorageError, StorageResult, StoredRecord,
};
use async_trait::async_trait;
use rusqlite::{params, Connection, OptionalExtension};
use std::marker::PhantomData;
use std::path::Path;
use std::sync::{Arc, Mutex, MutexGuard};

/// SQLite-backed object store
///
/// Uses a single database file holding every object store. Records are
/// serialized as JSON; each declared index value is written to a side
/// table so index lookups stay in SQL. Thread-safe via internal mutex on
/// the connection, shared by all repositories opened from the same store.
#[derive(Clone)]
pub struct SqliteStore {
    conn: Arc<Mutex<Connection>>,
}

impl SqliteStore {
    fn init_schema(conn: &Connection) -> StorageResult<()> {
        conn.execute_batch(
            r#"
            CREATE TABLE IF NOT EXISTS records (
                store TEXT NOT NULL,
                key TEXT NOT NULL,
                record_json TEXT NOT NULL,
                PRIMARY KEY (store, key)
            );

            CREATE TABLE IF NOT EXISTS record_indexes (
                store TEXT NOT NULL,
                index_name TEXT NOT NULL,
                value TEXT NOT NULL,
                key TEXT NOT NULL,
                PRIMARY KEY (store, index_name, key),
                FOREIGN KEY (store, key) REFERENCES records(store, key) ON DELETE CASCADE
            );

            CREATE INDEX IF NOT EXISTS idx_record_indexes_value
                ON record_indexes(store, index_name, value);

            PRAGMA foreign_keys = ON;
            PRAGMA journal_mode = WAL;
            "#,
        )?;

        Ok(())
    }

    /// A typed repository over one object store in this database.
    pub fn repository<T: StoredRecord>(&self) -> SqliteRepository<T> {
        SqliteRepository {
            conn: self.conn.clone(),
            _record: PhantomData,
        }
    }
}

impl OpenStore for SqliteStore {
    fn open(path: impl AsRef<Path>) -> StorageResult<Self> {
        if let Some(parent) = path.as_ref().parent() {
            std::fs::create_dir_all(parent)?;
        }

        let conn = Connection::open(path)?;
        Self::init_schema(&conn)?;

        Ok(Self {
            conn: Arc::new(Mutex::new(conn)),
        })
    }

    fn open_in_memory() -> StorageResult<Self> {
        let conn = Connection::open_in_memory()?;
        Self::init_schema(&conn)?;

        Ok(Self {
            conn: Arc::new(Mutex::new(conn)),
        })
    }
}

/// Repository for records of type `T` inside a [`SqliteStore`].
pub struct SqliteRepository<T: StoredRecord> {
    conn: Arc<Mutex<Connection>>,
    _record: PhantomData<fn() -> T>,
}

impl<T: StoredRecord> SqliteRepository<T> {
    fn lock(&self) -> StorageResult<MutexGuard<'_, Connection>> {
        self.conn.lock().map_err(|_| StorageError::LockPoisoned)
    }

    fn decode(json: &str) -> StorageResult<T> {
        Ok(serde_json::from_str(json)?)
    }
}

#[async_trait]
impl<T: StoredRecord> Repository<T> for SqliteRepository<T> {
    async fn set(&self, record: &T) -> StorageResult<()> {
        let key = record.key();
        let json = serde_json::to_string(record)?;

        let mut conn = self.lock()?;
        let tx = conn.transaction()?;

        tx.execute(
            r#"
            INSERT INTO records (store, key, record_json)
            VALUES (?1, ?2, ?3)
            ON CONFLICT(store, key) DO UPDATE SET
                record_json = excluded.record_json
            "#,
            params![T::STORE, key, json],
        )?;

        tx.execute(
            "DELETE FROM record_indexes WHERE store = ?1 AND key = ?2",
            params![T::STORE, key],
        )?;

        for index in T::INDEXES {
            if let Some(value) = record.index_value(index) {
                tx.execute(
                    "INSERT INTO record_indexes (store, index_name, value, key) VALUES (?1, ?2, ?3, ?4)",
                    params![T::STORE, index, value, key],
                )?;
            }
        }

        tx.commit()?;
        Ok(())
    }

    async fn get(&self, key: &str) -> StorageResult<Option<T>> {
        let conn = self.lock()?;

        let json: Option<String> = conn
            .query_row(
                "SELECT record_json FROM records WHERE store = ?1 AND key = ?2",
                params![T::STORE, key],
                |row| row.get(0),
            )
            .optional()?;

        json.as_deref().map(Self::decode).transpose()
    }

    async fn get_all(&self) -> StorageResult<Vec<T>> {
        let conn = self.lock()?;

        let mut stmt =
            conn.prepare("SELECT record_json FROM records WHERE store = ?1 ORDER BY key")?;
        let rows = stmt
            .query_map(params![T::STORE], |row| row.get::<_, String>(0))?
            .collect::<Result<Vec<_>, _>>()?;

        rows.iter().map(|json| Self::decode(json)).collect()
    }

    async fn get_all_from_index(&self, index: &str, value: &str) -> StorageResult<Vec<T>> {
        check_index::<T>(index)?;
        let conn = self.lock()?;

        let mut stmt = conn.prepare(
            r#"
            SELECT r.record_json
            FROM record_indexes i
            JOIN records r ON r.store = i.store AND r.key = i.key
            WHERE i.store = ?1 AND i.index_name = ?2 AND i.value = ?3
            ORDER BY r.key
            "#,
        )?;

        let rows = stmt
            .query_map(params![T::STORE, index, value], |row| row.get::<_, String>(0))?
            .collect::<Result<Vec<_>, _>>()?;

        rows.iter().map(|json| Self::decode(json)).collect()
    }

    async fn get_from_index(&self, index: &str, value: &str) -> StorageResult<Option<T>> {
        check_index::<T>(index)?;
        let conn = self.lock()?;

        let json: Option<String> = conn
            .query_row(
                r#"
                SELECT r.record_json
                FROM record_indexes i
                JOIN records r ON r.store = i.store AND r.key = i.key
                WHERE i.store = ?1 AND i.index_name = ?2 AND i.value = ?3
                ORDER BY r.key
                LIMIT 1
                "#,
                params![T::STORE, index, value],
                |row| row.get(0),
            )
            .optional()?;

        json.as_deref().map(Self::decode).transpose()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde::{Deserialize, Serialize};
    use tempfile::tempdir;

    #[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
    struct Item {
        id: String,
        owner: String,
        tag: Option<String>,
    }

    impl StoredRecord for Item {
        const STORE: &'static str = "items";
        const INDEXES: &'static [&'static str] = &["items-owner", "items-tag"];

        fn key(&self) -> String {
            self.id.clone()
        }

        fn index_value(&self, index: &str) -> Option<String> {
            match index {
                "items-owner" => Some(self.owner.clone()),
                "items-tag" => self.tag.clone(),
                _ => None,
            }
        }
    }

    fn item(id: &str, owner: &str, tag: Option<&str>) -> Item {
        Item {
            id: id.to_string(),
            owner: owner.to_string(),
            tag: tag.map(str::to_string),
        }
    }

    #[tokio::test]
    async fn set_and_get_roundtrip() {
        let store = SqliteStore::open_in_memory().unwrap();
        let repo = store.repository::<Item>();

        repo.set(&item("1", "alice", Some("x"))).await.unwrap();

        assert_eq!(
            repo.get("1").await.unwrap(),
            Some(item("1", "alice", Some("x")))
        );
        assert_eq!(repo.get("2").await.unwrap(), None);
    }

    #[tokio::test]
    async fn overwrite_moves_index_entries() {
        let store = SqliteStore::open_in_memory().unwrap();
        let repo = store.repository::<Item>();

        repo.set(&item("1", "alice", None)).await.unwrap();
        repo.set(&item("1", "bob", None)).await.unwrap();

        assert!(repo.get_all_from_index("items-owner", "alice").await.unwrap().is_empty());
        assert_eq!(
            repo.get_all_from_index("items-owner", "bob").await.unwrap(),
            vec![item("1", "bob", None)]
        );
    }

    #[tokio::test]
    async fn missing_index_value_is_not_indexed() {
        let store = SqliteStore::open_in_memory().unwrap();
        let repo = store.repository::<Item>();

        repo.set(&item("1", "alice", None)).await.unwrap();
        repo.set(&item("2", "alice", Some("x"))).await.unwrap();

        let tagged = repo.get_all_from_index("items-tag", "x").await.unwrap();
        assert_eq!(tagged, vec![item("2", "alice", Some("x"))]);
        assert_eq!(
            repo.get_from_index("items-owner", "alice").await.unwrap(),
            Some(item("1", "alice", None))
        );
    }

    #[tokio::test]
    async fn unknown_index_is_rejected() {
        let store = SqliteStore::open_in_memory().unwrap();
        let repo = store.repository::<Item>();

        let err = repo.get_from_index("items-color", "red").await.unwrap_err();
        assert!(matches!(err, StorageError::UnknownIndex { .. }));
    }

    #[tokio::test]
    async fn data_survives_reopen() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("nested").join("store.db");

        {
            let store = SqliteStore::open(&path).unwrap();
            store
                .repository::<Item>()
                .set(&item("1", "alice", None))
                .await
                .unwrap();
        }

        let store = SqliteStore::open(&path).unwrap();
        assert_eq!(
            store.repository::<Item>().get("1").await.unwrap(),
            Some(item("1", "alice", None))
        );
    }
}
