//! RocksDB storage implementation.

use crate::{
    column_families::{all_column_families, CF_SEQUENCES},
    errors::{Result, StorageError},
    traits::{deserialize_value, serialize_key, serialize_value, Batch, Storage},
};
use async_trait::async_trait;
use parking_lot::Mutex;
use rocksdb::{Direction, IteratorMode, Options, WriteBatch, DB};
use serde::{de::DeserializeOwned, Serialize};
use std::{path::Path, sync::Arc};
use tempfile::TempDir;
use tracing::debug;

/// RocksDB storage implementation
pub struct RocksDbStorage {
    db: Arc<DB>,
    /// Serializes check-then-write operations (`insert_new`, `next_sequence`)
    write_lock: Mutex<()>,
    /// Keeps the directory of a test database alive for the storage lifetime
    _temp_dir: Option<TempDir>,
}

impl RocksDbStorage {
    /// Open RocksDB database at the specified path
    ///
    /// Creates all required column families if they don't exist.
    pub fn open<P: AsRef<Path>>(path: P) -> Result<Self> {
        let db = Self::open_db(path.as_ref())?;
        Ok(Self {
            db: Arc::new(db),
            write_lock: Mutex::new(()),
            _temp_dir: None,
        })
    }

    /// Open a database in a fresh temporary directory
    ///
    /// This is public for use in other crates' test modules.
    pub fn open_test() -> Result<Self> {
        let temp_dir = TempDir::new().map_err(StorageError::IoError)?;
        let db = Self::open_db(temp_dir.path())?;
        Ok(Self {
            db: Arc::new(db),
            write_lock: Mutex::new(()),
            _temp_dir: Some(temp_dir),
        })
    }

    fn open_db(path: &Path) -> Result<DB> {
        let mut opts = Options::default();
        opts.create_if_missing(true);
        opts.create_missing_column_families(true);

        let db = DB::open_cf(&opts, path, all_column_families())
            .map_err(|e| StorageError::Database(e.to_string()))?;

        debug!("Opened RocksDB at {:?}", path);
        Ok(db)
    }

    /// Get column family handle
    fn cf_handle(&self, cf: &str) -> Result<&rocksdb::ColumnFamily> {
        self.db
            .cf_handle(cf)
            .ok_or_else(|| StorageError::InvalidColumnFamily(cf.to_string()))
    }

    fn get_raw(&self, cf: &str, key: &[u8]) -> Result<Option<Vec<u8>>> {
        let cf_handle = self.cf_handle(cf)?;
        self.db
            .get_cf(cf_handle, key)
            .map_err(|e| StorageError::Database(e.to_string()))
    }

    fn put_raw(&self, cf: &str, key: &[u8], value: &[u8]) -> Result<()> {
        let cf_handle = self.cf_handle(cf)?;
        self.db
            .put_cf(cf_handle, key, value)
            .map_err(|e| StorageError::Database(e.to_string()))
    }
}

#[async_trait]
impl Storage for RocksDbStorage {
    async fn get<K, V>(&self, cf: &str, key: &K) -> Result<Option<V>>
    where
        K: Serialize + Send + Sync,
        V: DeserializeOwned,
    {
        let key_bytes = serialize_key(key)?;

        match self.get_raw(cf, &key_bytes)? {
            Some(bytes) => Ok(Some(deserialize_value(&bytes)?)),
            None => Ok(None),
        }
    }

    async fn put<K, V>(&self, cf: &str, key: &K, value: &V) -> Result<()>
    where
        K: Serialize + Send + Sync,
        V: Serialize + Send + Sync,
    {
        let key_bytes = serialize_key(key)?;
        let value_bytes = serialize_value(value)?;
        self.put_raw(cf, &key_bytes, &value_bytes)
    }

    async fn insert_new<K, V>(&self, cf: &str, key: &K, value: &V) -> Result<bool>
    where
        K: Serialize + Send + Sync,
        V: Serialize + Send + Sync,
    {
        let key_bytes = serialize_key(key)?;
        let value_bytes = serialize_value(value)?;

        let _guard = self.write_lock.lock();
        if self.get_raw(cf, &key_bytes)?.is_some() {
            return Ok(false);
        }
        self.put_raw(cf, &key_bytes, &value_bytes)?;
        Ok(true)
    }

    async fn delete<K>(&self, cf: &str, key: &K) -> Result<()>
    where
        K: Serialize + Send + Sync,
    {
        let cf_handle = self.cf_handle(cf)?;
        let key_bytes = serialize_key(key)?;

        self.db
            .delete_cf(cf_handle, &key_bytes)
            .map_err(|e| StorageError::Database(e.to_string()))
    }

    async fn exists<K>(&self, cf: &str, key: &K) -> Result<bool>
    where
        K: Serialize + Send + Sync,
    {
        let key_bytes = serialize_key(key)?;
        Ok(self.get_raw(cf, &key_bytes)?.is_some())
    }

    async fn get_by_prefix<K, V>(&self, cf: &str, prefix: &K) -> Result<Vec<(Vec<u8>, V)>>
    where
        K: Serialize + Send + Sync,
        V: DeserializeOwned,
    {
        let cf_handle = self.cf_handle(cf)?;
        let prefix_bytes = serialize_key(prefix)?;

        let mut results = Vec::new();

        // Seek to the prefix; works without a configured prefix extractor
        let iter = self.db.iterator_cf(
            cf_handle,
            IteratorMode::From(&prefix_bytes, Direction::Forward),
        );

        for item in iter {
            let (key, value) = item.map_err(|e| StorageError::Database(e.to_string()))?;

            if !key.starts_with(&prefix_bytes) {
                // Keys are sorted, so once we're past the prefix, we're done
                break;
            }
            results.push((key.to_vec(), deserialize_value(&value)?));
        }

        Ok(results)
    }

    async fn scan_all<V>(&self, cf: &str) -> Result<Vec<(Vec<u8>, V)>>
    where
        V: DeserializeOwned,
    {
        let cf_handle = self.cf_handle(cf)?;

        let mut results = Vec::new();
        for item in self.db.iterator_cf(cf_handle, IteratorMode::Start) {
            let (key, value) = item.map_err(|e| StorageError::Database(e.to_string()))?;
            results.push((key.to_vec(), deserialize_value(&value)?));
        }

        Ok(results)
    }

    async fn next_sequence(&self, name: &str) -> Result<u64> {
        let key_bytes = serialize_key(&name)?;

        let _guard = self.write_lock.lock();
        let current: u64 = match self.get_raw(CF_SEQUENCES, &key_bytes)? {
            Some(bytes) => deserialize_value(&bytes)?,
            None => 0,
        };
        let next = current + 1;
        self.put_raw(CF_SEQUENCES, &key_bytes, &serialize_value(&next)?)?;
        Ok(next)
    }

    fn batch(&self) -> Box<dyn Batch> {
        Box::new(RocksDbBatch {
            db: Arc::clone(&self.db),
            write_batch: WriteBatch::default(),
        })
    }
}

/// Pending writes against one database, applied together on commit
pub struct RocksDbBatch {
    db: Arc<DB>,
    write_batch: WriteBatch,
}

#[async_trait]
impl Batch for RocksDbBatch {
    fn put_raw(&mut self, cf: &str, key: Vec<u8>, value: Vec<u8>) -> Result<()> {
        let cf_handle = self
            .db
            .cf_handle(cf)
            .ok_or_else(|| StorageError::InvalidColumnFamily(cf.to_string()))?;

        self.write_batch.put_cf(cf_handle, &key, &value);

        Ok(())
    }

    fn delete_raw(&mut self, cf: &str, key: Vec<u8>) -> Result<()> {
        let cf_handle = self
            .db
            .cf_handle(cf)
            .ok_or_else(|| StorageError::InvalidColumnFamily(cf.to_string()))?;

        self.write_batch.delete_cf(cf_handle, &key);

        Ok(())
    }

    async fn commit(self: Box<Self>) -> Result<()> {
        self.db
            .write(self.write_batch)
            .map_err(|e| StorageError::Database(e.to_string()))?;

        debug!("Batch committed");
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{column_families::*, traits::BatchExt};
    use serde::{Deserialize, Serialize};
    use uuid::Uuid;

    #[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
    struct TestData {
        id: Uuid,
        name: String,
        value: u64,
    }

    fn test_data(id: Uuid, value: u64) -> TestData {
        TestData {
            id,
            name: format!("agent-{}", value),
            value,
        }
    }

    #[tokio::test]
    async fn test_put_and_get() {
        let storage = RocksDbStorage::open_test().unwrap();
        let key = Uuid::new_v4();
        let data = test_data(key, 42);

        storage.put(CF_AGENTS, &key, &data).await.unwrap();

        let result: Option<TestData> = storage.get(CF_AGENTS, &key).await.unwrap();
        assert_eq!(result, Some(data));
    }

    #[tokio::test]
    async fn test_get_nonexistent() {
        let storage = RocksDbStorage::open_test().unwrap();

        let result: Option<TestData> = storage.get(CF_AGENTS, &Uuid::new_v4()).await.unwrap();
        assert_eq!(result, None);
    }

    #[tokio::test]
    async fn test_unknown_column_family() {
        let storage = RocksDbStorage::open_test().unwrap();
        let err = storage.put("nope", &1u8, &1u8).await.unwrap_err();
        assert!(matches!(err, StorageError::InvalidColumnFamily(_)));
        assert!(!err.is_transient());
    }

    #[tokio::test]
    async fn test_exists_and_delete() {
        let storage = RocksDbStorage::open_test().unwrap();
        let key = Uuid::new_v4();

        assert!(!storage.exists(CF_AGENTS, &key).await.unwrap());
        storage.put(CF_AGENTS, &key, &test_data(key, 1)).await.unwrap();
        assert!(storage.exists(CF_AGENTS, &key).await.unwrap());

        storage.delete(CF_AGENTS, &key).await.unwrap();
        assert!(!storage.exists(CF_AGENTS, &key).await.unwrap());
    }

    #[tokio::test]
    async fn test_insert_new_is_write_once() {
        let storage = RocksDbStorage::open_test().unwrap();
        let key = Uuid::new_v4();

        assert!(storage.insert_new(CF_VERIFICATIONS, &key, &test_data(key, 1)).await.unwrap());
        assert!(!storage.insert_new(CF_VERIFICATIONS, &key, &test_data(key, 2)).await.unwrap());

        let stored: Option<TestData> = storage.get(CF_VERIFICATIONS, &key).await.unwrap();
        assert_eq!(stored.unwrap().value, 1);
    }

    #[tokio::test]
    async fn test_insert_new_concurrent_single_winner() {
        let storage = Arc::new(RocksDbStorage::open_test().unwrap());
        let key = (Uuid::new_v4(), "nonce-1".to_string());

        let mut handles = Vec::new();
        for i in 0..16u64 {
            let storage = Arc::clone(&storage);
            let key = key.clone();
            handles.push(tokio::spawn(async move {
                storage.insert_new(CF_USED_NONCES, &key, &i).await.unwrap()
            }));
        }

        let mut winners = 0;
        for handle in handles {
            if handle.await.unwrap() {
                winners += 1;
            }
        }
        assert_eq!(winners, 1);
    }

    #[tokio::test]
    async fn test_next_sequence() {
        let storage = RocksDbStorage::open_test().unwrap();

        assert_eq!(storage.next_sequence("policies").await.unwrap(), 1);
        assert_eq!(storage.next_sequence("policies").await.unwrap(), 2);
        assert_eq!(storage.next_sequence("other").await.unwrap(), 1);
    }

    #[tokio::test]
    async fn test_batch_commit() {
        let storage = RocksDbStorage::open_test().unwrap();

        let key1 = Uuid::new_v4();
        let key2 = Uuid::new_v4();

        let mut batch = storage.batch();
        batch.put(CF_AGENTS, &key1, &test_data(key1, 1)).unwrap();
        batch.put(CF_AGENTS, &key2, &test_data(key2, 2)).unwrap();
        batch.commit().await.unwrap();

        let result1: Option<TestData> = storage.get(CF_AGENTS, &key1).await.unwrap();
        let result2: Option<TestData> = storage.get(CF_AGENTS, &key2).await.unwrap();

        assert_eq!(result1, Some(test_data(key1, 1)));
        assert_eq!(result2, Some(test_data(key2, 2)));
    }

    #[tokio::test]
    async fn test_uncommitted_batch_is_discarded() {
        let storage = RocksDbStorage::open_test().unwrap();
        let key = Uuid::new_v4();

        let mut batch = storage.batch();
        batch.put(CF_AGENTS, &key, &test_data(key, 42)).unwrap();
        drop(batch);

        let result: Option<TestData> = storage.get(CF_AGENTS, &key).await.unwrap();
        assert_eq!(result, None);
    }

    #[tokio::test]
    async fn test_get_by_prefix() {
        let storage = RocksDbStorage::open_test().unwrap();

        let org1 = Uuid::new_v4();
        let org2 = Uuid::new_v4();

        storage.put(CF_AGENTS_BY_ORG, &(org1, Uuid::new_v4()), &()).await.unwrap();
        storage.put(CF_AGENTS_BY_ORG, &(org1, Uuid::new_v4()), &()).await.unwrap();
        storage.put(CF_AGENTS_BY_ORG, &(org2, Uuid::new_v4()), &()).await.unwrap();

        let results: Vec<(Vec<u8>, ())> =
            storage.get_by_prefix(CF_AGENTS_BY_ORG, &org1).await.unwrap();

        assert_eq!(results.len(), 2);
    }

    #[tokio::test]
    async fn test_scan_all() {
        let storage = RocksDbStorage::open_test().unwrap();
        for value in 0..3u64 {
            storage.put(CF_REVOKED_TOKENS, &format!("jti-{}", value), &value).await.unwrap();
        }

        let all: Vec<(Vec<u8>, u64)> = storage.scan_all(CF_REVOKED_TOKENS).await.unwrap();
        assert_eq!(all.len(), 3);
    }
}
