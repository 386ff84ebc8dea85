//! Storage abstraction shared by every agent-id service.

use crate::errors::{Result, StorageError};
use async_trait::async_trait;
use serde::{de::DeserializeOwned, Serialize};

/// Typed key-value store partitioned into column families
///
/// Keys and values are bincode-encoded. Services are generic over this trait
/// and tests run them against a temporary RocksDB.
#[async_trait]
pub trait Storage: Send + Sync {
    /// `Ok(None)` when the key is absent
    async fn get<K, V>(&self, cf: &str, key: &K) -> Result<Option<V>>
    where
        K: Serialize + Send + Sync,
        V: DeserializeOwned;

    async fn put<K, V>(&self, cf: &str, key: &K, value: &V) -> Result<()>
    where
        K: Serialize + Send + Sync,
        V: Serialize + Send + Sync;

    /// Write only if the key is absent
    ///
    /// Backs append-only records and single-use markers. Returns `false`
    /// and leaves the stored value alone when the key already exists.
    async fn insert_new<K, V>(&self, cf: &str, key: &K, value: &V) -> Result<bool>
    where
        K: Serialize + Send + Sync,
        V: Serialize + Send + Sync;

    async fn delete<K>(&self, cf: &str, key: &K) -> Result<()>
    where
        K: Serialize + Send + Sync;

    async fn exists<K>(&self, cf: &str, key: &K) -> Result<bool>
    where
        K: Serialize + Send + Sync;

    /// Entries whose encoded key starts with the encoded `prefix`, in key order
    async fn get_by_prefix<K, V>(&self, cf: &str, prefix: &K) -> Result<Vec<(Vec<u8>, V)>>
    where
        K: Serialize + Send + Sync,
        V: DeserializeOwned;

    /// Every entry in the column family, in key order
    async fn scan_all<V>(&self, cf: &str) -> Result<Vec<(Vec<u8>, V)>>
    where
        V: DeserializeOwned;

    /// Increment a named counter and return the new value (starts at 1)
    async fn next_sequence(&self, name: &str) -> Result<u64>;

    fn batch(&self) -> Box<dyn Batch>;
}

/// Group of writes committed atomically
///
/// Works on encoded bytes so it stays object safe; [`BatchExt`] adds the
/// typed methods. Dropping a batch without committing discards it.
#[async_trait]
pub trait Batch: Send {
    fn put_raw(&mut self, cf: &str, key: Vec<u8>, value: Vec<u8>) -> Result<()>;

    fn delete_raw(&mut self, cf: &str, key: Vec<u8>) -> Result<()>;

    async fn commit(self: Box<Self>) -> Result<()>;
}

/// Typed writes on top of [`Batch`]
pub trait BatchExt: Batch {
    fn put<K, V>(&mut self, cf: &str, key: &K, value: &V) -> Result<()>
    where
        K: Serialize,
        V: Serialize,
    {
        let key = serialize_key(key)?;
        let value = serialize_value(value)?;
        self.put_raw(cf, key, value)
    }

    fn delete<K>(&mut self, cf: &str, key: &K) -> Result<()>
    where
        K: Serialize,
    {
        let key = serialize_key(key)?;
        self.delete_raw(cf, key)
    }
}

impl<T: Batch + ?Sized> BatchExt for T {}

/// Encode a key the way the store does
///
/// Tuple keys encode field by field, so a tuple's leading fields form a
/// valid prefix for [`Storage::get_by_prefix`].
pub fn serialize_key<K: Serialize>(key: &K) -> Result<Vec<u8>> {
    bincode::serialize(key).map_err(|e| StorageError::Serialization(e.to_string()))
}

pub(crate) fn serialize_value<V: Serialize>(value: &V) -> Result<Vec<u8>> {
    bincode::serialize(value).map_err(|e| StorageError::Serialization(e.to_string()))
}

pub(crate) fn deserialize_value<V: DeserializeOwned>(bytes: &[u8]) -> Result<V> {
    bincode::deserialize(bytes).map_err(|e| StorageError::Deserialization(e.to_string()))
}
