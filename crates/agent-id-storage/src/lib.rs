//! # agent-id-storage
//!
//! Storage abstraction layer for agent identities using RocksDB.
//!
//! Services depend on the [`Storage`] trait and are tested against a
//! temporary [`RocksDbStorage`].

#![warn(clippy::all)]

pub mod column_families;
pub mod errors;
pub mod retry;
pub mod rocksdb_impl;
pub mod traits;

pub use column_families::*;
pub use errors::{Result, StorageError};
pub use retry::{retry_with_backoff, RetryPolicy};
pub use rocksdb_impl::RocksDbStorage;
pub use traits::{Batch, BatchExt, Storage};
