//! Key-value backends for the [disjoint-set](crate::disjoint_set).
//!
//! Each backend implements [`KVStore`] on its own, so it can be plugged into a
//! [`DisjointSet`](crate::disjoint_set::DisjointSet) directly. [`Store`] wraps all of them behind one
//! type so that the backend can be chosen at startup from a [`StoreConfig`].

use std::path::PathBuf;

use crate::disjoint_set::pluggables::{KVGet, KVStore, StoreIOError, WriteBatch};

pub mod mem_db;
pub use mem_db::{MemDB, MemWriteBatch};

#[cfg(feature = "rocksdb")]
pub mod rocks_db;
#[cfg(feature = "rocksdb")]
pub use rocks_db::{RocksDB, RocksWriteBatch};

/// Which backend to open.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum StoreConfig {
    /// Volatile store. Useful for tests and one-shot runs that only care about the export.
    InMemory,
    /// RocksDB database at `path`. Requires the `rocksdb` feature.
    RocksDb { path: PathBuf },
}

/// A [`KVStore`] whose backend is picked at runtime.
#[derive(Clone)]
pub enum Store {
    InMemory(MemDB),
    #[cfg(feature = "rocksdb")]
    RocksDb(RocksDB),
}

impl Store {
    pub fn open(config: &StoreConfig) -> Result<Store, StoreIOError> {
        match config {
            StoreConfig::InMemory => Ok(Store::InMemory(MemDB::new())),
            #[cfg(feature = "rocksdb")]
            StoreConfig::RocksDb { path } => Ok(Store::RocksDb(RocksDB::open(path)?)),
            #[cfg(not(feature = "rocksdb"))]
            StoreConfig::RocksDb { path } => Err(StoreIOError::new(format!(
                "cannot open {}: built without the `rocksdb` feature",
                path.display()
            ))),
        }
    }
}

impl KVStore for Store {
    type WriteBatch = StoreWriteBatch;

    fn write(&mut self, wb: Self::WriteBatch) -> Result<(), StoreIOError> {
        match self {
            Store::InMemory(db) => db.write(wb.replay()),
            #[cfg(feature = "rocksdb")]
            Store::RocksDb(db) => db.write(wb.replay()),
        }
    }

    fn clear(&mut self) -> Result<(), StoreIOError> {
        match self {
            Store::InMemory(db) => db.clear(),
            #[cfg(feature = "rocksdb")]
            Store::RocksDb(db) => db.clear(),
        }
    }
}

impl KVGet for Store {
    fn get(&self, key: &[u8]) -> Result<Option<Vec<u8>>, StoreIOError> {
        match self {
            Store::InMemory(db) => db.get(key),
            #[cfg(feature = "rocksdb")]
            Store::RocksDb(db) => db.get(key),
        }
    }

    fn get_prefix_with_keys(&self, prefix: &[u8]) -> Result<Vec<(Vec<u8>, Vec<u8>)>, StoreIOError> {
        match self {
            Store::InMemory(db) => db.get_prefix_with_keys(prefix),
            #[cfg(feature = "rocksdb")]
            Store::RocksDb(db) => db.get_prefix_with_keys(prefix),
        }
    }
}

/// Backend-agnostic batch. Operations are recorded in order and replayed into the chosen backend's
/// native batch on write.
pub struct StoreWriteBatch {
    ops: Vec<(Vec<u8>, Option<Vec<u8>>)>,
}

impl StoreWriteBatch {
    fn replay<W: WriteBatch>(self) -> W {
        let mut wb = W::new();
        for (key, value) in self.ops {
            match value {
                Some(value) => wb.set(&key, &value),
                None => wb.delete(&key),
            }
        }
        wb
    }
}

impl WriteBatch for StoreWriteBatch {
    fn new() -> Self {
        StoreWriteBatch { ops: Vec::new() }
    }

    fn set(&mut self, key: &[u8], value: &[u8]) {
        self.ops.push((key.to_vec(), Some(value.to_vec())));
    }

    fn delete(&mut self, key: &[u8]) {
        self.ops.push((key.to_vec(), None));
    }

    fn len(&self) -> usize {
        self.ops.len()
    }
}
