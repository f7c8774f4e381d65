//! Embedded, on-disk implementation of [`KVStore`] backed by RocksDB.
//!
//! Enabled with the `rocksdb` feature.

use std::{path::Path, sync::Arc};

use rocksdb::{DBWithThreadMode, Direction, IteratorMode, MultiThreaded, Options, WriteOptions};

use crate::disjoint_set::pluggables::{KVGet, KVStore, StoreIOError, WriteBatch};

/// A [`KVStore`] over a RocksDB database. Clones share the same open database.
#[derive(Clone)]
pub struct RocksDB {
    db: Arc<DBWithThreadMode<MultiThreaded>>,
}

impl RocksDB {
    /// Open or create a database at `path`.
    pub fn open<P: AsRef<Path>>(path: P) -> Result<RocksDB, StoreIOError> {
        let path = path.as_ref();
        log::info!("Opening RocksDB store at {}", path.display());

        let mut opts = Options::default();
        opts.create_if_missing(true);
        // Each flush is one large batch of small keys.
        opts.set_write_buffer_size(64 * 1024 * 1024);
        opts.increase_parallelism(num_cpus::get() as i32);

        let db = DBWithThreadMode::<MultiThreaded>::open(&opts, path).map_err(StoreIOError::new)?;
        Ok(RocksDB { db: Arc::new(db) })
    }
}

impl KVStore for RocksDB {
    type WriteBatch = RocksWriteBatch;

    fn write(&mut self, wb: Self::WriteBatch) -> Result<(), StoreIOError> {
        let mut write_opts = WriteOptions::default();
        write_opts.set_sync(true);
        self.db.write_opt(wb.batch, &write_opts).map_err(StoreIOError::new)
    }

    fn clear(&mut self) -> Result<(), StoreIOError> {
        let mut batch = rocksdb::WriteBatch::default();
        for item in self.db.iterator(IteratorMode::Start) {
            let (key, _) = item.map_err(StoreIOError::new)?;
            batch.delete(key);
        }
        self.db.write(batch).map_err(StoreIOError::new)
    }
}

impl KVGet for RocksDB {
    fn get(&self, key: &[u8]) -> Result<Option<Vec<u8>>, StoreIOError> {
        self.db.get(key).map_err(StoreIOError::new)
    }

    fn get_prefix_with_keys(&self, prefix: &[u8]) -> Result<Vec<(Vec<u8>, Vec<u8>)>, StoreIOError> {
        let mut pairs = Vec::new();
        for item in self
            .db
            .iterator(IteratorMode::From(prefix, Direction::Forward))
        {
            let (key, value) = item.map_err(StoreIOError::new)?;
            if !key.starts_with(prefix) {
                break;
            }
            pairs.push((key.to_vec(), value.to_vec()));
        }
        Ok(pairs)
    }
}

pub struct RocksWriteBatch {
    batch: rocksdb::WriteBatch,
}

impl WriteBatch for RocksWriteBatch {
    fn new() -> Self {
        RocksWriteBatch {
            batch: rocksdb::WriteBatch::default(),
        }
    }

    fn set(&mut self, key: &[u8], value: &[u8]) {
        self.batch.put(key, value);
    }

    fn delete(&mut self, key: &[u8]) {
        self.batch.delete(key);
    }

    fn len(&self) -> usize {
        self.batch.len()
    }
}
