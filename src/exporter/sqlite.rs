/*
    Copyright © 2023, ParallelChain Lab
    Licensed under the Apache License, Version 2.0: http://www.apache.org/licenses/LICENSE-2.0
*/

use std::{path::Path, sync::Mutex};

use rusqlite::{params, Connection, OptionalExtension};

use crate::types::data_types::{Address, AddressId, ClusterId};

use super::{ClusterRow, ClusterSink, SinkError};

const SCHEMA: &str = "
    CREATE TABLE IF NOT EXISTS clusters (
        cluster_id INTEGER NOT NULL,
        address TEXT NOT NULL,
        PRIMARY KEY (cluster_id, address)
    );
    CREATE INDEX IF NOT EXISTS clusters_address ON clusters (address);
";

/// [`ClusterSink`] backed by a SQLite database with a single `clusters` table.
///
/// Writers share one connection, so batches written by different export workers are serialized, each
/// in its own transaction.
pub struct SqliteSink {
    connection: Mutex<Connection>,
}

impl SqliteSink {
    /// Open (or create) the database at `path` and make sure the `clusters` table exists.
    pub fn open(path: impl AsRef<Path>) -> Result<SqliteSink, SinkError> {
        let connection = Connection::open(path)?;
        connection.execute_batch("PRAGMA journal_mode=WAL; PRAGMA synchronous=NORMAL;")?;
        Self::with_connection(connection)
    }

    pub fn open_in_memory() -> Result<SqliteSink, SinkError> {
        Self::with_connection(Connection::open_in_memory()?)
    }

    fn with_connection(connection: Connection) -> Result<SqliteSink, SinkError> {
        connection.execute_batch(SCHEMA)?;
        Ok(SqliteSink {
            connection: Mutex::new(connection),
        })
    }

    /// Cluster that `address` was exported into, if any.
    pub fn cluster_of(&self, address: &Address) -> Result<Option<ClusterId>, SinkError> {
        let connection = self.connection.lock().unwrap();
        let cluster_id: Option<i64> = connection
            .query_row(
                "SELECT cluster_id FROM clusters WHERE address = ?1",
                params![address.as_str()],
                |row| row.get(0),
            )
            .optional()?;
        Ok(cluster_id.map(|id| AddressId::new(id as u64)))
    }

    /// Number of rows in the `clusters` table.
    pub fn len(&self) -> Result<u64, SinkError> {
        let connection = self.connection.lock().unwrap();
        let count: i64 = connection.query_row("SELECT COUNT(*) FROM clusters", [], |row| row.get(0))?;
        Ok(count as u64)
    }

    pub fn is_empty(&self) -> Result<bool, SinkError> {
        Ok(self.len()? == 0)
    }
}

impl ClusterSink for SqliteSink {
    fn insert_if_absent(&self, rows: &[ClusterRow]) -> Result<(), SinkError> {
        let mut connection = self.connection.lock().unwrap();
        let transaction = connection.transaction()?;
        {
            let mut statement = transaction.prepare_cached(
                "INSERT OR IGNORE INTO clusters (cluster_id, address) VALUES (?1, ?2)",
            )?;
            for row in rows {
                statement.execute(params![row.cluster_id.int() as i64, row.address.as_str()])?;
            }
        }
        transaction.commit()?;
        Ok(())
    }
}
