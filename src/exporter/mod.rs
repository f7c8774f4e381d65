/*
    Copyright © 2023, ParallelChain Lab
    Licensed under the Apache License, Version 2.0: http://www.apache.org/licenses/LICENSE-2.0
*/

//! Writing the final address-to-cluster mapping out of the disjoint-set.
//!
//! Exporting first [finalizes](crate::disjoint_set::DisjointSet::finalize) the disjoint-set, so that
//! every id's parent is its cluster's root, and then emits one `(address, cluster_id)` row per
//! registered address, where the cluster id is the root's [`AddressId`]. Rows go to one of two
//! destinations, selected by [`ExportMode`]:
//! - A CSV file with header-less `address,cluster_id` lines, written sequentially in id order.
//! - A [`ClusterSink`], e.g., the relational [`SqliteSink`]. Rows are split into batches that are
//!   written concurrently by a [worker pool](crate::worker_pool). Sinks insert rows only if they are
//!   absent, so exporting the same partition twice is harmless.

use std::{
    error::Error,
    fmt::Display,
    fs::File,
    io::{self, BufWriter, Write},
    path::{Path, PathBuf},
    sync::{mpsc::Sender, Arc},
    time::SystemTime,
};

use crate::{
    disjoint_set::{pluggables::KVStore, DisjointSet},
    events::*,
    types::data_types::{Address, AddressId, ClusterId},
    worker_pool::{WorkerError, WorkerPool},
};

mod sqlite;
pub use sqlite::SqliteSink;

/// Where [`Exporter::finalize_and_export`] writes its rows.
#[derive(Clone)]
pub enum ExportMode {
    Csv(PathBuf),
    Sink(Arc<dyn ClusterSink>),
}

/// One row of the export: `address` belongs to the cluster whose root is `cluster_id`.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct ClusterRow {
    pub cluster_id: ClusterId,
    pub address: Address,
}

/// A relational destination for cluster rows, keyed by `(cluster_id, address)`.
pub trait ClusterSink: Send + Sync + 'static {
    /// Insert every row in `rows` whose key is not in the sink yet. Rows that are already present are
    /// skipped without error.
    fn insert_if_absent(&self, rows: &[ClusterRow]) -> Result<(), SinkError>;
}

pub struct Exporter {
    worker_count: usize,
    batch_size: usize,
    event_publisher: Option<Sender<Event>>,
}

impl Exporter {
    /// Create an exporter that writes into sinks with `worker_count` threads, `batch_size` rows per
    /// write.
    pub fn new(worker_count: usize, batch_size: usize) -> Exporter {
        Exporter {
            worker_count,
            batch_size: batch_size.max(1),
            event_publisher: None,
        }
    }

    pub(crate) fn with_event_publisher(mut self, event_publisher: Option<Sender<Event>>) -> Exporter {
        self.event_publisher = event_publisher;
        self
    }

    /// Finalize `disjoint_set` and write one row per registered address to `mode`'s destination.
    /// Returns the number of addresses exported, which is the disjoint-set's size.
    pub fn finalize_and_export<K: KVStore>(
        &self,
        disjoint_set: &mut DisjointSet<K>,
        mode: &ExportMode,
    ) -> Result<u64, ExportError> {
        disjoint_set.finalize();
        Event::publish(
            &self.event_publisher,
            Event::Finalize(FinalizeEvent {
                timestamp: SystemTime::now(),
                size: disjoint_set.size(),
            }),
        );

        let rows = cluster_rows(disjoint_set);
        let addresses = rows.len() as u64;
        let clusters = (0..disjoint_set.size())
            .map(AddressId::new)
            .filter(|id| disjoint_set.parent(*id) == Some(*id))
            .count() as u64;

        let destination = match mode {
            ExportMode::Csv(path) => {
                write_csv(&rows, path).map_err(|err| {
                    log::error!("failed to export to {}: {}", path.display(), err);
                    err
                })?;
                path.display().to_string()
            }
            ExportMode::Sink(sink) => {
                self.write_sink(rows, sink).map_err(|err| {
                    log::error!("failed to export to sink: {}", err);
                    err
                })?;
                String::from("sink")
            }
        };

        Event::publish(
            &self.event_publisher,
            Event::Export(ExportEvent {
                timestamp: SystemTime::now(),
                destination,
                addresses,
                clusters,
            }),
        );

        Ok(addresses)
    }

    fn write_sink(&self, rows: Vec<ClusterRow>, sink: &Arc<dyn ClusterSink>) -> Result<(), ExportError> {
        let worker_pool: WorkerPool<SinkError> = WorkerPool::new(self.worker_count);
        let mut rows = rows.into_iter().peekable();
        while rows.peek().is_some() {
            let batch: Vec<ClusterRow> = rows.by_ref().take(self.batch_size).collect();
            let sink = Arc::clone(sink);
            worker_pool.submit(Box::new(move || sink.insert_if_absent(&batch)))?;
        }
        worker_pool.close()?;
        Ok(())
    }
}

// Rows in id order. Assumes the disjoint-set was finalized, so every parent pointer is a root.
fn cluster_rows<K: KVStore>(disjoint_set: &DisjointSet<K>) -> Vec<ClusterRow> {
    let mut rows: Vec<(AddressId, ClusterRow)> = disjoint_set
        .addresses()
        .filter_map(|(address, id)| {
            let cluster_id = disjoint_set.parent(*id)?;
            Some((
                *id,
                ClusterRow {
                    cluster_id,
                    address: address.clone(),
                },
            ))
        })
        .collect();
    rows.sort_by_key(|(id, _)| *id);
    rows.into_iter().map(|(_, row)| row).collect()
}

fn write_csv(rows: &[ClusterRow], path: &Path) -> Result<(), ExportError> {
    let mut writer = BufWriter::new(File::create(path)?);
    for row in rows {
        writeln!(writer, "{},{}", row.address, row.cluster_id)?;
    }
    writer.flush()?;
    Ok(())
}

/// Error reported by a [`ClusterSink`].
#[derive(Debug)]
pub struct SinkError {
    source: Box<dyn Error + Send + Sync + 'static>,
}

impl SinkError {
    pub fn new(source: impl Into<Box<dyn Error + Send + Sync + 'static>>) -> SinkError {
        SinkError {
            source: source.into(),
        }
    }
}

impl From<rusqlite::Error> for SinkError {
    fn from(value: rusqlite::Error) -> Self {
        SinkError::new(value)
    }
}

impl Display for SinkError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "sink error: {}", self.source)
    }
}

impl Error for SinkError {
    fn source(&self) -> Option<&(dyn Error + 'static)> {
        Some(self.source.as_ref())
    }
}

/// Errors that abort an export.
#[derive(Debug)]
pub enum ExportError {
    /// Creating or writing the CSV file failed.
    Io(io::Error),
    /// Writing a batch of rows into the sink failed.
    Worker(WorkerError<SinkError>),
}

impl From<io::Error> for ExportError {
    fn from(value: io::Error) -> Self {
        ExportError::Io(value)
    }
}

impl From<WorkerError<SinkError>> for ExportError {
    fn from(value: WorkerError<SinkError>) -> Self {
        ExportError::Worker(value)
    }
}

impl Display for ExportError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            ExportError::Io(err) => write!(f, "export I/O error: {}", err),
            ExportError::Worker(err) => write!(f, "{}", err),
        }
    }
}

impl Error for ExportError {}
