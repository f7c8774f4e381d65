/*
    Copyright © 2023, ParallelChain Lab
    Licensed under the Apache License, Version 2.0: http://www.apache.org/licenses/LICENSE-2.0
*/

use std::{
    collections::HashSet,
    error::Error,
    fmt::Display,
    sync::{mpsc::Sender, Arc, Mutex, PoisonError},
    thread::JoinHandle,
    time::SystemTime,
};

use crate::{
    disjoint_set::{pluggables::KVStore, DisjointSet, DisjointSetError, DisjointSetWriteBatch},
    events::*,
    exporter::{ExportError, ExportMode, Exporter},
    ledger::{Ledger, LedgerError},
    types::{
        chain::OutPoint,
        data_types::{Address, BlockHeight, TxId},
    },
    worker_pool::{Job, WorkerError, WorkerPool},
};

use super::config::Configuration;

/// Where the clusterizer is in its walk over the ledger.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum ClusterizerState {
    /// Nothing is in progress. The next step reads the ledger's tip and decides where to go.
    Idle,
    /// The next step applies the heuristic to every transaction of the block at this height.
    ProcessingBlock(BlockHeight),
    /// The block at this height was processed. The next step flushes its merges with the height.
    CheckpointingHeight(BlockHeight),
    /// Every block up to the ledger's tip has been checkpointed.
    Done,
}

/// A handle to a running clusterizer. When this value is dropped, the event bus thread and the worker
/// pool are shut down after handling what was already published or submitted.
pub struct Clusterizer<K: KVStore, L: Ledger> {
    disjoint_set: DisjointSet<K>,
    ledger: Arc<L>,
    worker_pool: WorkerPool<LedgerError>,
    configuration: Configuration,
    state: ClusterizerState,
    // Merges of the block that was processed but not yet checkpointed.
    pending_write_batch: Option<DisjointSetWriteBatch<K::WriteBatch>>,
    // Set when a step failed after the in-memory disjoint-set may have moved past the store.
    stale: bool,
    event_publisher: Option<Sender<Event>>,
    event_bus: Option<JoinHandle<()>>,
}

impl<K: KVStore, L: Ledger> Clusterizer<K, L> {
    pub(super) fn new(
        disjoint_set: DisjointSet<K>,
        ledger: L,
        configuration: Configuration,
        event_publisher: Option<Sender<Event>>,
        event_bus: Option<JoinHandle<()>>,
    ) -> Self {
        Clusterizer {
            disjoint_set,
            ledger: Arc::new(ledger),
            worker_pool: WorkerPool::new(configuration.worker_count),
            configuration,
            state: ClusterizerState::Idle,
            pending_write_batch: None,
            stale: false,
            event_publisher,
            event_bus,
        }
    }

    pub fn state(&self) -> ClusterizerState {
        self.state
    }

    pub fn disjoint_set(&self) -> &DisjointSet<K> {
        &self.disjoint_set
    }

    pub fn ledger(&self) -> &L {
        &self.ledger
    }

    /// Perform one transition of the state machine and return the state it led to.
    ///
    /// If the transition fails, the clusterizer goes back to [`Idle`](ClusterizerState::Idle) and the
    /// next call restores the disjoint-set from its last checkpoint before continuing.
    pub fn step(&mut self) -> Result<ClusterizerState, ClusterizerError> {
        let result = match self.state {
            ClusterizerState::Idle => self.resume(),
            ClusterizerState::ProcessingBlock(height) => self
                .process_block(height)
                .map(|_| ClusterizerState::CheckpointingHeight(height)),
            ClusterizerState::CheckpointingHeight(height) => self
                .checkpoint(height)
                .and_then(|_| self.next_state_after(Some(height))),
            ClusterizerState::Done => Ok(ClusterizerState::Done),
        };

        match result {
            Ok(next_state) => {
                self.state = next_state;
                Ok(next_state)
            }
            Err(err) => {
                if matches!(
                    self.state,
                    ClusterizerState::ProcessingBlock(_) | ClusterizerState::CheckpointingHeight(_)
                ) {
                    self.stale = true;
                }
                self.pending_write_batch = None;
                self.state = ClusterizerState::Idle;
                Err(err)
            }
        }
    }

    /// Step until every block up to the ledger's tip has been checkpointed, and return the height of
    /// the last checkpoint. This is `None` only if the ledger has no blocks.
    pub fn run(&mut self) -> Result<Option<BlockHeight>, ClusterizerError> {
        while self.step()? != ClusterizerState::Done {}
        Ok(self.disjoint_set.height())
    }

    /// Compress every path in the disjoint-set and write the address-to-cluster mapping out to the
    /// destination named by `mode`. Returns the number of addresses exported.
    ///
    /// This can be called in any state, but the export only reflects checkpointed blocks if it is
    /// called once [`run`](Self::run) returns.
    pub fn finalize_and_export(&mut self, mode: &ExportMode) -> Result<u64, ExportError> {
        Exporter::new(
            self.configuration.worker_count,
            self.configuration.export_batch_size,
        )
        .with_event_publisher(self.event_publisher.clone())
        .finalize_and_export(&mut self.disjoint_set, mode)
    }

    fn resume(&mut self) -> Result<ClusterizerState, ClusterizerError> {
        if self.stale {
            if let Err(err) = self.disjoint_set.restore() {
                log::error!("failed to restore the disjoint-set: {}", err);
                return Err(err.into());
            }
            self.stale = false;
            match self.disjoint_set.height() {
                Some(height) => log::warn!(
                    "rolled back to the checkpoint at height {} after a failed step",
                    height
                ),
                None => log::warn!("rolled back to the empty disjoint-set after a failed step"),
            }
            Event::publish(
                &self.event_publisher,
                Event::Restore(RestoreEvent {
                    timestamp: SystemTime::now(),
                    height: self.disjoint_set.height(),
                    size: self.disjoint_set.size(),
                }),
            );
        }

        self.next_state_after(self.disjoint_set.height())
    }

    // `checkpointed` is `None` when no block was ever checkpointed, in which case the walk starts at
    // the genesis block.
    fn next_state_after(
        &self,
        checkpointed: Option<BlockHeight>,
    ) -> Result<ClusterizerState, ClusterizerError> {
        let next = checkpointed.map_or(BlockHeight::new(0), |height| height + 1);
        let tip = self.ledger.last_block_height().map_err(|err| {
            log::error!("failed to read the ledger's tip before height {}: {}", next, err);
            err
        })?;

        if next <= tip {
            Ok(ClusterizerState::ProcessingBlock(next))
        } else {
            Event::publish(
                &self.event_publisher,
                Event::CaughtUp(CaughtUpEvent {
                    timestamp: SystemTime::now(),
                    height: checkpointed,
                }),
            );
            Ok(ClusterizerState::Done)
        }
    }

    fn process_block(&mut self, height: BlockHeight) -> Result<(), ClusterizerError> {
        let block = self.ledger.block_at_height(height).map_err(|err| {
            log::error!("failed to read block at height {}: {}", height, err);
            err
        })?;

        Event::publish(
            &self.event_publisher,
            Event::StartBlock(StartBlockEvent {
                timestamp: SystemTime::now(),
                height,
                block: block.hash,
                transactions: block.tx_ids.len(),
            }),
        );

        let mut write_batch = self.disjoint_set.new_write_batch();
        for tx_id in &block.tx_ids {
            self.process_transaction(&mut write_batch, tx_id)
                .map_err(|err| {
                    log::error!(
                        "failed to process transaction {} at height {}: {}",
                        tx_id,
                        height,
                        err
                    );
                    err
                })?;
        }

        self.pending_write_batch = Some(write_batch);
        Ok(())
    }

    fn process_transaction(
        &mut self,
        write_batch: &mut DisjointSetWriteBatch<K::WriteBatch>,
        tx_id: &TxId,
    ) -> Result<(), ClusterizerError> {
        let mut addresses = self.input_addresses(tx_id)?;
        addresses.sort();

        for address in &addresses {
            self.disjoint_set.make_set(write_batch, address)?;
        }

        // A transaction spending from at most one address says nothing about common ownership.
        if let Some((anchor, others)) = addresses.split_first() {
            for other in others {
                self.disjoint_set.union(write_batch, anchor, other)?;
            }
        }

        Ok(())
    }

    /// Resolve every non-coinbase input of the transaction to the address that owned the output it
    /// spends. Inputs are resolved concurrently on the worker pool.
    fn input_addresses(&self, tx_id: &TxId) -> Result<Vec<Address>, ClusterizerError> {
        let transaction = self.ledger.transaction(tx_id)?;
        let addresses = Arc::new(Mutex::new(HashSet::new()));

        let jobs = transaction
            .inputs
            .into_iter()
            .filter(|input| !input.is_coinbase())
            .map(|input| {
                let ledger = Arc::clone(&self.ledger);
                let addresses = Arc::clone(&addresses);
                let job: Job<LedgerError> = Box::new(move || {
                    let OutPoint { tx_id, index } = input.previous_output;
                    let previous = ledger.transaction(&tx_id)?;
                    let output = previous
                        .outputs
                        .get(index as usize)
                        .ok_or(LedgerError::OutputNotFound { tx_id, index })?;
                    if let Some(address) = &output.address {
                        addresses
                            .lock()
                            .unwrap_or_else(PoisonError::into_inner)
                            .insert(address.clone());
                    }
                    Ok(())
                });
                job
            });
        self.worker_pool.execute_all(jobs)?;

        let addresses = addresses
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .drain()
            .collect();
        Ok(addresses)
    }

    fn checkpoint(&mut self, height: BlockHeight) -> Result<(), ClusterizerError> {
        let mut write_batch = self
            .pending_write_batch
            .take()
            .unwrap_or_else(|| self.disjoint_set.new_write_batch());
        self.disjoint_set.set_height(&mut write_batch, height)?;
        let writes = write_batch.len();

        if let Err(err) = self.disjoint_set.flush(write_batch) {
            log::error!("failed to checkpoint height {}: {}", height, err);
            return Err(err.into());
        }

        Event::publish(
            &self.event_publisher,
            Event::Checkpoint(CheckpointEvent {
                timestamp: SystemTime::now(),
                height,
                size: self.disjoint_set.size(),
                writes,
            }),
        );
        Ok(())
    }
}

impl<K: KVStore, L: Ledger> Drop for Clusterizer<K, L> {
    fn drop(&mut self) {
        // The event bus exits once its last publisher is gone and every pending event is handled.
        drop(self.event_publisher.take());
        if let Some(event_bus) = self.event_bus.take() {
            let _ = event_bus.join();
        }
    }
}

/// Errors that abort a [`Clusterizer::step`].
#[derive(Debug)]
pub enum ClusterizerError {
    DisjointSet(DisjointSetError),
    Ledger(LedgerError),
    /// Resolving one of a transaction's inputs failed.
    Worker(WorkerError<LedgerError>),
}

impl From<DisjointSetError> for ClusterizerError {
    fn from(value: DisjointSetError) -> Self {
        ClusterizerError::DisjointSet(value)
    }
}

impl From<LedgerError> for ClusterizerError {
    fn from(value: LedgerError) -> Self {
        ClusterizerError::Ledger(value)
    }
}

impl From<WorkerError<LedgerError>> for ClusterizerError {
    fn from(value: WorkerError<LedgerError>) -> Self {
        ClusterizerError::Worker(value)
    }
}

impl Display for ClusterizerError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            ClusterizerError::DisjointSet(err) => write!(f, "disjoint-set error: {}", err),
            ClusterizerError::Ledger(err) => write!(f, "ledger error: {}", err),
            ClusterizerError::Worker(err) => write!(f, "input resolution error: {}", err),
        }
    }
}

impl Error for ClusterizerError {}
