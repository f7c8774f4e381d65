/*
    Copyright © 2023, ParallelChain Lab
    Licensed under the Apache License, Version 2.0: http://www.apache.org/licenses/LICENSE-2.0
*/

use std::{sync::mpsc, time::SystemTime};

use typed_builder::TypedBuilder;

use crate::{
    disjoint_set::{pluggables::KVStore, DisjointSet},
    event_bus::*,
    events::*,
    ledger::{Ledger, LedgerError},
    worker_pool::WorkerPool,
};

use super::state_machine::{Clusterizer, ClusterizerError};

/// Stores the user-defined parameters of a clusterizer, that is:
/// 1. The number of threads in the worker pool that resolves transaction inputs, and later writes
///    the export into a sink.
/// 2. The number of addresses the in-memory disjoint-set should have room for before it grows.
/// 3. The number of rows written to an export sink in one job.
/// 4. The "Log Events" flag. If set to "true", the default loggers of [crate::logging] are registered.
///
/// ## Worker count
///
/// Resolving an input is a ledger read, so workers spend most of their time waiting on I/O. The
/// default is [`DEFAULT_WORKERS_PER_CORE`](crate::worker_pool::DEFAULT_WORKERS_PER_CORE) workers per
/// logical core.
#[derive(Clone, Debug, TypedBuilder)]
#[builder(builder_method(doc = "
    Create a builder for building a [Configuration]. On the builder call the following methods to construct a valid [Configuration].
    Optional:
    - `.worker_count(...)`
    - `.initial_capacity(...)`
    - `.export_batch_size(...)`
    - `.log_events(...)`
"))]
pub struct Configuration {
    #[builder(
        default = WorkerPool::<LedgerError>::default_worker_count(),
        setter(doc = "Set the number of worker threads. Defaults to 3 per logical core. Optional.")
    )]
    pub worker_count: usize,
    #[builder(
        default = 0,
        setter(doc = "Set the number of addresses to preallocate room for. Defaults to 0. Optional.")
    )]
    pub initial_capacity: usize,
    #[builder(
        default = 1024,
        setter(doc = "Set the number of rows per sink write during export. Defaults to 1024. Optional.")
    )]
    pub export_batch_size: usize,
    #[builder(default = true, setter(doc = "Enable logging? Defaults to true. Optional."))]
    pub log_events: bool,
}

impl Default for Configuration {
    fn default() -> Self {
        Configuration::builder().build()
    }
}

/// Stores all necessary parameters and trait implementations required to run the [Clusterizer].
#[derive(TypedBuilder)]
#[builder(builder_method(doc = "
    Create a builder for building a [ClusterizerSpec]. On the builder call the following methods to construct a valid [ClusterizerSpec].
    Required:
    - `.kv_store(...)`
    - `.ledger(...)`
    - `.configuration(...)`
    Optional:
    - `.on_restore(...)`
    - `.on_start_block(...)`
    - `.on_checkpoint(...)`
    - `.on_caught_up(...)`
    - `.on_finalize(...)`
    - `.on_export(...)`
"))]
pub struct ClusterizerSpec<K: KVStore, L: Ledger> {
    // Required parameters
    #[builder(setter(doc = "Set the key-value store that persists the disjoint-set. The argument must implement the [KVStore](crate::disjoint_set::pluggables::KVStore) trait. Required."))]
    kv_store: K,
    #[builder(setter(doc = "Set the reader of the chain to clusterize. The argument must implement the [Ledger](crate::ledger::Ledger) trait. Required."))]
    ledger: L,
    #[builder(setter(doc = "Set the [configuration](Configuration). Required."))]
    configuration: Configuration,

    // Optional parameters
    #[builder(default, setter(transform = |handler: impl Fn(&RestoreEvent) + Send + 'static| Some(Box::new(handler) as HandlerPtr<RestoreEvent>),
    doc = "Register a handler closure to be invoked after the disjoint-set is restored from the store. Optional."))]
    on_restore: Option<HandlerPtr<RestoreEvent>>,
    #[builder(default, setter(transform = |handler: impl Fn(&StartBlockEvent) + Send + 'static| Some(Box::new(handler) as HandlerPtr<StartBlockEvent>),
    doc = "Register a handler closure to be invoked when the clusterizer starts processing a block. Optional."))]
    on_start_block: Option<HandlerPtr<StartBlockEvent>>,
    #[builder(default, setter(transform = |handler: impl Fn(&CheckpointEvent) + Send + 'static| Some(Box::new(handler) as HandlerPtr<CheckpointEvent>),
    doc = "Register a handler closure to be invoked after a block's merges and height are flushed. Optional."))]
    on_checkpoint: Option<HandlerPtr<CheckpointEvent>>,
    #[builder(default, setter(transform = |handler: impl Fn(&CaughtUpEvent) + Send + 'static| Some(Box::new(handler) as HandlerPtr<CaughtUpEvent>),
    doc = "Register a handler closure to be invoked when the clusterizer reaches the ledger's tip. Optional."))]
    on_caught_up: Option<HandlerPtr<CaughtUpEvent>>,
    #[builder(default, setter(transform = |handler: impl Fn(&FinalizeEvent) + Send + 'static| Some(Box::new(handler) as HandlerPtr<FinalizeEvent>),
    doc = "Register a handler closure to be invoked after every path in the disjoint-set is compressed. Optional."))]
    on_finalize: Option<HandlerPtr<FinalizeEvent>>,
    #[builder(default, setter(transform = |handler: impl Fn(&ExportEvent) + Send + 'static| Some(Box::new(handler) as HandlerPtr<ExportEvent>),
    doc = "Register a handler closure to be invoked after the clusters are exported. Optional."))]
    on_export: Option<HandlerPtr<ExportEvent>>,
}

impl<K: KVStore, L: Ledger> ClusterizerSpec<K, L> {
    /// Restore the disjoint-set from the key-value store, start the event bus and the worker pool, and
    /// return a [Clusterizer] that is ready to be [stepped](Clusterizer::step) from its last checkpoint.
    pub fn start(self) -> Result<Clusterizer<K, L>, ClusterizerError> {
        let event_handlers = EventHandlers::new(
            self.configuration.log_events,
            self.on_restore,
            self.on_start_block,
            self.on_checkpoint,
            self.on_caught_up,
            self.on_finalize,
            self.on_export,
        );

        let (event_publisher, event_bus) = if !event_handlers.is_empty() {
            let (event_publisher, event_subscriber) = mpsc::channel();
            (
                Some(event_publisher),
                Some(start_event_bus(event_handlers, event_subscriber)),
            )
        } else {
            (None, None)
        };

        let mut disjoint_set =
            DisjointSet::with_capacity(self.kv_store, self.configuration.initial_capacity);
        if let Err(err) = disjoint_set.restore() {
            log::error!("failed to restore the disjoint-set: {}", err);
            return Err(err.into());
        }

        Event::publish(
            &event_publisher,
            Event::Restore(RestoreEvent {
                timestamp: SystemTime::now(),
                height: disjoint_set.height(),
                size: disjoint_set.size(),
            }),
        );

        Ok(Clusterizer::new(
            disjoint_set,
            self.ledger,
            self.configuration,
            event_publisher,
            event_bus,
        ))
    }
}
