/*
    Copyright © 2023, ParallelChain Lab
    Licensed under the Apache License, Version 2.0: http://www.apache.org/licenses/LICENSE-2.0
*/

//! Definitions of the events emitted while clustering and exporting.
//!
//! An event for a given action indicates that the action has been completed. Events are published on
//! a channel by the clusterizer's driver thread and handled on a separate [event bus](crate::event_bus)
//! thread, so handlers never slow down clustering directly.
//!
//! Handlers can be registered by library users through the `on_*` setters of
//! [`ClusterizerSpec`](crate::clusterizer::ClusterizerSpec). If
//! [`log_events`](crate::clusterizer::Configuration::log_events) is set, the default
//! [loggers](crate::logging) are registered as well.

use std::{sync::mpsc::Sender, time::SystemTime};

use crate::types::data_types::{BlockHeight, CryptoHash};

pub enum Event {
    // Events that change the persistent state.
    Restore(RestoreEvent),
    Checkpoint(CheckpointEvent),
    // Events of the block walk.
    StartBlock(StartBlockEvent),
    CaughtUp(CaughtUpEvent),
    // Events of the export.
    Finalize(FinalizeEvent),
    Export(ExportEvent),
}

impl Event {
    pub(crate) fn publish(event_publisher: &Option<Sender<Event>>, event: Event) {
        if let Some(event_publisher) = event_publisher {
            // The bus only goes away while the publisher itself is being dropped.
            let _ = event_publisher.send(event);
        }
    }
}

/// The disjoint-set was rebuilt from the backing store. `height` is `None` if no block had been
/// checkpointed.
pub struct RestoreEvent {
    pub timestamp: SystemTime,
    pub height: Option<BlockHeight>,
    pub size: u64,
}

/// The clusterizer started processing the block at `height`.
pub struct StartBlockEvent {
    pub timestamp: SystemTime,
    pub height: BlockHeight,
    pub block: CryptoHash,
    pub transactions: usize,
}

/// A block's merges and its height were flushed to the backing store together.
pub struct CheckpointEvent {
    pub timestamp: SystemTime,
    pub height: BlockHeight,
    pub size: u64,
    /// Number of write operations in the flushed batch.
    pub writes: usize,
}

/// The clusterizer reached the ledger's tip.
pub struct CaughtUpEvent {
    pub timestamp: SystemTime,
    pub height: Option<BlockHeight>,
}

/// Every id in the disjoint-set now points directly at its root.
pub struct FinalizeEvent {
    pub timestamp: SystemTime,
    pub size: u64,
}

/// The address-to-cluster mapping was written out.
pub struct ExportEvent {
    pub timestamp: SystemTime,
    /// Where the rows went, e.g., a file path, or `sink`.
    pub destination: String,
    pub addresses: u64,
    pub clusters: u64,
}
