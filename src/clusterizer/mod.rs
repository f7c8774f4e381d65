/*
    Copyright © 2023, ParallelChain Lab
    Licensed under the Apache License, Version 2.0: http://www.apache.org/licenses/LICENSE-2.0
*/

//! Methods to build, start, and drive a clusterizer.
//!
//! A clusterizer walks the ledger block by block and applies the common-input-ownership heuristic:
//! all addresses that fund the inputs of one transaction are assumed to be controlled by the same
//! entity, and are therefore merged into one cluster of the [disjoint-set](crate::disjoint_set).
//!
//! The key components of this module are:
//! - The builder-pattern interface to construct a [specification of the clusterizer](ClusterizerSpec),
//! - The function to [start](ClusterizerSpec::start) a [Clusterizer] given its specification,
//! - The [state machine](ClusterizerState) that [`Clusterizer::step`] advances one transition at a
//!   time.
//!
//! ## Starting a clusterizer
//!
//! ```ignore
//! let mut clusterizer =
//!     ClusterizerSpec::builder()
//!     .kv_store(kv_store)
//!     .ledger(ledger)
//!     .configuration(configuration)
//!     .on_checkpoint(checkpoint_handler)
//!     .build()
//!     .start()?;
//!
//! clusterizer.run()?;
//! let exported = clusterizer.finalize_and_export(&ExportMode::Csv(path))?;
//! ```
//!
//! ### Required setters
//!
//! - `.kv_store(...)`
//! - `.ledger(...)`
//! - `.configuration(...)`
//!
//! ### Optional setters
//!
//! The optional setters are for registering user-defined event handlers for events from
//! [crate::events]:
//! - `.on_restore(...)`
//! - `.on_start_block(...)`
//! - `.on_checkpoint(...)`
//! - `.on_caught_up(...)`
//! - `.on_finalize(...)`
//! - `.on_export(...)`
//!
//! ## Checkpoints and restarts
//!
//! Every block's merges are flushed together with the block's height in a single write batch, so the
//! persisted partition and the persisted height always move together. A clusterizer started on a store
//! whose last checkpoint is `h` resumes at block `h + 1`. On a store without any checkpoint it starts
//! at block 0.
//!
//! If a step fails midway through a block, the in-memory disjoint-set may be ahead of the store. The
//! next call to [`step`](Clusterizer::step) restores it from the store before reprocessing the block.

mod config;
pub use config::{ClusterizerSpec, Configuration};

mod state_machine;
pub use state_machine::{Clusterizer, ClusterizerError, ClusterizerState};
