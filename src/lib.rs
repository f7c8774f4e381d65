//! A resumable implementation of the common-input-ownership heuristic for clustering blockchain
//! addresses. It offers:
//! 1. A [persistent union-find](disjoint_set) whose every change is staged into write batches and
//!    checkpointed block by block into a pluggable [key-value store](stores),
//! 2. A [clusterizer](clusterizer) state machine that walks any [ledger] implementation and resumes
//!    from its last checkpoint after a crash,
//! 3. A bounded [worker pool](worker_pool) that resolves transaction inputs concurrently,
//! 4. and an [exporter] that writes the final address-to-cluster mapping to a CSV file or a
//!    relational sink.

pub mod types;

pub mod disjoint_set;

pub mod stores;

pub mod ledger;

pub mod worker_pool;

pub mod clusterizer;

pub mod exporter;

pub mod events;

pub(crate) mod event_bus;

pub mod logging;
