//! Types shared by the disjoint-set, the clusterizer, and the exporter.
//!
//! [`data_types`] holds the small newtypes that only exist to carry bytes or integers around, while
//! [`chain`] holds the block and transaction shapes that a [`Ledger`](crate::ledger::Ledger) hands out.

pub mod data_types;

pub mod chain;
