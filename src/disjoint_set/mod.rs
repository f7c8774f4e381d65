//! The persistent state of the clusterizer.
//!
//! # The Disjoint-Set
//!
//! The disjoint-set (a.k.a. union-find) partitions every address seen as a transaction input into
//! clusters. Each registered [`Address`](crate::types::data_types::Address) is assigned a dense
//! [`AddressId`](crate::types::data_types::AddressId), and the partition is stored as a forest over
//! those ids: `parent[id]` points towards the root of the id's tree, and two addresses are in the same
//! cluster if and only if their trees share a root.
//!
//! The usual two heuristics keep the trees shallow:
//! 1. **Path compression**: [`find`](DisjointSet::find) rewrites every node it walks through to point
//!    directly at the root.
//! 2. **Union by rank**: [`union`](DisjointSet::union) attaches the root with the lower rank under the
//!    root with the higher rank, so trees only grow taller when two equally-ranked trees meet.
//!
//! # Pluggable persistence
//!
//! - Every structural change is mirrored into a [`DisjointSetWriteBatch`] owned by the caller.
//! - The batch becomes durable when it is passed to [`flush`](DisjointSet::flush), which writes it to
//!   the backing [`KVStore`](pluggables::KVStore) in one bulk operation.
//! - The height checkpoint travels in the same batch as the block's merges, so after a crash,
//!   [`restore`](DisjointSet::restore) yields the exact state as of the last checkpointed block.
//! - The layout of every variable in the store is documented in [`variables`].

pub mod pluggables;

pub mod variables;

mod forest;
pub use forest::{DisjointSet, DisjointSetError};

mod write_batch;
pub use write_batch::{DisjointSetWriteBatch, KVSetError};
