/*
    Copyright © 2023, ParallelChain Lab
    Licensed under the Apache License, Version 2.0: http://www.apache.org/licenses/LICENSE-2.0
*/

//! Array-backed union-find whose every mutation is mirrored into a [`DisjointSetWriteBatch`].
//!
//! # Initializing the disjoint-set
//!
//! A `DisjointSet` is created empty with [`new`](DisjointSet::new) or
//! [`with_capacity`](DisjointSet::with_capacity) on top of a key-value store, and then brought up to
//! date with the store's contents with [`restore`](DisjointSet::restore). Restoring a store that has
//! never been flushed to yields the empty disjoint-set with no checkpointed height.
//!
//! # Reading the partition
//!
//! [`find`](DisjointSet::find) compresses paths and therefore needs `&mut self` and a write batch.
//! Readers that only need to know which cluster an address is in can use
//! [`cluster_of`](DisjointSet::cluster_of), which walks parent pointers without changing them. After
//! [`finalize`](DisjointSet::finalize), every parent pointer is a root and `cluster_of` is O(1).

use std::{
    cmp::Ordering,
    collections::{hash_map, HashMap},
    error::Error,
    fmt::Display,
};

use crate::types::data_types::{Address, AddressId, BlockHeight, ClusterId};

use super::{
    pluggables::{KVGetError, KVStore, StoreIOError},
    write_batch::{DisjointSetWriteBatch, KVSetError},
};

pub struct DisjointSet<K: KVStore> {
    kv_store: K,
    size: u64,
    height: Option<BlockHeight>,
    parent: Vec<u64>,
    rank: Vec<u64>,
    address_to_id: HashMap<Address, AddressId>,
}

/// Lifecycle methods.
impl<K: KVStore> DisjointSet<K> {
    /// Create an empty `DisjointSet` on top of `kv_store`. Call [`restore`](Self::restore) before using
    /// it on a store that may already hold state.
    pub fn new(kv_store: K) -> Self {
        Self::with_capacity(kv_store, 0)
    }

    /// Create an empty `DisjointSet` whose in-memory arrays have room for `capacity` addresses before
    /// they need to grow.
    pub fn with_capacity(kv_store: K, capacity: usize) -> Self {
        DisjointSet {
            kv_store,
            size: 0,
            height: None,
            parent: Vec::with_capacity(capacity),
            rank: Vec::with_capacity(capacity),
            address_to_id: HashMap::with_capacity(capacity),
        }
    }

    /// Replace the in-memory state with the state persisted in the backing store.
    ///
    /// Absent height and size keys mean that nothing was ever flushed, and yield an empty disjoint-set
    /// without a checkpointed height. Any other missing or inconsistent variable is an error,
    /// including parent pointers that form a cycle.
    pub fn restore(&mut self) -> Result<(), DisjointSetError> {
        let height = self.kv_store.height()?;
        let size = self.kv_store.size()?.unwrap_or(0);

        let mut parent = Vec::with_capacity(size as usize);
        let mut rank = Vec::with_capacity(size as usize);
        for i in 0..size {
            let id = AddressId::new(i);
            let parent_id = self.kv_store.parent(id)?;
            if parent_id.int() >= size {
                return Err(DisjointSetError::InconsistentState(format!(
                    "parent of id {} is {}, but size is {}",
                    id, parent_id, size
                )));
            }
            parent.push(parent_id.int());
            rank.push(self.kv_store.rank(id)?);
        }
        check_acyclic(&parent)?;

        let mut address_to_id = HashMap::with_capacity(size as usize);
        for (address, id) in self.kv_store.address_ids()? {
            if id.int() >= size {
                return Err(DisjointSetError::InconsistentState(format!(
                    "address {} has id {}, but size is {}",
                    address, id, size
                )));
            }
            address_to_id.insert(address, id);
        }
        if address_to_id.len() as u64 != size {
            return Err(DisjointSetError::InconsistentState(format!(
                "{} addresses are registered, but size is {}",
                address_to_id.len(),
                size
            )));
        }

        self.height = height;
        self.size = size;
        self.parent = parent;
        self.rank = rank;
        self.address_to_id = address_to_id;
        Ok(())
    }

    /// Create an empty write batch for this disjoint-set's store.
    pub fn new_write_batch(&self) -> DisjointSetWriteBatch<K::WriteBatch> {
        DisjointSetWriteBatch::new()
    }

    /// Atomically write the changes in `write_batch` into the backing store.
    ///
    /// If the batch carries a [height checkpoint](DisjointSetWriteBatch::set_height), the in-memory
    /// height advances only once the write succeeded.
    pub fn flush(
        &mut self,
        write_batch: DisjointSetWriteBatch<K::WriteBatch>,
    ) -> Result<(), DisjointSetError> {
        let checkpoint = write_batch.height;
        self.kv_store.write(write_batch.inner)?;
        if checkpoint.is_some() {
            self.height = checkpoint;
        }
        Ok(())
    }

    /// Get a reference to the backing store.
    pub fn kv_store(&self) -> &K {
        &self.kv_store
    }

    /// Drop the in-memory state and give back the backing store.
    pub fn into_kv_store(self) -> K {
        self.kv_store
    }
}

/// Union-find operations.
impl<K: KVStore> DisjointSet<K> {
    /// Register `address`, returning its id. Registering an address twice is a no-op that returns the
    /// id assigned the first time.
    pub fn make_set(
        &mut self,
        write_batch: &mut DisjointSetWriteBatch<K::WriteBatch>,
        address: &Address,
    ) -> Result<AddressId, DisjointSetError> {
        if let Some(id) = self.address_to_id.get(address) {
            return Ok(*id);
        }

        let id = AddressId::new(self.size);
        write_batch.set_size(self.size + 1)?;
        write_batch.set_address_id(address, id)?;
        write_batch.set_parent(id, id)?;
        write_batch.set_rank(id, 0)?;

        self.parent.push(id.int());
        self.rank.push(0);
        self.address_to_id.insert(address.clone(), id);
        self.size += 1;

        Ok(id)
    }

    /// Get the id of the root of `address`'s tree, compressing the path to it on the way.
    pub fn find(
        &mut self,
        write_batch: &mut DisjointSetWriteBatch<K::WriteBatch>,
        address: &Address,
    ) -> Result<AddressId, DisjointSetError> {
        let id = self.registered_id(address)?;
        let (root, compressed) = self.compress_path(id);
        for node in compressed {
            write_batch.set_parent(node, root)?;
        }
        Ok(root)
    }

    /// Merge the clusters of `a` and `b`, returning the root of the merged cluster.
    ///
    /// On a rank tie, the root of `a`'s cluster survives and its rank grows by one.
    pub fn union(
        &mut self,
        write_batch: &mut DisjointSetWriteBatch<K::WriteBatch>,
        a: &Address,
        b: &Address,
    ) -> Result<AddressId, DisjointSetError> {
        let root_a = self.find(write_batch, a)?;
        let root_b = self.find(write_batch, b)?;
        if root_a == root_b {
            return Ok(root_a);
        }

        let (parent, child) = match self.rank[root_a.index()].cmp(&self.rank[root_b.index()]) {
            Ordering::Less => (root_b, root_a),
            Ordering::Greater => (root_a, root_b),
            Ordering::Equal => {
                self.rank[root_a.index()] += 1;
                write_batch.set_rank(root_a, self.rank[root_a.index()])?;
                (root_a, root_b)
            }
        };

        self.parent[child.index()] = parent.int();
        write_batch.set_parent(child, parent)?;

        Ok(parent)
    }

    /// Stage `height` as the checkpoint that `write_batch` commits when flushed.
    pub fn set_height(
        &self,
        write_batch: &mut DisjointSetWriteBatch<K::WriteBatch>,
        height: BlockHeight,
    ) -> Result<(), DisjointSetError> {
        write_batch.set_height(height)?;
        Ok(())
    }

    /// Point every id directly at its root.
    ///
    /// The rewrites are not staged: finalizing only shortens paths, it never changes the partition,
    /// so the persisted state stays a valid (if less compressed) representation of it.
    pub fn finalize(&mut self) {
        for i in 0..self.size {
            self.compress_path(AddressId::new(i));
        }
    }

    fn registered_id(&self, address: &Address) -> Result<AddressId, DisjointSetError> {
        self.address_to_id
            .get(address)
            .copied()
            .ok_or_else(|| DisjointSetError::ElementNotFound {
                address: address.clone(),
            })
    }

    fn root_of(&self, id: usize) -> usize {
        let mut root = id;
        while self.parent[root] != root as u64 {
            root = self.parent[root] as usize;
        }
        root
    }

    /// Point every id on the path from `id` to its root at the root. Returns the root and the ids whose
    /// parent pointer was rewritten.
    fn compress_path(&mut self, id: AddressId) -> (AddressId, Vec<AddressId>) {
        let root = self.root_of(id.index());
        let mut compressed = Vec::new();

        let mut node = id.index();
        while self.parent[node] != root as u64 {
            let next = self.parent[node] as usize;
            self.parent[node] = root as u64;
            compressed.push(AddressId::new(node as u64));
            node = next;
        }

        (AddressId::new(root as u64), compressed)
    }
}

/// Getters.
impl<K: KVStore> DisjointSet<K> {
    /// Number of addresses ever registered.
    pub fn size(&self) -> u64 {
        self.size
    }

    /// Height of the last checkpoint flushed into the backing store, or `None` if no block has been
    /// checkpointed yet.
    pub fn height(&self) -> Option<BlockHeight> {
        self.height
    }

    pub fn address_id(&self, address: &Address) -> Option<AddressId> {
        self.address_to_id.get(address).copied()
    }

    pub fn contains(&self, address: &Address) -> bool {
        self.address_to_id.contains_key(address)
    }

    /// Parent pointer of `id`, or `None` if no address has been assigned `id`.
    pub fn parent(&self, id: AddressId) -> Option<AddressId> {
        self.parent.get(id.index()).map(|parent| AddressId::new(*parent))
    }

    /// Rank of `id`, or `None` if no address has been assigned `id`.
    pub fn rank(&self, id: AddressId) -> Option<u64> {
        self.rank.get(id.index()).copied()
    }

    /// Id of the root of `address`'s cluster, found without compressing any path.
    pub fn cluster_of(&self, address: &Address) -> Option<ClusterId> {
        let id = self.address_id(address)?;
        Some(AddressId::new(self.root_of(id.index()) as u64))
    }

    /// Iterate over every registered address and its id, in no particular order.
    pub fn addresses(&self) -> hash_map::Iter<'_, Address, AddressId> {
        self.address_to_id.iter()
    }

    /// Group every registered address by the root of its cluster.
    pub fn clusters(&self) -> HashMap<ClusterId, Vec<Address>> {
        let mut clusters: HashMap<ClusterId, Vec<Address>> = HashMap::new();
        for address in self.address_to_id.keys() {
            if let Some(cluster) = self.cluster_of(address) {
                clusters.entry(cluster).or_default().push(address.clone());
            }
        }
        clusters
    }
}

// Fails if following parent pointers from some id never reaches a root. Every id is walked at most
// once across all starts.
fn check_acyclic(parent: &[u64]) -> Result<(), DisjointSetError> {
    #[derive(Clone, Copy, PartialEq)]
    enum Mark {
        Unvisited,
        OnWalk,
        ReachesRoot,
    }

    let mut marks = vec![Mark::Unvisited; parent.len()];
    let mut walk = Vec::new();
    for start in 0..parent.len() {
        let mut node = start;
        while marks[node] == Mark::Unvisited && parent[node] != node as u64 {
            marks[node] = Mark::OnWalk;
            walk.push(node);
            node = parent[node] as usize;
        }
        if marks[node] == Mark::OnWalk {
            return Err(DisjointSetError::InconsistentState(format!(
                "parent pointers of id {} form a cycle",
                node
            )));
        }
        marks[node] = Mark::ReachesRoot;
        for visited in walk.drain(..) {
            marks[visited] = Mark::ReachesRoot;
        }
    }
    Ok(())
}

/// Errors that may be encountered when reading or writing to the [`DisjointSet`].
#[derive(Debug)]
pub enum DisjointSetError {
    /// A union-find query named an address that was never registered with
    /// [`make_set`](DisjointSet::make_set).
    ElementNotFound { address: Address },

    /// Error when trying to get a value from the disjoint-set's underlying key value store.
    KVGetError(KVGetError),

    /// Error when trying to set a value into the disjoint-set's write batch.
    KVSetError(KVSetError),

    /// Error when the underlying key value store fails to write a batch.
    StoreIOError(StoreIOError),

    /// The persisted variables contradict each other, e.g., an address maps to an id beyond the
    /// persisted size.
    InconsistentState(String),
}

impl From<KVGetError> for DisjointSetError {
    fn from(value: KVGetError) -> Self {
        DisjointSetError::KVGetError(value)
    }
}

impl From<KVSetError> for DisjointSetError {
    fn from(value: KVSetError) -> Self {
        DisjointSetError::KVSetError(value)
    }
}

impl From<StoreIOError> for DisjointSetError {
    fn from(value: StoreIOError) -> Self {
        DisjointSetError::StoreIOError(value)
    }
}

impl Display for DisjointSetError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            DisjointSetError::ElementNotFound { address } => {
                write!(f, "address {} is not registered", address)
            }
            DisjointSetError::KVGetError(err) => write!(f, "{}", err),
            DisjointSetError::KVSetError(err) => write!(f, "{}", err),
            DisjointSetError::StoreIOError(err) => write!(f, "{}", err),
            DisjointSetError::InconsistentState(reason) => {
                write!(f, "inconsistent persisted state: {}", reason)
            }
        }
    }
}

impl Error for DisjointSetError {}
