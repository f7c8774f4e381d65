//! Root-independent views of a disjoint-set's partition, for comparing two disjoint-sets that may have
//! picked different roots for the same clusters.

use std::collections::{BTreeMap, BTreeSet};

use addr_cluster::{
    disjoint_set::{pluggables::KVStore, DisjointSet},
    types::data_types::Address,
};

/// Every cluster of `disjoint_set` as a sorted set of its members.
pub(crate) fn partition<K: KVStore>(disjoint_set: &DisjointSet<K>) -> BTreeSet<BTreeSet<Address>> {
    disjoint_set
        .clusters()
        .into_values()
        .map(|members| members.into_iter().collect())
        .collect()
}

/// Map every address to the smallest address of its cluster.
pub(crate) fn representatives<K: KVStore>(
    disjoint_set: &DisjointSet<K>,
) -> BTreeMap<Address, Address> {
    let mut representatives = BTreeMap::new();
    for members in partition(disjoint_set) {
        if let Some(smallest) = members.iter().next().cloned() {
            for member in members {
                representatives.insert(member, smallest.clone());
            }
        }
    }
    representatives
}
