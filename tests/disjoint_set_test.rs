use addr_cluster::{
    disjoint_set::{
        pluggables::KVGetError,
        DisjointSet, DisjointSetError, DisjointSetWriteBatch,
    },
    stores::{MemDB, MemWriteBatch},
    types::data_types::{Address, AddressId, BlockHeight},
};
use rand::{rngs::StdRng, seq::SliceRandom, Rng, SeedableRng};

mod common;

use crate::common::partition::{partition, representatives};

fn addresses(count: usize) -> Vec<Address> {
    (0..count).map(|i| Address::new(format!("addr-{}", i))).collect()
}

fn registered(
    disjoint_set: &mut DisjointSet<MemDB>,
    addresses: &[Address],
) -> DisjointSetWriteBatch<MemWriteBatch> {
    let mut write_batch = disjoint_set.new_write_batch();
    for address in addresses {
        disjoint_set.make_set(&mut write_batch, address).unwrap();
    }
    write_batch
}

#[test]
fn make_set_assigns_sequential_ids_once() {
    let mut disjoint_set = DisjointSet::new(MemDB::new());
    let mut write_batch = disjoint_set.new_write_batch();
    let a = Address::from("A");
    let b = Address::from("B");

    assert_eq!(disjoint_set.make_set(&mut write_batch, &a).unwrap(), AddressId::new(0));
    assert_eq!(disjoint_set.make_set(&mut write_batch, &b).unwrap(), AddressId::new(1));
    // Address mapping, parent and rank for each new address, plus the size key.
    assert_eq!(write_batch.len(), 7);

    assert_eq!(disjoint_set.make_set(&mut write_batch, &a).unwrap(), AddressId::new(0));
    assert_eq!(write_batch.len(), 7);
    assert_eq!(disjoint_set.size(), 2);
    assert_eq!(disjoint_set.parent(AddressId::new(1)), Some(AddressId::new(1)));
    assert_eq!(disjoint_set.rank(AddressId::new(1)), Some(0));

    // Nothing reaches the store before a flush.
    assert!(disjoint_set.kv_store().is_empty());
}

#[test]
fn find_unregistered_address_fails() {
    let mut disjoint_set = DisjointSet::new(MemDB::new());
    let mut write_batch = disjoint_set.new_write_batch();

    let result = disjoint_set.find(&mut write_batch, &Address::from("nobody"));
    assert!(matches!(
        result,
        Err(DisjointSetError::ElementNotFound { address }) if address == Address::from("nobody")
    ));

    let result = disjoint_set.union(&mut write_batch, &Address::from("x"), &Address::from("y"));
    assert!(matches!(result, Err(DisjointSetError::ElementNotFound { .. })));
}

#[test]
fn union_by_rank_keeps_first_root_on_ties() {
    let mut disjoint_set = DisjointSet::new(MemDB::new());
    let all = addresses(3);
    let mut write_batch = registered(&mut disjoint_set, &all);

    let root = disjoint_set.union(&mut write_batch, &all[0], &all[1]).unwrap();
    assert_eq!(root, AddressId::new(0));
    assert_eq!(disjoint_set.rank(root), Some(1));

    // A rank-0 singleton goes under the rank-1 root, whichever side it is passed on.
    let root = disjoint_set.union(&mut write_batch, &all[2], &all[1]).unwrap();
    assert_eq!(root, AddressId::new(0));
    assert_eq!(disjoint_set.rank(root), Some(1));
    assert_eq!(disjoint_set.parent(AddressId::new(2)), Some(AddressId::new(0)));

    // Merging an already merged pair changes nothing.
    let writes = write_batch.len();
    assert_eq!(disjoint_set.union(&mut write_batch, &all[1], &all[2]).unwrap(), root);
    assert_eq!(write_batch.len(), writes);
}

#[test]
fn find_compresses_paths() {
    let mut disjoint_set = DisjointSet::new(MemDB::new());
    let all = addresses(4);
    let mut write_batch = registered(&mut disjoint_set, &all);

    // Build 3 -> 2 -> 0 by merging two rank-1 trees.
    disjoint_set.union(&mut write_batch, &all[0], &all[1]).unwrap();
    disjoint_set.union(&mut write_batch, &all[2], &all[3]).unwrap();
    disjoint_set.union(&mut write_batch, &all[0], &all[2]).unwrap();
    assert_eq!(disjoint_set.parent(AddressId::new(3)), Some(AddressId::new(2)));

    let root = disjoint_set.find(&mut write_batch, &all[3]).unwrap();
    assert_eq!(root, AddressId::new(0));
    assert_eq!(disjoint_set.parent(AddressId::new(3)), Some(AddressId::new(0)));

    // The compression was staged, so it survives a flush and restore.
    let kv_store = disjoint_set.kv_store().clone();
    disjoint_set.flush(write_batch).unwrap();
    let mut restored = DisjointSet::new(kv_store);
    restored.restore().unwrap();
    assert_eq!(restored.parent(AddressId::new(3)), Some(AddressId::new(0)));
}

#[test]
fn union_matches_transitive_closure() {
    let mut rng = StdRng::seed_from_u64(7);
    let all = addresses(200);
    let mut disjoint_set = DisjointSet::new(MemDB::new());
    let mut write_batch = registered(&mut disjoint_set, &all);

    // Reference partition: every address labelled with its component, relabelled eagerly on merge.
    let mut labels: Vec<usize> = (0..all.len()).collect();
    for _ in 0..150 {
        let a = rng.gen_range(0, all.len());
        let b = rng.gen_range(0, all.len());
        disjoint_set.union(&mut write_batch, &all[a], &all[b]).unwrap();

        let (from, to) = (labels[b], labels[a]);
        for label in labels.iter_mut() {
            if *label == from {
                *label = to;
            }
        }
    }

    for a in 0..all.len() {
        for b in (a + 1)..all.len() {
            let same_root = disjoint_set.find(&mut write_batch, &all[a]).unwrap()
                == disjoint_set.find(&mut write_batch, &all[b]).unwrap();
            assert_eq!(same_root, labels[a] == labels[b], "{} and {}", all[a], all[b]);
        }
    }
}

#[test]
fn repeated_unions_are_idempotent() {
    let mut rng = StdRng::seed_from_u64(11);
    let all = addresses(50);
    let pairs: Vec<(usize, usize)> = (0..40)
        .map(|_| (rng.gen_range(0, all.len()), rng.gen_range(0, all.len())))
        .collect();

    let mut disjoint_set = DisjointSet::new(MemDB::new());
    let mut write_batch = registered(&mut disjoint_set, &all);
    for (a, b) in &pairs {
        disjoint_set.union(&mut write_batch, &all[*a], &all[*b]).unwrap();
    }
    let once = partition(&disjoint_set);
    let ranks: Vec<Option<u64>> = (0..all.len() as u64)
        .map(|i| disjoint_set.rank(AddressId::new(i)))
        .collect();

    for (a, b) in &pairs {
        disjoint_set.union(&mut write_batch, &all[*a], &all[*b]).unwrap();
    }
    assert_eq!(partition(&disjoint_set), once);
    let ranks_again: Vec<Option<u64>> = (0..all.len() as u64)
        .map(|i| disjoint_set.rank(AddressId::new(i)))
        .collect();
    assert_eq!(ranks_again, ranks);
}

#[test]
fn union_order_does_not_change_the_partition() {
    let mut rng = StdRng::seed_from_u64(3);
    let all = addresses(30);
    // Two unrelated groups, each merged around its first member in a random order.
    let groups = [&all[0..12], &all[12..20]];

    let mut results = Vec::new();
    for _ in 0..5 {
        let mut disjoint_set = DisjointSet::new(MemDB::new());
        let mut order = all.clone();
        order.shuffle(&mut rng);
        let mut write_batch = registered(&mut disjoint_set, &order);

        for group in groups {
            let mut members = group.to_vec();
            members.shuffle(&mut rng);
            let (anchor, others) = members.split_first().unwrap();
            for other in others {
                disjoint_set.union(&mut write_batch, anchor, other).unwrap();
            }
        }

        results.push(representatives(&disjoint_set));
    }

    let expected = &results[0];
    assert!(results.iter().all(|result| result == expected));
    assert_eq!(expected[&all[11]], all[0]);
    assert_eq!(expected[&all[19]], all[12]);
    assert_eq!(expected[&all[25]], all[25]);
}

#[test]
fn flush_and_restore_round_trip() {
    let mut rng = StdRng::seed_from_u64(5);
    let all = addresses(100);
    let kv_store = MemDB::new();
    let mut disjoint_set = DisjointSet::new(kv_store.clone());
    let mut write_batch = registered(&mut disjoint_set, &all);
    for _ in 0..80 {
        let a = rng.gen_range(0, all.len());
        let b = rng.gen_range(0, all.len());
        disjoint_set.union(&mut write_batch, &all[a], &all[b]).unwrap();
    }
    disjoint_set.set_height(&mut write_batch, BlockHeight::new(5)).unwrap();
    assert_eq!(write_batch.checkpoint(), Some(BlockHeight::new(5)));
    disjoint_set.flush(write_batch).unwrap();
    assert_eq!(disjoint_set.height(), Some(BlockHeight::new(5)));

    let mut restored = DisjointSet::new(kv_store);
    restored.restore().unwrap();

    assert_eq!(restored.size(), disjoint_set.size());
    assert_eq!(restored.height(), disjoint_set.height());
    assert_eq!(partition(&restored), partition(&disjoint_set));
    for i in 0..all.len() as u64 {
        let id = AddressId::new(i);
        assert_eq!(restored.parent(id), disjoint_set.parent(id));
        assert_eq!(restored.rank(id), disjoint_set.rank(id));
    }
    for address in &all {
        assert_eq!(restored.cluster_of(address), disjoint_set.cluster_of(address));
    }
}

#[test]
fn restore_ignores_unflushed_changes() {
    let kv_store = MemDB::new();
    let all = addresses(4);

    let mut disjoint_set = DisjointSet::new(kv_store.clone());
    let mut write_batch = registered(&mut disjoint_set, &all[0..2]);
    disjoint_set.union(&mut write_batch, &all[0], &all[1]).unwrap();
    disjoint_set.set_height(&mut write_batch, BlockHeight::new(1)).unwrap();
    disjoint_set.flush(write_batch).unwrap();

    // Staged, but never flushed.
    let mut write_batch = registered(&mut disjoint_set, &all[2..4]);
    disjoint_set.union(&mut write_batch, &all[0], &all[3]).unwrap();
    drop(write_batch);

    disjoint_set.restore().unwrap();
    assert_eq!(disjoint_set.size(), 2);
    assert_eq!(disjoint_set.height(), Some(BlockHeight::new(1)));
    assert!(!disjoint_set.contains(&all[3]));
    assert_eq!(disjoint_set.cluster_of(&all[1]), Some(AddressId::new(0)));
}

#[test]
fn restore_of_empty_store_is_fresh_state() {
    let mut disjoint_set = DisjointSet::new(MemDB::new());
    disjoint_set.restore().unwrap();
    assert_eq!(disjoint_set.size(), 0);
    assert_eq!(disjoint_set.height(), None);
    assert!(disjoint_set.clusters().is_empty());
}

#[test]
fn checkpoint_at_genesis_differs_from_no_checkpoint() {
    let kv_store = MemDB::new();
    let mut disjoint_set = DisjointSet::new(kv_store.clone());
    let mut write_batch = disjoint_set.new_write_batch();
    // Staging a checkpoint only needs a shared borrow.
    let shared = &disjoint_set;
    shared.set_height(&mut write_batch, BlockHeight::new(0)).unwrap();
    disjoint_set.flush(write_batch).unwrap();
    assert_eq!(disjoint_set.height(), Some(BlockHeight::new(0)));

    let mut restored = DisjointSet::new(kv_store);
    restored.restore().unwrap();
    assert_eq!(restored.height(), Some(BlockHeight::new(0)));
    assert_eq!(restored.size(), 0);
}

#[test]
fn restore_rejects_inconsistent_state() {
    let kv_store = MemDB::new();
    let mut writer = DisjointSet::new(kv_store.clone());
    let mut write_batch = registered(&mut writer, &addresses(1));
    // Claims a second id that has no address.
    write_batch.set_size(2).unwrap();
    write_batch.set_parent(AddressId::new(1), AddressId::new(1)).unwrap();
    write_batch.set_rank(AddressId::new(1), 0).unwrap();
    writer.flush(write_batch).unwrap();

    let mut restored = DisjointSet::new(kv_store);
    assert!(matches!(
        restored.restore(),
        Err(DisjointSetError::InconsistentState(_))
    ));
}

#[test]
fn restore_rejects_parent_cycle() {
    let kv_store = MemDB::new();
    let mut writer = DisjointSet::new(kv_store.clone());
    let mut write_batch = registered(&mut writer, &addresses(3));
    // 0 -> 1 -> 2 -> 1 never reaches a root.
    write_batch.set_parent(AddressId::new(0), AddressId::new(1)).unwrap();
    write_batch.set_parent(AddressId::new(1), AddressId::new(2)).unwrap();
    write_batch.set_parent(AddressId::new(2), AddressId::new(1)).unwrap();
    writer.flush(write_batch).unwrap();

    let mut restored = DisjointSet::new(kv_store);
    assert!(matches!(
        restored.restore(),
        Err(DisjointSetError::InconsistentState(_))
    ));
    assert_eq!(restored.size(), 0);
}

#[test]
fn restore_accepts_deep_acyclic_chains() {
    let kv_store = MemDB::new();
    let all = addresses(50);
    let mut writer = DisjointSet::new(kv_store.clone());
    let mut write_batch = registered(&mut writer, &all);
    // A single chain 49 -> 48 -> ... -> 0, as written by a store that never compressed paths.
    for i in 1..all.len() as u64 {
        write_batch
            .set_parent(AddressId::new(i), AddressId::new(i - 1))
            .unwrap();
    }
    writer.flush(write_batch).unwrap();

    let mut restored = DisjointSet::new(kv_store);
    restored.restore().unwrap();
    for address in &all {
        assert_eq!(restored.cluster_of(address), Some(AddressId::new(0)));
    }
}

#[test]
fn restore_reports_missing_parent() {
    let kv_store = MemDB::new();
    let mut writer = DisjointSet::new(kv_store.clone());
    let mut write_batch = writer.new_write_batch();
    write_batch.set_size(1).unwrap();
    writer.flush(write_batch).unwrap();

    let mut restored = DisjointSet::new(kv_store);
    assert!(matches!(
        restored.restore(),
        Err(DisjointSetError::KVGetError(KVGetError::ValueExpectedButNotFound { .. }))
    ));
}

#[test]
fn finalize_points_every_id_at_its_root() {
    let mut rng = StdRng::seed_from_u64(13);
    let all = addresses(120);
    let mut disjoint_set = DisjointSet::with_capacity(MemDB::new(), all.len());
    let mut write_batch = registered(&mut disjoint_set, &all);
    for _ in 0..100 {
        let a = rng.gen_range(0, all.len());
        let b = rng.gen_range(0, all.len());
        disjoint_set.union(&mut write_batch, &all[a], &all[b]).unwrap();
    }
    let before = partition(&disjoint_set);

    disjoint_set.finalize();
    for address in &all {
        let id = disjoint_set.address_id(address).unwrap();
        assert_eq!(disjoint_set.parent(id), disjoint_set.cluster_of(address));
    }
    assert_eq!(partition(&disjoint_set), before);

    let parents: Vec<_> = (0..all.len() as u64)
        .map(|i| disjoint_set.parent(AddressId::new(i)))
        .collect();
    disjoint_set.finalize();
    let parents_again: Vec<_> = (0..all.len() as u64)
        .map(|i| disjoint_set.parent(AddressId::new(i)))
        .collect();
    assert_eq!(parents_again, parents);
}
