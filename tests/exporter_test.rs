use std::{collections::BTreeMap, fs, sync::Arc};

use addr_cluster::{
    disjoint_set::DisjointSet,
    exporter::{ClusterRow, ClusterSink, ExportError, ExportMode, Exporter, SinkError, SqliteSink},
    stores::MemDB,
    types::data_types::{Address, AddressId},
    worker_pool::WorkerError,
};

// Two clusters, {a0, a1, a2} and {a3, a4}, and a singleton a5.
fn clustered() -> DisjointSet<MemDB> {
    let mut disjoint_set = DisjointSet::new(MemDB::new());
    let mut write_batch = disjoint_set.new_write_batch();
    let addresses: Vec<Address> = (0..6).map(|i| Address::new(format!("a{}", i))).collect();
    for address in &addresses {
        disjoint_set.make_set(&mut write_batch, address).unwrap();
    }
    for (a, b) in [(0, 1), (2, 1), (3, 4)] {
        disjoint_set
            .union(&mut write_batch, &addresses[a], &addresses[b])
            .unwrap();
    }
    disjoint_set.flush(write_batch).unwrap();
    disjoint_set
}

fn read_csv(path: &std::path::Path) -> BTreeMap<String, u64> {
    fs::read_to_string(path)
        .unwrap()
        .lines()
        .map(|line| {
            let (address, cluster_id) = line.split_once(',').unwrap();
            (address.to_string(), cluster_id.parse().unwrap())
        })
        .collect()
}

#[test]
fn csv_export_writes_one_row_per_address() {
    let directory = tempfile::tempdir().unwrap();
    let path = directory.path().join("clusters.csv");
    let mut disjoint_set = clustered();

    let exported = Exporter::new(2, 16)
        .finalize_and_export(&mut disjoint_set, &ExportMode::Csv(path.clone()))
        .unwrap();
    assert_eq!(exported, 6);

    let rows = read_csv(&path);
    assert_eq!(rows.len(), 6);
    assert_eq!(rows["a0"], rows["a1"]);
    assert_eq!(rows["a0"], rows["a2"]);
    assert_eq!(rows["a3"], rows["a4"]);
    assert_ne!(rows["a0"], rows["a3"]);
    assert_ne!(rows["a5"], rows["a0"]);
    assert_ne!(rows["a5"], rows["a3"]);

    // Cluster ids are root ids, and roots belong to their own cluster.
    for cluster_id in rows.values() {
        let root = AddressId::new(*cluster_id);
        assert_eq!(disjoint_set.parent(root), Some(root));
    }
}

#[test]
fn csv_export_to_missing_directory_fails() {
    let directory = tempfile::tempdir().unwrap();
    let path = directory.path().join("missing").join("clusters.csv");
    let mut disjoint_set = clustered();

    let result = Exporter::new(1, 16).finalize_and_export(&mut disjoint_set, &ExportMode::Csv(path));
    assert!(matches!(result, Err(ExportError::Io(_))));
}

#[test]
fn sqlite_sink_persists_rows_across_reopen() {
    let directory = tempfile::tempdir().unwrap();
    let path = directory.path().join("clusters.sqlite");
    let mut disjoint_set = clustered();

    {
        let sink = Arc::new(SqliteSink::open(&path).unwrap());
        let exported = Exporter::new(3, 1)
            .finalize_and_export(&mut disjoint_set, &ExportMode::Sink(sink))
            .unwrap();
        assert_eq!(exported, 6);
    }

    let sink = SqliteSink::open(&path).unwrap();
    assert_eq!(sink.len().unwrap(), 6);
    assert_eq!(
        sink.cluster_of(&Address::from("a2")).unwrap(),
        disjoint_set.cluster_of(&Address::from("a0"))
    );
    assert_eq!(
        sink.cluster_of(&Address::from("a4")).unwrap(),
        disjoint_set.cluster_of(&Address::from("a3"))
    );
}

#[test]
fn sqlite_sink_inserts_only_absent_rows() {
    let sink = SqliteSink::open_in_memory().unwrap();
    assert!(sink.is_empty().unwrap());

    let rows = vec![
        ClusterRow {
            cluster_id: AddressId::new(0),
            address: Address::from("a"),
        },
        ClusterRow {
            cluster_id: AddressId::new(0),
            address: Address::from("b"),
        },
    ];
    sink.insert_if_absent(&rows).unwrap();
    sink.insert_if_absent(&rows[1..]).unwrap();
    assert_eq!(sink.len().unwrap(), 2);
    assert_eq!(sink.cluster_of(&Address::from("b")).unwrap(), Some(AddressId::new(0)));
}

struct FailingSink;

impl ClusterSink for FailingSink {
    fn insert_if_absent(&self, _rows: &[ClusterRow]) -> Result<(), SinkError> {
        Err(SinkError::new("sink is read-only"))
    }
}

#[test]
fn sink_failure_aborts_export() {
    let mut disjoint_set = clustered();
    let result = Exporter::new(2, 2)
        .finalize_and_export(&mut disjoint_set, &ExportMode::Sink(Arc::new(FailingSink)));
    assert!(matches!(
        result,
        Err(ExportError::Worker(WorkerError::Job(_)))
    ));
}
