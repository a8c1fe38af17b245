//! Backend-agnostic contract suite.
//!
//! Every backend runs the same scenarios through [`storage_contract_tests!`].
//! Fixtures must be configured with a binary data chunk size of 3 bytes so
//! the blob scenarios cross chunk boundaries.
//!
//! [`storage_contract_tests!`]: crate::storage_contract_tests

use std::collections::{BTreeMap, BTreeSet};
use std::io::{Read, Write};
use std::thread;
use std::time::{Duration, Instant};

use afs_types::{
    epoch_millis, DoubleDataChunk, FileSystemCheckKind, FileSystemCheckOptions, NodeEvent,
    NodeEventList, NodeGenericMetadata, NodeId, NodeInfo, StringDataChunk, TimeSeriesDataType,
    TimeSeriesIndex, TimeSeriesMetadata,
};
use tokio::sync::broadcast::{self, error::TryRecvError};

use crate::column::{ColumnFamily, ColumnStore, WriteBatch};
use crate::engine::rows::{child_key, encode, node_key, NodeRow};
use crate::engine::ColumnAppStorage;
use crate::error::StorageError;
use crate::traits::AppStorage;

/// Chunk size fixtures are expected to use.
pub const CONTRACT_CHUNK_SIZE: usize = 3;

/// Generate one `#[test]` per contract scenario. `$fixture` is evaluated per
/// test and must dereference to a type implementing [`AppStorage`].
#[macro_export]
macro_rules! storage_contract_tests {
    ($fixture:expr) => {
        $crate::storage_contract_tests!(@each $fixture;
            root_is_idempotent,
            new_nodes_start_inconsistent,
            node_info_roundtrip,
            create_node_requires_parent,
            children_and_parent,
            rename_keeps_children,
            set_parent_moves_node,
            updates_reach_child_listing,
            delete_node_is_recursive,
            blob_roundtrip,
            blob_overwrite_and_remove,
            unclosed_blob_leaves_no_trace,
            blob_close_applies_buffered_writes_first,
            dependencies_both_directions,
            time_series_roundtrip,
            time_series_clear,
            empty_chunks_are_dropped,
            buffered_writes_precede_later_mutations,
            events_are_published,
            expired_inconsistent_nodes_are_repaired,
            closed_storage_rejects_calls,
        );
    };
    (@each $fixture:expr; $($name:ident),* $(,)?) => {
        $(
            #[test]
            fn $name() {
                let fixture = $fixture;
                $crate::contract::$name(&*fixture);
            }
        )*
    };
}

/// Generate the repair scenarios, which stage damaged layouts. `$damage` is
/// a function from `&Fixture` to `&dyn LayoutDamage` reaching the fixture's
/// underlying column store.
#[macro_export]
macro_rules! storage_repair_tests {
    ($fixture:expr, $damage:path) => {
        $crate::storage_repair_tests!(@each $fixture, $damage;
            orphan_repair_spares_same_named_sibling,
            orphan_data_leaves_no_names,
        );
    };
    (@each $fixture:expr, $damage:path; $($name:ident),* $(,)?) => {
        $(
            #[test]
            fn $name() {
                let fixture = $fixture;
                $crate::contract::$name(&*fixture, $damage(&fixture));
            }
        )*
    };
}

/// Writes that bypass the storage contract to produce layouts only a crash
/// or a bug would leave behind.
pub trait LayoutDamage {
    /// Store a node under `parent` without a child-list row.
    fn insert_unlisted_node(&self, parent: NodeId, name: &str) -> NodeId;

    /// Delete a node's own record and its child-list row, keeping its data.
    fn drop_node_record(&self, id: NodeId);
}

impl<S: ColumnStore> LayoutDamage for ColumnAppStorage<S> {
    fn insert_unlisted_node(&self, parent: NodeId, name: &str) -> NodeId {
        let id = NodeId::new();
        let now = epoch_millis();
        let row = NodeRow {
            name: name.to_string(),
            pseudo_class: "folder".into(),
            description: String::new(),
            creation_time: now,
            modification_time: now,
            version: 0,
            metadata: NodeGenericMetadata::new(),
            parent_id: Some(parent),
            consistent: Some(true),
        };
        let mut batch = WriteBatch::new();
        batch.put(ColumnFamily::Nodes, node_key(id), encode(&row).unwrap());
        self.store().apply(batch).unwrap();
        id
    }

    fn drop_node_record(&self, id: NodeId) {
        let row = self.load_node(id).unwrap().expect("node to damage exists");
        let mut batch = WriteBatch::new();
        batch.delete(ColumnFamily::Nodes, node_key(id));
        if let Some(parent) = row.parent_id {
            batch.delete(ColumnFamily::Children, child_key(parent, &row.name));
        }
        self.store().apply(batch).unwrap();
    }
}

fn root(storage: &dyn AppStorage) -> NodeInfo {
    storage.create_root_node_if_not_exists("root", "folder").unwrap()
}

fn folder(storage: &dyn AppStorage, parent: NodeId, name: &str) -> NodeInfo {
    storage
        .create_node(parent, name, "folder", "", 0, NodeGenericMetadata::new())
        .unwrap()
}

fn names(list: &[&str]) -> BTreeSet<String> {
    list.iter().map(|s| s.to_string()).collect()
}

fn series(name: &str, data_type: TimeSeriesDataType) -> TimeSeriesMetadata {
    let mut tags = BTreeMap::new();
    tags.insert("unit".to_string(), "MW".to_string());
    TimeSeriesMetadata::new(name, data_type, tags, TimeSeriesIndex::new(0, 100, 10).unwrap())
}

fn write_blob(storage: &dyn AppStorage, id: NodeId, name: &str, data: &[u8]) {
    let mut writer = storage.write_binary_data(id, name).unwrap();
    writer.write_all(data).unwrap();
    writer.close().unwrap();
}

fn read_blob(storage: &dyn AppStorage, id: NodeId, name: &str) -> Option<Vec<u8>> {
    storage.read_binary_data(id, name).unwrap().map(|mut reader| {
        let mut out = Vec::new();
        reader.read_to_end(&mut out).unwrap();
        out
    })
}

/// Receive events until `expected` arrived or five seconds passed.
pub fn collect_events(
    rx: &mut broadcast::Receiver<NodeEventList>,
    expected: usize,
) -> Vec<NodeEvent> {
    let deadline = Instant::now() + Duration::from_secs(5);
    let mut events = Vec::new();
    while events.len() < expected && Instant::now() < deadline {
        match rx.try_recv() {
            Ok(list) => events.extend(list.events),
            Err(TryRecvError::Empty) => thread::sleep(Duration::from_millis(10)),
            Err(TryRecvError::Lagged(_)) => continue,
            Err(TryRecvError::Closed) => break,
        }
    }
    events
}

pub fn root_is_idempotent(storage: &dyn AppStorage) {
    let a = root(storage);
    let b = root(storage);
    assert_eq!(a, b);
    assert!(storage.parent_node(a.id).unwrap().is_none());
    assert!(storage.is_writable(a.id).unwrap());
}

pub fn new_nodes_start_inconsistent(storage: &dyn AppStorage) {
    let root = root(storage);
    let node = folder(storage, root.id, "n");
    assert!(!storage.is_consistent(node.id).unwrap());
    let inconsistent: Vec<NodeId> =
        storage.inconsistent_nodes().unwrap().iter().map(|n| n.id).collect();
    assert_eq!(inconsistent, vec![node.id]);

    storage.set_consistent(node.id).unwrap();
    assert!(storage.is_consistent(node.id).unwrap());
    assert!(storage.inconsistent_nodes().unwrap().is_empty());
}

pub fn node_info_roundtrip(storage: &dyn AppStorage) {
    let root = root(storage);
    let metadata = NodeGenericMetadata::new()
        .with_string("k", "v")
        .with_double("d", 0.5)
        .with_int("i", 3)
        .with_boolean("b", true);
    let created = storage
        .create_node(root.id, "test", "folder", "", 12, metadata.clone())
        .unwrap();
    let info = storage.node_info(created.id).unwrap();
    assert_eq!(info.name, "test");
    assert_eq!(info.pseudo_class, "folder");
    assert_eq!(info.description, "");
    assert_eq!(info.version, 12);
    assert_eq!(info.generic_metadata, metadata);
    assert_eq!(info, created);

    let missing = NodeId::new();
    assert!(matches!(storage.node_info(missing), Err(StorageError::NotFound(id)) if id == missing));
}

pub fn create_node_requires_parent(storage: &dyn AppStorage) {
    root(storage);
    let err = storage
        .create_node(NodeId::new(), "x", "folder", "", 0, NodeGenericMetadata::new())
        .unwrap_err();
    assert!(matches!(err, StorageError::NotFound(_)));
}

pub fn children_and_parent(storage: &dyn AppStorage) {
    let root = root(storage);
    let b = folder(storage, root.id, "b");
    let a = folder(storage, root.id, "a");
    let names: Vec<String> =
        storage.child_nodes(root.id).unwrap().into_iter().map(|n| n.name).collect();
    assert_eq!(names, vec!["a", "b"]);
    assert_eq!(storage.child_node(root.id, "a").unwrap().unwrap().id, a.id);
    assert!(storage.child_node(root.id, "c").unwrap().is_none());
    assert_eq!(storage.parent_node(b.id).unwrap().unwrap().id, root.id);
}

pub fn rename_keeps_children(storage: &dyn AppStorage) {
    let root = root(storage);
    let a = folder(storage, root.id, "a");
    let c = folder(storage, a.id, "c");
    storage.rename_node(a.id, "renamed").unwrap();

    assert!(storage.child_node(root.id, "a").unwrap().is_none());
    assert_eq!(storage.child_node(root.id, "renamed").unwrap().unwrap().id, a.id);
    assert_eq!(storage.node_info(a.id).unwrap().name, "renamed");
    assert_eq!(storage.child_nodes(a.id).unwrap()[0].id, c.id);
    assert!(matches!(
        storage.rename_node(a.id, ""),
        Err(StorageError::InvalidArgument(_))
    ));
}

pub fn set_parent_moves_node(storage: &dyn AppStorage) {
    let root = root(storage);
    let a = folder(storage, root.id, "a");
    let b = folder(storage, root.id, "b");
    let c = folder(storage, a.id, "c");
    storage.set_parent_node(c.id, b.id).unwrap();

    assert!(storage.child_nodes(a.id).unwrap().is_empty());
    assert_eq!(storage.child_nodes(b.id).unwrap()[0].id, c.id);
    assert_eq!(storage.parent_node(c.id).unwrap().unwrap().id, b.id);
    assert!(matches!(
        storage.set_parent_node(root.id, a.id),
        Err(StorageError::InvalidArgument(_))
    ));
    assert!(matches!(
        storage.set_parent_node(c.id, NodeId::new()),
        Err(StorageError::NotFound(_))
    ));
}

pub fn updates_reach_child_listing(storage: &dyn AppStorage) {
    let root = root(storage);
    let a = folder(storage, root.id, "a");
    let metadata = NodeGenericMetadata::new().with_string("color", "red");
    storage.set_description(a.id, "described").unwrap();
    storage.set_metadata(a.id, metadata.clone()).unwrap();
    storage.update_modification_time(a.id).unwrap();

    let own = storage.node_info(a.id).unwrap();
    let listed = storage.child_node(root.id, "a").unwrap().unwrap();
    assert_eq!(own.description, "described");
    assert_eq!(own.generic_metadata, metadata);
    assert!(own.modification_time >= own.creation_time);
    assert_eq!(listed, own);
}

pub fn delete_node_is_recursive(storage: &dyn AppStorage) {
    let root = root(storage);
    let a = folder(storage, root.id, "a");
    let b = folder(storage, a.id, "b");
    let c = folder(storage, b.id, "c");
    write_blob(storage, c.id, "blob", b"data");

    assert_eq!(storage.delete_node(a.id).unwrap(), Some(root.id));
    for id in [a.id, b.id, c.id] {
        assert!(matches!(storage.node_info(id), Err(StorageError::NotFound(_))));
    }
    assert!(storage.child_nodes(root.id).unwrap().is_empty());
    assert!(!storage.data_exists(c.id, "blob").unwrap());
}

pub fn blob_roundtrip(storage: &dyn AppStorage) {
    let root = root(storage);
    let chunk = CONTRACT_CHUNK_SIZE;
    for (i, size) in [0, 1, chunk - 1, chunk, chunk + 1, chunk * 5, 1000].into_iter().enumerate() {
        let name = format!("blob{i}");
        let data: Vec<u8> = (0..size).map(|b| (b % 251) as u8).collect();
        write_blob(storage, root.id, &name, &data);
        assert!(storage.data_exists(root.id, &name).unwrap());
        assert_eq!(read_blob(storage, root.id, &name).unwrap(), data, "size {size}");
    }
    assert_eq!(storage.data_names(root.id).unwrap().len(), 7);
    assert!(read_blob(storage, root.id, "missing").is_none());
}

pub fn blob_overwrite_and_remove(storage: &dyn AppStorage) {
    let root = root(storage);
    write_blob(storage, root.id, "data", b"a much longer first version");
    write_blob(storage, root.id, "data", b"short");
    assert_eq!(read_blob(storage, root.id, "data").unwrap(), b"short");

    assert!(storage.remove_data(root.id, "data").unwrap());
    assert!(!storage.data_exists(root.id, "data").unwrap());
    assert!(storage.data_names(root.id).unwrap().is_empty());
    assert!(!storage.remove_data(root.id, "data").unwrap());
}

pub fn unclosed_blob_leaves_no_trace(storage: &dyn AppStorage) {
    let root = root(storage);
    {
        let mut writer = storage.write_binary_data(root.id, "partial").unwrap();
        writer.write_all(b"0123456789").unwrap();
    }
    assert!(!storage.data_exists(root.id, "partial").unwrap());
    assert!(storage.data_names(root.id).unwrap().is_empty());
}

pub fn blob_close_applies_buffered_writes_first(storage: &dyn AppStorage) {
    let root = root(storage);
    storage.flush().unwrap();
    let bus = storage.events_bus();
    let mut rx = bus.subscribe();

    // Exactly one chunk: close writes no trailing chunk of its own.
    let mut writer = storage.write_binary_data(root.id, "blob").unwrap();
    writer.write_all(&[7u8; CONTRACT_CHUNK_SIZE]).unwrap();
    storage.create_time_series(root.id, series("ts", TimeSeriesDataType::Double)).unwrap();
    writer.close().unwrap();
    assert!(storage.time_series_exists(root.id, "ts").unwrap());
    storage.flush().unwrap();

    let deadline = Instant::now() + Duration::from_secs(5);
    let mut events = Vec::new();
    while events.len() < 2 && Instant::now() < deadline {
        events.extend(collect_events(&mut rx, 1).into_iter().filter(|e| {
            matches!(e, NodeEvent::TimeSeriesCreated { .. } | NodeEvent::NodeDataUpdated { .. })
        }));
    }
    assert_eq!(
        events,
        vec![
            NodeEvent::TimeSeriesCreated {
                id: root.id,
                time_series_name: "ts".into()
            },
            NodeEvent::NodeDataUpdated {
                id: root.id,
                data_name: "blob".into()
            },
        ]
    );
}

pub fn dependencies_both_directions(storage: &dyn AppStorage) {
    let root = root(storage);
    let a = folder(storage, root.id, "a");
    let b = folder(storage, root.id, "b");
    let c = folder(storage, root.id, "c");
    storage.add_dependency(a.id, "x", b.id).unwrap();
    storage.add_dependency(a.id, "x", c.id).unwrap();
    storage.add_dependency(a.id, "y", b.id).unwrap();

    let named: BTreeSet<NodeId> =
        storage.dependencies_named(a.id, "x").unwrap().iter().map(|n| n.id).collect();
    assert_eq!(named, [b.id, c.id].into_iter().collect());
    assert_eq!(storage.dependencies(a.id).unwrap().len(), 3);
    let back: Vec<NodeId> =
        storage.backward_dependencies(b.id).unwrap().iter().map(|n| n.id).collect();
    assert_eq!(back, vec![a.id, a.id]);

    storage.remove_dependency(a.id, "y", b.id).unwrap();
    assert_eq!(storage.backward_dependencies(b.id).unwrap().len(), 1);

    storage.delete_node(a.id).unwrap();
    assert!(storage.backward_dependencies(b.id).unwrap().is_empty());
    assert!(storage.backward_dependencies(c.id).unwrap().is_empty());
}

pub fn time_series_roundtrip(storage: &dyn AppStorage) {
    let root = root(storage);
    let doubles = series("ts1", TimeSeriesDataType::Double);
    let strings = series("ts2", TimeSeriesDataType::String);
    storage.create_time_series(root.id, doubles.clone()).unwrap();
    storage.create_time_series(root.id, strings.clone()).unwrap();

    let c1 = DoubleDataChunk::uncompressed(2, vec![1.0, 2.0]);
    let c2 = DoubleDataChunk::compressed(5, 3, vec![3.0, f64::NAN], vec![1, 2]).unwrap();
    let s1 = StringDataChunk::uncompressed(0, vec!["a".into(), "b".into()]);
    storage.add_double_time_series_data(root.id, 1, "ts1", vec![c2.clone()]).unwrap();
    storage.add_double_time_series_data(root.id, 1, "ts1", vec![c1.clone()]).unwrap();
    storage.add_string_time_series_data(root.id, 2, "ts2", vec![s1.clone()]).unwrap();
    storage.flush().unwrap();

    assert_eq!(storage.time_series_names(root.id).unwrap(), names(&["ts1", "ts2"]));
    assert!(storage.time_series_exists(root.id, "ts1").unwrap());
    assert!(!storage.time_series_exists(root.id, "ts3").unwrap());
    assert_eq!(
        storage.time_series_metadata(root.id, &names(&["ts1", "ts3"])).unwrap(),
        vec![doubles]
    );
    assert_eq!(storage.time_series_data_versions(root.id).unwrap(), [1, 2].into_iter().collect());
    assert_eq!(
        storage.time_series_data_versions_of(root.id, "ts2").unwrap(),
        [2].into_iter().collect()
    );

    let data = storage.double_time_series_data(root.id, &names(&["ts1"]), 1).unwrap();
    let chunks = &data["ts1"];
    assert_eq!(chunks.len(), 2);
    assert_eq!(chunks[0], c1);
    assert_eq!(chunks[1].offset(), 5);
    let values = chunks[1].values();
    assert_eq!(values[0], 3.0);
    assert!(values[1].is_nan() && values[2].is_nan());

    let data = storage.string_time_series_data(root.id, &names(&["ts2"]), 2).unwrap();
    assert_eq!(data["ts2"], vec![s1]);
    assert!(storage.double_time_series_data(root.id, &names(&["ts1"]), 9).unwrap().is_empty());
}

pub fn time_series_clear(storage: &dyn AppStorage) {
    let root = root(storage);
    storage.create_time_series(root.id, series("ts", TimeSeriesDataType::Double)).unwrap();
    let chunk = DoubleDataChunk::uncompressed(0, vec![1.0]);
    storage.add_double_time_series_data(root.id, 1, "ts", vec![chunk]).unwrap();
    storage.clear_time_series(root.id).unwrap();

    assert!(storage.time_series_names(root.id).unwrap().is_empty());
    assert!(storage.time_series_data_versions(root.id).unwrap().is_empty());
    assert!(storage.double_time_series_data(root.id, &names(&["ts"]), 1).unwrap().is_empty());
}

pub fn empty_chunks_are_dropped(storage: &dyn AppStorage) {
    let root = root(storage);
    storage.create_time_series(root.id, series("ts", TimeSeriesDataType::Double)).unwrap();
    let chunk = DoubleDataChunk::uncompressed(0, vec![]);
    storage.add_double_time_series_data(root.id, 1, "ts", vec![chunk]).unwrap();
    storage.flush().unwrap();
    assert!(storage.time_series_data_versions(root.id).unwrap().is_empty());
}

pub fn buffered_writes_precede_later_mutations(storage: &dyn AppStorage) {
    let root = root(storage);
    storage.create_time_series(root.id, series("ts", TimeSeriesDataType::Double)).unwrap();
    let chunk = DoubleDataChunk::uncompressed(0, vec![1.0]);
    storage.add_double_time_series_data(root.id, 4, "ts", vec![chunk]).unwrap();
    // Any other mutation applies the queued time-series writes first.
    storage.set_description(root.id, "after").unwrap();
    assert!(storage.time_series_exists(root.id, "ts").unwrap());
    assert_eq!(
        storage.time_series_data_versions_of(root.id, "ts").unwrap(),
        [4].into_iter().collect()
    );
}

pub fn events_are_published(storage: &dyn AppStorage) {
    let root = root(storage);
    storage.flush().unwrap();
    let bus = storage.events_bus();
    let mut rx = bus.subscribe();
    let node = folder(storage, root.id, "evented");
    storage.set_consistent(node.id).unwrap();
    write_blob(storage, node.id, "blob", b"xyz");
    storage.flush().unwrap();

    // Earlier events may still be in flight on remote backends.
    let deadline = Instant::now() + Duration::from_secs(5);
    let mut events = Vec::new();
    while events.len() < 3 && Instant::now() < deadline {
        events.extend(collect_events(&mut rx, 1).into_iter().filter(|e| e.id() == node.id));
    }
    assert_eq!(
        events,
        vec![
            NodeEvent::NodeCreated {
                id: node.id,
                parent_id: Some(root.id)
            },
            NodeEvent::NodeConsistent { id: node.id },
            NodeEvent::NodeDataUpdated {
                id: node.id,
                data_name: "blob".into()
            },
        ]
    );
}

pub fn expired_inconsistent_nodes_are_repaired(storage: &dyn AppStorage) {
    let root = root(storage);
    let stale = folder(storage, root.id, "stale");
    let kept = folder(storage, root.id, "kept");
    storage.set_consistent(kept.id).unwrap();
    assert!(storage
        .supported_file_system_checks()
        .contains(&FileSystemCheckKind::ExpiredInconsistent));

    let cutoff = chrono::Utc::now() + chrono::Duration::hours(1);
    let report = FileSystemCheckOptions::builder()
        .drop_inconsistent_nodes_older_than(cutoff)
        .build()
        .unwrap();
    let issues = storage.check_file_system(&report).unwrap();
    assert_eq!(issues.len(), 1);
    assert_eq!(issues[0].node_id, stale.id);
    assert!(!issues[0].repaired);
    assert!(storage.node_info(stale.id).is_ok());

    let repair = FileSystemCheckOptions::builder()
        .drop_inconsistent_nodes_older_than(cutoff)
        .repair()
        .build()
        .unwrap();
    let issues = storage.check_file_system(&repair).unwrap();
    assert!(issues[0].repaired);
    assert!(matches!(storage.node_info(stale.id), Err(StorageError::NotFound(_))));
    assert!(storage.node_info(kept.id).is_ok());
}

pub fn closed_storage_rejects_calls(storage: &dyn AppStorage) {
    let root = root(storage);
    assert!(!storage.is_closed());
    storage.close().unwrap();
    assert!(storage.is_closed());
    assert!(matches!(storage.node_info(root.id), Err(StorageError::Closed)));
}

pub fn orphan_repair_spares_same_named_sibling(
    storage: &dyn AppStorage,
    damage: &dyn LayoutDamage,
) {
    let root = root(storage);
    let listed = folder(storage, root.id, "a");
    let stray = damage.insert_unlisted_node(root.id, "a");

    let repair = FileSystemCheckOptions::builder()
        .kind(FileSystemCheckKind::OrphanNode)
        .repair()
        .build()
        .unwrap();
    let issues = storage.check_file_system(&repair).unwrap();
    assert_eq!(issues.len(), 1);
    assert_eq!(issues[0].node_id, stray);
    assert!(issues[0].repaired);

    assert!(matches!(storage.node_info(stray), Err(StorageError::NotFound(_))));
    assert_eq!(storage.child_node(root.id, "a").unwrap().map(|n| n.id), Some(listed.id));
    assert!(storage.check_file_system(&repair).unwrap().is_empty());
}

pub fn orphan_data_leaves_no_names(storage: &dyn AppStorage, damage: &dyn LayoutDamage) {
    let root = root(storage);
    let a = folder(storage, root.id, "a");
    write_blob(storage, a.id, "blob", b"bytes");
    damage.drop_node_record(a.id);
    assert_eq!(storage.data_names(a.id).unwrap(), names(&["blob"]));

    let repair = FileSystemCheckOptions::builder()
        .kind(FileSystemCheckKind::OrphanData)
        .repair()
        .build()
        .unwrap();
    let issues = storage.check_file_system(&repair).unwrap();
    assert_eq!(issues.len(), 1);
    assert_eq!(issues[0].node_id, a.id);
    assert!(issues[0].repaired);
    assert!(storage.data_names(a.id).unwrap().is_empty());
    assert!(!storage.data_exists(a.id, "blob").unwrap());
}

#[cfg(test)]
mod tests {
    use crate::{InMemoryAppStorage, StorageConfig};

    fn memory() -> Box<InMemoryAppStorage> {
        let config = StorageConfig::default().with_chunk_size(super::CONTRACT_CHUNK_SIZE);
        Box::new(InMemoryAppStorage::in_memory("contract", config).unwrap())
    }

    fn damage(storage: &Box<InMemoryAppStorage>) -> &dyn super::LayoutDamage {
        &**storage
    }

    crate::storage_contract_tests!(memory());
    crate::storage_repair_tests!(memory(), damage);
}
