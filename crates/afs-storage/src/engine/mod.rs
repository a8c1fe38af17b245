//! Shared storage engine over any [`ColumnStore`].
//!
//! [`ColumnAppStorage`] implements [`AppStorage`] once; backends differ only
//! in the column store they plug in. The submodules split the operations by
//! concern: node tree, dependencies, blobs, time series and checks.

mod blobs;
mod check;
mod dependencies;
mod nodes;
pub(crate) mod rows;
mod timeseries;

use std::collections::{BTreeMap, BTreeSet};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex, MutexGuard};

use afs_types::{
    DoubleDataChunk, FileSystemCheckIssue, FileSystemCheckKind, FileSystemCheckOptions,
    NodeDependency, NodeEvent, NodeGenericMetadata, NodeId, NodeInfo, StringDataChunk,
    TimeSeriesMetadata,
};
use tracing::{debug, error, info};

use crate::buffer::{BufferedOperation, ChangeBuffer};
use crate::column::memory::InMemoryColumnStore;
use crate::column::{ColumnFamily, ColumnStore, WriteBatch};
use crate::config::StorageConfig;
use crate::error::{StorageError, StorageResult};
use crate::events::{EventsBus, InMemoryEventsBus};
use crate::stream::BinaryDataWriter;
use crate::traits::{AppStorage, BinaryDataReader};

pub use check::ConsistencyChecker;

use rows::{child_key, decode, encode, node_key, NodeRow};

/// Storage engine implementing [`AppStorage`] on a column store.
pub struct ColumnAppStorage<S: ColumnStore> {
    file_system_name: String,
    store: S,
    config: StorageConfig,
    buffer: Mutex<ChangeBuffer>,
    events: Arc<dyn EventsBus>,
    // Serializes root creation.
    root_lock: Mutex<()>,
    closed: AtomicBool,
}

/// The engine over an in-memory column store.
pub type InMemoryAppStorage = ColumnAppStorage<InMemoryColumnStore>;

impl InMemoryAppStorage {
    pub fn in_memory(
        file_system_name: impl Into<String>,
        config: StorageConfig,
    ) -> StorageResult<Self> {
        Self::new(file_system_name, InMemoryColumnStore::new(), config)
    }
}

impl<S: ColumnStore> ColumnAppStorage<S> {
    pub fn new(
        file_system_name: impl Into<String>,
        store: S,
        config: StorageConfig,
    ) -> StorageResult<Self> {
        let events = Arc::new(InMemoryEventsBus::new(
            config.events_channel_capacity,
            config.events_flush_threshold,
        ));
        Self::with_events_bus(file_system_name, store, config, events)
    }

    pub fn with_events_bus(
        file_system_name: impl Into<String>,
        store: S,
        config: StorageConfig,
        events: Arc<dyn EventsBus>,
    ) -> StorageResult<Self> {
        config.validate()?;
        let file_system_name = file_system_name.into();
        info!(
            file_system = %file_system_name,
            backend = store.backend_name(),
            "opened storage"
        );
        Ok(Self {
            file_system_name,
            buffer: Mutex::new(ChangeBuffer::from_config(&config)),
            store,
            config,
            events,
            root_lock: Mutex::new(()),
            closed: AtomicBool::new(false),
        })
    }

    pub fn store(&self) -> &S {
        &self.store
    }

    pub fn config(&self) -> &StorageConfig {
        &self.config
    }

    /// Run the consistency checks described by `options`.
    pub fn checker(&self) -> ConsistencyChecker<'_, S> {
        ConsistencyChecker::new(self)
    }

    fn ensure_open(&self) -> StorageResult<()> {
        if self.closed.load(Ordering::Acquire) {
            return Err(StorageError::Closed);
        }
        Ok(())
    }

    pub(crate) fn push_events(&self, events: impl IntoIterator<Item = NodeEvent>) {
        for event in events {
            debug!(event = %event, "event queued");
            self.events.push_event(event);
        }
    }

    pub(crate) fn load_node(&self, id: NodeId) -> StorageResult<Option<NodeRow>> {
        self.store
            .get(ColumnFamily::Nodes, &node_key(id))?
            .map(|bytes| decode(&bytes))
            .transpose()
    }

    pub(crate) fn require_node(&self, id: NodeId) -> StorageResult<NodeRow> {
        self.load_node(id)?.ok_or(StorageError::NotFound(id))
    }

    pub(crate) fn node_exists(&self, id: NodeId) -> StorageResult<bool> {
        self.store.contains(ColumnFamily::Nodes, &node_key(id))
    }

    /// Write the node's own record and, if it has a parent, its child row.
    pub(crate) fn put_node(
        &self,
        batch: &mut WriteBatch,
        id: NodeId,
        row: &NodeRow,
    ) -> StorageResult<()> {
        batch.put(ColumnFamily::Nodes, node_key(id), encode(row)?);
        if let Some(parent) = row.parent_id {
            let child = encode(&row.child_row(id))?;
            batch.put(ColumnFamily::Children, child_key(parent, &row.name), child);
        }
        Ok(())
    }

    fn lock_buffer(&self) -> StorageResult<MutexGuard<'_, ChangeBuffer>> {
        self.buffer
            .lock()
            .map_err(|_| StorageError::Backend("change buffer lock poisoned".into()))
    }

    /// Apply buffered time-series operations. Every mutation calls this first.
    pub(crate) fn flush_buffer(&self) -> StorageResult<()> {
        let mut buffer = self.lock_buffer()?;
        self.apply_buffered(&mut buffer)
    }

    pub(crate) fn enqueue(&self, operation: BufferedOperation) -> StorageResult<()> {
        let mut buffer = self.lock_buffer()?;
        self.validate_buffered(&buffer, &operation)?;
        if buffer.push(operation)? {
            self.apply_buffered(&mut buffer)?;
        }
        Ok(())
    }

    // Runs with the buffer lock held.
    fn apply_buffered(&self, buffer: &mut ChangeBuffer) -> StorageResult<()> {
        if buffer.is_empty() {
            return Ok(());
        }
        let (operations, stats) = buffer.drain();
        let mut batch = WriteBatch::new();
        let mut events = Vec::with_capacity(operations.len());
        for operation in &operations {
            self.buffered_mutations(operation, &mut batch, &mut events)?;
        }
        if let Err(e) = self.store.apply(batch) {
            error!(
                operations = stats.operations,
                error = %e,
                "failed to apply buffered changes, discarding them"
            );
            return Err(e);
        }
        info!(
            series_created = stats.series_created,
            chunks_added = stats.chunks_added,
            bytes = stats.serialized_size,
            "applied buffered changes"
        );
        self.push_events(events);
        Ok(())
    }

    /// Apply buffered changes and publish pending events.
    pub fn flush_all(&self) -> StorageResult<()> {
        self.flush_buffer()?;
        self.events.flush();
        Ok(())
    }
}

impl<S: ColumnStore> AppStorage for ColumnAppStorage<S> {
    fn file_system_name(&self) -> &str {
        &self.file_system_name
    }

    fn is_remote(&self) -> bool {
        false
    }

    fn create_root_node_if_not_exists(
        &self,
        name: &str,
        pseudo_class: &str,
    ) -> StorageResult<NodeInfo> {
        self.ensure_open()?;
        self.root_node(name, pseudo_class)
    }

    fn create_node(
        &self,
        parent_id: NodeId,
        name: &str,
        pseudo_class: &str,
        description: &str,
        version: i32,
        metadata: NodeGenericMetadata,
    ) -> StorageResult<NodeInfo> {
        self.ensure_open()?;
        self.insert_node(parent_id, name, pseudo_class, description, version, metadata)
    }

    fn node_info(&self, id: NodeId) -> StorageResult<NodeInfo> {
        self.ensure_open()?;
        Ok(self.require_node(id)?.to_info(id))
    }

    fn is_writable(&self, id: NodeId) -> StorageResult<bool> {
        self.ensure_open()?;
        self.require_node(id)?;
        Ok(true)
    }

    fn is_consistent(&self, id: NodeId) -> StorageResult<bool> {
        self.ensure_open()?;
        Ok(self.require_node(id)?.is_consistent())
    }

    fn set_consistent(&self, id: NodeId) -> StorageResult<()> {
        self.ensure_open()?;
        self.mark_consistent(id)
    }

    fn inconsistent_nodes(&self) -> StorageResult<Vec<NodeInfo>> {
        self.ensure_open()?;
        self.scan_inconsistent()
    }

    fn set_description(&self, id: NodeId, description: &str) -> StorageResult<()> {
        self.ensure_open()?;
        self.update_node(id, |row| {
            row.description = description.to_string();
            NodeEvent::NodeDescriptionUpdated {
                id,
                description: description.to_string(),
            }
        })
    }

    fn update_modification_time(&self, id: NodeId) -> StorageResult<()> {
        self.ensure_open()?;
        let now = afs_types::epoch_millis();
        self.update_node(id, |row| {
            row.modification_time = now;
            NodeEvent::NodeModificationTimeUpdated {
                id,
                modification_time: now,
            }
        })
    }

    fn rename_node(&self, id: NodeId, name: &str) -> StorageResult<()> {
        self.ensure_open()?;
        self.rename(id, name)
    }

    fn set_metadata(&self, id: NodeId, metadata: NodeGenericMetadata) -> StorageResult<()> {
        self.ensure_open()?;
        self.update_node(id, |row| {
            row.metadata = metadata.clone();
            NodeEvent::NodeMetadataUpdated { id, metadata }
        })
    }

    fn child_nodes(&self, id: NodeId) -> StorageResult<Vec<NodeInfo>> {
        self.ensure_open()?;
        self.children(id)
    }

    fn child_node(&self, id: NodeId, name: &str) -> StorageResult<Option<NodeInfo>> {
        self.ensure_open()?;
        self.child(id, name)
    }

    fn parent_node(&self, id: NodeId) -> StorageResult<Option<NodeInfo>> {
        self.ensure_open()?;
        self.parent(id)
    }

    fn set_parent_node(&self, id: NodeId, new_parent_id: NodeId) -> StorageResult<()> {
        self.ensure_open()?;
        self.move_node(id, new_parent_id)
    }

    fn delete_node(&self, id: NodeId) -> StorageResult<Option<NodeId>> {
        self.ensure_open()?;
        self.remove_node(id)
    }

    fn read_binary_data(
        &self,
        id: NodeId,
        name: &str,
    ) -> StorageResult<Option<BinaryDataReader<'_>>> {
        self.ensure_open()?;
        self.open_blob_reader(id, name)
    }

    fn write_binary_data(
        &self,
        id: NodeId,
        name: &str,
    ) -> StorageResult<Box<dyn BinaryDataWriter + '_>> {
        self.ensure_open()?;
        self.open_blob_writer(id, name)
    }

    fn data_exists(&self, id: NodeId, name: &str) -> StorageResult<bool> {
        self.ensure_open()?;
        self.blob_exists(id, name)
    }

    fn data_names(&self, id: NodeId) -> StorageResult<BTreeSet<String>> {
        self.ensure_open()?;
        self.blob_names(id)
    }

    fn remove_data(&self, id: NodeId, name: &str) -> StorageResult<bool> {
        self.ensure_open()?;
        self.remove_blob(id, name)
    }

    fn create_time_series(&self, id: NodeId, metadata: TimeSeriesMetadata) -> StorageResult<()> {
        self.ensure_open()?;
        self.enqueue(BufferedOperation::CreateTimeSeries { node_id: id, metadata })
    }

    fn time_series_names(&self, id: NodeId) -> StorageResult<BTreeSet<String>> {
        self.ensure_open()?;
        self.series_names(id)
    }

    fn time_series_exists(&self, id: NodeId, name: &str) -> StorageResult<bool> {
        self.ensure_open()?;
        self.series_exists(id, name)
    }

    fn time_series_metadata(
        &self,
        id: NodeId,
        names: &BTreeSet<String>,
    ) -> StorageResult<Vec<TimeSeriesMetadata>> {
        self.ensure_open()?;
        self.series_metadata(id, names)
    }

    fn time_series_data_versions(&self, id: NodeId) -> StorageResult<BTreeSet<i32>> {
        self.ensure_open()?;
        self.data_versions(id, None)
    }

    fn time_series_data_versions_of(&self, id: NodeId, name: &str) -> StorageResult<BTreeSet<i32>> {
        self.ensure_open()?;
        self.data_versions(id, Some(name))
    }

    fn double_time_series_data(
        &self,
        id: NodeId,
        names: &BTreeSet<String>,
        version: i32,
    ) -> StorageResult<BTreeMap<String, Vec<DoubleDataChunk>>> {
        self.ensure_open()?;
        self.read_series_data(id, names, version)
    }

    fn add_double_time_series_data(
        &self,
        id: NodeId,
        version: i32,
        name: &str,
        chunks: Vec<DoubleDataChunk>,
    ) -> StorageResult<()> {
        self.ensure_open()?;
        let chunks = timeseries::non_empty(chunks)?;
        if chunks.is_empty() {
            return Ok(());
        }
        self.enqueue(BufferedOperation::AddDoubleData {
            node_id: id,
            version,
            name: name.to_string(),
            chunks,
        })
    }

    fn string_time_series_data(
        &self,
        id: NodeId,
        names: &BTreeSet<String>,
        version: i32,
    ) -> StorageResult<BTreeMap<String, Vec<StringDataChunk>>> {
        self.ensure_open()?;
        self.read_series_data(id, names, version)
    }

    fn add_string_time_series_data(
        &self,
        id: NodeId,
        version: i32,
        name: &str,
        chunks: Vec<StringDataChunk>,
    ) -> StorageResult<()> {
        self.ensure_open()?;
        let chunks = timeseries::non_empty(chunks)?;
        if chunks.is_empty() {
            return Ok(());
        }
        self.enqueue(BufferedOperation::AddStringData {
            node_id: id,
            version,
            name: name.to_string(),
            chunks,
        })
    }

    fn clear_time_series(&self, id: NodeId) -> StorageResult<()> {
        self.ensure_open()?;
        self.clear_series(id)
    }

    fn add_dependency(&self, from: NodeId, name: &str, to: NodeId) -> StorageResult<()> {
        self.ensure_open()?;
        self.insert_dependency(from, name, to)
    }

    fn dependencies_named(&self, from: NodeId, name: &str) -> StorageResult<Vec<NodeInfo>> {
        self.ensure_open()?;
        self.resolve_dependencies(from, name)
    }

    fn dependencies(&self, from: NodeId) -> StorageResult<Vec<NodeDependency>> {
        self.ensure_open()?;
        self.all_dependencies(from)
    }

    fn backward_dependencies(&self, to: NodeId) -> StorageResult<Vec<NodeInfo>> {
        self.ensure_open()?;
        self.resolve_backward(to)
    }

    fn remove_dependency(&self, from: NodeId, name: &str, to: NodeId) -> StorageResult<()> {
        self.ensure_open()?;
        self.delete_dependency(from, name, to)
    }

    fn supported_file_system_checks(&self) -> Vec<FileSystemCheckKind> {
        FileSystemCheckKind::ALL.to_vec()
    }

    fn check_file_system(
        &self,
        options: &FileSystemCheckOptions,
    ) -> StorageResult<Vec<FileSystemCheckIssue>> {
        self.ensure_open()?;
        self.flush_buffer()?;
        let issues = self.checker().run(options)?;
        self.events.flush();
        Ok(issues)
    }

    fn events_bus(&self) -> Arc<dyn EventsBus> {
        Arc::clone(&self.events)
    }

    fn flush(&self) -> StorageResult<()> {
        self.ensure_open()?;
        self.flush_all()
    }

    fn close(&self) -> StorageResult<()> {
        if self.closed.load(Ordering::Acquire) {
            return Ok(());
        }
        self.flush_all()?;
        self.store.flush()?;
        self.closed.store(true, Ordering::Release);
        info!(file_system = %self.file_system_name, "closed storage");
        Ok(())
    }

    fn is_closed(&self) -> bool {
        self.closed.load(Ordering::Acquire)
    }
}
