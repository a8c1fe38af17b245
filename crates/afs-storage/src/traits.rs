use std::collections::{BTreeMap, BTreeSet};
use std::io::Read;
use std::sync::Arc;

use afs_types::{
    DoubleDataChunk, FileSystemCheckIssue, FileSystemCheckKind, FileSystemCheckOptions,
    NodeDependency, NodeGenericMetadata, NodeId, NodeInfo, StringDataChunk, TimeSeriesMetadata,
};

use crate::error::StorageResult;
use crate::events::EventsBus;
use crate::stream::BinaryDataWriter;

/// Read stream over a stored blob.
pub type BinaryDataReader<'a> = Box<dyn Read + Send + 'a>;

/// The storage contract of an application file system.
///
/// Every backend (in-memory, sled, remote) implements this trait with the
/// same observable semantics. Implementations must be `Send + Sync`.
///
/// Time-series creation and data appends are buffered; they become visible
/// to reads after [`flush`](AppStorage::flush) or after any other mutation,
/// which drains the buffer first.
pub trait AppStorage: Send + Sync {
    // -- identity -----------------------------------------------------------

    fn file_system_name(&self) -> &str;

    fn is_remote(&self) -> bool;

    // -- node tree ----------------------------------------------------------

    /// Return the root node, creating it on first call.
    fn create_root_node_if_not_exists(
        &self,
        name: &str,
        pseudo_class: &str,
    ) -> StorageResult<NodeInfo>;

    /// Create a child of `parent_id`. The node starts inconsistent.
    fn create_node(
        &self,
        parent_id: NodeId,
        name: &str,
        pseudo_class: &str,
        description: &str,
        version: i32,
        metadata: NodeGenericMetadata,
    ) -> StorageResult<NodeInfo>;

    fn node_info(&self, id: NodeId) -> StorageResult<NodeInfo>;

    fn is_writable(&self, id: NodeId) -> StorageResult<bool>;

    fn is_consistent(&self, id: NodeId) -> StorageResult<bool>;

    fn set_consistent(&self, id: NodeId) -> StorageResult<()>;

    /// Every node still marked inconsistent.
    fn inconsistent_nodes(&self) -> StorageResult<Vec<NodeInfo>>;

    fn set_description(&self, id: NodeId, description: &str) -> StorageResult<()>;

    fn update_modification_time(&self, id: NodeId) -> StorageResult<()>;

    fn rename_node(&self, id: NodeId, name: &str) -> StorageResult<()>;

    fn set_metadata(&self, id: NodeId, metadata: NodeGenericMetadata) -> StorageResult<()>;

    fn child_nodes(&self, id: NodeId) -> StorageResult<Vec<NodeInfo>>;

    fn child_node(&self, id: NodeId, name: &str) -> StorageResult<Option<NodeInfo>>;

    /// `None` for the root.
    fn parent_node(&self, id: NodeId) -> StorageResult<Option<NodeInfo>>;

    fn set_parent_node(&self, id: NodeId, new_parent_id: NodeId) -> StorageResult<()>;

    /// Delete the node and its whole subtree. Returns the former parent.
    fn delete_node(&self, id: NodeId) -> StorageResult<Option<NodeId>>;

    // -- binary data --------------------------------------------------------

    /// `None` if no blob of that name exists.
    fn read_binary_data(
        &self,
        id: NodeId,
        name: &str,
    ) -> StorageResult<Option<BinaryDataReader<'_>>>;

    /// Open a write stream replacing the blob on its first chunk.
    fn write_binary_data(
        &self,
        id: NodeId,
        name: &str,
    ) -> StorageResult<Box<dyn BinaryDataWriter + '_>>;

    fn data_exists(&self, id: NodeId, name: &str) -> StorageResult<bool>;

    /// Names from the blob index; an unknown id has none.
    fn data_names(&self, id: NodeId) -> StorageResult<BTreeSet<String>>;

    /// Returns `false` if there was nothing to remove.
    fn remove_data(&self, id: NodeId, name: &str) -> StorageResult<bool>;

    // -- time series --------------------------------------------------------

    fn create_time_series(&self, id: NodeId, metadata: TimeSeriesMetadata) -> StorageResult<()>;

    fn time_series_names(&self, id: NodeId) -> StorageResult<BTreeSet<String>>;

    fn time_series_exists(&self, id: NodeId, name: &str) -> StorageResult<bool>;

    fn time_series_metadata(
        &self,
        id: NodeId,
        names: &BTreeSet<String>,
    ) -> StorageResult<Vec<TimeSeriesMetadata>>;

    /// Data versions across all series of the node.
    fn time_series_data_versions(&self, id: NodeId) -> StorageResult<BTreeSet<i32>>;

    fn time_series_data_versions_of(&self, id: NodeId, name: &str) -> StorageResult<BTreeSet<i32>>;

    /// Chunks per series name, ordered by offset. Names without data are absent.
    fn double_time_series_data(
        &self,
        id: NodeId,
        names: &BTreeSet<String>,
        version: i32,
    ) -> StorageResult<BTreeMap<String, Vec<DoubleDataChunk>>>;

    fn add_double_time_series_data(
        &self,
        id: NodeId,
        version: i32,
        name: &str,
        chunks: Vec<DoubleDataChunk>,
    ) -> StorageResult<()>;

    fn string_time_series_data(
        &self,
        id: NodeId,
        names: &BTreeSet<String>,
        version: i32,
    ) -> StorageResult<BTreeMap<String, Vec<StringDataChunk>>>;

    fn add_string_time_series_data(
        &self,
        id: NodeId,
        version: i32,
        name: &str,
        chunks: Vec<StringDataChunk>,
    ) -> StorageResult<()>;

    /// Remove every series of the node with all versions and chunks.
    fn clear_time_series(&self, id: NodeId) -> StorageResult<()>;

    // -- dependencies -------------------------------------------------------

    fn add_dependency(&self, from: NodeId, name: &str, to: NodeId) -> StorageResult<()>;

    fn dependencies_named(&self, from: NodeId, name: &str) -> StorageResult<Vec<NodeInfo>>;

    fn dependencies(&self, from: NodeId) -> StorageResult<Vec<NodeDependency>>;

    fn backward_dependencies(&self, to: NodeId) -> StorageResult<Vec<NodeInfo>>;

    fn remove_dependency(&self, from: NodeId, name: &str, to: NodeId) -> StorageResult<()>;

    // -- maintenance --------------------------------------------------------

    fn supported_file_system_checks(&self) -> Vec<FileSystemCheckKind>;

    fn check_file_system(
        &self,
        options: &FileSystemCheckOptions,
    ) -> StorageResult<Vec<FileSystemCheckIssue>>;

    fn events_bus(&self) -> Arc<dyn EventsBus>;

    /// Apply buffered changes, then publish pending events.
    fn flush(&self) -> StorageResult<()>;

    /// Flush and release the backend. Later calls fail with `Closed`.
    fn close(&self) -> StorageResult<()>;

    fn is_closed(&self) -> bool;
}
