use std::collections::{BTreeMap, BTreeSet};
use std::io::{self, Cursor, Write};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex, MutexGuard};

use afs_protocol::{ProtocolError, StorageRequest, StorageResponse};
use afs_storage::{
    AppStorage, BinaryDataReader, BinaryDataWriter, BufferedOperation, ChangeBuffer, EventsBus,
    InMemoryEventsBus, StorageError, StorageResult,
};
use afs_types::{
    DoubleDataChunk, FileSystemCheckIssue, FileSystemCheckKind, FileSystemCheckOptions,
    NodeDependency, NodeGenericMetadata, NodeId, NodeInfo, StringDataChunk, TimeSeriesMetadata,
};
use tracing::{debug, error, info, warn};

use crate::client::RpcClient;
use crate::config::RemoteConfig;
use crate::listener::EventListener;

/// Send a request and unwrap the expected response variant.
macro_rules! rpc {
    ($self:expr, $request:expr => $variant:ident) => {{
        let request = $request;
        let name = request.type_name();
        match $self.call(request)? {
            StorageResponse::$variant(value) => Ok(value),
            other => Err(unexpected(name, &other)),
        }
    }};
    ($self:expr, $request:expr) => {{
        let request = $request;
        let name = request.type_name();
        match $self.call(request)? {
            StorageResponse::Unit => Ok(()),
            other => Err(unexpected(name, &other)),
        }
    }};
}

fn unexpected(request: &'static str, got: &StorageResponse) -> StorageError {
    ProtocolError::UnexpectedResponse {
        request,
        got: got.type_name(),
    }
    .into()
}

/// `AppStorage` backed by a remote storage server.
///
/// Time-series writes are buffered locally and shipped in one request when
/// the buffer fills, on [`flush`](AppStorage::flush), or before any other
/// mutation. Events arrive over a WebSocket and are republished on a local
/// bus.
pub struct RemoteAppStorage {
    config: RemoteConfig,
    client: RpcClient,
    buffer: Mutex<ChangeBuffer>,
    events: Arc<InMemoryEventsBus>,
    listener: Mutex<Option<EventListener>>,
    closed: AtomicBool,
}

impl RemoteAppStorage {
    /// Connect to the server and subscribe to its events.
    pub fn connect(config: RemoteConfig) -> StorageResult<Self> {
        config.storage.validate()?;
        let client = RpcClient::new(&config)?;
        client.health()?;
        let events = Arc::new(InMemoryEventsBus::new(
            config.storage.events_channel_capacity,
            config.storage.events_flush_threshold,
        ));
        let listener = if config.events {
            Some(EventListener::spawn(&config.events_url()?, events.clone())?)
        } else {
            None
        };
        info!(
            url = %config.base_url,
            file_system = %config.file_system_name,
            "connected to remote storage"
        );
        Ok(Self {
            buffer: Mutex::new(ChangeBuffer::from_config(&config.storage)),
            config,
            client,
            events,
            listener: Mutex::new(listener),
            closed: AtomicBool::new(false),
        })
    }

    pub fn config(&self) -> &RemoteConfig {
        &self.config
    }

    fn ensure_open(&self) -> StorageResult<()> {
        if self.closed.load(Ordering::Acquire) {
            return Err(StorageError::Closed);
        }
        Ok(())
    }

    fn lock_buffer(&self) -> StorageResult<MutexGuard<'_, ChangeBuffer>> {
        self.buffer
            .lock()
            .map_err(|_| StorageError::Backend("change buffer lock poisoned".into()))
    }

    /// Mutations ship the buffered time-series writes first.
    fn call(&self, request: StorageRequest) -> StorageResult<StorageResponse> {
        self.ensure_open()?;
        if !request.is_read_only() {
            self.flush_buffer()?;
        }
        self.client.call(&request)
    }

    fn flush_buffer(&self) -> StorageResult<()> {
        let mut buffer = self.lock_buffer()?;
        self.ship(&mut buffer)
    }

    // Runs with the buffer lock held so batches reach the server in order.
    fn ship(&self, buffer: &mut ChangeBuffer) -> StorageResult<()> {
        if buffer.is_empty() {
            return Ok(());
        }
        let (operations, stats) = buffer.drain();
        match self.client.call(&StorageRequest::ApplyBuffered { operations }) {
            Ok(_) => {
                debug!(
                    operations = stats.operations,
                    bytes = stats.serialized_size,
                    "shipped buffered changes"
                );
                Ok(())
            }
            Err(e) => {
                error!(
                    operations = stats.operations,
                    error = %e,
                    "failed to ship buffered changes, discarding them"
                );
                Err(e)
            }
        }
    }

    fn enqueue(&self, operation: BufferedOperation) -> StorageResult<()> {
        self.ensure_open()?;
        let mut buffer = self.lock_buffer()?;
        if buffer.push(operation)? {
            self.ship(&mut buffer)?;
        }
        Ok(())
    }

    fn stop_listener(&self) {
        match self.listener.lock() {
            Ok(mut listener) => {
                if let Some(mut listener) = listener.take() {
                    listener.stop();
                }
            }
            Err(_) => warn!("event listener lock poisoned"),
        }
    }
}

/// Collects a blob in memory and uploads it on close.
struct RemoteBlobWriter<'a> {
    storage: &'a RemoteAppStorage,
    id: NodeId,
    name: String,
    data: Vec<u8>,
    closed: bool,
}

impl Write for RemoteBlobWriter<'_> {
    fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
        self.data.extend_from_slice(buf);
        Ok(buf.len())
    }

    fn flush(&mut self) -> io::Result<()> {
        Ok(())
    }
}

impl BinaryDataWriter for RemoteBlobWriter<'_> {
    fn close(mut self: Box<Self>) -> StorageResult<()> {
        self.closed = true;
        let request = StorageRequest::WriteBinaryData {
            id: self.id,
            name: std::mem::take(&mut self.name),
            data: std::mem::take(&mut self.data),
        };
        rpc!(self.storage, request)
    }
}

impl Drop for RemoteBlobWriter<'_> {
    fn drop(&mut self) {
        if !self.closed {
            warn!(
                node = %self.id,
                data_name = %self.name,
                bytes = self.data.len(),
                "blob writer dropped without close, nothing written"
            );
        }
    }
}

impl AppStorage for RemoteAppStorage {
    fn file_system_name(&self) -> &str {
        &self.config.file_system_name
    }

    fn is_remote(&self) -> bool {
        true
    }

    fn create_root_node_if_not_exists(
        &self,
        name: &str,
        pseudo_class: &str,
    ) -> StorageResult<NodeInfo> {
        rpc!(self, StorageRequest::CreateRootNode {
            name: name.to_string(),
            pseudo_class: pseudo_class.to_string(),
        } => Node)
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
        rpc!(self, StorageRequest::CreateNode {
            parent_id,
            name: name.to_string(),
            pseudo_class: pseudo_class.to_string(),
            description: description.to_string(),
            version,
            metadata,
        } => Node)
    }

    fn node_info(&self, id: NodeId) -> StorageResult<NodeInfo> {
        rpc!(self, StorageRequest::NodeInfo { id } => Node)
    }

    fn is_writable(&self, id: NodeId) -> StorageResult<bool> {
        rpc!(self, StorageRequest::IsWritable { id } => Bool)
    }

    fn is_consistent(&self, id: NodeId) -> StorageResult<bool> {
        rpc!(self, StorageRequest::IsConsistent { id } => Bool)
    }

    fn set_consistent(&self, id: NodeId) -> StorageResult<()> {
        rpc!(self, StorageRequest::SetConsistent { id })
    }

    fn inconsistent_nodes(&self) -> StorageResult<Vec<NodeInfo>> {
        rpc!(self, StorageRequest::InconsistentNodes => Nodes)
    }

    fn set_description(&self, id: NodeId, description: &str) -> StorageResult<()> {
        rpc!(self, StorageRequest::SetDescription {
            id,
            description: description.to_string(),
        })
    }

    fn update_modification_time(&self, id: NodeId) -> StorageResult<()> {
        rpc!(self, StorageRequest::UpdateModificationTime { id })
    }

    fn rename_node(&self, id: NodeId, name: &str) -> StorageResult<()> {
        rpc!(self, StorageRequest::RenameNode {
            id,
            name: name.to_string(),
        })
    }

    fn set_metadata(&self, id: NodeId, metadata: NodeGenericMetadata) -> StorageResult<()> {
        rpc!(self, StorageRequest::SetMetadata { id, metadata })
    }

    fn child_nodes(&self, id: NodeId) -> StorageResult<Vec<NodeInfo>> {
        rpc!(self, StorageRequest::ChildNodes { id } => Nodes)
    }

    fn child_node(&self, id: NodeId, name: &str) -> StorageResult<Option<NodeInfo>> {
        rpc!(self, StorageRequest::ChildNode {
            id,
            name: name.to_string(),
        } => OptionalNode)
    }

    fn parent_node(&self, id: NodeId) -> StorageResult<Option<NodeInfo>> {
        rpc!(self, StorageRequest::ParentNode { id } => OptionalNode)
    }

    fn set_parent_node(&self, id: NodeId, new_parent_id: NodeId) -> StorageResult<()> {
        rpc!(self, StorageRequest::SetParentNode { id, new_parent_id })
    }

    fn delete_node(&self, id: NodeId) -> StorageResult<Option<NodeId>> {
        rpc!(self, StorageRequest::DeleteNode { id } => OptionalId)
    }

    fn read_binary_data(
        &self,
        id: NodeId,
        name: &str,
    ) -> StorageResult<Option<BinaryDataReader<'_>>> {
        let data = rpc!(self, StorageRequest::ReadBinaryData {
            id,
            name: name.to_string(),
        } => BinaryData)?;
        Ok(data.map(|bytes| Box::new(Cursor::new(bytes)) as BinaryDataReader<'_>))
    }

    fn write_binary_data(
        &self,
        id: NodeId,
        name: &str,
    ) -> StorageResult<Box<dyn BinaryDataWriter + '_>> {
        self.ensure_open()?;
        Ok(Box::new(RemoteBlobWriter {
            storage: self,
            id,
            name: name.to_string(),
            data: Vec::new(),
            closed: false,
        }))
    }

    fn data_exists(&self, id: NodeId, name: &str) -> StorageResult<bool> {
        rpc!(self, StorageRequest::DataExists {
            id,
            name: name.to_string(),
        } => Bool)
    }

    fn data_names(&self, id: NodeId) -> StorageResult<BTreeSet<String>> {
        rpc!(self, StorageRequest::DataNames { id } => Names)
    }

    fn remove_data(&self, id: NodeId, name: &str) -> StorageResult<bool> {
        rpc!(self, StorageRequest::RemoveData {
            id,
            name: name.to_string(),
        } => Bool)
    }

    fn create_time_series(&self, id: NodeId, metadata: TimeSeriesMetadata) -> StorageResult<()> {
        self.enqueue(BufferedOperation::CreateTimeSeries { node_id: id, metadata })
    }

    fn time_series_names(&self, id: NodeId) -> StorageResult<BTreeSet<String>> {
        rpc!(self, StorageRequest::TimeSeriesNames { id } => Names)
    }

    fn time_series_exists(&self, id: NodeId, name: &str) -> StorageResult<bool> {
        rpc!(self, StorageRequest::TimeSeriesExists {
            id,
            name: name.to_string(),
        } => Bool)
    }

    fn time_series_metadata(
        &self,
        id: NodeId,
        names: &BTreeSet<String>,
    ) -> StorageResult<Vec<TimeSeriesMetadata>> {
        rpc!(self, StorageRequest::TimeSeriesMetadata {
            id,
            names: names.clone(),
        } => Metadata)
    }

    fn time_series_data_versions(&self, id: NodeId) -> StorageResult<BTreeSet<i32>> {
        rpc!(self, StorageRequest::TimeSeriesDataVersions { id, name: None } => Versions)
    }

    fn time_series_data_versions_of(&self, id: NodeId, name: &str) -> StorageResult<BTreeSet<i32>> {
        rpc!(self, StorageRequest::TimeSeriesDataVersions {
            id,
            name: Some(name.to_string()),
        } => Versions)
    }

    fn double_time_series_data(
        &self,
        id: NodeId,
        names: &BTreeSet<String>,
        version: i32,
    ) -> StorageResult<BTreeMap<String, Vec<DoubleDataChunk>>> {
        rpc!(self, StorageRequest::DoubleTimeSeriesData {
            id,
            names: names.clone(),
            version,
        } => DoubleData)
    }

    fn add_double_time_series_data(
        &self,
        id: NodeId,
        version: i32,
        name: &str,
        chunks: Vec<DoubleDataChunk>,
    ) -> StorageResult<()> {
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
        rpc!(self, StorageRequest::StringTimeSeriesData {
            id,
            names: names.clone(),
            version,
        } => StringData)
    }

    fn add_string_time_series_data(
        &self,
        id: NodeId,
        version: i32,
        name: &str,
        chunks: Vec<StringDataChunk>,
    ) -> StorageResult<()> {
        self.enqueue(BufferedOperation::AddStringData {
            node_id: id,
            version,
            name: name.to_string(),
            chunks,
        })
    }

    fn clear_time_series(&self, id: NodeId) -> StorageResult<()> {
        rpc!(self, StorageRequest::ClearTimeSeries { id })
    }

    fn add_dependency(&self, from: NodeId, name: &str, to: NodeId) -> StorageResult<()> {
        rpc!(self, StorageRequest::AddDependency {
            from,
            name: name.to_string(),
            to,
        })
    }

    fn dependencies_named(&self, from: NodeId, name: &str) -> StorageResult<Vec<NodeInfo>> {
        rpc!(self, StorageRequest::DependenciesNamed {
            from,
            name: name.to_string(),
        } => Nodes)
    }

    fn dependencies(&self, from: NodeId) -> StorageResult<Vec<NodeDependency>> {
        rpc!(self, StorageRequest::Dependencies { from } => Dependencies)
    }

    fn backward_dependencies(&self, to: NodeId) -> StorageResult<Vec<NodeInfo>> {
        rpc!(self, StorageRequest::BackwardDependencies { to } => Nodes)
    }

    fn remove_dependency(&self, from: NodeId, name: &str, to: NodeId) -> StorageResult<()> {
        rpc!(self, StorageRequest::RemoveDependency {
            from,
            name: name.to_string(),
            to,
        })
    }

    fn supported_file_system_checks(&self) -> Vec<FileSystemCheckKind> {
        let result: StorageResult<Vec<FileSystemCheckKind>> =
            (|| rpc!(self, StorageRequest::SupportedFileSystemChecks => CheckKinds))();
        result.unwrap_or_else(|e| {
            warn!(error = %e, "could not list the server's file system checks");
            Vec::new()
        })
    }

    fn check_file_system(
        &self,
        options: &FileSystemCheckOptions,
    ) -> StorageResult<Vec<FileSystemCheckIssue>> {
        rpc!(self, StorageRequest::CheckFileSystem {
            options: options.clone(),
        } => CheckIssues)
    }

    fn events_bus(&self) -> Arc<dyn EventsBus> {
        self.events.clone()
    }

    fn flush(&self) -> StorageResult<()> {
        rpc!(self, StorageRequest::Flush)
    }

    fn close(&self) -> StorageResult<()> {
        if self.closed.load(Ordering::Acquire) {
            return Ok(());
        }
        let flushed = self.flush();
        self.closed.store(true, Ordering::Release);
        self.stop_listener();
        info!(file_system = %self.config.file_system_name, "remote storage closed");
        flushed
    }

    fn is_closed(&self) -> bool {
        self.closed.load(Ordering::Acquire)
    }
}
