use std::collections::{BTreeMap, BTreeSet};

use afs_storage::{BufferedOperation, StorageError};
use afs_types::{
    DoubleDataChunk, FileSystemCheckIssue, FileSystemCheckKind, FileSystemCheckOptions,
    NodeDependency, NodeGenericMetadata, NodeId, NodeInfo, StringDataChunk, TimeSeriesMetadata,
};
use serde::{Deserialize, Serialize};

pub const PROTOCOL_VERSION: u32 = 1;
/// Upper bound of an encoded request or response. Blobs travel whole in one
/// message, so this also caps the size of a remotely written blob.
pub const MAX_MESSAGE_SIZE: usize = 256 * 1024 * 1024;

/// One storage call sent by a remote client.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub enum StorageRequest {
    CreateRootNode { name: String, pseudo_class: String },
    CreateNode {
        parent_id: NodeId,
        name: String,
        pseudo_class: String,
        description: String,
        version: i32,
        metadata: NodeGenericMetadata,
    },
    NodeInfo { id: NodeId },
    IsWritable { id: NodeId },
    IsConsistent { id: NodeId },
    SetConsistent { id: NodeId },
    InconsistentNodes,
    SetDescription { id: NodeId, description: String },
    UpdateModificationTime { id: NodeId },
    RenameNode { id: NodeId, name: String },
    SetMetadata { id: NodeId, metadata: NodeGenericMetadata },
    ChildNodes { id: NodeId },
    ChildNode { id: NodeId, name: String },
    ParentNode { id: NodeId },
    SetParentNode { id: NodeId, new_parent_id: NodeId },
    DeleteNode { id: NodeId },

    ReadBinaryData { id: NodeId, name: String },
    WriteBinaryData { id: NodeId, name: String, data: Vec<u8> },
    DataExists { id: NodeId, name: String },
    DataNames { id: NodeId },
    RemoveData { id: NodeId, name: String },

    /// Time-series writes buffered on the client, applied in order and then
    /// flushed on the server.
    ApplyBuffered { operations: Vec<BufferedOperation> },
    TimeSeriesNames { id: NodeId },
    TimeSeriesExists { id: NodeId, name: String },
    TimeSeriesMetadata { id: NodeId, names: BTreeSet<String> },
    /// Versions of one series, or of all series of the node when `name` is `None`.
    TimeSeriesDataVersions { id: NodeId, name: Option<String> },
    DoubleTimeSeriesData { id: NodeId, names: BTreeSet<String>, version: i32 },
    StringTimeSeriesData { id: NodeId, names: BTreeSet<String>, version: i32 },
    ClearTimeSeries { id: NodeId },

    AddDependency { from: NodeId, name: String, to: NodeId },
    DependenciesNamed { from: NodeId, name: String },
    Dependencies { from: NodeId },
    BackwardDependencies { to: NodeId },
    RemoveDependency { from: NodeId, name: String, to: NodeId },

    SupportedFileSystemChecks,
    CheckFileSystem { options: FileSystemCheckOptions },
    Flush,
}

impl StorageRequest {
    pub fn type_name(&self) -> &'static str {
        match self {
            Self::CreateRootNode { .. } => "CreateRootNode",
            Self::CreateNode { .. } => "CreateNode",
            Self::NodeInfo { .. } => "NodeInfo",
            Self::IsWritable { .. } => "IsWritable",
            Self::IsConsistent { .. } => "IsConsistent",
            Self::SetConsistent { .. } => "SetConsistent",
            Self::InconsistentNodes => "InconsistentNodes",
            Self::SetDescription { .. } => "SetDescription",
            Self::UpdateModificationTime { .. } => "UpdateModificationTime",
            Self::RenameNode { .. } => "RenameNode",
            Self::SetMetadata { .. } => "SetMetadata",
            Self::ChildNodes { .. } => "ChildNodes",
            Self::ChildNode { .. } => "ChildNode",
            Self::ParentNode { .. } => "ParentNode",
            Self::SetParentNode { .. } => "SetParentNode",
            Self::DeleteNode { .. } => "DeleteNode",
            Self::ReadBinaryData { .. } => "ReadBinaryData",
            Self::WriteBinaryData { .. } => "WriteBinaryData",
            Self::DataExists { .. } => "DataExists",
            Self::DataNames { .. } => "DataNames",
            Self::RemoveData { .. } => "RemoveData",
            Self::ApplyBuffered { .. } => "ApplyBuffered",
            Self::TimeSeriesNames { .. } => "TimeSeriesNames",
            Self::TimeSeriesExists { .. } => "TimeSeriesExists",
            Self::TimeSeriesMetadata { .. } => "TimeSeriesMetadata",
            Self::TimeSeriesDataVersions { .. } => "TimeSeriesDataVersions",
            Self::DoubleTimeSeriesData { .. } => "DoubleTimeSeriesData",
            Self::StringTimeSeriesData { .. } => "StringTimeSeriesData",
            Self::ClearTimeSeries { .. } => "ClearTimeSeries",
            Self::AddDependency { .. } => "AddDependency",
            Self::DependenciesNamed { .. } => "DependenciesNamed",
            Self::Dependencies { .. } => "Dependencies",
            Self::BackwardDependencies { .. } => "BackwardDependencies",
            Self::RemoveDependency { .. } => "RemoveDependency",
            Self::SupportedFileSystemChecks => "SupportedFileSystemChecks",
            Self::CheckFileSystem { .. } => "CheckFileSystem",
            Self::Flush => "Flush",
        }
    }

    /// Whether the request only reads. Reads are served without draining the
    /// client's buffered time-series writes.
    pub fn is_read_only(&self) -> bool {
        matches!(
            self,
            Self::NodeInfo { .. }
                | Self::IsWritable { .. }
                | Self::IsConsistent { .. }
                | Self::InconsistentNodes
                | Self::ChildNodes { .. }
                | Self::ChildNode { .. }
                | Self::ParentNode { .. }
                | Self::ReadBinaryData { .. }
                | Self::DataExists { .. }
                | Self::DataNames { .. }
                | Self::TimeSeriesNames { .. }
                | Self::TimeSeriesExists { .. }
                | Self::TimeSeriesMetadata { .. }
                | Self::TimeSeriesDataVersions { .. }
                | Self::DoubleTimeSeriesData { .. }
                | Self::StringTimeSeriesData { .. }
                | Self::DependenciesNamed { .. }
                | Self::Dependencies { .. }
                | Self::BackwardDependencies { .. }
                | Self::SupportedFileSystemChecks
        )
    }
}

/// The server's answer to one [`StorageRequest`].
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub enum StorageResponse {
    Unit,
    Bool(bool),
    Node(NodeInfo),
    OptionalNode(Option<NodeInfo>),
    Nodes(Vec<NodeInfo>),
    OptionalId(Option<NodeId>),
    Names(BTreeSet<String>),
    Versions(BTreeSet<i32>),
    BinaryData(Option<Vec<u8>>),
    Metadata(Vec<TimeSeriesMetadata>),
    DoubleData(BTreeMap<String, Vec<DoubleDataChunk>>),
    StringData(BTreeMap<String, Vec<StringDataChunk>>),
    Dependencies(Vec<NodeDependency>),
    CheckKinds(Vec<FileSystemCheckKind>),
    CheckIssues(Vec<FileSystemCheckIssue>),
    Error(ErrorBody),
}

impl StorageResponse {
    pub fn type_name(&self) -> &'static str {
        match self {
            Self::Unit => "Unit",
            Self::Bool(_) => "Bool",
            Self::Node(_) => "Node",
            Self::OptionalNode(_) => "OptionalNode",
            Self::Nodes(_) => "Nodes",
            Self::OptionalId(_) => "OptionalId",
            Self::Names(_) => "Names",
            Self::Versions(_) => "Versions",
            Self::BinaryData(_) => "BinaryData",
            Self::Metadata(_) => "Metadata",
            Self::DoubleData(_) => "DoubleData",
            Self::StringData(_) => "StringData",
            Self::Dependencies(_) => "Dependencies",
            Self::CheckKinds(_) => "CheckKinds",
            Self::CheckIssues(_) => "CheckIssues",
            Self::Error(_) => "Error",
        }
    }

    pub fn error(err: &StorageError) -> Self {
        Self::Error(ErrorBody::from(err))
    }
}

/// Category of a [`StorageError`] carried over the wire.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub enum ErrorKind {
    NotFound,
    InvalidArgument,
    BrokenReference,
    Backend,
    Repair,
    Serialization,
    Config,
    Closed,
    Io,
}

/// A storage error in transferable form.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct ErrorBody {
    pub kind: ErrorKind,
    pub message: String,
    pub node_id: Option<NodeId>,
    /// Second node of a broken reference.
    pub target_id: Option<NodeId>,
}

impl From<&StorageError> for ErrorBody {
    fn from(err: &StorageError) -> Self {
        let (kind, message, node_id, target_id) = match err {
            StorageError::NotFound(id) => (ErrorKind::NotFound, String::new(), Some(*id), None),
            StorageError::InvalidArgument(m) => (ErrorKind::InvalidArgument, m.clone(), None, None),
            StorageError::BrokenReference { from, to } => {
                (ErrorKind::BrokenReference, String::new(), Some(*from), Some(*to))
            }
            StorageError::Backend(m) => (ErrorKind::Backend, m.clone(), None, None),
            StorageError::Repair { node, reason } => {
                (ErrorKind::Repair, reason.clone(), Some(*node), None)
            }
            StorageError::Serialization(m) => (ErrorKind::Serialization, m.clone(), None, None),
            StorageError::Config(m) => (ErrorKind::Config, m.clone(), None, None),
            StorageError::Closed => (ErrorKind::Closed, String::new(), None, None),
            StorageError::Io(e) => (ErrorKind::Io, e.to_string(), None, None),
        };
        Self {
            kind,
            message,
            node_id,
            target_id,
        }
    }
}

impl From<ErrorBody> for StorageError {
    fn from(body: ErrorBody) -> Self {
        match (body.kind, body.node_id, body.target_id) {
            (ErrorKind::NotFound, Some(id), _) => StorageError::NotFound(id),
            (ErrorKind::BrokenReference, Some(from), Some(to)) => {
                StorageError::BrokenReference { from, to }
            }
            (ErrorKind::Repair, Some(node), _) => StorageError::Repair {
                node,
                reason: body.message,
            },
            (ErrorKind::InvalidArgument, ..) => StorageError::InvalidArgument(body.message),
            (ErrorKind::Serialization, ..) => StorageError::Serialization(body.message),
            (ErrorKind::Config, ..) => StorageError::Config(body.message),
            (ErrorKind::Closed, ..) => StorageError::Closed,
            (ErrorKind::Io, ..) => StorageError::Io(std::io::Error::other(body.message)),
            (kind, ..) => StorageError::Backend(format!("{kind:?}: {}", body.message)),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn not_found_survives_the_wire() {
        let id = NodeId::new();
        let body = ErrorBody::from(&StorageError::NotFound(id));
        assert_eq!(body.kind, ErrorKind::NotFound);
        assert!(matches!(StorageError::from(body), StorageError::NotFound(x) if x == id));
    }

    #[test]
    fn broken_reference_keeps_both_ends() {
        let (from, to) = (NodeId::new(), NodeId::new());
        let body = ErrorBody::from(&StorageError::BrokenReference { from, to });
        match StorageError::from(body) {
            StorageError::BrokenReference { from: f, to: t } => {
                assert_eq!(f, from);
                assert_eq!(t, to);
            }
            other => panic!("unexpected {other:?}"),
        }
    }

    #[test]
    fn invalid_argument_keeps_message() {
        let body = ErrorBody::from(&StorageError::InvalidArgument("duplicate child name".into()));
        match StorageError::from(body) {
            StorageError::InvalidArgument(m) => assert_eq!(m, "duplicate child name"),
            other => panic!("unexpected {other:?}"),
        }
    }

    #[test]
    fn malformed_body_degrades_to_backend() {
        let body = ErrorBody {
            kind: ErrorKind::NotFound,
            message: "lost id".into(),
            node_id: None,
            target_id: None,
        };
        assert!(matches!(StorageError::from(body), StorageError::Backend(_)));
    }

    #[test]
    fn reads_are_classified() {
        let id = NodeId::new();
        assert!(StorageRequest::NodeInfo { id }.is_read_only());
        assert!(StorageRequest::DataNames { id }.is_read_only());
        assert!(!StorageRequest::SetConsistent { id }.is_read_only());
        assert!(!StorageRequest::Flush.is_read_only());
        assert!(!StorageRequest::ApplyBuffered { operations: vec![] }.is_read_only());
    }
}
