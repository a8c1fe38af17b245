//! Row types stored in the column families and their keys.

use afs_types::{NodeGenericMetadata, NodeId, NodeInfo, TimeSeriesDataType};
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};

use crate::column::keys::KeyBuilder;
use crate::column::ColumnFamily;
use crate::error::{StorageError, StorageResult};

pub(crate) const ROOT_KEY: &[u8] = b"root";

pub(crate) fn encode<T: Serialize>(value: &T) -> StorageResult<Vec<u8>> {
    Ok(bincode::serialize(value)?)
}

pub(crate) fn decode<T: DeserializeOwned>(bytes: &[u8]) -> StorageResult<T> {
    Ok(bincode::deserialize(bytes)?)
}

/// A node's own record.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub(crate) struct NodeRow {
    pub name: String,
    pub pseudo_class: String,
    pub description: String,
    pub creation_time: i64,
    pub modification_time: i64,
    pub version: i32,
    pub metadata: NodeGenericMetadata,
    pub parent_id: Option<NodeId>,
    /// `None` on records written before consistency tracking; read as consistent.
    pub consistent: Option<bool>,
}

impl NodeRow {
    pub fn is_consistent(&self) -> bool {
        self.consistent.unwrap_or(true)
    }

    pub fn to_info(&self, id: NodeId) -> NodeInfo {
        NodeInfo::new(
            id,
            self.name.clone(),
            self.pseudo_class.clone(),
            self.description.clone(),
            self.creation_time,
            self.modification_time,
            self.version,
            self.metadata.clone(),
        )
    }

    pub fn child_row(&self, id: NodeId) -> ChildRow {
        ChildRow {
            child_id: id,
            pseudo_class: self.pseudo_class.clone(),
            description: self.description.clone(),
            creation_time: self.creation_time,
            modification_time: self.modification_time,
            version: self.version,
            metadata: self.metadata.clone(),
        }
    }
}

/// Denormalized copy of a child, stored under its parent.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub(crate) struct ChildRow {
    pub child_id: NodeId,
    pub pseudo_class: String,
    pub description: String,
    pub creation_time: i64,
    pub modification_time: i64,
    pub version: i32,
    pub metadata: NodeGenericMetadata,
}

impl ChildRow {
    pub fn to_info(&self, name: String) -> NodeInfo {
        NodeInfo::new(
            self.child_id,
            name,
            self.pseudo_class.clone(),
            self.description.clone(),
            self.creation_time,
            self.modification_time,
            self.version,
            self.metadata.clone(),
        )
    }
}

/// One compressed blob chunk.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub(crate) struct ChunkRow {
    pub crc32: u32,
    pub data: Vec<u8>,
}

/// Which chunk family a time-series chunk lives in.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub(crate) enum ChunkEncoding {
    Double,
    CompressedDouble,
    String,
    CompressedString,
}

impl ChunkEncoding {
    pub fn of(data_type: TimeSeriesDataType, compressed: bool) -> Self {
        match (data_type, compressed) {
            (TimeSeriesDataType::Double, false) => Self::Double,
            (TimeSeriesDataType::Double, true) => Self::CompressedDouble,
            (TimeSeriesDataType::String, false) => Self::String,
            (TimeSeriesDataType::String, true) => Self::CompressedString,
        }
    }

    pub fn cf(&self) -> ColumnFamily {
        match self {
            Self::Double => ColumnFamily::DoubleChunks,
            Self::CompressedDouble => ColumnFamily::CompressedDoubleChunks,
            Self::String => ColumnFamily::StringChunks,
            Self::CompressedString => ColumnFamily::CompressedStringChunks,
        }
    }

    pub fn tag(&self) -> u8 {
        match self {
            Self::Double => 0,
            Self::CompressedDouble => 1,
            Self::String => 2,
            Self::CompressedString => 3,
        }
    }

    pub fn from_tag(tag: &[u8]) -> StorageResult<Self> {
        match tag {
            [0] => Ok(Self::Double),
            [1] => Ok(Self::CompressedDouble),
            [2] => Ok(Self::String),
            [3] => Ok(Self::CompressedString),
            other => Err(StorageError::Serialization(format!("unknown chunk encoding {other:?}"))),
        }
    }
}

pub(crate) fn node_key(id: NodeId) -> Vec<u8> {
    id.to_bytes().to_vec()
}

pub(crate) fn child_key(parent: NodeId, name: &str) -> Vec<u8> {
    KeyBuilder::new().id(parent).raw(name.as_bytes()).build()
}

pub(crate) fn children_prefix(parent: NodeId) -> Vec<u8> {
    node_key(parent)
}

pub(crate) fn blob_prefix(id: NodeId, name: &str) -> Vec<u8> {
    KeyBuilder::new().id(id).name(name).build()
}

pub(crate) fn blob_chunk_key(id: NodeId, name: &str, index: u32) -> Vec<u8> {
    KeyBuilder::new().id(id).name(name).u32(index).build()
}

pub(crate) fn blob_name_key(id: NodeId, name: &str) -> Vec<u8> {
    KeyBuilder::new().id(id).raw(name.as_bytes()).build()
}

pub(crate) fn series_metadata_key(id: NodeId, name: &str) -> Vec<u8> {
    KeyBuilder::new().id(id).raw(name.as_bytes()).build()
}

pub(crate) fn series_prefix(id: NodeId, name: &str) -> Vec<u8> {
    KeyBuilder::new().id(id).name(name).build()
}

pub(crate) fn series_version_prefix(id: NodeId, name: &str, version: i32) -> Vec<u8> {
    KeyBuilder::new().id(id).name(name).i32(version).build()
}

pub(crate) fn dependency_key(a: NodeId, name: &str, b: NodeId) -> Vec<u8> {
    KeyBuilder::new().id(a).name(name).id(b).build()
}

pub(crate) fn dependency_name_prefix(a: NodeId, name: &str) -> Vec<u8> {
    KeyBuilder::new().id(a).name(name).build()
}

/// Name suffix of a key made of a node id followed by raw name bytes.
pub(crate) fn trailing_name(key: &[u8]) -> StorageResult<String> {
    let bytes = key
        .get(16..)
        .ok_or_else(|| StorageError::Serialization("key shorter than a node id".into()))?;
    String::from_utf8(bytes.to_vec()).map_err(|e| StorageError::Serialization(e.to_string()))
}
