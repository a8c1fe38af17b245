//! Column-family key/value abstraction the storage engine runs on.
//!
//! A [`ColumnStore`] exposes sorted key/value maps (column families), point
//! reads, prefix scans and atomic application of a [`WriteBatch`]. Keys are
//! composite byte strings built with [`keys::KeyBuilder`] so that a prefix
//! scan over `(node, name)` returns every row of that pair in order.

pub mod keys;
pub mod memory;

use crate::error::StorageResult;

/// The column families of the storage layout.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum ColumnFamily {
    /// `"root"` -> root node id.
    Root,
    /// node id -> node record.
    Nodes,
    /// parent id + child name -> denormalized child row.
    Children,
    /// node id + data name + chunk index -> blob chunk.
    BlobChunks,
    /// node id + data name -> empty; names of closed blobs.
    BlobNames,
    /// node id + series name -> series metadata.
    TimeSeriesMetadata,
    DoubleChunks,
    CompressedDoubleChunks,
    StringChunks,
    CompressedStringChunks,
    /// chunk key -> encoding tag; indexes the four chunk families.
    ChunkTypes,
    /// from + name + to -> empty.
    Dependencies,
    /// to + name + from -> empty.
    BackwardDependencies,
}

impl ColumnFamily {
    pub const ALL: [ColumnFamily; 13] = [
        Self::Root,
        Self::Nodes,
        Self::Children,
        Self::BlobChunks,
        Self::BlobNames,
        Self::TimeSeriesMetadata,
        Self::DoubleChunks,
        Self::CompressedDoubleChunks,
        Self::StringChunks,
        Self::CompressedStringChunks,
        Self::ChunkTypes,
        Self::Dependencies,
        Self::BackwardDependencies,
    ];

    /// Stable on-disk name.
    pub fn name(&self) -> &'static str {
        match self {
            Self::Root => "root",
            Self::Nodes => "nodes",
            Self::Children => "children",
            Self::BlobChunks => "blob_chunks",
            Self::BlobNames => "blob_names",
            Self::TimeSeriesMetadata => "ts_metadata",
            Self::DoubleChunks => "ts_double",
            Self::CompressedDoubleChunks => "ts_double_rle",
            Self::StringChunks => "ts_string",
            Self::CompressedStringChunks => "ts_string_rle",
            Self::ChunkTypes => "ts_chunk_types",
            Self::Dependencies => "dependencies",
            Self::BackwardDependencies => "backward_dependencies",
        }
    }

    /// Position in [`ColumnFamily::ALL`].
    pub fn index(&self) -> usize {
        *self as usize
    }
}

/// One statement of a [`WriteBatch`].
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum Mutation {
    Put {
        cf: ColumnFamily,
        key: Vec<u8>,
        value: Vec<u8>,
    },
    Delete {
        cf: ColumnFamily,
        key: Vec<u8>,
    },
}

impl Mutation {
    pub fn cf(&self) -> ColumnFamily {
        match self {
            Self::Put { cf, .. } | Self::Delete { cf, .. } => *cf,
        }
    }
}

/// An ordered list of mutations applied all-or-nothing.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct WriteBatch {
    mutations: Vec<Mutation>,
}

impl WriteBatch {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn put(&mut self, cf: ColumnFamily, key: Vec<u8>, value: Vec<u8>) {
        self.mutations.push(Mutation::Put { cf, key, value });
    }

    pub fn delete(&mut self, cf: ColumnFamily, key: Vec<u8>) {
        self.mutations.push(Mutation::Delete { cf, key });
    }

    pub fn append(&mut self, other: WriteBatch) {
        self.mutations.extend(other.mutations);
    }

    pub fn len(&self) -> usize {
        self.mutations.len()
    }

    pub fn is_empty(&self) -> bool {
        self.mutations.is_empty()
    }

    pub fn mutations(&self) -> &[Mutation] {
        &self.mutations
    }

    pub fn into_mutations(self) -> Vec<Mutation> {
        self.mutations
    }
}

/// Sorted key/value storage split into column families.
///
/// Implementations must be safe for concurrent use (`Send + Sync`). Scans
/// return rows in ascending key order.
pub trait ColumnStore: Send + Sync {
    /// Short backend name, used in logs.
    fn backend_name(&self) -> &'static str;

    fn get(&self, cf: ColumnFamily, key: &[u8]) -> StorageResult<Option<Vec<u8>>>;

    /// All rows whose key starts with `prefix`.
    fn scan_prefix(
        &self,
        cf: ColumnFamily,
        prefix: &[u8],
    ) -> StorageResult<Vec<(Vec<u8>, Vec<u8>)>>;

    /// Apply every mutation in order, atomically.
    fn apply(&self, batch: WriteBatch) -> StorageResult<()>;

    fn contains(&self, cf: ColumnFamily, key: &[u8]) -> StorageResult<bool> {
        Ok(self.get(cf, key)?.is_some())
    }

    /// Keys only, for range deletes.
    fn scan_keys(&self, cf: ColumnFamily, prefix: &[u8]) -> StorageResult<Vec<Vec<u8>>> {
        Ok(self.scan_prefix(cf, prefix)?.into_iter().map(|(k, _)| k).collect())
    }

    /// Persist buffered writes. No-op for volatile stores.
    fn flush(&self) -> StorageResult<()> {
        Ok(())
    }
}

impl<T: ColumnStore + ?Sized> ColumnStore for std::sync::Arc<T> {
    fn backend_name(&self) -> &'static str {
        (**self).backend_name()
    }

    fn get(&self, cf: ColumnFamily, key: &[u8]) -> StorageResult<Option<Vec<u8>>> {
        (**self).get(cf, key)
    }

    fn scan_prefix(
        &self,
        cf: ColumnFamily,
        prefix: &[u8],
    ) -> StorageResult<Vec<(Vec<u8>, Vec<u8>)>> {
        (**self).scan_prefix(cf, prefix)
    }

    fn apply(&self, batch: WriteBatch) -> StorageResult<()> {
        (**self).apply(batch)
    }

    fn flush(&self) -> StorageResult<()> {
        (**self).flush()
    }
}
