//! Named binary blobs stored as compressed, checksummed chunks.

use std::collections::BTreeSet;
use std::io;

use afs_types::{NodeEvent, NodeId};
use tracing::debug;

use super::rows::{
    blob_chunk_key, blob_name_key, blob_prefix, decode, encode, node_key, trailing_name, ChunkRow,
};
use super::ColumnAppStorage;
use crate::column::{ColumnFamily, ColumnStore, WriteBatch};
use crate::error::{StorageError, StorageResult};
use crate::stream::{BinaryDataWriter, ChunkSink, ChunkSource, ChunkedReader, ChunkedWriter};
use crate::traits::BinaryDataReader;

struct BlobSink<'a, S: ColumnStore> {
    engine: &'a ColumnAppStorage<S>,
    id: NodeId,
    name: String,
}

impl<S: ColumnStore> ChunkSink for BlobSink<'_, S> {
    fn put_chunk(&mut self, index: u32, data: Vec<u8>) -> StorageResult<()> {
        self.engine.flush_buffer()?;
        let mut batch = WriteBatch::new();
        if index == 0 {
            for key in self
                .engine
                .store
                .scan_keys(ColumnFamily::BlobChunks, &blob_prefix(self.id, &self.name))?
            {
                batch.delete(ColumnFamily::BlobChunks, key);
            }
        }
        let row = ChunkRow {
            crc32: crc32fast::hash(&data),
            data,
        };
        batch.put(
            ColumnFamily::BlobChunks,
            blob_chunk_key(self.id, &self.name, index),
            encode(&row)?,
        );
        self.engine.store.apply(batch)
    }

    fn commit(&mut self, chunk_count: u32) -> StorageResult<()> {
        self.engine.flush_buffer()?;
        let mut batch = WriteBatch::new();
        batch.put(ColumnFamily::BlobNames, blob_name_key(self.id, &self.name), Vec::new());
        self.engine.store.apply(batch)?;
        debug!(node = %self.id, name = %self.name, chunks = chunk_count, "binary data written");
        self.engine.push_events([NodeEvent::NodeDataUpdated {
            id: self.id,
            data_name: self.name.clone(),
        }]);
        Ok(())
    }

    fn abort(&mut self, chunk_count: u32) -> StorageResult<()> {
        if chunk_count == 0 {
            return Ok(());
        }
        let mut batch = WriteBatch::new();
        for index in 0..chunk_count {
            batch.delete(ColumnFamily::BlobChunks, blob_chunk_key(self.id, &self.name, index));
        }
        batch.delete(ColumnFamily::BlobNames, blob_name_key(self.id, &self.name));
        self.engine.store.apply(batch)
    }
}

struct BlobSource<'a, S: ColumnStore> {
    engine: &'a ColumnAppStorage<S>,
    id: NodeId,
    name: String,
}

impl<S: ColumnStore> ChunkSource for BlobSource<'_, S> {
    fn chunk(&mut self, index: u32) -> StorageResult<Option<Vec<u8>>> {
        let key = blob_chunk_key(self.id, &self.name, index);
        let Some(bytes) = self.engine.store.get(ColumnFamily::BlobChunks, &key)? else {
            return Ok(None);
        };
        let row: ChunkRow = decode(&bytes)?;
        let actual = crc32fast::hash(&row.data);
        if actual != row.crc32 {
            return Err(StorageError::Io(io::Error::new(
                io::ErrorKind::InvalidData,
                format!(
                    "checksum mismatch in chunk {index} of '{}' on {}: {:08x} != {actual:08x}",
                    self.name, self.id, row.crc32
                ),
            )));
        }
        Ok(Some(row.data))
    }
}

impl<S: ColumnStore> ColumnAppStorage<S> {
    pub(super) fn open_blob_reader(
        &self,
        id: NodeId,
        name: &str,
    ) -> StorageResult<Option<BinaryDataReader<'_>>> {
        if !self.blob_exists(id, name)? {
            return Ok(None);
        }
        let source = BlobSource {
            engine: self,
            id,
            name: name.to_string(),
        };
        Ok(Some(Box::new(ChunkedReader::new(source))))
    }

    pub(super) fn open_blob_writer(
        &self,
        id: NodeId,
        name: &str,
    ) -> StorageResult<Box<dyn BinaryDataWriter + '_>> {
        if name.is_empty() {
            return Err(StorageError::InvalidArgument("data name must not be empty".into()));
        }
        self.flush_buffer()?;
        self.require_node(id)?;
        let sink = BlobSink {
            engine: self,
            id,
            name: name.to_string(),
        };
        Ok(Box::new(ChunkedWriter::new(
            sink,
            self.config.binary_data_chunk_size,
            self.config.compression_level,
        )))
    }

    pub(super) fn blob_exists(&self, id: NodeId, name: &str) -> StorageResult<bool> {
        self.store.contains(ColumnFamily::BlobChunks, &blob_chunk_key(id, name, 0))
    }

    /// Index scan only: an unknown id has no names.
    pub(super) fn blob_names(&self, id: NodeId) -> StorageResult<BTreeSet<String>> {
        self.store
            .scan_keys(ColumnFamily::BlobNames, &node_key(id))?
            .iter()
            .map(|key| trailing_name(key))
            .collect()
    }

    pub(super) fn remove_blob(&self, id: NodeId, name: &str) -> StorageResult<bool> {
        self.flush_buffer()?;
        let mut batch = WriteBatch::new();
        for key in self.store.scan_keys(ColumnFamily::BlobChunks, &blob_prefix(id, name))? {
            batch.delete(ColumnFamily::BlobChunks, key);
        }
        let name_key = blob_name_key(id, name);
        let named = self.store.contains(ColumnFamily::BlobNames, &name_key)?;
        if batch.is_empty() && !named {
            return Ok(false);
        }
        batch.delete(ColumnFamily::BlobNames, name_key);
        self.store.apply(batch)?;
        self.push_events([NodeEvent::NodeDataRemoved {
            id,
            data_name: name.to_string(),
        }]);
        Ok(true)
    }

    /// Queue deletion of every blob of `id`; returns the names removed.
    pub(crate) fn blob_deletions(
        &self,
        id: NodeId,
        batch: &mut WriteBatch,
    ) -> StorageResult<Vec<String>> {
        let prefix = node_key(id);
        for key in self.store.scan_keys(ColumnFamily::BlobChunks, &prefix)? {
            batch.delete(ColumnFamily::BlobChunks, key);
        }
        let mut names = Vec::new();
        for key in self.store.scan_keys(ColumnFamily::BlobNames, &prefix)? {
            names.push(trailing_name(&key)?);
            batch.delete(ColumnFamily::BlobNames, key);
        }
        Ok(names)
    }
}
