//! Time series: metadata, versioned chunk storage and the buffered writes.

use std::collections::{BTreeMap, BTreeSet};

use afs_types::{ChunkValue, DataChunk, NodeEvent, NodeId, TimeSeriesDataType, TimeSeriesMetadata};

use super::rows::{
    decode, encode, node_key, series_metadata_key, series_prefix, series_version_prefix,
    trailing_name, ChunkEncoding,
};
use super::ColumnAppStorage;
use crate::buffer::{BufferedOperation, ChangeBuffer};
use crate::column::keys::{KeyBuilder, KeyReader};
use crate::column::{ColumnFamily, ColumnStore, WriteBatch};
use crate::error::{StorageError, StorageResult};

/// Validate chunks and drop empty ones.
pub(super) fn non_empty<T: ChunkValue>(
    chunks: Vec<DataChunk<T>>,
) -> StorageResult<Vec<DataChunk<T>>> {
    for chunk in &chunks {
        chunk.validate()?;
    }
    Ok(chunks.into_iter().filter(|c| !c.is_empty()).collect())
}

fn chunk_mutations<T: ChunkValue>(
    batch: &mut WriteBatch,
    id: NodeId,
    name: &str,
    version: i32,
    chunks: &[DataChunk<T>],
) -> StorageResult<()> {
    let prefix = series_version_prefix(id, name, version);
    for chunk in chunks {
        let key = KeyBuilder::new()
            .raw(&prefix)
            .raw(uuid::Uuid::now_v7().as_bytes())
            .build();
        let encoding = ChunkEncoding::of(T::DATA_TYPE, chunk.is_compressed());
        batch.put(encoding.cf(), key.clone(), encode(chunk)?);
        batch.put(ColumnFamily::ChunkTypes, key, vec![encoding.tag()]);
    }
    Ok(())
}

impl<S: ColumnStore> ColumnAppStorage<S> {
    fn stored_series(&self, id: NodeId, name: &str) -> StorageResult<Option<TimeSeriesMetadata>> {
        self.store
            .get(ColumnFamily::TimeSeriesMetadata, &series_metadata_key(id, name))?
            .map(|bytes| decode(&bytes))
            .transpose()
    }

    /// Data type of a series, looking at queued creates before the store.
    fn series_type(
        &self,
        buffer: &ChangeBuffer,
        id: NodeId,
        name: &str,
    ) -> StorageResult<Option<TimeSeriesDataType>> {
        let queued = buffer.operations().iter().find_map(|op| match op {
            BufferedOperation::CreateTimeSeries { node_id, metadata }
                if *node_id == id && metadata.name == name =>
            {
                Some(metadata.data_type)
            }
            _ => None,
        });
        match queued {
            Some(data_type) => Ok(Some(data_type)),
            None => Ok(self.stored_series(id, name)?.map(|m| m.data_type)),
        }
    }

    /// Reject a buffered operation before it is queued.
    pub(super) fn validate_buffered(
        &self,
        buffer: &ChangeBuffer,
        operation: &BufferedOperation,
    ) -> StorageResult<()> {
        let id = operation.node_id();
        self.require_node(id)?;
        let (name, data_type) = match operation {
            BufferedOperation::CreateTimeSeries { metadata, .. } => {
                if metadata.name.is_empty() {
                    return Err(StorageError::InvalidArgument(
                        "time series name must not be empty".into(),
                    ));
                }
                if buffer.creates_series(id, &metadata.name)
                    || self.stored_series(id, &metadata.name)?.is_some()
                {
                    return Err(StorageError::InvalidArgument(format!(
                        "time series '{}' already exists on {id}",
                        metadata.name
                    )));
                }
                return Ok(());
            }
            BufferedOperation::AddDoubleData { name, .. } => (name, TimeSeriesDataType::Double),
            BufferedOperation::AddStringData { name, .. } => (name, TimeSeriesDataType::String),
        };
        match self.series_type(buffer, id, name)? {
            Some(actual) if actual == data_type => Ok(()),
            Some(actual) => Err(StorageError::InvalidArgument(format!(
                "time series '{name}' on {id} holds {actual} values, not {data_type}"
            ))),
            None => Err(StorageError::InvalidArgument(format!(
                "time series '{name}' does not exist on {id}"
            ))),
        }
    }

    pub(super) fn buffered_mutations(
        &self,
        operation: &BufferedOperation,
        batch: &mut WriteBatch,
        events: &mut Vec<NodeEvent>,
    ) -> StorageResult<()> {
        match operation {
            BufferedOperation::CreateTimeSeries { node_id, metadata } => {
                batch.put(
                    ColumnFamily::TimeSeriesMetadata,
                    series_metadata_key(*node_id, &metadata.name),
                    encode(metadata)?,
                );
                events.push(NodeEvent::TimeSeriesCreated {
                    id: *node_id,
                    time_series_name: metadata.name.clone(),
                });
            }
            BufferedOperation::AddDoubleData {
                node_id,
                version,
                name,
                chunks,
            } => {
                chunk_mutations(batch, *node_id, name, *version, chunks)?;
                events.push(NodeEvent::TimeSeriesDataUpdated {
                    id: *node_id,
                    time_series_name: name.clone(),
                });
            }
            BufferedOperation::AddStringData {
                node_id,
                version,
                name,
                chunks,
            } => {
                chunk_mutations(batch, *node_id, name, *version, chunks)?;
                events.push(NodeEvent::TimeSeriesDataUpdated {
                    id: *node_id,
                    time_series_name: name.clone(),
                });
            }
        }
        Ok(())
    }

    // Series reads scan the indexes directly; an unknown id reads as empty.
    pub(super) fn series_names(&self, id: NodeId) -> StorageResult<BTreeSet<String>> {
        self.store
            .scan_keys(ColumnFamily::TimeSeriesMetadata, &node_key(id))?
            .iter()
            .map(|key| trailing_name(key))
            .collect()
    }

    pub(super) fn series_exists(&self, id: NodeId, name: &str) -> StorageResult<bool> {
        self.store
            .contains(ColumnFamily::TimeSeriesMetadata, &series_metadata_key(id, name))
    }

    pub(super) fn series_metadata(
        &self,
        id: NodeId,
        names: &BTreeSet<String>,
    ) -> StorageResult<Vec<TimeSeriesMetadata>> {
        let mut found = Vec::with_capacity(names.len());
        for name in names {
            if let Some(metadata) = self.stored_series(id, name)? {
                found.push(metadata);
            }
        }
        Ok(found)
    }

    pub(super) fn data_versions(
        &self,
        id: NodeId,
        name: Option<&str>,
    ) -> StorageResult<BTreeSet<i32>> {
        let prefix = match name {
            Some(name) => series_prefix(id, name),
            None => node_key(id),
        };
        let mut versions = BTreeSet::new();
        for key in self.store.scan_keys(ColumnFamily::ChunkTypes, &prefix)? {
            let mut reader = KeyReader::new(&key);
            reader.id()?;
            reader.name()?;
            versions.insert(reader.i32()?);
        }
        Ok(versions)
    }

    pub(super) fn read_series_data<T: ChunkValue>(
        &self,
        id: NodeId,
        names: &BTreeSet<String>,
        version: i32,
    ) -> StorageResult<BTreeMap<String, Vec<DataChunk<T>>>> {
        let encodings = [
            ChunkEncoding::of(T::DATA_TYPE, false),
            ChunkEncoding::of(T::DATA_TYPE, true),
        ];
        let mut data = BTreeMap::new();
        for name in names {
            let prefix = series_version_prefix(id, name, version);
            let mut chunks: Vec<DataChunk<T>> = Vec::new();
            for encoding in encodings {
                for (_, value) in self.store.scan_prefix(encoding.cf(), &prefix)? {
                    chunks.push(decode(&value)?);
                }
            }
            if !chunks.is_empty() {
                chunks.sort_by_key(DataChunk::offset);
                data.insert(name.clone(), chunks);
            }
        }
        Ok(data)
    }

    pub(super) fn clear_series(&self, id: NodeId) -> StorageResult<()> {
        self.flush_buffer()?;
        self.require_node(id)?;
        let mut batch = WriteBatch::new();
        self.series_deletions(id, &mut batch)?;
        self.store.apply(batch)?;
        self.push_events([NodeEvent::TimeSeriesCleared { id }]);
        Ok(())
    }

    /// Queue deletion of every series of `id`. Returns whether any existed.
    pub(crate) fn series_deletions(
        &self,
        id: NodeId,
        batch: &mut WriteBatch,
    ) -> StorageResult<bool> {
        let prefix = node_key(id);
        let before = batch.len();
        for key in self.store.scan_keys(ColumnFamily::TimeSeriesMetadata, &prefix)? {
            batch.delete(ColumnFamily::TimeSeriesMetadata, key);
        }
        for (key, tag) in self.store.scan_prefix(ColumnFamily::ChunkTypes, &prefix)? {
            let encoding = ChunkEncoding::from_tag(&tag)?;
            batch.delete(encoding.cf(), key.clone());
            batch.delete(ColumnFamily::ChunkTypes, key);
        }
        Ok(batch.len() > before)
    }
}

#[cfg(test)]
mod tests {
    use std::collections::{BTreeMap, BTreeSet};

    use afs_types::{
        DoubleDataChunk, NodeGenericMetadata, StringDataChunk, TimeSeriesDataType, TimeSeriesIndex,
        TimeSeriesMetadata,
    };

    use crate::column::ColumnFamily;
    use crate::{AppStorage, InMemoryAppStorage, StorageConfig, StorageError};

    fn metadata(name: &str, data_type: TimeSeriesDataType) -> TimeSeriesMetadata {
        let index = TimeSeriesIndex::new(0, 100, 10).unwrap();
        TimeSeriesMetadata::new(name, data_type, BTreeMap::new(), index)
    }

    fn names(list: &[&str]) -> BTreeSet<String> {
        list.iter().map(|s| s.to_string()).collect()
    }

    #[test]
    fn writes_are_invisible_until_flush() {
        let s = InMemoryAppStorage::in_memory("test", StorageConfig::default()).unwrap();
        let root = s.create_root_node_if_not_exists("root", "folder").unwrap();
        s.create_time_series(root.id, metadata("ts", TimeSeriesDataType::Double)).unwrap();
        assert!(!s.time_series_exists(root.id, "ts").unwrap());
        s.flush().unwrap();
        assert!(s.time_series_exists(root.id, "ts").unwrap());
    }

    #[test]
    fn count_threshold_flushes_automatically() {
        let config = StorageConfig::default().with_flush_thresholds(2, u64::MAX);
        let s = InMemoryAppStorage::in_memory("test", config).unwrap();
        let root = s.create_root_node_if_not_exists("root", "folder").unwrap();
        s.create_time_series(root.id, metadata("ts", TimeSeriesDataType::Double)).unwrap();
        let chunk = DoubleDataChunk::uncompressed(0, vec![1.0]);
        s.add_double_time_series_data(root.id, 1, "ts", vec![chunk]).unwrap();
        assert_eq!(s.store().len(ColumnFamily::DoubleChunks), 1);
    }

    #[test]
    fn other_mutations_flush_first() {
        let s = InMemoryAppStorage::in_memory("test", StorageConfig::default()).unwrap();
        let root = s.create_root_node_if_not_exists("root", "folder").unwrap();
        s.create_time_series(root.id, metadata("ts", TimeSeriesDataType::Double)).unwrap();
        s.set_description(root.id, "touched").unwrap();
        assert!(s.time_series_exists(root.id, "ts").unwrap());
    }

    #[test]
    fn duplicate_and_mismatched_series_are_rejected() {
        let s = InMemoryAppStorage::in_memory("test", StorageConfig::default()).unwrap();
        let root = s.create_root_node_if_not_exists("root", "folder").unwrap();
        s.create_time_series(root.id, metadata("ts", TimeSeriesDataType::Double)).unwrap();
        let strings = StringDataChunk::uncompressed(0, vec!["a".into()]);
        let doubles = DoubleDataChunk::uncompressed(0, vec![1.0]);
        assert!(matches!(
            s.create_time_series(root.id, metadata("ts", TimeSeriesDataType::Double)),
            Err(StorageError::InvalidArgument(_))
        ));
        assert!(matches!(
            s.add_string_time_series_data(root.id, 1, "ts", vec![strings]),
            Err(StorageError::InvalidArgument(_))
        ));
        assert!(matches!(
            s.add_double_time_series_data(root.id, 1, "missing", vec![doubles]),
            Err(StorageError::InvalidArgument(_))
        ));
    }

    #[test]
    fn compressed_and_flat_chunks_merge_by_offset() {
        let s = InMemoryAppStorage::in_memory("test", StorageConfig::default()).unwrap();
        let root = s.create_root_node_if_not_exists("root", "folder").unwrap();
        s.create_time_series(root.id, metadata("ts", TimeSeriesDataType::Double)).unwrap();
        let late = DoubleDataChunk::compressed(5, 3, vec![7.0], vec![3]).unwrap();
        let early = DoubleDataChunk::uncompressed(0, vec![1.0, 2.0]);
        s.add_double_time_series_data(root.id, 1, "ts", vec![late.clone(), early.clone()])
            .unwrap();
        s.flush().unwrap();

        let data = s.double_time_series_data(root.id, &names(&["ts"]), 1).unwrap();
        assert_eq!(data["ts"], vec![early, late]);
        assert_eq!(s.store().len(ColumnFamily::CompressedDoubleChunks), 1);
        assert!(s.double_time_series_data(root.id, &names(&["ts"]), 2).unwrap().is_empty());
    }

    #[test]
    fn delete_node_clears_series() {
        let s = InMemoryAppStorage::in_memory("test", StorageConfig::default()).unwrap();
        let root = s.create_root_node_if_not_exists("root", "folder").unwrap();
        let n = s.create_node(root.id, "n", "file", "", 0, NodeGenericMetadata::new()).unwrap();
        s.create_time_series(n.id, metadata("ts", TimeSeriesDataType::String)).unwrap();
        let chunk = StringDataChunk::uncompressed(0, vec!["x".into()]);
        s.add_string_time_series_data(n.id, 3, "ts", vec![chunk]).unwrap();
        s.delete_node(n.id).unwrap();
        for cf in [
            ColumnFamily::TimeSeriesMetadata,
            ColumnFamily::StringChunks,
            ColumnFamily::ChunkTypes,
        ] {
            assert_eq!(s.store().len(cf), 0, "{}", cf.name());
        }
    }

    #[test]
    fn reads_on_unknown_node_are_empty() {
        let s = InMemoryAppStorage::in_memory("test", StorageConfig::default()).unwrap();
        let ghost = afs_types::NodeId::new();
        assert!(s.time_series_names(ghost).unwrap().is_empty());
        assert!(!s.time_series_exists(ghost, "ts").unwrap());
        assert!(s.time_series_metadata(ghost, &names(&["ts"])).unwrap().is_empty());
        assert!(s.time_series_data_versions(ghost).unwrap().is_empty());
        assert!(s.time_series_data_versions_of(ghost, "ts").unwrap().is_empty());
        assert!(s.double_time_series_data(ghost, &names(&["ts"]), 1).unwrap().is_empty());
    }
}
