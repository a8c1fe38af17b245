//! Write-behind buffer for time-series operations.

use afs_types::{DoubleDataChunk, NodeId, StringDataChunk, TimeSeriesMetadata};
use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::config::StorageConfig;
use crate::error::StorageResult;

/// A time-series mutation waiting to be applied.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub enum BufferedOperation {
    CreateTimeSeries {
        node_id: NodeId,
        metadata: TimeSeriesMetadata,
    },
    AddDoubleData {
        node_id: NodeId,
        version: i32,
        name: String,
        chunks: Vec<DoubleDataChunk>,
    },
    AddStringData {
        node_id: NodeId,
        version: i32,
        name: String,
        chunks: Vec<StringDataChunk>,
    },
}

impl BufferedOperation {
    pub fn node_id(&self) -> NodeId {
        match self {
            Self::CreateTimeSeries { node_id, .. }
            | Self::AddDoubleData { node_id, .. }
            | Self::AddStringData { node_id, .. } => *node_id,
        }
    }

    fn chunk_count(&self) -> usize {
        match self {
            Self::CreateTimeSeries { .. } => 0,
            Self::AddDoubleData { chunks, .. } => chunks.len(),
            Self::AddStringData { chunks, .. } => chunks.len(),
        }
    }
}

/// FIFO queue of [`BufferedOperation`]s with size accounting.
///
/// The owner holds the buffer behind a mutex and applies the drained batch
/// while still holding it, so nothing is enqueued in between.
#[derive(Debug)]
pub struct ChangeBuffer {
    operations: Vec<BufferedOperation>,
    serialized_size: u64,
    maximum_change: usize,
    maximum_size: u64,
    series_created: usize,
    chunks_added: usize,
}

/// Counters of a drained batch, for logging.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct DrainStats {
    pub operations: usize,
    pub serialized_size: u64,
    pub series_created: usize,
    pub chunks_added: usize,
}

impl ChangeBuffer {
    pub fn new(maximum_change: usize, maximum_size: u64) -> Self {
        Self {
            operations: Vec::new(),
            serialized_size: 0,
            maximum_change: maximum_change.max(1),
            maximum_size: maximum_size.max(1),
            series_created: 0,
            chunks_added: 0,
        }
    }

    pub fn from_config(config: &StorageConfig) -> Self {
        Self::new(config.flush_maximum_change, config.flush_maximum_size)
    }

    /// Enqueue an operation. Returns `true` once a threshold is reached and
    /// the buffer should be applied.
    pub fn push(&mut self, operation: BufferedOperation) -> StorageResult<bool> {
        self.serialized_size += bincode::serialized_size(&operation)?;
        match &operation {
            BufferedOperation::CreateTimeSeries { .. } => self.series_created += 1,
            other => self.chunks_added += other.chunk_count(),
        }
        self.operations.push(operation);
        Ok(self.is_full())
    }

    pub fn is_full(&self) -> bool {
        self.operations.len() >= self.maximum_change || self.serialized_size >= self.maximum_size
    }

    pub fn is_empty(&self) -> bool {
        self.operations.is_empty()
    }

    pub fn len(&self) -> usize {
        self.operations.len()
    }

    pub fn serialized_size(&self) -> u64 {
        self.serialized_size
    }

    /// Pending operations in enqueue order.
    pub fn operations(&self) -> &[BufferedOperation] {
        &self.operations
    }

    /// Whether a not-yet-applied create for `(node, name)` is queued.
    pub fn creates_series(&self, node: NodeId, name: &str) -> bool {
        self.operations.iter().any(|op| {
            matches!(op, BufferedOperation::CreateTimeSeries { node_id, metadata }
                if *node_id == node && metadata.name == name)
        })
    }

    /// Take every pending operation and reset the counters.
    pub fn drain(&mut self) -> (Vec<BufferedOperation>, DrainStats) {
        let stats = DrainStats {
            operations: self.operations.len(),
            serialized_size: self.serialized_size,
            series_created: self.series_created,
            chunks_added: self.chunks_added,
        };
        self.serialized_size = 0;
        self.series_created = 0;
        self.chunks_added = 0;
        debug!(
            operations = stats.operations,
            bytes = stats.serialized_size,
            "draining change buffer"
        );
        (std::mem::take(&mut self.operations), stats)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use afs_types::{TimeSeriesDataType, TimeSeriesIndex};
    use std::collections::BTreeMap;

    fn create(node_id: NodeId, name: &str) -> BufferedOperation {
        BufferedOperation::CreateTimeSeries {
            node_id,
            metadata: TimeSeriesMetadata::new(
                name,
                TimeSeriesDataType::Double,
                BTreeMap::new(),
                TimeSeriesIndex::new(0, 10, 1).unwrap(),
            ),
        }
    }

    fn add(node_id: NodeId, values: usize) -> BufferedOperation {
        BufferedOperation::AddDoubleData {
            node_id,
            version: 1,
            name: "ts".into(),
            chunks: vec![DoubleDataChunk::uncompressed(0, vec![1.0; values])],
        }
    }

    #[test]
    fn count_threshold() {
        let mut buffer = ChangeBuffer::new(2, u64::MAX);
        let id = NodeId::new();
        assert!(!buffer.push(create(id, "a")).unwrap());
        assert!(buffer.push(add(id, 1)).unwrap());
        assert_eq!(buffer.len(), 2);
    }

    #[test]
    fn size_threshold() {
        let mut buffer = ChangeBuffer::new(usize::MAX, 1024);
        let id = NodeId::new();
        assert!(!buffer.push(add(id, 10)).unwrap());
        assert!(buffer.push(add(id, 200)).unwrap());
        assert!(buffer.serialized_size() >= 1024);
    }

    #[test]
    fn drain_preserves_order_and_resets() {
        let mut buffer = ChangeBuffer::new(100, u64::MAX);
        let id = NodeId::new();
        buffer.push(create(id, "a")).unwrap();
        buffer.push(add(id, 3)).unwrap();
        assert!(buffer.creates_series(id, "a"));
        assert!(!buffer.creates_series(id, "b"));

        let (ops, stats) = buffer.drain();
        assert!(matches!(ops[0], BufferedOperation::CreateTimeSeries { .. }));
        assert!(matches!(ops[1], BufferedOperation::AddDoubleData { .. }));
        assert_eq!(stats.operations, 2);
        assert_eq!(stats.series_created, 1);
        assert_eq!(stats.chunks_added, 1);
        assert!(buffer.is_empty());
        assert_eq!(buffer.serialized_size(), 0);
    }

    #[test]
    fn from_config_uses_thresholds() {
        let config = StorageConfig::default().with_flush_thresholds(1, u64::MAX);
        let mut buffer = ChangeBuffer::from_config(&config);
        assert!(buffer.push(create(NodeId::new(), "a")).unwrap());
    }
}
