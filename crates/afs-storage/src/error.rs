use afs_types::{NodeId, TypeError};

/// Errors from storage operations.
#[derive(Debug, thiserror::Error)]
pub enum StorageError {
    /// The node id does not resolve to a node. Never retried.
    #[error("node not found: {0}")]
    NotFound(NodeId),

    /// The request was rejected before any write.
    #[error("invalid argument: {0}")]
    InvalidArgument(String),

    /// A dependency or parent pointer resolves to a missing node.
    #[error("broken reference from {from} to missing node {to}")]
    BrokenReference { from: NodeId, to: NodeId },

    /// I/O or transport error from the backend client.
    #[error("backend failure: {0}")]
    Backend(String),

    /// A maintenance repair step failed.
    #[error("repair failed for {node}: {reason}")]
    Repair { node: NodeId, reason: String },

    /// A stored row or wire message could not be encoded or decoded.
    #[error("serialization error: {0}")]
    Serialization(String),

    /// Configuration could not be loaded or is invalid.
    #[error("configuration error: {0}")]
    Config(String),

    /// The storage has been closed.
    #[error("storage is closed")]
    Closed,

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}

impl From<bincode::Error> for StorageError {
    fn from(e: bincode::Error) -> Self {
        StorageError::Serialization(e.to_string())
    }
}

impl From<TypeError> for StorageError {
    fn from(e: TypeError) -> Self {
        StorageError::InvalidArgument(e.to_string())
    }
}

/// Result alias for storage operations.
pub type StorageResult<T> = Result<T, StorageError>;
