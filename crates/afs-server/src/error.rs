use thiserror::Error;

#[derive(Debug, Error)]
pub enum ServerError {
    #[error("file system not found: {0}")]
    FileSystemNotFound(String),

    #[error("file system declared twice: {0}")]
    DuplicateFileSystem(String),

    #[error("protocol error: {0}")]
    Protocol(#[from] afs_protocol::ProtocolError),

    #[error("storage error: {0}")]
    Storage(#[from] afs_storage::StorageError),

    #[error("configuration error: {0}")]
    Config(String),

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("internal error: {0}")]
    Internal(String),
}

pub type ServerResult<T> = Result<T, ServerError>;
