use afs_storage::StorageError;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum ProtocolError {
    #[error("message too large: {size} bytes (max {max})")]
    MessageTooLarge { size: usize, max: usize },

    #[error("serialization error: {0}")]
    Serialization(String),

    #[error("deserialization error: {0}")]
    Deserialization(String),

    #[error("unexpected response {got} to {request}")]
    UnexpectedResponse { request: &'static str, got: &'static str },
}

pub type ProtocolResult<T> = Result<T, ProtocolError>;

impl From<ProtocolError> for StorageError {
    fn from(e: ProtocolError) -> Self {
        match e {
            ProtocolError::Serialization(m) | ProtocolError::Deserialization(m) => {
                StorageError::Serialization(m)
            }
            other => StorageError::Backend(other.to_string()),
        }
    }
}
