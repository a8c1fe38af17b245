use thiserror::Error;

/// Errors produced by type construction and validation.
#[derive(Debug, Error, PartialEq, Eq)]
pub enum TypeError {
    #[error("invalid node id: {0}")]
    InvalidNodeId(String),

    #[error("invalid data chunk: {0}")]
    InvalidChunk(String),

    #[error("invalid time series index: {0}")]
    InvalidIndex(String),

    #[error("missing required field: {0}")]
    MissingField(&'static str),

    #[error("unknown file system check kind: {0}")]
    UnknownCheckKind(String),
}
