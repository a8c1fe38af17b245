//! Wire protocol for remote AppFS storage.
//!
//! A remote client sends one bincode-encoded [`StorageRequest`] per HTTP
//! call to the file system's RPC endpoint and receives a
//! [`StorageResponse`]. Events travel the other way as bincode-encoded
//! `NodeEventList`s in binary WebSocket messages. Bincode keeps `f64`
//! values (NaN included) bit-exact.

pub mod codec;
pub mod endpoint;
pub mod error;
pub mod message;

pub use codec::StorageCodec;
pub use endpoint::{endpoints, HealthResponse};
pub use error::{ProtocolError, ProtocolResult};
pub use message::{
    ErrorBody, ErrorKind, StorageRequest, StorageResponse, MAX_MESSAGE_SIZE, PROTOCOL_VERSION,
};
