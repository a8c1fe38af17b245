use afs_types::NodeEventList;
use serde::de::DeserializeOwned;
use serde::Serialize;

use crate::error::{ProtocolError, ProtocolResult};
use crate::message::{StorageRequest, StorageResponse, MAX_MESSAGE_SIZE};

/// Bincode codec for HTTP bodies and WebSocket frames.
///
/// Messages are not framed: HTTP and WebSocket already delimit them.
pub struct StorageCodec;

impl StorageCodec {
    pub fn encode_request(request: &StorageRequest) -> ProtocolResult<Vec<u8>> {
        Self::encode(request)
    }

    pub fn decode_request(data: &[u8]) -> ProtocolResult<StorageRequest> {
        Self::decode(data)
    }

    pub fn encode_response(response: &StorageResponse) -> ProtocolResult<Vec<u8>> {
        Self::encode(response)
    }

    pub fn decode_response(data: &[u8]) -> ProtocolResult<StorageResponse> {
        Self::decode(data)
    }

    pub fn encode_events(events: &NodeEventList) -> ProtocolResult<Vec<u8>> {
        Self::encode(events)
    }

    pub fn decode_events(data: &[u8]) -> ProtocolResult<NodeEventList> {
        Self::decode(data)
    }

    fn encode<T: Serialize>(value: &T) -> ProtocolResult<Vec<u8>> {
        let payload =
            bincode::serialize(value).map_err(|e| ProtocolError::Serialization(e.to_string()))?;
        if payload.len() > MAX_MESSAGE_SIZE {
            return Err(ProtocolError::MessageTooLarge {
                size: payload.len(),
                max: MAX_MESSAGE_SIZE,
            });
        }
        Ok(payload)
    }

    fn decode<T: DeserializeOwned>(data: &[u8]) -> ProtocolResult<T> {
        if data.len() > MAX_MESSAGE_SIZE {
            return Err(ProtocolError::MessageTooLarge {
                size: data.len(),
                max: MAX_MESSAGE_SIZE,
            });
        }
        bincode::deserialize(data).map_err(|e| ProtocolError::Deserialization(e.to_string()))
    }
}
