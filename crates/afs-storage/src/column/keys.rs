//! Composite key encoding.
//!
//! Components are appended in order: node ids as their 16 raw bytes, names
//! as a big-endian `u32` length followed by UTF-8 bytes, integers as
//! big-endian with the sign bit flipped so byte order matches numeric order.

use afs_types::NodeId;

use crate::error::{StorageError, StorageResult};

#[derive(Clone, Debug, Default)]
pub struct KeyBuilder {
    buf: Vec<u8>,
}

impl KeyBuilder {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn id(mut self, id: NodeId) -> Self {
        self.buf.extend_from_slice(&id.to_bytes());
        self
    }

    pub fn name(mut self, name: &str) -> Self {
        self.buf.extend_from_slice(&(name.len() as u32).to_be_bytes());
        self.buf.extend_from_slice(name.as_bytes());
        self
    }

    pub fn u32(mut self, value: u32) -> Self {
        self.buf.extend_from_slice(&value.to_be_bytes());
        self
    }

    pub fn i32(mut self, value: i32) -> Self {
        self.buf.extend_from_slice(&((value as u32) ^ 0x8000_0000).to_be_bytes());
        self
    }

    pub fn raw(mut self, bytes: &[u8]) -> Self {
        self.buf.extend_from_slice(bytes);
        self
    }

    pub fn build(self) -> Vec<u8> {
        self.buf
    }
}

/// Sequential decoder for keys built by [`KeyBuilder`].
pub struct KeyReader<'a> {
    buf: &'a [u8],
    pos: usize,
}

impl<'a> KeyReader<'a> {
    pub fn new(buf: &'a [u8]) -> Self {
        Self { buf, pos: 0 }
    }

    fn take(&mut self, n: usize) -> StorageResult<&'a [u8]> {
        let end = self.pos.checked_add(n).filter(|end| *end <= self.buf.len()).ok_or_else(|| {
            StorageError::Serialization(format!(
                "key truncated: need {n} bytes at offset {}, have {}",
                self.pos,
                self.buf.len()
            ))
        })?;
        let slice = &self.buf[self.pos..end];
        self.pos = end;
        Ok(slice)
    }

    pub fn id(&mut self) -> StorageResult<NodeId> {
        Ok(NodeId::from_slice(self.take(16)?)?)
    }

    pub fn name(&mut self) -> StorageResult<String> {
        let len = self.u32()? as usize;
        let bytes = self.take(len)?;
        String::from_utf8(bytes.to_vec()).map_err(|e| StorageError::Serialization(e.to_string()))
    }

    pub fn u32(&mut self) -> StorageResult<u32> {
        let bytes = self.take(4)?;
        Ok(u32::from_be_bytes([bytes[0], bytes[1], bytes[2], bytes[3]]))
    }

    pub fn i32(&mut self) -> StorageResult<i32> {
        Ok((self.u32()? ^ 0x8000_0000) as i32)
    }

    /// Everything not yet consumed.
    pub fn rest(&mut self) -> &'a [u8] {
        let rest = &self.buf[self.pos..];
        self.pos = self.buf.len();
        rest
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;

    #[test]
    fn composite_key_roundtrip() {
        let id = NodeId::new();
        let key = KeyBuilder::new().id(id).name("data").i32(-3).u32(7).build();
        let mut reader = KeyReader::new(&key);
        assert_eq!(reader.id().unwrap(), id);
        assert_eq!(reader.name().unwrap(), "data");
        assert_eq!(reader.i32().unwrap(), -3);
        assert_eq!(reader.u32().unwrap(), 7);
        assert!(reader.rest().is_empty());
    }

    #[test]
    fn name_prefix_does_not_match_longer_name() {
        let id = NodeId::new();
        let short = KeyBuilder::new().id(id).name("ab").build();
        let long = KeyBuilder::new().id(id).name("abc").u32(0).build();
        assert!(!long.starts_with(&short));
    }

    #[test]
    fn truncated_key_is_an_error() {
        let mut reader = KeyReader::new(&[0, 0, 0, 9, b'x']);
        assert!(matches!(reader.name(), Err(StorageError::Serialization(_))));
    }

    proptest! {
        #[test]
        fn i32_order_is_preserved(a: i32, b: i32) {
            let ka = KeyBuilder::new().i32(a).build();
            let kb = KeyBuilder::new().i32(b).build();
            prop_assert_eq!(a.cmp(&b), ka.cmp(&kb));
        }

        #[test]
        fn u32_order_is_preserved(a: u32, b: u32) {
            let ka = KeyBuilder::new().u32(a).build();
            let kb = KeyBuilder::new().u32(b).build();
            prop_assert_eq!(a.cmp(&b), ka.cmp(&kb));
        }
    }
}
