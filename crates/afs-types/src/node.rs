use std::collections::BTreeMap;
use std::fmt;
use std::str::FromStr;
use std::time::{SystemTime, UNIX_EPOCH};

use serde::{Deserialize, Serialize};

use crate::error::TypeError;

/// Current wall-clock time in milliseconds since the UNIX epoch.
pub fn epoch_millis() -> i64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .unwrap_or_default()
        .as_millis() as i64
}

/// Unique identifier of a node (UUID v7 for time-ordering).
///
/// Ids are generated at creation and never reused. The 16-byte big-endian
/// form is used as a key prefix by column stores, so byte order matches
/// creation order.
#[derive(Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct NodeId(uuid::Uuid);

impl NodeId {
    /// Generate a fresh time-ordered node id.
    pub fn new() -> Self {
        Self(uuid::Uuid::now_v7())
    }

    /// Create from an existing UUID.
    pub fn from_uuid(uuid: uuid::Uuid) -> Self {
        Self(uuid)
    }

    /// The underlying UUID.
    pub fn as_uuid(&self) -> &uuid::Uuid {
        &self.0
    }

    /// The raw 16 bytes, big-endian.
    pub fn to_bytes(&self) -> [u8; 16] {
        *self.0.as_bytes()
    }

    /// Rebuild from the raw 16-byte form.
    pub fn from_bytes(bytes: [u8; 16]) -> Self {
        Self(uuid::Uuid::from_bytes(bytes))
    }

    /// Rebuild from a slice that must be exactly 16 bytes long.
    pub fn from_slice(bytes: &[u8]) -> Result<Self, TypeError> {
        let arr: [u8; 16] = bytes
            .try_into()
            .map_err(|_| {
                TypeError::InvalidNodeId(format!("expected 16 bytes, got {}", bytes.len()))
            })?;
        Ok(Self::from_bytes(arr))
    }

    /// Short representation (first 8 characters of the UUID).
    pub fn short_id(&self) -> String {
        self.0.to_string()[..8].to_string()
    }
}

impl Default for NodeId {
    fn default() -> Self {
        Self::new()
    }
}

impl FromStr for NodeId {
    type Err = TypeError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        uuid::Uuid::parse_str(s.trim())
            .map(Self)
            .map_err(|e| TypeError::InvalidNodeId(format!("{s}: {e}")))
    }
}

impl fmt::Debug for NodeId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "NodeId({})", self.short_id())
    }
}

impl fmt::Display for NodeId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Generic metadata attached to a node: four independent typed maps.
///
/// Keys are unique within each map; the same key may appear in several maps.
#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
pub struct NodeGenericMetadata {
    pub strings: BTreeMap<String, String>,
    pub doubles: BTreeMap<String, f64>,
    pub ints: BTreeMap<String, i32>,
    pub booleans: BTreeMap<String, bool>,
}

impl NodeGenericMetadata {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_string(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.strings.insert(key.into(), value.into());
        self
    }

    pub fn with_double(mut self, key: impl Into<String>, value: f64) -> Self {
        self.doubles.insert(key.into(), value);
        self
    }

    pub fn with_int(mut self, key: impl Into<String>, value: i32) -> Self {
        self.ints.insert(key.into(), value);
        self
    }

    pub fn with_boolean(mut self, key: impl Into<String>, value: bool) -> Self {
        self.booleans.insert(key.into(), value);
        self
    }

    pub fn string(&self, key: &str) -> Option<&str> {
        self.strings.get(key).map(String::as_str)
    }

    pub fn double(&self, key: &str) -> Option<f64> {
        self.doubles.get(key).copied()
    }

    pub fn int(&self, key: &str) -> Option<i32> {
        self.ints.get(key).copied()
    }

    pub fn boolean(&self, key: &str) -> Option<bool> {
        self.booleans.get(key).copied()
    }

    /// Returns `true` if all four maps are empty.
    pub fn is_empty(&self) -> bool {
        self.strings.is_empty()
            && self.doubles.is_empty()
            && self.ints.is_empty()
            && self.booleans.is_empty()
    }
}

/// A node of the application file system tree.
///
/// `pseudo_class` is fixed at creation. `name`, `description`,
/// `modification_time` and `generic_metadata` change through the storage
/// API; `version` is supplied by the caller.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct NodeInfo {
    pub id: NodeId,
    pub name: String,
    pub pseudo_class: String,
    pub description: String,
    /// Creation time, epoch milliseconds.
    pub creation_time: i64,
    /// Last modification time, epoch milliseconds.
    pub modification_time: i64,
    pub version: i32,
    pub generic_metadata: NodeGenericMetadata,
}

impl NodeInfo {
    pub fn new(
        id: NodeId,
        name: impl Into<String>,
        pseudo_class: impl Into<String>,
        description: impl Into<String>,
        creation_time: i64,
        modification_time: i64,
        version: i32,
        generic_metadata: NodeGenericMetadata,
    ) -> Self {
        Self {
            id,
            name: name.into(),
            pseudo_class: pseudo_class.into(),
            description: description.into(),
            creation_time,
            modification_time,
            version,
            generic_metadata,
        }
    }
}

/// A named outgoing dependency edge resolved to its target node.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct NodeDependency {
    pub name: String,
    pub node_info: NodeInfo,
}

impl NodeDependency {
    pub fn new(name: impl Into<String>, node_info: NodeInfo) -> Self {
        Self {
            name: name.into(),
            node_info,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn ids_are_unique_and_time_ordered() {
        let a = NodeId::new();
        let b = NodeId::new();
        assert_ne!(a, b);
        assert!(a.to_bytes() <= b.to_bytes());
    }

    #[test]
    fn bytes_roundtrip() {
        let id = NodeId::new();
        assert_eq!(NodeId::from_bytes(id.to_bytes()), id);
        assert_eq!(NodeId::from_slice(&id.to_bytes()).unwrap(), id);
    }

    #[test]
    fn from_slice_rejects_wrong_length() {
        let err = NodeId::from_slice(&[1, 2, 3]).unwrap_err();
        assert!(matches!(err, TypeError::InvalidNodeId(_)));
    }

    #[test]
    fn parse_display_roundtrip() {
        let id = NodeId::new();
        let parsed: NodeId = id.to_string().parse().unwrap();
        assert_eq!(parsed, id);
    }

    #[test]
    fn parse_rejects_garbage() {
        assert!("not-a-node-id".parse::<NodeId>().is_err());
    }

    #[test]
    fn short_id_is_eight_chars() {
        assert_eq!(NodeId::new().short_id().len(), 8);
    }

    #[test]
    fn metadata_builders_and_getters() {
        let md = NodeGenericMetadata::new()
            .with_string("k", "v")
            .with_double("d", 1.5)
            .with_int("i", 3)
            .with_boolean("b", true);
        assert_eq!(md.string("k"), Some("v"));
        assert_eq!(md.double("d"), Some(1.5));
        assert_eq!(md.int("i"), Some(3));
        assert_eq!(md.boolean("b"), Some(true));
        assert!(!md.is_empty());
        assert!(NodeGenericMetadata::default().is_empty());
    }

    #[test]
    fn same_key_in_different_maps() {
        let md = NodeGenericMetadata::new().with_string("x", "s").with_int("x", 1);
        assert_eq!(md.string("x"), Some("s"));
        assert_eq!(md.int("x"), Some(1));
    }

    #[test]
    fn node_info_serde_roundtrip() {
        let info = NodeInfo::new(
            NodeId::new(),
            "folder",
            "folder",
            "",
            1,
            2,
            12,
            NodeGenericMetadata::new().with_string("k", "v"),
        );
        let json = serde_json::to_string(&info).unwrap();
        let parsed: NodeInfo = serde_json::from_str(&json).unwrap();
        assert_eq!(parsed, info);
    }
}
