//! Foundation types for the AppFS storage engine.
//!
//! This crate provides the value types shared by every storage backend and by
//! the network protocol. Every other AppFS crate depends on `afs-types`.
//!
//! # Key Types
//!
//! - [`NodeId`] - Time-ordered unique node identifier (UUID v7)
//! - [`NodeInfo`] - A node of the application file system tree
//! - [`NodeGenericMetadata`] - Four typed key/value maps attached to a node
//! - [`TimeSeriesMetadata`] - Name, data type, tags and index of a series
//! - [`DataChunk`] - Uncompressed or run-length encoded slice of a series
//! - [`NodeEvent`] - Typed notification emitted after each mutation
//! - [`FileSystemCheckIssue`] - One finding of a consistency check pass

pub mod check;
pub mod chunk;
pub mod error;
pub mod event;
pub mod node;
pub mod timeseries;

pub use check::{FileSystemCheckIssue, FileSystemCheckKind, FileSystemCheckOptions};
pub use chunk::{ChunkValue, DataChunk, DoubleDataChunk, StringDataChunk};
pub use error::TypeError;
pub use event::{topics, NodeEvent, NodeEventList};
pub use node::{epoch_millis, NodeDependency, NodeGenericMetadata, NodeId, NodeInfo};
pub use timeseries::{TimeSeriesDataType, TimeSeriesIndex, TimeSeriesMetadata};
