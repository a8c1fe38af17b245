//! Storage engine for the AppFS application file system.
//!
//! An application file system is a tree of named, typed nodes. Each node may
//! carry generic metadata, named chunked binary blobs, versioned time series
//! and named dependency edges to other nodes. This crate defines the contract
//! every backend implements ([`AppStorage`]) and a shared engine
//! ([`ColumnAppStorage`]) that realizes it on any [`ColumnStore`].
//!
//! # Backends
//!
//! - [`InMemoryAppStorage`] -- engine over [`InMemoryColumnStore`], for tests
//!   and embedding
//! - `afs-sled` -- engine over sled trees (one tree per column family)
//! - `afs-remote` -- client tunnelling the same contract over HTTP
//!
//! # Design Rules
//!
//! 1. The parent/child relationship is stored twice (the node's own record
//!    and its parent's child-list row); both copies change in one batch.
//! 2. Time-series writes are queued in a [`ChangeBuffer`]; every other
//!    mutation drains the buffer first so effects stay totally ordered.
//! 3. Blobs are cut into zstd-compressed chunks; a blob exists once its
//!    chunk 0 does.
//! 4. Broken references are logged and skipped, never propagated.
//! 5. Maintenance passes report and optionally repair, best-effort.

pub mod buffer;
pub mod column;
pub mod config;
pub mod engine;
pub mod error;
pub mod events;
pub mod registry;
pub mod stream;
pub mod traits;

#[cfg(any(test, feature = "contract-tests"))]
pub mod contract;

pub use buffer::{BufferedOperation, ChangeBuffer, DrainStats};
pub use column::memory::InMemoryColumnStore;
pub use column::{ColumnFamily, ColumnStore, Mutation, WriteBatch};
pub use config::StorageConfig;
pub use engine::{ColumnAppStorage, ConsistencyChecker, InMemoryAppStorage};
pub use error::{StorageError, StorageResult};
pub use events::{EventsBus, InMemoryEventsBus};
pub use registry::{BackendParams, StorageFactory, StorageRegistry};
pub use stream::{BinaryDataWriter, ChunkSink, ChunkSource, ChunkedReader, ChunkedWriter};
pub use traits::{AppStorage, BinaryDataReader};
