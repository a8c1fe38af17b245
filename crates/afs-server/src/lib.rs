//! HTTP and WebSocket server for AppFS storage.
//!
//! Hosts one storage per configured file system and exposes each over a
//! bincode RPC endpoint, with node events streamed on a WebSocket.

pub mod config;
pub mod dispatch;
pub mod error;
pub mod handler;
pub mod router;
pub mod server;
pub mod state;

pub use config::{FileSystemConfig, ServerConfig};
pub use error::{ServerError, ServerResult};
pub use server::AfsServer;
pub use state::FileSystems;

/// A registry with every backend the server can host: `memory` and `sled`.
pub fn default_registry() -> afs_storage::StorageRegistry {
    let registry = afs_storage::StorageRegistry::with_defaults();
    afs_sled::register(&registry);
    registry
}
