//! Persistent column-family backend for AppFS storage on sled.
//!
//! Each column family is a sled tree; a write batch runs as one transaction
//! across all trees, so it is applied atomically.

pub mod config;
pub mod store;

use std::sync::Arc;

use afs_storage::{
    AppStorage, BackendParams, ColumnAppStorage, StorageConfig, StorageRegistry, StorageResult,
};

pub use config::SledConfig;
pub use store::SledColumnStore;

/// The storage engine over sled.
pub type SledAppStorage = ColumnAppStorage<SledColumnStore>;

/// Open a sled-backed storage for one file system.
pub fn open(
    file_system_name: &str,
    sled: &SledConfig,
    config: StorageConfig,
) -> StorageResult<SledAppStorage> {
    let store = SledColumnStore::open(sled)?;
    ColumnAppStorage::new(file_system_name, store, config)
}

/// Register the `sled` backend. Options: `path` (required unless
/// `temporary = true`), `temporary`, `cache_capacity`.
pub fn register(registry: &StorageRegistry) {
    registry.register(
        "sled",
        Box::new(|params: &BackendParams| {
            let sled = SledConfig::from_params(params)?;
            let storage = open(&params.file_system_name, &sled, params.config.clone())?;
            Ok(Arc::new(storage) as Arc<dyn AppStorage>)
        }),
    );
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn registered_backend_opens_temporary_store() {
        let registry = StorageRegistry::with_defaults();
        register(&registry);
        assert_eq!(registry.backends(), vec!["memory".to_string(), "sled".to_string()]);

        let params = BackendParams::new("fs", StorageConfig::default()).option("temporary", "true");
        let storage = registry.create("sled", &params).unwrap();
        let root = storage.create_root_node_if_not_exists("root", "folder").unwrap();
        assert_eq!(storage.node_info(root.id).unwrap(), root);
    }

    #[test]
    fn registered_backend_requires_path() {
        let registry = StorageRegistry::new();
        register(&registry);
        let params = BackendParams::new("fs", StorageConfig::default());
        assert!(registry.create("sled", &params).is_err());
    }
}
