use std::collections::BTreeMap;
use std::sync::Arc;

use afs_storage::{AppStorage, BackendParams, StorageRegistry};
use tracing::{info, warn};

use crate::config::ServerConfig;
use crate::error::{ServerError, ServerResult};

/// The storages hosted by a server, by file system name.
#[derive(Clone, Default)]
pub struct FileSystems {
    storages: BTreeMap<String, Arc<dyn AppStorage>>,
}

impl FileSystems {
    /// Open every configured file system through the registry.
    pub fn open(config: &ServerConfig, registry: &StorageRegistry) -> ServerResult<Self> {
        config.validate()?;
        let mut file_systems = Self::default();
        for fs in &config.file_systems {
            let mut params = BackendParams::new(fs.name.clone(), config.storage.clone());
            params.options = fs.options.clone();
            let storage = registry.create(&fs.backend, &params)?;
            info!(file_system = %fs.name, backend = %fs.backend, "opened file system");
            file_systems.insert(storage)?;
        }
        Ok(file_systems)
    }

    /// Host an already opened storage under its own name.
    pub fn insert(&mut self, storage: Arc<dyn AppStorage>) -> ServerResult<()> {
        let name = storage.file_system_name().to_string();
        if self.storages.contains_key(&name) {
            return Err(ServerError::DuplicateFileSystem(name));
        }
        self.storages.insert(name, storage);
        Ok(())
    }

    pub fn get(&self, name: &str) -> ServerResult<Arc<dyn AppStorage>> {
        self.storages
            .get(name)
            .cloned()
            .ok_or_else(|| ServerError::FileSystemNotFound(name.to_string()))
    }

    pub fn names(&self) -> Vec<String> {
        self.storages.keys().cloned().collect()
    }

    /// Close every storage, logging failures.
    pub fn close_all(&self) {
        for (name, storage) in &self.storages {
            if let Err(e) = storage.close() {
                warn!(file_system = %name, error = %e, "failed to close file system");
            }
        }
    }
}
