//! Backend registry: storage factories looked up by backend name.

use std::collections::BTreeMap;
use std::sync::{Arc, RwLock};

use tracing::debug;

use crate::config::StorageConfig;
use crate::engine::InMemoryAppStorage;
use crate::error::{StorageError, StorageResult};
use crate::traits::AppStorage;

/// Parameters handed to a backend factory.
#[derive(Clone, Debug, Default)]
pub struct BackendParams {
    pub file_system_name: String,
    pub config: StorageConfig,
    /// Backend-specific settings (path, url, ...).
    pub options: BTreeMap<String, String>,
}

impl BackendParams {
    pub fn new(file_system_name: impl Into<String>, config: StorageConfig) -> Self {
        Self {
            file_system_name: file_system_name.into(),
            config,
            options: BTreeMap::new(),
        }
    }

    pub fn option(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.options.insert(key.into(), value.into());
        self
    }

    /// A required backend option.
    pub fn require(&self, key: &str) -> StorageResult<&str> {
        self.options
            .get(key)
            .map(|v| v.trim())
            .filter(|v| !v.is_empty())
            .ok_or_else(|| StorageError::Config(format!("backend option '{key}' is required")))
    }
}

pub type StorageFactory =
    Box<dyn Fn(&BackendParams) -> StorageResult<Arc<dyn AppStorage>> + Send + Sync>;

/// Named storage factories. Names are case-insensitive.
pub struct StorageRegistry {
    factories: RwLock<BTreeMap<String, StorageFactory>>,
}

fn normalize(backend: &str) -> StorageResult<String> {
    let backend = backend.trim().to_ascii_lowercase();
    if backend.is_empty() {
        return Err(StorageError::Config("storage backend cannot be empty".into()));
    }
    Ok(backend)
}

impl StorageRegistry {
    /// An empty registry.
    pub fn new() -> Self {
        Self {
            factories: RwLock::new(BTreeMap::new()),
        }
    }

    /// A registry with the `memory` backend registered.
    pub fn with_defaults() -> Self {
        let registry = Self::new();
        registry.register(
            "memory",
            Box::new(|params: &BackendParams| {
                let storage = InMemoryAppStorage::in_memory(
                    params.file_system_name.clone(),
                    params.config.clone(),
                )?;
                Ok(Arc::new(storage) as Arc<dyn AppStorage>)
            }),
        );
        registry
    }

    /// Register (or replace) a backend factory.
    pub fn register(&self, backend: &str, factory: StorageFactory) {
        let name = backend.trim().to_ascii_lowercase();
        debug!(backend = %name, "registered storage backend");
        self.factories
            .write()
            .expect("registry lock poisoned")
            .insert(name, factory);
    }

    pub fn contains(&self, backend: &str) -> bool {
        normalize(backend)
            .map(|name| self.factories.read().expect("registry lock poisoned").contains_key(&name))
            .unwrap_or(false)
    }

    /// Registered backend names, sorted.
    pub fn backends(&self) -> Vec<String> {
        self.factories
            .read()
            .expect("registry lock poisoned")
            .keys()
            .cloned()
            .collect()
    }

    pub fn create(
        &self,
        backend: &str,
        params: &BackendParams,
    ) -> StorageResult<Arc<dyn AppStorage>> {
        let name = normalize(backend)?;
        if params.file_system_name.trim().is_empty() {
            return Err(StorageError::Config("file system name cannot be empty".into()));
        }
        let factories = self.factories.read().expect("registry lock poisoned");
        let factory = factories
            .get(&name)
            .ok_or_else(|| StorageError::Config(format!("unsupported storage backend: {name}")))?;
        factory(params)
    }
}

impl Default for StorageRegistry {
    fn default() -> Self {
        Self::with_defaults()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn memory_backend_is_registered() {
        let registry = StorageRegistry::with_defaults();
        assert!(registry.contains("memory"));
        assert!(registry.contains(" MEMORY "));
        let storage = registry
            .create("memory", &BackendParams::new("fs", StorageConfig::default()))
            .unwrap();
        assert_eq!(storage.file_system_name(), "fs");
        assert!(!storage.is_remote());
    }

    #[test]
    fn unknown_backend_is_a_config_error() {
        let registry = StorageRegistry::with_defaults();
        let err = registry
            .create("cassandra", &BackendParams::new("fs", StorageConfig::default()))
            .err()
            .unwrap();
        assert!(matches!(err, StorageError::Config(_)));
        assert!(matches!(
            registry.create("", &BackendParams::new("fs", StorageConfig::default())),
            Err(StorageError::Config(_))
        ));
    }

    #[test]
    fn custom_factory_receives_options() {
        let registry = StorageRegistry::new();
        registry.register(
            "custom",
            Box::new(|params: &BackendParams| {
                assert_eq!(params.require("path")?, "/tmp/x");
                let storage = InMemoryAppStorage::in_memory(
                    params.file_system_name.clone(),
                    params.config.clone(),
                )?;
                Ok(Arc::new(storage) as Arc<dyn AppStorage>)
            }),
        );
        assert_eq!(registry.backends(), vec!["custom".to_string()]);
        let params = BackendParams::new("fs", StorageConfig::default()).option("path", "/tmp/x");
        assert!(registry.create("Custom", &params).is_ok());
        let missing = BackendParams::new("fs", StorageConfig::default());
        assert!(registry.create("custom", &missing).is_err());
    }
}
