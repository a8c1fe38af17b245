use std::collections::BTreeMap;
use std::net::{Ipv4Addr, SocketAddr};
use std::path::Path;

use afs_storage::StorageConfig;
use serde::{Deserialize, Serialize};

use crate::error::{ServerError, ServerResult};

/// Server configuration, usually read from a TOML file.
///
/// ```toml
/// bind_addr = "0.0.0.0:8090"
///
/// [storage]
/// binary_data_chunk_size = 2097152
///
/// [[file_systems]]
/// name = "main"
/// backend = "sled"
/// options = { path = "/var/lib/appfs/main" }
/// ```
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ServerConfig {
    pub bind_addr: SocketAddr,
    /// Engine settings shared by every hosted file system.
    pub storage: StorageConfig,
    pub file_systems: Vec<FileSystemConfig>,
}

/// One hosted file system.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct FileSystemConfig {
    pub name: String,
    #[serde(default = "default_backend")]
    pub backend: String,
    #[serde(default)]
    pub options: BTreeMap<String, String>,
}

fn default_backend() -> String {
    "memory".into()
}

impl FileSystemConfig {
    pub fn new(name: impl Into<String>, backend: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            backend: backend.into(),
            options: BTreeMap::new(),
        }
    }

    pub fn option(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.options.insert(key.into(), value.into());
        self
    }
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            bind_addr: SocketAddr::from((Ipv4Addr::LOCALHOST, 8090)),
            storage: StorageConfig::default(),
            file_systems: vec![FileSystemConfig::new("default", default_backend())],
        }
    }
}

impl ServerConfig {
    pub fn from_toml_str(text: &str) -> ServerResult<Self> {
        let config: Self = toml::from_str(text).map_err(|e| ServerError::Config(e.to_string()))?;
        config.validate()?;
        Ok(config)
    }

    pub fn load(path: impl AsRef<Path>) -> ServerResult<Self> {
        let path = path.as_ref();
        let text = std::fs::read_to_string(path)
            .map_err(|e| ServerError::Config(format!("{}: {e}", path.display())))?;
        Self::from_toml_str(&text)
    }

    pub fn validate(&self) -> ServerResult<()> {
        self.storage.validate()?;
        if self.file_systems.is_empty() {
            return Err(ServerError::Config("at least one file system is required".into()));
        }
        let mut seen = std::collections::BTreeSet::new();
        for fs in &self.file_systems {
            if fs.name.trim().is_empty() {
                return Err(ServerError::Config("file system name cannot be empty".into()));
            }
            if !seen.insert(fs.name.as_str()) {
                return Err(ServerError::DuplicateFileSystem(fs.name.clone()));
            }
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn default_config() {
        let c = ServerConfig::default();
        assert_eq!(c.bind_addr, "127.0.0.1:8090".parse::<SocketAddr>().unwrap());
        assert_eq!(c.file_systems, vec![FileSystemConfig::new("default", "memory")]);
        c.validate().unwrap();
    }

    #[test]
    fn parses_file_systems() {
        let c = ServerConfig::from_toml_str(
            r#"
            bind_addr = "0.0.0.0:9000"

            [storage]
            binary_data_chunk_size = 1024

            [[file_systems]]
            name = "scratch"

            [[file_systems]]
            name = "main"
            backend = "sled"
            options = { path = "/tmp/main" }
            "#,
        )
        .unwrap();
        assert_eq!(c.bind_addr.port(), 9000);
        assert_eq!(c.storage.binary_data_chunk_size, 1024);
        assert_eq!(c.file_systems[0].backend, "memory");
        assert_eq!(c.file_systems[1].options["path"], "/tmp/main");
    }

    #[test]
    fn rejects_duplicate_names() {
        let err = ServerConfig::from_toml_str(
            r#"
            [[file_systems]]
            name = "a"
            [[file_systems]]
            name = "a"
            "#,
        )
        .unwrap_err();
        assert!(matches!(err, ServerError::DuplicateFileSystem(name) if name == "a"));
    }

    #[test]
    fn rejects_empty_file_system_list() {
        assert!(matches!(
            ServerConfig::from_toml_str("file_systems = []"),
            Err(ServerError::Config(_))
        ));
    }
}
