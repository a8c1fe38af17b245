use std::path::{Path, PathBuf};

use afs_storage::{BackendParams, StorageError, StorageResult};
use serde::{Deserialize, Serialize};

/// Settings of the sled database.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct SledConfig {
    pub path: PathBuf,
    /// Delete the database when dropped.
    pub temporary: bool,
    /// Page cache size in bytes.
    pub cache_capacity: u64,
    /// Background flush interval; `None` flushes only on close.
    pub flush_every_ms: Option<u64>,
}

impl Default for SledConfig {
    fn default() -> Self {
        Self {
            path: PathBuf::from("appfs.db"),
            temporary: false,
            cache_capacity: 64 * 1024 * 1024,
            flush_every_ms: Some(500),
        }
    }
}

impl SledConfig {
    pub fn at(path: impl AsRef<Path>) -> Self {
        Self {
            path: path.as_ref().to_path_buf(),
            ..Self::default()
        }
    }

    pub fn temporary() -> Self {
        Self {
            temporary: true,
            ..Self::default()
        }
    }

    pub fn from_toml_str(text: &str) -> StorageResult<Self> {
        toml::from_str(text).map_err(|e| StorageError::Config(e.to_string()))
    }

    /// Build from registry options.
    pub fn from_params(params: &BackendParams) -> StorageResult<Self> {
        let parse_bool = |key: &str| -> StorageResult<bool> {
            match params.options.get(key) {
                None => Ok(false),
                Some(v) => v.trim().parse().map_err(|_| {
                    StorageError::Config(format!("option '{key}' must be true or false, got '{v}'"))
                }),
            }
        };
        let mut config = if parse_bool("temporary")? {
            Self::temporary()
        } else {
            Self::at(params.require("path")?)
        };
        if let Some(v) = params.options.get("cache_capacity") {
            config.cache_capacity = v
                .trim()
                .parse()
                .map_err(|_| {
                    StorageError::Config(format!("cache_capacity must be a byte count, got '{v}'"))
                })?;
        }
        Ok(config)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use afs_storage::StorageConfig;

    #[test]
    fn default_config() {
        let c = SledConfig::default();
        assert!(!c.temporary);
        assert_eq!(c.cache_capacity, 64 * 1024 * 1024);
        assert_eq!(c.flush_every_ms, Some(500));
    }

    #[test]
    fn toml_overrides() {
        let toml = "path = \"/var/lib/appfs\"\ncache_capacity = 1024\n";
        let c = SledConfig::from_toml_str(toml).unwrap();
        assert_eq!(c.path, PathBuf::from("/var/lib/appfs"));
        assert_eq!(c.cache_capacity, 1024);
        assert!(!c.temporary);
    }

    #[test]
    fn params_parsing() {
        let params = BackendParams::new("fs", StorageConfig::default())
            .option("path", "/data/fs")
            .option("cache_capacity", "2048");
        let c = SledConfig::from_params(&params).unwrap();
        assert_eq!(c.path, PathBuf::from("/data/fs"));
        assert_eq!(c.cache_capacity, 2048);

        let bad = BackendParams::new("fs", StorageConfig::default()).option("temporary", "maybe");
        assert!(SledConfig::from_params(&bad).is_err());
    }
}
