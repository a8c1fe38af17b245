use std::time::Duration;

use afs_storage::{BackendParams, StorageConfig, StorageError, StorageResult};
use serde::{Deserialize, Serialize};

/// Where and how to reach a storage server.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct RemoteConfig {
    /// Server base URL, e.g. `http://localhost:8090`.
    pub base_url: String,
    pub file_system_name: String,
    /// Per-request timeout in milliseconds.
    pub timeout_ms: u64,
    /// Subscribe to the server's event stream.
    pub events: bool,
    /// Client-side buffering and events-bus settings.
    pub storage: StorageConfig,
}

impl Default for RemoteConfig {
    fn default() -> Self {
        Self {
            base_url: "http://127.0.0.1:8090".into(),
            file_system_name: "default".into(),
            timeout_ms: 30_000,
            events: true,
            storage: StorageConfig::default(),
        }
    }
}

impl RemoteConfig {
    pub fn new(base_url: impl Into<String>, file_system_name: impl Into<String>) -> Self {
        Self {
            base_url: base_url.into(),
            file_system_name: file_system_name.into(),
            ..Self::default()
        }
    }

    pub fn from_toml_str(text: &str) -> StorageResult<Self> {
        toml::from_str(text).map_err(|e| StorageError::Config(e.to_string()))
    }

    /// Build from registry options: `url` (required), `timeout_ms`, `events`.
    pub fn from_params(params: &BackendParams) -> StorageResult<Self> {
        let mut config = Self::new(params.require("url")?, params.file_system_name.clone());
        config.storage = params.config.clone();
        if let Some(v) = params.options.get("timeout_ms") {
            config.timeout_ms = v
                .trim()
                .parse()
                .map_err(|_| {
                    StorageError::Config(format!("timeout_ms must be milliseconds, got '{v}'"))
                })?;
        }
        if let Some(v) = params.options.get("events") {
            config.events = v
                .trim()
                .parse()
                .map_err(|_| {
                    StorageError::Config(format!("events must be true or false, got '{v}'"))
                })?;
        }
        Ok(config)
    }

    pub fn timeout(&self) -> Duration {
        Duration::from_millis(self.timeout_ms)
    }

    pub(crate) fn base(&self) -> &str {
        self.base_url.trim_end_matches('/')
    }

    /// WebSocket URL of the event stream.
    pub fn events_url(&self) -> StorageResult<String> {
        let path = afs_protocol::endpoints::events(&self.file_system_name);
        let base = self.base();
        if let Some(rest) = base.strip_prefix("http://") {
            Ok(format!("ws://{rest}{path}"))
        } else if let Some(rest) = base.strip_prefix("https://") {
            Ok(format!("wss://{rest}{path}"))
        } else {
            Err(StorageError::Config(format!("unsupported server URL: {}", self.base_url)))
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn events_url_follows_scheme() {
        let config = RemoteConfig::new("http://host:8090/", "main");
        assert_eq!(config.events_url().unwrap(), "ws://host:8090/v1/fs/main/events");
        let config = RemoteConfig::new("https://host", "main");
        assert_eq!(config.events_url().unwrap(), "wss://host/v1/fs/main/events");
        assert!(RemoteConfig::new("ftp://host", "main").events_url().is_err());
    }

    #[test]
    fn from_params_reads_options() {
        let params = BackendParams::new("main", StorageConfig::default())
            .option("url", "http://host:1")
            .option("timeout_ms", "250")
            .option("events", "false");
        let config = RemoteConfig::from_params(&params).unwrap();
        assert_eq!(config.base_url, "http://host:1");
        assert_eq!(config.file_system_name, "main");
        assert_eq!(config.timeout(), Duration::from_millis(250));
        assert!(!config.events);
    }

    #[test]
    fn from_params_requires_url() {
        let params = BackendParams::new("main", StorageConfig::default());
        assert!(matches!(RemoteConfig::from_params(&params), Err(StorageError::Config(_))));
        let params = params.option("url", "http://h").option("timeout_ms", "soon");
        assert!(matches!(RemoteConfig::from_params(&params), Err(StorageError::Config(_))));
    }

    #[test]
    fn toml_defaults() {
        let config = RemoteConfig::from_toml_str("base_url = \"http://h:1\"").unwrap();
        assert_eq!(config.file_system_name, "default");
        assert!(config.events);
    }
}
