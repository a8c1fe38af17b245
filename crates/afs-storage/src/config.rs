use std::path::Path;

use serde::{Deserialize, Serialize};

use crate::error::{StorageError, StorageResult};

/// Tuning knobs shared by every backend.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct StorageConfig {
    /// Uncompressed bytes per blob chunk.
    pub binary_data_chunk_size: usize,
    /// Buffered time-series operations that trigger a flush.
    pub flush_maximum_change: usize,
    /// Serialized bytes of buffered operations that trigger a flush.
    pub flush_maximum_size: u64,
    /// zstd level used for blob chunks.
    pub compression_level: i32,
    /// Pending events that trigger an events-bus flush.
    pub events_flush_threshold: usize,
    /// Capacity of the events broadcast channel.
    pub events_channel_capacity: usize,
}

impl Default for StorageConfig {
    fn default() -> Self {
        Self {
            binary_data_chunk_size: 2 * 1024 * 1024,
            flush_maximum_change: 1000,
            flush_maximum_size: 16 * 1024 * 1024,
            compression_level: 3,
            events_flush_threshold: 1000,
            events_channel_capacity: 1024,
        }
    }
}

impl StorageConfig {
    /// Parse from TOML. Missing keys take their defaults.
    pub fn from_toml_str(text: &str) -> StorageResult<Self> {
        let config: Self = toml::from_str(text).map_err(|e| StorageError::Config(e.to_string()))?;
        config.validate()?;
        Ok(config)
    }

    /// Load from a TOML file.
    pub fn load(path: impl AsRef<Path>) -> StorageResult<Self> {
        let path = path.as_ref();
        let text = std::fs::read_to_string(path)
            .map_err(|e| StorageError::Config(format!("{}: {e}", path.display())))?;
        Self::from_toml_str(&text)
    }

    pub fn with_chunk_size(mut self, binary_data_chunk_size: usize) -> Self {
        self.binary_data_chunk_size = binary_data_chunk_size;
        self
    }

    pub fn with_flush_thresholds(mut self, maximum_change: usize, maximum_size: u64) -> Self {
        self.flush_maximum_change = maximum_change;
        self.flush_maximum_size = maximum_size;
        self
    }

    pub fn validate(&self) -> StorageResult<()> {
        let positive = [
            ("binary_data_chunk_size", self.binary_data_chunk_size as u64),
            ("flush_maximum_change", self.flush_maximum_change as u64),
            ("flush_maximum_size", self.flush_maximum_size),
            ("events_flush_threshold", self.events_flush_threshold as u64),
            ("events_channel_capacity", self.events_channel_capacity as u64),
        ];
        for (name, value) in positive {
            if value == 0 {
                return Err(StorageError::Config(format!("{name} must be positive")));
            }
        }
        if !(1..=22).contains(&self.compression_level) {
            return Err(StorageError::Config(format!(
                "compression_level must be in 1..=22, got {}",
                self.compression_level
            )));
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn default_config() {
        let c = StorageConfig::default();
        assert_eq!(c.binary_data_chunk_size, 2 * 1024 * 1024);
        assert_eq!(c.flush_maximum_change, 1000);
        assert_eq!(c.flush_maximum_size, 16 * 1024 * 1024);
        assert!(c.validate().is_ok());
    }

    #[test]
    fn partial_toml_keeps_defaults() {
        let c = StorageConfig::from_toml_str("binary_data_chunk_size = 64\n").unwrap();
        assert_eq!(c.binary_data_chunk_size, 64);
        assert_eq!(c.flush_maximum_change, 1000);
    }

    #[test]
    fn zero_values_rejected() {
        let err = StorageConfig::from_toml_str("flush_maximum_change = 0\n").unwrap_err();
        assert!(matches!(err, StorageError::Config(_)));
        assert!(StorageConfig::default().with_chunk_size(0).validate().is_err());
    }

    #[test]
    fn bad_compression_level_rejected() {
        assert!(StorageConfig::from_toml_str("compression_level = 40\n").is_err());
    }

    #[test]
    fn load_from_file() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("storage.toml");
        std::fs::write(&path, "flush_maximum_size = 4096\n").unwrap();
        let c = StorageConfig::load(&path).unwrap();
        assert_eq!(c.flush_maximum_size, 4096);
        assert!(StorageConfig::load(dir.path().join("missing.toml")).is_err());
    }
}
