//! Heap configuration
//!
//! Tuning knobs for [`ObjectHeap`](crate::heap::ObjectHeap), loadable from
//! TOML so an engine installation can adjust collection behavior without a
//! rebuild.

use std::path::Path;

use serde::Deserialize;
use tracing::{debug, info};

/// Configuration errors
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    /// Failed to read the config file
    #[error("IO error: {0}")]
    IoError(#[from] std::io::Error),

    /// Failed to parse TOML content
    #[error("Failed to parse TOML: {0}")]
    ParseError(#[from] toml::de::Error),
}

/// Result type for config operations
pub type ConfigResult<T> = Result<T, ConfigError>;

/// Tuning for one object heap
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
#[serde(default)]
pub struct HeapConfig {
    /// Run a collection pass automatically after this many allocations.
    /// 0 disables automatic collection (the engine collects at frame
    /// boundaries instead).
    pub auto_collect_threshold: usize,

    /// Emit a debug log line after every collection pass
    pub log_collections: bool,
}

impl Default for HeapConfig {
    fn default() -> Self {
        HeapConfig {
            auto_collect_threshold: 0,
            log_collections: true,
        }
    }
}

impl HeapConfig {
    /// Parse a TOML document
    pub fn from_toml_str(content: &str) -> ConfigResult<Self> {
        let config = toml::from_str(content)?;
        debug!(?config, "parsed heap config");
        Ok(config)
    }

    /// Load from a TOML file, falling back to defaults when the file does
    /// not exist
    pub fn load(path: impl AsRef<Path>) -> ConfigResult<Self> {
        let path = path.as_ref();
        if !path.exists() {
            info!(?path, "no heap config found, using defaults");
            return Ok(Self::default());
        }
        let content = std::fs::read_to_string(path)?;
        Self::from_toml_str(&content)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults() {
        let config = HeapConfig::default();
        assert_eq!(config.auto_collect_threshold, 0);
        assert!(config.log_collections);
    }

    #[test]
    fn test_parse_full() {
        let config = HeapConfig::from_toml_str(
            r#"
            auto_collect_threshold = 256
            log_collections = false
            "#,
        )
        .unwrap();
        assert_eq!(config.auto_collect_threshold, 256);
        assert!(!config.log_collections);
    }

    #[test]
    fn test_parse_partial_keeps_defaults() {
        let config = HeapConfig::from_toml_str("auto_collect_threshold = 32").unwrap();
        assert_eq!(config.auto_collect_threshold, 32);
        assert!(config.log_collections);
    }

    #[test]
    fn test_parse_error() {
        let err = HeapConfig::from_toml_str("auto_collect_threshold = \"many\"").unwrap_err();
        assert!(matches!(err, ConfigError::ParseError(_)));
    }

    #[test]
    fn test_load_missing_file_is_default() {
        let config = HeapConfig::load("/nonexistent/halcyon/heap.toml").unwrap();
        assert_eq!(config, HeapConfig::default());
    }
}
