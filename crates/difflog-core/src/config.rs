//! Configuration for diff logs, the pruner and store connections
//!
//! Passed explicitly to constructors. Fields missing from a user file fall
//! back to their defaults individually, including nested store addressing.

use crate::errors::{ExError, ExErrorKind, Result};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};

/// Top-level configuration
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct DiffsConfig {
    /// Namespace prepended to every log key and used to scope pruning
    #[serde(default)]
    pub key_prefix: String,

    /// Retention age in seconds
    #[serde(default = "default_max_element_age")]
    pub max_element_age: u64,

    /// Defer diff writes until the enclosing unit of work commits
    #[serde(default = "default_true")]
    pub use_transactions: bool,

    #[serde(default)]
    pub store: StoreConfig,
}

/// Which store implementation backs the time series
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Backend {
    Memory,
    Redis,
    Sqlite,
}

/// Store addressing
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct StoreConfig {
    #[serde(default = "default_backend")]
    pub backend: Backend,

    #[serde(default = "default_host")]
    pub host: String,

    #[serde(default = "default_port")]
    pub port: u16,

    /// Redis logical database index
    #[serde(default)]
    pub db: i64,

    /// SQLite database file (sqlite backend)
    #[serde(default = "default_path")]
    pub path: PathBuf,

    /// SQLite file holding the relation index for the redis backend
    #[serde(default)]
    pub index_path: Option<PathBuf>,
}

impl DiffsConfig {
    /// Parse a TOML document, applying defaults for absent fields
    pub fn from_toml_str(content: &str) -> Result<Self> {
        let config: DiffsConfig = toml::from_str(content).map_err(|e| {
            ExError::new(ExErrorKind::InvalidConfig)
                .with_op("parse_config")
                .with_message(e.to_string())
        })?;
        config.validate()?;
        Ok(config)
    }

    /// Load configuration from a TOML file
    pub fn load_from_file(path: &Path) -> Result<Self> {
        let content = std::fs::read_to_string(path).map_err(|e| {
            ExError::new(ExErrorKind::Io)
                .with_op("load_config")
                .with_message(format!("Failed to read {}: {}", path.display(), e))
        })?;
        Self::from_toml_str(&content)
    }

    /// Reject settings no store or pruner can work with
    pub fn validate(&self) -> Result<()> {
        if self.max_element_age == 0 {
            return Err(ExError::new(ExErrorKind::InvalidConfig)
                .with_op("validate_config")
                .with_message("max_element_age must be greater than zero"));
        }
        if self.store.backend == Backend::Sqlite && self.store.path.as_os_str().is_empty() {
            return Err(ExError::new(ExErrorKind::InvalidConfig)
                .with_op("validate_config")
                .with_message("sqlite backend requires store.path"));
        }
        Ok(())
    }

    /// Connection URL for the redis backend
    pub fn redis_url(&self) -> String {
        format!(
            "redis://{}:{}/{}",
            self.store.host, self.store.port, self.store.db
        )
    }
}

impl Default for DiffsConfig {
    fn default() -> Self {
        Self {
            key_prefix: String::new(),
            max_element_age: default_max_element_age(),
            use_transactions: true,
            store: StoreConfig::default(),
        }
    }
}

impl Default for StoreConfig {
    fn default() -> Self {
        Self {
            backend: default_backend(),
            host: default_host(),
            port: default_port(),
            db: 0,
            path: default_path(),
            index_path: None,
        }
    }
}

fn default_max_element_age() -> u64 {
    60 * 60
}

fn default_true() -> bool {
    true
}

fn default_backend() -> Backend {
    Backend::Redis
}

fn default_host() -> String {
    "localhost".to_string()
}

fn default_port() -> u16 {
    6379
}

fn default_path() -> PathBuf {
    PathBuf::from(".difflog/store.db")
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults() {
        let config = DiffsConfig::default();
        assert_eq!(config.max_element_age, 3600);
        assert_eq!(config.key_prefix, "");
        assert!(config.use_transactions);
        assert_eq!(config.redis_url(), "redis://localhost:6379/0");
    }

    #[test]
    fn test_empty_document_is_all_defaults() {
        assert_eq!(DiffsConfig::from_toml_str("").unwrap(), DiffsConfig::default());
    }

    #[test]
    fn test_partial_store_section_merges() {
        let config = DiffsConfig::from_toml_str(
            r#"
            max_element_age = 120

            [store]
            port = 6380
            "#,
        )
        .unwrap();

        assert_eq!(config.max_element_age, 120);
        assert_eq!(config.store.port, 6380);
        assert_eq!(config.store.host, "localhost");
        assert_eq!(config.store.backend, Backend::Redis);
    }

    #[test]
    fn test_sqlite_backend() {
        let config = DiffsConfig::from_toml_str(
            r#"
            key_prefix = "diffs:"
            use_transactions = false

            [store]
            backend = "sqlite"
            path = "/tmp/diffs.db"
            "#,
        )
        .unwrap();

        assert_eq!(config.store.backend, Backend::Sqlite);
        assert_eq!(config.store.path, PathBuf::from("/tmp/diffs.db"));
        assert!(!config.use_transactions);
    }

    #[test]
    fn test_zero_age_rejected() {
        let err = DiffsConfig::from_toml_str("max_element_age = 0").unwrap_err();
        assert_eq!(err.kind(), ExErrorKind::InvalidConfig);
    }

    #[test]
    fn test_unknown_field_rejected() {
        let err = DiffsConfig::from_toml_str("max_age = 10").unwrap_err();
        assert_eq!(err.kind(), ExErrorKind::InvalidConfig);
    }

    #[test]
    fn test_load_from_file() {
        let dir = tempfile::TempDir::new().unwrap();
        let path = dir.path().join("difflog.toml");
        std::fs::write(&path, "max_element_age = 60\n").unwrap();

        let config = DiffsConfig::load_from_file(&path).unwrap();
        assert_eq!(config.max_element_age, 60);

        let err = DiffsConfig::load_from_file(&dir.path().join("missing.toml")).unwrap_err();
        assert_eq!(err.kind(), ExErrorKind::Io);
    }
}
