//! Command implementations

pub mod keys;
pub mod prune;
pub mod show;

use clap::{Args, ValueEnum};
use difflog_core::config::{Backend, DiffsConfig};
use std::path::PathBuf;

/// Store selection shared by every command
///
/// Flags override values loaded from `--config`; anything not given falls
/// back to the defaults.
#[derive(Debug, Args)]
pub struct StoreArgs {
    /// TOML configuration file
    #[arg(long)]
    pub config: Option<PathBuf>,

    #[arg(long, value_enum)]
    pub backend: Option<BackendArg>,

    /// SQLite database file
    #[arg(long)]
    pub db: Option<PathBuf>,

    /// Redis host
    #[arg(long)]
    pub host: Option<String>,

    /// Redis port
    #[arg(long)]
    pub port: Option<u16>,

    /// Namespace prefix of the diff log keys
    #[arg(long)]
    pub key_prefix: Option<String>,
}

#[derive(Debug, Clone, Copy, ValueEnum)]
pub enum BackendArg {
    Redis,
    Sqlite,
}

impl StoreArgs {
    pub fn resolve(&self) -> Result<DiffsConfig, Box<dyn std::error::Error>> {
        let mut config = match &self.config {
            Some(path) => DiffsConfig::load_from_file(path)?,
            None => DiffsConfig::default(),
        };

        if let Some(backend) = self.backend {
            config.store.backend = match backend {
                BackendArg::Redis => Backend::Redis,
                BackendArg::Sqlite => Backend::Sqlite,
            };
        }
        if let Some(db) = &self.db {
            config.store.path = db.clone();
            // A database file without an explicit backend means sqlite
            if self.backend.is_none() && self.config.is_none() {
                config.store.backend = Backend::Sqlite;
            }
        }
        if let Some(host) = &self.host {
            config.store.host = host.clone();
        }
        if let Some(port) = self.port {
            config.store.port = port;
        }
        if let Some(prefix) = &self.key_prefix {
            config.key_prefix = prefix.clone();
        }

        config.validate()?;
        Ok(config)
    }
}
