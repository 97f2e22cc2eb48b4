//! Backend selection from configuration

use crate::db::Database;
use crate::errors::Result;
use crate::redis_store::RedisStore;
use crate::sqlite_index::SqliteIndex;
use crate::sqlite_store::SqliteStore;
use difflog_core::config::{Backend, DiffsConfig};
use difflog_core::index::{MemoryIndex, RelationIndex};
use difflog_core::store::{MemoryStore, TimeSeriesStore};
use std::sync::Arc;

/// A time-series store and, when configured, its relation index
#[derive(Clone)]
pub struct Backends {
    pub store: Arc<dyn TimeSeriesStore>,
    pub index: Option<Arc<dyn RelationIndex>>,
}

/// Open the backends named by `config.store`
///
/// - `memory`: in-process store and index
/// - `sqlite`: store and index in the same database file
/// - `redis`: Redis store; index only if `index_path` is set
///
/// # Errors
///
/// `InvalidConfig` if the configuration does not validate or the Redis URL
/// is malformed; SQLite open/migration failures. Redis connectivity is not
/// checked until the first operation.
pub fn open_from_config(config: &DiffsConfig) -> Result<Backends> {
    config.validate()?;

    let backends = match config.store.backend {
        Backend::Memory => Backends {
            store: Arc::new(MemoryStore::new()),
            index: Some(Arc::new(MemoryIndex::new())),
        },
        Backend::Sqlite => {
            let db = Database::open(&config.store.path)?;
            Backends {
                store: Arc::new(SqliteStore::new(db.clone())),
                index: Some(Arc::new(SqliteIndex::new(db))),
            }
        }
        Backend::Redis => {
            let index: Option<Arc<dyn RelationIndex>> = match &config.store.index_path {
                Some(path) => Some(Arc::new(SqliteIndex::new(Database::open(path)?))),
                None => None,
            };
            Backends {
                store: Arc::new(RedisStore::open(&config.redis_url())?),
                index,
            }
        }
    };

    tracing::debug!(backend = ?config.store.backend, indexed = backends.index.is_some(), "opened backends");
    Ok(backends)
}
