//! Kind registration
//!
//! Resolves a kind name to its human-readable name and its diff log, and
//! hands out pruners sharing the same store and namespace.

use crate::config::DiffsConfig;
use crate::entity::KeyFn;
use crate::errors::{ExError, ExErrorKind, Result};
use crate::index::RelationIndex;
use crate::manager::DiffLog;
use crate::pruner::Pruner;
use crate::store::TimeSeriesStore;
use std::collections::BTreeMap;
use std::sync::Arc;

struct Registration {
    display_name: String,
    log: DiffLog,
}

/// All tracked kinds sharing one store
pub struct Registry {
    config: DiffsConfig,
    store: Arc<dyn TimeSeriesStore>,
    index: Option<Arc<dyn RelationIndex>>,
    key_fn: Option<KeyFn>,
    kinds: BTreeMap<String, Registration>,
}

impl Registry {
    pub fn new(store: Arc<dyn TimeSeriesStore>, config: DiffsConfig) -> Self {
        Self {
            config,
            store,
            index: None,
            key_fn: None,
            kinds: BTreeMap::new(),
        }
    }

    /// Attach a relation index to every log registered afterwards
    pub fn with_index(mut self, index: Arc<dyn RelationIndex>) -> Self {
        self.index = Some(index);
        self
    }

    /// Key layout for every log registered afterwards
    ///
    /// Diffs redirected to a subject of another kind are keyed by the
    /// writing log, so the layout has to be the same for all kinds.
    pub fn with_key_fn(mut self, key_fn: KeyFn) -> Self {
        self.key_fn = Some(key_fn);
        self
    }

    pub fn config(&self) -> &DiffsConfig {
        &self.config
    }

    /// Register `kind`, returning its diff log.
    ///
    /// # Errors
    ///
    /// `InvalidInput` if the kind is empty or already registered.
    pub fn register(&mut self, kind: &str, display_name: &str) -> Result<DiffLog> {
        if kind.is_empty() {
            return Err(ExError::new(ExErrorKind::InvalidInput)
                .with_op("register")
                .with_message("kind name must not be empty"));
        }
        if self.kinds.contains_key(kind) {
            return Err(ExError::new(ExErrorKind::InvalidInput)
                .with_op("register")
                .with_entity_id(kind)
                .with_message("kind already registered"));
        }

        let mut log = DiffLog::new(kind, self.store.clone(), &self.config);
        if let Some(index) = &self.index {
            log = log.with_index(index.clone());
        }
        if let Some(key_fn) = &self.key_fn {
            log = log.with_key_fn(key_fn.clone());
        }
        self.kinds.insert(
            kind.to_string(),
            Registration {
                display_name: display_name.to_string(),
                log: log.clone(),
            },
        );
        tracing::debug!(kind, display_name, "registered kind");
        Ok(log)
    }

    pub fn diffs(&self, kind: &str) -> Option<&DiffLog> {
        self.kinds.get(kind).map(|r| &r.log)
    }

    pub fn display_name(&self, kind: &str) -> Option<&str> {
        self.kinds.get(kind).map(|r| r.display_name.as_str())
    }

    pub fn kinds(&self) -> impl Iterator<Item = &str> {
        self.kinds.keys().map(String::as_str)
    }

    /// Pruner over this registry's store and key namespace
    pub fn pruner(&self) -> Pruner {
        let pruner = Pruner::new(self.store.clone(), self.config.key_prefix.clone());
        match &self.index {
            Some(index) => pruner.with_index(index.clone()),
            None => pruner,
        }
    }
}
