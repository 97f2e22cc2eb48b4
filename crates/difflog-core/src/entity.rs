//! Entity references and log key derivation

use std::fmt;
use std::sync::Arc;

/// A (kind, identifier) pair naming one tracked entity
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct EntityRef {
    pub kind: String,
    pub id: String,
}

impl EntityRef {
    pub fn new(kind: impl Into<String>, id: impl Into<String>) -> Self {
        Self {
            kind: kind.into(),
            id: id.into(),
        }
    }
}

impl fmt::Display for EntityRef {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}:{}", self.kind, self.id)
    }
}

/// Maps (kind, identifier) to the unprefixed part of a log key
pub type KeyFn = Arc<dyn Fn(&str, &str) -> String + Send + Sync>;

/// The default key layout, `"{kind}-{id}"`
pub fn default_key_fn() -> KeyFn {
    Arc::new(|kind: &str, id: &str| format!("{}-{}", kind, id))
}

/// Derives log keys under a namespace prefix
///
/// Every key a log writes starts with the prefix, which is what lets the
/// pruner tell this log's keys apart from unrelated keys in a shared store.
#[derive(Clone)]
pub struct KeyScheme {
    prefix: String,
    key_fn: KeyFn,
}

impl KeyScheme {
    pub fn new(prefix: impl Into<String>) -> Self {
        Self {
            prefix: prefix.into(),
            key_fn: default_key_fn(),
        }
    }

    pub fn with_key_fn(mut self, key_fn: KeyFn) -> Self {
        self.key_fn = key_fn;
        self
    }

    pub fn prefix(&self) -> &str {
        &self.prefix
    }

    pub fn key(&self, kind: &str, id: &str) -> String {
        format!("{}{}", self.prefix, (self.key_fn)(kind, id))
    }

    pub fn key_for(&self, entity: &EntityRef) -> String {
        self.key(&entity.kind, &entity.id)
    }
}

impl fmt::Debug for KeyScheme {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("KeyScheme")
            .field("prefix", &self.prefix)
            .finish_non_exhaustive()
    }
}
