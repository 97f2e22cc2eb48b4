//! Change-capture boundary
//!
//! The host application owns its entities and its transactions. A tracked
//! entity type implements [`Tracked`]; the host brackets each mutation with
//! [`ChangeCapture::before_mutation`] and [`ChangeCapture::after_mutation`],
//! and the capture decides whether anything changed, builds the payload,
//! resolves the subject, and hands the write to the commit hook.

mod commit;
mod registry;

pub use commit::{CommitHook, CommitJob, DeferredCommit, Immediate};
pub use registry::Registry;

use crate::config::DiffsConfig;
use crate::entity::EntityRef;
use crate::errors::Result;
use crate::manager::{DiffLog, NewDiff};
use crate::record::now_timestamp;
use serde_json::{json, Map, Value};
use std::collections::BTreeMap;
use std::sync::Arc;

/// Capabilities a tracked entity type supplies at registration
pub trait Tracked {
    /// Kind name; selects the log key namespace
    fn kind(&self) -> &str;

    fn id(&self) -> String;

    /// Current value of every tracked field
    fn fields(&self) -> BTreeMap<String, Value>;

    /// Entity to file diffs under instead of this one
    fn diff_subject(&self) -> Option<EntityRef> {
        None
    }

    /// Payload for a diff touching `changed` fields
    ///
    /// Returning `Value::Null` records nothing for this mutation.
    fn encode_payload(&self, changed: &[String]) -> Value {
        let fields = self.fields();
        let changed: Map<String, Value> = changed
            .iter()
            .filter_map(|name| fields.get(name).map(|v| (name.clone(), v.clone())))
            .collect();
        json!({
            "kind": self.kind(),
            "id": self.id(),
            "fields": changed,
        })
    }
}

/// Field values observed before a mutation
#[derive(Debug, Clone, Default, PartialEq)]
pub struct SnapshotToken {
    before: Option<BTreeMap<String, Value>>,
}

impl SnapshotToken {
    /// Token for an entity that has never been persisted
    pub fn fresh() -> Self {
        Self { before: None }
    }

    /// Names of fields whose value differs from the snapshot
    ///
    /// Every field counts as changed for a fresh token.
    pub fn changed_fields(&self, current: &BTreeMap<String, Value>) -> Vec<String> {
        match &self.before {
            None => current.keys().cloned().collect(),
            Some(before) => current
                .iter()
                .filter(|(name, value)| before.get(*name) != Some(*value))
                .map(|(name, _)| name.clone())
                .collect(),
        }
    }
}

/// Two-phase mutation hook feeding one diff log
#[derive(Clone)]
pub struct ChangeCapture {
    log: DiffLog,
    commit: Arc<dyn CommitHook>,
}

impl ChangeCapture {
    /// Capture that writes immediately
    pub fn new(log: DiffLog) -> Self {
        Self {
            log,
            commit: Arc::new(Immediate),
        }
    }

    /// Use `unit_of_work` when transactions are enabled, else write immediately
    pub fn from_config(
        log: DiffLog,
        config: &DiffsConfig,
        unit_of_work: Option<Arc<dyn CommitHook>>,
    ) -> Self {
        match unit_of_work {
            Some(hook) if config.use_transactions => Self { log, commit: hook },
            _ => Self::new(log),
        }
    }

    pub fn with_commit_hook(mut self, commit: Arc<dyn CommitHook>) -> Self {
        self.commit = commit;
        self
    }

    pub fn log(&self) -> &DiffLog {
        &self.log
    }

    pub fn before_mutation<T: Tracked + ?Sized>(&self, entity: &T) -> SnapshotToken {
        SnapshotToken {
            before: Some(entity.fields()),
        }
    }

    /// Schedule a diff for the mutation bracketed by `token`.
    ///
    /// Returns `false` without touching the log when nothing changed and
    /// the entity was not just created, or when the entity encodes a null
    /// payload.
    pub fn after_mutation<T: Tracked + ?Sized>(
        &self,
        entity: &T,
        token: SnapshotToken,
        created: bool,
    ) -> Result<bool> {
        let changed = token.changed_fields(&entity.fields());
        if changed.is_empty() && !created {
            return Ok(false);
        }

        let payload = entity.encode_payload(&changed);
        if payload.is_null() {
            return Ok(false);
        }

        let trigger = EntityRef::new(entity.kind(), entity.id());
        let subject = entity.diff_subject().unwrap_or_else(|| trigger.clone());
        let diff = NewDiff {
            payload,
            created,
            trigger,
            subject,
            timestamp: Some(now_timestamp()),
        };
        tracing::debug!(
            trigger = %diff.trigger,
            subject = %diff.subject,
            changed = changed.len(),
            "captured change"
        );

        let log = self.log.clone();
        self.commit
            .run_after_commit(Box::new(move || log.create_for(diff).map(|_| ())))?;
        Ok(true)
    }
}

impl std::fmt::Debug for ChangeCapture {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ChangeCapture")
            .field("log", &self.log)
            .finish_non_exhaustive()
    }
}
