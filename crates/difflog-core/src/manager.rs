//! Diff log manager
//!
//! One `DiffLog` per tracked entity kind. It derives log keys, writes new
//! diffs to the time-series store (and the relation index, when one is
//! attached), and reads diff collections back oldest first.
//!
//! ## Logging Ownership
//!
//! Writes and reads own their boundary events (`log_op_start!` /
//! `log_op_end!` / `log_op_error!`); stores log only at `debug`.

use crate::config::DiffsConfig;
use crate::entity::{EntityRef, KeyFn, KeyScheme};
use crate::errors::{ExError, ExErrorKind, Result};
use crate::index::{IndexEntry, RelationIndex};
use crate::record::{now_timestamp, DiffRecord};
use crate::schema::{
    OP_DIFF_CREATE, OP_DIFF_GET_ALL_FOR_ENTITY, OP_DIFF_GET_FOR_ENTITY, OP_DIFF_GET_LAST,
};
use crate::store::{Order, ScoredMember, TimeSeriesStore};
use crate::{log_op_end, log_op_error, log_op_start};
use serde_json::Value;
use std::sync::Arc;
use std::time::Instant;

/// A fully specified write
#[derive(Debug, Clone, PartialEq)]
pub struct NewDiff {
    pub payload: Value,
    pub created: bool,
    /// Entity whose mutation produced the diff
    pub trigger: EntityRef,
    /// Entity the diff is filed under; equal to `trigger` unless redirected
    pub subject: EntityRef,
    /// Defaults to the current time
    pub timestamp: Option<f64>,
}

impl NewDiff {
    /// A diff filed under the entity that produced it
    pub fn for_entity(entity: EntityRef, payload: Value, created: bool) -> Self {
        Self {
            payload,
            created,
            subject: entity.clone(),
            trigger: entity,
            timestamp: None,
        }
    }

    /// File the diff under another entity
    pub fn redirect_to(mut self, subject: EntityRef) -> Self {
        self.subject = subject;
        self
    }

    pub fn at(mut self, timestamp: f64) -> Self {
        self.timestamp = Some(timestamp);
        self
    }
}

/// Per-kind access to the diff log
#[derive(Clone)]
pub struct DiffLog {
    kind: String,
    keys: KeyScheme,
    store: Arc<dyn TimeSeriesStore>,
    index: Option<Arc<dyn RelationIndex>>,
}

impl DiffLog {
    pub fn new(kind: impl Into<String>, store: Arc<dyn TimeSeriesStore>, config: &DiffsConfig) -> Self {
        Self {
            kind: kind.into(),
            keys: KeyScheme::new(config.key_prefix.clone()),
            store,
            index: None,
        }
    }

    /// Replace the `"{kind}-{id}"` key layout; the namespace prefix still applies
    pub fn with_key_fn(mut self, key_fn: KeyFn) -> Self {
        self.keys = self.keys.with_key_fn(key_fn);
        self
    }

    /// Attach a relation index, enabling [`DiffLog::get_all_for_entity`]
    pub fn with_index(mut self, index: Arc<dyn RelationIndex>) -> Self {
        self.index = Some(index);
        self
    }

    pub fn kind(&self) -> &str {
        &self.kind
    }

    pub fn store(&self) -> &Arc<dyn TimeSeriesStore> {
        &self.store
    }

    pub fn entity(&self, id: &str) -> EntityRef {
        EntityRef::new(self.kind.clone(), id)
    }

    /// Log key for an entity of this log's kind
    pub fn key_for(&self, id: &str) -> String {
        self.keys.key(&self.kind, id)
    }

    /// Record a diff for entity `subject_id` of this log's kind
    pub fn create(
        &self,
        payload: Value,
        created: bool,
        subject_id: &str,
        timestamp: Option<f64>,
    ) -> Result<DiffRecord> {
        let mut diff = NewDiff::for_entity(self.entity(subject_id), payload, created);
        diff.timestamp = timestamp;
        self.create_for(diff)
    }

    /// Record a diff with explicit trigger and subject entities
    ///
    /// The record is appended under the subject's key, built with this log's
    /// key scheme even when the subject is of another kind; logs that redirect
    /// across kinds must share one key function (see [`Registry::with_key_fn`]).
    /// Payload shape is the caller's concern and is never rejected here.
    ///
    /// # Errors
    ///
    /// When the relation index rejects the entry, a newly appended member is
    /// removed from the store again before the error is returned.
    ///
    /// [`Registry::with_key_fn`]: crate::capture::Registry::with_key_fn
    pub fn create_for(&self, diff: NewDiff) -> Result<DiffRecord> {
        let key = self.keys.key_for(&diff.subject);
        log_op_start!(OP_DIFF_CREATE, key = key.as_str(), created = diff.created);
        let start = Instant::now();

        let result = self.create_impl(diff, &key).map_err(|e| {
            log_op_error!(
                OP_DIFF_CREATE,
                e.clone(),
                duration_ms = start.elapsed().as_millis() as u64,
                key = key.as_str()
            );
            e
        })?;

        log_op_end!(
            OP_DIFF_CREATE,
            duration_ms = start.elapsed().as_millis() as u64,
            key = key.as_str()
        );
        Ok(result)
    }

    fn create_impl(&self, diff: NewDiff, key: &str) -> Result<DiffRecord> {
        let timestamp = diff.timestamp.unwrap_or_else(now_timestamp);
        let record = DiffRecord::new(diff.payload, diff.created, timestamp);
        let (member, score) = record.serialize()?;

        let inserted = self.store.append(key, &member, score)?;
        tracing::debug!(key, inserted, score, "appended diff");

        if let Some(index) = &self.index {
            let entry = IndexEntry {
                subject: diff.subject,
                trigger: diff.trigger,
                member,
                score,
            };
            if let Err(e) = index.record(&entry) {
                // A diff the index never saw would be missing from related reads.
                if inserted {
                    self.withdraw(key, &entry.member);
                }
                return Err(e.with_key(key));
            }
        }
        Ok(record)
    }

    fn withdraw(&self, key: &str, member: &[u8]) {
        match self.store.remove(key, member) {
            Ok(removed) => tracing::debug!(key, removed, "withdrew unindexed diff"),
            Err(e) => tracing::warn!(
                key,
                err.code = e.code(),
                "withdrawing unindexed diff failed: {}",
                e
            ),
        }
    }

    /// All diffs filed under `id`, oldest first
    pub fn get_for_entity(&self, id: &str) -> Result<Vec<DiffRecord>> {
        self.read_range(OP_DIFF_GET_FOR_ENTITY, id, 0, -1)
    }

    /// The newest `n` diffs filed under `id`, oldest first
    pub fn get_last(&self, id: &str, n: usize) -> Result<Vec<DiffRecord>> {
        if n == 0 {
            return Ok(Vec::new());
        }
        let start = -(isize::try_from(n).unwrap_or(isize::MAX));
        self.read_range(OP_DIFF_GET_LAST, id, start, -1)
    }

    fn read_range(&self, op: &'static str, id: &str, start: isize, stop: isize) -> Result<Vec<DiffRecord>> {
        let key = self.key_for(id);
        log_op_start!(op, key = key.as_str());
        let timer = Instant::now();

        let result = self
            .store
            .range(&key, start, stop, Order::Ascending)
            .and_then(|members| decode_all(&members))
            .map_err(|e| {
                log_op_error!(
                    op,
                    e.clone(),
                    duration_ms = timer.elapsed().as_millis() as u64,
                    key = key.as_str()
                );
                e.with_entity_id(id)
            })?;

        log_op_end!(
            op,
            duration_ms = timer.elapsed().as_millis() as u64,
            key = key.as_str(),
            count = result.len() as u64
        );
        Ok(result)
    }

    /// Diffs filed under `id` together with diffs `id` triggered elsewhere
    /// and diffs other entities filed under `id`, ordered by timestamp.
    ///
    /// # Errors
    ///
    /// `NotImplemented` when no relation index is attached; the key-only
    /// layout cannot tell which entity triggered a diff.
    pub fn get_all_for_entity(&self, id: &str) -> Result<Vec<DiffRecord>> {
        let entity = self.entity(id);
        log_op_start!(OP_DIFF_GET_ALL_FOR_ENTITY, entity = %entity);
        let timer = Instant::now();

        let result = self.get_all_impl(&entity).map_err(|e| {
            log_op_error!(
                OP_DIFF_GET_ALL_FOR_ENTITY,
                e.clone(),
                duration_ms = timer.elapsed().as_millis() as u64
            );
            e
        })?;

        log_op_end!(
            OP_DIFF_GET_ALL_FOR_ENTITY,
            duration_ms = timer.elapsed().as_millis() as u64,
            count = result.len() as u64
        );
        Ok(result)
    }

    fn get_all_impl(&self, entity: &EntityRef) -> Result<Vec<DiffRecord>> {
        let index = self.index.as_ref().ok_or_else(|| {
            ExError::new(ExErrorKind::NotImplemented)
                .with_op(OP_DIFF_GET_ALL_FOR_ENTITY)
                .with_entity_id(entity.to_string())
                .with_message("no relation index attached to this diff log")
        })?;

        index
            .related(entity)?
            .iter()
            .map(|row| DiffRecord::deserialize(&row.member, row.score))
            .collect()
    }

    /// `(oldest, newest)` timestamps filed under `id`
    pub fn bounds(&self, id: &str) -> Result<Option<(f64, f64)>> {
        let key = self.key_for(id);
        let min = self.store.min_score(&key)?;
        let max = self.store.max_score(&key)?;
        Ok(min.zip(max))
    }
}

impl std::fmt::Debug for DiffLog {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("DiffLog")
            .field("kind", &self.kind)
            .field("keys", &self.keys)
            .field("indexed", &self.index.is_some())
            .finish_non_exhaustive()
    }
}

fn decode_all(members: &[ScoredMember]) -> Result<Vec<DiffRecord>> {
    members
        .iter()
        .map(|m| DiffRecord::deserialize(&m.member, m.score))
        .collect()
}
