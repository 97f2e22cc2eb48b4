//! Retention pruning
//!
//! Walks every key in the store with a resumable cursor scan and removes
//! members older than the retention age from keys inside the log namespace.
//! Keys outside the namespace are skipped; a key that fails for a per-key
//! reason (typically a non-sorted-set value) is recorded and the pass moves
//! on. There is no cross-key atomicity: an interrupted pass leaves some keys
//! pruned, and running it again is always safe.
//!
//! A failure that is not tied to one key (the store going away mid-scan)
//! stops the pass with [`PruneInterrupted`], which carries what was done so
//! far and the scan cursor to hand to [`Pruner::prune_from`].

use crate::errors::{ExError, Result};
use crate::index::RelationIndex;
use crate::record::precise_timestamp;
use crate::schema::OP_PRUNE;
use crate::store::{ScanCursor, TimeSeriesStore, DEFAULT_SCAN_COUNT};
use crate::{log_op_end, log_op_error, log_op_start};
use chrono::{DateTime, Duration, Utc};
use std::sync::Arc;
use std::time::Instant;

/// What happened to one key during a pass
#[derive(Debug, Clone)]
pub enum KeyOutcome {
    Pruned { key: String, removed: u64 },
    Skipped { key: String },
    Failed { key: String, error: ExError },
}

impl KeyOutcome {
    pub fn key(&self) -> &str {
        match self {
            KeyOutcome::Pruned { key, .. }
            | KeyOutcome::Skipped { key }
            | KeyOutcome::Failed { key, .. } => key,
        }
    }
}

/// Result of one prune pass
#[derive(Debug, Clone)]
pub struct PruneReport {
    /// Members scored at or below this were removed
    pub min_age_timestamp: f64,
    pub outcomes: Vec<KeyOutcome>,
    /// Rows dropped from the relation index, when one is attached
    pub index_removed: Option<u64>,
}

impl PruneReport {
    pub fn total_removed(&self) -> u64 {
        self.outcomes
            .iter()
            .map(|o| match o {
                KeyOutcome::Pruned { removed, .. } => *removed,
                _ => 0,
            })
            .sum()
    }

    pub fn failures(&self) -> impl Iterator<Item = (&str, &ExError)> {
        self.outcomes.iter().filter_map(|o| match o {
            KeyOutcome::Failed { key, error } => Some((key.as_str(), error)),
            _ => None,
        })
    }

    pub fn skipped(&self) -> impl Iterator<Item = &str> {
        self.outcomes.iter().filter_map(|o| match o {
            KeyOutcome::Skipped { key } => Some(key.as_str()),
            _ => None,
        })
    }

    /// Outcome recorded for `key`, if it was visited
    pub fn outcome_for(&self, key: &str) -> Option<&KeyOutcome> {
        self.outcomes.iter().find(|o| o.key() == key)
    }
}

/// A prune pass stopped by a failure not tied to a single key
#[derive(Debug, Clone, thiserror::Error)]
#[error("prune pass interrupted after {visited} keys: {error}", visited = .partial.outcomes.len())]
pub struct PruneInterrupted {
    pub error: ExError,
    /// Outcomes of the keys handled before the failure
    pub partial: PruneReport,
    /// Where to continue the key scan; `None` once every key was visited
    ///
    /// The cursor points at the start of the page that failed, so keys of
    /// that page pruned before the failure are visited again.
    pub resume: Option<ScanCursor>,
}

impl From<PruneInterrupted> for ExError {
    fn from(interrupted: PruneInterrupted) -> Self {
        interrupted.error
    }
}

/// Removes expired diffs across the whole log namespace
pub struct Pruner {
    store: Arc<dyn TimeSeriesStore>,
    prefix: String,
    index: Option<Arc<dyn RelationIndex>>,
    scan_count: usize,
}

impl Pruner {
    pub fn new(store: Arc<dyn TimeSeriesStore>, key_prefix: impl Into<String>) -> Self {
        Self {
            store,
            prefix: key_prefix.into(),
            index: None,
            scan_count: DEFAULT_SCAN_COUNT,
        }
    }

    /// Also expire relation index rows older than the threshold
    pub fn with_index(mut self, index: Arc<dyn RelationIndex>) -> Self {
        self.index = Some(index);
        self
    }

    pub fn with_scan_count(mut self, count: usize) -> Self {
        self.scan_count = count.max(1);
        self
    }

    /// Prune relative to the current UTC time
    pub fn prune(&self, max_age_seconds: u64) -> std::result::Result<PruneReport, PruneInterrupted> {
        self.prune_at(Utc::now(), max_age_seconds)
    }

    /// Prune relative to `now`
    pub fn prune_at(
        &self,
        now: DateTime<Utc>,
        max_age_seconds: u64,
    ) -> std::result::Result<PruneReport, PruneInterrupted> {
        self.prune_from(ScanCursor::Start, now, max_age_seconds)
    }

    /// Prune, continuing a key scan interrupted at `cursor`
    ///
    /// # Errors
    ///
    /// `StoreUnavailable` (or another non per-key failure) stops the pass
    /// with [`PruneInterrupted`]; per-key failures are reported in the
    /// returned [`PruneReport`].
    pub fn prune_from(
        &self,
        cursor: ScanCursor,
        now: DateTime<Utc>,
        max_age_seconds: u64,
    ) -> std::result::Result<PruneReport, PruneInterrupted> {
        let min_age_timestamp = min_age_timestamp(now, max_age_seconds);
        log_op_start!(
            OP_PRUNE,
            prefix = self.prefix.as_str(),
            min_age_timestamp = min_age_timestamp
        );
        let timer = Instant::now();

        let result = self.prune_impl(cursor, min_age_timestamp).map_err(|e| {
            log_op_error!(
                OP_PRUNE,
                e.error.clone(),
                duration_ms = timer.elapsed().as_millis() as u64,
                keys = e.partial.outcomes.len() as u64
            );
            e
        })?;

        log_op_end!(
            OP_PRUNE,
            duration_ms = timer.elapsed().as_millis() as u64,
            keys = result.outcomes.len() as u64,
            removed = result.total_removed()
        );
        Ok(result)
    }

    fn prune_impl(
        &self,
        cursor: ScanCursor,
        min_age_timestamp: f64,
    ) -> std::result::Result<PruneReport, PruneInterrupted> {
        let mut report = PruneReport {
            min_age_timestamp,
            outcomes: Vec::new(),
            index_removed: None,
        };

        // Scan everything so keys outside the namespace can be reported.
        let mut next = Some(cursor);
        while let Some(page_start) = next.take() {
            let page = match self.store.scan_page("", &page_start, self.scan_count) {
                Ok(page) => page,
                Err(error) => return Err(interrupted(error, report, Some(page_start))),
            };
            for key in page.keys {
                match self.prune_key(key, min_age_timestamp) {
                    Ok(outcome) => report.outcomes.push(outcome),
                    Err(error) => return Err(interrupted(error, report, Some(page_start))),
                }
            }
            next = page.next;
        }

        if let Some(index) = &self.index {
            match index.remove_scored_below(min_age_timestamp) {
                Ok(removed) => report.index_removed = Some(removed),
                Err(error) => return Err(interrupted(error, report, None)),
            }
        }
        Ok(report)
    }

    fn prune_key(&self, key: String, min_age_timestamp: f64) -> Result<KeyOutcome> {
        if !key.starts_with(&self.prefix) {
            tracing::debug!(key = key.as_str(), "skipping key outside namespace");
            return Ok(KeyOutcome::Skipped { key });
        }

        match self.store.remove_scored_below(&key, min_age_timestamp) {
            Ok(removed) => {
                tracing::info!(key = key.as_str(), removed, "pruned key");
                Ok(KeyOutcome::Pruned { key, removed })
            }
            Err(error) if error.is_per_key() => {
                tracing::warn!(
                    key = key.as_str(),
                    err.code = error.code(),
                    "pruning key failed: {}",
                    error
                );
                Ok(KeyOutcome::Failed { key, error })
            }
            Err(error) => Err(error),
        }
    }
}

fn interrupted(error: ExError, partial: PruneReport, resume: Option<ScanCursor>) -> PruneInterrupted {
    tracing::warn!(
        err.code = error.code(),
        keys = partial.outcomes.len() as u64,
        resumable = resume.is_some(),
        "prune pass interrupted: {}",
        error
    );
    PruneInterrupted {
        error,
        partial,
        resume,
    }
}

// Retention ages beyond this are treated as "keep everything since the epoch".
const MAX_AGE_SECONDS: u64 = u32::MAX as u64;

/// `now - max_age` as a store score
pub fn min_age_timestamp(now: DateTime<Utc>, max_age_seconds: u64) -> f64 {
    let age = Duration::seconds(max_age_seconds.min(MAX_AGE_SECONDS) as i64);
    let threshold = now
        .checked_sub_signed(age)
        .unwrap_or(DateTime::<Utc>::MIN_UTC);
    precise_timestamp(threshold)
}
