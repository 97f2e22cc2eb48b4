//! Time-series store abstraction
//!
//! A store holds, per key, an ordered set of `(member bytes, score)` pairs
//! with sorted-set semantics:
//! - appending a member that already exists updates its score
//! - removing the last member deletes the key
//! - positional ranges accept negative indices counted from the end
//!
//! Implementations: [`MemoryStore`] here, SQLite and Redis backends in
//! `difflog-store`.

mod memory;

pub use memory::MemoryStore;

use crate::errors::Result;

/// Default number of keys requested per scan page
pub const DEFAULT_SCAN_COUNT: usize = 100;

/// Range direction
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Order {
    /// Lowest score first
    Ascending,
    /// Highest score first
    Descending,
}

/// One member of a series with its score
#[derive(Debug, Clone, PartialEq)]
pub struct ScoredMember {
    pub member: Vec<u8>,
    pub score: f64,
}

/// Position of a key scan
///
/// Cursors are opaque to callers: memory and SQLite stores resume after the
/// last key returned, Redis uses its native `SCAN` cursor.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ScanCursor {
    Start,
    Resume(String),
}

/// One page of a key scan
#[derive(Debug, Clone, PartialEq)]
pub struct ScanPage {
    pub keys: Vec<String>,
    /// `None` once the scan is complete
    pub next: Option<ScanCursor>,
}

/// Ordered per-key storage for serialized diff records
///
/// A single call is a single atomic operation at the store; callers add no
/// locking of their own.
pub trait TimeSeriesStore: Send + Sync {
    /// Insert `member` with `score`, or move it to `score` if present.
    ///
    /// Returns `true` when the member was newly added.
    fn append(&self, key: &str, member: &[u8], score: f64) -> Result<bool>;

    /// Members at positions `start..=stop` in the given order.
    ///
    /// Negative positions count from the end (`-1` is the last member of
    /// that ordering). A missing key yields an empty range.
    fn range(&self, key: &str, start: isize, stop: isize, order: Order)
        -> Result<Vec<ScoredMember>>;

    /// Remove one member; returns `true` if it was present.
    ///
    /// A key left without members is deleted.
    fn remove(&self, key: &str, member: &[u8]) -> Result<bool>;

    /// Remove every member scored in `[0, max_score]`; returns the count.
    fn remove_scored_below(&self, key: &str, max_score: f64) -> Result<u64>;

    /// Fetch up to roughly `count` keys starting with `prefix`.
    fn scan_page(&self, prefix: &str, cursor: &ScanCursor, count: usize) -> Result<ScanPage>;

    /// Lowest score stored under `key`, if any
    fn min_score(&self, key: &str) -> Result<Option<f64>> {
        Ok(self
            .range(key, 0, 0, Order::Ascending)?
            .first()
            .map(|m| m.score))
    }

    /// Highest score stored under `key`, if any
    fn max_score(&self, key: &str) -> Result<Option<f64>> {
        Ok(self
            .range(key, 0, 0, Order::Descending)?
            .first()
            .map(|m| m.score))
    }
}

impl dyn TimeSeriesStore + '_ {
    /// Lazily enumerate keys starting with `prefix`, one page at a time
    pub fn scan_keys(&self, prefix: impl Into<String>) -> KeyScan<'_> {
        KeyScan::new(self, prefix)
    }
}

/// Resolve sorted-set style inclusive positions against a length.
///
/// Returns `None` when the range selects nothing.
pub fn resolve_range(len: usize, start: isize, stop: isize) -> Option<(usize, usize)> {
    if len == 0 {
        return None;
    }
    let len = len as isize;
    let start = if start < 0 { (len + start).max(0) } else { start };
    let stop = if stop < 0 { len + stop } else { stop.min(len - 1) };
    if start > stop || start >= len || stop < 0 {
        return None;
    }
    Some((start as usize, stop as usize))
}

/// Lazy, resumable iteration over the keys under a prefix
///
/// Pages are fetched from the store on demand; only one page of keys is
/// held in memory at a time.
pub struct KeyScan<'a> {
    store: &'a dyn TimeSeriesStore,
    prefix: String,
    count: usize,
    cursor: Option<ScanCursor>,
    buffer: std::collections::VecDeque<String>,
}

impl<'a> KeyScan<'a> {
    pub fn new(store: &'a dyn TimeSeriesStore, prefix: impl Into<String>) -> Self {
        Self::resume(store, prefix, ScanCursor::Start)
    }

    /// Continue a scan from a cursor obtained via [`KeyScan::cursor`]
    pub fn resume(
        store: &'a dyn TimeSeriesStore,
        prefix: impl Into<String>,
        cursor: ScanCursor,
    ) -> Self {
        Self {
            store,
            prefix: prefix.into(),
            count: DEFAULT_SCAN_COUNT,
            cursor: Some(cursor),
            buffer: std::collections::VecDeque::new(),
        }
    }

    pub fn with_count(mut self, count: usize) -> Self {
        self.count = count.max(1);
        self
    }

    /// Cursor of the next page to fetch, `None` when exhausted.
    ///
    /// Keys already buffered from the current page are not covered by the
    /// cursor, so resume only at a page boundary.
    pub fn cursor(&self) -> Option<&ScanCursor> {
        self.cursor.as_ref()
    }

    /// True when no buffered keys remain from the current page
    pub fn at_page_boundary(&self) -> bool {
        self.buffer.is_empty()
    }
}

impl Iterator for KeyScan<'_> {
    type Item = Result<String>;

    fn next(&mut self) -> Option<Self::Item> {
        loop {
            if let Some(key) = self.buffer.pop_front() {
                return Some(Ok(key));
            }
            let cursor = self.cursor.take()?;
            match self.store.scan_page(&self.prefix, &cursor, self.count) {
                Ok(page) => {
                    self.buffer.extend(page.keys);
                    self.cursor = page.next;
                }
                Err(e) => {
                    // Keep the cursor so the caller can retry this page.
                    self.cursor = Some(cursor);
                    return Some(Err(e));
                }
            }
        }
    }
}
