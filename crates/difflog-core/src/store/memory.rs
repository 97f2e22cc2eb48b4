//! In-process sorted-set store
//!
//! Behaves like the networked sorted-set backends, including scalar keys
//! that reject sorted-set operations, so it can stand in for them in tests
//! and single-process deployments.

use super::{resolve_range, Order, ScanCursor, ScanPage, ScoredMember, TimeSeriesStore};
use crate::errors::{key_type_mismatch, lock_poisoned, Result};
use std::collections::{BTreeMap, HashMap};
use std::ops::Bound;
use std::sync::Mutex;

#[derive(Debug)]
enum Entry {
    Sorted(SortedSet),
    Scalar,
}

#[derive(Debug, Default)]
struct SortedSet {
    // member -> (score, insertion sequence)
    members: HashMap<Vec<u8>, (f64, u64)>,
}

impl SortedSet {
    fn ordered(&self, order: Order) -> Vec<ScoredMember> {
        let mut items: Vec<(&Vec<u8>, f64, u64)> = self
            .members
            .iter()
            .map(|(member, (score, seq))| (member, *score, *seq))
            .collect();
        items.sort_by(|a, b| a.1.total_cmp(&b.1).then(a.2.cmp(&b.2)));
        if order == Order::Descending {
            items.reverse();
        }
        items
            .into_iter()
            .map(|(member, score, _)| ScoredMember {
                member: member.clone(),
                score,
            })
            .collect()
    }
}

#[derive(Debug, Default)]
struct Inner {
    entries: BTreeMap<String, Entry>,
    next_seq: u64,
}

/// Sorted-set store held in process memory
#[derive(Debug, Default)]
pub struct MemoryStore {
    inner: Mutex<Inner>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Occupy `key` with a plain value, replacing whatever was there.
    ///
    /// The value itself is not retained; only the key's type matters to
    /// sorted-set operations.
    pub fn set_scalar(&self, key: &str, _value: &[u8]) -> Result<()> {
        let mut inner = self.inner.lock().map_err(|_| lock_poisoned("set_scalar"))?;
        inner.entries.insert(key.to_string(), Entry::Scalar);
        Ok(())
    }

    /// Number of members under `key` (0 for missing or scalar keys)
    pub fn card(&self, key: &str) -> Result<usize> {
        let inner = self.inner.lock().map_err(|_| lock_poisoned("card"))?;
        Ok(match inner.entries.get(key) {
            Some(Entry::Sorted(set)) => set.members.len(),
            _ => 0,
        })
    }

    /// Drop every key
    pub fn flush(&self) -> Result<()> {
        let mut inner = self.inner.lock().map_err(|_| lock_poisoned("flush"))?;
        inner.entries.clear();
        Ok(())
    }
}

impl TimeSeriesStore for MemoryStore {
    fn append(&self, key: &str, member: &[u8], score: f64) -> Result<bool> {
        let mut inner = self.inner.lock().map_err(|_| lock_poisoned("append"))?;
        let seq = inner.next_seq;
        inner.next_seq += 1;

        let entry = inner
            .entries
            .entry(key.to_string())
            .or_insert_with(|| Entry::Sorted(SortedSet::default()));
        match entry {
            Entry::Sorted(set) => Ok(set
                .members
                .insert(member.to_vec(), (score, seq))
                .is_none()),
            Entry::Scalar => Err(key_type_mismatch("append", key)),
        }
    }

    fn range(
        &self,
        key: &str,
        start: isize,
        stop: isize,
        order: Order,
    ) -> Result<Vec<ScoredMember>> {
        let inner = self.inner.lock().map_err(|_| lock_poisoned("range"))?;
        let set = match inner.entries.get(key) {
            None => return Ok(Vec::new()),
            Some(Entry::Scalar) => return Err(key_type_mismatch("range", key)),
            Some(Entry::Sorted(set)) => set,
        };

        let Some((first, last)) = resolve_range(set.members.len(), start, stop) else {
            return Ok(Vec::new());
        };
        let mut ordered = set.ordered(order);
        ordered.truncate(last + 1);
        Ok(ordered.split_off(first))
    }

    fn remove(&self, key: &str, member: &[u8]) -> Result<bool> {
        let mut inner = self.inner.lock().map_err(|_| lock_poisoned("remove"))?;
        let (removed, now_empty) = match inner.entries.get_mut(key) {
            None => return Ok(false),
            Some(Entry::Scalar) => return Err(key_type_mismatch("remove", key)),
            Some(Entry::Sorted(set)) => {
                let removed = set.members.remove(member).is_some();
                (removed, set.members.is_empty())
            }
        };
        if now_empty {
            inner.entries.remove(key);
        }
        Ok(removed)
    }

    fn remove_scored_below(&self, key: &str, max_score: f64) -> Result<u64> {
        let mut inner = self
            .inner
            .lock()
            .map_err(|_| lock_poisoned("remove_scored_below"))?;
        let (removed, now_empty) = match inner.entries.get_mut(key) {
            None => return Ok(0),
            Some(Entry::Scalar) => return Err(key_type_mismatch("remove_scored_below", key)),
            Some(Entry::Sorted(set)) => {
                let before = set.members.len();
                set.members
                    .retain(|_, (score, _)| !(*score >= 0.0 && *score <= max_score));
                (before - set.members.len(), set.members.is_empty())
            }
        };
        if now_empty {
            inner.entries.remove(key);
        }
        Ok(removed as u64)
    }

    fn scan_page(&self, prefix: &str, cursor: &ScanCursor, count: usize) -> Result<ScanPage> {
        let inner = self.inner.lock().map_err(|_| lock_poisoned("scan_page"))?;
        let lower = match cursor {
            ScanCursor::Start => Bound::Included(prefix.to_string()),
            ScanCursor::Resume(after) => Bound::Excluded(after.clone()),
        };

        let mut keys = Vec::with_capacity(count);
        let mut more = false;
        for key in inner
            .entries
            .range::<String, _>((lower, Bound::Unbounded))
            .map(|(k, _)| k)
            .skip_while(|k| k.as_str() < prefix)
            .take_while(|k| k.starts_with(prefix))
        {
            if keys.len() == count {
                more = true;
                break;
            }
            keys.push(key.clone());
        }

        let next = if more {
            keys.last().cloned().map(ScanCursor::Resume)
        } else {
            None
        };
        Ok(ScanPage { keys, next })
    }
}
